//! Model trees: joints, transforms and animation curves.
//!
//! Every `SI_Model` creates one joint. Transforms accumulate down the tree
//! through a [`ModelContext`] that each recursive call receives by value, so a
//! child never disturbs its siblings.

use xsi_math::{compose_srt, inverse_bind_pose, Affine3A, Vec3};

use super::loader::XsiLoader;
use super::scanner::{ParseError, ParseResult, TokenKind};
use super::types::{CurveComponent, XsiModel};
use crate::skeleton::{AnimChannel, JointPose};

/// Values an `XSI_Transform` carries after its scaling flag in every file
/// the loader understands (pivot, pivot compensation and shear).
const RESERVED_TRANSFORM: [f32; 33] = [
    0.0, 0.0, 0.0, 0.0, 0.0, 0.0, 0.0, 0.0, 0.0, 1.0, 1.0, 1.0, 0.0, 0.0, 0.0, 0.0, 0.0, 0.0,
    1.0, 1.0, 1.0, 1.0, 1.0, 1.0, 0.0, 0.0, 0.0, 0.0, 0.0, 0.0, 0.0, 0.0, 0.0,
];

/// State inherited from the enclosing model.
#[derive(Clone, Copy, Debug, PartialEq)]
pub(super) struct ModelContext {
    pub parent: Option<usize>,
    /// An enclosing model carries animation curves
    pub animated: bool,
    /// Accumulated parent transform
    pub transform: Affine3A,
}

impl ModelContext {
    pub fn root() -> Self {
        Self {
            parent: None,
            animated: false,
            transform: Affine3A::IDENTITY,
        }
    }
}

impl XsiLoader<'_> {
    /// `SI_Model name { items }`
    ///
    /// The model is kept only if it is visible and owns geometry; its joint
    /// and its children are kept regardless.
    pub(super) fn parse_model(&mut self, mut ctx: ModelContext) -> ParseResult<()> {
        let name = self.scan.scan_xsi_name()?;
        self.connect_materials()?;

        let joint = self.skeleton.add_joint(name.clone(), ctx.parent);
        self.skeleton.joints[joint].static_pose = ctx.transform;

        let mut visible = true;
        let mut mesh = None;

        self.scan.expect_punct('{')?;
        while !self.scan.is_punct('}') {
            if self.scan.kind() != TokenKind::Name {
                return Err(self.scan.error(format!("template expected in model {name}")));
            }
            match self.scan.scan_name()? {
                "SI_Visibility" => {
                    self.scan.expect_punct('{')?;
                    visible = self.scan.scan_int()? != 0;
                    self.scan.expect_punct('}')?;
                }
                "XSI_Transform" => self.parse_transform(&name, joint, &mut ctx)?,
                "SI_GlobalMaterial" => {
                    self.scan.expect_punct('{')?;
                    self.scan.skip_strings(2)?;
                    self.scan.expect_punct('}')?;
                }
                "SI_Null" => {
                    self.scan.scan_xsi_name()?;
                    self.scan.expect_punct('{')?;
                    self.scan.expect_punct('}')?;
                }
                "XSI_BasePose" => self.parse_base_pose(&name, joint)?,
                "SI_Camera" => {
                    self.scan.scan_xsi_name()?;
                    self.scan.expect_punct('{')?;
                    self.scan.skip_floats(10)?;
                    self.scan.expect_punct('}')?;
                }
                "SI_Light" => self.skip_light()?,
                "XSI_CustomPSet" => self.skip_custom_pset()?,
                "XSI_Mixer" => self.skip_mixer()?,
                "SI_Cluster" => self.skip_cluster()?,
                "SI_Model" => self.parse_model(ModelContext {
                    parent: Some(joint),
                    ..ctx
                })?,
                "XSI_Mesh" => {
                    if mesh.is_some() {
                        return Err(self.scan.error(format!("more than one mesh in model {name}")));
                    }
                    mesh = Some(self.parse_mesh(&name, ctx.animated, visible)?);
                }
                "XSI_Camera" => self.skip_camera()?,
                "SI_IK_Root" | "SI_IK_Joint" | "SI_IK_Effector" => self.scan.skip_section()?,
                other => {
                    return Err(self
                        .scan
                        .error(format!("unexpected template {other} in model {name}")))
                }
            }
        }
        self.scan.expect_punct('}')?;

        match mesh {
            Some((mesh, position_map)) if visible && !mesh.is_empty() => {
                self.models.push(XsiModel {
                    name,
                    joint,
                    mesh,
                    position_map,
                });
            }
            _ => log::debug!("Model {} has no visible geometry", name),
        }
        Ok(())
    }

    /// `XSI_Transform { t, r, order, s, siScaling, reserved…, XSI_Limit*, SI_FCurve* }`
    fn parse_transform(
        &mut self,
        model: &str,
        joint: usize,
        ctx: &mut ModelContext,
    ) -> ParseResult<()> {
        self.scan.expect_punct('{')?;
        let translation = self.scan.scan_vec3()?;
        let rotation = self.scan.scan_vec3()?;
        let order = self.scan.scan_string()?;
        let scale = self.scan.scan_vec3()?;
        let si_scaling = self.scan.scan_int()? != 0;

        if order != "XYZ" {
            self.warn(format!("XSI_Transform {model}: rotation order {order} is not supported"));
        }
        if si_scaling && !is_uniform(scale) {
            self.warn(format!(
                "XSI_Transform {model}: non-uniform scaling {scale} is not supported"
            ));
        }

        let mut unexpected = false;
        for expected in RESERVED_TRANSFORM {
            unexpected |= self.scan.scan_float()? != expected;
        }
        if unexpected {
            self.warn(format!("XSI_Transform {model} has unexpected data"));
        }

        ctx.transform = ctx.transform * self.mirror.affine(compose_srt(scale, rotation, translation));
        let target = &mut self.skeleton.joints[joint];
        target.static_pose = ctx.transform;
        target.channel = AnimChannel::new(JointPose::from_srt(scale, rotation, translation));

        while self.scan.if_name("XSI_Limit")? {
            self.scan.expect_punct('{')?;
            self.scan.scan_string()?;
            self.scan.scan_int()?;
            self.scan.scan_float()?;
            self.scan.scan_int()?;
            self.scan.scan_float()?;
            self.scan.expect_punct('}')?;
        }
        while self.scan.if_name("SI_FCurve")? {
            ctx.animated = true;
            self.parse_fcurve(joint)?;
        }
        self.scan.expect_punct('}')?;

        let channel = &mut self.skeleton.joints[joint].channel;
        channel.resolve_rotation();
        channel.mirror(self.mirror);
        Ok(())
    }

    /// `XSI_BasePose { t, r, s }`
    fn parse_base_pose(&mut self, model: &str, joint: usize) -> ParseResult<()> {
        self.scan.expect_punct('{')?;
        let translation = self.scan.scan_vec3()?;
        let rotation = self.scan.scan_vec3()?;
        let scale = self.scan.scan_vec3()?;
        self.scan.expect_punct('}')?;

        if !is_uniform(scale) {
            self.warn(format!("XSI_BasePose {model} has non-uniform scaling"));
        }
        let base = inverse_bind_pose(translation, rotation, scale);
        self.skeleton.joints[joint].base_pose = Some(self.mirror.affine(base));
        Ok(())
    }

    /// `SI_FCurve { name, component, interpolation, curves, values, keys, keys… }`
    ///
    /// Only the first value of every key is kept; times are dropped because
    /// keys are sampled at a fixed rate.
    fn parse_fcurve(&mut self, joint: usize) -> ParseResult<()> {
        self.scan.expect_punct('{')?;
        self.scan.scan_string()?;
        let line = self.scan.line();
        let name = self.scan.scan_string()?;
        self.scan.scan_string()?;
        let curves = self.scan.scan_int()?;
        let values = self.scan.scan_count()?;
        let keys = self.scan.scan_count()?;

        let Some(component) = CurveComponent::parse(&name) else {
            return Err(ParseError::Syntax {
                line,
                message: format!("unknown component <{name}>"),
            });
        };
        if curves != 1 {
            return Err(self.scan.error(format!("can't handle {curves} curves")));
        }

        let sampled = keys > 0 && values >= 1;
        let target = component.target().filter(|_| sampled);
        if sampled {
            let channel = &mut self.skeleton.joints[joint].channel;
            if channel.keys == 0 {
                channel.keys = keys;
            } else if channel.keys != keys {
                return Err(self.scan.error(format!(
                    "fcurve components defined with different key count ({}, {})",
                    channel.keys, keys
                )));
            }
        }

        let mut samples = Vec::new();
        for _ in 0..keys {
            self.scan.scan_float()?;
            samples.push(self.scan.scan_float()?);
            self.scan.skip_floats(values.saturating_sub(1))?;
        }
        self.scan.expect_punct('}')?;

        if let Some((track, axis)) = target {
            let track = self.skeleton.joints[joint].channel.track_mut(track);
            for (key, value) in track.iter_mut().zip(samples) {
                key[axis] = value;
            }
        }
        Ok(())
    }

    /// Consume an animation curve that is not applied to any joint.
    pub(super) fn skip_fcurve(&mut self) -> ParseResult<()> {
        self.scan.expect_punct('{')?;
        self.scan.skip_strings(3)?;
        let curves = self.scan.scan_int()?;
        let values = self.scan.scan_count()?;
        let keys = self.scan.scan_count()?;
        if curves != 1 {
            return Err(self.scan.error(format!("can't handle {curves} curves")));
        }
        for _ in 0..keys {
            self.scan.skip_floats(1 + values)?;
        }
        self.scan.expect_punct('}')
    }

    fn skip_light(&mut self) -> ParseResult<()> {
        self.scan.scan_xsi_name()?;
        self.scan.expect_punct('{')?;
        let mode = self.scan.scan_int()?;
        self.scan.skip_floats(3)?;
        let extra = match mode {
            0 | 1 => 3,
            2 => 8,
            3 => 6,
            _ => 0,
        };
        self.scan.skip_floats(extra)?;

        if self.scan.if_name("SI_LightInfo")? {
            self.scan.expect_punct('{')?;
            self.scan.skip_ints(2)?;
            self.scan.skip_floats(2)?;
            self.scan.scan_int()?;
            self.scan.scan_float()?;
            self.scan.scan_int()?;
            self.scan.skip_floats(2)?;
            self.scan.expect_punct('}')?;
        }
        self.scan.expect_punct('}')
    }

    /// `XSI_CustomPSet name { s, s, count, (param, type, value, infos, curves)* }`
    fn skip_custom_pset(&mut self) -> ParseResult<()> {
        self.scan.scan_xsi_name()?;
        self.scan.expect_punct('{')?;
        self.scan.skip_strings(2)?;
        let count = self.scan.scan_count()?;
        for _ in 0..count {
            self.scan.scan_string()?;
            let ty = self.scan.scan_string()?;
            match ty.as_str() {
                "Boolean" | "Small Integer Number" | "Integer" => {
                    self.scan.scan_int()?;
                }
                "Floating Point Number" => {
                    self.scan.scan_float()?;
                }
                "Text" => {
                    self.scan.scan_string()?;
                }
                other => {
                    return Err(self
                        .scan
                        .error(format!("unexpected type {other} in XSI_CustomPSet")))
                }
            }

            while self.scan.if_name("XSI_CustomParamInfo")? {
                self.scan.scan_xsi_name()?;
                self.scan.expect_punct('{')?;
                self.scan.skip_floats(2)?;
                self.scan.scan_int()?;
                self.scan.expect_punct('}')?;
            }
            while self.scan.if_name("SI_FCurve")? {
                self.skip_fcurve()?;
            }
        }
        self.scan.expect_punct('}')
    }

    fn skip_mixer(&mut self) -> ParseResult<()> {
        self.scan.scan_xsi_name()?;
        self.scan.expect_punct('{')?;
        self.scan.skip_ints(6)?;
        while self.scan.if_name("XSI_Action")? {
            self.scan.scan_xsi_name()?;
            self.scan.expect_punct('{')?;
            self.scan.skip_floats(2)?;
            self.scan.scan_int()?;
            while !self.scan.is_punct('}') {
                if self.scan.if_name("XSI_StaticValues")? {
                    self.scan.expect_punct('{')?;
                    self.scan.scan_int()?;
                    self.scan.scan_string()?;
                    self.scan.scan_float()?;
                    self.scan.expect_punct('}')?;
                } else if self.scan.if_name("SI_FCurve")? {
                    self.skip_fcurve()?;
                } else {
                    return Err(self.scan.error("XSI_StaticValues or SI_FCurve expected"));
                }
            }
            self.scan.expect_punct('}')?;
        }
        self.scan.expect_punct('}')
    }

    fn skip_cluster(&mut self) -> ParseResult<()> {
        self.scan.scan_xsi_name()?;
        self.scan.expect_punct('{')?;
        self.scan.skip_strings(3)?;
        let count = self.scan.scan_count()?;
        self.scan.skip_ints(count)?;
        if self.scan.if_name("XSI_ClusterInfo")? {
            self.scan.expect_punct('{')?;
            self.scan.scan_string()?;
            self.scan.expect_punct('}')?;
        }
        while self.scan.if_name("XSI_CustomPSet")? {
            self.skip_custom_pset()?;
        }
        self.scan.expect_punct('}')
    }

    fn skip_camera(&mut self) -> ParseResult<()> {
        self.scan.expect_punct('{')?;
        self.scan.scan_int()?;
        self.scan.skip_floats(2)?;
        self.scan.skip_ints(2)?;
        self.scan.skip_floats(4)?;
        self.scan.scan_int()?;
        self.scan.skip_floats(4)?;
        if self.scan.if_name("XSI_CameraFocalLength")? {
            self.scan.skip_section()?;
        }
        self.scan.expect_punct('}')
    }
}

fn is_uniform(scale: Vec3) -> bool {
    scale.x == scale.y && scale.x == scale.z
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::texture::TextureCache;
    use crate::xsi::loader::LoadOptions;
    use xsi_math::Quat;

    fn transform(t: [f32; 3], r: [f32; 3], curves: &str) -> String {
        let reserved: String = RESERVED_TRANSFORM.iter().map(|v| format!("{v},")).collect();
        format!(
            "XSI_Transform {{ {},{},{}, {},{},{}, \"XYZ\", 1,1,1, 0, {} {} }}",
            t[0], t[1], t[2], r[0], r[1], r[2], reserved, curves
        )
    }

    fn fcurve(component: &str, values: &[f32]) -> String {
        let keys: String = values
            .iter()
            .enumerate()
            .map(|(i, v)| format!("{i}, {v}, "))
            .collect();
        format!(
            "SI_FCurve {{ \"MDL-X\", \"{component}\", \"LINEAR\", 1, 1, {}, {keys} }}",
            values.len()
        )
    }

    fn parse<'a>(src: &'a str, options: &LoadOptions) -> XsiLoader<'a> {
        let mut loader = XsiLoader::new(src, TextureCache::new(), options).unwrap();
        loader.scan.expect_name("SI_Model").unwrap();
        loader.parse_model(ModelContext::root()).unwrap();
        loader
    }

    #[test]
    fn test_transforms_accumulate_per_branch() {
        let src = format!(
            "SI_Model MDL-Root {{ {} SI_Model MDL-A {{ {} }} SI_Model MDL-B {{ }} }}",
            transform([1.0, 0.0, 0.0], [0.0; 3], ""),
            transform([0.0, 2.0, 0.0], [0.0; 3], ""),
        );
        let loader = parse(&src, &LoadOptions::default());
        let joints = &loader.skeleton.joints;
        assert_eq!(joints.len(), 3);
        assert_eq!(joints[1].parent, Some(0));
        assert_eq!(joints[2].parent, Some(0));

        let a = joints[1].static_pose.transform_point3(Vec3::ZERO);
        assert!((a - Vec3::new(1.0, 2.0, 0.0)).length() < 1e-6);
        // B has no transform of its own and inherits only the root's
        let b = joints[2].static_pose.transform_point3(Vec3::ZERO);
        assert!((b - Vec3::X).length() < 1e-6);
        assert!(loader.models.is_empty());
    }

    #[test]
    fn test_fcurves_fill_tracks() {
        let curves = format!(
            "{} {}",
            fcurve("rotz", &[0.0, 90.0]),
            fcurve("posx", &[1.0, 3.0])
        );
        let src = format!(
            "SI_Model MDL-Arm {{ {} }}",
            transform([1.0, 5.0, 0.0], [0.0; 3], &curves)
        );
        let loader = parse(&src, &LoadOptions::default());
        let channel = &loader.skeleton.joints[0].channel;

        assert_eq!(channel.keys, 2);
        assert!(channel.euler.is_none());
        let rotation = channel.rotation.as_ref().unwrap();
        assert!(rotation[1].angle_between(Quat::from_rotation_z(90f32.to_radians())) < 1e-5);
        let translation = channel.translation.as_ref().unwrap();
        assert_eq!(translation[1], Vec3::new(3.0, 5.0, 0.0));
        assert!(channel.scale.is_none());
        assert_eq!(channel.pose_at(1).scale, Vec3::ONE);
    }

    #[test]
    fn test_key_count_mismatch_is_fault() {
        let curves = format!(
            "{} {}",
            fcurve("rotx", &[0.0, 1.0]),
            fcurve("roty", &[0.0, 1.0, 2.0])
        );
        let src = format!("SI_Model MDL-Arm {{ {} }}", transform([0.0; 3], [0.0; 3], &curves));
        let options = LoadOptions::default();
        let mut loader = XsiLoader::new(&src, TextureCache::new(), &options).unwrap();
        loader.scan.expect_name("SI_Model").unwrap();
        assert!(loader.parse_model(ModelContext::root()).is_err());
    }

    #[test]
    fn test_pre_rotation_and_empty_curves_write_nothing() {
        let curves = format!("{} {}", fcurve("pcrotx", &[10.0]), fcurve("scly", &[]));
        let src = format!("SI_Model MDL-Arm {{ {} }}", transform([0.0; 3], [0.0; 3], &curves));
        let loader = parse(&src, &LoadOptions::default());
        let channel = &loader.skeleton.joints[0].channel;
        assert!(channel.is_static());
        assert_eq!(channel.keys, 1);
    }

    #[test]
    fn test_pre_rotation_key_count_mismatch_is_fault() {
        let curves = format!(
            "{} {}",
            fcurve("rotx", &[0.0, 1.0]),
            fcurve("pcroty", &[0.0, 1.0, 2.0])
        );
        let src = format!("SI_Model MDL-Arm {{ {} }}", transform([0.0; 3], [0.0; 3], &curves));
        let options = LoadOptions::default();
        let mut loader = XsiLoader::new(&src, TextureCache::new(), &options).unwrap();
        loader.scan.expect_name("SI_Model").unwrap();
        assert!(loader.parse_model(ModelContext::root()).is_err());
    }

    #[test]
    fn test_fractional_reserved_value_is_reported() {
        let src = format!(
            "SI_Model MDL-Arm {{ {} }}",
            transform([0.0; 3], [0.0; 3], "")
        );
        // first pivot component
        let src = src.replacen("1,1,1, 0, 0,", "1,1,1, 0, 0.5,", 1);
        let loader = parse(&src, &LoadOptions::default());
        assert_eq!(loader.diagnostics.len(), 1);
        assert!(loader.diagnostics[0].message.contains("unexpected data"));
    }

    #[test]
    fn test_mirrored_base_pose() {
        let src = format!(
            "SI_Model MDL-Arm {{ {} XSI_BasePose {{ 1,2,3, 0,0,0, 1,1,1, }} }}",
            transform([0.0; 3], [0.0; 3], "")
        );
        let loader = parse(&src, &LoadOptions::default().with_mirror_z(true));
        let base = loader.skeleton.joints[0].base_pose.unwrap();
        let origin = base.transform_point3(Vec3::ZERO);
        assert!((origin - Vec3::new(-1.0, -2.0, 3.0)).length() < 1e-6);
    }

    #[test]
    fn test_mirrored_transform() {
        let src = format!(
            "SI_Model MDL-Arm {{ {} }}",
            transform([1.0, 2.0, 3.0], [0.0; 3], "")
        );
        let loader = parse(&src, &LoadOptions::default().with_mirror_z(true));
        let joint = &loader.skeleton.joints[0];
        let origin = joint.static_pose.transform_point3(Vec3::ZERO);
        assert!((origin - Vec3::new(1.0, 2.0, -3.0)).length() < 1e-6);
        assert_eq!(joint.channel.start.translation, Vec3::new(1.0, 2.0, -3.0));
    }

    #[test]
    fn test_ignored_templates() {
        let src = "SI_Model MDL-Cam { \
            SI_Visibility { 0, } \
            SI_GlobalMaterial { \"Scene.Material\", \"BRANCH\", } \
            SI_Null MDL-Cam { } \
            SI_Camera Cam { 0,0,0, 0,0,-1, 0, 0.1, 1000, 45, } \
            SI_Light Sun { 1, 1,1,1, 0,-1,0, } \
            XSI_CustomPSet Props { \"NODE\", \"\", 2, \"Speed\", \"Floating Point Number\", 1.5, \
                XSI_CustomParamInfo Speed { 0, 10, 0, } \
                \"Label\", \"Text\", \"hi\", } \
            SI_Cluster Poly { \"POLY\", \"NORMAL\", \"MDL-Cam\", 2, 0, 1, XSI_ClusterInfo { \"Polygon\", } } \
            SI_IK_Root Root { { nested } } \
        }";
        let loader = parse(src, &LoadOptions::default());
        assert_eq!(loader.skeleton.len(), 1);
        assert!(loader.diagnostics.is_empty());
    }

    #[test]
    fn test_unknown_template_is_fault() {
        let options = LoadOptions::default();
        let mut loader =
            XsiLoader::new("SI_Model MDL-A { SI_Bogus { } }", TextureCache::new(), &options)
                .unwrap();
        loader.scan.expect_name("SI_Model").unwrap();
        assert!(loader.parse_model(ModelContext::root()).is_err());
    }
}
