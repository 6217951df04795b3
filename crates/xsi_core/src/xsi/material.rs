//! Material and image libraries.
//!
//! Shader parameters are folded into texture slots as they are parsed.
//! Renderer materials are produced later by [`XsiLoader::connect_materials`],
//! once the images they reference are known.

use super::loader::XsiLoader;
use super::scanner::{ParseResult, TokenKind};
use super::types::{
    ParamValue, ShaderKind, TextureSpaceBinding, XsiImage, XsiMaterial, MAX_TEXTURE_SLOTS,
    MAX_TEXTURE_SPACES,
};
use crate::material::{anim_name, is_anim_name, Material, MaterialId};
use crate::texture::{TextureId, WHITE_PLACEHOLDER};

/// Material used by clusters that name an undeclared material.
pub const DEFAULT_MATERIAL: &str = "***Default";

impl XsiMaterial {
    fn set_param(&mut self, shader: ShaderKind, para: &str, value: &ParamValue) {
        match value {
            ParamValue::Int(v) if shader == ShaderKind::OglMulti => {
                if let Some(slot) = slot_number(para, "Texture_", "_Enable") {
                    self.slots[slot].enabled = *v != 0;
                }
            }
            ParamValue::Text(space) => self.bind_space(shader, para, None, space),
            _ => {}
        }
    }

    fn connect(&mut self, shader: ShaderKind, para: &str, source: &str) {
        if shader != ShaderKind::OglMulti {
            return;
        }
        if let Some(slot) = slot_number(para, "Texture_", "") {
            self.slots[slot].name = source.to_string();
        }
    }

    fn bind_space(&mut self, shader: ShaderKind, para: &str, mesh: Option<&str>, space: &str) {
        if space.is_empty() {
            return;
        }
        let slot = match shader {
            ShaderKind::OglMulti => slot_number(para, "tspace_id", ""),
            ShaderKind::ImageExplicit => (para == "tspace_id").then_some(0),
            ShaderKind::Other => None,
        };
        if let Some(slot) = slot {
            self.slots[slot].spaces.push(TextureSpaceBinding {
                mesh: mesh.map(str::to_string),
                space: space.to_string(),
            });
        }
    }
}

/// Zero-based slot of a parameter such as `Texture_3_Enable`. Slots count from 1.
fn slot_number(para: &str, prefix: &str, suffix: &str) -> Option<usize> {
    let digits = para.strip_prefix(prefix)?.strip_suffix(suffix)?;
    if digits.is_empty() || !digits.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    let number: usize = digits.parse().ok()?;
    (1..=MAX_TEXTURE_SLOTS).contains(&number).then(|| number - 1)
}

/// UV channels selected for one cluster.
#[derive(Debug, Default, PartialEq)]
pub(super) struct SpaceSelection {
    /// Indices into the cluster's UV channel list, feeding `uv0` then `uv1`
    pub channels: Vec<usize>,
    pub warnings: Vec<String>,
}

/// Pick the UV channels a cluster of `model` uses for `material`.
///
/// For every slot with bindings, the last binding scoped to the model wins,
/// then the last unscoped one. Spaces missing from `uv_names` are skipped
/// with a warning. When nothing matches the first UV channel is used. More
/// than two distinct spaces is an error.
pub(super) fn select_texture_spaces(
    material: Option<&XsiMaterial>,
    model: &str,
    uv_names: &[&str],
) -> Result<SpaceSelection, String> {
    let mut selection = SpaceSelection::default();

    if let Some(material) = material {
        for slot in material.slots.iter().filter(|s| !s.spaces.is_empty()) {
            let binding = slot
                .spaces
                .iter()
                .rev()
                .find(|b| b.mesh.as_deref().is_some_and(|m| m.eq_ignore_ascii_case(model)))
                .or_else(|| slot.spaces.iter().rev().find(|b| b.mesh.is_none()));

            let Some(binding) = binding else {
                selection.warnings.push(format!(
                    "no texture space for model {} / material {} / texture {}",
                    model, material.name, slot.name
                ));
                continue;
            };
            let Some(channel) = uv_names.iter().position(|n| *n == binding.space) else {
                selection.warnings.push(format!(
                    "texture space {} not found on model {} / material {}",
                    binding.space, model, material.name
                ));
                continue;
            };

            if selection.channels.contains(&channel) {
                continue;
            }
            if selection.channels.len() == MAX_TEXTURE_SPACES {
                return Err(format!(
                    "too many texture spaces in cluster of model {} / material {}",
                    model, material.name
                ));
            }
            selection.channels.push(channel);
        }
    }

    if selection.channels.is_empty() && !uv_names.is_empty() {
        if material.is_some_and(XsiMaterial::has_bindings) {
            selection
                .warnings
                .push(format!("model {model}: falling back to UV channel {}", uv_names[0]));
        }
        selection.channels.push(0);
    }
    Ok(selection)
}

impl XsiLoader<'_> {
    /// `SI_MaterialLibrary [name] { count, XSI_Material* }`
    pub(super) fn parse_material_library(&mut self) -> ParseResult<()> {
        if self.scan.kind() == TokenKind::Name {
            self.scan.scan_xsi_name()?;
        }
        self.scan.expect_punct('{')?;
        let count = self.scan.scan_count()?;
        for _ in 0..count {
            self.scan.expect_name("XSI_Material")?;
            self.parse_material()?;
        }
        self.scan.expect_punct('}')
    }

    fn parse_material(&mut self) -> ParseResult<()> {
        let mut material = XsiMaterial::new(self.scan.scan_xsi_name()?);
        log::debug!("Found material {}", material.name);
        self.scan.expect_punct('{')?;

        let bindings = self.scan.scan_count()?;
        let (mut last, mut surface, mut realtime) = (None, None, None);
        for _ in 0..bindings {
            let port = self.scan.scan_string()?;
            let shader = self.scan.scan_string()?;
            match port.as_str() {
                "surface" => surface = Some(shader.clone()),
                "RealTime" => realtime = Some(shader.clone()),
                _ => {}
            }
            last = Some(shader);
        }
        if let Some(best) = realtime.or(surface).or(last) {
            log::debug!("Material {} is drawn with shader {}", material.name, best);
        }

        while !self.scan.is_punct('}') {
            if self.scan.if_name("XSI_MaterialInfo")? {
                self.scan.expect_punct('{')?;
                self.scan.skip_ints(2)?;
                self.scan.expect_punct('}')?;
            } else if self.scan.if_name("XSI_Shader")? {
                self.parse_shader(&mut material)?;
            } else if self.scan.if_name("XSI_ShaderMultiPortConnection")? {
                self.skip_port_connection()?;
            } else {
                return Err(self.scan.error("XSI_Shader expected"));
            }
        }
        self.scan.expect_punct('}')?;

        self.materials.push(material);
        Ok(())
    }

    fn parse_shader(&mut self, material: &mut XsiMaterial) -> ParseResult<()> {
        let instance = self.scan.scan_xsi_name()?;
        let realtime = instance
            .get(..3)
            .is_some_and(|prefix| prefix.eq_ignore_ascii_case("OGL"));
        self.scan.expect_punct('{')?;

        let prog_id = self.scan.scan_string()?;
        // Parameters of other shaders are read but have no effect
        let shader = if realtime {
            ShaderKind::from_prog_id(&prog_id)
        } else {
            ShaderKind::Other
        };

        self.scan.scan_int()?;
        let params = self.scan.scan_count()?;
        let connects = self.scan.scan_count()?;

        for _ in 0..params {
            let para = self.scan.scan_string()?;
            let ty = self.scan.scan_string()?;
            let value = match ty.as_str() {
                "BOOLEAN" | "BYTE" | "INTEGER" => ParamValue::Int(self.scan.scan_int()?),
                "FLOAT" => ParamValue::Float(self.scan.scan_float()?),
                "STRING" | "TEXT" => ParamValue::Text(self.scan.scan_string()?),
                other => {
                    return Err(self
                        .scan
                        .error(format!("unknown type {other} in material parameters")))
                }
            };
            material.set_param(shader, &para, &value);
        }

        for _ in 0..connects {
            let para = self.scan.scan_string()?;
            let source = self.scan.scan_string()?;
            self.scan.scan_string()?;
            material.connect(shader, &para, &source);
        }

        while !self.scan.is_punct('}') {
            if self.scan.if_name("XSI_ShaderInstanceData")? {
                self.scan.expect_punct('{')?;
                let scope = format!("MDL-{}", self.scan.scan_string()?);
                let count = self.scan.scan_count()?;
                for _ in 0..count {
                    let para = self.scan.scan_string()?;
                    self.scan.scan_string()?;
                    let space = self.scan.scan_string()?;
                    material.bind_space(shader, &para, Some(&scope), &space);
                }
                self.scan.expect_punct('}')?;
            } else if self.scan.if_name("XSI_CustomPSet")? {
                self.scan.skip_section()?;
            } else if self.scan.if_name("SI_FCurve")? {
                self.skip_fcurve()?;
            } else if self.scan.if_name("XSI_ShaderMultiPortConnection")? {
                self.skip_port_connection()?;
            } else {
                return Err(self.scan.error("XSI_ShaderInstanceData expected"));
            }
        }
        self.scan.expect_punct('}')
    }

    fn skip_port_connection(&mut self) -> ParseResult<()> {
        self.scan.expect_punct('{')?;
        self.scan.skip_strings(2)?;
        self.scan.expect_punct('}')
    }

    /// `XSI_ImageLibrary [name] { count, XSI_Image* }`
    pub(super) fn parse_image_library(&mut self) -> ParseResult<()> {
        if self.scan.kind() == TokenKind::Name {
            self.scan.scan_xsi_name()?;
        }
        self.scan.expect_punct('{')?;
        let count = self.scan.scan_count()?;
        for _ in 0..count {
            self.scan.expect_name("XSI_Image")?;
            self.parse_image()?;
        }
        self.scan.expect_punct('}')
    }

    fn parse_image(&mut self) -> ParseResult<()> {
        let name = self.scan.scan_xsi_name()?;
        self.scan.expect_punct('{')?;
        let file = self.scan.scan_string()?;
        self.scan.skip_ints(4)?;
        self.scan.skip_floats(5)?;
        self.scan.skip_ints(3)?;
        self.images.push(XsiImage {
            name,
            file,
            texture: None,
        });

        while !self.scan.is_punct('}') {
            if self.scan.if_name("XSI_ImageFX")?
                || self.scan.if_name("XSI_ImageFX2")?
                || self.scan.if_name("XSI_TimeControl")?
            {
                self.scan.skip_section()?;
            } else {
                return Err(self.scan.error("unexpected token in XSI_Image"));
            }
        }
        self.scan.expect_punct('}')
    }

    /// Turn newly declared materials into renderer materials.
    ///
    /// Called before every model so its clusters can reference them, and once
    /// more after the document for libraries declared late. Each material also
    /// gets a skinned `-anim` variant unless skinning is forced, the name is
    /// already a variant, or the variant is declared itself.
    pub(super) fn connect_materials(&mut self) -> ParseResult<()> {
        while self.connected < self.materials.len() {
            let index = self.connected;
            self.connected += 1;

            for slot in 0..MAX_TEXTURE_SLOTS {
                let name = &self.materials[index].slots[slot].name;
                if name.is_empty() {
                    continue;
                }
                let Some(image) = self.images.iter().position(|i| i.name == *name) else {
                    return Err(self.scan.error(format!(
                        "could not find texture <{}> in material <{}>",
                        name, self.materials[index].name
                    )));
                };
                let texture = self.image_texture(image);
                self.materials[index].slots[slot].texture = Some(texture);
            }

            let name = self.materials[index].name.clone();
            let material = self.make_material(index, name.clone(), false);
            self.out_materials.push(material);

            let variant = anim_name(&name);
            if !self.options.force_animated_materials
                && !is_anim_name(&name)
                && !self.materials.iter().any(|m| m.name == variant)
            {
                let material = self.make_material(index, variant, true);
                self.out_materials.push(material);
            }
        }
        Ok(())
    }

    /// Texture of an image, loaded on first use.
    fn image_texture(&mut self, image: usize) -> TextureId {
        if let Some(id) = self.images[image].texture {
            return id;
        }
        let file = self.images[image].file.clone();
        let id = self.textures.resolve(&file, self.options.force_rgb_textures);
        if self.textures.get(id).is_some_and(|t| t.missing) {
            let message = format!(
                "image {} ({}) could not be loaded, using placeholder",
                self.images[image].name, file
            );
            self.warn(message);
        }
        self.images[image].texture = Some(id);
        id
    }

    /// Build a renderer material from a declared material's resolved slots.
    ///
    /// A slot named `-diff` is the diffuse layer and `-envi` the reflection
    /// layer. Outside slot 0 an `envy` name is always the reflection layer.
    /// Reflection without diffuse gets a white diffuse texture.
    fn make_material(&mut self, index: usize, name: String, skinned: bool) -> Material {
        let mut material = Material::new(name);
        material.skinned =
            skinned || self.options.force_animated_materials || is_anim_name(&material.name);

        let mut used = Vec::new();
        for (i, slot) in self.materials[index].slots.iter().enumerate() {
            let Some(texture) = slot.texture else {
                continue;
            };
            used.push(slot.name.as_str());

            let envy = i > 0 && slot.name.contains("envy");
            if slot.name.contains("-diff") && !envy {
                material.diffuse_texture = Some(texture);
            }
            if slot.name.contains("-envi") || envy {
                material.reflection_texture = Some(texture);
                material.detail_reflection = true;
            }
        }
        log::debug!("Material {} <{}>", material.name, used.join(","));

        if material.reflection_texture.is_some() && material.diffuse_texture.is_none() {
            let white = self
                .textures
                .resolve(WHITE_PLACEHOLDER, self.options.force_rgb_textures);
            material.diffuse_texture = Some(white);
        }
        material
    }

    fn ensure_default_material(&mut self) {
        if self.default_material {
            return;
        }
        self.default_material = true;

        let force = self.options.force_animated_materials;
        self.out_materials.push(Material {
            skinned: force,
            ..Material::new(DEFAULT_MATERIAL)
        });
        if !force {
            self.out_materials.push(Material {
                skinned: true,
                ..Material::new(anim_name(DEFAULT_MATERIAL))
            });
        }
    }

    /// Resolve the material a polygon list names.
    ///
    /// Returns the declared material (None for the default) and the renderer
    /// material, using the `-anim` variant for animated models.
    pub(super) fn cluster_material(
        &mut self,
        name: &str,
        animated: bool,
    ) -> ParseResult<(Option<usize>, MaterialId)> {
        let declared = self.materials.iter().position(|m| m.name == name);
        let base = match declared {
            Some(_) => name.to_string(),
            None => {
                self.warn(format!("unknown material <{name}>, using {DEFAULT_MATERIAL}"));
                self.ensure_default_material();
                DEFAULT_MATERIAL.to_string()
            }
        };

        let wanted = if animated && !self.options.force_animated_materials && !is_anim_name(&base)
        {
            anim_name(&base)
        } else {
            base
        };
        match self.out_materials.iter().position(|m| m.name == wanted) {
            Some(id) => Ok((declared, id)),
            None => Err(self.scan.error(format!("material <{wanted}> not found"))),
        }
    }
}

#[cfg(test)]
mod tests {
    use std::path::Path;

    use super::*;
    use crate::texture::{Texture, TextureCache, TextureResult};
    use crate::xsi::loader::LoadOptions;

    fn gray(_path: &Path) -> TextureResult<Texture> {
        Ok(Texture::filled(4, 4, [0.5, 0.5, 0.5, 1.0]))
    }

    /// Parse image and material libraries, then build renderer materials.
    fn connected<'a>(src: &'a str, options: &LoadOptions) -> XsiLoader<'a> {
        let textures = TextureCache::new().with_source(gray);
        let mut loader = XsiLoader::new(src, textures, options).unwrap();
        while !loader.scan.at_end() {
            if loader.scan.if_name("XSI_ImageLibrary").unwrap() {
                loader.parse_image_library().unwrap();
            } else {
                loader.scan.expect_name("SI_MaterialLibrary").unwrap();
                loader.parse_material_library().unwrap();
            }
        }
        loader.connect_materials().unwrap();
        loader
    }

    fn binding(mesh: Option<&str>, space: &str) -> TextureSpaceBinding {
        TextureSpaceBinding {
            mesh: mesh.map(str::to_string),
            space: space.to_string(),
        }
    }

    #[test]
    fn test_slot_number() {
        assert_eq!(slot_number("Texture_1", "Texture_", ""), Some(0));
        assert_eq!(slot_number("Texture_4_Enable", "Texture_", "_Enable"), Some(3));
        assert_eq!(slot_number("Texture_1_Enable", "Texture_", ""), None);
        assert_eq!(slot_number("Texture_9", "Texture_", ""), None);
        assert_eq!(slot_number("tspace_id", "tspace_id", ""), None);
        assert_eq!(slot_number("tspace_id+2", "tspace_id", ""), None);
    }

    #[test]
    fn test_shader_params_fill_slots() {
        let mut m = XsiMaterial::new("Skin");
        let multi = ShaderKind::OglMulti;
        m.connect(multi, "Texture_2", "skin-diff");
        m.set_param(multi, "Texture_2_Enable", &ParamValue::Int(1));
        m.set_param(multi, "tspace_id2", &ParamValue::Text("Texture_Projection".into()));
        m.set_param(multi, "tspace_id3", &ParamValue::Text(String::new()));
        m.bind_space(
            ShaderKind::ImageExplicit,
            "tspace_id",
            Some("MDL-Arm"),
            "uv_arm",
        );
        m.connect(ShaderKind::Other, "Texture_1", "ignored");

        assert_eq!(m.slots[1].name, "skin-diff");
        assert!(m.slots[1].enabled);
        assert_eq!(m.slots[1].spaces, vec![binding(None, "Texture_Projection")]);
        assert!(m.slots[2].spaces.is_empty());
        assert_eq!(m.slots[0].spaces, vec![binding(Some("MDL-Arm"), "uv_arm")]);
        assert!(m.slots[0].name.is_empty());
    }

    #[test]
    fn test_scoped_binding_wins() {
        let mut m = XsiMaterial::new("Skin");
        m.slots[0].spaces = vec![
            binding(Some("mdl-arm"), "uv_arm"),
            binding(None, "uv_default"),
            binding(Some("MDL-Leg"), "uv_leg"),
        ];
        let uvs = ["uv_default", "uv_arm", "uv_leg"];

        let arm = select_texture_spaces(Some(&m), "MDL-Arm", &uvs).unwrap();
        assert_eq!(arm.channels, vec![1]);
        let torso = select_texture_spaces(Some(&m), "MDL-Torso", &uvs).unwrap();
        assert_eq!(torso.channels, vec![0]);
        assert!(torso.warnings.is_empty());
    }

    #[test]
    fn test_missing_space_falls_back_to_first_channel() {
        let mut m = XsiMaterial::new("Skin");
        m.slots[0].spaces = vec![binding(None, "gone")];
        let selection = select_texture_spaces(Some(&m), "MDL-Arm", &["uv_a", "uv_b"]).unwrap();
        assert_eq!(selection.channels, vec![0]);
        assert_eq!(selection.warnings.len(), 2);

        let plain = select_texture_spaces(None, "MDL-Arm", &["uv_a"]).unwrap();
        assert_eq!(plain.channels, vec![0]);
        assert!(plain.warnings.is_empty());

        let no_uvs = select_texture_spaces(Some(&m), "MDL-Arm", &[]).unwrap();
        assert!(no_uvs.channels.is_empty());
    }

    #[test]
    fn test_two_spaces_at_most() {
        let mut m = XsiMaterial::new("Layered");
        m.slots[0].spaces = vec![binding(None, "a")];
        m.slots[1].spaces = vec![binding(None, "b")];
        m.slots[2].spaces = vec![binding(None, "a")];
        let uvs = ["a", "b", "c"];
        assert_eq!(
            select_texture_spaces(Some(&m), "MDL-X", &uvs).unwrap().channels,
            vec![0, 1]
        );

        m.slots[3].spaces = vec![binding(None, "c")];
        assert!(select_texture_spaces(Some(&m), "MDL-X", &uvs).is_err());
    }

    #[test]
    fn test_reflection_layers() {
        let src = "XSI_ImageLibrary { 3,\n \
            XSI_Image brick-diff { \"textures/brick-diff.png\", 4,4,3,8, 0,1,0,1,0, 0,0,0, }\n \
            XSI_Image chrome-envy { \"textures/chrome-envy.png\", 4,4,3,8, 0,1,0,1,0, 0,0,0, }\n \
            XSI_Image sky-envi { \"textures/sky-envi.png\", 4,4,3,8, 0,1,0,1,0, 0,0,0, }\n}\n\
            SI_MaterialLibrary { 2,\n \
            XSI_Material Chrome { 1, \"RealTime\", \"Chrome.OGLMulti\",\n  \
                XSI_Shader OGLMulti { \"Softimage.OGLMulti.1.0\", 0, 0, 2,\n   \
                \"Texture_1\", \"brick-diff\", \"IMAGE\",\n   \
                \"Texture_2\", \"chrome-envy\", \"IMAGE\", }\n }\n \
            XSI_Material Sky { 1, \"RealTime\", \"Sky.OGLMulti\",\n  \
                XSI_Shader OGLMulti { \"Softimage.OGLMulti.1.0\", 0, 0, 1,\n   \
                \"Texture_1\", \"sky-envi\", \"IMAGE\", }\n }\n}\n";
        let loader = connected(src, &LoadOptions::default());
        let textures = loader.textures.textures();
        let name = |id: Option<TextureId>| id.map(|id| textures[id].name.as_str());

        let chrome = &loader.out_materials[0];
        assert_eq!(chrome.name, "Chrome");
        assert_eq!(name(chrome.diffuse_texture), Some("brick-diff"));
        assert_eq!(name(chrome.reflection_texture), Some("chrome-envy"));
        assert!(chrome.detail_reflection);

        let sky = &loader.out_materials[2];
        assert_eq!(sky.name, "Sky");
        assert_eq!(name(sky.reflection_texture), Some("sky-envi"));
        assert!(sky.detail_reflection);
        let white = &textures[sky.diffuse_texture.unwrap()];
        assert_eq!((white.width, white.height), (1, 1));
        assert_eq!(white.pixels[0], [1.0; 4]);
        assert!(!white.missing);
        assert!(loader.diagnostics.is_empty());
    }

    #[test]
    fn test_declared_anim_variant_is_not_duplicated() {
        let src = "SI_MaterialLibrary { 3,\n \
            XSI_Material Skin { 0, }\n \
            XSI_Material Skin-anim { 0, }\n \
            XSI_Material Rock { 0, }\n}\n";
        let loader = connected(src, &LoadOptions::default());
        let names: Vec<_> = loader.out_materials.iter().map(|m| m.name.as_str()).collect();
        assert_eq!(names, ["Skin", "Skin-anim", "Rock", "Rock-anim"]);
        let skinned: Vec<_> = loader.out_materials.iter().map(|m| m.skinned).collect();
        assert_eq!(skinned, [false, true, false, true]);
    }
}
