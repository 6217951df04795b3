//! High-level dotXSI scene loading.
//!
//! This module provides the entry points that translate a dotXSI text file
//! into a master [`Mesh`]: the top-level block dispatch, the post-merge pass
//! and the load report.

use std::path::Path;

use serde::{Deserialize, Serialize};
use thiserror::Error;
use xsi_math::Mirror;

use super::model::ModelContext;
use super::scanner::{ParseError, ParseResult, Scanner, TokenKind};
use super::types::{Envelope, XsiImage, XsiMaterial, XsiModel};
use crate::material::Material;
use crate::mesh::{Mesh, Vertex};
use crate::skeleton::{Skeleton, DEFAULT_FRAME_RATE};
use crate::texture::TextureCache;

/// Errors that can occur during dotXSI loading.
#[derive(Error, Debug)]
pub enum LoadError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Parse error: {0}")]
    Parse(#[from] ParseError),
}

/// Result type for loading operations.
pub type LoadResult<T> = Result<T, LoadError>;

/// Oldest file version the loader accepts.
const MIN_VERSION: i64 = 500;

/// Import settings.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoadOptions {
    /// Bind every material through the skinning path
    pub force_animated_materials: bool,

    /// Upload every texture uncompressed
    pub force_rgb_textures: bool,

    /// Flip Z on all geometry, transforms and animation keys
    pub mirror_z: bool,

    /// Skip image decoding and use a checkerboard for every texture
    pub fast_load: bool,

    /// Playback rate the skeleton is normalised to
    pub frame_rate: f32,

    /// Bone palette limit for skinned clusters
    pub max_cluster_bones: usize,
}

impl Default for LoadOptions {
    fn default() -> Self {
        Self {
            force_animated_materials: false,
            force_rgb_textures: false,
            mirror_z: false,
            fast_load: false,
            frame_rate: DEFAULT_FRAME_RATE,
            max_cluster_bones: 74,
        }
    }
}

impl LoadOptions {
    pub fn with_force_animated_materials(mut self, force: bool) -> Self {
        self.force_animated_materials = force;
        self
    }

    pub fn with_force_rgb_textures(mut self, force: bool) -> Self {
        self.force_rgb_textures = force;
        self
    }

    pub fn with_mirror_z(mut self, mirror: bool) -> Self {
        self.mirror_z = mirror;
        self
    }

    pub fn with_fast_load(mut self, fast: bool) -> Self {
        self.fast_load = fast;
        self
    }

    pub fn with_frame_rate(mut self, frame_rate: f32) -> Self {
        self.frame_rate = frame_rate;
        self
    }

    pub fn with_max_cluster_bones(mut self, max_bones: usize) -> Self {
        self.max_cluster_bones = max_bones;
        self
    }

    pub fn mirror(&self) -> Mirror {
        if self.mirror_z {
            Mirror::FlipZ
        } else {
            Mirror::None
        }
    }
}

/// A tolerated input problem.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct Diagnostic {
    pub line: usize,
    pub message: String,
}

/// Summary of a successful load.
#[derive(Clone, Debug, Default, PartialEq, Serialize)]
pub struct LoadReport {
    /// Models that contributed geometry
    pub models: usize,
    pub joints: usize,
    pub clusters: usize,
    pub vertices: usize,
    pub faces: usize,
    pub triangles: usize,
    pub materials: usize,
    pub textures: usize,
    pub animated: bool,
    /// Animation length in seconds
    pub duration: f32,
    pub diagnostics: Vec<Diagnostic>,
}

/// Translation state for one file.
///
/// The grammar routines live in the sibling modules as further `impl` blocks.
pub(super) struct XsiLoader<'a> {
    pub(super) scan: Scanner<'a>,
    pub(super) options: LoadOptions,
    pub(super) mirror: Mirror,
    pub(super) textures: TextureCache,

    pub(super) materials: Vec<XsiMaterial>,
    pub(super) images: Vec<XsiImage>,
    /// Renderer materials; cluster material ids index this list
    pub(super) out_materials: Vec<Material>,
    /// Declared materials already turned into renderer materials
    pub(super) connected: usize,
    pub(super) default_material: bool,

    pub(super) skeleton: Skeleton,
    pub(super) models: Vec<XsiModel>,
    pub(super) envelopes: Vec<Envelope>,
    pub(super) diagnostics: Vec<Diagnostic>,
}

impl<'a> XsiLoader<'a> {
    pub(super) fn new(
        src: &'a str,
        textures: TextureCache,
        options: &LoadOptions,
    ) -> ParseResult<Self> {
        Ok(Self {
            scan: Scanner::new(src)?,
            options: options.clone(),
            mirror: options.mirror(),
            textures,
            materials: Vec::new(),
            images: Vec::new(),
            out_materials: Vec::new(),
            connected: 0,
            default_material: false,
            skeleton: Skeleton::default(),
            models: Vec::new(),
            envelopes: Vec::new(),
            diagnostics: Vec::new(),
        })
    }

    /// Record a tolerated problem at the current line.
    pub(super) fn warn(&mut self, message: impl Into<String>) {
        let line = self.scan.line();
        self.warn_at(line, message);
    }

    pub(super) fn warn_at(&mut self, line: usize, message: impl Into<String>) {
        let message = message.into();
        log::warn!("line {}: {}", line, message);
        self.diagnostics.push(Diagnostic { line, message });
    }

    fn parse_header(&mut self) -> ParseResult<()> {
        if !self.scan.if_name("xsi")? || self.scan.kind() != TokenKind::Int {
            return Err(self.scan.error("header error"));
        }
        let version = self.scan.scan_uint()?;
        if !self.scan.if_name("txt")? || self.scan.kind() != TokenKind::Int {
            return Err(self.scan.error("header error"));
        }
        let bits = self.scan.scan_uint()?;

        if version < MIN_VERSION || bits != 32 {
            return Err(self.scan.error(format!(
                "header error: version {version} with {bits} bits is not supported"
            )));
        }
        log::debug!("dotXSI version {} ({}-bit)", version, bits);
        Ok(())
    }

    /// Header followed by top-level templates in document order.
    fn parse_global(&mut self) -> ParseResult<()> {
        self.parse_header()?;

        while !self.scan.at_end() {
            if self.scan.kind() != TokenKind::Name {
                return Err(self.scan.error("XSI template expected"));
            }
            let template = self.scan.scan_name()?;
            match template {
                "SI_FileInfo" => self.fixed_block(|s| s.skip_strings(4))?,
                "SI_Scene" => self.fixed_block(|s| {
                    s.scan_string()?;
                    s.skip_floats(3)
                })?,
                "SI_CoordinateSystem" => self.fixed_block(|s| s.skip_ints(6))?,
                "SI_Angle" => self.fixed_block(|s| s.skip_ints(1))?,
                "SI_Ambience" => self.fixed_block(|s| s.skip_floats(3))?,
                "SI_MaterialLibrary" => self.parse_material_library()?,
                "XSI_ImageLibrary" => self.parse_image_library()?,
                "SI_Model" => self.parse_model(ModelContext::root())?,
                "SI_EnvelopeList" => self.parse_envelope_list()?,
                other => {
                    return Err(self.scan.error(format!("XSI template expected, found '{other}'")))
                }
            }
        }
        Ok(())
    }

    /// `[name] { body }` where the body has a fixed layout.
    fn fixed_block(
        &mut self,
        body: impl FnOnce(&mut Scanner<'a>) -> ParseResult<()>,
    ) -> ParseResult<()> {
        if self.scan.kind() == TokenKind::Name {
            self.scan.scan_xsi_name()?;
        }
        self.scan.expect_punct('{')?;
        body(&mut self.scan)?;
        self.scan.expect_punct('}')
    }

    /// Bind or bake every retained model.
    ///
    /// Vertices of clusters drawn through the skinning path that no envelope
    /// touched are bound rigidly to the model's joint. A model with no skinned
    /// cluster and no influences has its joint's static pose baked in.
    fn fix_animated_clusters(&mut self) {
        for model in &mut self.models {
            let mesh = &mut model.mesh;
            let skinned: Vec<bool> = mesh
                .clusters
                .iter()
                .map(|c| self.out_materials.get(c.material).is_some_and(|m| m.skinned))
                .collect();

            if skinned.iter().any(|&s| s) {
                let mut bind = vec![false; mesh.vertices.len()];
                for face in mesh.faces.iter().filter(|f| skinned.get(f.cluster) == Some(&true)) {
                    for &corner in face.corners() {
                        bind[corner as usize] = true;
                    }
                }
                for (v, bind) in mesh.vertices.iter_mut().zip(bind) {
                    if bind && !v.has_influence() {
                        v.set_rigid(model.joint);
                    }
                }
            } else if !mesh.vertices.iter().any(Vertex::has_influence) {
                if let Some(joint) = self.skeleton.joints.get(model.joint) {
                    mesh.transform(&joint.static_pose);
                }
            }
        }
    }

    /// Merge every retained model into one mesh and summarize it.
    fn finish(mut self) -> ParseResult<(Mesh, LoadReport)> {
        self.connect_materials()?;
        self.resolve_envelopes();
        self.fix_animated_clusters();

        let mut staging = Mesh::new("xsi");
        staging.materials = std::mem::take(&mut self.out_materials);
        staging.textures = std::mem::take(&mut self.textures).into_textures();

        let models = std::mem::take(&mut self.models);
        let model_count = models.len();
        for model in models {
            staging.append_shared(model.mesh);
        }

        staging.merge_clusters();
        staging.merge_vertices();
        staging.prune_materials();

        let mut skeleton = std::mem::take(&mut self.skeleton);
        if !skeleton.is_empty() {
            let rate = if self.options.frame_rate > 0.0 {
                self.options.frame_rate
            } else {
                DEFAULT_FRAME_RATE
            };
            skeleton.fix_time(1.0 / rate);
            staging.skeleton = Some(skeleton);
        }
        staging.split_clusters_for_skinning(self.options.max_cluster_bones);

        let (joints, animated, duration) = staging
            .skeleton
            .as_ref()
            .map_or((0, false, 0.0), |s| (s.len(), s.is_animated(), s.duration()));

        let report = LoadReport {
            models: model_count,
            joints,
            clusters: staging.clusters.len(),
            vertices: staging.vertices.len(),
            faces: staging.faces.len(),
            triangles: staging.triangle_count(),
            materials: staging.materials.len(),
            textures: staging.textures.len(),
            animated,
            duration,
            diagnostics: self.diagnostics,
        };
        Ok((staging, report))
    }
}

/// Load a dotXSI file and append its contents to `master`.
///
/// Images are resolved relative to the file's directory. On failure `master`
/// is left untouched.
///
/// # Example
///
/// ```ignore
/// use xsi_core::{load_xsi, LoadOptions, Mesh};
///
/// let mut mesh = Mesh::new("scene");
/// let report = load_xsi(&mut mesh, "character.xsi", &LoadOptions::default())?;
/// println!("Loaded {} clusters", report.clusters);
/// ```
pub fn load_xsi<P: AsRef<Path>>(
    master: &mut Mesh,
    path: P,
    options: &LoadOptions,
) -> LoadResult<LoadReport> {
    let path = path.as_ref();
    log::info!("Loading dotXSI: {}", path.display());

    let bytes = std::fs::read(path)?;
    let content = String::from_utf8_lossy(&bytes);
    let textures = match path.parent() {
        Some(dir) => TextureCache::with_base_dir(dir),
        None => TextureCache::new(),
    };

    let report = load_xsi_from_string(master, &content, textures, options)?;
    log::info!(
        "Loaded {}: {} models, {} joints, {} vertices, {} triangles, {} diagnostics",
        path.display(),
        report.models,
        report.joints,
        report.vertices,
        report.triangles,
        report.diagnostics.len()
    );
    Ok(report)
}

/// Load dotXSI text and append its contents to `master`.
///
/// `textures` supplies the image decoder and base directory.
pub fn load_xsi_from_string(
    master: &mut Mesh,
    content: &str,
    mut textures: TextureCache,
    options: &LoadOptions,
) -> LoadResult<LoadReport> {
    textures.set_fast_load(options.fast_load);

    let mut loader = XsiLoader::new(content, textures, options)?;
    loader.parse_global()?;
    let (mesh, report) = loader.finish()?;

    master.append(mesh);
    Ok(report)
}
