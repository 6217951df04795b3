//! Intermediate records built while a dotXSI file is being translated.
//!
//! None of these outlive a load; the loader turns them into the renderer
//! types in [`crate::mesh`], [`crate::material`] and [`crate::skeleton`].

use xsi_math::Vec4;

use crate::mesh::Mesh;
use crate::skeleton::Track;
use crate::texture::TextureId;

/// Texture slots per material.
pub const MAX_TEXTURE_SLOTS: usize = 8;
/// Color channels per vertex.
pub const MAX_COLORS: usize = 2;
/// UV channels a polygon list may reference.
pub const MAX_UVS: usize = 8;
/// UV channels a cluster may select.
pub const MAX_TEXTURE_SPACES: usize = 2;

/// Role of a shape attribute, decided from its usage and type strings.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum AttributeKind {
    Position,
    Normal,
    /// Normal named `User_Normal`; carried but never fed into vertices
    UserNormal,
    TexCoord,
    Tangent,
    Color,
    WeightMap,
}

impl AttributeKind {
    pub fn classify(usage: &str, ty: &str, name: &str) -> Option<Self> {
        let kind = match (usage, ty) {
            ("POSITION", "FLOAT3") => AttributeKind::Position,
            ("NORMAL", "FLOAT3") if name == "User_Normal" => AttributeKind::UserNormal,
            ("NORMAL", "FLOAT3") => AttributeKind::Normal,
            ("TEXCOORD", "FLOAT2") => AttributeKind::TexCoord,
            ("TEXTANGENT", "FLOAT4") => AttributeKind::Tangent,
            ("COLOR", "FLOAT4") => AttributeKind::Color,
            ("WEIGHTMAP", "FLOAT") => AttributeKind::WeightMap,
            _ => return None,
        };
        Some(kind)
    }

    /// Floats stored per element.
    pub fn components(self) -> usize {
        match self {
            AttributeKind::Position | AttributeKind::Normal | AttributeKind::UserNormal => 3,
            AttributeKind::TexCoord => 2,
            AttributeKind::Tangent | AttributeKind::Color => 4,
            AttributeKind::WeightMap => 1,
        }
    }

    /// Whether the Z component flips under mirroring.
    pub fn is_spatial(self) -> bool {
        matches!(
            self,
            AttributeKind::Position
                | AttributeKind::Normal
                | AttributeKind::UserNormal
                | AttributeKind::Tangent
        )
    }
}

/// A typed per-shape data array. Its length is fixed by the declared count.
#[derive(Clone, Debug, PartialEq)]
pub struct Attribute {
    pub name: String,
    pub kind: AttributeKind,
    pub data: Vec<Vec4>,
}

/// Shader families whose parameters feed texture slots.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ShaderKind {
    OglMulti,
    ImageExplicit,
    Other,
}

impl ShaderKind {
    pub fn from_prog_id(prog_id: &str) -> Self {
        match prog_id {
            "Softimage.OGLMulti.1" | "Softimage.OGLMulti.1.0" => ShaderKind::OglMulti,
            "Softimage.txt2d-image-explicit.1" | "Softimage.txt2d-image-explicit.1.0" => {
                ShaderKind::ImageExplicit
            }
            _ => ShaderKind::Other,
        }
    }
}

/// A typed shader parameter value.
#[derive(Clone, Debug, PartialEq)]
pub enum ParamValue {
    Int(i32),
    Float(f32),
    Text(String),
}

/// Binds a texture slot to a named UV channel, optionally only for one mesh.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct TextureSpaceBinding {
    /// Model name the binding is scoped to, None for all meshes
    pub mesh: Option<String>,
    pub space: String,
}

#[derive(Clone, Debug, Default, PartialEq)]
pub struct TextureSlot {
    /// Image name connected to this slot
    pub name: String,
    pub enabled: bool,
    pub spaces: Vec<TextureSpaceBinding>,
    pub texture: Option<TextureId>,
}

/// A material as declared in the material library.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct XsiMaterial {
    pub name: String,
    pub slots: [TextureSlot; MAX_TEXTURE_SLOTS],
}

impl XsiMaterial {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Default::default()
        }
    }

    /// Whether any slot carries a texture-space binding.
    pub fn has_bindings(&self) -> bool {
        self.slots.iter().any(|s| !s.spaces.is_empty())
    }
}

/// An image library entry.
#[derive(Clone, Debug, PartialEq)]
pub struct XsiImage {
    pub name: String,
    pub file: String,
    /// Resolved lazily on first use
    pub texture: Option<TextureId>,
}

/// A model that owns geometry.
#[derive(Clone, Debug)]
pub struct XsiModel {
    pub name: String,
    /// Joint created for this model
    pub joint: usize,
    pub mesh: Mesh,
    /// Source position index of every vertex in `mesh`
    pub position_map: Vec<u32>,
}

/// A skin-weight list waiting for the full model tree.
#[derive(Clone, Debug, PartialEq)]
pub struct Envelope {
    pub model: String,
    pub joint: String,
    pub line: usize,
    /// (position index, weight)
    pub weights: Vec<(u32, f32)>,
}

/// Component driven by an animation curve.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum CurveComponent {
    Scale(usize),
    Rotation(usize),
    Translation(usize),
    /// Pre-rotation: parsed, never stored
    PreRotation(usize),
}

impl CurveComponent {
    pub fn parse(name: &str) -> Option<Self> {
        let last = name.chars().last()?;
        let prefix = &name[..name.len() - last.len_utf8()];
        let axis = match last {
            'x' => 0,
            'y' => 1,
            'z' => 2,
            _ => return None,
        };
        let component = match prefix {
            "scl" => CurveComponent::Scale(axis),
            "rot" => CurveComponent::Rotation(axis),
            "pos" => CurveComponent::Translation(axis),
            "pcrot" => CurveComponent::PreRotation(axis),
            _ => return None,
        };
        Some(component)
    }

    /// Target track and axis, None for components that are not stored.
    pub fn target(self) -> Option<(Track, usize)> {
        match self {
            CurveComponent::Scale(axis) => Some((Track::Scale, axis)),
            CurveComponent::Rotation(axis) => Some((Track::Rotation, axis)),
            CurveComponent::Translation(axis) => Some((Track::Translation, axis)),
            CurveComponent::PreRotation(_) => None,
        }
    }
}
