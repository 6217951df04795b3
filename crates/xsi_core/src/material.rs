//! Renderer material produced by scene import.

use serde::Serialize;

use crate::texture::TextureId;

/// Suffix marking the skinned variant of a material.
pub const ANIM_SUFFIX: &str = "-anim";

/// Index into a mesh's material table.
pub type MaterialId = usize;

/// A simple real-time material: a diffuse layer and an optional reflection detail layer.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct Material {
    /// Material name (source name, `-anim` suffixed for skinned variants)
    pub name: String,

    /// Primary texture
    pub diffuse_texture: Option<TextureId>,

    /// Environment / reflection texture
    pub reflection_texture: Option<TextureId>,

    pub depth_test: bool,
    pub backface_cull: bool,

    /// Blend the reflection texture as a detail layer
    pub detail_reflection: bool,

    /// Drawn through the skinning path
    pub skinned: bool,
}

impl Default for Material {
    fn default() -> Self {
        Self {
            name: String::new(),
            diffuse_texture: None,
            reflection_texture: None,
            depth_test: true,
            backface_cull: true,
            detail_reflection: false,
            skinned: false,
        }
    }
}

impl Material {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Default::default()
        }
    }

    pub fn has_textures(&self) -> bool {
        self.diffuse_texture.is_some() || self.reflection_texture.is_some()
    }

    /// Whether this is the `-anim` variant of another material.
    pub fn is_anim_variant(&self) -> bool {
        is_anim_name(&self.name)
    }
}

pub fn is_anim_name(name: &str) -> bool {
    name.ends_with(ANIM_SUFFIX)
}

/// Name of the skinned variant of `name`.
pub fn anim_name(name: &str) -> String {
    format!("{name}{ANIM_SUFFIX}")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_material_state() {
        let m = Material::new("plain");
        assert!(m.depth_test && m.backface_cull);
        assert!(!m.has_textures());
        assert!(!m.is_anim_variant());
    }

    #[test]
    fn test_anim_names() {
        assert_eq!(anim_name("Skin"), "Skin-anim");
        assert!(is_anim_name("Skin-anim"));
        assert!(Material::new(anim_name("Skin")).is_anim_variant());
    }
}
