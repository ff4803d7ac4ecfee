//! Surface materials

use crate::resources::assets::TextureId;
use glam::Vec3;

/// Surface description used by the geometry pass
#[derive(Debug, Clone, PartialEq)]
pub struct Material {
    pub name: String,
    pub albedo: Vec3,
    pub emissive: Vec3,
    pub smoothness: f32,

    /// Texture slots, `None` means unset
    pub albedo_texture: Option<TextureId>,
    pub emissive_texture: Option<TextureId>,
    pub specular_texture: Option<TextureId>,
    pub normals_texture: Option<TextureId>,
    pub bump_texture: Option<TextureId>,
}

impl Default for Material {
    fn default() -> Self {
        Self {
            name: "default".to_string(),
            albedo: Vec3::ONE,
            emissive: Vec3::ZERO,
            smoothness: 0.0,
            albedo_texture: None,
            emissive_texture: None,
            specular_texture: None,
            normals_texture: None,
            bump_texture: None,
        }
    }
}

impl Material {
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            ..Default::default()
        }
    }

    pub fn with_albedo(mut self, color: Vec3) -> Self {
        self.albedo = color;
        self
    }

    pub fn with_albedo_texture(mut self, texture: TextureId) -> Self {
        self.albedo_texture = Some(texture);
        self
    }

    pub fn with_normals_texture(mut self, texture: TextureId) -> Self {
        self.normals_texture = Some(texture);
        self
    }

    pub fn with_bump_texture(mut self, texture: TextureId) -> Self {
        self.bump_texture = Some(texture);
        self
    }

    pub fn with_emissive(mut self, emissive: Vec3) -> Self {
        self.emissive = emissive;
        self
    }

    /// Imported specular exponents map onto `[0, 1]` smoothness over 256
    pub fn with_shininess(mut self, shininess: f32) -> Self {
        self.smoothness = shininess / 256.0;
        self
    }
}
