//! Scene management

mod camera;
mod camera_controller;
mod light;

pub use camera::*;
pub use camera_controller::*;
pub use light::*;

use crate::resources::ModelId;
use glam::{Mat4, Vec3};

/// A placed model
#[derive(Debug, Clone)]
pub struct Entity {
    pub world_matrix: Mat4,
    pub model: ModelId,
    /// Location of this entity's block in the linear uniform buffer, rewritten every frame
    pub local_params_offset: u64,
    pub local_params_size: u64,
}

impl Entity {
    pub fn new(model: ModelId) -> Self {
        Self {
            world_matrix: Mat4::IDENTITY,
            model,
            local_params_offset: 0,
            local_params_size: 0,
        }
    }

    pub fn with_translation(mut self, translation: Vec3) -> Self {
        self.translate(translation);
        self
    }

    pub fn with_scale(mut self, scale: Vec3) -> Self {
        self.scale(scale);
        self
    }

    /// Post-multiply a translation onto the world matrix
    pub fn translate(&mut self, translation: Vec3) {
        self.world_matrix *= Mat4::from_translation(translation);
    }

    /// Post-multiply a scale onto the world matrix
    pub fn scale(&mut self, scale: Vec3) {
        self.world_matrix *= Mat4::from_scale(scale);
    }

    pub fn translate_scale(&mut self, translation: Vec3, scale: Vec3) {
        self.translate(translation);
        self.scale(scale);
    }
}

/// The scene containing all renderable content
#[derive(Debug, Clone, Default)]
pub struct Scene {
    pub camera: Camera,
    pub lights: Vec<Light>,
    pub entities: Vec<Entity>,
}

impl Scene {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a point light to the scene
    pub fn add_point_light(&mut self, position: Vec3, color: Vec3, range: f32) {
        self.lights.push(Light::point(position, color, range));
    }

    /// Add a directional light to the scene
    pub fn add_directional_light(&mut self, direction: Vec3, color: Vec3) {
        self.lights.push(Light::directional(direction, color));
    }

    pub fn add_entity(&mut self, entity: Entity) -> usize {
        self.entities.push(entity);
        self.entities.len() - 1
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_translate_then_scale_post_multiplies() {
        let mut entity = Entity::new(ModelId(0));
        entity.translate_scale(Vec3::new(1.0, 2.0, 3.0), Vec3::splat(2.0));

        // Scale applies first to the point, then the translation
        let p = entity.world_matrix.transform_point3(Vec3::ONE);
        assert!((p - Vec3::new(3.0, 4.0, 5.0)).length() < 1e-5);
    }

    #[test]
    fn test_lights_are_added_in_order() {
        let mut scene = Scene::new();
        scene.add_point_light(Vec3::new(5.0, 2.0, 5.0), Vec3::ONE, 30.0);
        scene.add_directional_light(Vec3::new(0.0, -2.0, 0.0), Vec3::ONE);

        assert_eq!(scene.lights[0].kind, LightType::Point);
        assert_eq!(scene.lights[1].kind, LightType::Directional);
        assert!((scene.lights[1].direction - Vec3::NEG_Y).length() < 1e-5);
    }
}
