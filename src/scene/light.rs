//! Light types for the scene

use glam::Vec3;

/// Light kind as seen by the shading program
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u32)]
pub enum LightType {
    Directional = 0,
    Point = 1,
}

impl LightType {
    pub fn as_u32(self) -> u32 {
        self as u32
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Light {
    pub position: Vec3,
    pub direction: Vec3,
    pub kind: LightType,
    pub color: Vec3,
    /// Attenuation range in world units. Truncated to an integer in the uniform block.
    pub range: f32,
}

impl Light {
    pub fn point(position: Vec3, color: Vec3, range: f32) -> Self {
        Self {
            position,
            direction: Vec3::ZERO,
            kind: LightType::Point,
            color,
            range,
        }
    }

    pub fn directional(direction: Vec3, color: Vec3) -> Self {
        Self {
            position: Vec3::ZERO,
            direction: direction.try_normalize().unwrap_or(Vec3::NEG_Y),
            kind: LightType::Directional,
            color,
            range: 0.0,
        }
    }
}
