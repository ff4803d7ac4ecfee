//! Camera system

use glam::{Mat4, Quat, Vec3};

/// Perspective camera driven by Euler angles (degrees)
#[derive(Debug, Clone)]
pub struct Camera {
    pub position: Vec3,
    pub yaw: f32,
    pub pitch: f32,
    pub roll: f32,
    /// Vertical field of view in degrees
    pub fov: f32,
    pub near: f32,
    pub far: f32,
    pub aspect: f32,

    // Derived by `update_vectors`
    pub front: Vec3,
    pub right: Vec3,
    pub up: Vec3,
}

impl Default for Camera {
    fn default() -> Self {
        let mut camera = Self {
            position: Vec3::new(0.0, 3.5, 15.0),
            yaw: -90.0,
            pitch: 0.0,
            roll: 0.0,
            fov: 60.0,
            near: 0.1,
            far: 1000.0,
            aspect: 16.0 / 9.0,
            front: Vec3::NEG_Z,
            right: Vec3::X,
            up: Vec3::Y,
        };
        camera.update_vectors();
        camera
    }
}

impl Camera {
    pub fn new(aspect: f32) -> Self {
        Self {
            aspect,
            ..Default::default()
        }
    }

    /// Update aspect ratio from a surface size
    pub fn set_aspect(&mut self, width: f32, height: f32) {
        if height > 0.0 {
            self.aspect = width / height;
        }
    }

    /// Recompute `front`, `right` and `up` from yaw, pitch and roll
    pub fn update_vectors(&mut self) {
        let (yaw, pitch) = (self.yaw.to_radians(), self.pitch.to_radians());
        self.front = Vec3::new(
            yaw.cos() * pitch.cos(),
            pitch.sin(),
            yaw.sin() * pitch.cos(),
        )
        .normalize();

        let right = self.front.cross(Vec3::Y).try_normalize().unwrap_or(Vec3::X);
        let up = right.cross(self.front).normalize();

        if self.roll != 0.0 {
            let roll = Quat::from_axis_angle(self.front, self.roll.to_radians());
            self.right = roll * right;
            self.up = roll * up;
        } else {
            self.right = right;
            self.up = up;
        }
    }

    pub fn view_matrix(&self) -> Mat4 {
        Mat4::look_at_rh(self.position, self.position + self.front, self.up)
    }

    pub fn projection_matrix(&self) -> Mat4 {
        Mat4::perspective_rh(self.fov.to_radians(), self.aspect, self.near, self.far)
    }

    /// Get combined view-projection matrix
    pub fn view_projection_matrix(&self) -> Mat4 {
        self.projection_matrix() * self.view_matrix()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn approx(a: Vec3, b: Vec3) -> bool {
        (a - b).length() < 1e-5
    }

    #[test]
    fn test_default_looks_down_negative_z() {
        let camera = Camera::default();
        assert!(approx(camera.front, Vec3::NEG_Z));
        assert!(approx(camera.right, Vec3::X));
        assert!(approx(camera.up, Vec3::Y));
    }

    #[test]
    fn test_basis_is_orthonormal() {
        let mut camera = Camera::default();
        camera.yaw = 30.0;
        camera.pitch = -20.0;
        camera.update_vectors();

        assert!((camera.front.length() - 1.0).abs() < 1e-5);
        assert!(camera.front.dot(camera.right).abs() < 1e-5);
        assert!(camera.front.dot(camera.up).abs() < 1e-5);
        assert!(camera.right.dot(camera.up).abs() < 1e-5);
        // Right stays horizontal without roll
        assert!(camera.right.y.abs() < 1e-5);
    }

    #[test]
    fn test_pitch_up_raises_front() {
        let mut camera = Camera::default();
        camera.pitch = 45.0;
        camera.update_vectors();
        assert!(camera.front.y > 0.7);
    }

    #[test]
    fn test_view_maps_position_to_origin() {
        let camera = Camera::default();
        let p = camera.view_matrix().transform_point3(camera.position);
        assert!(approx(p, Vec3::ZERO));
    }
}
