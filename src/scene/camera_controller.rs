//! Camera controller
//!
//! Keyboard-only free-fly control:
//! - WASD: move along front/right
//! - QE: move down/up along the camera's up vector
//! - V/C: turn yaw, R/F: turn pitch

use glam::Vec3;

use super::Camera;

/// Keys held this frame
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CameraInput {
    pub forward: bool,
    pub backward: bool,
    pub left: bool,
    pub right: bool,
    pub up: bool,
    pub down: bool,

    pub yaw_increase: bool,
    pub yaw_decrease: bool,
    pub pitch_increase: bool,
    pub pitch_decrease: bool,
}

impl CameraInput {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn any(&self) -> bool {
        *self != Self::default()
    }
}

/// Abstract camera controller trait
pub trait CameraController {
    /// Update the camera based on input and delta time
    fn update(&mut self, camera: &mut Camera, input: &CameraInput, dt: f32);

    /// Get the controller name for debugging
    fn name(&self) -> &'static str;

    /// Reset the controller to default state
    fn reset(&mut self);
}

/// Free-fly camera controller
pub struct FreeFlyController {
    /// Movement in units per second
    pub move_speed: f32,
    /// Rotation in degrees per second, as a multiple of `move_speed`
    pub turn_factor: f32,
}

impl Default for FreeFlyController {
    fn default() -> Self {
        Self {
            move_speed: 20.0,
            turn_factor: 2.0,
        }
    }
}

impl FreeFlyController {
    pub fn new() -> Self {
        Self::default()
    }

    /// Create with custom speed settings
    pub fn with_speed(mut self, speed: f32) -> Self {
        self.move_speed = speed;
        self
    }
}

impl CameraController for FreeFlyController {
    fn update(&mut self, camera: &mut Camera, input: &CameraInput, dt: f32) {
        let step = self.move_speed * dt;

        let mut offset = Vec3::ZERO;
        if input.forward {
            offset += camera.front;
        }
        if input.backward {
            offset -= camera.front;
        }
        if input.right {
            offset += camera.right;
        }
        if input.left {
            offset -= camera.right;
        }
        if input.up {
            offset += camera.up;
        }
        if input.down {
            offset -= camera.up;
        }
        camera.position += offset * step;

        let turn = step * self.turn_factor;
        if input.yaw_increase {
            camera.yaw += turn;
        }
        if input.yaw_decrease {
            camera.yaw -= turn;
        }
        if input.pitch_increase {
            camera.pitch += turn;
        }
        if input.pitch_decrease {
            camera.pitch -= turn;
        }
    }

    fn name(&self) -> &'static str {
        "FreeFly"
    }

    fn reset(&mut self) {
        *self = Self::default();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_forward_moves_along_front() {
        let mut camera = Camera::default();
        let start = camera.position;
        let mut controller = FreeFlyController::new();
        let input = CameraInput {
            forward: true,
            ..Default::default()
        };

        controller.update(&mut camera, &input, 0.5);
        assert!((camera.position - (start + camera.front * 10.0)).length() < 1e-4);
    }

    #[test]
    fn test_turn_rate_is_twice_move_speed() {
        let mut camera = Camera::default();
        let mut controller = FreeFlyController::new();
        let input = CameraInput {
            yaw_increase: true,
            pitch_decrease: true,
            ..Default::default()
        };

        controller.update(&mut camera, &input, 0.1);
        assert!((camera.yaw - (-90.0 + 4.0)).abs() < 1e-4);
        assert!((camera.pitch + 4.0).abs() < 1e-4);
    }

    #[test]
    fn test_opposite_keys_cancel() {
        let mut camera = Camera::default();
        let start = camera.position;
        let input = CameraInput {
            left: true,
            right: true,
            ..Default::default()
        };
        FreeFlyController::new().update(&mut camera, &input, 1.0);
        assert!((camera.position - start).length() < 1e-5);
        assert!(input.any());
    }
}
