use std::f32::consts::FRAC_PI_2;

use glam::{Mat4, Quat, Vec3};
use serde::{Deserialize, Serialize};

use crate::input::FrameControls;

/// Position, Euler rotation (radians) and scale of an object in the world.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Transform {
    pub position: Vec3,
    pub rotation: Vec3,
    pub scale: Vec3,
}

impl Default for Transform {
    fn default() -> Self {
        Self {
            position: Vec3::ZERO,
            rotation: Vec3::ZERO,
            scale: Vec3::ONE,
        }
    }
}

impl Transform {
    pub fn matrix(&self) -> Mat4 {
        let rotation = Mat4::from_rotation_z(self.rotation.z)
            * Mat4::from_rotation_y(self.rotation.y)
            * Mat4::from_rotation_x(self.rotation.x);
        Mat4::from_translation(self.position) * rotation * Mat4::from_scale(self.scale)
    }
}

/// Keeps the camera from flipping over the poles.
const PITCH_LIMIT: f32 = FRAC_PI_2 - 0.01;

/// Mouse-look, WASD-move camera.
#[derive(Debug, Clone, PartialEq)]
pub struct FpsController {
    position: Vec3,
    yaw: f32,
    pitch: f32,
    sensitivity: f32,
    speed: f32,
}

impl FpsController {
    pub fn new(position: Vec3, sensitivity: f32, speed: f32) -> Self {
        Self {
            position,
            yaw: 0.0,
            pitch: 0.0,
            sensitivity,
            speed,
        }
    }

    pub fn position(&self) -> Vec3 {
        self.position
    }

    pub fn yaw(&self) -> f32 {
        self.yaw
    }

    #[cfg(test)]
    fn pitch(&self) -> f32 {
        self.pitch
    }

    fn orientation(&self) -> Quat {
        Quat::from_rotation_y(self.yaw) * Quat::from_rotation_x(self.pitch)
    }

    /// Applies one frame of look and movement input.
    pub fn update(&mut self, controls: &FrameControls, dt: f32) {
        self.yaw -= controls.look_delta.x * self.sensitivity;
        self.pitch = (self.pitch - controls.look_delta.y * self.sensitivity)
            .clamp(-PITCH_LIMIT, PITCH_LIMIT);

        let orientation = self.orientation();
        let forward = orientation * Vec3::NEG_Z;
        let right = orientation * Vec3::X;
        let direction = right * controls.movement.x
            + Vec3::Y * controls.movement.y
            + forward * controls.movement.z;
        self.position += direction.normalize_or_zero() * self.speed * dt.max(0.0);
    }

    /// Camera-to-world transform.
    pub fn transform(&self) -> Mat4 {
        Mat4::from_rotation_translation(self.orientation(), self.position)
    }
}
