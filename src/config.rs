use glam::Mat4;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::stereo::{EyeSplit, SplitPreset};

/// Rejected configuration values.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ConfigError {
    #[error("eye split {eye_width}%/{second_start}% overlaps or overflows the window")]
    InvalidSplit { eye_width: u32, second_start: u32 },
    #[error("unknown split preset `{0}` (expected `iphone6` or `half`)")]
    UnknownPreset(String),
    #[error("clip planes must satisfy 0 < near < far (near={near}, far={far})")]
    InvalidClip { near: f32, far: f32 },
    #[error("vertical field of view must be within (0, pi) radians, got {0}")]
    InvalidFov(f32),
    #[error("window size must be non-zero, got {width}x{height}")]
    InvalidWindowSize { width: u32, height: u32 },
    #[error("offset step must be a positive number, got {0}")]
    InvalidOffsetStep(f32),
    #[error("initial offset must be a finite number, got {0}")]
    InvalidInitialOffset(f32),
    #[error("second eye yaw must be a finite number, got {0}")]
    InvalidSecondEyeYaw(f32),
    #[error("mouse sensitivity must be a finite non-negative number, got {0}")]
    InvalidMouseSensitivity(f32),
    #[error("move speed must be a finite non-negative number, got {0}")]
    InvalidMoveSpeed(f32),
}

/// Runtime settings for the stereo demo.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StereoConfig {
    pub split: EyeSplit,
    /// Vertical field of view in radians.
    pub fov_y: f32,
    pub near: f32,
    pub far: f32,
    /// Amount one frame of a held offset key moves the second eye.
    pub offset_step: f32,
    pub initial_offset: f32,
    /// Extra yaw, in radians, applied to the second eye.
    pub second_eye_yaw: f32,
    pub window_width: u32,
    pub window_height: u32,
    /// Radians of rotation per pixel of mouse travel.
    pub mouse_sensitivity: f32,
    /// World units per second.
    pub move_speed: f32,
}

impl Default for StereoConfig {
    fn default() -> Self {
        Self {
            split: SplitPreset::Iphone6.split(),
            fov_y: 0.9,
            near: 0.1,
            far: 100.0,
            offset_step: 0.01,
            initial_offset: -0.5,
            second_eye_yaw: 0.0,
            window_width: 1366,
            window_height: 768,
            mouse_sensitivity: 0.003,
            move_speed: 3.0,
        }
    }
}

impl StereoConfig {
    /// Applies overrides on top of the current values and re-validates.
    pub fn apply(&mut self, overrides: &ConfigOverrides) -> Result<(), ConfigError> {
        let base = overrides.preset.map(SplitPreset::split).unwrap_or(self.split);
        if overrides.preset.is_some()
            || overrides.eye_width_percent.is_some()
            || overrides.second_eye_start_percent.is_some()
        {
            self.split = EyeSplit::new(
                overrides
                    .eye_width_percent
                    .unwrap_or(base.eye_width_percent()),
                overrides
                    .second_eye_start_percent
                    .unwrap_or(base.second_eye_start_percent()),
            )?;
        }

        set(&mut self.fov_y, overrides.fov_y);
        set(&mut self.near, overrides.near);
        set(&mut self.far, overrides.far);
        set(&mut self.offset_step, overrides.offset_step);
        set(&mut self.initial_offset, overrides.initial_offset);
        set(&mut self.second_eye_yaw, overrides.second_eye_yaw);
        set(&mut self.window_width, overrides.window_width);
        set(&mut self.window_height, overrides.window_height);
        set(&mut self.mouse_sensitivity, overrides.mouse_sensitivity);
        set(&mut self.move_speed, overrides.move_speed);

        self.validate()
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if !(self.near > 0.0 && self.near < self.far) {
            return Err(ConfigError::InvalidClip {
                near: self.near,
                far: self.far,
            });
        }
        if !(self.fov_y > 0.0 && self.fov_y < std::f32::consts::PI) {
            return Err(ConfigError::InvalidFov(self.fov_y));
        }
        if self.window_width == 0 || self.window_height == 0 {
            return Err(ConfigError::InvalidWindowSize {
                width: self.window_width,
                height: self.window_height,
            });
        }
        // Non-positive steps would swap or freeze the offset keys.
        if !(self.offset_step.is_finite() && self.offset_step > 0.0) {
            return Err(ConfigError::InvalidOffsetStep(self.offset_step));
        }
        if !self.initial_offset.is_finite() {
            return Err(ConfigError::InvalidInitialOffset(self.initial_offset));
        }
        if !self.second_eye_yaw.is_finite() {
            return Err(ConfigError::InvalidSecondEyeYaw(self.second_eye_yaw));
        }
        if !(self.mouse_sensitivity.is_finite() && self.mouse_sensitivity >= 0.0) {
            return Err(ConfigError::InvalidMouseSensitivity(self.mouse_sensitivity));
        }
        if !(self.move_speed.is_finite() && self.move_speed >= 0.0) {
            return Err(ConfigError::InvalidMoveSpeed(self.move_speed));
        }
        Ok(())
    }

    /// Perspective projection for one eye of a `width` x `height` drawable.
    pub fn projection(&self, width: u32, height: u32) -> Mat4 {
        Mat4::perspective_rh(
            self.fov_y,
            self.split.eye_aspect(width, height),
            self.near,
            self.far,
        )
    }
}

fn set<T: Copy>(slot: &mut T, value: Option<T>) {
    if let Some(value) = value {
        *slot = value;
    }
}

/// Partial configuration coming from a scene file or the command line.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ConfigOverrides {
    pub preset: Option<SplitPreset>,
    pub eye_width_percent: Option<u32>,
    pub second_eye_start_percent: Option<u32>,
    pub fov_y: Option<f32>,
    pub near: Option<f32>,
    pub far: Option<f32>,
    pub offset_step: Option<f32>,
    pub initial_offset: Option<f32>,
    pub second_eye_yaw: Option<f32>,
    pub window_width: Option<u32>,
    pub window_height: Option<u32>,
    pub mouse_sensitivity: Option<f32>,
    pub move_speed: Option<f32>,
}

impl ConfigOverrides {
    pub fn set_preset_name(&mut self, name: &str) -> Result<(), ConfigError> {
        let preset = SplitPreset::from_name(name)
            .ok_or_else(|| ConfigError::UnknownPreset(name.to_string()))?;
        self.preset = Some(preset);
        Ok(())
    }
}
