use glam::{Mat4, Vec3};
use serde::{Deserialize, Serialize};

use crate::config::{ConfigError, StereoConfig};

/// One of the two viewpoints composing the side-by-side image.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Eye {
    Left,
    Right,
}

impl Eye {
    /// Eyes in the order they are rendered each frame.
    pub const ALL: [Eye; 2] = [Eye::Left, Eye::Right];

    pub fn index(self) -> usize {
        match self {
            Eye::Left => 0,
            Eye::Right => 1,
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            Eye::Left => "left",
            Eye::Right => "right",
        }
    }
}

/// Pixel rectangle a render pass is restricted to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct ViewportRect {
    pub x: u32,
    pub y: u32,
    pub width: u32,
    pub height: u32,
}

impl ViewportRect {
    pub const fn new(x: u32, y: u32, width: u32, height: u32) -> Self {
        Self {
            x,
            y,
            width,
            height,
        }
    }

    /// Exclusive right edge.
    pub fn right(&self) -> u32 {
        self.x + self.width
    }

    pub fn is_empty(&self) -> bool {
        self.width == 0 || self.height == 0
    }
}

/// Horizontal split of the window into two eye rectangles, in whole percent.
///
/// The first eye starts at the left edge; the second starts at
/// `second_eye_start_percent` of the width. Both eyes are
/// `eye_width_percent` wide, so anything between them is an unused gap.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct EyeSplit {
    eye_width_percent: u32,
    second_eye_start_percent: u32,
}

impl EyeSplit {
    pub fn new(eye_width_percent: u32, second_eye_start_percent: u32) -> Result<Self, ConfigError> {
        let valid = eye_width_percent > 0
            && eye_width_percent <= second_eye_start_percent
            && eye_width_percent + second_eye_start_percent <= 100;
        if !valid {
            return Err(ConfigError::InvalidSplit {
                eye_width: eye_width_percent,
                second_start: second_eye_start_percent,
            });
        }
        Ok(Self {
            eye_width_percent,
            second_eye_start_percent,
        })
    }

    pub fn eye_width_percent(&self) -> u32 {
        self.eye_width_percent
    }

    pub fn second_eye_start_percent(&self) -> u32 {
        self.second_eye_start_percent
    }

    /// Computes both eye rectangles for the current drawable size.
    pub fn layout(&self, width: u32, height: u32) -> EyeLayout {
        let eye_width = percent_of(width, self.eye_width_percent);
        let second_start = percent_of(width, self.second_eye_start_percent);
        EyeLayout {
            left: ViewportRect::new(0, 0, eye_width, height),
            right: ViewportRect::new(second_start, 0, eye_width, height),
        }
    }

    /// Aspect ratio of a single eye, not of the whole window.
    pub fn eye_aspect(&self, width: u32, height: u32) -> f32 {
        if height == 0 {
            return 1.0;
        }
        let aspect = self.eye_width_percent as f32 / 100.0 * width as f32 / height as f32;
        aspect.max(0.01)
    }
}

impl Default for EyeSplit {
    fn default() -> Self {
        SplitPreset::Iphone6.split()
    }
}

fn percent_of(value: u32, percent: u32) -> u32 {
    (u64::from(value) * u64::from(percent) / 100) as u32
}

/// Named splits for the displays the demo was tuned on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SplitPreset {
    /// 45% wide eyes, second eye starting at 55%; leaves a gap for phone headsets.
    Iphone6,
    /// Two halves with no gap.
    Half,
}

impl SplitPreset {
    pub fn split(self) -> EyeSplit {
        match self {
            SplitPreset::Iphone6 => EyeSplit {
                eye_width_percent: 45,
                second_eye_start_percent: 55,
            },
            SplitPreset::Half => EyeSplit {
                eye_width_percent: 50,
                second_eye_start_percent: 50,
            },
        }
    }

    pub fn from_name(name: &str) -> Option<Self> {
        match name.to_ascii_lowercase().as_str() {
            "iphone6" | "phone" => Some(SplitPreset::Iphone6),
            "half" => Some(SplitPreset::Half),
            _ => None,
        }
    }
}

/// The two rectangles of one frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EyeLayout {
    pub left: ViewportRect,
    pub right: ViewportRect,
}

impl EyeLayout {
    pub fn rect(&self, eye: Eye) -> ViewportRect {
        match eye {
            Eye::Left => self.left,
            Eye::Right => self.right,
        }
    }
}

/// Lateral offset applied to the second eye.
///
/// Only the upper side is bounded: the offset never rises above zero, but it
/// can be pushed arbitrarily far negative.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct StereoOffset {
    move_x: f32,
    step: f32,
}

impl StereoOffset {
    pub fn new(initial: f32, step: f32) -> Self {
        Self {
            move_x: initial.min(0.0),
            step,
        }
    }

    pub fn value(&self) -> f32 {
        self.move_x
    }

    /// Applies one frame of held adjustment keys, then clamps.
    pub fn apply(&mut self, increase: bool, decrease: bool) {
        if increase {
            self.move_x += self.step;
        }
        if decrease {
            self.move_x -= self.step;
        }
        if self.move_x > 0.0 {
            self.move_x = 0.0;
        }
    }
}

/// Everything a render pass needs to draw one eye.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct EyeView {
    pub eye: Eye,
    pub viewport: ViewportRect,
    pub view_proj: Mat4,
}

/// Derives both eye views from the controller's camera transform.
///
/// The first eye sees through the camera directly. The second eye adds the
/// configured yaw and then shifts the view by the stereo offset.
pub fn eye_views(
    config: &StereoConfig,
    camera: Mat4,
    offset: &StereoOffset,
    width: u32,
    height: u32,
) -> [EyeView; 2] {
    let layout = config.split.layout(width, height);
    let projection = config.projection(width, height);

    let left_view = camera.inverse();
    let right_view = (camera * Mat4::from_rotation_y(config.second_eye_yaw)).inverse()
        * Mat4::from_translation(Vec3::new(offset.value(), 0.0, 0.0));

    [
        EyeView {
            eye: Eye::Left,
            viewport: layout.left,
            view_proj: projection * left_view,
        },
        EyeView {
            eye: Eye::Right,
            viewport: layout.right,
            view_proj: projection * right_view,
        },
    ]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn phone_split_matches_reference_resolution() {
        let layout = SplitPreset::Iphone6.split().layout(1366, 768);
        assert_eq!(layout.left, ViewportRect::new(0, 0, 614, 768));
        assert_eq!(layout.right, ViewportRect::new(751, 0, 614, 768));
    }

    #[test]
    fn height_passes_through_unchanged() {
        for height in [1, 480, 768, 2160] {
            let layout = SplitPreset::Iphone6.split().layout(1366, height);
            assert_eq!(layout.left.height, height);
            assert_eq!(layout.right.height, height);
            assert_eq!(layout.right.x, 751);
        }
    }

    #[test]
    fn eyes_never_overlap_or_overflow() {
        for split in [
            SplitPreset::Iphone6.split(),
            SplitPreset::Half.split(),
            EyeSplit::new(30, 60).unwrap(),
        ] {
            for width in 1..3000 {
                let layout = split.layout(width, 100);
                assert!(layout.left.right() <= layout.right.x, "overlap at {width}");
                assert!(layout.right.right() <= width, "overflow at {width}");
                assert_eq!(layout.left.width, layout.right.width);
                assert_eq!(layout.left.x, 0);
            }
        }
    }

    #[test]
    fn half_split_has_no_gap() {
        let layout = SplitPreset::Half.split().layout(1000, 10);
        assert_eq!(layout.left.right(), layout.right.x);
        assert_eq!(layout.right.right(), 1000);
    }

    #[test]
    fn rejects_overlapping_or_overflowing_splits() {
        assert!(EyeSplit::new(60, 40).is_err());
        assert!(EyeSplit::new(45, 60).is_err());
        assert!(EyeSplit::new(0, 50).is_err());
        assert!(EyeSplit::new(40, 60).is_ok());
    }

    #[test]
    fn tiny_windows_produce_empty_rects() {
        let layout = SplitPreset::Iphone6.split().layout(1, 100);
        assert!(layout.left.is_empty());
        assert!(layout.right.is_empty());
    }

    #[test]
    fn offset_increase_is_clamped_at_zero() {
        let mut offset = StereoOffset::new(-0.5, 0.01);
        for _ in 0..1000 {
            offset.apply(true, false);
            assert!(offset.value() <= 0.0);
        }
        assert_eq!(offset.value(), 0.0);
    }

    #[test]
    fn offset_decrease_has_no_lower_bound() {
        let mut offset = StereoOffset::new(-0.5, 0.01);
        for _ in 0..1000 {
            offset.apply(false, true);
        }
        assert!(offset.value() < -10.0);
    }

    #[test]
    fn positive_initial_offset_is_clamped() {
        assert_eq!(StereoOffset::new(0.3, 0.01).value(), 0.0);
    }

    #[test]
    fn first_eye_uses_inverse_camera() {
        let config = StereoConfig::default();
        let camera = Mat4::from_translation(Vec3::new(1.0, 2.0, 3.0));
        let offset = StereoOffset::new(-0.5, 0.01);
        let [left, right] = eye_views(&config, camera, &offset, 1366, 768);

        let expected = config.projection(1366, 768) * camera.inverse();
        assert!(left.view_proj.abs_diff_eq(expected, 1e-5));
        assert_eq!(left.eye, Eye::Left);
        assert_eq!(right.eye, Eye::Right);
        assert_eq!(right.viewport.x, 751);
    }

    #[test]
    fn second_eye_is_shifted_by_offset() {
        let config = StereoConfig::default();
        let offset = StereoOffset::new(-0.5, 0.01);
        let [left, right] = eye_views(&config, Mat4::IDENTITY, &offset, 1366, 768);

        // A point on the camera axis lands in the middle of the left eye and
        // half a unit further left in the right eye.
        let point = Vec3::new(0.0, 0.0, -5.0);
        let projection = config.projection(1366, 768);
        let shifted = projection.project_point3(point + Vec3::new(-0.5, 0.0, 0.0));
        assert!(left.view_proj.project_point3(point).x.abs() < 1e-5);
        assert!((right.view_proj.project_point3(point).x - shifted.x).abs() < 1e-5);
    }
}
