use std::collections::HashSet;

use glam::{Vec2, Vec3};
use serde::{Deserialize, Serialize};

/// Identifier for a physical keyboard key.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum KeyCode {
    Named(NamedKey),
    Character(char),
    Digit(u8),
}

/// Friendly names for the non-printing keys the demo cares about.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum NamedKey {
    Escape,
    Space,
    LeftShift,
}

const EXIT: KeyCode = KeyCode::Named(NamedKey::Escape);
const OFFSET_INCREASE: KeyCode = KeyCode::Digit(1);
const OFFSET_DECREASE: KeyCode = KeyCode::Digit(2);
const BENCHMARK: KeyCode = KeyCode::Character('B');
const FORWARD: KeyCode = KeyCode::Character('W');
const BACK: KeyCode = KeyCode::Character('S');
const LEFT: KeyCode = KeyCode::Character('A');
const RIGHT: KeyCode = KeyCode::Character('D');
const UP: KeyCode = KeyCode::Named(NamedKey::Space);
const DOWN: KeyCode = KeyCode::Named(NamedKey::LeftShift);

/// Keys held and mouse travel, owned by the main loop.
///
/// Window and device events write into it as they arrive; the frame reads it
/// once via [`InputState::sample`].
#[derive(Debug, Default)]
pub struct InputState {
    keys: HashSet<KeyCode>,
    mouse_travel: Vec2,
}

impl InputState {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_key_down(&mut self, key: KeyCode) {
        self.keys.insert(key);
    }

    pub fn set_key_up(&mut self, key: KeyCode) {
        self.keys.remove(&key);
    }

    /// Accumulates raw mouse motion until the next sample.
    pub fn add_mouse_motion(&mut self, delta: Vec2) {
        self.mouse_travel += delta;
    }

    /// Drops every held key and pending mouse travel, e.g. when the window
    /// loses focus.
    pub fn release_all(&mut self) {
        self.keys.clear();
        self.mouse_travel = Vec2::ZERO;
    }

    pub fn is_key_down(&self, key: KeyCode) -> bool {
        self.keys.contains(&key)
    }

    /// Snapshots the controls for this frame.
    ///
    /// Keys are level-triggered: a key held across frames reports on every
    /// one of them. The look delta is the mouse travel since the previous
    /// sample.
    pub fn sample(&mut self) -> FrameControls {
        let look_delta = std::mem::take(&mut self.mouse_travel);

        let axis = |positive: KeyCode, negative: KeyCode| {
            let mut value = 0.0;
            if self.is_key_down(positive) {
                value += 1.0;
            }
            if self.is_key_down(negative) {
                value -= 1.0;
            }
            value
        };

        FrameControls {
            exit: self.is_key_down(EXIT),
            offset_increase: self.is_key_down(OFFSET_INCREASE),
            offset_decrease: self.is_key_down(OFFSET_DECREASE),
            benchmark: self.is_key_down(BENCHMARK),
            movement: Vec3::new(axis(RIGHT, LEFT), axis(UP, DOWN), axis(FORWARD, BACK)),
            look_delta,
        }
    }
}

/// Controls sampled once per frame.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct FrameControls {
    pub exit: bool,
    pub offset_increase: bool,
    pub offset_decrease: bool,
    pub benchmark: bool,
    /// x = strafe right, y = up, z = forward; each component in [-1, 1].
    pub movement: Vec3,
    pub look_delta: Vec2,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn held_keys_report_every_frame() {
        let mut input = InputState::new();
        input.set_key_down(BENCHMARK);
        assert!(input.sample().benchmark);
        assert!(input.sample().benchmark);
        input.set_key_up(BENCHMARK);
        assert!(!input.sample().benchmark);
    }

    #[test]
    fn digit_keys_drive_offset_controls() {
        let mut input = InputState::new();
        input.set_key_down(KeyCode::Digit(1));
        let controls = input.sample();
        assert!(controls.offset_increase);
        assert!(!controls.offset_decrease);
    }

    #[test]
    fn opposing_keys_cancel() {
        let mut input = InputState::new();
        input.set_key_down(KeyCode::Character('W'));
        input.set_key_down(KeyCode::Character('S'));
        input.set_key_down(KeyCode::Character('D'));
        assert_eq!(input.sample().movement, Vec3::new(1.0, 0.0, 0.0));
    }

    #[test]
    fn look_delta_sums_motion_since_previous_sample() {
        let mut input = InputState::new();
        assert_eq!(input.sample().look_delta, Vec2::ZERO);
        input.add_mouse_motion(Vec2::new(3.0, -1.0));
        input.add_mouse_motion(Vec2::new(2.0, -2.0));
        assert_eq!(input.sample().look_delta, Vec2::new(5.0, -3.0));
        assert_eq!(input.sample().look_delta, Vec2::ZERO);
    }

    #[test]
    fn release_all_clears_keys() {
        let mut input = InputState::new();
        input.set_key_down(EXIT);
        input.add_mouse_motion(Vec2::new(40.0, 0.0));
        input.release_all();
        let controls = input.sample();
        assert!(!controls.exit);
        assert_eq!(controls.look_delta, Vec2::ZERO);
    }
}
