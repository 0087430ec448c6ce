use glam::Vec3;

use crate::camera::FpsController;
use crate::config::StereoConfig;
use crate::input::InputState;
use crate::scene::SceneDescription;
use crate::stereo::{eye_views, Eye, EyeView, StereoOffset};

/// Lines printed once at startup.
pub const INSTRUCTIONS: [&str; 2] = [
    "Use WASD to move, and the mouse to look around.",
    "Press escape or alt-f4 to exit.",
];

pub fn print_instructions() {
    for line in INSTRUCTIONS {
        println!("{line}");
    }
}

/// What the main loop should do after a frame update.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct FrameOutcome {
    pub exit: bool,
    pub benchmark: bool,
}

/// Per-frame state of the demo that does not touch the GPU.
#[derive(Debug)]
pub struct StereoDemo {
    config: StereoConfig,
    scene: SceneDescription,
    input: InputState,
    controller: FpsController,
    offset: StereoOffset,
}

impl StereoDemo {
    pub fn new(config: StereoConfig, scene: SceneDescription) -> Self {
        let controller = FpsController::new(Vec3::ZERO, config.mouse_sensitivity, config.move_speed);
        let offset = StereoOffset::new(config.initial_offset, config.offset_step);
        Self {
            config,
            scene,
            input: InputState::new(),
            controller,
            offset,
        }
    }

    pub fn config(&self) -> &StereoConfig {
        &self.config
    }

    pub fn scene(&self) -> &SceneDescription {
        &self.scene
    }

    pub fn input_mut(&mut self) -> &mut InputState {
        &mut self.input
    }

    pub fn offset(&self) -> &StereoOffset {
        &self.offset
    }

    pub fn controller(&self) -> &FpsController {
        &self.controller
    }

    /// Samples input and advances the offset and camera by `dt` seconds.
    ///
    /// Exit wins over everything else: nothing moves on the frame escape is
    /// seen and no benchmark is requested.
    pub fn update(&mut self, dt: f32) -> FrameOutcome {
        let controls = self.input.sample();
        if controls.exit {
            return FrameOutcome {
                exit: true,
                benchmark: false,
            };
        }
        self.offset
            .apply(controls.offset_increase, controls.offset_decrease);
        self.controller.update(&controls, dt);
        FrameOutcome {
            exit: false,
            benchmark: controls.benchmark,
        }
    }

    /// Both eye views for a drawable of the given size.
    pub fn eye_views(&self, width: u32, height: u32) -> [EyeView; 2] {
        eye_views(
            &self.config,
            self.controller.transform(),
            &self.offset,
            width,
            height,
        )
    }
}

/// Describes the scene and the eye layout without opening a window.
pub fn summary_lines(scene: &SceneDescription, config: &StereoConfig) -> Vec<String> {
    let mut lines = vec![format!(
        "Scene with {} instances ({} meshes, {} textures)",
        scene.instances.len(),
        scene.meshes.len(),
        scene.textures.len()
    )];
    for instance in &scene.instances {
        let p = instance.transform.position;
        lines.push(format!(
            " - {} mesh={} pos=({:.2}, {:.2}, {:.2})",
            instance.name, scene.meshes[instance.mesh].name, p.x, p.y, p.z
        ));
    }

    let (width, height) = (config.window_width, config.window_height);
    lines.push(format!(
        "Window {width}x{height}, split {}%/{}%",
        config.split.eye_width_percent(),
        config.split.second_eye_start_percent()
    ));
    let layout = config.split.layout(width, height);
    for eye in Eye::ALL {
        let rect = layout.rect(eye);
        let label = match eye {
            Eye::Left => "Left eye",
            Eye::Right => "Right eye",
        };
        lines.push(format!(
            "{label}: x={} y={} w={} h={}",
            rect.x, rect.y, rect.width, rect.height
        ));
    }
    lines
}

pub fn print_summary(scene: &SceneDescription, config: &StereoConfig) {
    for line in summary_lines(scene, config) {
        println!("{line}");
    }
}

#[cfg(test)]
mod tests {
    use glam::Vec2;

    use super::*;
    use crate::input::{KeyCode, NamedKey};
    use crate::stereo::SplitPreset;

    fn demo() -> StereoDemo {
        StereoDemo::new(StereoConfig::default(), SceneDescription::default())
    }

    #[test]
    fn escape_exits_without_moving() {
        let mut demo = demo();
        demo.input_mut().set_key_down(KeyCode::Named(NamedKey::Escape));
        demo.input_mut().set_key_down(KeyCode::Character('W'));
        demo.input_mut().set_key_down(KeyCode::Character('B'));
        let outcome = demo.update(1.0);
        assert!(outcome.exit);
        assert!(!outcome.benchmark);
        assert_eq!(demo.controller().position(), Vec3::ZERO);
    }

    #[test]
    fn held_offset_key_moves_once_per_frame() {
        let mut demo = demo();
        demo.input_mut().set_key_down(KeyCode::Digit(2));
        for _ in 0..5 {
            demo.update(0.016);
        }
        assert!((demo.offset().value() - -0.55).abs() < 1e-5);

        demo.input_mut().set_key_up(KeyCode::Digit(2));
        demo.input_mut().set_key_down(KeyCode::Digit(1));
        for _ in 0..100 {
            demo.update(0.016);
        }
        assert_eq!(demo.offset().value(), 0.0);
    }

    #[test]
    fn benchmark_is_requested_every_held_frame() {
        let mut demo = demo();
        demo.input_mut().set_key_down(KeyCode::Character('B'));
        assert!(demo.update(0.016).benchmark);
        assert!(demo.update(0.016).benchmark);
        demo.input_mut().release_all();
        assert!(!demo.update(0.016).benchmark);
    }

    #[test]
    fn mouse_travel_turns_the_camera() {
        let mut demo = demo();
        demo.input_mut().add_mouse_motion(Vec2::new(10.0, 0.0));
        demo.update(0.016);
        assert!(demo.controller().yaw() < 0.0);
    }

    #[test]
    fn eye_views_follow_the_configured_split() {
        let demo = demo();
        let [left, right] = demo.eye_views(1366, 768);
        assert_eq!((left.viewport.x, left.viewport.width), (0, 614));
        assert_eq!((right.viewport.x, right.viewport.width), (751, 614));
    }

    #[test]
    fn summary_lists_instances_and_layout() {
        let mut config = StereoConfig::default();
        let lines = summary_lines(&SceneDescription::default(), &config);
        assert_eq!(lines[0], "Scene with 3 instances (2 meshes, 4 textures)");
        assert!(lines.contains(&" - ground mesh=plane pos=(0.00, 0.00, -10.00)".to_string()));
        assert!(lines.contains(&" - car-2 mesh=car pos=(5.00, -1.00, -10.00)".to_string()));
        assert!(lines.contains(&"Left eye: x=0 y=0 w=614 h=768".to_string()));
        assert!(lines.contains(&"Right eye: x=751 y=0 w=614 h=768".to_string()));

        config.split = SplitPreset::Half.split();
        let lines = summary_lines(&SceneDescription::default(), &config);
        assert!(lines.contains(&"Right eye: x=683 y=0 w=683 h=768".to_string()));
    }
}
