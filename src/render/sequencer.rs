use crate::scene::SceneInstance;
use crate::stereo::{Eye, EyeView, ViewportRect};

/// Command sink for one eye's pass.
///
/// The GPU renderer implements this over a `wgpu::RenderPass`; tests use a
/// recording implementation.
pub trait EyeRecorder {
    /// Restricts subsequent draws to `rect`.
    fn set_viewport(&mut self, rect: ViewportRect);
    /// Binds the view-projection uploaded for `eye`.
    fn bind_camera(&mut self, eye: Eye);
    /// Binds the instance's world matrix and texture pair into the shared material.
    fn bind_material(&mut self, instance_index: usize, instance: &SceneInstance);
    fn draw_mesh(&mut self, mesh: usize);
}

/// Records every scene instance for one eye.
///
/// An empty viewport records nothing, so a window too narrow to hold an eye
/// does not submit an invalid rectangle.
pub fn record_eye<R>(recorder: &mut R, view: &EyeView, instances: &[SceneInstance])
where
    R: EyeRecorder + ?Sized,
{
    if view.viewport.is_empty() {
        log::trace!("skipping {} eye: empty viewport", view.eye.label());
        return;
    }
    recorder.set_viewport(view.viewport);
    recorder.bind_camera(view.eye);
    for (index, instance) in instances.iter().enumerate() {
        recorder.bind_material(index, instance);
        recorder.draw_mesh(instance.mesh);
    }
}

#[cfg(test)]
mod tests {
    use glam::Mat4;

    use super::*;
    use crate::config::StereoConfig;
    use crate::scene::SceneDescription;
    use crate::stereo::{eye_views, StereoOffset};

    #[derive(Debug, PartialEq)]
    enum Command {
        Viewport(ViewportRect),
        Camera(Eye),
        Material(usize),
        Draw(usize),
    }

    #[derive(Default)]
    struct Recording(Vec<Command>);

    impl EyeRecorder for Recording {
        fn set_viewport(&mut self, rect: ViewportRect) {
            self.0.push(Command::Viewport(rect));
        }

        fn bind_camera(&mut self, eye: Eye) {
            self.0.push(Command::Camera(eye));
        }

        fn bind_material(&mut self, instance_index: usize, _instance: &SceneInstance) {
            self.0.push(Command::Material(instance_index));
        }

        fn draw_mesh(&mut self, mesh: usize) {
            self.0.push(Command::Draw(mesh));
        }
    }

    impl Recording {
        fn draws_of(&self, mesh: usize) -> usize {
            self.0
                .iter()
                .filter(|command| **command == Command::Draw(mesh))
                .count()
        }
    }

    fn views(camera: Mat4, width: u32) -> [EyeView; 2] {
        let config = StereoConfig::default();
        let offset = StereoOffset::new(config.initial_offset, config.offset_step);
        eye_views(&config, camera, &offset, width, 768)
    }

    #[test]
    fn each_eye_draws_one_plane_and_two_cars() {
        let scene = SceneDescription::default();
        let cameras = [
            Mat4::IDENTITY,
            Mat4::from_rotation_y(2.0),
            Mat4::from_translation(glam::Vec3::new(3.0, 1.0, -40.0)),
        ];
        for camera in cameras {
            for view in views(camera, 1366) {
                let mut recording = Recording::default();
                record_eye(&mut recording, &view, &scene.instances);
                assert_eq!(recording.draws_of(0), 1);
                assert_eq!(recording.draws_of(1), 2);
            }
        }
    }

    #[test]
    fn viewport_and_camera_precede_draws() {
        let scene = SceneDescription::default();
        let [_, right] = views(Mat4::IDENTITY, 1366);
        let mut recording = Recording::default();
        record_eye(&mut recording, &right, &scene.instances);
        assert_eq!(
            recording.0[..2],
            [
                Command::Viewport(ViewportRect::new(751, 0, 614, 768)),
                Command::Camera(Eye::Right)
            ]
        );
        assert_eq!(
            recording.0[2..],
            [
                Command::Material(0),
                Command::Draw(0),
                Command::Material(1),
                Command::Draw(1),
                Command::Material(2),
                Command::Draw(1),
            ]
        );
    }

    #[test]
    fn empty_viewport_records_nothing() {
        let scene = SceneDescription::default();
        let [left, _] = views(Mat4::IDENTITY, 1);
        let mut recording = Recording::default();
        record_eye(&mut recording, &left, &scene.instances);
        assert!(recording.0.is_empty());
    }
}
