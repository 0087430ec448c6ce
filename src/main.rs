use std::any::Any;
use std::env;
use std::fmt;
use std::panic::{self, AssertUnwindSafe};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Instant;

use anyhow::{anyhow, Context, Result};
use glam::Vec2;
use log::{info, warn};
use pollster::block_on;
use winit::application::ApplicationHandler;
use winit::dpi::PhysicalSize;
use winit::event::{DeviceEvent, DeviceId, ElementState, KeyEvent, WindowEvent};
use winit::event_loop::{ActiveEventLoop, ControlFlow, EventLoop};
use winit::keyboard::{KeyCode as WinitKey, PhysicalKey};
use winit::window::{CursorGrabMode, Window, WindowId};

use gpu_timers::app::{print_instructions, print_summary};
use gpu_timers::{
    ConfigOverrides, KeyCode, NamedKey, Renderer, SceneDescription, StereoConfig, StereoDemo,
};

const WINDOW_TITLE: &str = "Virtual Reality";

fn main() {
    env_logger::init();
    if let Err(err) = run() {
        eprintln!("Error: {err:?}");
        std::process::exit(1);
    }
}

fn run() -> Result<()> {
    let options = CliOptions::parse(env::args().skip(1))?;

    let (scene, scene_overrides) = match &options.scene {
        Some(path) => SceneDescription::load(path)?,
        None => (SceneDescription::default(), ConfigOverrides::default()),
    };
    let mut config = StereoConfig::default();
    config
        .apply(&scene_overrides)
        .context("invalid <stereo> settings in scene")?;
    config
        .apply(&options.overrides)
        .context("invalid command-line settings")?;

    print_instructions();

    if options.summary_only {
        print_summary(&scene, &config);
        return Ok(());
    }

    match run_interactive(config.clone(), scene.clone()) {
        Err(err) if err.downcast_ref::<WindowInitError>().is_some() => {
            eprintln!(
                "{err}. Falling back to --summary-only mode (set DISPLAY or WAYLAND_DISPLAY to enable rendering)."
            );
            print_summary(&scene, &config);
            Ok(())
        }
        other => other,
    }
}

fn run_interactive(config: StereoConfig, scene: SceneDescription) -> Result<()> {
    let default_hook = panic::take_hook();
    panic::set_hook(Box::new(|_| {}));
    let event_loop = panic::catch_unwind(AssertUnwindSafe(EventLoop::new));
    panic::set_hook(default_hook);
    let event_loop = event_loop
        .map_err(|panic| WindowInitError::from_panic("event loop", panic))?
        .map_err(|err| WindowInitError::from_error("event loop", err))?;

    let mut app = StereoApp {
        demo: StereoDemo::new(config, scene),
        renderer: None,
        last_frame: None,
        last_error: None,
        reported_no_timer: false,
        focused: false,
    };
    event_loop
        .run_app(&mut app)
        .context("event loop terminated with error")?;

    if let Some(err) = app.last_error {
        return Err(err);
    }
    Ok(())
}

struct StereoApp {
    demo: StereoDemo,
    renderer: Option<Renderer>,
    last_frame: Option<Instant>,
    last_error: Option<anyhow::Error>,
    reported_no_timer: bool,
    focused: bool,
}

impl StereoApp {
    fn create_renderer(&self, event_loop: &ActiveEventLoop) -> Result<Renderer> {
        let config = self.demo.config();
        let attributes = Window::default_attributes()
            .with_title(WINDOW_TITLE)
            .with_inner_size(PhysicalSize::new(config.window_width, config.window_height));
        let window = Arc::new(
            event_loop
                .create_window(attributes)
                .map_err(|err| WindowInitError::from_error("window", err))?,
        );
        grab_cursor(&window);
        block_on(Renderer::new(Arc::clone(&window), self.demo.scene()))
    }

    fn fail(&mut self, event_loop: &ActiveEventLoop, err: anyhow::Error) {
        self.last_error = Some(err);
        event_loop.exit();
    }

    fn handle_keyboard(&mut self, event: &KeyEvent) {
        let PhysicalKey::Code(code) = event.physical_key else {
            return;
        };
        let Some(key) = map_keycode(code) else {
            return;
        };
        let input = self.demo.input_mut();
        match event.state {
            ElementState::Pressed => input.set_key_down(key),
            ElementState::Released => input.set_key_up(key),
        }
    }

    fn frame(&mut self, event_loop: &ActiveEventLoop) -> Result<()> {
        let Some(renderer) = self.renderer.as_mut() else {
            return Ok(());
        };

        if let Some(result) = renderer.poll_timer() {
            match result {
                Ok(report) => println!("{report}"),
                Err(err) => warn!("benchmark failed: {err}"),
            }
        }

        let now = Instant::now();
        let dt = self
            .last_frame
            .map_or(0.0, |last| now.duration_since(last).as_secs_f32());
        self.last_frame = Some(now);

        let outcome = self.demo.update(dt);
        if outcome.exit {
            event_loop.exit();
            return Ok(());
        }

        if outcome.benchmark && !renderer.timestamps_supported() && !self.reported_no_timer {
            warn!("timestamp queries are unavailable on this device; nothing to benchmark");
            self.reported_no_timer = true;
        }

        let size = renderer.size();
        let views = self.demo.eye_views(size.width, size.height);
        if let Err(err) = renderer.render(&views, outcome.benchmark) {
            match err {
                wgpu::SurfaceError::Lost | wgpu::SurfaceError::Outdated => {
                    let size = renderer.window().inner_size();
                    renderer.resize(size);
                }
                wgpu::SurfaceError::OutOfMemory => {
                    return Err(anyhow!("GPU is out of memory"));
                }
                wgpu::SurfaceError::Timeout => {
                    info!("surface timeout; retrying next frame");
                }
                wgpu::SurfaceError::Other => {
                    warn!("surface unavailable; skipping frame");
                }
            }
        }
        Ok(())
    }
}

impl ApplicationHandler for StereoApp {
    fn resumed(&mut self, event_loop: &ActiveEventLoop) {
        if self.renderer.is_some() {
            return;
        }
        match self.create_renderer(event_loop) {
            Ok(renderer) => {
                renderer.window().request_redraw();
                self.focused = renderer.window().has_focus();
                self.renderer = Some(renderer);
            }
            Err(err) => self.fail(event_loop, err),
        }
    }

    fn window_event(&mut self, event_loop: &ActiveEventLoop, window_id: WindowId, event: WindowEvent) {
        let Some(renderer) = self.renderer.as_mut() else {
            return;
        };
        if window_id != renderer.window_id() {
            return;
        }
        match event {
            WindowEvent::CloseRequested => event_loop.exit(),
            WindowEvent::Resized(size) => renderer.resize(size),
            WindowEvent::ScaleFactorChanged { .. } => {
                let size = renderer.window().inner_size();
                renderer.resize(size);
            }
            WindowEvent::KeyboardInput { event, .. } => self.handle_keyboard(&event),
            WindowEvent::Focused(true) => {
                self.focused = true;
                grab_cursor(renderer.window());
            }
            WindowEvent::Focused(false) => {
                self.focused = false;
                self.demo.input_mut().release_all();
            }
            WindowEvent::RedrawRequested => {
                if let Err(err) = self.frame(event_loop) {
                    self.fail(event_loop, err);
                }
            }
            _ => {}
        }
    }

    fn device_event(&mut self, _event_loop: &ActiveEventLoop, _device_id: DeviceId, event: DeviceEvent) {
        if !self.focused {
            return;
        }
        if let DeviceEvent::MouseMotion { delta: (dx, dy) } = event {
            self.demo
                .input_mut()
                .add_mouse_motion(Vec2::new(dx as f32, dy as f32));
        }
    }

    fn about_to_wait(&mut self, event_loop: &ActiveEventLoop) {
        event_loop.set_control_flow(ControlFlow::Poll);
        if let Some(renderer) = self.renderer.as_ref() {
            renderer.window().request_redraw();
        }
    }

    fn exiting(&mut self, _event_loop: &ActiveEventLoop) {
        info!("shutting down");
        self.renderer = None;
    }
}

/// Hides the cursor and holds it inside the window. Not every platform
/// supports both grab modes.
fn grab_cursor(window: &Window) {
    window.set_cursor_visible(false);
    let grabbed = window
        .set_cursor_grab(CursorGrabMode::Confined)
        .or_else(|_| window.set_cursor_grab(CursorGrabMode::Locked));
    if let Err(err) = grabbed {
        warn!("unable to grab the cursor: {err}");
    }
}

#[derive(Debug)]
struct WindowInitError {
    message: String,
}

impl WindowInitError {
    fn from_panic(stage: &str, panic: Box<dyn Any + Send>) -> Self {
        Self {
            message: format!("failed to initialize {stage}: {}", panic_message(panic)),
        }
    }

    fn from_error(stage: &str, err: impl fmt::Display) -> Self {
        Self {
            message: format!("failed to initialize {stage}: {err}"),
        }
    }
}

impl fmt::Display for WindowInitError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.message)
    }
}

impl std::error::Error for WindowInitError {}

fn panic_message(panic: Box<dyn Any + Send>) -> String {
    match panic.downcast::<String>() {
        Ok(msg) => *msg,
        Err(panic) => match panic.downcast::<&'static str>() {
            Ok(msg) => (*msg).to_string(),
            Err(_) => "unknown panic".into(),
        },
    }
}

fn map_keycode(code: WinitKey) -> Option<KeyCode> {
    Some(match code {
        WinitKey::Escape => KeyCode::Named(NamedKey::Escape),
        WinitKey::Space => KeyCode::Named(NamedKey::Space),
        WinitKey::ShiftLeft => KeyCode::Named(NamedKey::LeftShift),
        WinitKey::Digit0 => KeyCode::Digit(0),
        WinitKey::Digit1 => KeyCode::Digit(1),
        WinitKey::Digit2 => KeyCode::Digit(2),
        WinitKey::Digit3 => KeyCode::Digit(3),
        WinitKey::Digit4 => KeyCode::Digit(4),
        WinitKey::Digit5 => KeyCode::Digit(5),
        WinitKey::Digit6 => KeyCode::Digit(6),
        WinitKey::Digit7 => KeyCode::Digit(7),
        WinitKey::Digit8 => KeyCode::Digit(8),
        WinitKey::Digit9 => KeyCode::Digit(9),
        WinitKey::KeyA => KeyCode::Character('A'),
        WinitKey::KeyB => KeyCode::Character('B'),
        WinitKey::KeyC => KeyCode::Character('C'),
        WinitKey::KeyD => KeyCode::Character('D'),
        WinitKey::KeyE => KeyCode::Character('E'),
        WinitKey::KeyF => KeyCode::Character('F'),
        WinitKey::KeyG => KeyCode::Character('G'),
        WinitKey::KeyH => KeyCode::Character('H'),
        WinitKey::KeyI => KeyCode::Character('I'),
        WinitKey::KeyJ => KeyCode::Character('J'),
        WinitKey::KeyK => KeyCode::Character('K'),
        WinitKey::KeyL => KeyCode::Character('L'),
        WinitKey::KeyM => KeyCode::Character('M'),
        WinitKey::KeyN => KeyCode::Character('N'),
        WinitKey::KeyO => KeyCode::Character('O'),
        WinitKey::KeyP => KeyCode::Character('P'),
        WinitKey::KeyQ => KeyCode::Character('Q'),
        WinitKey::KeyR => KeyCode::Character('R'),
        WinitKey::KeyS => KeyCode::Character('S'),
        WinitKey::KeyT => KeyCode::Character('T'),
        WinitKey::KeyU => KeyCode::Character('U'),
        WinitKey::KeyV => KeyCode::Character('V'),
        WinitKey::KeyW => KeyCode::Character('W'),
        WinitKey::KeyX => KeyCode::Character('X'),
        WinitKey::KeyY => KeyCode::Character('Y'),
        WinitKey::KeyZ => KeyCode::Character('Z'),
        _ => return None,
    })
}

const USAGE: &str = "Usage: gpu-timers [--scene <scene.xml>] [--split iphone6|half] [--width <px>] [--height <px>] [--summary-only]";

struct CliOptions {
    scene: Option<PathBuf>,
    overrides: ConfigOverrides,
    summary_only: bool,
}

impl CliOptions {
    fn parse(mut args: impl Iterator<Item = String>) -> Result<Self> {
        let mut scene = None;
        let mut overrides = ConfigOverrides::default();
        let mut summary_only = false;

        while let Some(arg) = args.next() {
            let mut value = |flag: &str| {
                args.next()
                    .ok_or_else(|| anyhow!("{flag} expects a value. {USAGE}"))
            };
            match arg.as_str() {
                "--scene" => scene = Some(PathBuf::from(value("--scene")?)),
                "--split" => overrides.set_preset_name(&value("--split")?)?,
                "--width" => overrides.window_width = Some(parse_pixels("--width", &value("--width")?)?),
                "--height" => {
                    overrides.window_height = Some(parse_pixels("--height", &value("--height")?)?)
                }
                "--summary-only" => summary_only = true,
                other => {
                    return Err(anyhow!("Unknown argument: {other}. {USAGE}"));
                }
            }
        }

        Ok(Self {
            scene,
            overrides,
            summary_only,
        })
    }
}

fn parse_pixels(flag: &str, value: &str) -> Result<u32> {
    value
        .parse()
        .with_context(|| format!("{flag} expects a pixel count, got `{value}`"))
}
