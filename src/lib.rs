//! Side-by-side stereo rendering with GPU timestamp benchmarking.
//!
//! A single window is split into two eye viewports. Each frame draws the
//! scene once per eye in its own render pass, and a benchmark request
//! brackets those passes with timestamps so the cost of the first eye, the
//! second eye and the whole frame can be reported separately.
//!
//! Everything except [`render`] is independent of the GPU and can be used
//! from headless tools and tests.

pub mod app;
pub mod camera;
pub mod config;
pub mod input;
pub mod mesh;
pub mod obj;
pub mod render;
pub mod scene;
pub mod stereo;

pub use app::StereoDemo;
pub use camera::{FpsController, Transform};
pub use config::{ConfigError, ConfigOverrides, StereoConfig};
pub use input::{FrameControls, InputState, KeyCode, NamedKey};
pub use mesh::{MeshData, Vertex};
pub use obj::load_obj_from_str;
pub use render::{Renderer, TimingReport};
pub use scene::{SceneDescription, SceneInstance};
pub use stereo::{eye_views, Eye, EyeLayout, EyeSplit, EyeView, SplitPreset, StereoOffset, ViewportRect};
