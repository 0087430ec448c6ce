mod material;
pub mod renderer;
pub mod sequencer;
mod shared;
pub mod texture;
pub mod timer;

pub use renderer::Renderer;
pub use sequencer::{record_eye, EyeRecorder};
pub use texture::TextureImage;
pub use timer::{TimerError, TimerPhase, TimerProtocol, TimingReport};
