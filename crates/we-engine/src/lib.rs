//! WaveEdit playback engine
//!
//! Block-based playback pulled by the audio host. Split into a control
//! handle (`PlaybackEngine`, UI thread) and a renderer (`EngineRenderer`,
//! owned by the audio callback). All handoff between the two goes through
//! atomics, try-locks and ring buffers; the callback never blocks, never
//! allocates and never frees.

pub mod playback;
pub mod preview;
pub mod transport;

pub use playback::{EngineRenderer, PlaybackEngine, SharedPcm};
pub use preview::{DspPreviewKind, PreviewMode};
pub use transport::{PlaybackState, Transport};
