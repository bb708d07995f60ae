//! WaveEdit core data model
//!
//! Owns the types every other crate builds on:
//! - `PcmBuffer`: planar float PCM with sample-accurate range edits
//! - `Selection`: sample range + channel mask on a document
//! - `WaveError`: the error taxonomy shared across the workspace

pub mod buffer;
pub mod error;
pub mod selection;

pub use buffer::{BitDepth, PcmBuffer, MAX_CHANNELS};
pub use error::{WaveError, WaveResult};
pub use selection::{mask_channels, Selection, ALL_CHANNELS};

/// Sample type used for PCM storage.
///
/// Runtime processing is float; the origin bit depth is only carried as
/// metadata for re-encoding.
pub type Sample = f32;
