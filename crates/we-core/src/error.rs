//! Error types for WaveEdit

use thiserror::Error;

/// Core error type
#[derive(Error, Debug)]
pub enum WaveError {
    #[error("Range out of bounds: {0}")]
    OutOfRange(String),

    #[error("Channel count mismatch: expected {expected}, got {got}")]
    ChannelMismatch { expected: usize, got: usize },

    #[error("Failed to decode {path}: {reason}")]
    DecodeFailed { path: String, reason: String },

    #[error("Failed to encode {path}: {reason}")]
    EncodeFailed { path: String, reason: String },

    #[error("Audio device error: {0}")]
    DeviceError(String),

    #[error("Plugin failed to instantiate: {0}")]
    PluginInstantiationFailed(String),

    #[error("Plugin crashed while scanning: {0}")]
    PluginCrashed(String),

    #[error("Plugin scan timed out: {0}")]
    PluginTimeout(String),

    #[error("Render cancelled")]
    RenderCancelled,

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Invariant violation: {0}")]
    InvariantViolation(String),

    #[error("Invalid parameter: {0}")]
    InvalidParam(String),
}

/// Result type alias
pub type WaveResult<T> = Result<T, WaveError>;

impl WaveError {
    /// Out-of-range helper carrying the offending indices.
    pub fn out_of_range(start: u64, len: u64, total: u64) -> Self {
        WaveError::OutOfRange(format!("{start}..{} of {total}", start + len))
    }
}
