//! Preview modes
//!
//! The non-destructive audition path chosen by the UI and executed in the
//! audio callback. Modes are published as `Arc` snapshots so switching costs
//! the callback a refcount, never a deep copy.

use std::sync::Arc;

use we_core::PcmBuffer;
use we_dsp::{FadeCurve, FadeDirection};
use we_plugin::PluginChain;

/// Primitive auditioned by the `RealtimeDsp` mode.
///
/// Parameters are baked into the variant on the UI thread (the DC means and
/// the normalise delta are measured there); the callback only applies them.
#[derive(Debug, Clone)]
pub enum DspPreviewKind {
    Gain {
        gain_db: f64,
    },
    /// Pre-measured normalise delta, applied as a plain gain.
    NormalizeDelta {
        delta_db: f64,
    },
    /// Pre-measured per-channel means to subtract.
    DcRemove {
        channel_means: Vec<f32>,
    },
    /// Envelope over an absolute sample range.
    Fade {
        direction: FadeDirection,
        curve: FadeCurve,
        range_start: u64,
        range_len: u64,
    },
    /// Routed through the engine-owned parametric EQ.
    Eq,
}

/// Audition path selection. Modes are mutually exclusive.
pub enum PreviewMode {
    /// Raw PCM at the cursor.
    Disabled,
    /// A pre-rendered buffer substituted for `[range_start,
    /// range_start + pcm.len)` of the file; `range_start` is the
    /// preview-selection offset that maps preview-local time back to
    /// file-absolute time for the UI cursor.
    OfflineBuffer {
        pcm: Arc<PcmBuffer>,
        range_start: u64,
    },
    /// Raw PCM through one configurable primitive.
    RealtimeDsp(DspPreviewKind),
    /// Raw PCM through the live plug-in chain.
    PluginChainInsert { chain: Arc<PluginChain> },
}

impl PreviewMode {
    /// File-absolute offset of the preview buffer, when one is active.
    pub fn preview_selection_offset(&self) -> Option<u64> {
        match self {
            PreviewMode::OfflineBuffer { range_start, .. } => Some(*range_start),
            _ => None,
        }
    }
}

impl std::fmt::Debug for PreviewMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            PreviewMode::Disabled => write!(f, "Disabled"),
            PreviewMode::OfflineBuffer { pcm, range_start } => f
                .debug_struct("OfflineBuffer")
                .field("len", &pcm.num_samples())
                .field("range_start", range_start)
                .finish(),
            PreviewMode::RealtimeDsp(kind) => f.debug_tuple("RealtimeDsp").field(kind).finish(),
            PreviewMode::PluginChainInsert { chain } => f
                .debug_struct("PluginChainInsert")
                .field("nodes", &chain.len())
                .finish(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_preview_selection_offset() {
        let pcm = Arc::new(PcmBuffer::new(1, 128, 48000.0));
        let mode = PreviewMode::OfflineBuffer {
            pcm,
            range_start: 12000,
        };
        assert_eq!(mode.preview_selection_offset(), Some(12000));
        assert_eq!(PreviewMode::Disabled.preview_selection_offset(), None);
    }
}
