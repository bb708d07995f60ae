//! Editable PCM buffer
//!
//! Planar float storage: one `Vec<f32>` per channel, all the same length.
//! All range edits are sample-accurate and validated before any mutation, so
//! a failed operation leaves the buffer untouched. Values outside [-1, 1]
//! are preserved; clamping is an explicit operation.
//!
//! Mutation happens on the UI thread only; the playback engine reads through
//! a revocable shared handle and must be stopped (or the handle revoked)
//! before any length-changing edit.

use crate::error::{WaveError, WaveResult};
use crate::selection::mask_channels;
use crate::Sample;

/// Maximum supported channel count.
pub const MAX_CHANNELS: usize = 8;

/// Origin bit depth of decoded audio. Runtime processing is always float;
/// this is carried so saves can default to the source precision.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum BitDepth {
    Bits8,
    Bits16,
    #[default]
    Bits24,
    Bits32,
}

impl BitDepth {
    pub fn bits(&self) -> u32 {
        match self {
            BitDepth::Bits8 => 8,
            BitDepth::Bits16 => 16,
            BitDepth::Bits24 => 24,
            BitDepth::Bits32 => 32,
        }
    }

    pub fn from_bits(bits: u32) -> Option<Self> {
        match bits {
            8 => Some(BitDepth::Bits8),
            16 => Some(BitDepth::Bits16),
            24 => Some(BitDepth::Bits24),
            32 => Some(BitDepth::Bits32),
            _ => None,
        }
    }
}

/// Planar PCM audio buffer.
#[derive(Debug, Clone, PartialEq)]
pub struct PcmBuffer {
    data: Vec<Vec<Sample>>,
    sample_rate: f64,
    bit_depth: BitDepth,
}

impl PcmBuffer {
    /// Create a silent buffer of `samples` frames.
    pub fn new(channels: usize, samples: usize, sample_rate: f64) -> Self {
        let channels = channels.clamp(1, MAX_CHANNELS);
        Self {
            data: (0..channels).map(|_| vec![0.0; samples]).collect(),
            sample_rate,
            bit_depth: BitDepth::default(),
        }
    }

    /// Wrap existing channel data. All channels must have equal length.
    pub fn from_channels(data: Vec<Vec<Sample>>, sample_rate: f64) -> WaveResult<Self> {
        if data.is_empty() || data.len() > MAX_CHANNELS {
            return Err(WaveError::InvalidParam(format!(
                "channel count {} outside 1..={}",
                data.len(),
                MAX_CHANNELS
            )));
        }
        let len = data[0].len();
        if data.iter().any(|ch| ch.len() != len) {
            return Err(WaveError::InvariantViolation(
                "channel lengths differ".to_string(),
            ));
        }
        Ok(Self {
            data,
            sample_rate,
            bit_depth: BitDepth::default(),
        })
    }

    /// Replace the whole content.
    pub fn load(&mut self, data: Vec<Vec<Sample>>, sample_rate: f64, bit_depth: BitDepth) -> WaveResult<()> {
        let mut loaded = Self::from_channels(data, sample_rate)?;
        loaded.bit_depth = bit_depth;
        *self = loaded;
        Ok(())
    }

    pub fn channels(&self) -> usize {
        self.data.len()
    }

    /// Frames per channel.
    pub fn num_samples(&self) -> usize {
        self.data.first().map(|c| c.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.num_samples() == 0
    }

    pub fn sample_rate(&self) -> f64 {
        self.sample_rate
    }

    pub fn set_sample_rate(&mut self, sample_rate: f64) {
        self.sample_rate = sample_rate;
    }

    pub fn bit_depth(&self) -> BitDepth {
        self.bit_depth
    }

    pub fn set_bit_depth(&mut self, bit_depth: BitDepth) {
        self.bit_depth = bit_depth;
    }

    pub fn duration_secs(&self) -> f64 {
        if self.sample_rate <= 0.0 {
            0.0
        } else {
            self.num_samples() as f64 / self.sample_rate
        }
    }

    pub fn channel(&self, index: usize) -> Option<&[Sample]> {
        self.data.get(index).map(|v| v.as_slice())
    }

    pub fn channel_mut(&mut self, index: usize) -> Option<&mut [Sample]> {
        self.data.get_mut(index).map(|v| v.as_mut_slice())
    }

    /// Iterate all channel slices.
    pub fn channels_iter(&self) -> impl Iterator<Item = &[Sample]> {
        self.data.iter().map(|v| v.as_slice())
    }

    pub fn channels_iter_mut(&mut self) -> impl Iterator<Item = &mut [Sample]> {
        self.data.iter_mut().map(|v| v.as_mut_slice())
    }

    /// Zero all samples.
    pub fn clear(&mut self) {
        for ch in &mut self.data {
            ch.fill(0.0);
        }
    }

    fn check_range(&self, start: u64, len: u64) -> WaveResult<(usize, usize)> {
        let total = self.num_samples() as u64;
        let end = start.checked_add(len).ok_or_else(|| {
            WaveError::out_of_range(start, len, total)
        })?;
        if end > total {
            return Err(WaveError::out_of_range(start, len, total));
        }
        Ok((start as usize, len as usize))
    }

    /// Copy `[start, start+len)` into a new buffer with the same channel
    /// layout.
    pub fn slice(&self, start: u64, len: u64) -> WaveResult<PcmBuffer> {
        let (start, len) = self.check_range(start, len)?;
        let data = self
            .data
            .iter()
            .map(|ch| ch[start..start + len].to_vec())
            .collect();
        Ok(Self {
            data,
            sample_rate: self.sample_rate,
            bit_depth: self.bit_depth,
        })
    }

    /// Remove `[start, start+len)`, shifting the tail left.
    pub fn delete(&mut self, start: u64, len: u64) -> WaveResult<()> {
        let (start, len) = self.check_range(start, len)?;
        for ch in &mut self.data {
            ch.drain(start..start + len);
        }
        Ok(())
    }

    /// Insert `pcm` at `at`, shifting the tail right. Channel counts must
    /// match.
    pub fn insert(&mut self, at: u64, pcm: &PcmBuffer) -> WaveResult<()> {
        if pcm.channels() != self.channels() {
            return Err(WaveError::ChannelMismatch {
                expected: self.channels(),
                got: pcm.channels(),
            });
        }
        let total = self.num_samples() as u64;
        if at > total {
            return Err(WaveError::out_of_range(at, 0, total));
        }
        let at = at as usize;
        for (dst, src) in self.data.iter_mut().zip(pcm.data.iter()) {
            dst.splice(at..at, src.iter().copied());
        }
        Ok(())
    }

    /// Atomic delete + insert. `pcm.num_samples()` may differ from `len`.
    pub fn replace(&mut self, start: u64, len: u64, pcm: &PcmBuffer) -> WaveResult<()> {
        if pcm.channels() != self.channels() {
            return Err(WaveError::ChannelMismatch {
                expected: self.channels(),
                got: pcm.channels(),
            });
        }
        let (start, len) = self.check_range(start, len)?;
        for (dst, src) in self.data.iter_mut().zip(pcm.data.iter()) {
            dst.splice(start..start + len, src.iter().copied());
        }
        Ok(())
    }

    /// Zero `[start, start+len)` on the channels selected by `mask`.
    pub fn silence_range(&mut self, start: u64, len: u64, mask: u32) -> WaveResult<()> {
        let (start, len) = self.check_range(start, len)?;
        for ch in mask_channels(mask, self.channels()) {
            self.data[ch][start..start + len].fill(0.0);
        }
        Ok(())
    }

    /// Keep only `[start, start+len)`.
    pub fn trim_to_range(&mut self, start: u64, len: u64) -> WaveResult<()> {
        let (start, len) = self.check_range(start, len)?;
        for ch in &mut self.data {
            ch.truncate(start + len);
            ch.drain(..start);
        }
        Ok(())
    }

    /// Copy a range of the channels selected by `mask` into a new buffer.
    ///
    /// The result has `popcount(mask)` channels; ordering preserves the
    /// low-to-high bit order of the mask.
    pub fn copy_channels(&self, start: u64, len: u64, mask: u32) -> WaveResult<PcmBuffer> {
        let (start, len) = self.check_range(start, len)?;
        let selected = mask_channels(mask, self.channels());
        if selected.is_empty() {
            return Err(WaveError::InvalidParam("empty channel mask".to_string()));
        }
        let data = selected
            .iter()
            .map(|&ch| self.data[ch][start..start + len].to_vec())
            .collect();
        Ok(Self {
            data,
            sample_rate: self.sample_rate,
            bit_depth: self.bit_depth,
        })
    }

    /// Per-channel overwrite starting at `start` on the channels selected by
    /// `mask`; source channel `j` lands on the `j`-th set bit. Does not alter
    /// length; the source is silently clamped to what fits.
    pub fn replace_channels(&mut self, start: u64, src: &PcmBuffer, mask: u32) -> WaveResult<()> {
        let total = self.num_samples() as u64;
        if start > total {
            return Err(WaveError::out_of_range(start, 0, total));
        }
        let start = start as usize;
        let selected = mask_channels(mask, self.channels());
        if selected.len() != src.channels() {
            return Err(WaveError::ChannelMismatch {
                expected: selected.len(),
                got: src.channels(),
            });
        }
        let writable = (self.num_samples() - start).min(src.num_samples());
        for (j, &ch) in selected.iter().enumerate() {
            self.data[ch][start..start + writable].copy_from_slice(&src.data[j][..writable]);
        }
        Ok(())
    }

    /// Convert to `target` channels with the standard mix matrix:
    /// 1→2 duplicates, 2→1 averages, N→1 is an equal-weight sum / N,
    /// N→2 uses speaker-position weights (L/R primary, centre ×0.7071 into
    /// both, LFE dropped, surrounds ×0.7071 into their side), and M→N with
    /// M<N fills the extra channels with silence.
    pub fn convert_channel_count(&mut self, target: usize) -> WaveResult<()> {
        if target == 0 || target > MAX_CHANNELS {
            return Err(WaveError::InvalidParam(format!(
                "target channel count {} outside 1..={}",
                target, MAX_CHANNELS
            )));
        }
        let current = self.channels();
        if target == current {
            return Ok(());
        }
        let n = self.num_samples();

        let new_data: Vec<Vec<Sample>> = if current == 1 && target == 2 {
            vec![self.data[0].clone(), self.data[0].clone()]
        } else if target == 1 {
            // Equal-weight sum; the stereo case reduces to the average.
            let scale = 1.0 / current as f32;
            let mut mono = vec![0.0f32; n];
            for ch in &self.data {
                for (dst, &s) in mono.iter_mut().zip(ch.iter()) {
                    *dst += s;
                }
            }
            for s in &mut mono {
                *s *= scale;
            }
            vec![mono]
        } else if target == 2 && current > 2 {
            self.downmix_to_stereo(n)
        } else if target > current {
            let mut data = self.data.clone();
            while data.len() < target {
                data.push(vec![0.0; n]);
            }
            data
        } else {
            // More source than target channels with no defined matrix:
            // keep the first `target` channels.
            self.data[..target].to_vec()
        };

        self.data = new_data;
        Ok(())
    }

    /// Speaker-position downmix for layouts above stereo. Channel order is
    /// assumed L R C LFE Ls Rs (extra surrounds alternate sides).
    fn downmix_to_stereo(&self, n: usize) -> Vec<Vec<Sample>> {
        const MINUS_3DB: f32 = std::f32::consts::FRAC_1_SQRT_2;
        let mut left = vec![0.0f32; n];
        let mut right = vec![0.0f32; n];
        for (idx, ch) in self.data.iter().enumerate() {
            let (wl, wr) = match idx {
                0 => (1.0, 0.0),                 // L
                1 => (0.0, 1.0),                 // R
                2 => (MINUS_3DB, MINUS_3DB),     // C
                3 => (0.0, 0.0),                 // LFE dropped
                i if i % 2 == 0 => (MINUS_3DB, 0.0), // Ls and further left surrounds
                _ => (0.0, MINUS_3DB),           // Rs and further right surrounds
            };
            if wl == 0.0 && wr == 0.0 {
                continue;
            }
            for (i, &s) in ch.iter().enumerate() {
                left[i] += s * wl;
                right[i] += s * wr;
            }
        }
        vec![left, right]
    }

    /// Equal-weight mono mixdown (sum of channels / C). Used by analysis
    /// passes such as strip-silence.
    pub fn mix_down_mono(&self) -> Vec<Sample> {
        let n = self.num_samples();
        let scale = 1.0 / self.channels() as f32;
        let mut mono = vec![0.0f32; n];
        for ch in &self.data {
            for (dst, &s) in mono.iter_mut().zip(ch.iter()) {
                *dst += s;
            }
        }
        for s in &mut mono {
            *s *= scale;
        }
        mono
    }

    /// Reverse `[start, start+len)` on the channels selected by `mask`.
    pub fn reverse(&mut self, start: u64, len: u64, mask: u32) -> WaveResult<()> {
        let (start, len) = self.check_range(start, len)?;
        for ch in mask_channels(mask, self.channels()) {
            self.data[ch][start..start + len].reverse();
        }
        Ok(())
    }

    /// Flip polarity of `[start, start+len)` on the channels selected by
    /// `mask`.
    pub fn phase_invert(&mut self, start: u64, len: u64, mask: u32) -> WaveResult<()> {
        let (start, len) = self.check_range(start, len)?;
        for ch in mask_channels(mask, self.channels()) {
            for s in &mut self.data[ch][start..start + len] {
                *s = -*s;
            }
        }
        Ok(())
    }
}
