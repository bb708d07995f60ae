//! Parametric EQ
//!
//! Bank of up to 20 biquad bands, one filter per band per channel, plus an
//! output gain stage. Parameters are double-buffered: the UI writes a
//! pending set and raises an atomic dirty flag; the audio thread picks the
//! set up under a try-lock at the next block and recomputes coefficients for
//! changed bands only. Neither side ever waits.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use parking_lot::Mutex;

use crate::biquad::{BiquadCoeffs, BiquadTDF2};
use crate::db_to_linear;
use we_core::{PcmBuffer, MAX_CHANNELS};

/// Maximum number of EQ bands.
pub const MAX_EQ_BANDS: usize = 20;

/// Filter type for an EQ band.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum EqBandKind {
    #[default]
    Bell,
    LowShelf,
    HighShelf,
    LowCut,
    HighCut,
    Notch,
    Bandpass,
}

impl EqBandKind {
    /// Cut, notch and bandpass shapes have no gain parameter; it must be
    /// ignored when computing coefficients.
    pub fn uses_gain(&self) -> bool {
        matches!(self, EqBandKind::Bell | EqBandKind::LowShelf | EqBandKind::HighShelf)
    }
}

/// Parameters for a single band.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct EqBandParams {
    pub enabled: bool,
    pub kind: EqBandKind,
    /// Center / corner frequency in Hz, 20..20000.
    pub frequency: f64,
    /// Band gain in dB, -24..+24. Ignored for kinds without gain.
    pub gain_db: f64,
    /// Quality factor, 0.1..18.
    pub q: f64,
}

impl Default for EqBandParams {
    fn default() -> Self {
        Self {
            enabled: false,
            kind: EqBandKind::Bell,
            frequency: 1000.0,
            gain_db: 0.0,
            q: 1.0,
        }
    }
}

impl EqBandParams {
    fn clamped(mut self) -> Self {
        self.frequency = self.frequency.clamp(20.0, 20000.0);
        self.gain_db = self.gain_db.clamp(-24.0, 24.0);
        self.q = self.q.clamp(0.1, 18.0);
        self
    }

    fn coefficients(&self, sample_rate: f64) -> BiquadCoeffs {
        // Gain is deliberately not consulted for the gainless kinds.
        match self.kind {
            EqBandKind::Bell => BiquadCoeffs::peaking(self.frequency, self.q, self.gain_db, sample_rate),
            EqBandKind::LowShelf => BiquadCoeffs::low_shelf(self.frequency, self.q, self.gain_db, sample_rate),
            EqBandKind::HighShelf => BiquadCoeffs::high_shelf(self.frequency, self.q, self.gain_db, sample_rate),
            EqBandKind::LowCut => BiquadCoeffs::highpass(self.frequency, self.q, sample_rate),
            EqBandKind::HighCut => BiquadCoeffs::lowpass(self.frequency, self.q, sample_rate),
            EqBandKind::Notch => BiquadCoeffs::notch(self.frequency, self.q, sample_rate),
            EqBandKind::Bandpass => BiquadCoeffs::bandpass(self.frequency, self.q, sample_rate),
        }
    }
}

/// Full EQ parameter set.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct EqParams {
    /// Up to [`MAX_EQ_BANDS`] entries; extras are ignored.
    pub bands: Vec<EqBandParams>,
    /// Output gain applied after the filter bank, in dB.
    pub output_gain_db: f64,
}

struct EqShared {
    pending: Mutex<EqParams>,
    dirty: AtomicBool,
}

/// UI-side handle for pushing parameter changes.
#[derive(Clone)]
pub struct EqController {
    shared: Arc<EqShared>,
}

impl EqController {
    /// Replace the band list. Picked up by the audio thread at the next
    /// block boundary.
    pub fn set_parameters(&self, params: EqParams) {
        *self.shared.pending.lock() = params;
        self.shared.dirty.store(true, Ordering::Release);
    }
}

/// The EQ bank itself. Owned by whatever drives the audio path (engine or
/// offline renderer); `process` is real-time safe after `prepare`.
pub struct ParametricEq {
    shared: Arc<EqShared>,
    active: EqParams,
    /// Per-band, per-channel filter state, pre-allocated by `prepare`.
    filters: Vec<Vec<BiquadTDF2>>,
    coeffs: Vec<BiquadCoeffs>,
    sample_rate: f64,
    channels: usize,
    output_gain: f32,
}

impl Default for ParametricEq {
    fn default() -> Self {
        Self::new()
    }
}

impl ParametricEq {
    pub fn new() -> Self {
        Self {
            shared: Arc::new(EqShared {
                pending: Mutex::new(EqParams::default()),
                dirty: AtomicBool::new(false),
            }),
            active: EqParams::default(),
            filters: Vec::new(),
            coeffs: Vec::new(),
            sample_rate: 48000.0,
            channels: 0,
            output_gain: 1.0,
        }
    }

    /// Handle for the UI thread.
    pub fn controller(&self) -> EqController {
        EqController {
            shared: Arc::clone(&self.shared),
        }
    }

    /// Reset state and allocate filter storage for the given layout.
    pub fn prepare(&mut self, sample_rate: f64, _max_block_size: usize, channels: usize) {
        self.sample_rate = if sample_rate > 0.0 { sample_rate } else { 48000.0 };
        self.channels = channels.min(MAX_CHANNELS);
        self.filters = (0..MAX_EQ_BANDS)
            .map(|_| vec![BiquadTDF2::new(); self.channels])
            .collect();
        self.coeffs = vec![BiquadCoeffs::bypass(); MAX_EQ_BANDS];
        self.rebuild_all();
    }

    /// Convenience for single-owner use; equivalent to
    /// `controller().set_parameters(..)`.
    pub fn set_parameters(&self, params: EqParams) {
        self.controller().set_parameters(params);
    }

    /// Current parameter set as seen by the audio path.
    pub fn active_params(&self) -> &EqParams {
        &self.active
    }

    fn rebuild_all(&mut self) {
        let bands = self.active.bands.clone();
        for (i, band) in bands.iter().take(MAX_EQ_BANDS).enumerate() {
            self.update_band(i, band);
        }
        self.output_gain = db_to_linear(self.active.output_gain_db) as f32;
    }

    fn update_band(&mut self, index: usize, band: &EqBandParams) {
        let band = band.clamped();
        let coeffs = if band.enabled {
            band.coefficients(self.sample_rate)
        } else {
            BiquadCoeffs::bypass()
        };
        self.coeffs[index] = coeffs;
        for filter in &mut self.filters[index] {
            filter.set_coeffs(coeffs);
        }
    }

    /// Pull pending parameters if flagged. Recomputes only bands that
    /// actually changed. On lock contention the previous coefficients stay
    /// in use and the flag is left set for the next block.
    fn refresh_params(&mut self) {
        if !self.shared.dirty.load(Ordering::Acquire) {
            return;
        }
        let Some(pending) = self.shared.pending.try_lock() else {
            return;
        };
        let new_params = pending.clone();
        drop(pending);
        self.shared.dirty.store(false, Ordering::Release);

        for i in 0..MAX_EQ_BANDS {
            let old = self.active.bands.get(i).copied().unwrap_or_default();
            let new = new_params.bands.get(i).copied().unwrap_or_default();
            if old != new {
                self.update_band(i, &new);
            }
        }
        if new_params.output_gain_db != self.active.output_gain_db {
            self.output_gain = db_to_linear(new_params.output_gain_db) as f32;
        }
        self.active = new_params;
    }

    /// Process a block in place. Real-time safe: no allocation, no blocking.
    pub fn process(&mut self, block: &mut PcmBuffer) {
        if self.filters.is_empty() {
            return;
        }
        self.refresh_params();
        let channels = block.channels().min(self.channels);
        for band_idx in 0..MAX_EQ_BANDS {
            let enabled = self
                .active
                .bands
                .get(band_idx)
                .map(|b| b.enabled)
                .unwrap_or(false);
            if !enabled {
                continue;
            }
            for ch in 0..channels {
                let filter = &mut self.filters[band_idx][ch];
                if let Some(data) = block.channel_mut(ch) {
                    filter.process_block(data);
                }
            }
        }
        if self.output_gain != 1.0 {
            for ch in 0..channels {
                if let Some(data) = block.channel_mut(ch) {
                    for s in data.iter_mut() {
                        *s *= self.output_gain;
                    }
                }
            }
        }
    }

    /// Clear filter state (keeps parameters).
    pub fn reset(&mut self) {
        for band in &mut self.filters {
            for filter in band {
                filter.reset();
            }
        }
    }

    /// Combined magnitude response in dB at each query frequency, from the
    /// currently active coefficients plus the output gain stage.
    pub fn frequency_response(&self, freqs: &[f64]) -> Vec<f64> {
        freqs
            .iter()
            .map(|&f| {
                let mut mag = db_to_linear(self.active.output_gain_db);
                let band_count = self.active.bands.len().min(self.coeffs.len());
                for (i, band) in self.active.bands.iter().take(band_count).enumerate() {
                    if band.enabled {
                        mag *= self.coeffs[i].magnitude_at(f, self.sample_rate);
                    }
                }
                if mag > 0.0 {
                    20.0 * mag.log10()
                } else {
                    f64::NEG_INFINITY
                }
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn band(kind: EqBandKind, freq: f64, gain_db: f64, q: f64) -> EqBandParams {
        EqBandParams {
            enabled: true,
            kind,
            frequency: freq,
            gain_db,
            q,
        }
    }

    fn prepared_eq(params: EqParams) -> ParametricEq {
        let mut eq = ParametricEq::new();
        eq.prepare(48000.0, 512, 1);
        eq.set_parameters(params);
        // First process pulls the pending set.
        let mut silence = PcmBuffer::new(1, 16, 48000.0);
        eq.process(&mut silence);
        eq
    }

    #[test]
    fn test_bell_boost_raises_center_frequency() {
        let eq = prepared_eq(EqParams {
            bands: vec![band(EqBandKind::Bell, 1000.0, 12.0, 2.0)],
            output_gain_db: 0.0,
        });
        let response = eq.frequency_response(&[100.0, 1000.0, 10000.0]);
        assert!((response[1] - 12.0).abs() < 0.2);
        assert!(response[0].abs() < 1.0);
        assert!(response[2].abs() < 1.0);
    }

    #[test]
    fn test_gainless_kinds_ignore_gain() {
        // A notch with absurd gain must produce the same curve as one with
        // zero gain.
        let with_gain = prepared_eq(EqParams {
            bands: vec![band(EqBandKind::Notch, 500.0, 24.0, 4.0)],
            output_gain_db: 0.0,
        });
        let without_gain = prepared_eq(EqParams {
            bands: vec![band(EqBandKind::Notch, 500.0, 0.0, 4.0)],
            output_gain_db: 0.0,
        });
        let freqs = [100.0, 500.0, 2000.0];
        assert_eq!(
            with_gain.frequency_response(&freqs),
            without_gain.frequency_response(&freqs)
        );
    }

    #[test]
    fn test_dirty_flag_applied_at_block_boundary() {
        let mut eq = ParametricEq::new();
        eq.prepare(48000.0, 512, 1);
        let controller = eq.controller();

        controller.set_parameters(EqParams {
            bands: vec![band(EqBandKind::Bell, 1000.0, -6.0, 1.0)],
            output_gain_db: 0.0,
        });

        // Not applied until a block is processed.
        assert!(eq.active_params().bands.is_empty());
        let mut blk = PcmBuffer::new(1, 64, 48000.0);
        eq.process(&mut blk);
        assert_eq!(eq.active_params().bands.len(), 1);
    }

    #[test]
    fn test_output_gain_stage() {
        let mut eq = prepared_eq(EqParams {
            bands: Vec::new(),
            output_gain_db: -6.0,
        });
        let mut blk = PcmBuffer::from_channels(vec![vec![1.0f32; 64]], 48000.0).unwrap();
        eq.process(&mut blk);
        let factor = db_to_linear(-6.0) as f32;
        assert!((blk.channel(0).unwrap()[10] - factor).abs() < 1e-6);
    }

    #[test]
    fn test_band_count_capped() {
        let bands = vec![band(EqBandKind::Bell, 1000.0, 3.0, 1.0); 25];
        let eq = prepared_eq(EqParams {
            bands,
            output_gain_db: 0.0,
        });
        // Only MAX_EQ_BANDS contribute to the response.
        let response = eq.frequency_response(&[1000.0]);
        assert!(response[0] > 20.0 * 3.0 - 1.0);
        assert!(response[0] <= 20.0 * 3.0 + 1.0);
    }

    #[test]
    fn test_disabled_band_is_bypass() {
        let mut params = EqParams {
            bands: vec![band(EqBandKind::Bell, 1000.0, 12.0, 1.0)],
            output_gain_db: 0.0,
        };
        params.bands[0].enabled = false;
        let mut eq = prepared_eq(params);

        let mut blk = PcmBuffer::from_channels(vec![vec![0.5f32; 64]], 48000.0).unwrap();
        let before = blk.clone();
        eq.process(&mut blk);
        assert_eq!(blk, before);
    }
}
