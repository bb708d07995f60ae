//! WaveEdit DSP
//!
//! Stateless editing primitives (gain, normalise, fade, DC removal, clamp),
//! peak/RMS analysis, the parametric EQ bank, strip-silence segmentation and
//! the linear-interpolation sample-rate converter.
//!
//! Everything here operates on `we_core::PcmBuffer` ranges with a channel
//! mask; the pure functions allocate only where documented.

pub mod analysis;
pub mod biquad;
pub mod eq;
pub mod primitives;
pub mod resample;
pub mod strip_silence;

pub use analysis::{channel_mean, peak, peak_db, rms_db};
pub use biquad::{BiquadCoeffs, BiquadTDF2};
pub use eq::{EqBandKind, EqBandParams, EqController, EqParams, ParametricEq, MAX_EQ_BANDS};
pub use primitives::{
    apply_gain, clamp_to_valid_range, fade, fade_gain, normalize, remove_dc_offset, FadeCurve,
    FadeDirection, NormalizeMode, NormalizeOutcome,
};
pub use resample::resample_linear;
pub use strip_silence::{detect_regions, CandidateRegion, StripSilenceParams};

/// Convert decibels to a linear gain factor.
#[inline]
pub fn db_to_linear(db: f64) -> f64 {
    10.0_f64.powf(db / 20.0)
}

/// Convert a linear gain factor to decibels.
#[inline]
pub fn linear_to_db(linear: f64) -> f64 {
    20.0 * linear.log10()
}
