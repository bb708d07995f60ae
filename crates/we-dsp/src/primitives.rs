//! Destructive editing primitives
//!
//! Pure range operations over `PcmBuffer`: gain, normalise, fades, DC offset
//! removal and hard clamping. Each validates its range first and mutates only
//! the masked channels.

use crate::analysis;
use crate::db_to_linear;
use we_core::selection::mask_channels;
use we_core::{PcmBuffer, WaveError, WaveResult};

/// Fade curve shapes. `x` runs 0..1 across the faded range.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum FadeCurve {
    #[default]
    Linear,
    Exponential,
    Logarithmic,
    SCurve,
}

/// Fade direction.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FadeDirection {
    In,
    Out,
}

/// Normalisation measurement mode.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum NormalizeMode {
    #[default]
    Peak,
    Rms,
}

/// What a normalise call did.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum NormalizeOutcome {
    /// Gain in dB that was applied.
    Applied { gain_db: f64 },
    /// Input was silent; nothing to scale.
    NoOp,
}

fn check_range(buf: &PcmBuffer, start: u64, len: u64) -> WaveResult<(usize, usize)> {
    let total = buf.num_samples() as u64;
    if start.checked_add(len).map_or(true, |end| end > total) {
        return Err(WaveError::out_of_range(start, len, total));
    }
    Ok((start as usize, len as usize))
}

/// Apply `gain_db` to the masked channels of `[start, start+len)`.
///
/// Values far outside the useful range are applied anyway but logged, since
/// they usually indicate a unit mix-up in the caller.
pub fn apply_gain(
    buf: &mut PcmBuffer,
    start: u64,
    len: u64,
    mask: u32,
    gain_db: f64,
) -> WaveResult<()> {
    let (start, len) = check_range(buf, start, len)?;
    if !(-100.0..=40.0).contains(&gain_db) {
        log::warn!("applying extreme gain of {gain_db:.1} dB");
    }
    let factor = db_to_linear(gain_db) as f32;
    for ch in mask_channels(mask, buf.channels()) {
        if let Some(data) = buf.channel_mut(ch) {
            for s in &mut data[start..start + len] {
                *s *= factor;
            }
        }
    }
    Ok(())
}

/// Normalise the masked range to `target_db`, measuring with `mode`.
///
/// Two passes: measure, then apply the delta in dB. Silent input is a no-op.
pub fn normalize(
    buf: &mut PcmBuffer,
    start: u64,
    len: u64,
    mask: u32,
    target_db: f64,
    mode: NormalizeMode,
) -> WaveResult<NormalizeOutcome> {
    check_range(buf, start, len)?;
    let current_db = match mode {
        NormalizeMode::Peak => analysis::peak_db(buf, start, len, mask)?,
        NormalizeMode::Rms => analysis::rms_db(buf, start, len, mask)?,
    };
    if current_db == f64::NEG_INFINITY {
        return Ok(NormalizeOutcome::NoOp);
    }
    let gain_db = target_db - current_db;
    apply_gain(buf, start, len, mask, gain_db)?;
    Ok(NormalizeOutcome::Applied { gain_db })
}

/// Per-sample fade multiplier for position `x` in `[0, 1]`.
///
/// Fade-out shapes are inverted so the perceptual character of the curve
/// name is preserved: an exponential fade-out starts fast and ends slow.
#[inline]
pub fn fade_gain(direction: FadeDirection, curve: FadeCurve, x: f64) -> f64 {
    match direction {
        FadeDirection::In => match curve {
            FadeCurve::Linear => x,
            FadeCurve::Exponential => x * x,
            FadeCurve::Logarithmic => 1.0 - (1.0 - x) * (1.0 - x),
            FadeCurve::SCurve => x * x * (3.0 - 2.0 * x),
        },
        FadeDirection::Out => match curve {
            FadeCurve::Linear => 1.0 - x,
            FadeCurve::Exponential => (1.0 - x) * (1.0 - x),
            FadeCurve::Logarithmic => 1.0 - x * x,
            FadeCurve::SCurve => 1.0 - x * x * (3.0 - 2.0 * x),
        },
    }
}

/// Apply a fade over the masked channels of `[start, start+len)`.
///
/// The ramp position is `i / (len - 1)` so a fade-in is exactly 0 at the
/// first sample and exactly 1 at the last.
pub fn fade(
    buf: &mut PcmBuffer,
    start: u64,
    len: u64,
    mask: u32,
    direction: FadeDirection,
    curve: FadeCurve,
) -> WaveResult<()> {
    let (start, len) = check_range(buf, start, len)?;
    if len == 0 {
        return Ok(());
    }
    let denom = (len - 1).max(1) as f64;
    let channels = mask_channels(mask, buf.channels());
    for i in 0..len {
        let x = if len == 1 { 1.0 } else { i as f64 / denom };
        let g = fade_gain(direction, curve, x) as f32;
        for &ch in &channels {
            if let Some(data) = buf.channel_mut(ch) {
                data[start + i] *= g;
            }
        }
    }
    Ok(())
}

/// Subtract the per-channel mean of the masked range.
pub fn remove_dc_offset(buf: &mut PcmBuffer, start: u64, len: u64, mask: u32) -> WaveResult<()> {
    let (start_idx, len_idx) = check_range(buf, start, len)?;
    for ch in mask_channels(mask, buf.channels()) {
        let mean = analysis::channel_mean(buf, ch, start, len)? as f32;
        if let Some(data) = buf.channel_mut(ch) {
            for s in &mut data[start_idx..start_idx + len_idx] {
                *s -= mean;
            }
        }
    }
    Ok(())
}

/// Hard-limit the masked range to [-1, 1]. Returns the number of samples
/// that were clipped.
pub fn clamp_to_valid_range(
    buf: &mut PcmBuffer,
    start: u64,
    len: u64,
    mask: u32,
) -> WaveResult<usize> {
    let (start, len) = check_range(buf, start, len)?;
    let mut clipped = 0usize;
    for ch in mask_channels(mask, buf.channels()) {
        if let Some(data) = buf.channel_mut(ch) {
            for s in &mut data[start..start + len] {
                if *s > 1.0 {
                    *s = 1.0;
                    clipped += 1;
                } else if *s < -1.0 {
                    *s = -1.0;
                    clipped += 1;
                }
            }
        }
    }
    Ok(clipped)
}

/// Measured delta a normalise pass would apply, without mutating. Used by
/// the real-time normalise preview.
pub fn normalize_delta_db(
    buf: &PcmBuffer,
    start: u64,
    len: u64,
    mask: u32,
    target_db: f64,
    mode: NormalizeMode,
) -> WaveResult<Option<f64>> {
    let current_db = match mode {
        NormalizeMode::Peak => analysis::peak_db(buf, start, len, mask)?,
        NormalizeMode::Rms => analysis::rms_db(buf, start, len, mask)?,
    };
    if current_db == f64::NEG_INFINITY {
        return Ok(None);
    }
    Ok(Some(target_db - current_db))
}
