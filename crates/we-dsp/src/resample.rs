//! Linear-interpolation sample-rate conversion
//!
//! Serves the inter-document clipboard and encode-time conversion. Output
//! length is `round(src_len * target_rate / src_rate)`.

use we_core::PcmBuffer;

/// Resample `src` to `target_rate`. Returns a clone when the rates already
/// match. Zero-length input stays zero-length.
pub fn resample_linear(src: &PcmBuffer, target_rate: f64) -> PcmBuffer {
    let src_rate = src.sample_rate();
    if src_rate == target_rate || src.is_empty() {
        let mut out = src.clone();
        out.set_sample_rate(target_rate);
        return out;
    }

    let ratio = target_rate / src_rate;
    let src_frames = src.num_samples();
    let new_frames = (src_frames as f64 * ratio).round() as usize;

    let mut channels: Vec<Vec<f32>> = Vec::with_capacity(src.channels());
    for ch in src.channels_iter() {
        let mut out = Vec::with_capacity(new_frames);
        for frame in 0..new_frames {
            let src_pos = frame as f64 / ratio;
            let idx0 = src_pos.floor() as usize;
            let frac = (src_pos - idx0 as f64) as f32;
            let idx0 = idx0.min(src_frames - 1);
            let idx1 = (idx0 + 1).min(src_frames - 1);

            let s0 = ch[idx0];
            let s1 = ch[idx1];
            out.push(s0 + (s1 - s0) * frac);
        }
        channels.push(out);
    }

    let mut result = PcmBuffer::from_channels(channels, target_rate)
        .unwrap_or_else(|_| PcmBuffer::new(src.channels(), 0, target_rate));
    result.set_bit_depth(src.bit_depth());
    result
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_same_rate_is_identity() {
        let buf = PcmBuffer::from_channels(vec![vec![0.1f32, 0.2, 0.3]], 48000.0).unwrap();
        let out = resample_linear(&buf, 48000.0);
        assert_eq!(out, buf);
    }

    #[test]
    fn test_output_length_is_rounded_ratio() {
        let buf = PcmBuffer::new(2, 44100, 44100.0);
        let out = resample_linear(&buf, 48000.0);
        assert_eq!(out.num_samples(), 48000);
        assert_eq!(out.channels(), 2);
        assert_eq!(out.sample_rate(), 48000.0);
    }

    #[test]
    fn test_downsample_length() {
        let buf = PcmBuffer::new(1, 48000, 48000.0);
        let out = resample_linear(&buf, 22050.0);
        assert_eq!(out.num_samples(), (48000.0f64 * 22050.0 / 48000.0).round() as usize);
    }

    #[test]
    fn test_dc_preserved() {
        let buf = PcmBuffer::from_channels(vec![vec![0.75f32; 1000]], 44100.0).unwrap();
        let out = resample_linear(&buf, 48000.0);
        for &s in out.channel(0).unwrap() {
            assert!((s - 0.75).abs() < 1e-6);
        }
    }

    #[test]
    fn test_empty_input() {
        let buf = PcmBuffer::new(2, 0, 44100.0);
        let out = resample_linear(&buf, 96000.0);
        assert!(out.is_empty());
        assert_eq!(out.sample_rate(), 96000.0);
    }
}
