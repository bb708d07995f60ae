//! Audio encoding
//!
//! WAV through hound, FLAC through flac-bound, OGG Vorbis through an
//! external `ffmpeg` process when one is installed. Sample-rate conversion
//! happens before encoding when the caller requests a different target
//! rate.

use std::io::Cursor;
use std::path::Path;
use std::process::Command;

use we_core::{BitDepth, PcmBuffer, WaveError, WaveResult};
use we_dsp::resample_linear;

use crate::metadata::{append_wav_sidecars, AudioMetadata};

/// Output container/codec.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EncodeFormat {
    Wav,
    Flac,
    Ogg,
}

impl EncodeFormat {
    pub fn extension(&self) -> &'static str {
        match self {
            EncodeFormat::Wav => "wav",
            EncodeFormat::Flac => "flac",
            EncodeFormat::Ogg => "ogg",
        }
    }
}

/// Everything a save needs besides the samples.
#[derive(Debug, Clone)]
pub struct EncodeRequest {
    pub format: EncodeFormat,
    pub bit_depth: BitDepth,
    /// Lossy quality, 0..=10.
    pub quality: u8,
    pub metadata: AudioMetadata,
    /// Convert to this rate before encoding when it differs from the source.
    pub target_sample_rate: Option<f64>,
}

impl EncodeRequest {
    pub fn wav(bit_depth: BitDepth) -> Self {
        Self {
            format: EncodeFormat::Wav,
            bit_depth,
            quality: 10,
            metadata: AudioMetadata::default(),
            target_sample_rate: None,
        }
    }
}

fn encode_error(path: &Path, reason: impl std::fmt::Display) -> WaveError {
    WaveError::EncodeFailed {
        path: path.display().to_string(),
        reason: reason.to_string(),
    }
}

fn interleave(pcm: &PcmBuffer) -> Vec<f32> {
    let channels = pcm.channels();
    let frames = pcm.num_samples();
    let mut out = Vec::with_capacity(channels * frames);
    for frame in 0..frames {
        for ch in 0..channels {
            out.push(pcm.channel(ch).map(|c| c[frame]).unwrap_or(0.0));
        }
    }
    out
}

/// Encode `pcm` to `path`.
pub fn encode(pcm: &PcmBuffer, path: &Path, request: &EncodeRequest) -> WaveResult<()> {
    let converted;
    let source = match request.target_sample_rate {
        Some(target) if target != pcm.sample_rate() => {
            converted = resample_linear(pcm, target);
            &converted
        }
        _ => pcm,
    };

    match request.format {
        EncodeFormat::Wav => encode_wav(source, path, request),
        EncodeFormat::Flac => encode_flac(source, path, request),
        EncodeFormat::Ogg => encode_ogg(source, path, request),
    }
}

fn encode_wav(pcm: &PcmBuffer, path: &Path, request: &EncodeRequest) -> WaveResult<()> {
    let mut output = Vec::new();
    let cursor = Cursor::new(&mut output);

    let spec = hound::WavSpec {
        channels: pcm.channels() as u16,
        sample_rate: pcm.sample_rate() as u32,
        bits_per_sample: request.bit_depth.bits() as u16,
        sample_format: match request.bit_depth {
            BitDepth::Bits32 => hound::SampleFormat::Float,
            _ => hound::SampleFormat::Int,
        },
    };

    let mut writer =
        hound::WavWriter::new(cursor, spec).map_err(|e| encode_error(path, e))?;

    let samples = interleave(pcm);
    match request.bit_depth {
        BitDepth::Bits8 => {
            for &sample in &samples {
                let s = (sample.clamp(-1.0, 1.0) * 127.0) as i8;
                writer.write_sample(s).map_err(|e| encode_error(path, e))?;
            }
        }
        BitDepth::Bits16 => {
            for &sample in &samples {
                let s = (sample.clamp(-1.0, 1.0) * 32767.0) as i16;
                writer.write_sample(s).map_err(|e| encode_error(path, e))?;
            }
        }
        BitDepth::Bits24 => {
            for &sample in &samples {
                let s = (sample.clamp(-1.0, 1.0) * 8_388_607.0) as i32;
                writer.write_sample(s).map_err(|e| encode_error(path, e))?;
            }
        }
        BitDepth::Bits32 => {
            // Float format: out-of-range values survive the round trip.
            for &sample in &samples {
                writer.write_sample(sample).map_err(|e| encode_error(path, e))?;
            }
        }
    }
    writer.finalize().map_err(|e| encode_error(path, e))?;

    append_wav_sidecars(
        &mut output,
        request.metadata.bwf.as_ref(),
        request.metadata.ixml.as_deref(),
    );
    std::fs::write(path, output).map_err(|e| encode_error(path, e))
}

fn encode_flac(pcm: &PcmBuffer, path: &Path, request: &EncodeRequest) -> WaveResult<()> {
    use flac_bound::{FlacEncoder, WriteWrapper};

    // FLAC is integer-only and capped at 24 bits in practice.
    let bits = match request.bit_depth {
        BitDepth::Bits32 => {
            log::warn!("FLAC limited to 24 bits, narrowing from 32");
            24
        }
        other => other.bits(),
    };
    let compression = u32::from(request.quality.min(8));

    let mut output = Vec::new();
    {
        let config = FlacEncoder::new()
            .ok_or_else(|| encode_error(path, "FLAC encoder init failed"))?
            .channels(pcm.channels() as u32)
            .sample_rate(pcm.sample_rate() as u32)
            .bits_per_sample(bits)
            .compression_level(compression);

        let mut wrapper = WriteWrapper(&mut output);
        let mut encoder = config
            .init_write(&mut wrapper)
            .map_err(|e| encode_error(path, format!("FLAC init failed: {e:?}")))?;

        let max_val = ((1i64 << (bits - 1)) - 1) as f32;
        let samples: Vec<i32> = interleave(pcm)
            .iter()
            .map(|&s| (s.clamp(-1.0, 1.0) * max_val) as i32)
            .collect();

        let channels = pcm.channels();
        let frames = pcm.num_samples();
        let block_frames = 4096;
        for block_start in (0..frames).step_by(block_frames) {
            let block_end = (block_start + block_frames).min(frames);
            let block = &samples[block_start * channels..block_end * channels];
            encoder
                .process_interleaved(block, (block_end - block_start) as u32)
                .map_err(|e| encode_error(path, format!("FLAC process failed: {e:?}")))?;
        }
        encoder
            .finish()
            .map_err(|e| encode_error(path, format!("FLAC finish failed: {e:?}")))?;
    }

    std::fs::write(path, output).map_err(|e| encode_error(path, e))
}

fn encode_ogg(pcm: &PcmBuffer, path: &Path, request: &EncodeRequest) -> WaveResult<()> {
    if Command::new("ffmpeg").arg("-version").output().is_err() {
        return Err(encode_error(
            path,
            "ffmpeg not found; install ffmpeg for OGG Vorbis export",
        ));
    }

    let temp_wav = std::env::temp_dir().join(format!("waveedit_enc_{}.wav", std::process::id()));
    let wav_request = EncodeRequest {
        format: EncodeFormat::Wav,
        bit_depth: BitDepth::Bits32,
        quality: request.quality,
        metadata: AudioMetadata::default(),
        target_sample_rate: None,
    };
    encode_wav(pcm, &temp_wav, &wav_request)?;

    let result = Command::new("ffmpeg")
        .arg("-y")
        .arg("-i")
        .arg(&temp_wav)
        .arg("-acodec")
        .arg("libvorbis")
        .arg("-q:a")
        .arg(request.quality.min(10).to_string())
        .arg(path)
        .output();
    let _ = std::fs::remove_file(&temp_wav);

    match result {
        Ok(output) if output.status.success() => Ok(()),
        Ok(output) => Err(encode_error(
            path,
            format!(
                "ffmpeg failed: {}",
                String::from_utf8_lossy(&output.stderr)
            ),
        )),
        Err(e) => Err(encode_error(path, e)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::decode::decode;
    use crate::metadata::BwfMetadata;

    fn tone(samples: usize, sample_rate: f64) -> PcmBuffer {
        let data = (0..samples)
            .map(|i| 0.4 * (2.0 * std::f32::consts::PI * i as f32 / 100.0).sin())
            .collect();
        PcmBuffer::from_channels(vec![data], sample_rate).unwrap()
    }

    #[test]
    fn test_wav_16bit_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("out.wav");
        let pcm = tone(4800, 48000.0);

        encode(&pcm, &path, &EncodeRequest::wav(BitDepth::Bits16)).unwrap();
        let decoded = decode(&path).unwrap();

        assert_eq!(decoded.pcm.num_samples(), 4800);
        for (a, b) in decoded
            .pcm
            .channel(0)
            .unwrap()
            .iter()
            .zip(pcm.channel(0).unwrap())
        {
            assert!((a - b).abs() < 1e-3);
        }
    }

    #[test]
    fn test_wav_float_round_trip_preserves_overs() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("out.wav");
        let pcm = PcmBuffer::from_channels(vec![vec![1.5f32, -1.25, 0.5]], 48000.0).unwrap();

        encode(&pcm, &path, &EncodeRequest::wav(BitDepth::Bits32)).unwrap();
        let decoded = decode(&path).unwrap();
        assert_eq!(decoded.pcm.channel(0).unwrap()[0], 1.5);
        assert_eq!(decoded.pcm.channel(0).unwrap()[1], -1.25);
    }

    #[test]
    fn test_wav_metadata_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("meta.wav");
        let pcm = tone(480, 48000.0);

        let mut request = EncodeRequest::wav(BitDepth::Bits24);
        request.metadata.bwf = Some(BwfMetadata {
            originator: "WaveEdit".to_string(),
            description: "bounce".to_string(),
            ..Default::default()
        });
        request.metadata.ixml = Some("<BWFXML><PROJECT>demo</PROJECT></BWFXML>".to_string());
        encode(&pcm, &path, &request).unwrap();

        let decoded = decode(&path).unwrap();
        assert_eq!(decoded.metadata.bwf.as_ref().unwrap().originator, "WaveEdit");
        assert!(decoded.metadata.ixml.as_deref().unwrap().contains("demo"));
    }

    #[test]
    fn test_encode_with_sample_rate_conversion() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("converted.wav");
        let pcm = tone(44100, 44100.0);

        let mut request = EncodeRequest::wav(BitDepth::Bits16);
        request.target_sample_rate = Some(48000.0);
        encode(&pcm, &path, &request).unwrap();

        let decoded = decode(&path).unwrap();
        assert_eq!(decoded.pcm.sample_rate(), 48000.0);
        assert_eq!(decoded.pcm.num_samples(), 48000);
    }

    #[test]
    fn test_flac_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("out.flac");
        let pcm = tone(4096, 44100.0);

        let request = EncodeRequest {
            format: EncodeFormat::Flac,
            bit_depth: BitDepth::Bits16,
            quality: 5,
            metadata: AudioMetadata::default(),
            target_sample_rate: None,
        };
        encode(&pcm, &path, &request).unwrap();

        let decoded = decode(&path).unwrap();
        assert_eq!(decoded.pcm.num_samples(), 4096);
        for (a, b) in decoded
            .pcm
            .channel(0)
            .unwrap()
            .iter()
            .zip(pcm.channel(0).unwrap())
        {
            assert!((a - b).abs() < 1e-3);
        }
    }
}
