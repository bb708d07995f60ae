//! Audio decoding via symphonia
//!
//! WAV (8/16/24/32 PCM and float), FLAC and OGG Vorbis, lenient about
//! unknown chunks. Output is the editor's planar float buffer plus carried
//! metadata.

use std::fs::File;
use std::path::Path;

use symphonia::core::audio::{AudioBufferRef, Signal};
use symphonia::core::codecs::DecoderOptions;
use symphonia::core::formats::FormatOptions;
use symphonia::core::io::MediaSourceStream;
use symphonia::core::meta::MetadataOptions;
use symphonia::core::probe::Hint;

use we_core::{BitDepth, PcmBuffer, WaveError, WaveResult, MAX_CHANNELS};

use crate::metadata::{read_wav_sidecars, AudioMetadata};

/// Decoded file: planar PCM plus carried metadata.
#[derive(Debug, Clone)]
pub struct DecodedAudio {
    pub pcm: PcmBuffer,
    pub metadata: AudioMetadata,
}

fn decode_error(path: &Path, reason: impl std::fmt::Display) -> WaveError {
    WaveError::DecodeFailed {
        path: path.display().to_string(),
        reason: reason.to_string(),
    }
}

macro_rules! append_planes {
    ($buf:expr, $out:expr, $conv:expr) => {{
        let planes = $buf.planes();
        for (ch, plane) in planes.planes().iter().enumerate() {
            if ch >= $out.len() {
                break;
            }
            $out[ch].extend(plane.iter().map($conv));
        }
    }};
}

/// Decode a whole file into memory.
pub fn decode(path: &Path) -> WaveResult<DecodedAudio> {
    let file = File::open(path).map_err(|e| decode_error(path, e))?;
    let mss = MediaSourceStream::new(Box::new(file), Default::default());

    let mut hint = Hint::new();
    if let Some(ext) = path.extension().and_then(|e| e.to_str()) {
        hint.with_extension(ext);
    }

    let mut probed = symphonia::default::get_probe()
        .format(
            &hint,
            mss,
            &FormatOptions::default(),
            &MetadataOptions::default(),
        )
        .map_err(|e| decode_error(path, e))?;

    let mut format = probed.format;

    let track = format
        .tracks()
        .iter()
        .find(|t| t.codec_params.codec != symphonia::core::codecs::CODEC_TYPE_NULL)
        .ok_or_else(|| decode_error(path, "no audio track found"))?;
    let track_id = track.id;
    let codec_params = track.codec_params.clone();

    let sample_rate = codec_params.sample_rate.unwrap_or(44100) as f64;
    let mut channels = codec_params.channels.map(|c| c.count()).unwrap_or(2);
    if channels == 0 {
        return Err(decode_error(path, "zero channel count"));
    }
    if channels > MAX_CHANNELS {
        log::warn!(
            "{}: {} channels, keeping the first {}",
            path.display(),
            channels,
            MAX_CHANNELS
        );
        channels = MAX_CHANNELS;
    }
    // Lossy sources report no bit depth; runtime is float anyway.
    let bit_depth = codec_params
        .bits_per_sample
        .and_then(BitDepth::from_bits)
        .unwrap_or(BitDepth::Bits32);

    let mut decoder = symphonia::default::get_codecs()
        .make(&codec_params, &DecoderOptions::default())
        .map_err(|e| decode_error(path, e))?;

    let mut data: Vec<Vec<f32>> = vec![Vec::new(); channels];

    loop {
        match format.next_packet() {
            Ok(packet) => {
                if packet.track_id() != track_id {
                    continue;
                }
                match decoder.decode(&packet) {
                    Ok(decoded) => append_decoded(&decoded, &mut data),
                    Err(symphonia::core::errors::Error::DecodeError(err)) => {
                        // Tolerate damaged packets; keep what decodes.
                        log::warn!("{}: skipping bad packet: {err}", path.display());
                        continue;
                    }
                    Err(e) => return Err(decode_error(path, e)),
                }
            }
            Err(symphonia::core::errors::Error::IoError(ref e))
                if e.kind() == std::io::ErrorKind::UnexpectedEof =>
            {
                break;
            }
            Err(e) => return Err(decode_error(path, e)),
        }
    }

    // Packets can leave channels a frame apart on truncated files.
    let min_len = data.iter().map(|c| c.len()).min().unwrap_or(0);
    for ch in &mut data {
        ch.truncate(min_len);
    }

    let mut pcm = PcmBuffer::from_channels(data, sample_rate)
        .map_err(|e| decode_error(path, e))?;
    pcm.set_bit_depth(bit_depth);

    let mut metadata = AudioMetadata::default();
    if let Some(rev) = probed.metadata.get().as_ref().and_then(|m| m.current()) {
        for tag in rev.tags() {
            metadata.tags.push((tag.key.to_string(), tag.value.to_string()));
        }
    }
    let is_wav = path
        .extension()
        .map(|e| e.eq_ignore_ascii_case("wav"))
        .unwrap_or(false);
    if is_wav {
        let (bwf, ixml) = read_wav_sidecars(path);
        metadata.bwf = bwf;
        metadata.ixml = ixml;
    }

    Ok(DecodedAudio { pcm, metadata })
}

fn append_decoded(decoded: &AudioBufferRef, out: &mut [Vec<f32>]) {
    match decoded {
        AudioBufferRef::F32(buf) => append_planes!(buf, out, |&s| s),
        AudioBufferRef::F64(buf) => append_planes!(buf, out, |&s| s as f32),
        AudioBufferRef::S8(buf) => append_planes!(buf, out, |&s| s as f32 / 128.0),
        AudioBufferRef::S16(buf) => append_planes!(buf, out, |&s| s as f32 / 32768.0),
        AudioBufferRef::S24(buf) => {
            append_planes!(buf, out, |&s| s.inner() as f32 / 8_388_608.0)
        }
        AudioBufferRef::S32(buf) => {
            append_planes!(buf, out, |&s| (s as f64 / 2_147_483_648.0) as f32)
        }
        AudioBufferRef::U8(buf) => append_planes!(buf, out, |&s| (s as f32 - 128.0) / 128.0),
        AudioBufferRef::U16(buf) => {
            append_planes!(buf, out, |&s| (s as f32 - 32768.0) / 32768.0)
        }
        AudioBufferRef::U24(buf) => {
            append_planes!(buf, out, |&s| (s.inner() as f64 / 8_388_608.0 - 1.0) as f32)
        }
        AudioBufferRef::U32(buf) => {
            append_planes!(buf, out, |&s| (s as f64 / 2_147_483_648.0 - 1.0) as f32)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn write_test_wav(path: &Path, samples: &[f32], sample_rate: u32) {
        let spec = hound::WavSpec {
            channels: 1,
            sample_rate,
            bits_per_sample: 16,
            sample_format: hound::SampleFormat::Int,
        };
        let mut writer = hound::WavWriter::create(path, spec).unwrap();
        for &s in samples {
            writer
                .write_sample((s.clamp(-1.0, 1.0) * 32767.0) as i16)
                .unwrap();
        }
        writer.finalize().unwrap();
    }

    #[test]
    fn test_decode_wav_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("tone.wav");
        let samples: Vec<f32> = (0..4800)
            .map(|i| 0.5 * (2.0 * std::f32::consts::PI * i as f32 / 48.0).sin())
            .collect();
        write_test_wav(&path, &samples, 48000);

        let decoded = decode(&path).unwrap();
        assert_eq!(decoded.pcm.channels(), 1);
        assert_eq!(decoded.pcm.num_samples(), 4800);
        assert_eq!(decoded.pcm.sample_rate(), 48000.0);
        assert_eq!(decoded.pcm.bit_depth(), BitDepth::Bits16);

        let channel = decoded.pcm.channel(0).unwrap();
        for (a, b) in channel.iter().zip(samples.iter()) {
            assert!((a - b).abs() < 1e-3);
        }
    }

    #[test]
    fn test_decode_missing_file() {
        let err = decode(Path::new("/nonexistent/audio.wav"));
        assert!(matches!(err, Err(WaveError::DecodeFailed { .. })));
    }

    #[test]
    fn test_decode_garbage_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("garbage.wav");
        std::fs::write(&path, b"this is not audio data at all").unwrap();
        assert!(matches!(
            decode(&path),
            Err(WaveError::DecodeFailed { .. })
        ));
    }
}
