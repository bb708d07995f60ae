//! BWF / iXML metadata carriage
//!
//! Broadcast-wave `bext` and `iXML` chunks are read from WAV sources and
//! written back on save so a round trip preserves them. The editor carries
//! these fields; it never computes or validates them.

use std::io::Read;
use std::path::Path;

/// Broadcast Wave `bext` fields the editor carries.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct BwfMetadata {
    pub description: String,
    pub originator: String,
    pub originator_ref: String,
    pub origination_date: String,
    pub origination_time: String,
    pub time_reference: u64,
    pub coding_history: String,
}

/// Everything carried beside the samples.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct AudioMetadata {
    /// Container tags (title, artist, ...), as decoded.
    pub tags: Vec<(String, String)>,
    pub bwf: Option<BwfMetadata>,
    pub ixml: Option<String>,
}

impl AudioMetadata {
    pub fn is_empty(&self) -> bool {
        self.tags.is_empty() && self.bwf.is_none() && self.ixml.is_none()
    }
}

fn read_fixed_str(bytes: &[u8]) -> String {
    let end = bytes.iter().position(|&b| b == 0).unwrap_or(bytes.len());
    String::from_utf8_lossy(&bytes[..end]).into_owned()
}

fn write_fixed_str(out: &mut Vec<u8>, value: &str, len: usize) {
    let bytes = value.as_bytes();
    let take = bytes.len().min(len);
    out.extend_from_slice(&bytes[..take]);
    out.resize(out.len() + (len - take), 0);
}

impl BwfMetadata {
    /// Parse a `bext` chunk payload. Short payloads are rejected.
    pub fn from_bext_chunk(data: &[u8]) -> Option<Self> {
        if data.len() < 602 {
            return None;
        }
        let time_low = u32::from_le_bytes(data[338..342].try_into().ok()?) as u64;
        let time_high = u32::from_le_bytes(data[342..346].try_into().ok()?) as u64;
        let coding_history = if data.len() > 602 {
            read_fixed_str(&data[602..])
        } else {
            String::new()
        };
        Some(Self {
            description: read_fixed_str(&data[0..256]),
            originator: read_fixed_str(&data[256..288]),
            originator_ref: read_fixed_str(&data[288..320]),
            origination_date: read_fixed_str(&data[320..330]),
            origination_time: read_fixed_str(&data[330..338]),
            time_reference: (time_high << 32) | time_low,
            coding_history,
        })
    }

    /// Serialise to a `bext` chunk payload (version 1, zero UMID).
    pub fn to_bext_chunk(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(602 + self.coding_history.len());
        write_fixed_str(&mut out, &self.description, 256);
        write_fixed_str(&mut out, &self.originator, 32);
        write_fixed_str(&mut out, &self.originator_ref, 32);
        write_fixed_str(&mut out, &self.origination_date, 10);
        write_fixed_str(&mut out, &self.origination_time, 8);
        out.extend_from_slice(&((self.time_reference & 0xFFFF_FFFF) as u32).to_le_bytes());
        out.extend_from_slice(&((self.time_reference >> 32) as u32).to_le_bytes());
        out.extend_from_slice(&1u16.to_le_bytes()); // version
        out.resize(out.len() + 64, 0); // UMID
        out.resize(out.len() + 10, 0); // loudness values
        out.resize(out.len() + 180, 0); // reserved
        out.extend_from_slice(self.coding_history.as_bytes());
        out
    }
}

/// Walk a RIFF/WAVE file's chunks for `bext` and `iXML`. Non-WAV input or
/// parse trouble yields `None` fields; absence of metadata is not an error.
pub fn read_wav_sidecars(path: &Path) -> (Option<BwfMetadata>, Option<String>) {
    let Ok(mut file) = std::fs::File::open(path) else {
        return (None, None);
    };
    let mut bytes = Vec::new();
    if file.read_to_end(&mut bytes).is_err() {
        return (None, None);
    }
    parse_wav_sidecars(&bytes)
}

fn parse_wav_sidecars(bytes: &[u8]) -> (Option<BwfMetadata>, Option<String>) {
    if bytes.len() < 12 || &bytes[0..4] != b"RIFF" || &bytes[8..12] != b"WAVE" {
        return (None, None);
    }
    let mut bwf = None;
    let mut ixml = None;
    let mut offset = 12usize;
    while offset + 8 <= bytes.len() {
        let id = &bytes[offset..offset + 4];
        let size = u32::from_le_bytes(bytes[offset + 4..offset + 8].try_into().unwrap()) as usize;
        let data_start = offset + 8;
        let data_end = data_start.saturating_add(size).min(bytes.len());
        match id {
            b"bext" => bwf = BwfMetadata::from_bext_chunk(&bytes[data_start..data_end]),
            b"iXML" => {
                ixml = Some(
                    String::from_utf8_lossy(&bytes[data_start..data_end])
                        .trim_end_matches('\0')
                        .to_string(),
                )
            }
            _ => {}
        }
        // Chunks are word-aligned.
        offset = data_start + size + (size & 1);
    }
    (bwf, ixml)
}

/// Append `bext` / `iXML` chunks to a finished WAV file and patch the RIFF
/// size. No-op when there is nothing to write.
pub fn append_wav_sidecars(
    wav_bytes: &mut Vec<u8>,
    bwf: Option<&BwfMetadata>,
    ixml: Option<&str>,
) {
    if wav_bytes.len() < 12 || &wav_bytes[0..4] != b"RIFF" {
        return;
    }
    let mut append_chunk = |id: &[u8; 4], payload: &[u8]| {
        wav_bytes.extend_from_slice(id);
        wav_bytes.extend_from_slice(&(payload.len() as u32).to_le_bytes());
        wav_bytes.extend_from_slice(payload);
        if payload.len() % 2 == 1 {
            wav_bytes.push(0);
        }
    };
    if let Some(bwf) = bwf {
        append_chunk(b"bext", &bwf.to_bext_chunk());
    }
    if let Some(ixml) = ixml {
        append_chunk(b"iXML", ixml.as_bytes());
    }
    let riff_size = (wav_bytes.len() - 8) as u32;
    wav_bytes[4..8].copy_from_slice(&riff_size.to_le_bytes());
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_bext_round_trip() {
        let bwf = BwfMetadata {
            description: "Location recording".to_string(),
            originator: "WaveEdit".to_string(),
            originator_ref: "WE-0001".to_string(),
            origination_date: "2024-03-01".to_string(),
            origination_time: "10:30:00".to_string(),
            time_reference: 0x1_0000_0001,
            coding_history: "A=PCM,F=48000,W=24".to_string(),
        };
        let chunk = bwf.to_bext_chunk();
        let parsed = BwfMetadata::from_bext_chunk(&chunk).unwrap();
        assert_eq!(parsed, bwf);
    }

    #[test]
    fn test_short_bext_rejected() {
        assert!(BwfMetadata::from_bext_chunk(&[0u8; 100]).is_none());
    }

    #[test]
    fn test_wav_sidecar_append_and_parse() {
        // Minimal RIFF/WAVE shell.
        let mut wav = Vec::new();
        wav.extend_from_slice(b"RIFF");
        wav.extend_from_slice(&4u32.to_le_bytes());
        wav.extend_from_slice(b"WAVE");

        let bwf = BwfMetadata {
            originator: "WaveEdit".to_string(),
            ..Default::default()
        };
        append_wav_sidecars(&mut wav, Some(&bwf), Some("<BWFXML/>"));

        let (parsed_bwf, parsed_ixml) = parse_wav_sidecars(&wav);
        assert_eq!(parsed_bwf.unwrap().originator, "WaveEdit");
        assert_eq!(parsed_ixml.as_deref(), Some("<BWFXML/>"));

        // RIFF size covers everything after the first 8 bytes.
        let declared = u32::from_le_bytes(wav[4..8].try_into().unwrap()) as usize;
        assert_eq!(declared, wav.len() - 8);
    }

    #[test]
    fn test_non_wav_input_is_ignored() {
        let (bwf, ixml) = parse_wav_sidecars(b"OggS junk");
        assert!(bwf.is_none());
        assert!(ixml.is_none());
    }
}
