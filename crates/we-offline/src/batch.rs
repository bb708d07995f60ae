//! Batch region export
//!
//! Renders each region through the chain snapshot and encodes it to its own
//! file. Progress is staged per region: 0.0–0.2 loading, 0.2–0.5 DSP
//! (fades, normalisation), 0.5–0.8 plug-ins, 0.8–0.9 format conversion,
//! 0.9–1.0 saving, scaled into that region's share of the whole job.

use std::path::{Path, PathBuf};

use we_core::{PcmBuffer, WaveError, WaveResult, ALL_CHANNELS};
use we_dsp::{FadeCurve, FadeDirection, NormalizeMode};
use we_file::{AudioMetadata, EncodeFormat, EncodeRequest};
use we_plugin::{ChainNodeSnapshot, PluginManager};

use crate::render::{render_selection, RenderConfig};

/// One region to export.
#[derive(Debug, Clone)]
pub struct ExportRegion {
    pub name: String,
    pub start: u64,
    pub end: u64,
}

/// Batch job settings.
#[derive(Debug, Clone)]
pub struct BatchExportConfig {
    pub format: EncodeFormat,
    pub bit_depth: we_core::BitDepth,
    /// Lossy quality 0..=10 (also the FLAC compression level).
    pub quality: u8,
    pub target_sample_rate: Option<f64>,
    /// Fade applied to each exported region, in samples.
    pub fade_in_samples: u64,
    pub fade_out_samples: u64,
    /// Peak-normalise each region to this level before encoding.
    pub normalize_peak_db: Option<f64>,
    pub render: RenderConfig,
}

impl Default for BatchExportConfig {
    fn default() -> Self {
        Self {
            format: EncodeFormat::Wav,
            bit_depth: we_core::BitDepth::Bits24,
            quality: 10,
            target_sample_rate: None,
            fade_in_samples: 0,
            fade_out_samples: 0,
            normalize_peak_db: None,
            render: RenderConfig::default(),
        }
    }
}

fn sanitize_file_name(name: &str) -> String {
    let cleaned: String = name
        .chars()
        .map(|c| match c {
            '/' | '\\' | ':' | '*' | '?' | '"' | '<' | '>' | '|' => '_',
            other => other,
        })
        .collect();
    let trimmed = cleaned.trim();
    if trimmed.is_empty() {
        "Region".to_string()
    } else {
        trimmed.to_string()
    }
}

fn unique_path(dir: &Path, stem: &str, extension: &str) -> PathBuf {
    let candidate = dir.join(format!("{stem}.{extension}"));
    if !candidate.exists() {
        return candidate;
    }
    for counter in 2.. {
        let candidate = dir.join(format!("{stem} ({counter}).{extension}"));
        if !candidate.exists() {
            return candidate;
        }
    }
    unreachable!()
}

/// Export every region to `out_dir`. Returns the written paths in region
/// order. `progress(fraction, status)` spans the whole job; returning
/// `false` cancels after the current step.
pub fn export_regions(
    src: &PcmBuffer,
    chain: &[ChainNodeSnapshot],
    manager: &PluginManager,
    out_dir: &Path,
    regions: &[ExportRegion],
    config: &BatchExportConfig,
    progress: &mut dyn FnMut(f32, &str) -> bool,
) -> WaveResult<Vec<PathBuf>> {
    if regions.is_empty() {
        return Ok(Vec::new());
    }
    std::fs::create_dir_all(out_dir)?;

    let share = 1.0f32 / regions.len() as f32;
    let mut written = Vec::with_capacity(regions.len());

    for (index, region) in regions.iter().enumerate() {
        let base = index as f32 * share;
        let stage = |offset: f32| base + offset * share;
        let len = region.end.saturating_sub(region.start);
        if len == 0 {
            log::warn!("skipping empty region '{}'", region.name);
            continue;
        }

        // Load: slice the region out of the source.
        if !progress(stage(0.0), "Loading") {
            return Err(WaveError::RenderCancelled);
        }
        let mut piece = src.slice(region.start, len)?;
        if !progress(stage(0.2), "Processing") {
            return Err(WaveError::RenderCancelled);
        }

        // DSP stage: fades and normalisation.
        if config.fade_in_samples > 0 {
            let fade = config.fade_in_samples.min(len);
            we_dsp::fade(
                &mut piece,
                0,
                fade,
                ALL_CHANNELS,
                FadeDirection::In,
                FadeCurve::Linear,
            )?;
        }
        if config.fade_out_samples > 0 {
            let fade = config.fade_out_samples.min(len);
            we_dsp::fade(
                &mut piece,
                len - fade,
                fade,
                ALL_CHANNELS,
                FadeDirection::Out,
                FadeCurve::Linear,
            )?;
        }
        if let Some(target_db) = config.normalize_peak_db {
            we_dsp::normalize(&mut piece, 0, len, ALL_CHANNELS, target_db, NormalizeMode::Peak)?;
        }

        // Plug-in stage: 0.5..0.8 of this region's share.
        let piece_len = piece.num_samples() as u64;
        let mut plugin_progress = |fraction: f32, _status: &str| {
            progress(stage(0.5 + fraction * 0.3), "Rendering plugins")
        };
        let outcome = render_selection(
            &piece,
            chain,
            manager,
            piece.sample_rate(),
            0,
            piece_len,
            &config.render,
            &mut plugin_progress,
        )?;

        // Convert + save.
        if !progress(stage(0.8), "Converting") {
            return Err(WaveError::RenderCancelled);
        }
        let request = EncodeRequest {
            format: config.format,
            bit_depth: config.bit_depth,
            quality: config.quality,
            metadata: AudioMetadata::default(),
            target_sample_rate: config.target_sample_rate,
        };
        if !progress(stage(0.9), "Saving") {
            return Err(WaveError::RenderCancelled);
        }
        let stem = sanitize_file_name(&region.name);
        let path = unique_path(out_dir, &stem, config.format.extension());
        we_file::encode(&outcome.pcm, &path, &request)?;
        written.push(path);
    }

    progress(1.0, "Done");
    Ok(written)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tone(samples: usize) -> PcmBuffer {
        let data = (0..samples)
            .map(|i| 0.25 * (2.0 * std::f32::consts::PI * i as f32 / 100.0).sin())
            .collect();
        PcmBuffer::from_channels(vec![data], 48000.0).unwrap()
    }

    fn regions() -> Vec<ExportRegion> {
        vec![
            ExportRegion {
                name: "Intro".to_string(),
                start: 0,
                end: 4800,
            },
            ExportRegion {
                name: "Outro".to_string(),
                start: 9600,
                end: 14400,
            },
        ]
    }

    #[test]
    fn test_exports_one_file_per_region() {
        let dir = tempfile::tempdir().unwrap();
        let src = tone(20_000);
        let manager = PluginManager::new();

        let written = export_regions(
            &src,
            &[],
            &manager,
            dir.path(),
            &regions(),
            &BatchExportConfig::default(),
            &mut |_, _| true,
        )
        .unwrap();

        assert_eq!(written.len(), 2);
        assert!(written[0].file_name().unwrap().to_str().unwrap().starts_with("Intro"));
        for path in &written {
            let decoded = we_file::decode(path).unwrap();
            assert_eq!(decoded.pcm.num_samples(), 4800);
        }
    }

    #[test]
    fn test_duplicate_names_get_suffixes() {
        let dir = tempfile::tempdir().unwrap();
        let src = tone(10_000);
        let manager = PluginManager::new();
        let twins = vec![
            ExportRegion {
                name: "Take".to_string(),
                start: 0,
                end: 1000,
            },
            ExportRegion {
                name: "Take".to_string(),
                start: 2000,
                end: 3000,
            },
        ];

        let written = export_regions(
            &src,
            &[],
            &manager,
            dir.path(),
            &twins,
            &BatchExportConfig::default(),
            &mut |_, _| true,
        )
        .unwrap();
        assert_ne!(written[0], written[1]);
    }

    #[test]
    fn test_normalize_and_fade_options() {
        let dir = tempfile::tempdir().unwrap();
        let src = tone(10_000);
        let manager = PluginManager::new();
        let config = BatchExportConfig {
            normalize_peak_db: Some(-3.0),
            fade_in_samples: 480,
            fade_out_samples: 480,
            bit_depth: we_core::BitDepth::Bits32,
            ..BatchExportConfig::default()
        };

        let written = export_regions(
            &src,
            &[],
            &manager,
            dir.path(),
            &regions()[..1].to_vec(),
            &config,
            &mut |_, _| true,
        )
        .unwrap();

        let decoded = we_file::decode(&written[0]).unwrap();
        let peak = we_dsp::peak(&decoded.pcm, 0, 4800, ALL_CHANNELS).unwrap();
        assert!((20.0 * peak.log10() - (-3.0)).abs() < 0.05);
        // Fade endpoints.
        assert_eq!(decoded.pcm.channel(0).unwrap()[0], 0.0);
    }

    #[test]
    fn test_cancel_propagates() {
        let dir = tempfile::tempdir().unwrap();
        let src = tone(10_000);
        let manager = PluginManager::new();

        let result = export_regions(
            &src,
            &[],
            &manager,
            dir.path(),
            &regions(),
            &BatchExportConfig::default(),
            &mut |_, _| false,
        );
        assert!(matches!(result, Err(WaveError::RenderCancelled)));
    }

    #[test]
    fn test_progress_monotone_and_bounded() {
        let dir = tempfile::tempdir().unwrap();
        let src = tone(20_000);
        let manager = PluginManager::new();
        let mut last = -1.0f32;

        export_regions(
            &src,
            &[],
            &manager,
            dir.path(),
            &regions(),
            &BatchExportConfig::default(),
            &mut |fraction, _| {
                assert!(fraction >= last - 1e-6, "{fraction} < {last}");
                assert!((0.0..=1.0).contains(&fraction));
                last = fraction;
                true
            },
        )
        .unwrap();
        assert_eq!(last, 1.0);
    }
}
