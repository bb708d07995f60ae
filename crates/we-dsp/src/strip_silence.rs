//! Strip-silence segmentation
//!
//! Threshold-based analysis producing candidate regions around loud runs.
//! Pure function of its inputs: identical input and parameters always yield
//! identical regions.

use we_core::PcmBuffer;

/// Analysis parameters. Times are in milliseconds.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct StripSilenceParams {
    /// Threshold separating loud from silent, in dBFS.
    pub threshold_db: f64,
    /// Loud runs shorter than this are discarded.
    pub min_region_ms: f64,
    /// Silence runs shorter than this merge into the surrounding loud runs.
    pub min_silence_ms: f64,
    /// Extension before each emitted region.
    pub pre_roll_ms: f64,
    /// Extension after each emitted region.
    pub post_roll_ms: f64,
}

impl Default for StripSilenceParams {
    fn default() -> Self {
        Self {
            threshold_db: -40.0,
            min_region_ms: 100.0,
            min_silence_ms: 200.0,
            pre_roll_ms: 10.0,
            post_roll_ms: 10.0,
        }
    }
}

/// A detected loud region, auto-named in start order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CandidateRegion {
    pub name: String,
    pub start: u64,
    pub end: u64,
}

#[derive(Debug, Clone, Copy)]
struct Run {
    loud: bool,
    start: usize,
    len: usize,
}

/// Detect loud regions in `pcm` using a mono mixdown (sum / C).
///
/// Returns a sorted, non-overlapping region list contained in `[0, n]`;
/// may be committed to the region model or shown as a preview overlay.
pub fn detect_regions(pcm: &PcmBuffer, params: &StripSilenceParams) -> Vec<CandidateRegion> {
    let n = pcm.num_samples();
    if n == 0 {
        return Vec::new();
    }
    let sr = pcm.sample_rate();
    let ms_to_samples = |ms: f64| ((ms / 1000.0) * sr).round().max(0.0) as usize;

    let threshold = 10.0f64.powf(params.threshold_db / 20.0) as f32;
    let min_region = ms_to_samples(params.min_region_ms);
    let min_silence = ms_to_samples(params.min_silence_ms);
    let pre_roll = ms_to_samples(params.pre_roll_ms) as u64;
    let post_roll = ms_to_samples(params.post_roll_ms) as u64;

    let mono = pcm.mix_down_mono();

    // Collapse the per-sample classification into runs.
    let mut runs: Vec<Run> = Vec::new();
    for (i, &s) in mono.iter().enumerate() {
        let loud = s.abs() >= threshold;
        match runs.last_mut() {
            Some(run) if run.loud == loud => run.len += 1,
            _ => runs.push(Run { loud, start: i, len: 1 }),
        }
    }

    // Short silences count as loud so they join their neighbours. A run
    // with no loud neighbour (an entirely silent take) stays silent.
    for i in 0..runs.len() {
        if runs[i].loud || runs[i].len >= min_silence {
            continue;
        }
        let prev_loud = i > 0 && runs[i - 1].loud;
        let next_loud = i + 1 < runs.len() && runs[i + 1].loud;
        if prev_loud || next_loud {
            runs[i].loud = true;
        }
    }

    // Coalesce adjacent loud runs, then drop runs below the region minimum.
    let mut merged: Vec<Run> = Vec::new();
    for run in runs {
        match merged.last_mut() {
            Some(prev) if prev.loud && run.loud => prev.len += run.len,
            _ => merged.push(run),
        }
    }

    let mut regions = Vec::new();
    for run in merged.iter().filter(|r| r.loud && r.len >= min_region) {
        let start = (run.start as u64).saturating_sub(pre_roll);
        let end = ((run.start + run.len) as u64 + post_roll).min(n as u64);
        let name = format!("Region {}", regions.len() + 1);
        regions.push(CandidateRegion { name, start, end });
    }

    // Rolls may overlap neighbouring regions; clip each start to the
    // previous end so the result stays non-overlapping.
    for i in 1..regions.len() {
        if regions[i].start < regions[i - 1].end {
            regions[i].start = regions[i - 1].end;
        }
    }

    regions
}
