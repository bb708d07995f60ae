//! Region model
//!
//! Named, coloured sample ranges kept sorted ascending by start, with
//! multi-selection (index set plus a primary anchor for range-extend) and
//! JSON side-car persistence next to the audio file.

use std::collections::BTreeSet;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use we_core::PcmBuffer;

/// Default colour for new regions (ARGB).
pub const DEFAULT_REGION_COLOR: u32 = 0xFF4A9EFF;

/// Window for zero-crossing snap, in samples either side.
const ZERO_CROSS_WINDOW: u64 = 1024;

/// A named span on the timeline.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Region {
    pub name: String,
    pub start: u64,
    pub end: u64,
    /// ARGB colour.
    pub color: u32,
}

impl Region {
    pub fn new(name: &str, start: u64, end: u64) -> Self {
        Self {
            name: name.to_string(),
            start: start.min(end),
            end: start.max(end),
            color: DEFAULT_REGION_COLOR,
        }
    }

    pub fn len(&self) -> u64 {
        self.end - self.start
    }

    pub fn is_empty(&self) -> bool {
        self.start == self.end
    }

    pub fn contains(&self, position: u64) -> bool {
        position >= self.start && position < self.end
    }
}

/// Which edge of a region a nudge moves.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BoundarySide {
    Start,
    End,
}

/// Sorted region collection with multi-selection.
#[derive(Debug, Default, Clone)]
pub struct RegionModel {
    regions: Vec<Region>,
    selected: BTreeSet<usize>,
    primary: Option<usize>,
}

impl RegionModel {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.regions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.regions.is_empty()
    }

    pub fn get(&self, index: usize) -> Option<&Region> {
        self.regions.get(index)
    }

    pub fn iter(&self) -> impl Iterator<Item = &Region> {
        self.regions.iter()
    }

    /// All regions, for snapshotting into undo records.
    pub fn regions(&self) -> &[Region] {
        &self.regions
    }

    /// Wholesale restore from an undo snapshot. Selection is cleared; the
    /// indices it held may no longer exist.
    pub fn restore(&mut self, regions: Vec<Region>) {
        self.regions = regions;
        self.clear_selection();
        self.repair_order();
    }

    fn repair_order(&mut self) {
        let sorted = self.regions.windows(2).all(|w| w[0].start <= w[1].start);
        if !sorted {
            debug_assert!(false, "region collection lost sort order");
            log::error!("region collection unsorted; repairing");
            self.regions.sort_by_key(|r| r.start);
        }
    }

    /// Insert keeping sort order. Returns the insertion index.
    pub fn add(&mut self, region: Region) -> usize {
        let index = self
            .regions
            .partition_point(|r| r.start <= region.start);
        self.regions.insert(index, region);
        // Keep selection pointing at the same regions.
        self.selected = self
            .selected
            .iter()
            .map(|&i| if i >= index { i + 1 } else { i })
            .collect();
        if let Some(primary) = self.primary.as_mut() {
            if *primary >= index {
                *primary += 1;
            }
        }
        index
    }

    /// Remove by index.
    pub fn remove(&mut self, index: usize) -> Option<Region> {
        if index >= self.regions.len() {
            return None;
        }
        let region = self.regions.remove(index);
        self.selected = self
            .selected
            .iter()
            .filter(|&&i| i != index)
            .map(|&i| if i > index { i - 1 } else { i })
            .collect();
        self.primary = match self.primary {
            Some(p) if p == index => None,
            Some(p) if p > index => Some(p - 1),
            other => other,
        };
        Some(region)
    }

    pub fn clear(&mut self) {
        self.regions.clear();
        self.clear_selection();
    }

    // ── selection ──────────────────────────────────────────────────────

    /// Replace or extend the multi-selection. The touched index becomes the
    /// primary anchor.
    pub fn select(&mut self, index: usize, add_to_selection: bool) {
        if index >= self.regions.len() {
            return;
        }
        if !add_to_selection {
            self.selected.clear();
        }
        self.selected.insert(index);
        self.primary = Some(index);
    }

    /// Range-extend from the primary anchor to `index`.
    pub fn select_range_to(&mut self, index: usize) {
        if index >= self.regions.len() {
            return;
        }
        let anchor = self.primary.unwrap_or(index);
        self.selected.clear();
        for i in anchor.min(index)..=anchor.max(index) {
            self.selected.insert(i);
        }
        self.primary = Some(anchor);
    }

    pub fn clear_selection(&mut self) {
        self.selected.clear();
        self.primary = None;
    }

    pub fn selected_indices(&self) -> Vec<usize> {
        self.selected.iter().copied().collect()
    }

    pub fn is_selected(&self, index: usize) -> bool {
        self.selected.contains(&index)
    }

    pub fn primary(&self) -> Option<usize> {
        self.primary
    }

    // ── operations ─────────────────────────────────────────────────────

    /// Merge the selected regions into one spanning min-start..max-end,
    /// names joined with " + ", gaps absorbed. Needs at least one selected.
    /// Returns the merged region's index.
    pub fn merge_selected(&mut self) -> Option<usize> {
        if self.selected.is_empty() {
            return None;
        }
        let indices: Vec<usize> = self.selected.iter().copied().rev().collect();
        let mut parts: Vec<Region> = Vec::with_capacity(indices.len());
        for index in indices {
            if let Some(region) = self.remove(index) {
                parts.push(region);
            }
        }
        parts.reverse(); // back to ascending start order
        let start = parts.iter().map(|r| r.start).min().unwrap_or(0);
        let end = parts.iter().map(|r| r.end).max().unwrap_or(0);
        let name = parts
            .iter()
            .map(|r| r.name.as_str())
            .collect::<Vec<_>>()
            .join(" + ");
        let color = parts.first().map(|r| r.color).unwrap_or(DEFAULT_REGION_COLOR);

        let merged = Region {
            name,
            start,
            end,
            color,
        };
        let index = self.add(merged);
        self.clear_selection();
        self.select(index, false);
        Some(index)
    }

    /// Split a region at `at` (strictly inside). The halves are named
    /// "<name> (1)" and "<name> (2)". Returns the two indices.
    pub fn split(&mut self, index: usize, at: u64) -> Option<(usize, usize)> {
        let region = self.regions.get(index)?.clone();
        if at <= region.start || at >= region.end {
            return None;
        }
        self.remove(index);
        let first = Region {
            name: format!("{} (1)", region.name),
            start: region.start,
            end: at,
            color: region.color,
        };
        let second = Region {
            name: format!("{} (2)", region.name),
            start: at,
            end: region.end,
            color: region.color,
        };
        let first_index = self.add(first);
        let second_index = self.add(second);
        Some((first_index, second_index))
    }

    /// Move one boundary by `delta` samples, clamped to the opposite
    /// boundary and `[0, total]`, snapping to the nearest zero crossing
    /// when a buffer is supplied.
    pub fn nudge_boundary(
        &mut self,
        index: usize,
        side: BoundarySide,
        delta: i64,
        total: u64,
        snap_pcm: Option<&PcmBuffer>,
    ) -> Option<(u64, u64)> {
        let region = self.regions.get(index)?.clone();
        let old = (region.start, region.end);
        let shift = |pos: u64| -> u64 {
            let moved = pos as i64 + delta;
            moved.clamp(0, total as i64) as u64
        };
        let mut new_start = region.start;
        let mut new_end = region.end;
        match side {
            BoundarySide::Start => {
                new_start = shift(region.start).min(region.end);
                if let Some(pcm) = snap_pcm {
                    new_start = snap_to_zero_crossing(pcm, new_start).min(region.end);
                }
            }
            BoundarySide::End => {
                new_end = shift(region.end).max(region.start).min(total);
                if let Some(pcm) = snap_pcm {
                    new_end = snap_to_zero_crossing(pcm, new_end)
                        .max(region.start)
                        .min(total);
                }
            }
        }
        self.regions[index].start = new_start;
        self.regions[index].end = new_end;
        // A start nudge can break the ordering against neighbours.
        if !self.regions.windows(2).all(|w| w[0].start <= w[1].start) {
            self.regions.sort_by_key(|r| r.start);
            self.clear_selection();
        }
        Some(old)
    }

    /// Complement of the union of regions over `[0, total]`. Used by
    /// "select inverse".
    pub fn inverse_ranges(&self, total: u64) -> Vec<(u64, u64)> {
        let mut result = Vec::new();
        let mut cursor = 0u64;
        for region in &self.regions {
            let start = region.start.min(total);
            let end = region.end.min(total);
            if start > cursor {
                result.push((cursor, start));
            }
            cursor = cursor.max(end);
        }
        if cursor < total {
            result.push((cursor, total));
        }
        result
    }

    // ── edit notifications ─────────────────────────────────────────────

    /// Shift for a deletion of `[start, start+len)`. Regions strictly
    /// inside collapse and are removed (the undo record carries the
    /// snapshot taken before the edit).
    pub fn apply_deletion(&mut self, start: u64, len: u64) -> Vec<Region> {
        let map = |p: u64| -> u64 {
            if p < start {
                p
            } else if p < start + len {
                start
            } else {
                p - len
            }
        };
        for region in &mut self.regions {
            region.start = map(region.start);
            region.end = map(region.end);
        }
        let mut removed = Vec::new();
        let mut index = 0;
        while index < self.regions.len() {
            if self.regions[index].is_empty() {
                if let Some(region) = self.remove(index) {
                    removed.push(region);
                }
            } else {
                index += 1;
            }
        }
        removed
    }

    /// Shift for an insertion of `len` samples at `at`. A region spanning
    /// the insert point stretches.
    pub fn apply_insertion(&mut self, at: u64, len: u64) {
        for region in &mut self.regions {
            if region.start >= at {
                region.start += len;
            }
            if region.end > at {
                region.end += len;
            }
        }
    }

    /// Clamp every region into `[0, total]` after a length change.
    pub fn clamp_to_length(&mut self, total: u64) {
        for region in &mut self.regions {
            region.start = region.start.min(total);
            region.end = region.end.min(total);
        }
        self.regions.retain(|r| !r.is_empty());
        self.clear_selection();
    }

    // ── side-car persistence ───────────────────────────────────────────

    /// `<audiofile>.regions.json`
    pub fn sidecar_path(audio_path: &Path) -> PathBuf {
        PathBuf::from(format!("{}.regions.json", audio_path.display()))
    }

    pub fn save_sidecar(&self, audio_path: &Path) -> std::io::Result<()> {
        let sidecar = RegionSidecar {
            version: "1.0".to_string(),
            regions: self
                .regions
                .iter()
                .map(|r| RegionSidecarEntry {
                    name: r.name.clone(),
                    start_sample: r.start,
                    end_sample: r.end,
                    color: format!("{:08X}", r.color),
                })
                .collect(),
        };
        let json = serde_json::to_string_pretty(&sidecar)
            .map_err(|e| std::io::Error::new(std::io::ErrorKind::InvalidData, e))?;
        std::fs::write(Self::sidecar_path(audio_path), json)
    }

    /// Load the side-car if present and well formed. A parse failure leaves
    /// the model untouched and reports not-loaded.
    pub fn load_sidecar(&mut self, audio_path: &Path) -> bool {
        let path = Self::sidecar_path(audio_path);
        let Ok(content) = std::fs::read_to_string(&path) else {
            return false;
        };
        let sidecar: RegionSidecar = match serde_json::from_str(&content) {
            Ok(sidecar) => sidecar,
            Err(err) => {
                log::warn!("region side-car {} unreadable: {err}", path.display());
                return false;
            }
        };
        let mut regions: Vec<Region> = sidecar
            .regions
            .into_iter()
            .map(|e| Region {
                name: e.name,
                start: e.start_sample.min(e.end_sample),
                end: e.start_sample.max(e.end_sample),
                color: u32::from_str_radix(&e.color, 16).unwrap_or(DEFAULT_REGION_COLOR),
            })
            .collect();
        regions.sort_by_key(|r| r.start);
        self.regions = regions;
        self.clear_selection();
        true
    }
}

/// Nearest zero crossing of channel 0 within a small window; the original
/// position when none is found.
pub fn snap_to_zero_crossing(pcm: &PcmBuffer, position: u64) -> u64 {
    let Some(channel) = pcm.channel(0) else {
        return position;
    };
    let total = channel.len() as u64;
    if total < 2 {
        return position;
    }
    let position = position.min(total - 1);
    let is_crossing = |i: u64| -> bool {
        let a = channel[(i - 1) as usize];
        let b = channel[i as usize];
        (a <= 0.0 && b > 0.0) || (a >= 0.0 && b < 0.0) || b == 0.0
    };
    for offset in 0..=ZERO_CROSS_WINDOW {
        let before = position.checked_sub(offset).filter(|&p| p >= 1);
        if let Some(p) = before {
            if is_crossing(p) {
                return p;
            }
        }
        let after = position + offset;
        if after >= 1 && after < total && offset > 0 && is_crossing(after) {
            return after;
        }
    }
    position
}

#[derive(Serialize, Deserialize)]
struct RegionSidecar {
    version: String,
    regions: Vec<RegionSidecarEntry>,
}

#[derive(Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RegionSidecarEntry {
    name: String,
    start_sample: u64,
    end_sample: u64,
    color: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn model_with(ranges: &[(u64, u64)]) -> RegionModel {
        let mut model = RegionModel::new();
        for (i, &(start, end)) in ranges.iter().enumerate() {
            model.add(Region::new(&format!("R{}", i + 1), start, end));
        }
        model
    }

    #[test]
    fn test_add_keeps_sorted() {
        let mut model = RegionModel::new();
        model.add(Region::new("b", 500, 600));
        model.add(Region::new("a", 100, 200));
        model.add(Region::new("c", 900, 950));
        let starts: Vec<u64> = model.iter().map(|r| r.start).collect();
        assert_eq!(starts, vec![100, 500, 900]);
    }

    #[test]
    fn test_selection_and_range_extend() {
        let mut model = model_with(&[(0, 10), (20, 30), (40, 50), (60, 70)]);
        model.select(1, false);
        model.select_range_to(3);
        assert_eq!(model.selected_indices(), vec![1, 2, 3]);
        assert_eq!(model.primary(), Some(1));

        model.select(0, false);
        assert_eq!(model.selected_indices(), vec![0]);
    }

    #[test]
    fn test_merge_selected_absorbs_gaps() {
        let mut model = model_with(&[(0, 10), (20, 30), (40, 50)]);
        model.select(0, false);
        model.select(2, true);
        let merged = model.merge_selected().unwrap();

        assert_eq!(model.len(), 2);
        let region = model.get(merged).unwrap();
        assert_eq!(region.start, 0);
        assert_eq!(region.end, 50);
        assert_eq!(region.name, "R1 + R3");
    }

    #[test]
    fn test_merge_requires_selection() {
        let mut model = model_with(&[(0, 10)]);
        assert!(model.merge_selected().is_none());
    }

    #[test]
    fn test_split_names() {
        let mut model = model_with(&[(100, 200)]);
        let (a, b) = model.split(0, 150).unwrap();
        assert_eq!(model.get(a).unwrap().name, "R1 (1)");
        assert_eq!(model.get(b).unwrap().name, "R1 (2)");
        assert_eq!(model.get(a).unwrap().end, 150);
        assert_eq!(model.get(b).unwrap().start, 150);

        // Split point must be strictly inside.
        assert!(model.split(0, 100).is_none());
    }

    #[test]
    fn test_nudge_clamps_to_opposite_boundary() {
        let mut model = model_with(&[(100, 200)]);
        model.nudge_boundary(0, BoundarySide::Start, 500, 1000, None);
        let region = model.get(0).unwrap();
        assert_eq!(region.start, 200);

        model.nudge_boundary(0, BoundarySide::End, 5000, 1000, None);
        assert_eq!(model.get(0).unwrap().end, 1000);
    }

    #[test]
    fn test_inverse_ranges() {
        let model = model_with(&[(10, 20), (30, 40)]);
        assert_eq!(
            model.inverse_ranges(50),
            vec![(0, 10), (20, 30), (40, 50)]
        );

        let empty = RegionModel::new();
        assert_eq!(empty.inverse_ranges(100), vec![(0, 100)]);
    }

    #[test]
    fn test_deletion_shifts_and_removes() {
        let mut model = model_with(&[(0, 10), (20, 30), (50, 60)]);
        // Delete [15, 45): R2 is strictly inside and vanishes.
        let removed = model.apply_deletion(15, 30);
        assert_eq!(removed.len(), 1);
        assert_eq!(removed[0].name, "R2");
        assert_eq!(model.len(), 2);
        assert_eq!(model.get(1).unwrap().start, 20); // 50 - 30
    }

    #[test]
    fn test_insertion_shifts_and_stretches() {
        let mut model = model_with(&[(10, 20), (30, 40)]);
        model.apply_insertion(15, 100);
        // R1 spans the insert point and stretches.
        assert_eq!(model.get(0).unwrap().start, 10);
        assert_eq!(model.get(0).unwrap().end, 120);
        assert_eq!(model.get(1).unwrap().start, 130);
    }

    #[test]
    fn test_sidecar_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let audio = dir.path().join("take.wav");

        let mut model = model_with(&[(100, 200), (300, 400)]);
        model.regions[0].color = 0xFF00FF00;
        model.save_sidecar(&audio).unwrap();

        let mut loaded = RegionModel::new();
        assert!(loaded.load_sidecar(&audio));
        assert_eq!(loaded.regions(), model.regions());
    }

    #[test]
    fn test_malformed_sidecar_leaves_model_untouched() {
        let dir = tempfile::tempdir().unwrap();
        let audio = dir.path().join("take.wav");
        std::fs::write(RegionModel::sidecar_path(&audio), "{not json").unwrap();

        let mut model = model_with(&[(5, 6)]);
        assert!(!model.load_sidecar(&audio));
        assert_eq!(model.len(), 1);
    }

    #[test]
    fn test_zero_crossing_snap() {
        // Sign flips at sample 50.
        let mut data = vec![1.0f32; 100];
        for s in data.iter_mut().skip(50) {
            *s = -1.0;
        }
        let pcm = PcmBuffer::from_channels(vec![data], 48000.0).unwrap();
        assert_eq!(snap_to_zero_crossing(&pcm, 45), 50);
        assert_eq!(snap_to_zero_crossing(&pcm, 55), 50);
    }
}
