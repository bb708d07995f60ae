//! Concrete edit commands
//!
//! Every destructive operation on a document is one of these. Each command
//! captures exactly the pre-image it needs (the affected sample range plus
//! the selection, and for length edits the region/marker snapshots), so
//! `op ; undo` restores the buffer float-bit-identically.

use std::any::Any;

use we_core::{PcmBuffer, Selection, WaveError, WaveResult};
use we_dsp::{FadeCurve, FadeDirection, NormalizeMode};

use crate::document::{DocumentContent, SharedContent};
use crate::markers::Marker;
use crate::regions::{BoundarySide, Region};
use crate::undo::Command;

/// Selection/cursor plus timeline models, as they were before an edit.
#[derive(Debug, Clone)]
struct ModelSnapshot {
    selection: Selection,
    cursor: u64,
    regions: Vec<Region>,
    markers: Vec<Marker>,
}

fn take_snapshot(content: &DocumentContent) -> ModelSnapshot {
    ModelSnapshot {
        selection: content.selection,
        cursor: content.cursor,
        regions: content.regions.regions().to_vec(),
        markers: content.markers.markers().to_vec(),
    }
}

fn restore_snapshot(content: &mut DocumentContent, snapshot: &ModelSnapshot) {
    content.selection = snapshot.selection;
    content.cursor = snapshot.cursor;
    content.regions.restore(snapshot.regions.clone());
    content.markers.restore(snapshot.markers.clone());
}

/// Which channels an in-place edit touches.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChannelTarget {
    pub start: u64,
    pub len: u64,
    pub mask: u32,
}

impl ChannelTarget {
    pub fn new(start: u64, len: u64, mask: u32) -> Self {
        Self { start, len, mask }
    }
}

// ───────────────────────────────────────────────────────────────────────────
// Length-changing commands
// ───────────────────────────────────────────────────────────────────────────

/// Remove a sample range (Cut keeps the slice on the clipboard first).
pub struct DeleteRangeCommand {
    content: SharedContent,
    start: u64,
    len: u64,
    removed: Option<PcmBuffer>,
    before: Option<ModelSnapshot>,
    name: String,
}

impl DeleteRangeCommand {
    pub fn new(content: SharedContent, start: u64, len: u64, name: &str) -> Box<Self> {
        Box::new(Self {
            content,
            start,
            len,
            removed: None,
            before: None,
            name: name.to_string(),
        })
    }
}

impl Command for DeleteRangeCommand {
    fn execute(&mut self) -> WaveResult<()> {
        let content = self.content.clone();
        let mut c = content.write();
        let snapshot = take_snapshot(&c);
        let removed = c.pcm.read().slice(self.start, self.len)?;
        c.pcm.write().delete(self.start, self.len)?;
        c.regions.apply_deletion(self.start, self.len);
        c.markers.apply_deletion(self.start, self.len);
        c.selection = Selection::cursor(self.start);
        c.cursor = self.start;
        self.removed = Some(removed);
        self.before = Some(snapshot);
        Ok(())
    }

    fn undo(&mut self) -> WaveResult<()> {
        let content = self.content.clone();
        let mut c = content.write();
        let removed = self
            .removed
            .as_ref()
            .ok_or_else(|| WaveError::InvariantViolation("undo before execute".to_string()))?;
        c.pcm.write().insert(self.start, removed)?;
        if let Some(snapshot) = &self.before {
            restore_snapshot(&mut c, snapshot);
        }
        Ok(())
    }

    fn name(&self) -> &str {
        &self.name
    }

    fn alters_length(&self) -> bool {
        true
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}

/// Insert audio at a position (Paste).
pub struct InsertPcmCommand {
    content: SharedContent,
    at: u64,
    pcm: PcmBuffer,
    before: Option<ModelSnapshot>,
    name: String,
}

impl InsertPcmCommand {
    pub fn new(content: SharedContent, at: u64, pcm: PcmBuffer, name: &str) -> Box<Self> {
        Box::new(Self {
            content,
            at,
            pcm,
            before: None,
            name: name.to_string(),
        })
    }
}

impl Command for InsertPcmCommand {
    fn execute(&mut self) -> WaveResult<()> {
        let content = self.content.clone();
        let mut c = content.write();
        let snapshot = take_snapshot(&c);
        c.pcm.write().insert(self.at, &self.pcm)?;
        let len = self.pcm.num_samples() as u64;
        c.regions.apply_insertion(self.at, len);
        c.markers.apply_insertion(self.at, len);
        c.selection = Selection::new(self.at, self.at + len);
        c.cursor = self.at + len;
        self.before = Some(snapshot);
        Ok(())
    }

    fn undo(&mut self) -> WaveResult<()> {
        let content = self.content.clone();
        let mut c = content.write();
        c.pcm
            .write()
            .delete(self.at, self.pcm.num_samples() as u64)?;
        if let Some(snapshot) = &self.before {
            restore_snapshot(&mut c, snapshot);
        }
        Ok(())
    }

    fn name(&self) -> &str {
        &self.name
    }

    fn alters_length(&self) -> bool {
        true
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}

/// Atomic delete + insert; the replacement may differ in length
/// (paste-over, applying an offline render).
pub struct ReplaceRangeCommand {
    content: SharedContent,
    start: u64,
    len: u64,
    replacement: PcmBuffer,
    removed: Option<PcmBuffer>,
    before: Option<ModelSnapshot>,
    name: String,
}

impl ReplaceRangeCommand {
    pub fn new(
        content: SharedContent,
        start: u64,
        len: u64,
        replacement: PcmBuffer,
        name: &str,
    ) -> Box<Self> {
        Box::new(Self {
            content,
            start,
            len,
            replacement,
            removed: None,
            before: None,
            name: name.to_string(),
        })
    }
}

impl Command for ReplaceRangeCommand {
    fn execute(&mut self) -> WaveResult<()> {
        let content = self.content.clone();
        let mut c = content.write();
        let snapshot = take_snapshot(&c);
        let removed = c.pcm.read().slice(self.start, self.len)?;
        c.pcm.write().replace(self.start, self.len, &self.replacement)?;
        let new_len = self.replacement.num_samples() as u64;
        c.regions.apply_deletion(self.start, self.len);
        c.regions.apply_insertion(self.start, new_len);
        c.markers.apply_deletion(self.start, self.len);
        c.markers.apply_insertion(self.start, new_len);
        c.selection = Selection::new(self.start, self.start + new_len);
        c.cursor = self.start + new_len;
        self.removed = Some(removed);
        self.before = Some(snapshot);
        Ok(())
    }

    fn undo(&mut self) -> WaveResult<()> {
        let content = self.content.clone();
        let mut c = content.write();
        let removed = self
            .removed
            .as_ref()
            .ok_or_else(|| WaveError::InvariantViolation("undo before execute".to_string()))?;
        c.pcm
            .write()
            .replace(self.start, self.replacement.num_samples() as u64, removed)?;
        if let Some(snapshot) = &self.before {
            restore_snapshot(&mut c, snapshot);
        }
        Ok(())
    }

    fn name(&self) -> &str {
        &self.name
    }

    fn alters_length(&self) -> bool {
        true
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}

/// Keep only the selected range.
pub struct TrimCommand {
    content: SharedContent,
    start: u64,
    len: u64,
    head: Option<PcmBuffer>,
    tail: Option<PcmBuffer>,
    before: Option<ModelSnapshot>,
}

impl TrimCommand {
    pub fn new(content: SharedContent, start: u64, len: u64) -> Box<Self> {
        Box::new(Self {
            content,
            start,
            len,
            head: None,
            tail: None,
            before: None,
        })
    }
}

impl Command for TrimCommand {
    fn execute(&mut self) -> WaveResult<()> {
        let content = self.content.clone();
        let mut c = content.write();
        let snapshot = take_snapshot(&c);
        let total = c.pcm.read().num_samples() as u64;
        let end = self
            .start
            .checked_add(self.len)
            .filter(|&e| e <= total)
            .ok_or_else(|| WaveError::out_of_range(self.start, self.len, total))?;

        let head = c.pcm.read().slice(0, self.start)?;
        let tail = c.pcm.read().slice(end, total - end)?;
        c.pcm.write().trim_to_range(self.start, self.len)?;

        c.regions.apply_deletion(end, total - end);
        c.regions.apply_deletion(0, self.start);
        c.markers.apply_deletion(end, total - end);
        c.markers.apply_deletion(0, self.start);
        c.selection = Selection::new(0, self.len);
        c.cursor = 0;

        self.head = Some(head);
        self.tail = Some(tail);
        self.before = Some(snapshot);
        Ok(())
    }

    fn undo(&mut self) -> WaveResult<()> {
        let content = self.content.clone();
        let mut c = content.write();
        let (head, tail) = match (&self.head, &self.tail) {
            (Some(head), Some(tail)) => (head, tail),
            _ => {
                return Err(WaveError::InvariantViolation(
                    "undo before execute".to_string(),
                ))
            }
        };
        c.pcm.write().insert(0, head)?;
        let end = self.start + self.len;
        c.pcm.write().insert(end, tail)?;
        if let Some(snapshot) = &self.before {
            restore_snapshot(&mut c, snapshot);
        }
        Ok(())
    }

    fn name(&self) -> &str {
        "Trim to Selection"
    }

    fn alters_length(&self) -> bool {
        true
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}

/// Remix to a different channel count. Not a range edit, so the pre-image
/// is the whole buffer.
pub struct ConvertChannelsCommand {
    content: SharedContent,
    target: usize,
    previous: Option<PcmBuffer>,
    selection_before: Option<(Selection, u64)>,
    name: String,
}

impl ConvertChannelsCommand {
    pub fn new(content: SharedContent, target: usize) -> Box<Self> {
        Box::new(Self {
            content,
            target,
            previous: None,
            selection_before: None,
            name: format!("Convert to {} Channel{}", target, if target == 1 { "" } else { "s" }),
        })
    }
}

impl Command for ConvertChannelsCommand {
    fn execute(&mut self) -> WaveResult<()> {
        let content = self.content.clone();
        let mut c = content.write();
        let previous = c.pcm.read().clone();
        c.pcm.write().convert_channel_count(self.target)?;
        self.selection_before = Some((c.selection, c.cursor));
        self.previous = Some(previous);
        Ok(())
    }

    fn undo(&mut self) -> WaveResult<()> {
        let content = self.content.clone();
        let mut c = content.write();
        let previous = self
            .previous
            .as_ref()
            .ok_or_else(|| WaveError::InvariantViolation("undo before execute".to_string()))?;
        *c.pcm.write() = previous.clone();
        if let Some((selection, cursor)) = self.selection_before {
            c.selection = selection;
            c.cursor = cursor;
        }
        Ok(())
    }

    fn name(&self) -> &str {
        &self.name
    }

    fn alters_length(&self) -> bool {
        // The layout changes even though the frame count does not; the
        // engine is reinstalled around it like a length edit.
        true
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}

// ───────────────────────────────────────────────────────────────────────────
// In-place range edits
// ───────────────────────────────────────────────────────────────────────────

/// The destructive DSP edits that keep the buffer length.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum EditKind {
    Gain { gain_db: f64 },
    Normalize { target_db: f64, mode: NormalizeMode },
    FadeIn { curve: FadeCurve },
    FadeOut { curve: FadeCurve },
    Silence,
    RemoveDc,
    Clamp,
    PhaseInvert,
    Reverse,
}

impl EditKind {
    fn describe(&self) -> String {
        match self {
            EditKind::Gain { gain_db } => format!("Apply Gain {gain_db:+.1} dB"),
            EditKind::Normalize { target_db, .. } => format!("Normalize to {target_db:.1} dB"),
            EditKind::FadeIn { .. } => "Fade In".to_string(),
            EditKind::FadeOut { .. } => "Fade Out".to_string(),
            EditKind::Silence => "Silence".to_string(),
            EditKind::RemoveDc => "Remove DC Offset".to_string(),
            EditKind::Clamp => "Clamp to Valid Range".to_string(),
            EditKind::PhaseInvert => "Invert Phase".to_string(),
            EditKind::Reverse => "Reverse".to_string(),
        }
    }
}

/// One in-place edit over a channel-masked range, with the overwritten
/// samples as its pre-image.
pub struct RangeEditCommand {
    content: SharedContent,
    target: ChannelTarget,
    kind: EditKind,
    pre: Option<PcmBuffer>,
    selection_before: Option<(Selection, u64)>,
    name: String,
}

impl RangeEditCommand {
    pub fn new(content: SharedContent, target: ChannelTarget, kind: EditKind) -> Box<Self> {
        let name = kind.describe();
        Box::new(Self {
            content,
            target,
            kind,
            pre: None,
            selection_before: None,
            name,
        })
    }

    fn apply(&self, pcm: &mut PcmBuffer) -> WaveResult<()> {
        let ChannelTarget { start, len, mask } = self.target;
        match self.kind {
            EditKind::Gain { gain_db } => we_dsp::apply_gain(pcm, start, len, mask, gain_db),
            EditKind::Normalize { target_db, mode } => {
                we_dsp::normalize(pcm, start, len, mask, target_db, mode).map(|_| ())
            }
            EditKind::FadeIn { curve } => {
                we_dsp::fade(pcm, start, len, mask, FadeDirection::In, curve)
            }
            EditKind::FadeOut { curve } => {
                we_dsp::fade(pcm, start, len, mask, FadeDirection::Out, curve)
            }
            EditKind::Silence => pcm.silence_range(start, len, mask),
            EditKind::RemoveDc => we_dsp::remove_dc_offset(pcm, start, len, mask),
            EditKind::Clamp => we_dsp::clamp_to_valid_range(pcm, start, len, mask).map(|_| ()),
            EditKind::PhaseInvert => pcm.phase_invert(start, len, mask),
            EditKind::Reverse => pcm.reverse(start, len, mask),
        }
    }
}

impl Command for RangeEditCommand {
    fn execute(&mut self) -> WaveResult<()> {
        let content = self.content.clone();
        let mut c = content.write();
        let ChannelTarget { start, len, mask } = self.target;
        let pre = c.pcm.read().copy_channels(start, len, mask)?;
        self.apply(&mut c.pcm.write())?;
        self.selection_before = Some((c.selection, c.cursor));
        self.pre = Some(pre);
        Ok(())
    }

    fn undo(&mut self) -> WaveResult<()> {
        let content = self.content.clone();
        let mut c = content.write();
        let pre = self
            .pre
            .as_ref()
            .ok_or_else(|| WaveError::InvariantViolation("undo before execute".to_string()))?;
        c.pcm
            .write()
            .replace_channels(self.target.start, pre, self.target.mask)?;
        if let Some((selection, cursor)) = self.selection_before {
            c.selection = selection;
            c.cursor = cursor;
        }
        Ok(())
    }

    fn name(&self) -> &str {
        &self.name
    }

    fn coalesce_key(&self) -> Option<String> {
        // Repeated gain ticks on the same target (slider drag) merge into
        // one record.
        match self.kind {
            EditKind::Gain { .. } => Some(format!(
                "gain:{}:{}:{}",
                self.target.start, self.target.len, self.target.mask
            )),
            _ => None,
        }
    }

    fn merge(&mut self, other: Box<dyn Command>) {
        if let Some(other) = other.as_any().downcast_ref::<RangeEditCommand>() {
            if let (EditKind::Gain { gain_db }, EditKind::Gain { gain_db: added }) =
                (&mut self.kind, &other.kind)
            {
                *gain_db += added;
                self.name = self.kind.describe();
            }
        }
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}

// ───────────────────────────────────────────────────────────────────────────
// Region / marker commands
// ───────────────────────────────────────────────────────────────────────────

/// Shared shape for the timeline-model edits: snapshot, mutate, restore.
macro_rules! region_snapshot_undo {
    () => {
        fn undo(&mut self) -> WaveResult<()> {
            let content = self.content.clone();
            let mut c = content.write();
            if let Some(regions) = self.before.take() {
                c.regions.restore(regions);
            }
            Ok(())
        }

        fn as_any(&self) -> &dyn Any {
            self
        }
    };
}

pub struct AddRegionCommand {
    content: SharedContent,
    region: Region,
    before: Option<Vec<Region>>,
}

impl AddRegionCommand {
    pub fn new(content: SharedContent, region: Region) -> Box<Self> {
        Box::new(Self {
            content,
            region,
            before: None,
        })
    }
}

impl Command for AddRegionCommand {
    fn execute(&mut self) -> WaveResult<()> {
        let content = self.content.clone();
        let mut c = content.write();
        self.before = Some(c.regions.regions().to_vec());
        c.regions.add(self.region.clone());
        Ok(())
    }

    fn name(&self) -> &str {
        "Add Region"
    }

    region_snapshot_undo!();
}

pub struct RemoveRegionCommand {
    content: SharedContent,
    index: usize,
    before: Option<Vec<Region>>,
}

impl RemoveRegionCommand {
    pub fn new(content: SharedContent, index: usize) -> Box<Self> {
        Box::new(Self {
            content,
            index,
            before: None,
        })
    }
}

impl Command for RemoveRegionCommand {
    fn execute(&mut self) -> WaveResult<()> {
        let content = self.content.clone();
        let mut c = content.write();
        let snapshot = c.regions.regions().to_vec();
        c.regions
            .remove(self.index)
            .ok_or_else(|| WaveError::OutOfRange(format!("region {}", self.index)))?;
        self.before = Some(snapshot);
        Ok(())
    }

    fn name(&self) -> &str {
        "Remove Region"
    }

    region_snapshot_undo!();
}

pub struct MergeRegionsCommand {
    content: SharedContent,
    before: Option<Vec<Region>>,
}

impl MergeRegionsCommand {
    pub fn new(content: SharedContent) -> Box<Self> {
        Box::new(Self {
            content,
            before: None,
        })
    }
}

impl Command for MergeRegionsCommand {
    fn execute(&mut self) -> WaveResult<()> {
        let content = self.content.clone();
        let mut c = content.write();
        let snapshot = c.regions.regions().to_vec();
        c.regions
            .merge_selected()
            .ok_or_else(|| WaveError::InvalidParam("no regions selected".to_string()))?;
        self.before = Some(snapshot);
        Ok(())
    }

    fn name(&self) -> &str {
        "Merge Regions"
    }

    region_snapshot_undo!();
}

pub struct SplitRegionCommand {
    content: SharedContent,
    index: usize,
    at: u64,
    before: Option<Vec<Region>>,
}

impl SplitRegionCommand {
    pub fn new(content: SharedContent, index: usize, at: u64) -> Box<Self> {
        Box::new(Self {
            content,
            index,
            at,
            before: None,
        })
    }
}

impl Command for SplitRegionCommand {
    fn execute(&mut self) -> WaveResult<()> {
        let content = self.content.clone();
        let mut c = content.write();
        let snapshot = c.regions.regions().to_vec();
        c.regions
            .split(self.index, self.at)
            .ok_or_else(|| WaveError::InvalidParam("split point outside region".to_string()))?;
        self.before = Some(snapshot);
        Ok(())
    }

    fn name(&self) -> &str {
        "Split Region"
    }

    region_snapshot_undo!();
}

/// Boundary nudge; consecutive nudges of the same edge coalesce.
pub struct NudgeRegionCommand {
    content: SharedContent,
    index: usize,
    side: BoundarySide,
    delta: i64,
    snap: bool,
    before: Option<Vec<Region>>,
}

impl NudgeRegionCommand {
    pub fn new(
        content: SharedContent,
        index: usize,
        side: BoundarySide,
        delta: i64,
        snap: bool,
    ) -> Box<Self> {
        Box::new(Self {
            content,
            index,
            side,
            delta,
            snap,
            before: None,
        })
    }
}

impl Command for NudgeRegionCommand {
    fn execute(&mut self) -> WaveResult<()> {
        let content = self.content.clone();
        let mut c = content.write();
        let snapshot = c.regions.regions().to_vec();
        let total = c.pcm.read().num_samples() as u64;
        let pcm = if self.snap {
            Some(c.pcm.read().clone())
        } else {
            None
        };
        c.regions
            .nudge_boundary(self.index, self.side, self.delta, total, pcm.as_ref())
            .ok_or_else(|| WaveError::OutOfRange(format!("region {}", self.index)))?;
        if self.before.is_none() {
            self.before = Some(snapshot);
        }
        Ok(())
    }

    fn name(&self) -> &str {
        "Nudge Region Boundary"
    }

    fn coalesce_key(&self) -> Option<String> {
        let side = match self.side {
            BoundarySide::Start => "start",
            BoundarySide::End => "end",
        };
        Some(format!("nudge:{}:{side}", self.index))
    }

    fn merge(&mut self, other: Box<dyn Command>) {
        if let Some(other) = other.as_any().downcast_ref::<NudgeRegionCommand>() {
            // Redo replays the accumulated distance in one step.
            self.delta += other.delta;
        }
    }

    region_snapshot_undo!();
}

/// Commit a batch of regions (strip-silence results).
pub struct CommitRegionsCommand {
    content: SharedContent,
    regions: Vec<Region>,
    before: Option<Vec<Region>>,
    name: String,
}

impl CommitRegionsCommand {
    pub fn new(content: SharedContent, regions: Vec<Region>, name: &str) -> Box<Self> {
        Box::new(Self {
            content,
            regions,
            before: None,
            name: name.to_string(),
        })
    }
}

impl Command for CommitRegionsCommand {
    fn execute(&mut self) -> WaveResult<()> {
        let content = self.content.clone();
        let mut c = content.write();
        self.before = Some(c.regions.regions().to_vec());
        for region in &self.regions {
            c.regions.add(region.clone());
        }
        Ok(())
    }

    fn name(&self) -> &str {
        &self.name
    }

    region_snapshot_undo!();
}

pub struct AddMarkerCommand {
    content: SharedContent,
    marker: Marker,
    before: Option<Vec<Marker>>,
}

impl AddMarkerCommand {
    pub fn new(content: SharedContent, marker: Marker) -> Box<Self> {
        Box::new(Self {
            content,
            marker,
            before: None,
        })
    }
}

impl Command for AddMarkerCommand {
    fn execute(&mut self) -> WaveResult<()> {
        let content = self.content.clone();
        let mut c = content.write();
        self.before = Some(c.markers.markers().to_vec());
        c.markers.add(self.marker.clone());
        Ok(())
    }

    fn undo(&mut self) -> WaveResult<()> {
        let content = self.content.clone();
        let mut c = content.write();
        if let Some(markers) = self.before.take() {
            c.markers.restore(markers);
        }
        Ok(())
    }

    fn name(&self) -> &str {
        "Add Marker"
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}

pub struct RemoveMarkerCommand {
    content: SharedContent,
    index: usize,
    before: Option<Vec<Marker>>,
}

impl RemoveMarkerCommand {
    pub fn new(content: SharedContent, index: usize) -> Box<Self> {
        Box::new(Self {
            content,
            index,
            before: None,
        })
    }
}

impl Command for RemoveMarkerCommand {
    fn execute(&mut self) -> WaveResult<()> {
        let content = self.content.clone();
        let mut c = content.write();
        let snapshot = c.markers.markers().to_vec();
        c.markers
            .remove(self.index)
            .ok_or_else(|| WaveError::OutOfRange(format!("marker {}", self.index)))?;
        self.before = Some(snapshot);
        Ok(())
    }

    fn undo(&mut self) -> WaveResult<()> {
        let content = self.content.clone();
        let mut c = content.write();
        if let Some(markers) = self.before.take() {
            c.markers.restore(markers);
        }
        Ok(())
    }

    fn name(&self) -> &str {
        "Remove Marker"
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}
