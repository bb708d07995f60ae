//! Document
//!
//! Aggregate state for one editable audio file: the PCM buffer, selection
//! and cursor, undo stack, regions, markers and carried metadata. Mutating
//! operations go through undo commands; length edits stop the playback
//! engine, mutate, reinstall the buffer handle and restore the play state.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use parking_lot::RwLock;

use we_core::{BitDepth, PcmBuffer, Selection, WaveError, WaveResult};
use we_dsp::strip_silence::StripSilenceParams;
use we_engine::{PlaybackEngine, SharedPcm};
use we_file::{AudioMetadata, EncodeFormat, EncodeRequest};

use crate::edit_commands::{
    AddMarkerCommand, AddRegionCommand, ChannelTarget, CommitRegionsCommand, ConvertChannelsCommand,
    DeleteRangeCommand, EditKind, InsertPcmCommand, RangeEditCommand, ReplaceRangeCommand,
    TrimCommand,
};
use crate::markers::{Marker, MarkerModel};
use crate::regions::{Region, RegionModel};
use crate::undo::{Command, UndoManager};

/// View state preserved across undo/redo so the timeline does not jump.
#[derive(Debug, Clone, Copy)]
pub struct ViewState {
    /// Pixels per second.
    pub zoom: f64,
    /// Leftmost visible time in seconds.
    pub scroll: f64,
}

impl Default for ViewState {
    fn default() -> Self {
        Self {
            zoom: 100.0,
            scroll: 0.0,
        }
    }
}

/// Everything the edit commands operate on, behind one lock.
pub struct DocumentContent {
    pub pcm: SharedPcm,
    pub selection: Selection,
    pub cursor: u64,
    pub regions: RegionModel,
    pub markers: MarkerModel,
    pub metadata: AudioMetadata,
    pub view: ViewState,
}

impl DocumentContent {
    pub fn num_samples(&self) -> u64 {
        self.pcm.read().num_samples() as u64
    }
}

/// Shared handle the edit commands hold.
pub type SharedContent = Arc<RwLock<DocumentContent>>;

/// One open audio file.
pub struct Document {
    content: SharedContent,
    undo: UndoManager,
    path: Option<PathBuf>,
    title: String,
    dirty: bool,
    engine: Option<Arc<PlaybackEngine>>,
}

impl Document {
    /// New document with silence. It has no backing file until saved.
    pub fn new(sample_rate: f64, channels: usize, bit_depth: BitDepth, duration_secs: f64) -> Self {
        let samples = (duration_secs.max(0.0) * sample_rate).round() as usize;
        let mut pcm = PcmBuffer::new(channels, samples, sample_rate);
        pcm.set_bit_depth(bit_depth);
        Self::from_pcm(pcm, AudioMetadata::default(), None, "Untitled")
    }

    fn from_pcm(
        pcm: PcmBuffer,
        metadata: AudioMetadata,
        path: Option<PathBuf>,
        title: &str,
    ) -> Self {
        let content = Arc::new(RwLock::new(DocumentContent {
            pcm: Arc::new(RwLock::new(pcm)),
            selection: Selection::default(),
            cursor: 0,
            regions: RegionModel::new(),
            markers: MarkerModel::new(),
            metadata,
            view: ViewState::default(),
        }));
        Self {
            content,
            undo: UndoManager::default(),
            path,
            title: title.to_string(),
            dirty: false,
            engine: None,
        }
    }

    /// Load from disk, including region/marker side-cars when present.
    pub fn load(path: &Path) -> WaveResult<Self> {
        let decoded = we_file::decode(path)?;
        let title = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| "Untitled".to_string());
        let document = Self::from_pcm(
            decoded.pcm,
            decoded.metadata,
            Some(path.to_path_buf()),
            &title,
        );
        {
            let mut content = document.content.write();
            if content.regions.load_sidecar(path) {
                log::debug!("{title}: loaded region side-car");
            }
            if content.markers.load_sidecar(path) {
                log::debug!("{title}: loaded marker side-car");
            }
            let total = content.num_samples();
            content.regions.clamp_to_length(total);
            content.markers.clamp_to_length(total);
        }
        Ok(document)
    }

    /// Save (binding the document to `path`), plus side-cars. Clears the
    /// dirty flag on success.
    pub fn save(
        &mut self,
        path: &Path,
        format: EncodeFormat,
        bit_depth: BitDepth,
        quality: u8,
        target_sample_rate: Option<f64>,
    ) -> WaveResult<()> {
        let (request, has_regions, has_markers) = {
            let content = self.content.read();
            let request = EncodeRequest {
                format,
                bit_depth,
                quality,
                metadata: content.metadata.clone(),
                target_sample_rate,
            };
            (
                request,
                !content.regions.is_empty(),
                !content.markers.is_empty(),
            )
        };
        {
            let content = self.content.read();
            let pcm = content.pcm.read();
            we_file::encode(&pcm, path, &request)?;
        }
        {
            let content = self.content.read();
            if has_regions {
                content.regions.save_sidecar(path)?;
            }
            if has_markers {
                content.markers.save_sidecar(path)?;
            }
        }
        self.path = Some(path.to_path_buf());
        self.title = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| self.title.clone());
        self.dirty = false;
        Ok(())
    }

    /// Release the playback engine's handle. Callers prompt about unsaved
    /// changes before getting here.
    pub fn close(&mut self) {
        if let Some(engine) = &self.engine {
            engine.stop();
            engine.revoke_buffer();
        }
        self.undo.clear();
    }

    /// Wire a playback engine to this document and hand it the buffer.
    pub fn attach_engine(&mut self, engine: Arc<PlaybackEngine>) {
        engine.install_buffer(self.content.read().pcm.clone());
        self.engine = Some(engine);
    }

    pub fn engine(&self) -> Option<&Arc<PlaybackEngine>> {
        self.engine.as_ref()
    }

    pub fn content(&self) -> &SharedContent {
        &self.content
    }

    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    pub fn title(&self) -> &str {
        &self.title
    }

    pub fn is_dirty(&self) -> bool {
        self.dirty
    }

    pub fn num_samples(&self) -> u64 {
        self.content.read().num_samples()
    }

    pub fn sample_rate(&self) -> f64 {
        self.content.read().pcm.read().sample_rate()
    }

    pub fn channels(&self) -> usize {
        self.content.read().pcm.read().channels()
    }

    // ── selection & cursor ─────────────────────────────────────────────

    pub fn selection(&self) -> Selection {
        self.content.read().selection
    }

    pub fn set_selection(&self, mut selection: Selection) {
        let mut content = self.content.write();
        let total = content.num_samples();
        selection.clamp_to(total);
        content.selection = selection;
    }

    pub fn cursor(&self) -> u64 {
        self.content.read().cursor
    }

    pub fn set_cursor(&self, cursor: u64) {
        let mut content = self.content.write();
        let total = content.num_samples();
        content.cursor = cursor.min(total);
        content.selection = Selection::cursor(content.cursor);
    }

    /// The active selection, or the whole file when it is just a cursor.
    pub fn selection_or_all(&self) -> Selection {
        let content = self.content.read();
        if content.selection.is_empty() {
            Selection::with_mask(0, content.num_samples(), content.selection.channel_mask)
        } else {
            content.selection
        }
    }

    // ── undoable operations ────────────────────────────────────────────

    /// Run a command through the undo stack, bracketing the playback engine
    /// when the buffer length (or layout) changes.
    pub fn apply(&mut self, command: Box<dyn Command>) -> WaveResult<()> {
        let guard = self.transport_guard(command.alters_length());
        let result = self.undo.execute(command);
        self.finish_transport_guard(guard);
        if result.is_ok() {
            self.dirty = true;
        }
        result
    }

    pub fn undo(&mut self) -> WaveResult<bool> {
        let guard = self.transport_guard(self.undo.next_undo_alters_length());
        let undone = self.undo.undo();
        self.finish_transport_guard(guard);
        if matches!(undone, Ok(true)) {
            self.dirty = true;
        }
        undone
    }

    pub fn redo(&mut self) -> WaveResult<bool> {
        let guard = self.transport_guard(self.undo.next_redo_alters_length());
        let redone = self.undo.redo();
        self.finish_transport_guard(guard);
        if matches!(redone, Ok(true)) {
            self.dirty = true;
        }
        redone
    }

    pub fn can_undo(&self) -> bool {
        self.undo.can_undo()
    }

    pub fn can_redo(&self) -> bool {
        self.undo.can_redo()
    }

    pub fn undo_name(&self) -> Option<&str> {
        self.undo.undo_name()
    }

    pub fn redo_name(&self) -> Option<&str> {
        self.undo.redo_name()
    }

    /// Stop playback around a length mutation. Returns whether to resume.
    fn transport_guard(&self, needed: bool) -> Option<bool> {
        if !needed {
            return None;
        }
        let Some(engine) = &self.engine else {
            return None;
        };
        let was_playing = engine.is_playing();
        engine.stop();
        Some(was_playing)
    }

    /// Reinstall the (possibly new-length) handle and restore play state.
    fn finish_transport_guard(&self, guard: Option<bool>) {
        let Some(was_playing) = guard else { return };
        if let Some(engine) = &self.engine {
            engine.install_buffer(self.content.read().pcm.clone());
            if was_playing {
                engine.play();
            }
        }
    }

    // ── edit-menu conveniences ─────────────────────────────────────────

    fn nonempty_selection(&self) -> WaveResult<Selection> {
        let selection = self.selection();
        if selection.is_empty() {
            return Err(WaveError::InvalidParam("selection is empty".to_string()));
        }
        Ok(selection)
    }

    /// Copy the selection (mask-aware: the result has one channel per mask
    /// bit).
    pub fn copy_selection(&self) -> WaveResult<PcmBuffer> {
        let selection = self.nonempty_selection()?;
        let content = self.content.read();
        let pcm = content.pcm.read();
        pcm.copy_channels(selection.start, selection.len(), selection.channel_mask)
    }

    /// Cut: copy, then delete.
    pub fn cut_selection(&mut self) -> WaveResult<PcmBuffer> {
        let clip = self.copy_selection()?;
        let selection = self.nonempty_selection()?;
        self.apply(DeleteRangeCommand::new(
            self.content.clone(),
            selection.start,
            selection.len(),
            "Cut",
        ))?;
        Ok(clip)
    }

    pub fn delete_selection(&mut self) -> WaveResult<()> {
        let selection = self.nonempty_selection()?;
        self.apply(DeleteRangeCommand::new(
            self.content.clone(),
            selection.start,
            selection.len(),
            "Delete",
        ))
    }

    /// Paste at a sample position. The clip is adapted to the document's
    /// channel count first.
    pub fn paste(&mut self, at: u64, clip: &PcmBuffer) -> WaveResult<()> {
        let channels = self.channels();
        let mut adapted = clip.clone();
        if adapted.channels() != channels {
            adapted.convert_channel_count(channels)?;
        }
        self.apply(InsertPcmCommand::new(
            self.content.clone(),
            at,
            adapted,
            "Paste",
        ))
    }

    /// Replace the selection with `replacement` (paste-over, or installing
    /// an offline render).
    pub fn replace_selection(&mut self, replacement: PcmBuffer, name: &str) -> WaveResult<()> {
        let selection = self.nonempty_selection()?;
        self.apply(ReplaceRangeCommand::new(
            self.content.clone(),
            selection.start,
            selection.len(),
            replacement,
            name,
        ))
    }

    pub fn trim_to_selection(&mut self) -> WaveResult<()> {
        let selection = self.nonempty_selection()?;
        self.apply(TrimCommand::new(
            self.content.clone(),
            selection.start,
            selection.len(),
        ))
    }

    /// One of the in-place DSP edits over the current selection (or the
    /// whole file at a bare cursor).
    pub fn apply_edit(&mut self, kind: EditKind) -> WaveResult<()> {
        let selection = self.selection_or_all();
        self.apply(RangeEditCommand::new(
            self.content.clone(),
            ChannelTarget::new(selection.start, selection.len(), selection.channel_mask),
            kind,
        ))
    }

    pub fn convert_channels(&mut self, target: usize) -> WaveResult<()> {
        self.apply(ConvertChannelsCommand::new(self.content.clone(), target))
    }

    // ── regions & markers ──────────────────────────────────────────────

    pub fn add_region_at_selection(&mut self, name: &str) -> WaveResult<()> {
        let selection = self.nonempty_selection()?;
        self.apply(AddRegionCommand::new(
            self.content.clone(),
            Region::new(name, selection.start, selection.end),
        ))
    }

    pub fn add_marker_at_cursor(&mut self, name: &str) -> WaveResult<()> {
        let cursor = self.cursor();
        self.apply(AddMarkerCommand::new(
            self.content.clone(),
            Marker::new(name, cursor),
        ))
    }

    /// Run strip-silence over the whole file and commit the detected
    /// regions as one undoable step.
    pub fn strip_silence_commit(&mut self, params: &StripSilenceParams) -> WaveResult<usize> {
        let candidates = {
            let content = self.content.read();
            let pcm = content.pcm.read();
            we_dsp::detect_regions(&pcm, params)
        };
        let count = candidates.len();
        if count == 0 {
            return Ok(0);
        }
        let regions: Vec<Region> = candidates
            .into_iter()
            .map(|c| Region::new(&c.name, c.start, c.end))
            .collect();
        self.apply(CommitRegionsCommand::new(
            self.content.clone(),
            regions,
            "Strip Silence",
        ))?;
        Ok(count)
    }

    /// Select the complement of the regions ("select inverse" starts from
    /// the first gap).
    pub fn select_inverse_of_regions(&self) -> Vec<(u64, u64)> {
        let content = self.content.read();
        let total = content.num_samples();
        content.regions.inverse_ranges(total)
    }
}

impl Default for Document {
    fn default() -> Self {
        Self::new(48000.0, 2, BitDepth::default(), 0.0)
    }
}
