//! Command surface
//!
//! Flat enumeration of user-invocable commands, each with a stable string
//! name used by keymap templates (JSON maps of command name → shortcut).
//! Execution is routed to the current document; the UI shell owns the
//! bindings between keys and names.

use std::collections::BTreeMap;
use std::path::Path;

use serde::{Deserialize, Serialize};

use we_core::WaveResult;
use we_dsp::{FadeCurve, NormalizeMode};

use crate::edit_commands::EditKind;
use crate::manager::DocumentManager;

/// Every command the keymap can address.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CommandId {
    // File
    FileNew,
    FileOpen,
    FileSave,
    FileSaveAs,
    FileClose,

    // Edit
    EditUndo,
    EditRedo,
    EditCut,
    EditCopy,
    EditPaste,
    EditDelete,
    EditSelectAll,
    EditSelectNone,
    EditSelectInverse,
    EditTrim,

    // Playback
    PlayPause,
    PlayStop,
    PlayFromStart,
    PlayToggleLoop,
    PlayClearLoop,

    // View
    ViewZoomIn,
    ViewZoomOut,
    ViewZoomFit,
    ViewZoomSelection,

    // Process
    ProcessGain,
    ProcessNormalizePeak,
    ProcessNormalizeRms,
    ProcessFadeIn,
    ProcessFadeOut,
    ProcessSilence,
    ProcessRemoveDc,
    ProcessClamp,
    ProcessPhaseInvert,
    ProcessReverse,
    ProcessStripSilence,
    ProcessPluginChain,

    // Navigation
    NavHome,
    NavEnd,
    NavNextMarker,
    NavPrevMarker,
    NavNextDocument,
    NavPrevDocument,

    // Selection
    SelectionExtendLeft,
    SelectionExtendRight,
    SelectionToCursorStart,
    SelectionToCursorEnd,

    // Snap
    SnapToggle,
    SnapZeroCrossing,

    // Regions
    RegionAdd,
    RegionRemove,
    RegionMerge,
    RegionSplit,
    RegionExportAll,

    // Markers
    MarkerAdd,
    MarkerRemove,
}

impl CommandId {
    /// Stable name for keymap files. Never rename these; templates on disk
    /// reference them.
    pub fn name(&self) -> &'static str {
        match self {
            CommandId::FileNew => "file.new",
            CommandId::FileOpen => "file.open",
            CommandId::FileSave => "file.save",
            CommandId::FileSaveAs => "file.save_as",
            CommandId::FileClose => "file.close",
            CommandId::EditUndo => "edit.undo",
            CommandId::EditRedo => "edit.redo",
            CommandId::EditCut => "edit.cut",
            CommandId::EditCopy => "edit.copy",
            CommandId::EditPaste => "edit.paste",
            CommandId::EditDelete => "edit.delete",
            CommandId::EditSelectAll => "edit.select_all",
            CommandId::EditSelectNone => "edit.select_none",
            CommandId::EditSelectInverse => "edit.select_inverse",
            CommandId::EditTrim => "edit.trim",
            CommandId::PlayPause => "playback.play_pause",
            CommandId::PlayStop => "playback.stop",
            CommandId::PlayFromStart => "playback.play_from_start",
            CommandId::PlayToggleLoop => "playback.toggle_loop",
            CommandId::PlayClearLoop => "playback.clear_loop",
            CommandId::ViewZoomIn => "view.zoom_in",
            CommandId::ViewZoomOut => "view.zoom_out",
            CommandId::ViewZoomFit => "view.zoom_fit",
            CommandId::ViewZoomSelection => "view.zoom_selection",
            CommandId::ProcessGain => "process.gain",
            CommandId::ProcessNormalizePeak => "process.normalize_peak",
            CommandId::ProcessNormalizeRms => "process.normalize_rms",
            CommandId::ProcessFadeIn => "process.fade_in",
            CommandId::ProcessFadeOut => "process.fade_out",
            CommandId::ProcessSilence => "process.silence",
            CommandId::ProcessRemoveDc => "process.remove_dc",
            CommandId::ProcessClamp => "process.clamp",
            CommandId::ProcessPhaseInvert => "process.phase_invert",
            CommandId::ProcessReverse => "process.reverse",
            CommandId::ProcessStripSilence => "process.strip_silence",
            CommandId::ProcessPluginChain => "process.plugin_chain",
            CommandId::NavHome => "nav.home",
            CommandId::NavEnd => "nav.end",
            CommandId::NavNextMarker => "nav.next_marker",
            CommandId::NavPrevMarker => "nav.prev_marker",
            CommandId::NavNextDocument => "nav.next_document",
            CommandId::NavPrevDocument => "nav.prev_document",
            CommandId::SelectionExtendLeft => "selection.extend_left",
            CommandId::SelectionExtendRight => "selection.extend_right",
            CommandId::SelectionToCursorStart => "selection.to_cursor_start",
            CommandId::SelectionToCursorEnd => "selection.to_cursor_end",
            CommandId::SnapToggle => "snap.toggle",
            CommandId::SnapZeroCrossing => "snap.zero_crossing",
            CommandId::RegionAdd => "region.add",
            CommandId::RegionRemove => "region.remove",
            CommandId::RegionMerge => "region.merge",
            CommandId::RegionSplit => "region.split",
            CommandId::RegionExportAll => "region.export_all",
            CommandId::MarkerAdd => "marker.add",
            CommandId::MarkerRemove => "marker.remove",
        }
    }

    /// All commands, for building menus and keymap templates.
    pub fn all() -> &'static [CommandId] {
        use CommandId::*;
        &[
            FileNew, FileOpen, FileSave, FileSaveAs, FileClose,
            EditUndo, EditRedo, EditCut, EditCopy, EditPaste, EditDelete,
            EditSelectAll, EditSelectNone, EditSelectInverse, EditTrim,
            PlayPause, PlayStop, PlayFromStart, PlayToggleLoop, PlayClearLoop,
            ViewZoomIn, ViewZoomOut, ViewZoomFit, ViewZoomSelection,
            ProcessGain, ProcessNormalizePeak, ProcessNormalizeRms,
            ProcessFadeIn, ProcessFadeOut, ProcessSilence, ProcessRemoveDc,
            ProcessClamp, ProcessPhaseInvert, ProcessReverse,
            ProcessStripSilence, ProcessPluginChain,
            NavHome, NavEnd, NavNextMarker, NavPrevMarker,
            NavNextDocument, NavPrevDocument,
            SelectionExtendLeft, SelectionExtendRight,
            SelectionToCursorStart, SelectionToCursorEnd,
            SnapToggle, SnapZeroCrossing,
            RegionAdd, RegionRemove, RegionMerge, RegionSplit, RegionExportAll,
            MarkerAdd, MarkerRemove,
        ]
    }

    pub fn from_name(name: &str) -> Option<CommandId> {
        CommandId::all().iter().copied().find(|c| c.name() == name)
    }
}

/// Keymap template: command name → shortcut description.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Keymap {
    bindings: BTreeMap<String, String>,
}

impl Keymap {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn bind(&mut self, command: CommandId, shortcut: &str) {
        self.bindings
            .insert(command.name().to_string(), shortcut.to_string());
    }

    pub fn shortcut_for(&self, command: CommandId) -> Option<&str> {
        self.bindings.get(command.name()).map(|s| s.as_str())
    }

    /// Command bound to a shortcut, if any.
    pub fn command_for(&self, shortcut: &str) -> Option<CommandId> {
        self.bindings
            .iter()
            .find(|(_, bound)| bound.as_str() == shortcut)
            .and_then(|(name, _)| CommandId::from_name(name))
    }

    pub fn save_to(&self, path: &Path) -> std::io::Result<()> {
        let json = serde_json::to_string_pretty(&self.bindings)
            .map_err(|e| std::io::Error::new(std::io::ErrorKind::InvalidData, e))?;
        std::fs::write(path, json)
    }

    /// Lenient load: unknown command names are kept (they may belong to a
    /// newer build), damage yields an empty map.
    pub fn load_from(path: &Path) -> Self {
        let bindings = std::fs::read_to_string(path)
            .ok()
            .and_then(|content| serde_json::from_str(&content).ok())
            .unwrap_or_default();
        Self { bindings }
    }
}

/// Route a command to the manager / current document. Returns false for
/// commands that need UI collaboration (dialogs, file pickers) and are not
/// handled in the core.
pub fn dispatch(manager: &mut DocumentManager, command: CommandId) -> WaveResult<bool> {
    match command {
        CommandId::EditUndo => {
            if let Some(document) = manager.current_mut() {
                document.undo()?;
            }
            Ok(true)
        }
        CommandId::EditRedo => {
            if let Some(document) = manager.current_mut() {
                document.redo()?;
            }
            Ok(true)
        }
        CommandId::EditCut => manager.cut_selection_to_clipboard().map(|_| true),
        CommandId::EditCopy => manager.copy_selection_to_clipboard().map(|_| true),
        CommandId::EditPaste => {
            let Some(index) = manager.current_index() else {
                return Ok(true);
            };
            let position_sec = manager
                .current()
                .map(|d| d.cursor() as f64 / d.sample_rate())
                .unwrap_or(0.0);
            manager.paste_from_clipboard(index, position_sec).map(|_| true)
        }
        CommandId::EditDelete => {
            if let Some(document) = manager.current_mut() {
                document.delete_selection()?;
            }
            Ok(true)
        }
        CommandId::EditSelectAll => {
            if let Some(document) = manager.current_mut() {
                let total = document.num_samples();
                document.set_selection(we_core::Selection::new(0, total));
            }
            Ok(true)
        }
        CommandId::EditSelectNone => {
            if let Some(document) = manager.current_mut() {
                let cursor = document.cursor();
                document.set_selection(we_core::Selection::cursor(cursor));
            }
            Ok(true)
        }
        CommandId::EditTrim => {
            if let Some(document) = manager.current_mut() {
                document.trim_to_selection()?;
            }
            Ok(true)
        }
        CommandId::ProcessNormalizePeak => {
            if let Some(document) = manager.current_mut() {
                document.apply_edit(EditKind::Normalize {
                    target_db: -1.0,
                    mode: NormalizeMode::Peak,
                })?;
            }
            Ok(true)
        }
        CommandId::ProcessNormalizeRms => {
            if let Some(document) = manager.current_mut() {
                document.apply_edit(EditKind::Normalize {
                    target_db: -18.0,
                    mode: NormalizeMode::Rms,
                })?;
            }
            Ok(true)
        }
        CommandId::ProcessFadeIn => {
            if let Some(document) = manager.current_mut() {
                document.apply_edit(EditKind::FadeIn {
                    curve: FadeCurve::Linear,
                })?;
            }
            Ok(true)
        }
        CommandId::ProcessFadeOut => {
            if let Some(document) = manager.current_mut() {
                document.apply_edit(EditKind::FadeOut {
                    curve: FadeCurve::Linear,
                })?;
            }
            Ok(true)
        }
        CommandId::ProcessSilence => {
            if let Some(document) = manager.current_mut() {
                document.apply_edit(EditKind::Silence)?;
            }
            Ok(true)
        }
        CommandId::ProcessRemoveDc => {
            if let Some(document) = manager.current_mut() {
                document.apply_edit(EditKind::RemoveDc)?;
            }
            Ok(true)
        }
        CommandId::ProcessClamp => {
            if let Some(document) = manager.current_mut() {
                document.apply_edit(EditKind::Clamp)?;
            }
            Ok(true)
        }
        CommandId::ProcessPhaseInvert => {
            if let Some(document) = manager.current_mut() {
                document.apply_edit(EditKind::PhaseInvert)?;
            }
            Ok(true)
        }
        CommandId::ProcessReverse => {
            if let Some(document) = manager.current_mut() {
                document.apply_edit(EditKind::Reverse)?;
            }
            Ok(true)
        }
        CommandId::NavNextDocument => {
            manager.next();
            Ok(true)
        }
        CommandId::NavPrevDocument => {
            manager.previous();
            Ok(true)
        }
        CommandId::NavHome => {
            if let Some(document) = manager.current_mut() {
                document.set_cursor(0);
            }
            Ok(true)
        }
        CommandId::NavEnd => {
            if let Some(document) = manager.current_mut() {
                let total = document.num_samples();
                document.set_cursor(total);
            }
            Ok(true)
        }
        // Dialog-backed and view commands resolve in the UI shell.
        _ => Ok(false),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use we_core::{BitDepth, Selection};

    #[test]
    fn test_names_are_unique_and_stable() {
        let mut seen = std::collections::HashSet::new();
        for command in CommandId::all() {
            assert!(seen.insert(command.name()), "duplicate {}", command.name());
            assert_eq!(CommandId::from_name(command.name()), Some(*command));
        }
        // Spot-check a few names that templates rely on.
        assert_eq!(CommandId::EditUndo.name(), "edit.undo");
        assert_eq!(CommandId::ProcessStripSilence.name(), "process.strip_silence");
    }

    #[test]
    fn test_keymap_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("keymap.json");

        let mut keymap = Keymap::new();
        keymap.bind(CommandId::EditUndo, "ctrl+z");
        keymap.bind(CommandId::PlayPause, "space");
        keymap.save_to(&path).unwrap();

        let loaded = Keymap::load_from(&path);
        assert_eq!(loaded.shortcut_for(CommandId::EditUndo), Some("ctrl+z"));
        assert_eq!(loaded.command_for("space"), Some(CommandId::PlayPause));
    }

    #[test]
    fn test_dispatch_routes_to_current_document() {
        let mut manager = DocumentManager::new();
        let index = manager.add_document(crate::document::Document::new(
            48000.0,
            1,
            BitDepth::Bits24,
            1.0,
        ));
        manager
            .document_mut(index)
            .unwrap()
            .set_selection(Selection::new(0, 4800));

        assert!(dispatch(&mut manager, CommandId::EditCut).unwrap());
        assert_eq!(manager.current().unwrap().num_samples(), 48000 - 4800);

        assert!(dispatch(&mut manager, CommandId::EditUndo).unwrap());
        assert_eq!(manager.current().unwrap().num_samples(), 48000);

        // UI-owned command: reported as unhandled.
        assert!(!dispatch(&mut manager, CommandId::FileOpen).unwrap());
    }
}
