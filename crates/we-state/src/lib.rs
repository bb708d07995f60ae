//! WaveEdit editing state
//!
//! Per-document state and everything that mutates it:
//! - `UndoManager` and the edit command set (command pattern, pre-image undo)
//! - `RegionModel` / `MarkerModel` with JSON side-car persistence
//! - `Document` (buffer + selection + undo + regions + metadata) and
//!   `DocumentManager` (open set, current pointer, inter-document clipboard)
//! - `Settings` (typed dotted-path key/value store) and the command-ID
//!   surface for keymaps

pub mod command_ids;
pub mod document;
pub mod edit_commands;
pub mod manager;
pub mod markers;
pub mod regions;
pub mod settings;
pub mod undo;

pub use command_ids::{CommandId, Keymap};
pub use document::{Document, DocumentContent, SharedContent, ViewState};
pub use edit_commands::{ChannelTarget, EditKind};
pub use manager::{DocumentManager, DocumentManagerListener};
pub use markers::{Marker, MarkerModel};
pub use regions::{BoundarySide, Region, RegionModel};
pub use settings::{SettingValue, Settings};
pub use undo::{Command, UndoManager, MAX_UNDO_DEPTH};
