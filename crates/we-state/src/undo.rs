//! Undo/Redo system using the command pattern
//!
//! One stack per document, capped at [`MAX_UNDO_DEPTH`] records with the
//! oldest evicted. Consecutive commands carrying the same coalesce key
//! within a short window merge into one record (arrow-key nudges, slider
//! drags); anything else terminates the in-flight group.

use std::collections::VecDeque;
use std::time::{Duration, Instant};

use we_core::WaveResult;

/// Maximum undo depth per document.
pub const MAX_UNDO_DEPTH: usize = 100;

/// Window inside which same-key commands coalesce.
const COALESCE_WINDOW: Duration = Duration::from_millis(250);

/// An undoable operation.
///
/// `execute` must be atomic: an implementation that faults after partially
/// mutating state rolls back before returning the error.
pub trait Command: Send {
    /// Apply the operation.
    fn execute(&mut self) -> WaveResult<()>;

    /// Revert to the exact pre-image.
    fn undo(&mut self) -> WaveResult<()>;

    /// Display name for menus ("Apply Gain +3 dB").
    fn name(&self) -> &str;

    /// Does this command change the buffer length? Length changes require
    /// the playback engine to be stopped around the mutation.
    fn alters_length(&self) -> bool {
        false
    }

    /// Same-key commands arriving back to back merge into one record.
    fn coalesce_key(&self) -> Option<String> {
        None
    }

    /// Absorb a follow-up command with the same key. `other` has already
    /// been executed; self keeps its own pre-image and adopts `other`'s
    /// post-state so redo replays the merged edit.
    fn merge(&mut self, other: Box<dyn Command>) {
        let _ = other;
    }

    /// Downcast support for `merge` implementations.
    fn as_any(&self) -> &dyn std::any::Any;
}

struct Entry {
    command: Box<dyn Command>,
    key: Option<String>,
    at: Instant,
}

/// Undo/Redo manager
pub struct UndoManager {
    undo_stack: VecDeque<Entry>,
    redo_stack: Vec<Entry>,
    max_history: usize,
}

impl Default for UndoManager {
    fn default() -> Self {
        Self::new(MAX_UNDO_DEPTH)
    }
}

impl UndoManager {
    pub fn new(max_history: usize) -> Self {
        Self {
            undo_stack: VecDeque::with_capacity(max_history),
            redo_stack: Vec::new(),
            max_history,
        }
    }

    /// Execute a command and push it onto the undo stack. Redo history is
    /// invalidated by any new edit.
    pub fn execute(&mut self, mut command: Box<dyn Command>) -> WaveResult<()> {
        command.execute()?;
        self.redo_stack.clear();

        let key = command.coalesce_key();
        if let Some(last) = self.undo_stack.back_mut() {
            let same_key = key.is_some() && last.key == key;
            if same_key && last.at.elapsed() <= COALESCE_WINDOW {
                last.command.merge(command);
                last.at = Instant::now();
                return Ok(());
            }
        }

        while self.undo_stack.len() >= self.max_history {
            self.undo_stack.pop_front();
        }
        self.undo_stack.push_back(Entry {
            command,
            key,
            at: Instant::now(),
        });
        Ok(())
    }

    /// Undo the most recent record. Returns false with an empty stack.
    pub fn undo(&mut self) -> WaveResult<bool> {
        let Some(mut entry) = self.undo_stack.pop_back() else {
            return Ok(false);
        };
        entry.command.undo()?;
        self.redo_stack.push(entry);
        Ok(true)
    }

    /// Re-apply the most recently undone record.
    pub fn redo(&mut self) -> WaveResult<bool> {
        let Some(mut entry) = self.redo_stack.pop() else {
            return Ok(false);
        };
        entry.command.execute()?;
        self.undo_stack.push_back(entry);
        Ok(true)
    }

    pub fn can_undo(&self) -> bool {
        !self.undo_stack.is_empty()
    }

    pub fn can_redo(&self) -> bool {
        !self.redo_stack.is_empty()
    }

    /// Name of the record `undo` would revert.
    pub fn undo_name(&self) -> Option<&str> {
        self.undo_stack.back().map(|e| e.command.name())
    }

    pub fn redo_name(&self) -> Option<&str> {
        self.redo_stack.last().map(|e| e.command.name())
    }

    /// Does the next undo record change the buffer length?
    pub fn next_undo_alters_length(&self) -> bool {
        self.undo_stack
            .back()
            .map(|e| e.command.alters_length())
            .unwrap_or(false)
    }

    pub fn next_redo_alters_length(&self) -> bool {
        self.redo_stack
            .last()
            .map(|e| e.command.alters_length())
            .unwrap_or(false)
    }

    pub fn clear(&mut self) {
        self.undo_stack.clear();
        self.redo_stack.clear();
    }

    pub fn undo_count(&self) -> usize {
        self.undo_stack.len()
    }

    pub fn redo_count(&self) -> usize {
        self.redo_stack.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::{Arc, Mutex};

    struct SetValueCommand {
        value: Arc<Mutex<i32>>,
        old_value: i32,
        new_value: i32,
        key: Option<String>,
    }

    impl SetValueCommand {
        fn new(value: Arc<Mutex<i32>>, new_value: i32) -> Box<Self> {
            Box::new(Self {
                value,
                old_value: 0,
                new_value,
                key: None,
            })
        }

        fn coalescing(value: Arc<Mutex<i32>>, new_value: i32) -> Box<Self> {
            let mut cmd = Self::new(value, new_value);
            cmd.key = Some("set-value".to_string());
            cmd
        }
    }

    impl Command for SetValueCommand {
        fn execute(&mut self) -> WaveResult<()> {
            let mut v = self.value.lock().unwrap();
            self.old_value = *v;
            *v = self.new_value;
            Ok(())
        }

        fn undo(&mut self) -> WaveResult<()> {
            *self.value.lock().unwrap() = self.old_value;
            Ok(())
        }

        fn name(&self) -> &str {
            "Set Value"
        }

        fn coalesce_key(&self) -> Option<String> {
            self.key.clone()
        }

        fn merge(&mut self, other: Box<dyn Command>) {
            // Keep our pre-image; adopt the latest target value so redo
            // replays the merged edit.
            if let Some(other) = other.as_any().downcast_ref::<SetValueCommand>() {
                self.new_value = other.new_value;
            }
        }

        fn as_any(&self) -> &dyn std::any::Any {
            self
        }
    }

    #[test]
    fn test_undo_redo() {
        let mut manager = UndoManager::new(100);
        let value = Arc::new(Mutex::new(0));

        manager
            .execute(SetValueCommand::new(Arc::clone(&value), 1))
            .unwrap();
        manager
            .execute(SetValueCommand::new(Arc::clone(&value), 2))
            .unwrap();
        assert_eq!(*value.lock().unwrap(), 2);

        assert!(manager.undo().unwrap());
        assert_eq!(*value.lock().unwrap(), 1);
        assert!(manager.redo().unwrap());
        assert_eq!(*value.lock().unwrap(), 2);
    }

    #[test]
    fn test_new_edit_clears_redo() {
        let mut manager = UndoManager::new(100);
        let value = Arc::new(Mutex::new(0));

        manager
            .execute(SetValueCommand::new(Arc::clone(&value), 1))
            .unwrap();
        manager.undo().unwrap();
        assert!(manager.can_redo());

        manager
            .execute(SetValueCommand::new(Arc::clone(&value), 5))
            .unwrap();
        assert!(!manager.can_redo());
    }

    #[test]
    fn test_depth_cap_evicts_oldest() {
        let mut manager = UndoManager::new(3);
        let value = Arc::new(Mutex::new(0));
        for i in 0..5 {
            manager
                .execute(SetValueCommand::new(Arc::clone(&value), i))
                .unwrap();
        }
        assert_eq!(manager.undo_count(), 3);
    }

    #[test]
    fn test_same_key_commands_coalesce() {
        let mut manager = UndoManager::new(100);
        let value = Arc::new(Mutex::new(0));

        manager
            .execute(SetValueCommand::coalescing(Arc::clone(&value), 1))
            .unwrap();
        manager
            .execute(SetValueCommand::coalescing(Arc::clone(&value), 2))
            .unwrap();
        assert_eq!(manager.undo_count(), 1);

        // A keyless command terminates the group.
        manager
            .execute(SetValueCommand::new(Arc::clone(&value), 3))
            .unwrap();
        assert_eq!(manager.undo_count(), 2);
    }

    #[test]
    fn test_undo_name() {
        let mut manager = UndoManager::new(100);
        assert!(manager.undo_name().is_none());
        let value = Arc::new(Mutex::new(0));
        manager
            .execute(SetValueCommand::new(value, 1))
            .unwrap();
        assert_eq!(manager.undo_name(), Some("Set Value"));
    }
}
