//! Plug-in blacklist
//!
//! Persistent set of plug-in paths excluded from scanning, plus a separate
//! list of entries added this session so the UI can notify the user at the
//! next startup.

use std::collections::BTreeSet;
use std::path::Path;

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
struct BlacklistFile {
    entries: BTreeSet<String>,
}

/// Blacklisted plug-in paths.
#[derive(Debug, Default)]
pub struct Blacklist {
    entries: BTreeSet<String>,
    session_added: Vec<String>,
}

impl Blacklist {
    pub fn new() -> Self {
        Self::default()
    }

    /// Load from disk; absence is an empty blacklist.
    pub fn load(path: &Path) -> Self {
        let entries = std::fs::read_to_string(path)
            .ok()
            .and_then(|content| serde_json::from_str::<BlacklistFile>(&content).ok())
            .map(|file| file.entries)
            .unwrap_or_default();
        Self {
            entries,
            session_added: Vec::new(),
        }
    }

    pub fn save(&self, path: &Path) -> std::io::Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let file = BlacklistFile {
            entries: self.entries.clone(),
        };
        let json = serde_json::to_string_pretty(&file)
            .map_err(|e| std::io::Error::new(std::io::ErrorKind::InvalidData, e))?;
        std::fs::write(path, json)
    }

    pub fn contains(&self, plugin_path: &str) -> bool {
        self.entries.contains(plugin_path)
    }

    /// Add an entry; tracked in the session list when new.
    pub fn add(&mut self, plugin_path: &str) {
        if self.entries.insert(plugin_path.to_string()) {
            self.session_added.push(plugin_path.to_string());
        }
    }

    pub fn remove(&mut self, plugin_path: &str) -> bool {
        self.entries.remove(plugin_path)
    }

    pub fn entries(&self) -> impl Iterator<Item = &str> {
        self.entries.iter().map(|s| s.as_str())
    }

    /// Entries blacklisted this session, for the next-startup notification.
    pub fn newly_blacklisted(&self) -> &[String] {
        &self.session_added
    }

    pub fn clear_session_list(&mut self) {
        self.session_added.clear();
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_add_and_session_tracking() {
        let mut blacklist = Blacklist::new();
        blacklist.add("/plugins/Crashy.vst3");
        blacklist.add("/plugins/Crashy.vst3"); // idempotent

        assert!(blacklist.contains("/plugins/Crashy.vst3"));
        assert_eq!(blacklist.newly_blacklisted().len(), 1);

        blacklist.clear_session_list();
        assert!(blacklist.newly_blacklisted().is_empty());
        assert_eq!(blacklist.len(), 1);
    }

    #[test]
    fn test_persistence_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let file = dir.path().join("blacklist.json");

        let mut blacklist = Blacklist::new();
        blacklist.add("/plugins/A.vst3");
        blacklist.add("/plugins/B.clap");
        blacklist.save(&file).unwrap();

        let loaded = Blacklist::load(&file);
        assert_eq!(loaded.len(), 2);
        assert!(loaded.contains("/plugins/A.vst3"));
        // The session list does not persist.
        assert!(loaded.newly_blacklisted().is_empty());
    }

    #[test]
    fn test_missing_file_is_empty() {
        let loaded = Blacklist::load(Path::new("/nonexistent/blacklist.json"));
        assert!(loaded.is_empty());
    }
}
