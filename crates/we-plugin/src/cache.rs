//! Plug-in scan cache
//!
//! XML side-car keyed by path with mtime + size freshness. A fresh entry
//! lets the coordinator skip the worker round-trip entirely and mark the
//! plug-in `Cached`.

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::PluginDescriptor;

/// One cached scan.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PluginCacheEntry {
    pub path: PathBuf,
    /// File mtime, seconds since the epoch.
    pub last_modified: i64,
    pub file_size: u64,
    pub last_scanned: DateTime<Utc>,
    #[serde(default)]
    pub descriptors: Vec<PluginDescriptor>,
}

/// The whole cache file.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename = "PluginCache")]
pub struct PluginCache {
    #[serde(default)]
    entries: Vec<PluginCacheEntry>,
    #[serde(skip)]
    index: HashMap<PathBuf, usize>,
}

impl PluginCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Load from disk. Absence or a parse failure yields an empty cache;
    /// a stale cache only costs a rescan.
    pub fn load(path: &Path) -> Self {
        let Ok(content) = std::fs::read_to_string(path) else {
            return Self::new();
        };
        match quick_xml::de::from_str::<PluginCache>(&content) {
            Ok(mut cache) => {
                cache.rebuild_index();
                cache
            }
            Err(err) => {
                log::warn!("plugin cache unreadable, rescanning: {err}");
                Self::new()
            }
        }
    }

    /// Persist to disk.
    pub fn save(&self, path: &Path) -> std::io::Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let xml = quick_xml::se::to_string(self)
            .map_err(|e| std::io::Error::new(std::io::ErrorKind::InvalidData, e))?;
        std::fs::write(path, xml)
    }

    fn rebuild_index(&mut self) {
        self.index = self
            .entries
            .iter()
            .enumerate()
            .map(|(i, e)| (e.path.clone(), i))
            .collect();
    }

    /// Fresh descriptors for `path`, if mtime and size still match.
    pub fn lookup_fresh(&self, path: &Path, mtime: i64, size: u64) -> Option<&[PluginDescriptor]> {
        let entry = self.index.get(path).map(|&i| &self.entries[i])?;
        if entry.last_modified == mtime && entry.file_size == size {
            Some(&entry.descriptors)
        } else {
            None
        }
    }

    /// Insert or replace the entry for `path`.
    pub fn update(
        &mut self,
        path: &Path,
        mtime: i64,
        size: u64,
        descriptors: Vec<PluginDescriptor>,
    ) {
        let entry = PluginCacheEntry {
            path: path.to_path_buf(),
            last_modified: mtime,
            file_size: size,
            last_scanned: Utc::now(),
            descriptors,
        };
        if let Some(&i) = self.index.get(path) {
            self.entries[i] = entry;
        } else {
            self.index.insert(path.to_path_buf(), self.entries.len());
            self.entries.push(entry);
        }
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
    use crate::PluginFormatKind;

    fn descriptor(id: &str) -> PluginDescriptor {
        PluginDescriptor {
            identifier: id.to_string(),
            name: id.to_string(),
            vendor: String::new(),
            version: "1.0".to_string(),
            format: PluginFormatKind::Vst3,
            path: PathBuf::from("/p"),
            audio_inputs: 2,
            audio_outputs: 2,
            latency_samples: 0,
        }
    }

    #[test]
    fn test_freshness_check() {
        let mut cache = PluginCache::new();
        let path = Path::new("/plugins/Verb.vst3");
        cache.update(path, 1000, 4096, vec![descriptor("vst3.verb")]);

        assert!(cache.lookup_fresh(path, 1000, 4096).is_some());
        assert!(cache.lookup_fresh(path, 1001, 4096).is_none()); // touched
        assert!(cache.lookup_fresh(path, 1000, 4097).is_none()); // resized
        assert!(cache.lookup_fresh(Path::new("/other"), 1000, 4096).is_none());
    }

    #[test]
    fn test_update_replaces() {
        let mut cache = PluginCache::new();
        let path = Path::new("/plugins/Verb.vst3");
        cache.update(path, 1000, 10, vec![]);
        cache.update(path, 2000, 20, vec![descriptor("vst3.verb")]);
        assert_eq!(cache.len(), 1);
        assert_eq!(cache.lookup_fresh(path, 2000, 20).unwrap().len(), 1);
    }

    #[test]
    fn test_disk_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let file = dir.path().join("plugin-cache.xml");

        let mut cache = PluginCache::new();
        cache.update(
            Path::new("/plugins/Verb.vst3"),
            1234,
            999,
            vec![descriptor("vst3.verb")],
        );
        cache.save(&file).unwrap();

        let loaded = PluginCache::load(&file);
        assert_eq!(loaded.len(), 1);
        let fresh = loaded.lookup_fresh(Path::new("/plugins/Verb.vst3"), 1234, 999);
        assert_eq!(fresh.unwrap()[0].identifier, "vst3.verb");
    }

    #[test]
    fn test_malformed_file_yields_empty_cache() {
        let dir = tempfile::tempdir().unwrap();
        let file = dir.path().join("plugin-cache.xml");
        std::fs::write(&file, "<PluginCache><entries><broken").unwrap();
        assert!(PluginCache::load(&file).is_empty());
    }
}
