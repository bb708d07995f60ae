//! Application settings
//!
//! Typed key/value store over dotted paths ("playback.loop", "snap.mode"),
//! persisted as JSON in the platform's configuration directory.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

/// A stored value. Colors are ARGB, serialised as "AARRGGBB" text.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum SettingValue {
    Flag(bool),
    Number(f64),
    Text(String),
}

/// Settings store. Construct once at startup and inject where needed.
#[derive(Debug, Default)]
pub struct Settings {
    values: BTreeMap<String, SettingValue>,
}

impl Settings {
    pub fn new() -> Self {
        Self::default()
    }

    /// Platform settings file:
    /// - macOS: `~/Library/Application Support/WaveEdit/settings.json`
    /// - Linux: `~/.config/waveedit/settings.json`
    /// - Windows: `%APPDATA%/WaveEdit/settings.json`
    pub fn default_path() -> PathBuf {
        let base = if cfg!(target_os = "macos") {
            dirs::home_dir()
                .map(|h| h.join("Library/Application Support/WaveEdit"))
                .unwrap_or_else(|| PathBuf::from("."))
        } else if cfg!(target_os = "windows") {
            dirs::data_dir()
                .map(|d| d.join("WaveEdit"))
                .unwrap_or_else(|| PathBuf::from("."))
        } else {
            dirs::config_dir()
                .map(|d| d.join("waveedit"))
                .unwrap_or_else(|| PathBuf::from("."))
        };
        base.join("settings.json")
    }

    /// Load from `path`; absence or damage yields defaults.
    pub fn load_from(path: &Path) -> Self {
        let values = std::fs::read_to_string(path)
            .ok()
            .and_then(|content| serde_json::from_str(&content).ok())
            .unwrap_or_default();
        Self { values }
    }

    pub fn save_to(&self, path: &Path) -> std::io::Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let json = serde_json::to_string_pretty(&self.values)
            .map_err(|e| std::io::Error::new(std::io::ErrorKind::InvalidData, e))?;
        std::fs::write(path, json)
    }

    // ── typed accessors ────────────────────────────────────────────────

    pub fn set_bool(&mut self, key: &str, value: bool) {
        self.values.insert(key.to_string(), SettingValue::Flag(value));
    }

    pub fn get_bool(&self, key: &str, default: bool) -> bool {
        match self.values.get(key) {
            Some(SettingValue::Flag(value)) => *value,
            _ => default,
        }
    }

    pub fn set_f64(&mut self, key: &str, value: f64) {
        self.values
            .insert(key.to_string(), SettingValue::Number(value));
    }

    pub fn get_f64(&self, key: &str, default: f64) -> f64 {
        match self.values.get(key) {
            Some(SettingValue::Number(value)) => *value,
            _ => default,
        }
    }

    pub fn set_i64(&mut self, key: &str, value: i64) {
        self.set_f64(key, value as f64);
    }

    pub fn get_i64(&self, key: &str, default: i64) -> i64 {
        match self.values.get(key) {
            Some(SettingValue::Number(value)) => *value as i64,
            _ => default,
        }
    }

    pub fn set_str(&mut self, key: &str, value: &str) {
        self.values
            .insert(key.to_string(), SettingValue::Text(value.to_string()));
    }

    pub fn get_str(&self, key: &str, default: &str) -> String {
        match self.values.get(key) {
            Some(SettingValue::Text(value)) => value.clone(),
            _ => default.to_string(),
        }
    }

    pub fn set_color(&mut self, key: &str, argb: u32) {
        self.set_str(key, &format!("{argb:08X}"));
    }

    pub fn get_color(&self, key: &str, default: u32) -> u32 {
        match self.values.get(key) {
            Some(SettingValue::Text(value)) => {
                u32::from_str_radix(value, 16).unwrap_or(default)
            }
            _ => default,
        }
    }

    pub fn contains(&self, key: &str) -> bool {
        self.values.contains_key(key)
    }

    pub fn remove(&mut self, key: &str) -> bool {
        self.values.remove(key).is_some()
    }

    /// Keys under a dotted prefix ("playback." lists playback.*).
    pub fn keys_with_prefix(&self, prefix: &str) -> Vec<&str> {
        self.values
            .keys()
            .filter(|k| k.starts_with(prefix))
            .map(|k| k.as_str())
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_typed_round_trip() {
        let mut settings = Settings::new();
        settings.set_bool("snap.enabled", true);
        settings.set_f64("playback.loop_start", 1.25);
        settings.set_i64("undo.depth", 100);
        settings.set_str("export.format", "flac");
        settings.set_color("region.color", 0xFF4A9EFF);

        assert!(settings.get_bool("snap.enabled", false));
        assert_eq!(settings.get_f64("playback.loop_start", 0.0), 1.25);
        assert_eq!(settings.get_i64("undo.depth", 0), 100);
        assert_eq!(settings.get_str("export.format", "wav"), "flac");
        assert_eq!(settings.get_color("region.color", 0), 0xFF4A9EFF);
    }

    #[test]
    fn test_wrong_type_falls_back_to_default() {
        let mut settings = Settings::new();
        settings.set_str("snap.enabled", "yes");
        assert!(!settings.get_bool("snap.enabled", false));
    }

    #[test]
    fn test_persistence() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("settings.json");

        let mut settings = Settings::new();
        settings.set_bool("view.meters", true);
        settings.set_f64("view.zoom", 150.0);
        settings.save_to(&path).unwrap();

        let loaded = Settings::load_from(&path);
        assert!(loaded.get_bool("view.meters", false));
        assert_eq!(loaded.get_f64("view.zoom", 0.0), 150.0);
    }

    #[test]
    fn test_damaged_file_yields_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("settings.json");
        std::fs::write(&path, "{oops").unwrap();
        let loaded = Settings::load_from(&path);
        assert!(!loaded.contains("anything"));
    }

    #[test]
    fn test_prefix_listing() {
        let mut settings = Settings::new();
        settings.set_bool("snap.enabled", true);
        settings.set_str("snap.mode", "zero-crossing");
        settings.set_f64("view.zoom", 1.0);
        assert_eq!(settings.keys_with_prefix("snap.").len(), 2);
    }
}
