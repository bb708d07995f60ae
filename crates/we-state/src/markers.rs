//! Marker model
//!
//! Named point positions kept sorted ascending, persisted in a JSON
//! side-car beside the audio file.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

/// Default colour for new markers (ARGB).
pub const DEFAULT_MARKER_COLOR: u32 = 0xFFFF9040;

/// A named point on the timeline.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Marker {
    pub name: String,
    pub position: u64,
    /// ARGB colour.
    pub color: u32,
}

impl Marker {
    pub fn new(name: &str, position: u64) -> Self {
        Self {
            name: name.to_string(),
            position,
            color: DEFAULT_MARKER_COLOR,
        }
    }
}

/// Sorted marker collection.
#[derive(Debug, Default, Clone)]
pub struct MarkerModel {
    markers: Vec<Marker>,
}

impl MarkerModel {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.markers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.markers.is_empty()
    }

    pub fn get(&self, index: usize) -> Option<&Marker> {
        self.markers.get(index)
    }

    pub fn iter(&self) -> impl Iterator<Item = &Marker> {
        self.markers.iter()
    }

    pub fn markers(&self) -> &[Marker] {
        &self.markers
    }

    /// Wholesale restore from an undo snapshot.
    pub fn restore(&mut self, markers: Vec<Marker>) {
        self.markers = markers;
        let sorted = self.markers.windows(2).all(|w| w[0].position <= w[1].position);
        if !sorted {
            debug_assert!(false, "marker collection lost sort order");
            log::error!("marker collection unsorted; repairing");
            self.markers.sort_by_key(|m| m.position);
        }
    }

    /// Insert keeping sort order. Returns the insertion index.
    pub fn add(&mut self, marker: Marker) -> usize {
        let index = self
            .markers
            .partition_point(|m| m.position <= marker.position);
        self.markers.insert(index, marker);
        index
    }

    pub fn remove(&mut self, index: usize) -> Option<Marker> {
        if index < self.markers.len() {
            Some(self.markers.remove(index))
        } else {
            None
        }
    }

    pub fn clear(&mut self) {
        self.markers.clear();
    }

    /// Next marker strictly after `position`.
    pub fn next_after(&self, position: u64) -> Option<&Marker> {
        self.markers.iter().find(|m| m.position > position)
    }

    /// Previous marker strictly before `position`.
    pub fn prev_before(&self, position: u64) -> Option<&Marker> {
        self.markers.iter().rev().find(|m| m.position < position)
    }

    /// Shift for a deletion of `[start, start+len)`. Markers strictly
    /// inside are removed and returned.
    pub fn apply_deletion(&mut self, start: u64, len: u64) -> Vec<Marker> {
        let mut removed = Vec::new();
        let mut kept = Vec::with_capacity(self.markers.len());
        for mut marker in self.markers.drain(..) {
            if marker.position < start {
                kept.push(marker);
            } else if marker.position < start + len {
                removed.push(marker);
            } else {
                marker.position -= len;
                kept.push(marker);
            }
        }
        self.markers = kept;
        removed
    }

    /// Shift for an insertion of `len` samples at `at`.
    pub fn apply_insertion(&mut self, at: u64, len: u64) {
        for marker in &mut self.markers {
            if marker.position >= at {
                marker.position += len;
            }
        }
    }

    /// Clamp positions into `[0, total]` after a length change.
    pub fn clamp_to_length(&mut self, total: u64) {
        for marker in &mut self.markers {
            marker.position = marker.position.min(total);
        }
    }

    // ── side-car persistence ───────────────────────────────────────────

    /// `<audiofile>.markers.json`
    pub fn sidecar_path(audio_path: &Path) -> PathBuf {
        PathBuf::from(format!("{}.markers.json", audio_path.display()))
    }

    pub fn save_sidecar(&self, audio_path: &Path) -> std::io::Result<()> {
        let sidecar = MarkerSidecar {
            version: "1.0".to_string(),
            audio_file: audio_path
                .file_name()
                .map(|n| n.to_string_lossy().into_owned())
                .unwrap_or_default(),
            markers: self
                .markers
                .iter()
                .map(|m| MarkerSidecarEntry {
                    name: m.name.clone(),
                    position: m.position,
                    color: format!("{:08X}", m.color),
                })
                .collect(),
        };
        let json = serde_json::to_string_pretty(&sidecar)
            .map_err(|e| std::io::Error::new(std::io::ErrorKind::InvalidData, e))?;
        std::fs::write(Self::sidecar_path(audio_path), json)
    }

    /// Load the side-car if present and well formed. A parse failure leaves
    /// the model untouched.
    pub fn load_sidecar(&mut self, audio_path: &Path) -> bool {
        let path = Self::sidecar_path(audio_path);
        let Ok(content) = std::fs::read_to_string(&path) else {
            return false;
        };
        let sidecar: MarkerSidecar = match serde_json::from_str(&content) {
            Ok(sidecar) => sidecar,
            Err(err) => {
                log::warn!("marker side-car {} unreadable: {err}", path.display());
                return false;
            }
        };
        let mut markers: Vec<Marker> = sidecar
            .markers
            .into_iter()
            .map(|e| Marker {
                name: e.name,
                position: e.position,
                color: u32::from_str_radix(&e.color, 16).unwrap_or(DEFAULT_MARKER_COLOR),
            })
            .collect();
        markers.sort_by_key(|m| m.position);
        self.markers = markers;
        true
    }
}

#[derive(Serialize, Deserialize)]
struct MarkerSidecar {
    version: String,
    #[serde(rename = "audioFile")]
    audio_file: String,
    markers: Vec<MarkerSidecarEntry>,
}

#[derive(Serialize, Deserialize)]
struct MarkerSidecarEntry {
    name: String,
    position: u64,
    color: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_add_keeps_sorted() {
        let mut model = MarkerModel::new();
        model.add(Marker::new("c", 300));
        model.add(Marker::new("a", 100));
        model.add(Marker::new("b", 200));
        let positions: Vec<u64> = model.iter().map(|m| m.position).collect();
        assert_eq!(positions, vec![100, 200, 300]);
    }

    #[test]
    fn test_navigation() {
        let mut model = MarkerModel::new();
        model.add(Marker::new("a", 100));
        model.add(Marker::new("b", 200));
        assert_eq!(model.next_after(100).unwrap().name, "b");
        assert_eq!(model.prev_before(200).unwrap().name, "a");
        assert!(model.next_after(200).is_none());
    }

    #[test]
    fn test_deletion_removes_interior_markers() {
        let mut model = MarkerModel::new();
        model.add(Marker::new("before", 50));
        model.add(Marker::new("inside", 150));
        model.add(Marker::new("after", 300));

        let removed = model.apply_deletion(100, 100);
        assert_eq!(removed.len(), 1);
        assert_eq!(removed[0].name, "inside");
        assert_eq!(model.get(0).unwrap().position, 50);
        assert_eq!(model.get(1).unwrap().position, 200);
    }

    #[test]
    fn test_insertion_shifts() {
        let mut model = MarkerModel::new();
        model.add(Marker::new("a", 100));
        model.add(Marker::new("b", 200));
        model.apply_insertion(150, 1000);
        assert_eq!(model.get(0).unwrap().position, 100);
        assert_eq!(model.get(1).unwrap().position, 1200);
    }

    #[test]
    fn test_sidecar_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let audio = dir.path().join("take.wav");

        let mut model = MarkerModel::new();
        model.add(Marker::new("hit", 4410));
        model.add(Marker::new("tail", 88200));
        model.save_sidecar(&audio).unwrap();

        let mut loaded = MarkerModel::new();
        assert!(loaded.load_sidecar(&audio));
        assert_eq!(loaded.markers(), model.markers());

        // The side-car records the audio file's basename.
        let raw = std::fs::read_to_string(MarkerModel::sidecar_path(&audio)).unwrap();
        assert!(raw.contains("\"audioFile\": \"take.wav\""));
    }

    #[test]
    fn test_malformed_sidecar_ignored() {
        let dir = tempfile::tempdir().unwrap();
        let audio = dir.path().join("take.wav");
        std::fs::write(MarkerModel::sidecar_path(&audio), "[1,2,3").unwrap();

        let mut model = MarkerModel::new();
        model.add(Marker::new("keep", 1));
        assert!(!model.load_sidecar(&audio));
        assert_eq!(model.len(), 1);
    }
}
