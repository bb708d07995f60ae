//! Document manager
//!
//! The set of open documents, the current-document pointer, and the
//! inter-document clipboard (one PCM buffer, resampled on paste when the
//! rates differ). UI layers subscribe through the listener contract.

use we_core::{PcmBuffer, WaveError, WaveResult};
use we_dsp::resample_linear;

use crate::document::Document;

/// Notifications for the UI shell.
pub trait DocumentManagerListener: Send {
    fn current_document_changed(&self, index: Option<usize>);
    fn document_added(&self, index: usize);
    fn document_removed(&self, index: usize);
}

/// Open documents plus the clipboard.
#[derive(Default)]
pub struct DocumentManager {
    documents: Vec<Document>,
    current: Option<usize>,
    clipboard: Option<PcmBuffer>,
    listeners: Vec<Box<dyn DocumentManagerListener>>,
}

impl DocumentManager {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_listener(&mut self, listener: Box<dyn DocumentManagerListener>) {
        self.listeners.push(listener);
    }

    fn notify_current(&self) {
        for listener in &self.listeners {
            listener.current_document_changed(self.current);
        }
    }

    pub fn len(&self) -> usize {
        self.documents.len()
    }

    pub fn is_empty(&self) -> bool {
        self.documents.is_empty()
    }

    /// Add a document and make it current. Returns its index.
    pub fn add_document(&mut self, document: Document) -> usize {
        self.documents.push(document);
        let index = self.documents.len() - 1;
        for listener in &self.listeners {
            listener.document_added(index);
        }
        self.current = Some(index);
        self.notify_current();
        index
    }

    /// Close and drop a document. The caller has already resolved any
    /// unsaved-changes prompt.
    pub fn remove_document(&mut self, index: usize) -> Option<Document> {
        if index >= self.documents.len() {
            return None;
        }
        let mut document = self.documents.remove(index);
        document.close();
        for listener in &self.listeners {
            listener.document_removed(index);
        }
        self.current = if self.documents.is_empty() {
            None
        } else {
            match self.current {
                Some(current) if current >= index => {
                    Some(current.saturating_sub(1).min(self.documents.len() - 1))
                }
                other => other,
            }
        };
        self.notify_current();
        Some(document)
    }

    pub fn current_index(&self) -> Option<usize> {
        self.current
    }

    pub fn current(&self) -> Option<&Document> {
        self.current.and_then(|i| self.documents.get(i))
    }

    pub fn current_mut(&mut self) -> Option<&mut Document> {
        let index = self.current?;
        self.documents.get_mut(index)
    }

    pub fn document(&self, index: usize) -> Option<&Document> {
        self.documents.get(index)
    }

    pub fn document_mut(&mut self, index: usize) -> Option<&mut Document> {
        self.documents.get_mut(index)
    }

    /// Switch the current document. Out-of-range indices are ignored.
    pub fn select(&mut self, index: usize) {
        if index < self.documents.len() && self.current != Some(index) {
            self.current = Some(index);
            self.notify_current();
        }
    }

    /// Next document, wrapping.
    pub fn next(&mut self) {
        if self.documents.is_empty() {
            return;
        }
        let next = match self.current {
            Some(current) => (current + 1) % self.documents.len(),
            None => 0,
        };
        self.select(next);
    }

    /// Previous document, wrapping.
    pub fn previous(&mut self) {
        if self.documents.is_empty() {
            return;
        }
        let previous = match self.current {
            Some(0) | None => self.documents.len() - 1,
            Some(current) => current - 1,
        };
        self.select(previous);
    }

    /// Keyboard access: documents 1..9.
    pub fn select_by_number(&mut self, number: usize) {
        if (1..=9).contains(&number) {
            self.select(number - 1);
        }
    }

    // ── clipboard ──────────────────────────────────────────────────────

    /// Store one buffer on the clipboard, replacing any previous content.
    pub fn copy_to_clipboard(&mut self, pcm: PcmBuffer) {
        self.clipboard = Some(pcm);
    }

    pub fn clipboard(&self) -> Option<&PcmBuffer> {
        self.clipboard.as_ref()
    }

    pub fn has_clipboard(&self) -> bool {
        self.clipboard.is_some()
    }

    /// Cut/copy from the current document onto the clipboard.
    pub fn copy_selection_to_clipboard(&mut self) -> WaveResult<()> {
        let document = self
            .current()
            .ok_or_else(|| WaveError::InvalidParam("no document open".to_string()))?;
        let clip = document.copy_selection()?;
        self.clipboard = Some(clip);
        Ok(())
    }

    pub fn cut_selection_to_clipboard(&mut self) -> WaveResult<()> {
        let document = self
            .current_mut()
            .ok_or_else(|| WaveError::InvalidParam("no document open".to_string()))?;
        let clip = document.cut_selection()?;
        self.clipboard = Some(clip);
        Ok(())
    }

    /// Paste the clipboard into a document at `position_sec`, resampling
    /// when the clipboard's rate differs from the target's.
    pub fn paste_from_clipboard(&mut self, target: usize, position_sec: f64) -> WaveResult<()> {
        let clip = self
            .clipboard
            .clone()
            .ok_or_else(|| WaveError::InvalidParam("clipboard is empty".to_string()))?;
        let document = self
            .documents
            .get_mut(target)
            .ok_or_else(|| WaveError::InvalidParam(format!("no document {target}")))?;

        let target_rate = document.sample_rate();
        let adapted = if clip.sample_rate() != target_rate {
            resample_linear(&clip, target_rate)
        } else {
            clip
        };
        let at = (position_sec.max(0.0) * target_rate).round() as u64;
        let at = at.min(document.num_samples());
        document.paste(at, &adapted)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    use we_core::{BitDepth, Selection};

    fn doc(sample_rate: f64, seconds: f64) -> Document {
        Document::new(sample_rate, 1, BitDepth::Bits24, seconds)
    }

    #[test]
    fn test_navigation_wraps() {
        let mut manager = DocumentManager::new();
        manager.add_document(doc(48000.0, 1.0));
        manager.add_document(doc(48000.0, 1.0));
        manager.add_document(doc(48000.0, 1.0));
        assert_eq!(manager.current_index(), Some(2));

        manager.next();
        assert_eq!(manager.current_index(), Some(0));
        manager.previous();
        assert_eq!(manager.current_index(), Some(2));
        manager.select_by_number(2);
        assert_eq!(manager.current_index(), Some(1));
        manager.select_by_number(9); // out of range, ignored
        assert_eq!(manager.current_index(), Some(1));
    }

    #[test]
    fn test_clipboard_same_rate_preserves_samples() {
        let mut manager = DocumentManager::new();
        let data: Vec<f32> = (0..1000).map(|i| (i as f32 / 1000.0) - 0.5).collect();
        let clip = PcmBuffer::from_channels(vec![data.clone()], 48000.0).unwrap();
        manager.copy_to_clipboard(clip);

        let target = manager.add_document(doc(48000.0, 0.1));
        manager.paste_from_clipboard(target, 0.0).unwrap();

        let document = manager.document(target).unwrap();
        let content = document.content().read();
        let pcm = content.pcm.read();
        assert_eq!(&pcm.channel(0).unwrap()[..1000], data.as_slice());
    }

    #[test]
    fn test_clipboard_resamples_on_rate_mismatch() {
        let mut manager = DocumentManager::new();
        let clip = PcmBuffer::from_channels(vec![vec![0.25f32; 44100]], 44100.0).unwrap();
        manager.copy_to_clipboard(clip);

        let target = manager.add_document(doc(48000.0, 0.0));
        manager.paste_from_clipboard(target, 0.0).unwrap();

        let document = manager.document(target).unwrap();
        // round(44100 * 48000 / 44100) = 48000
        assert_eq!(document.num_samples(), 48000);
    }

    #[test]
    fn test_paste_into_empty_clipboard_fails() {
        let mut manager = DocumentManager::new();
        let target = manager.add_document(doc(48000.0, 0.1));
        assert!(manager.paste_from_clipboard(target, 0.0).is_err());
    }

    #[test]
    fn test_cut_copy_through_manager() {
        let mut manager = DocumentManager::new();
        let index = manager.add_document(doc(48000.0, 0.5));
        manager
            .document_mut(index)
            .unwrap()
            .set_selection(Selection::new(0, 4800));

        manager.copy_selection_to_clipboard().unwrap();
        assert!(manager.has_clipboard());
        assert_eq!(manager.clipboard().unwrap().num_samples(), 4800);

        manager.cut_selection_to_clipboard().unwrap();
        assert_eq!(manager.current().unwrap().num_samples(), 24000 - 4800);
    }

    struct CountingListener {
        added: Arc<AtomicUsize>,
        removed: Arc<AtomicUsize>,
        changed: Arc<AtomicUsize>,
    }

    impl DocumentManagerListener for CountingListener {
        fn current_document_changed(&self, _index: Option<usize>) {
            self.changed.fetch_add(1, Ordering::Relaxed);
        }
        fn document_added(&self, _index: usize) {
            self.added.fetch_add(1, Ordering::Relaxed);
        }
        fn document_removed(&self, _index: usize) {
            self.removed.fetch_add(1, Ordering::Relaxed);
        }
    }

    #[test]
    fn test_listener_notifications() {
        let added = Arc::new(AtomicUsize::new(0));
        let removed = Arc::new(AtomicUsize::new(0));
        let changed = Arc::new(AtomicUsize::new(0));

        let mut manager = DocumentManager::new();
        manager.add_listener(Box::new(CountingListener {
            added: Arc::clone(&added),
            removed: Arc::clone(&removed),
            changed: Arc::clone(&changed),
        }));

        manager.add_document(doc(48000.0, 0.1));
        manager.add_document(doc(48000.0, 0.1));
        manager.remove_document(0);

        assert_eq!(added.load(Ordering::Relaxed), 2);
        assert_eq!(removed.load(Ordering::Relaxed), 1);
        assert!(changed.load(Ordering::Relaxed) >= 3);
    }
}
