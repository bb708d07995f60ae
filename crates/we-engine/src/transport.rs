//! Transport state and position cursor
//!
//! All fields are atomics so the UI thread and the audio callback share the
//! transport without locks. The cursor is an f64 sample position for
//! sub-sample accuracy when resampling.

use std::sync::atomic::{AtomicBool, AtomicU64, AtomicU8, Ordering};

use portable_atomic::AtomicF64;

/// Playback state machine.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PlaybackState {
    Stopped,
    Playing,
    Paused,
}

impl PlaybackState {
    fn from_u8(value: u8) -> Self {
        match value {
            1 => PlaybackState::Playing,
            2 => PlaybackState::Paused,
            _ => PlaybackState::Stopped,
        }
    }

    fn as_u8(self) -> u8 {
        match self {
            PlaybackState::Stopped => 0,
            PlaybackState::Playing => 1,
            PlaybackState::Paused => 2,
        }
    }
}

/// Shared transport: state, cursor, loop points.
pub struct Transport {
    state: AtomicU8,
    /// Position in samples; f64 for sub-sample accuracy.
    position: AtomicF64,
    loop_enabled: AtomicBool,
    loop_start: AtomicU64,
    loop_end: AtomicU64,
    sample_rate_bits: AtomicU64,
}

impl Transport {
    pub fn new(sample_rate: f64) -> Self {
        Self {
            state: AtomicU8::new(PlaybackState::Stopped.as_u8()),
            position: AtomicF64::new(0.0),
            loop_enabled: AtomicBool::new(false),
            loop_start: AtomicU64::new(0),
            loop_end: AtomicU64::new(0),
            sample_rate_bits: AtomicU64::new(sample_rate.to_bits()),
        }
    }

    pub fn state(&self) -> PlaybackState {
        PlaybackState::from_u8(self.state.load(Ordering::Acquire))
    }

    pub fn set_state(&self, state: PlaybackState) {
        self.state.store(state.as_u8(), Ordering::Release);
    }

    pub fn is_playing(&self) -> bool {
        self.state() == PlaybackState::Playing
    }

    pub fn sample_rate(&self) -> f64 {
        f64::from_bits(self.sample_rate_bits.load(Ordering::Relaxed))
    }

    pub fn set_sample_rate(&self, sample_rate: f64) {
        self.sample_rate_bits
            .store(sample_rate.to_bits(), Ordering::Relaxed);
    }

    pub fn position_samples(&self) -> f64 {
        self.position.load(Ordering::Acquire)
    }

    pub fn position_seconds(&self) -> f64 {
        let sr = self.sample_rate();
        if sr > 0.0 {
            self.position_samples() / sr
        } else {
            0.0
        }
    }

    pub fn set_position_samples(&self, samples: f64) {
        self.position.store(samples.max(0.0), Ordering::Release);
    }

    pub fn set_position_seconds(&self, seconds: f64) {
        self.set_position_samples(seconds.max(0.0) * self.sample_rate());
    }

    /// Set loop points in seconds. Enabling happens separately so the UI can
    /// draw the range before arming it.
    pub fn set_loop_points(&self, start_sec: f64, end_sec: f64) {
        let sr = self.sample_rate();
        let start = (start_sec.max(0.0) * sr).round() as u64;
        let end = (end_sec.max(0.0) * sr).round() as u64;
        self.loop_start.store(start.min(end), Ordering::Release);
        self.loop_end.store(start.max(end), Ordering::Release);
    }

    pub fn set_loop_samples(&self, start: u64, end: u64) {
        self.loop_start.store(start.min(end), Ordering::Release);
        self.loop_end.store(start.max(end), Ordering::Release);
    }

    /// Disarm and forget the loop range. Must be called before switching
    /// between file-absolute and preview-local coordinates; stale absolute
    /// points inside a preview buffer would wrap at the wrong place.
    pub fn clear_loop_points(&self) {
        self.loop_enabled.store(false, Ordering::Release);
        self.loop_start.store(0, Ordering::Release);
        self.loop_end.store(0, Ordering::Release);
    }

    pub fn set_looping(&self, looping: bool) {
        self.loop_enabled.store(looping, Ordering::Release);
    }

    pub fn is_looping(&self) -> bool {
        self.loop_enabled.load(Ordering::Acquire)
    }

    /// Armed loop range, if any.
    pub fn loop_range(&self) -> Option<(u64, u64)> {
        if !self.is_looping() {
            return None;
        }
        let start = self.loop_start.load(Ordering::Acquire);
        let end = self.loop_end.load(Ordering::Acquire);
        if end > start {
            Some((start, end))
        } else {
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_state_round_trip() {
        let transport = Transport::new(48000.0);
        assert_eq!(transport.state(), PlaybackState::Stopped);
        transport.set_state(PlaybackState::Playing);
        assert!(transport.is_playing());
        transport.set_state(PlaybackState::Paused);
        assert_eq!(transport.state(), PlaybackState::Paused);
    }

    #[test]
    fn test_position_conversions() {
        let transport = Transport::new(48000.0);
        transport.set_position_seconds(1.5);
        assert_eq!(transport.position_samples(), 72000.0);
        assert!((transport.position_seconds() - 1.5).abs() < 1e-9);
    }

    #[test]
    fn test_loop_points() {
        let transport = Transport::new(48000.0);
        transport.set_loop_points(2.0, 1.0); // order normalised
        transport.set_looping(true);
        assert_eq!(transport.loop_range(), Some((48000, 96000)));

        transport.clear_loop_points();
        assert_eq!(transport.loop_range(), None);
        assert!(!transport.is_looping());
    }

    #[test]
    fn test_degenerate_loop_ignored() {
        let transport = Transport::new(48000.0);
        transport.set_loop_samples(1000, 1000);
        transport.set_looping(true);
        assert_eq!(transport.loop_range(), None);
    }
}
