//! Playback engine
//!
//! `PlaybackEngine` is the UI-thread control handle; `EngineRenderer` lives
//! inside the audio callback and is pulled by the host one block at a time.
//! The two share only atomics, try-locked slots and ring buffers.
//!
//! The document's buffer reaches the callback through a revocable handle:
//! the UI installs a [`SharedPcm`] into a slot and bumps a generation
//! counter; the renderer refreshes its cached handle at block boundaries
//! and pushes the retired one back through a ring so the callback never
//! frees memory. The callback try-reads the handle per block, so an edit
//! holding the write lock costs one silent block, never a stall; a revoked
//! handle renders silence.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;

use parking_lot::{Mutex, RwLock};
use rtrb::{Consumer, Producer, RingBuffer};

use we_core::PcmBuffer;
use we_dsp::{fade_gain, db_to_linear, EqController, ParametricEq};
use we_plugin::{NodeList, PluginChain};

use crate::preview::{DspPreviewKind, PreviewMode};
use crate::transport::{PlaybackState, Transport};

/// The document's buffer as shared with the callback. The lock serialises
/// the callback's reads against edits; writers take it only while the
/// engine is stopped (length edits) or between blocks (in-place edits).
pub type SharedPcm = Arc<RwLock<PcmBuffer>>;

/// Capacity of the retirement ring (UI drains it on a timer).
const TRASH_CAPACITY: usize = 64;

/// Handles retired by the callback, dropped on the UI thread.
enum Retired {
    Buffer(SharedPcm),
    Preview(Arc<PreviewMode>),
    Nodes(NodeList),
}

struct EngineShared {
    transport: Transport,
    buffer_slot: Mutex<Option<SharedPcm>>,
    buffer_generation: AtomicU64,
    preview_slot: Mutex<Arc<PreviewMode>>,
    preview_generation: AtomicU64,
    preview_bypassed: AtomicBool,
    last_error: Mutex<Option<String>>,
}

/// UI-thread control surface.
pub struct PlaybackEngine {
    shared: Arc<EngineShared>,
    eq_controller: EqController,
    trash_rx: Mutex<Consumer<Retired>>,
}

impl PlaybackEngine {
    /// Build the engine pair: the control handle and the renderer the host's
    /// audio callback takes ownership of.
    pub fn new(sample_rate: f64) -> (PlaybackEngine, EngineRenderer) {
        let shared = Arc::new(EngineShared {
            transport: Transport::new(sample_rate),
            buffer_slot: Mutex::new(None),
            buffer_generation: AtomicU64::new(0),
            preview_slot: Mutex::new(Arc::new(PreviewMode::Disabled)),
            preview_generation: AtomicU64::new(0),
            preview_bypassed: AtomicBool::new(false),
            last_error: Mutex::new(None),
        });
        let (trash_tx, trash_rx) = RingBuffer::new(TRASH_CAPACITY);
        let eq = ParametricEq::new();
        let engine = PlaybackEngine {
            shared: Arc::clone(&shared),
            eq_controller: eq.controller(),
            trash_rx: Mutex::new(trash_rx),
        };
        let renderer = EngineRenderer {
            shared,
            eq,
            active_buffer: None,
            active_buffer_generation: 0,
            active_preview: Arc::new(PreviewMode::Disabled),
            active_preview_generation: 0,
            chain_nodes: None,
            positions: Vec::new(),
            trash_tx,
        };
        (engine, renderer)
    }

    pub fn transport(&self) -> &Transport {
        &self.shared.transport
    }

    pub fn play(&self) {
        self.shared.transport.set_state(PlaybackState::Playing);
    }

    pub fn pause(&self) {
        self.shared.transport.set_state(PlaybackState::Paused);
    }

    pub fn stop(&self) {
        self.shared.transport.set_state(PlaybackState::Stopped);
    }

    pub fn is_playing(&self) -> bool {
        self.shared.transport.is_playing()
    }

    /// Hand the callback a (new) buffer handle. Callers stop the engine
    /// first when the length changed; the swap itself is glitch-free.
    pub fn install_buffer(&self, pcm: SharedPcm) {
        let (total, sample_rate) = {
            let guard = pcm.read();
            (guard.num_samples() as f64, guard.sample_rate())
        };
        self.shared.transport.set_sample_rate(sample_rate);
        *self.shared.buffer_slot.lock() = Some(pcm);
        self.shared.buffer_generation.fetch_add(1, Ordering::Release);
        // Position invariant: always within [0, N].
        let pos = self.shared.transport.position_samples();
        if pos > total {
            self.shared.transport.set_position_samples(total);
        }
    }

    /// Take the buffer away from the callback (document close / file swap).
    pub fn revoke_buffer(&self) {
        *self.shared.buffer_slot.lock() = None;
        self.shared.buffer_generation.fetch_add(1, Ordering::Release);
    }

    /// Select the audition path. Effective at the next block boundary.
    pub fn set_preview_mode(&self, mode: PreviewMode) {
        *self.shared.preview_slot.lock() = Arc::new(mode);
        self.shared.preview_generation.fetch_add(1, Ordering::Release);
    }

    /// Bypass the preview stage without tearing it down.
    pub fn set_preview_bypassed(&self, bypassed: bool) {
        self.shared
            .preview_bypassed
            .store(bypassed, Ordering::Release);
    }

    pub fn is_preview_bypassed(&self) -> bool {
        self.shared.preview_bypassed.load(Ordering::Acquire)
    }

    /// Parameter handle for the EQ preview.
    pub fn eq_controller(&self) -> EqController {
        self.eq_controller.clone()
    }

    /// Drop handles the callback retired. Call from a UI timer.
    pub fn collect_garbage(&self) {
        let mut rx = self.trash_rx.lock();
        while rx.pop().is_ok() {}
    }

    /// Host-reported device fault: the engine transitions to `Stopped` and
    /// the message is surfaced at the next UI poll.
    pub fn report_device_error(&self, message: &str) {
        self.shared.transport.set_state(PlaybackState::Stopped);
        *self.shared.last_error.lock() = Some(message.to_string());
        log::error!("audio device error: {message}");
    }

    pub fn take_last_error(&self) -> Option<String> {
        self.shared.last_error.lock().take()
    }
}

/// Audio-callback side. The host calls `render_block` once per device
/// block; everything in here is allocation-free after `prepare`.
pub struct EngineRenderer {
    shared: Arc<EngineShared>,
    eq: ParametricEq,
    active_buffer: Option<SharedPcm>,
    active_buffer_generation: u64,
    active_preview: Arc<PreviewMode>,
    active_preview_generation: u64,
    chain_nodes: Option<NodeList>,
    /// Absolute source position per output frame, for position-dependent
    /// preview primitives.
    positions: Vec<u64>,
    trash_tx: Producer<Retired>,
}

impl EngineRenderer {
    /// Allocate scratch state for the device layout.
    pub fn prepare(&mut self, sample_rate: f64, max_block_size: usize, channels: usize) {
        self.eq.prepare(sample_rate, max_block_size, channels);
        self.positions = vec![0; max_block_size];
    }

    fn retire(&mut self, item: Retired) {
        // Ring full means the UI stopped draining; dropping inline is the
        // only remaining option.
        let _ = self.trash_tx.push(item);
    }

    fn refresh_buffer(&mut self) {
        let generation = self.shared.buffer_generation.load(Ordering::Acquire);
        if generation == self.active_buffer_generation {
            return;
        }
        let Some(slot) = self.shared.buffer_slot.try_lock() else {
            return; // contended; retry next block
        };
        let fresh = slot.clone();
        drop(slot);
        if let Some(old) = self.active_buffer.take() {
            self.retire(Retired::Buffer(old));
        }
        self.active_buffer = fresh;
        self.active_buffer_generation = generation;
    }

    fn refresh_preview(&mut self) {
        let generation = self.shared.preview_generation.load(Ordering::Acquire);
        if generation == self.active_preview_generation {
            return;
        }
        let Some(slot) = self.shared.preview_slot.try_lock() else {
            return;
        };
        let fresh = Arc::clone(&slot);
        drop(slot);
        let old = std::mem::replace(&mut self.active_preview, fresh);
        self.retire(Retired::Preview(old));
        if let Some(nodes) = self.chain_nodes.take() {
            self.retire(Retired::Nodes(nodes));
        }
        self.active_preview_generation = generation;
    }

    /// Render one block of planar output. Total: faults degrade to silence,
    /// never propagate.
    pub fn render_block(&mut self, out: &mut PcmBuffer) {
        self.refresh_buffer();
        self.refresh_preview();

        out.clear();
        let n_frames = out.num_samples();
        if n_frames == 0 {
            return;
        }
        if self.positions.len() < n_frames {
            // Host exceeded the prepared block size; tolerated, logged once
            // per resize.
            log::warn!("render block larger than prepared size ({n_frames})");
            self.positions.resize(n_frames, 0);
        }
        if self.shared.transport.state() != PlaybackState::Playing {
            return;
        }
        let Some(handle) = self.active_buffer.clone() else {
            return; // handle revoked: silence
        };
        let Some(pcm) = handle.try_read() else {
            return; // an edit holds the buffer; silence for one block
        };
        let pcm: &PcmBuffer = &pcm;
        let total = pcm.num_samples() as u64;
        let bypassed = self.shared.preview_bypassed.load(Ordering::Acquire);
        let preview = Arc::clone(&self.active_preview);

        let offline = match (bypassed, preview.as_ref()) {
            (false, PreviewMode::OfflineBuffer { pcm, range_start }) => {
                Some((Arc::clone(pcm), *range_start))
            }
            _ => None,
        };

        let mut pos = (self.shared.transport.position_samples().max(0.0)) as u64;
        pos = pos.min(total);
        let loop_range = self.shared.transport.loop_range();

        let mut frame = 0usize;
        while frame < n_frames {
            // Loop points beyond the buffer are stale; fall back to linear.
            let active_loop = loop_range.and_then(|(start, end)| {
                let end = end.min(total);
                (start < end).then_some((start, end))
            });
            if let Some((start, end)) = active_loop {
                if pos >= end {
                    pos = start; // sample-accurate seam
                }
            }
            let end = active_loop.map(|(_, end)| end).unwrap_or(total);
            if pos >= end {
                self.shared.transport.set_state(PlaybackState::Stopped);
                break;
            }
            let chunk = ((end - pos) as usize).min(n_frames - frame);

            for i in 0..chunk {
                self.positions[frame + i] = pos + i as u64;
            }
            self.copy_source(pcm, offline.as_ref(), out, frame, chunk, pos);

            pos += chunk as u64;
            frame += chunk;
            if active_loop.is_none() && pos >= total {
                self.shared.transport.set_state(PlaybackState::Stopped);
                break;
            }
        }

        let frames_filled = frame;
        if frames_filled > 0 && !bypassed {
            self.apply_preview_stage(&preview, out, frames_filled);
        }
        self.shared.transport.set_position_samples(pos.min(total) as f64);
    }

    /// Copy `chunk` source frames starting at absolute `pos` into the output
    /// at `frame`, substituting the offline preview over its range. Mono
    /// sources are duplicated to every output channel; extra output
    /// channels beyond the source stay silent.
    fn copy_source(
        &self,
        pcm: &PcmBuffer,
        offline: Option<&(Arc<PcmBuffer>, u64)>,
        out: &mut PcmBuffer,
        frame: usize,
        chunk: usize,
        pos: u64,
    ) {
        let src_channels = pcm.channels();
        for out_ch in 0..out.channels() {
            let src_ch = if src_channels == 1 {
                0
            } else if out_ch < src_channels {
                out_ch
            } else {
                continue;
            };
            let Some(src) = pcm.channel(src_ch) else { continue };
            let Some(dst) = out.channel_mut(out_ch) else { continue };
            for i in 0..chunk {
                let p = pos + i as u64;
                let mut sample = src[p as usize];
                if let Some((prev, range_start)) = offline {
                    let prev_len = prev.num_samples() as u64;
                    if p >= *range_start && p < range_start + prev_len {
                        let prev_ch = src_ch.min(prev.channels() - 1);
                        if let Some(channel) = prev.channel(prev_ch) {
                            sample = channel[(p - range_start) as usize];
                        }
                    }
                }
                dst[frame + i] = sample;
            }
        }
    }

    fn apply_preview_stage(&mut self, preview: &Arc<PreviewMode>, out: &mut PcmBuffer, frames: usize) {
        match preview.as_ref() {
            PreviewMode::Disabled | PreviewMode::OfflineBuffer { .. } => {}
            PreviewMode::RealtimeDsp(kind) => self.apply_dsp_preview(kind, out, frames),
            PreviewMode::PluginChainInsert { chain } => {
                self.refresh_chain_nodes(chain);
                if let Some(nodes) = &self.chain_nodes {
                    PluginChain::process_nodes(nodes, out);
                }
            }
        }
    }

    fn refresh_chain_nodes(&mut self, chain: &Arc<PluginChain>) {
        if let Some(fresh) = chain.try_snapshot_nodes() {
            let stale = match &self.chain_nodes {
                Some(current) => !Arc::ptr_eq(current, &fresh),
                None => true,
            };
            if stale {
                if let Some(old) = self.chain_nodes.take() {
                    self.retire(Retired::Nodes(old));
                }
                self.chain_nodes = Some(fresh);
            }
        }
        // Contended: keep processing the cached list.
    }

    fn apply_dsp_preview(&mut self, kind: &DspPreviewKind, out: &mut PcmBuffer, frames: usize) {
        match kind {
            DspPreviewKind::Gain { gain_db } | DspPreviewKind::NormalizeDelta { delta_db: gain_db } => {
                let factor = db_to_linear(*gain_db) as f32;
                for ch in out.channels_iter_mut() {
                    for s in &mut ch[..frames] {
                        *s *= factor;
                    }
                }
            }
            DspPreviewKind::DcRemove { channel_means } => {
                for (ch_idx, ch) in out.channels_iter_mut().enumerate() {
                    let mean = channel_means.get(ch_idx).copied().unwrap_or(0.0);
                    for s in &mut ch[..frames] {
                        *s -= mean;
                    }
                }
            }
            DspPreviewKind::Fade {
                direction,
                curve,
                range_start,
                range_len,
            } => {
                if *range_len == 0 {
                    return;
                }
                let denom = (range_len - 1).max(1) as f64;
                for i in 0..frames {
                    let p = self.positions[i];
                    if p < *range_start || p >= range_start + range_len {
                        continue;
                    }
                    let x = if *range_len == 1 {
                        1.0
                    } else {
                        (p - range_start) as f64 / denom
                    };
                    let g = fade_gain(*direction, *curve, x) as f32;
                    for ch in out.channels_iter_mut() {
                        ch[i] *= g;
                    }
                }
            }
            DspPreviewKind::Eq => {
                self.eq.process(out);
            }
        }
    }
}
