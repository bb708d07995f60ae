//! Selection renderer
//!
//! Latency compensation: with total chain latency `L`, `L` samples of
//! silence are prepended to the input, the whole thing is processed, and
//! the first `L` output samples are discarded, so the result lines up with
//! the source. An optional tail extends processing past the selection to
//! capture reverb/delay decay.

use we_core::{PcmBuffer, WaveError, WaveResult};
use we_plugin::{ChainNodeSnapshot, PluginInstance, PluginManager};

/// Default processing block, in frames.
pub const DEFAULT_BLOCK_SIZE: usize = 8192;

/// Smallest accepted block.
pub const MIN_BLOCK_SIZE: usize = 64;

/// Renderer tuning.
#[derive(Debug, Clone)]
pub struct RenderConfig {
    /// Frames per processing block; clamped to at least [`MIN_BLOCK_SIZE`].
    pub block_size: usize,
    /// Convert the result to this channel count (`None` keeps the source
    /// layout).
    pub output_channels: Option<usize>,
    /// Extra silence processed after the selection, kept in the output.
    pub tail_samples: u64,
}

impl Default for RenderConfig {
    fn default() -> Self {
        Self {
            block_size: DEFAULT_BLOCK_SIZE,
            output_channels: None,
            tail_samples: 0,
        }
    }
}

/// A finished render.
#[derive(Debug)]
pub struct RenderOutcome {
    /// `num_samples + tail_samples` frames, latency-aligned to the source.
    pub pcm: PcmBuffer,
    /// Total chain latency that was compensated.
    pub latency_samples: u32,
}

/// Build fresh instances from a chain snapshot. Bypassed nodes are not
/// instantiated at all.
fn instantiate_chain(
    chain: &[ChainNodeSnapshot],
    manager: &PluginManager,
    sample_rate: f64,
    block_size: usize,
) -> WaveResult<Vec<Box<dyn PluginInstance>>> {
    let mut instances = Vec::new();
    for snapshot in chain.iter().filter(|s| !s.bypassed) {
        let mut instance = manager.instantiate(&snapshot.descriptor.identifier)?;
        if !snapshot.state.is_empty() {
            instance
                .set_state(&snapshot.state)
                .map_err(|e| WaveError::PluginInstantiationFailed(e.to_string()))?;
        }
        instance.prepare_to_play(sample_rate, block_size);
        instances.push(instance);
    }
    Ok(instances)
}

/// Render `[start, start + num_samples)` of `src` through a snapshot of the
/// chain.
///
/// `progress(fraction, status)` is called at least once per block; returning
/// `false` cancels the render promptly with [`WaveError::RenderCancelled`].
pub fn render_selection(
    src: &PcmBuffer,
    chain: &[ChainNodeSnapshot],
    manager: &PluginManager,
    sample_rate: f64,
    start: u64,
    num_samples: u64,
    config: &RenderConfig,
    progress: &mut dyn FnMut(f32, &str) -> bool,
) -> WaveResult<RenderOutcome> {
    let total = src.num_samples() as u64;
    if start.checked_add(num_samples).map_or(true, |end| end > total) {
        return Err(WaveError::out_of_range(start, num_samples, total));
    }
    let block_size = config.block_size.max(MIN_BLOCK_SIZE);
    let channels = src.channels();

    if !progress(0.0, "Preparing plugins") {
        return Err(WaveError::RenderCancelled);
    }

    let mut instances = instantiate_chain(chain, manager, sample_rate, block_size)?;
    let latency: u32 = instances.iter().map(|i| i.latency_samples()).sum();

    // Assemble: latency prefix + selection + tail padding.
    let padded_len = latency as u64 + num_samples + config.tail_samples;
    let mut input = PcmBuffer::new(channels, padded_len as usize, sample_rate);
    let selection = src.slice(start, num_samples)?;
    input.replace_channels(latency as u64, &selection, we_core::ALL_CHANNELS)?;

    // Process block by block, checking for cancellation on each.
    let mut output = PcmBuffer::new(channels, 0, sample_rate);
    let mut block = PcmBuffer::new(channels, block_size, sample_rate);
    let mut processed = 0u64;
    while processed < padded_len {
        let chunk = ((padded_len - processed) as usize).min(block_size);
        if chunk != block.num_samples() {
            block = PcmBuffer::new(channels, chunk, sample_rate);
        }
        let piece = input.slice(processed, chunk as u64)?;
        block.replace_channels(0, &piece, we_core::ALL_CHANNELS)?;

        for instance in &mut instances {
            instance.process_block(&mut block);
        }
        output.insert(processed, &block)?;
        processed += chunk as u64;

        let fraction = processed as f32 / padded_len as f32;
        if !progress(fraction, "Processing plugins") {
            for instance in &mut instances {
                instance.release_resources();
            }
            return Err(WaveError::RenderCancelled);
        }
    }
    for instance in &mut instances {
        instance.release_resources();
    }

    // Throw away the latency prefix; what remains is aligned to the source.
    if latency > 0 {
        output.delete(0, latency as u64)?;
    }

    if let Some(target) = config.output_channels {
        if target != output.channels() {
            output.convert_channel_count(target)?;
        }
    }
    output.set_bit_depth(src.bit_depth());

    if !progress(1.0, "Done") {
        return Err(WaveError::RenderCancelled);
    }
    Ok(RenderOutcome {
        pcm: output,
        latency_samples: latency,
    })
}
