//! Built-in effect plug-ins
//!
//! Small native processors registered alongside scanned plug-ins. They share
//! the `PluginInstance` surface so the chain, renderer and presets treat
//! them like any other effect.

use std::sync::Arc;

use we_core::PcmBuffer;

use crate::{PluginDescriptor, PluginError, PluginInstance, PluginManager, PluginResult};

pub(crate) fn register_internal_plugins(manager: &mut PluginManager) {
    manager.register(
        GainPlugin::descriptor(),
        Arc::new(|_| Ok(Box::new(GainPlugin::new()) as Box<dyn PluginInstance>)),
    );
    manager.register(
        PhaseInvertPlugin::descriptor(),
        Arc::new(|_| Ok(Box::new(PhaseInvertPlugin::new()) as Box<dyn PluginInstance>)),
    );
}

/// Utility gain. State is the gain in dB as little-endian f64.
pub struct GainPlugin {
    descriptor: PluginDescriptor,
    gain_db: f64,
    factor: f32,
}

impl GainPlugin {
    pub fn descriptor() -> PluginDescriptor {
        PluginDescriptor::internal("we.utility.gain", "Gain")
    }

    pub fn new() -> Self {
        Self {
            descriptor: Self::descriptor(),
            gain_db: 0.0,
            factor: 1.0,
        }
    }

    pub fn set_gain_db(&mut self, gain_db: f64) {
        self.gain_db = gain_db;
        self.factor = we_dsp::db_to_linear(gain_db) as f32;
    }
}

impl Default for GainPlugin {
    fn default() -> Self {
        Self::new()
    }
}

impl PluginInstance for GainPlugin {
    fn descriptor(&self) -> &PluginDescriptor {
        &self.descriptor
    }

    fn prepare_to_play(&mut self, _sample_rate: f64, _max_block_size: usize) {}

    fn release_resources(&mut self) {}

    fn process_block(&mut self, block: &mut PcmBuffer) {
        if self.factor == 1.0 {
            return;
        }
        for ch in block.channels_iter_mut() {
            for s in ch.iter_mut() {
                *s *= self.factor;
            }
        }
    }

    fn get_state(&self) -> PluginResult<Vec<u8>> {
        Ok(self.gain_db.to_le_bytes().to_vec())
    }

    fn set_state(&mut self, state: &[u8]) -> PluginResult<()> {
        let bytes: [u8; 8] = state
            .try_into()
            .map_err(|_| PluginError::StateError("gain state must be 8 bytes".to_string()))?;
        self.set_gain_db(f64::from_le_bytes(bytes));
        Ok(())
    }

    fn latency_samples(&self) -> u32 {
        0
    }
}

/// Polarity flip. Stateless.
pub struct PhaseInvertPlugin {
    descriptor: PluginDescriptor,
}

impl PhaseInvertPlugin {
    pub fn descriptor() -> PluginDescriptor {
        PluginDescriptor::internal("we.utility.phase", "Phase Invert")
    }

    pub fn new() -> Self {
        Self {
            descriptor: Self::descriptor(),
        }
    }
}

impl Default for PhaseInvertPlugin {
    fn default() -> Self {
        Self::new()
    }
}

impl PluginInstance for PhaseInvertPlugin {
    fn descriptor(&self) -> &PluginDescriptor {
        &self.descriptor
    }

    fn prepare_to_play(&mut self, _sample_rate: f64, _max_block_size: usize) {}

    fn release_resources(&mut self) {}

    fn process_block(&mut self, block: &mut PcmBuffer) {
        for ch in block.channels_iter_mut() {
            for s in ch.iter_mut() {
                *s = -*s;
            }
        }
    }

    fn get_state(&self) -> PluginResult<Vec<u8>> {
        Ok(Vec::new())
    }

    fn set_state(&mut self, _state: &[u8]) -> PluginResult<()> {
        Ok(())
    }

    fn latency_samples(&self) -> u32 {
        0
    }
}

/// Placeholder instance for scanned external formats.
///
/// The core models external plug-ins (descriptors, state blobs, latency)
/// without loading their binaries in-process; hosts integrating a real ABI
/// replace this factory. Processes as pass-through and preserves whatever
/// state blob it was handed.
pub struct ExternalStub {
    descriptor: PluginDescriptor,
    state: Vec<u8>,
}

impl ExternalStub {
    pub fn new(descriptor: PluginDescriptor) -> Self {
        Self {
            descriptor,
            state: Vec::new(),
        }
    }
}

impl PluginInstance for ExternalStub {
    fn descriptor(&self) -> &PluginDescriptor {
        &self.descriptor
    }

    fn prepare_to_play(&mut self, _sample_rate: f64, _max_block_size: usize) {}

    fn release_resources(&mut self) {}

    fn process_block(&mut self, _block: &mut PcmBuffer) {}

    fn get_state(&self) -> PluginResult<Vec<u8>> {
        Ok(self.state.clone())
    }

    fn set_state(&mut self, state: &[u8]) -> PluginResult<()> {
        self.state = state.to_vec();
        Ok(())
    }

    fn latency_samples(&self) -> u32 {
        self.descriptor.latency_samples
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_gain_state_round_trip() {
        let mut plugin = GainPlugin::new();
        plugin.set_gain_db(-6.0);
        let state = plugin.get_state().unwrap();

        let mut restored = GainPlugin::new();
        restored.set_state(&state).unwrap();
        assert_eq!(restored.gain_db, -6.0);
    }

    #[test]
    fn test_gain_processes_block() {
        let mut plugin = GainPlugin::new();
        plugin.set_gain_db(-6.0);
        let mut block = PcmBuffer::from_channels(vec![vec![1.0f32; 64]], 48000.0).unwrap();
        plugin.process_block(&mut block);
        let expected = we_dsp::db_to_linear(-6.0) as f32;
        assert!((block.channel(0).unwrap()[0] - expected).abs() < 1e-6);
    }

    #[test]
    fn test_phase_invert() {
        let mut plugin = PhaseInvertPlugin::new();
        let mut block = PcmBuffer::from_channels(vec![vec![0.5f32, -0.25]], 48000.0).unwrap();
        plugin.process_block(&mut block);
        assert_eq!(block.channel(0).unwrap(), &[-0.5, 0.25]);
    }

    #[test]
    fn test_bad_gain_state_rejected() {
        let mut plugin = GainPlugin::new();
        assert!(plugin.set_state(&[1, 2, 3]).is_err());
    }
}
