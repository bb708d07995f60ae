//! Plugin hosting
//!
//! - `PluginManager`: known descriptors + factories, internal effects built in
//! - `chain`: ordered effect chain with lock-free real-time processing
//! - `scanner` / `worker` / `protocol`: crash-isolated out-of-process scanning
//! - `cache` / `blacklist`: incremental scan side-cars
//!
//! Third-party plug-in ABIs live behind the `PluginInstance` trait; the core
//! never loads foreign binaries in-process.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use we_core::{PcmBuffer, WaveError};

pub mod blacklist;
pub mod cache;
pub mod chain;
pub mod internal;
pub mod protocol;
pub mod scanner;
pub mod worker;

pub use blacklist::Blacklist;
pub use cache::{PluginCache, PluginCacheEntry};
pub use chain::{ChainNode, ChainNodeSnapshot, ChainPreset, NodeList, PluginChain};
pub use scanner::{
    DefaultScanPolicy, ScanJob, ScanPolicy, ScanResult, ScanStatus, ScanSummary,
    ScannerCoordinator, TimeoutDecision, WorkerFactory, WorkerLink,
};

/// Command-line flag selecting worker mode on the main executable.
pub const SCANNER_WORKER_FLAG: &str = "--waveedit-plugin-scanner";

/// Plugin hosting errors
#[derive(Debug, Error)]
pub enum PluginError {
    #[error("Plugin not found: {0}")]
    NotFound(String),

    #[error("Failed to instantiate plugin: {0}")]
    InstantiationFailed(String),

    #[error("Plugin format not supported: {0}")]
    UnsupportedFormat(String),

    #[error("Plugin state error: {0}")]
    StateError(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Result type for plugin operations
pub type PluginResult<T> = Result<T, PluginError>;

impl From<PluginError> for WaveError {
    fn from(err: PluginError) -> Self {
        WaveError::PluginInstantiationFailed(err.to_string())
    }
}

/// Plugin format
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum PluginFormatKind {
    /// VST3 bundle
    Vst3,
    /// CLAP plugin
    Clap,
    /// Built-in effect
    Internal,
}

impl PluginFormatKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            PluginFormatKind::Vst3 => "vst3",
            PluginFormatKind::Clap => "clap",
            PluginFormatKind::Internal => "internal",
        }
    }

    pub fn from_str_loose(s: &str) -> Option<Self> {
        match s.to_ascii_lowercase().as_str() {
            "vst3" => Some(PluginFormatKind::Vst3),
            "clap" => Some(PluginFormatKind::Clap),
            "internal" => Some(PluginFormatKind::Internal),
            _ => None,
        }
    }

    fn extension(&self) -> &'static str {
        match self {
            PluginFormatKind::Vst3 => "vst3",
            PluginFormatKind::Clap => "clap",
            PluginFormatKind::Internal => "",
        }
    }
}

/// Plugin description as discovered by the scanner.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PluginDescriptor {
    /// Stable identifier, e.g. `vst3.fabfilter_pro_q` or `we.utility.gain`
    pub identifier: String,
    /// Display name
    pub name: String,
    /// Vendor name
    pub vendor: String,
    /// Version string
    pub version: String,
    /// Plugin format
    pub format: PluginFormatKind,
    /// File path (empty for internal effects)
    pub path: PathBuf,
    /// Audio input count
    pub audio_inputs: u32,
    /// Audio output count
    pub audio_outputs: u32,
    /// Reported processing latency in samples
    pub latency_samples: u32,
}

impl PluginDescriptor {
    pub fn internal(identifier: &str, name: &str) -> Self {
        Self {
            identifier: identifier.to_string(),
            name: name.to_string(),
            vendor: "WaveEdit".to_string(),
            version: "1.0.0".to_string(),
            format: PluginFormatKind::Internal,
            path: PathBuf::new(),
            audio_inputs: 2,
            audio_outputs: 2,
            latency_samples: 0,
        }
    }
}

/// An instantiated effect.
///
/// Instances are accessed from exactly one thread at a time: UI for
/// state, audio for `process_block`, a render worker for its own clones.
/// `process_block` is total; faults must degrade to pass-through.
pub trait PluginInstance: Send {
    fn descriptor(&self) -> &PluginDescriptor;

    /// Allocate processing resources for the given layout.
    fn prepare_to_play(&mut self, sample_rate: f64, max_block_size: usize);

    /// Release processing resources.
    fn release_resources(&mut self);

    /// Process one block in place. Real-time safe after `prepare_to_play`.
    fn process_block(&mut self, block: &mut PcmBuffer);

    /// Opaque state blob for persistence.
    fn get_state(&self) -> PluginResult<Vec<u8>>;

    /// Restore from a state blob.
    fn set_state(&mut self, state: &[u8]) -> PluginResult<()>;

    /// Current processing latency in samples.
    fn latency_samples(&self) -> u32;
}

type FactoryFn = Arc<dyn Fn(&PluginDescriptor) -> PluginResult<Box<dyn PluginInstance>> + Send + Sync>;

/// Registry of available plug-ins and their factories.
///
/// Constructed at startup and injected where needed; there is no global
/// instance.
pub struct PluginManager {
    descriptors: Vec<PluginDescriptor>,
    factories: HashMap<String, FactoryFn>,
}

impl PluginManager {
    /// New manager with the internal effects registered.
    pub fn new() -> Self {
        let mut manager = Self {
            descriptors: Vec::new(),
            factories: HashMap::new(),
        };
        internal::register_internal_plugins(&mut manager);
        manager
    }

    /// Register a descriptor with its factory. Replaces any previous
    /// registration for the same identifier.
    pub fn register(&mut self, descriptor: PluginDescriptor, factory: FactoryFn) {
        if let Some(existing) = self
            .descriptors
            .iter_mut()
            .find(|d| d.identifier == descriptor.identifier)
        {
            *existing = descriptor.clone();
        } else {
            self.descriptors.push(descriptor.clone());
        }
        self.factories.insert(descriptor.identifier, factory);
    }

    /// Make scan results available for instantiation. Descriptors without a
    /// native factory are registered pass-through (external formats are
    /// modelled, not loaded in-process).
    pub fn register_scanned(&mut self, descriptors: &[PluginDescriptor]) {
        for descriptor in descriptors {
            if self.factories.contains_key(&descriptor.identifier) {
                continue;
            }
            self.register(
                descriptor.clone(),
                Arc::new(|d: &PluginDescriptor| {
                    Ok(Box::new(internal::ExternalStub::new(d.clone())) as Box<dyn PluginInstance>)
                }),
            );
        }
    }

    /// All known descriptors.
    pub fn available(&self) -> &[PluginDescriptor] {
        &self.descriptors
    }

    /// Find a descriptor by identifier.
    pub fn find(&self, identifier: &str) -> Option<&PluginDescriptor> {
        self.descriptors.iter().find(|d| d.identifier == identifier)
    }

    /// Instantiate by identifier.
    pub fn instantiate(&self, identifier: &str) -> PluginResult<Box<dyn PluginInstance>> {
        let descriptor = self
            .find(identifier)
            .ok_or_else(|| PluginError::NotFound(identifier.to_string()))?
            .clone();
        let factory = self
            .factories
            .get(identifier)
            .ok_or_else(|| PluginError::NotFound(identifier.to_string()))?;
        factory(&descriptor)
    }

    /// Probe a plug-in file and build its descriptors.
    ///
    /// Runs inside the scanner worker so a hostile binary cannot take the
    /// editor down with it. Does not load the binary; metadata comes from
    /// the bundle itself.
    pub fn probe_file(path: &Path, format: PluginFormatKind) -> PluginResult<Vec<PluginDescriptor>> {
        if format == PluginFormatKind::Internal {
            return Err(PluginError::UnsupportedFormat(
                "internal effects are not scanned".to_string(),
            ));
        }
        if !path.exists() {
            return Err(PluginError::NotFound(path.display().to_string()));
        }
        let matches_ext = path
            .extension()
            .map(|e| e.eq_ignore_ascii_case(format.extension()))
            .unwrap_or(false);
        if !matches_ext {
            return Err(PluginError::UnsupportedFormat(format!(
                "{} is not a .{} bundle",
                path.display(),
                format.extension()
            )));
        }

        let name = path
            .file_stem()
            .and_then(|s| s.to_str())
            .unwrap_or("Unknown");
        let identifier = format!(
            "{}.{}",
            format.as_str(),
            name.to_lowercase().replace(' ', "_")
        );

        Ok(vec![PluginDescriptor {
            identifier,
            name: name.to_string(),
            vendor: String::new(),
            version: String::from("1.0.0"),
            format,
            path: path.to_path_buf(),
            audio_inputs: 2,
            audio_outputs: 2,
            latency_samples: 0,
        }])
    }
}

impl Default for PluginManager {
    fn default() -> Self {
        Self::new()
    }
}
