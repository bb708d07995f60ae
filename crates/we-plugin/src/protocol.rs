//! Scanner IPC protocol
//!
//! XML messages between the scan coordinator and the out-of-process worker,
//! one document per line over the child's stdio. The message set is fixed;
//! unknown input is answered with `Error` rather than terminating the
//! worker.

use serde::{Deserialize, Serialize};

use crate::{PluginDescriptor, PluginError, PluginResult};

/// Coordinator → worker.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum CoordinatorMessage {
    /// Scan one plug-in file.
    ScanPlugin { path: String, format: String },
    /// Liveness probe; the worker echoes the timestamp back.
    Heartbeat { time: i64 },
    /// Orderly worker shutdown.
    Shutdown,
}

/// Worker → coordinator.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum WorkerMessage {
    /// Worker is up and listening.
    Ready { pid: u32 },
    /// Scan of `path` has begun.
    ScanStarted { path: String, time: i64 },
    /// Scan finished with the discovered descriptors.
    ScanComplete {
        path: String,
        #[serde(default)]
        descriptors: Vec<PluginDescriptor>,
    },
    /// Scan failed inside the worker (the worker itself survived).
    ScanFailed { path: String, error: String },
    /// Echo of a heartbeat.
    HeartbeatAck { time: i64 },
    /// Protocol-level fault.
    Error { message: String },
}

/// Serialise a message to its one-line XML form.
pub fn encode<T: Serialize>(msg: &T) -> PluginResult<String> {
    quick_xml::se::to_string(msg)
        .map_err(|e| PluginError::StateError(format!("encode IPC message: {e}")))
}

/// Parse a one-line XML message.
pub fn decode<'de, T: Deserialize<'de>>(line: &'de str) -> PluginResult<T> {
    quick_xml::de::from_str(line.trim())
        .map_err(|e| PluginError::StateError(format!("decode IPC message: {e}")))
}
