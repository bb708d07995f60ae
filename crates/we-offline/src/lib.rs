//! Offline rendering
//!
//! Processes a selection (or a whole buffer) through an independent copy of
//! the plug-in chain: fresh instances built from descriptors and state
//! blobs, never the live ones. Latency is compensated, cancellation is
//! cooperative, progress is staged. Batch export drives the same path once
//! per region and encodes the results.

pub mod batch;
pub mod render;

pub use batch::{export_regions, BatchExportConfig, ExportRegion};
pub use render::{render_selection, RenderConfig, RenderOutcome};
