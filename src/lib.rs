//! Framemon library - the frame event query engine of a multi-client
//! performance-telemetry service.
//!
//! Clients describe the per-frame columns they want as a list of query
//! elements; the engine compiles that list into a fixed binary blob layout
//! once, then gathers one blob per raw frame record at consumption time.
//!
//! # Modules
//!
//! - [`frame`] - raw frame records (present event + GPU/CPU telemetry)
//! - [`metric`] - metric and statistic identifiers
//! - [`query`] - compiled queries: layout, gather strategies, frame context
//! - [`window`] - sliding-window neighbor correlation over the frame stream
//! - [`blobs`] - aligned blob-array storage for batched consumption
//! - [`utils`] - alignment and QPC arithmetic helpers
//!
//! # Example
//!
//! ```
//! use framemon::{FrameContext, FrameNeighbors, FrameQuery, FrameRecord, Metric, QueryElement};
//!
//! // Compile a query; the planner fills each element's offset and size.
//! let mut elements = vec![
//!     QueryElement::new(Metric::Application),
//!     QueryElement::with_device(Metric::GpuBusy, 1),
//!     QueryElement::new(Metric::DroppedFrames),
//! ];
//! let query = FrameQuery::new(&mut elements).expect("valid query");
//!
//! // Gather one frame into a blob.
//! let frame = FrameRecord::default();
//! let ctx = FrameContext::new(&frame, FrameNeighbors::default(), 0.0001, 0);
//! let mut blob = vec![0u8; query.blob_size()];
//! query.gather_to_blob(&ctx, &mut blob);
//!
//! let gpu_busy = f64::from_ne_bytes(
//!     blob[elements[1].data_offset as usize..][..8].try_into().unwrap(),
//! );
//! assert_eq!(gpu_busy, 0.0);
//! ```

pub mod blobs;
pub mod frame;
pub mod metric;
pub mod query;
pub mod utils;
pub mod window;

// Re-export for convenience
pub use blobs::BlobBatch;
pub use frame::{
    CpuTelemetry, FrameRecord, FrameType, GpuTelemetry, PresentEvent, PresentMode, PresentResult,
    PresentRuntime,
};
pub use metric::{Metric, Stat};
pub use query::{FrameContext, FrameNeighbors, FrameQuery, QueryElement, QueryError};
pub use window::{CorrelatedFrame, FrameWindow};
