//! Batch pipeline.
//!
//! # Data Flow
//! ```text
//! producer:  hex ─► decode ─► SensorBatch(Received)
//!                 ─► seal flagged blocks with the day key ─► Processed
//!                 ─► dispatch::DispatchCoordinator ─► Dispatching ─► Completed
//!
//! consumer:  hex ─► decode ─► open with the day key ─► readings + verdicts
//! ```

pub mod batch;
pub mod processor;
pub mod types;

pub use batch::{parse_timestamp, SensorBatch};
pub use processor::{Pipeline, ProcessOutcome};
pub use types::{BatchState, PipelineError, PipelineResult};
