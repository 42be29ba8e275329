//! # Ingestion Pipeline
//!
//! Cancellable receive → decode → persist pipeline and its lifecycle controller.
//!
//! Responsibilities:
//! - Pull raw deliveries from a bus `Subscription`
//! - Decode them with `codec::DeviceCodec`, dropping malformed payloads
//! - Hand decoded messages to a `RecordSink`
//! - Backpressure (or drop-newest) on bounded hand-off queues
//! - Drain in-flight items on cancellation
//!
//! ## Usage Example
//!
//! ```ignore
//! use ingestion::{ControllerConfig, LifecycleController};
//!
//! let controller = LifecycleController::new(bus, sink, DeviceCodec::default(), ControllerConfig::from(&config));
//! let report = controller.run_until(shutdown_signal()).await?;
//! println!("{}", report.metrics);
//! ```

mod config;
mod error;
mod lifecycle;
mod pipeline;
mod stages;
mod state;

// Re-exports
pub use config::{
    ControllerConfig, MetricsSnapshot, PipelineConfig, PipelineMetrics,
    DEFAULT_PAYLOAD_EXCERPT_BYTES,
};
pub use error::{IngestionError, Result};
pub use lifecycle::{LifecycleController, ShutdownReport};
pub use pipeline::{IngestionPipeline, PipelineHandle};
pub use state::{PipelineState, StopReason};
