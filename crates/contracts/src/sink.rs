//! RecordSink trait - outbound persistence interface
//!
//! The pipeline treats the sink as a pure write sink.

use crate::{ContractError, DeviceMessage};

/// Persistence collaborator
///
/// All sink implementations must implement this trait.
#[trait_variant::make(RecordSink: Send)]
pub trait LocalRecordSink {
    /// Sink name (used for logging/metrics)
    fn name(&self) -> &str;

    /// Storage readiness check, run once before subscribing
    ///
    /// # Errors
    /// `ContractError::StorageConnection` when storage is unreachable
    async fn ensure_ready(&mut self) -> Result<(), ContractError>;

    /// Persist one decoded message
    ///
    /// # Errors
    /// Returns write error (should include context)
    async fn create_record(&mut self, message: &DeviceMessage) -> Result<(), ContractError>;

    /// Flush buffer (if any)
    async fn flush(&mut self) -> Result<(), ContractError>;

    /// Close sink
    async fn close(&mut self) -> Result<(), ContractError>;
}
