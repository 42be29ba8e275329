//! LogSink - logs one line per record via tracing

use contracts::{ContractError, DeviceMessage, RecordSink};
use tracing::{info, instrument};

/// Sink that logs records instead of storing them (dry run)
pub struct LogSink {
    name: String,
    written: u64,
}

impl LogSink {
    /// Create a new LogSink with the given name
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            written: 0,
        }
    }

    /// Records logged so far
    pub fn written(&self) -> u64 {
        self.written
    }
}

impl RecordSink for LogSink {
    fn name(&self) -> &str {
        &self.name
    }

    async fn ensure_ready(&mut self) -> Result<(), ContractError> {
        info!(sink = %self.name, "LogSink ready (dry run, nothing is stored)");
        Ok(())
    }

    #[instrument(
        name = "log_sink_create_record",
        skip(self, message),
        fields(sink = %self.name, device_id = %message.device_id)
    )]
    async fn create_record(&mut self, message: &DeviceMessage) -> Result<(), ContractError> {
        self.written += 1;
        info!(
            time = %message.time,
            device_type = %message.device_type(),
            name = %message.device.device_name,
            properties = %message
                .device
                .properties
                .as_ref()
                .map(|p| p.to_string())
                .unwrap_or_default(),
            "device message"
        );
        Ok(())
    }

    async fn flush(&mut self) -> Result<(), ContractError> {
        Ok(())
    }

    #[instrument(name = "log_sink_close", skip(self))]
    async fn close(&mut self) -> Result<(), ContractError> {
        info!(sink = %self.name, written = self.written, "LogSink closed");
        Ok(())
    }
}
