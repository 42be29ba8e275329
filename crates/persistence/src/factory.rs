//! Sink selection from `StorageConfig`

use contracts::{ContractError, DeviceMessage, RecordSink, SinkType, StorageConfig};
use tracing::instrument;

use crate::error::{PersistenceError, Result};
#[cfg(feature = "postgres")]
use crate::sinks::PostgresSink;
use crate::sinks::{FileSink, LogSink};

/// Sink chosen at runtime by configuration
pub enum ConfiguredSink {
    Log(LogSink),
    File(FileSink),
    #[cfg(feature = "postgres")]
    Postgres(PostgresSink),
}

/// Create the configured sink
///
/// No I/O happens here; connectivity is checked by `ensure_ready`.
#[instrument(
    name = "persistence_create_sink",
    skip(config),
    fields(sink = %config.name, sink_type = %config.sink_type)
)]
pub fn create_sink(config: &StorageConfig) -> Result<ConfiguredSink> {
    match config.sink_type {
        SinkType::Log => Ok(ConfiguredSink::Log(LogSink::new(&config.name))),
        SinkType::File => {
            let path = config.path.as_ref().ok_or_else(|| {
                PersistenceError::sink_creation(&config.name, "file sink requires storage.path")
            })?;
            Ok(ConfiguredSink::File(FileSink::new(&config.name, path)))
        }
        #[cfg(feature = "postgres")]
        SinkType::Postgres => Ok(ConfiguredSink::Postgres(PostgresSink::new(
            &config.name,
            &config.postgres,
        )?)),
        #[cfg(not(feature = "postgres"))]
        SinkType::Postgres => Err(PersistenceError::sink_creation(
            &config.name,
            "built without the `postgres` feature",
        )),
    }
}

macro_rules! delegate {
    ($self:ident, $sink:ident => $body:expr) => {
        match $self {
            ConfiguredSink::Log($sink) => $body,
            ConfiguredSink::File($sink) => $body,
            #[cfg(feature = "postgres")]
            ConfiguredSink::Postgres($sink) => $body,
        }
    };
}

impl RecordSink for ConfiguredSink {
    fn name(&self) -> &str {
        delegate!(self, sink => sink.name())
    }

    async fn ensure_ready(&mut self) -> std::result::Result<(), ContractError> {
        delegate!(self, sink => sink.ensure_ready().await)
    }

    async fn create_record(&mut self, message: &DeviceMessage) -> std::result::Result<(), ContractError> {
        delegate!(self, sink => sink.create_record(message).await)
    }

    async fn flush(&mut self) -> std::result::Result<(), ContractError> {
        delegate!(self, sink => sink.flush().await)
    }

    async fn close(&mut self) -> std::result::Result<(), ContractError> {
        delegate!(self, sink => sink.close().await)
    }
}
