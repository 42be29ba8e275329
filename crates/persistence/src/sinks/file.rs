//! FileSink - appends records to a JSON-lines file

use std::fs::{self, File, OpenOptions};
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};

use contracts::{ContractError, DeviceMessage, RecordSink};
use tracing::{debug, error, instrument};

/// Sink that appends one JSON object per record
pub struct FileSink {
    name: String,
    path: PathBuf,
    writer: Option<BufWriter<File>>,
}

impl FileSink {
    /// Create a new FileSink; the file is opened by `ensure_ready`
    pub fn new(name: impl Into<String>, path: impl Into<PathBuf>) -> Self {
        Self {
            name: name.into(),
            path: path.into(),
            writer: None,
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn open(&mut self) -> std::io::Result<()> {
        if self.writer.is_some() {
            return Ok(());
        }
        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent)?;
        }
        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)?;
        self.writer = Some(BufWriter::new(file));
        Ok(())
    }

    fn append(&mut self, message: &DeviceMessage) -> std::io::Result<()> {
        self.open()?;
        let Some(writer) = self.writer.as_mut() else {
            return Err(std::io::Error::other("writer not open"));
        };
        serde_json::to_writer(&mut *writer, message)
            .map_err(|e| std::io::Error::new(std::io::ErrorKind::InvalidData, e))?;
        writer.write_all(b"\n")
    }
}

impl RecordSink for FileSink {
    fn name(&self) -> &str {
        &self.name
    }

    #[instrument(name = "file_sink_ready", skip(self), fields(sink = %self.name, path = %self.path.display()))]
    async fn ensure_ready(&mut self) -> Result<(), ContractError> {
        self.open()
            .map_err(|e| ContractError::storage_connection(&self.name, e.to_string()))
    }

    #[instrument(
        name = "file_sink_create_record",
        skip(self, message),
        fields(sink = %self.name, device_id = %message.device_id)
    )]
    async fn create_record(&mut self, message: &DeviceMessage) -> Result<(), ContractError> {
        self.append(message).map_err(|e| {
            error!(sink = %self.name, error = %e, "Write failed");
            ContractError::persistence(&self.name, e.to_string())
        })
    }

    async fn flush(&mut self) -> Result<(), ContractError> {
        if let Some(writer) = self.writer.as_mut() {
            writer
                .flush()
                .map_err(|e| ContractError::persistence(&self.name, e.to_string()))?;
        }
        Ok(())
    }

    #[instrument(name = "file_sink_close", skip(self))]
    async fn close(&mut self) -> Result<(), ContractError> {
        self.flush().await?;
        self.writer = None;
        debug!(sink = %self.name, "FileSink closed");
        Ok(())
    }
}
