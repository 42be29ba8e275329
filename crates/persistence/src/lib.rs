//! # Persistence
//!
//! 存储模块。
//!
//! 负责：
//! - 实现 `RecordSink`：log / JSON-lines file / PostgreSQL / in-memory
//! - 存储就绪检查（连接 + 幂等建表）
//! - 根据 `StorageConfig` 选择 sink

pub mod error;
pub mod factory;
pub mod sinks;

pub use contracts::{DeviceMessage, RecordSink};
pub use error::{PersistenceError, Result};
pub use factory::{create_sink, ConfiguredSink};
pub use sinks::{FileSink, LogSink, MemorySink, MemorySinkConfig, MemorySinkHandle};
#[cfg(feature = "postgres")]
pub use sinks::PostgresSink;
