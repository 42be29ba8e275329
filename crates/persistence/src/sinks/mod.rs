//! Sink implementations
//!
//! Contains LogSink, FileSink, MemorySink and (feature `postgres`) PostgresSink.

mod file;
mod log;
mod memory;
#[cfg(feature = "postgres")]
mod postgres;

pub use self::file::FileSink;
pub use self::log::LogSink;
pub use self::memory::{MemorySink, MemorySinkConfig, MemorySinkHandle};
#[cfg(feature = "postgres")]
pub use self::postgres::{PostgresSink, SCHEMA};
