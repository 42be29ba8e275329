//! # Contracts
//!
//! Frozen interface contracts (ICD), defining inter-module data structures and traits.
//! All business crates can only depend on this crate, reverse dependencies are prohibited.
//!
//! ## Time Model
//! - `time` is the producer-supplied event time (RFC 3339 on the wire, UTC in memory)
//! - `created_at` / `updated_at` / `id` are server-managed and absent until persisted

mod bus;
mod config;
mod device;
mod error;
mod message;
mod sink;

pub use bus::*;
pub use config::*;
pub use device::*;
pub use error::*;
pub use message::*;
pub use sink::*;
