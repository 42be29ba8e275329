//! Command implementations.

mod decode;
mod run;
mod validate;

pub use decode::run_decode;
pub use run::run_service;
pub use validate::run_validate;
