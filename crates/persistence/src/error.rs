//! Persistence error types

use thiserror::Error;

/// Persistence-specific errors
#[derive(Debug, Error)]
pub enum PersistenceError {
    /// Sink creation error
    #[error("failed to create sink '{name}': {message}")]
    SinkCreation { name: String, message: String },

    /// Sink used before it was opened
    #[error("sink '{name}' is not ready")]
    NotReady { name: String },

    /// Contract-level error
    #[error(transparent)]
    Contract(#[from] contracts::ContractError),

    /// IO error
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

impl PersistenceError {
    /// Create a sink creation error
    pub fn sink_creation(name: impl Into<String>, message: impl Into<String>) -> Self {
        Self::SinkCreation {
            name: name.into(),
            message: message.into(),
        }
    }
}

impl From<PersistenceError> for contracts::ContractError {
    fn from(err: PersistenceError) -> Self {
        match err {
            PersistenceError::SinkCreation { name, message } => Self::storage_connection(name, message),
            PersistenceError::NotReady { name } => Self::persistence(name, "sink is not ready"),
            PersistenceError::Contract(inner) => inner,
            PersistenceError::Io(e) => Self::Io(e),
        }
    }
}

pub type Result<T> = std::result::Result<T, PersistenceError>;
