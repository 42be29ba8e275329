//! Layered error definitions
//!
//! Categorized by source: config / bus / payload / storage / shutdown

use thiserror::Error;

/// Unified error type
#[derive(Debug, Error)]
pub enum ContractError {
    // ===== Configuration Errors =====
    /// Configuration parse error
    #[error("config parse error: {message}")]
    ConfigParse {
        message: String,
        #[source]
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },

    /// Configuration validation error
    #[error("config validation error at '{field}': {message}")]
    ConfigValidation { field: String, message: String },

    // ===== Startup Errors =====
    /// Message bus unreachable or refused the session
    #[error("bus connection error: {message}")]
    BusConnection { message: String },

    /// Storage unreachable or not ready
    #[error("storage connection error for '{sink_name}': {message}")]
    StorageConnection { sink_name: String, message: String },

    // ===== Per-item Errors =====
    /// Inbound document does not match the base or a known variant shape
    #[error("malformed payload: {message}")]
    MalformedPayload {
        message: String,
        #[source]
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },

    /// A decoded record could not be written
    #[error("sink '{sink_name}' persistence error: {message}")]
    Persistence { sink_name: String, message: String },

    // ===== Shutdown Errors =====
    /// Cleanup step failed during drain
    #[error("shutdown error during {step}: {message}")]
    Shutdown { step: String, message: String },

    // ===== General Errors =====
    /// IO error
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    /// Other error
    #[error("{0}")]
    Other(String),
}

impl ContractError {
    /// Create configuration parse error
    pub fn config_parse(message: impl Into<String>) -> Self {
        Self::ConfigParse {
            message: message.into(),
            source: None,
        }
    }

    /// Create configuration validation error
    pub fn config_validation(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self::ConfigValidation {
            field: field.into(),
            message: message.into(),
        }
    }

    /// Create bus connection error
    pub fn bus_connection(message: impl Into<String>) -> Self {
        Self::BusConnection {
            message: message.into(),
        }
    }

    /// Create storage connection error
    pub fn storage_connection(sink_name: impl Into<String>, message: impl Into<String>) -> Self {
        Self::StorageConnection {
            sink_name: sink_name.into(),
            message: message.into(),
        }
    }

    /// Create malformed payload error without an underlying source
    pub fn malformed_payload(message: impl Into<String>) -> Self {
        Self::MalformedPayload {
            message: message.into(),
            source: None,
        }
    }

    /// Create persistence error
    pub fn persistence(sink_name: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Persistence {
            sink_name: sink_name.into(),
            message: message.into(),
        }
    }

    /// Create shutdown error
    pub fn shutdown(step: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Shutdown {
            step: step.into(),
            message: message.into(),
        }
    }

    /// Whether the error must stop the process before the pipeline runs
    pub fn is_fatal_at_startup(&self) -> bool {
        matches!(
            self,
            Self::BusConnection { .. }
                | Self::StorageConnection { .. }
                | Self::ConfigParse { .. }
                | Self::ConfigValidation { .. }
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_messages_carry_context() {
        let err = ContractError::persistence("postgres", "connection reset");
        assert_eq!(
            err.to_string(),
            "sink 'postgres' persistence error: connection reset"
        );

        let err = ContractError::shutdown("unsubscribe", "not connected");
        assert!(err.to_string().contains("unsubscribe"));
    }

    #[test]
    fn test_startup_classification() {
        assert!(ContractError::bus_connection("refused").is_fatal_at_startup());
        assert!(ContractError::storage_connection("pg", "down").is_fatal_at_startup());
        assert!(!ContractError::malformed_payload("bad json").is_fatal_at_startup());
        assert!(!ContractError::persistence("pg", "dup").is_fatal_at_startup());
    }
}
