//! Codec error types

use contracts::ContractError;
use thiserror::Error;

/// Codec-specific errors
///
/// Every variant is a `MalformedPayload` from the pipeline's point of view.
#[derive(Debug, Error)]
pub enum CodecError {
    /// Top-level document is not a valid envelope
    #[error("malformed envelope: {0}")]
    MalformedEnvelope(#[source] serde_json::Error),

    /// `device` sub-document does not match the base device shape
    #[error("malformed device document: {0}")]
    MalformedDevice(#[source] serde_json::Error),

    /// Known variant re-parse failed
    #[error("malformed '{device_type}' fields: {source}")]
    MalformedVariant {
        device_type: String,
        #[source]
        source: serde_json::Error,
    },

    /// Stored properties cannot be re-hydrated into the variant
    #[error("properties do not match '{device_type}' schema: {source}")]
    MalformedProperties {
        device_type: String,
        #[source]
        source: serde_json::Error,
    },

    /// Serialization failure
    #[error("serialize error: {0}")]
    Serialize(#[source] serde_json::Error),
}

impl CodecError {
    pub(crate) fn malformed_variant(device_type: impl Into<String>, source: serde_json::Error) -> Self {
        Self::MalformedVariant {
            device_type: device_type.into(),
            source,
        }
    }

    pub(crate) fn malformed_properties(
        device_type: impl Into<String>,
        source: serde_json::Error,
    ) -> Self {
        Self::MalformedProperties {
            device_type: device_type.into(),
            source,
        }
    }
}

impl From<CodecError> for ContractError {
    fn from(err: CodecError) -> Self {
        ContractError::MalformedPayload {
            message: err.to_string(),
            source: Some(Box::new(err)),
        }
    }
}
