//! Bus client error types

use std::time::Duration;

use contracts::ContractError;
use thiserror::Error;

/// Bus client specific error
#[derive(Debug, Error)]
pub enum BusError {
    /// Broker URL cannot be parsed
    #[error("invalid broker url '{url}': {message}")]
    InvalidBrokerUrl { url: String, message: String },

    /// Broker did not acknowledge the session in time
    #[error("no CONNACK from {broker} within {timeout:?}")]
    ConnectTimeout { broker: String, timeout: Duration },

    /// Broker unreachable or refused the session
    #[error("failed to connect to {broker}: {message}")]
    ConnectionFailed { broker: String, message: String },

    /// Operation requires an established session
    #[error("not connected")]
    NotConnected,

    /// Broker answered SUBSCRIBE with a failure code
    #[error("subscription to '{topic}' rejected: {reason}")]
    SubscribeRejected { topic: String, reason: String },

    /// No SUBACK within the timeout
    #[error("no SUBACK for '{topic}' within {timeout:?}")]
    SubscribeTimeout { topic: String, timeout: Duration },

    /// The delivery stream has already been handed out
    #[error("already subscribed to '{topic}'")]
    AlreadySubscribed { topic: String },

    /// Request could not be queued to the MQTT client
    #[cfg(feature = "mqtt")]
    #[error("mqtt client error: {0}")]
    Client(#[from] rumqttc::ClientError),
}

impl BusError {
    pub fn connection_failed(broker: impl Into<String>, message: impl Into<String>) -> Self {
        Self::ConnectionFailed {
            broker: broker.into(),
            message: message.into(),
        }
    }
}

impl From<BusError> for ContractError {
    fn from(err: BusError) -> Self {
        match err {
            BusError::InvalidBrokerUrl { .. }
            | BusError::ConnectTimeout { .. }
            | BusError::ConnectionFailed { .. }
            | BusError::SubscribeRejected { .. }
            | BusError::SubscribeTimeout { .. }
            | BusError::NotConnected => ContractError::bus_connection(err.to_string()),
            other => ContractError::Other(other.to_string()),
        }
    }
}

/// Bus client Result 类型别名
pub type Result<T> = std::result::Result<T, BusError>;
