//! MessageBus trait - inbound collaborator interface
//!
//! The bus client delivers raw payloads into a bounded queue; the ingestion
//! pipeline consumes that queue through a `Subscription`.

use std::time::Duration;

use async_channel::Receiver;
use bytes::Bytes;
use chrono::{DateTime, Utc};

use crate::ContractError;

/// Raw message delivered by the bus
#[derive(Debug, Clone)]
pub struct RawMessage {
    /// Topic the message was published on
    pub topic: String,

    /// Undecoded payload
    pub payload: Bytes,

    /// Local receive time
    pub received_at: DateTime<Utc>,
}

impl RawMessage {
    /// Create a raw message stamped with the current time
    pub fn new(topic: impl Into<String>, payload: impl Into<Bytes>) -> Self {
        Self {
            topic: topic.into(),
            payload: payload.into(),
            received_at: Utc::now(),
        }
    }

    /// Lossy UTF-8 excerpt of the payload, at most `max_bytes` long, for logging
    pub fn payload_excerpt(&self, max_bytes: usize) -> String {
        let end = self.payload.len().min(max_bytes);
        let mut excerpt = String::from_utf8_lossy(&self.payload[..end]).into_owned();
        if self.payload.len() > max_bytes {
            excerpt.push_str("...");
        }
        excerpt
    }
}

/// Stream of deliveries for one topic
#[derive(Debug)]
pub struct Subscription {
    topic: String,
    rx: Receiver<RawMessage>,
}

impl Subscription {
    /// Wrap the receiving end of a delivery queue
    pub fn new(topic: impl Into<String>, rx: Receiver<RawMessage>) -> Self {
        Self {
            topic: topic.into(),
            rx,
        }
    }

    /// Subscribed topic
    pub fn topic(&self) -> &str {
        &self.topic
    }

    /// Wait for the next delivery; `None` once the bus side has gone away
    pub async fn recv(&self) -> Option<RawMessage> {
        self.rx.recv().await.ok()
    }

    /// Deliveries buffered but not yet received
    pub fn len(&self) -> usize {
        self.rx.len()
    }

    /// Check if no deliveries are buffered
    pub fn is_empty(&self) -> bool {
        self.rx.is_empty()
    }
}

/// Message bus client
///
/// Implementations must only enqueue from their delivery context and never
/// run decode or persistence work there.
#[trait_variant::make(MessageBus: Send)]
pub trait LocalMessageBus {
    /// Bus name (used for logging)
    fn name(&self) -> &str;

    /// Establish the session with the broker
    ///
    /// # Errors
    /// `ContractError::BusConnection` when the broker is unreachable
    async fn connect(&mut self) -> Result<(), ContractError>;

    /// Subscribe to a topic and return its delivery stream
    async fn subscribe(&mut self, topic: &str) -> Result<Subscription, ContractError>;

    /// Stop deliveries for a topic
    async fn unsubscribe(&mut self, topic: &str) -> Result<(), ContractError>;

    /// Close the session, waiting at most `timeout` for in-flight protocol work
    async fn disconnect(&mut self, timeout: Duration) -> Result<(), ContractError>;
}
