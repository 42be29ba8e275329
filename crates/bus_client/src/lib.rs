//! # Bus Client
//!
//! Message bus adapters implementing `contracts::MessageBus`.
//!
//! Responsibilities:
//! - Connect to the broker and open a session
//! - Subscribe to the ingest topic and enqueue deliveries into a bounded queue
//! - Unsubscribe and disconnect within a bounded timeout
//! - Provide an in-process mock bus for tests
//!
//! ## Feature Flags
//!
//! - `mqtt` (default): Enable the rumqttc-backed `MqttBus`

pub mod broker;
pub mod error;
pub mod mock_client;

#[cfg(feature = "mqtt")]
pub mod mqtt_client;

pub use broker::{parse_broker_url, DEFAULT_MQTT_PORT};
pub use error::{BusError, Result};
pub use mock_client::{BusCall, MockBus, MockBusConfig, MockBusHandle};

#[cfg(feature = "mqtt")]
pub use mqtt_client::{qos_from_level, MqttBus};
