//! ServiceConfig - Config Loader 输出
//!
//! 描述完整的服务配置：消息总线、流水线队列、存储后端。
//! Every field has a default, so an empty document is a valid configuration.

use std::fmt;
use std::path::PathBuf;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use validator::Validate;

/// 配置版本
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum ConfigVersion {
    #[default]
    V1,
}

/// 完整的服务配置
#[derive(Debug, Clone, Default, Serialize, Deserialize, Validate)]
pub struct ServiceConfig {
    /// 配置版本
    #[serde(default)]
    pub version: ConfigVersion,

    /// Message bus connection
    #[serde(default)]
    #[validate(nested)]
    pub bus: BusConfig,

    /// Pipeline queues and failure policy
    #[serde(default)]
    #[validate(nested)]
    pub pipeline: PipelineSettings,

    /// Storage backend
    #[serde(default)]
    #[validate(nested)]
    pub storage: StorageConfig,
}

/// 消息总线配置
#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
#[serde(default)]
pub struct BusConfig {
    /// Broker URL (`tcp://host:port`, `mqtt://host:port`, `host:port` or `host`)
    #[validate(length(min = 1, message = "broker cannot be empty"))]
    pub broker: String,

    /// Client identifier presented to the broker
    #[validate(length(min = 1, message = "client_id cannot be empty"))]
    pub client_id: String,

    /// Subscribed topic
    #[validate(length(min = 1, message = "topic cannot be empty"))]
    pub topic: String,

    /// Subscription QoS (0, 1 or 2)
    #[validate(range(max = 2))]
    pub qos: u8,

    /// Keep-alive interval (seconds)
    #[validate(range(min = 5))]
    pub keep_alive_secs: u64,

    /// Time allowed for the broker to acknowledge the session (seconds)
    #[validate(range(min = 1))]
    pub connect_timeout_secs: u64,

    /// Grace period for in-flight protocol work on disconnect (milliseconds)
    pub disconnect_timeout_ms: u64,

    /// Pause between reconnect attempts after the connection drops (milliseconds)
    #[validate(range(min = 1))]
    pub reconnect_delay_ms: u64,

    /// Capacity of the client's request channel
    #[validate(range(min = 1))]
    pub request_capacity: usize,
}

impl Default for BusConfig {
    fn default() -> Self {
        Self {
            broker: "tcp://localhost:1883".to_string(),
            client_id: "telemetry-ingest".to_string(),
            topic: "iot-messages".to_string(),
            qos: 1,
            keep_alive_secs: 30,
            connect_timeout_secs: 10,
            disconnect_timeout_ms: 250,
            reconnect_delay_ms: 1000,
            request_capacity: 10,
        }
    }
}

impl BusConfig {
    pub fn keep_alive(&self) -> Duration {
        Duration::from_secs(self.keep_alive_secs)
    }

    pub fn connect_timeout(&self) -> Duration {
        Duration::from_secs(self.connect_timeout_secs)
    }

    pub fn disconnect_timeout(&self) -> Duration {
        Duration::from_millis(self.disconnect_timeout_ms)
    }

    pub fn reconnect_delay(&self) -> Duration {
        Duration::from_millis(self.reconnect_delay_ms)
    }
}

/// Behaviour of a full hand-off queue
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OverflowPolicy {
    /// Wait for space (back-pressure)
    #[default]
    Block,
    /// Drop the incoming item and count it
    DropNewest,
}

/// 流水线配置
#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
#[serde(default)]
pub struct PipelineSettings {
    /// Capacity of each hand-off queue
    #[validate(range(min = 1))]
    pub queue_capacity: usize,

    /// Policy applied when a hand-off queue is full
    pub overflow_policy: OverflowPolicy,

    /// Consecutive persistence failures that stop the pipeline (None = never)
    #[validate(range(min = 1))]
    pub max_consecutive_failures: Option<u32>,
}

impl Default for PipelineSettings {
    fn default() -> Self {
        Self {
            queue_capacity: 100,
            overflow_policy: OverflowPolicy::Block,
            max_consecutive_failures: None,
        }
    }
}

/// Sink 类型
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SinkType {
    /// 日志输出
    #[default]
    Log,
    /// JSON lines 文件输出
    File,
    /// PostgreSQL
    Postgres,
}

impl fmt::Display for SinkType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Log => "log",
            Self::File => "file",
            Self::Postgres => "postgres",
        };
        f.write_str(name)
    }
}

/// 存储配置
#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
#[serde(default)]
pub struct StorageConfig {
    /// Sink 类型
    pub sink_type: SinkType,

    /// Sink 名称 (used in logs and metrics labels)
    #[validate(length(min = 1, message = "sink name cannot be empty"))]
    pub name: String,

    /// Output path, required by the file sink
    #[serde(skip_serializing_if = "Option::is_none")]
    pub path: Option<PathBuf>,

    /// PostgreSQL connection
    #[validate(nested)]
    pub postgres: PostgresConfig,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            sink_type: SinkType::Log,
            name: "device_messages".to_string(),
            path: None,
            postgres: PostgresConfig::default(),
        }
    }
}

/// PostgreSQL 连接配置
#[derive(Clone, Serialize, Deserialize, Validate)]
#[serde(default)]
pub struct PostgresConfig {
    #[validate(length(min = 1))]
    pub host: String,

    pub port: u16,

    #[validate(length(min = 1))]
    pub database: String,

    #[validate(length(min = 1))]
    pub username: String,

    pub password: String,

    /// Maximum pooled connections
    #[validate(range(min = 1))]
    pub max_pool_size: usize,
}

impl Default for PostgresConfig {
    fn default() -> Self {
        Self {
            host: "localhost".to_string(),
            port: 5432,
            database: "postgres".to_string(),
            username: "postgres".to_string(),
            password: String::new(),
            max_pool_size: 100,
        }
    }
}

impl fmt::Debug for PostgresConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PostgresConfig")
            .field("host", &self.host)
            .field("port", &self.port)
            .field("database", &self.database)
            .field("username", &self.username)
            .field("password", &"<redacted>")
            .field("max_pool_size", &self.max_pool_size)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = ServiceConfig::default();
        assert_eq!(config.bus.broker, "tcp://localhost:1883");
        assert_eq!(config.bus.topic, "iot-messages");
        assert_eq!(config.bus.qos, 1);
        assert_eq!(config.bus.disconnect_timeout(), Duration::from_millis(250));
        assert_eq!(config.bus.reconnect_delay(), Duration::from_secs(1));
        assert_eq!(config.pipeline.queue_capacity, 100);
        assert_eq!(config.pipeline.overflow_policy, OverflowPolicy::Block);
        assert_eq!(config.storage.sink_type, SinkType::Log);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_empty_document_uses_defaults() {
        let config: ServiceConfig = serde_json::from_str("{}").unwrap();
        assert_eq!(config.bus.client_id, "telemetry-ingest");
        assert_eq!(config.storage.postgres.port, 5432);
    }

    #[test]
    fn test_field_rules() {
        let mut config = ServiceConfig::default();
        config.bus.qos = 3;
        assert!(config.validate().is_err());

        let mut config = ServiceConfig::default();
        config.bus.reconnect_delay_ms = 0;
        assert!(config.validate().is_err());

        let mut config = ServiceConfig::default();
        config.pipeline.queue_capacity = 0;
        assert!(config.validate().is_err());

        let mut config = ServiceConfig::default();
        config.pipeline.max_consecutive_failures = Some(0);
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_password_redacted() {
        let mut config = PostgresConfig::default();
        config.password = "hunter2".to_string();
        let debug = format!("{config:?}");
        assert!(!debug.contains("hunter2"));
        assert!(debug.contains("<redacted>"));
    }

    #[test]
    fn test_policy_names() {
        let policy: OverflowPolicy = serde_json::from_str("\"drop_newest\"").unwrap();
        assert_eq!(policy, OverflowPolicy::DropNewest);
        assert_eq!(SinkType::Postgres.to_string(), "postgres");
    }
}
