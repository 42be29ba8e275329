//! PostgresSink - stores records in the `device_messages` table

use chrono::Utc;
use contracts::{ContractError, DeviceMessage, PostgresConfig, RecordSink};
use deadpool_postgres::{Config, ManagerConfig, Pool, RecyclingMethod, Runtime};
use tokio_postgres::NoTls;
use tracing::{debug, info, instrument};

use crate::error::{PersistenceError, Result};

/// Idempotent schema for the storage table
pub const SCHEMA: &str = "
CREATE TABLE IF NOT EXISTS device_messages (
    id          BIGSERIAL PRIMARY KEY,
    created_at  TIMESTAMPTZ NOT NULL,
    updated_at  TIMESTAMPTZ NOT NULL,
    time        TIMESTAMPTZ NOT NULL,
    device_id   TEXT NOT NULL,
    device_name TEXT NOT NULL,
    device_type TEXT NOT NULL,
    properties  JSONB
);
CREATE INDEX IF NOT EXISTS idx_device_messages_device_id ON device_messages (device_id);
";

const INSERT: &str = "INSERT INTO device_messages
    (created_at, updated_at, time, device_id, device_name, device_type, properties)
    VALUES ($1, $2, $3, $4, $5, $6, $7)";

/// Sink backed by a PostgreSQL connection pool
pub struct PostgresSink {
    name: String,
    pool: Pool,
}

impl PostgresSink {
    /// Build the pool; no connection is opened until `ensure_ready`
    pub fn new(name: impl Into<String>, config: &PostgresConfig) -> Result<Self> {
        let name = name.into();

        let mut cfg = Config::new();
        cfg.host = Some(config.host.clone());
        cfg.port = Some(config.port);
        cfg.dbname = Some(config.database.clone());
        cfg.user = Some(config.username.clone());
        cfg.password = Some(config.password.clone());
        cfg.manager = Some(ManagerConfig {
            recycling_method: RecyclingMethod::Fast,
        });

        let pool = cfg
            .create_pool(Some(Runtime::Tokio1), NoTls)
            .map_err(|e| PersistenceError::sink_creation(&name, e.to_string()))?;
        pool.resize(config.max_pool_size);

        Ok(Self { name, pool })
    }

    async fn connection(&self) -> std::result::Result<deadpool_postgres::Client, ContractError> {
        self.pool
            .get()
            .await
            .map_err(|e| ContractError::persistence(&self.name, e.to_string()))
    }
}

impl RecordSink for PostgresSink {
    fn name(&self) -> &str {
        &self.name
    }

    #[instrument(name = "postgres_sink_ready", skip(self), fields(sink = %self.name))]
    async fn ensure_ready(&mut self) -> std::result::Result<(), ContractError> {
        let unavailable = |e: String| ContractError::storage_connection(&self.name, e);

        let client = self.pool.get().await.map_err(|e| unavailable(e.to_string()))?;
        client
            .execute("SELECT 1", &[])
            .await
            .map_err(|e| unavailable(e.to_string()))?;
        client
            .batch_execute(SCHEMA)
            .await
            .map_err(|e| unavailable(e.to_string()))?;

        info!("postgreSQL storage ready");
        Ok(())
    }

    #[instrument(
        name = "postgres_sink_create_record",
        skip(self, message),
        fields(sink = %self.name, device_id = %message.device_id)
    )]
    async fn create_record(&mut self, message: &DeviceMessage) -> std::result::Result<(), ContractError> {
        let client = self.connection().await?;
        let now = Utc::now();

        client
            .execute(
                INSERT,
                &[
                    &now,
                    &now,
                    &message.time,
                    &message.device.device_id,
                    &message.device.device_name,
                    &message.device.device_type,
                    &message.device.properties,
                ],
            )
            .await
            .map_err(|e| ContractError::persistence(&self.name, e.to_string()))?;

        debug!("record inserted");
        Ok(())
    }

    async fn flush(&mut self) -> std::result::Result<(), ContractError> {
        Ok(())
    }

    #[instrument(name = "postgres_sink_close", skip(self))]
    async fn close(&mut self) -> std::result::Result<(), ContractError> {
        self.pool.close();
        debug!(sink = %self.name, "PostgresSink closed");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_pool_creation_does_not_connect() {
        let sink = PostgresSink::new("pg", &PostgresConfig::default()).unwrap();
        assert_eq!(sink.name(), "pg");
        assert_eq!(sink.pool.status().max_size, PostgresConfig::default().max_pool_size);
    }

    #[tokio::test]
    async fn test_unreachable_database_fails_readiness() {
        let mut sink = PostgresSink::new(
            "pg",
            &PostgresConfig {
                host: "127.0.0.1".to_string(),
                port: 1,
                ..Default::default()
            },
        )
        .unwrap();

        let err = sink.ensure_ready().await.unwrap_err();
        assert!(matches!(err, ContractError::StorageConnection { .. }));
    }

    #[test]
    fn test_schema_is_idempotent() {
        assert!(SCHEMA.contains("CREATE TABLE IF NOT EXISTS device_messages"));
        assert!(SCHEMA.contains("CREATE INDEX IF NOT EXISTS"));
    }
}
