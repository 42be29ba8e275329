//! Mock Pipeline Example
//!
//! Runs the full lifecycle against the in-memory bus and sink.
//! No broker or database required.
//!
//! Run with: cargo run -p demos --bin mock_pipeline [config.toml]

use std::time::Duration;

use bus_client::MockBus;
use codec::DeviceCodec;
use config_loader::ConfigLoader;
use contracts::ServiceConfig;
use ingestion::{ControllerConfig, LifecycleController, StopReason};
use observability::{LogFormat, ObservabilityConfig};
use persistence::MemorySink;

const DOCUMENTS: &[&str] = &[
    r#"{"time":"2024-05-01T12:00:00Z","device":{"device_id":"th-01","name":"greenhouse","device_type":"TempRH","temp":21.5,"rh":48}}"#,
    r#"{"time":"2024-05-01T12:00:01Z","device":{"device_id":"th-02""#,
    r#"{"time":"2024-05-01T12:00:02Z","device":{"device_id":"th-02","name":"cellar","device_type":"TempRH","temp":12.0,"rh":0}}"#,
    r#"{"time":"2024-05-01T12:00:03Z","device":{"device_id":"v-7","name":"valve","device_type":"Valve","open":true}}"#,
];

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    observability::init_with_config(ObservabilityConfig {
        log_format: LogFormat::Compact,
        ..Default::default()
    })?;

    tracing::info!("Starting Mock Pipeline Demo");

    // ==== Stage 1: Use default config or load from file ====
    let config = match std::env::args().nth(1) {
        Some(path) => {
            tracing::info!(path = %path, "Loading service config");
            ConfigLoader::load_from_path(std::path::Path::new(&path))?
        }
        None => ServiceConfig::default(),
    };

    // ==== Stage 2: Wire the controller with in-memory collaborators ====
    let bus = MockBus::default();
    let publisher = bus.handle();
    let sink = MemorySink::new("memory");
    let records = sink.handle();

    let mut controller = LifecycleController::new(
        bus,
        sink,
        DeviceCodec::default(),
        ControllerConfig::from(&config),
    );
    controller.start().await?;

    // ==== Stage 3: Publish raw payloads ====
    for doc in DOCUMENTS {
        publisher.publish(&config.bus.topic, doc.as_bytes().to_vec()).await;
    }
    tokio::time::sleep(Duration::from_millis(100)).await;

    // ==== Stage 4: Shutdown and report ====
    let report = controller.shutdown(StopReason::Signal).await;

    for message in records.records() {
        println!("{message}");
    }
    println!("{}", report.metrics);
    tracing::info!(reason = %report.reason, "Mock Pipeline Demo finished");
    Ok(())
}
