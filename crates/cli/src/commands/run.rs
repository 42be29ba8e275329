//! `run` command implementation.

use std::time::Instant;

use anyhow::{Context, Result};
use bus_client::MqttBus;
use codec::DeviceCodec;
use config_loader::ConfigLoader;
use contracts::ServiceConfig;
use ingestion::{ControllerConfig, LifecycleController};
use tracing::{info, warn};

use crate::cli::RunArgs;
use crate::error::CliError;
use crate::report::print_summary;

/// Execute the `run` command
pub async fn run_service(args: &RunArgs) -> Result<()> {
    let config = load_config(args)?;

    info!(
        broker = %config.bus.broker,
        client_id = %config.bus.client_id,
        topic = %config.bus.topic,
        sink = %config.storage.sink_type,
        queue_capacity = config.pipeline.queue_capacity,
        "Configuration loaded"
    );

    // Dry run - just validate and exit
    if args.dry_run {
        info!("Dry run mode - configuration is valid, exiting");
        print_config_summary(&config);
        return Ok(());
    }

    let bus = MqttBus::new(config.bus.clone(), config.pipeline.queue_capacity);
    let sink = persistence::create_sink(&config.storage)
        .with_context(|| format!("Failed to create '{}' sink", config.storage.sink_type))?;
    let controller = LifecycleController::new(
        bus,
        sink,
        DeviceCodec::default(),
        ControllerConfig::from(&config),
    );

    info!("Starting ingestion...");
    let started = Instant::now();
    let report = controller
        .run_until(setup_shutdown_signal())
        .await
        .context("Failed to start ingestion")?;

    print_summary(&report, started.elapsed());

    if !report.is_success() {
        return Err(CliError::unsuccessful(report.reason).into());
    }

    info!("Telemetry ingest finished");
    Ok(())
}

/// Load the config file (if any) and apply CLI overrides
pub fn load_config(args: &RunArgs) -> Result<ServiceConfig> {
    let mut config = match &args.config {
        Some(path) => {
            if !path.exists() {
                return Err(CliError::config_not_found(path).into());
            }
            info!(config = %path.display(), "Loading configuration");
            ConfigLoader::load_from_path(path)
                .with_context(|| format!("Failed to load config from {}", path.display()))?
        }
        None => {
            info!("No configuration file given, using defaults");
            ServiceConfig::default()
        }
    };

    apply_overrides(&mut config, args);
    ConfigLoader::validate(&config).map_err(|e| CliError::config_validation(e.to_string()))?;
    Ok(config)
}

fn apply_overrides(config: &mut ServiceConfig, args: &RunArgs) {
    if let Some(broker) = &args.broker {
        info!(broker = %broker, "Overriding broker from CLI");
        config.bus.broker.clone_from(broker);
    }
    if let Some(client_id) = &args.client_id {
        config.bus.client_id.clone_from(client_id);
    }
    if let Some(topic) = &args.topic {
        config.bus.topic.clone_from(topic);
    }
    if let Some(sink) = args.sink {
        config.storage.sink_type = sink.into();
    }
    if let Some(output) = &args.output {
        config.storage.path = Some(output.clone());
    }

    let postgres = &mut config.storage.postgres;
    if let Some(host) = &args.pg_host {
        postgres.host.clone_from(host);
    }
    if let Some(port) = args.pg_port {
        postgres.port = port;
    }
    if let Some(database) = &args.pg_database {
        postgres.database.clone_from(database);
    }
    if let Some(user) = &args.pg_user {
        postgres.username.clone_from(user);
    }
    if let Some(password) = &args.pg_password {
        postgres.password.clone_from(password);
    }

    if let Some(capacity) = args.queue_capacity {
        config.pipeline.queue_capacity = capacity;
    }
    if let Some(threshold) = args.max_consecutive_failures {
        config.pipeline.max_consecutive_failures = Some(threshold);
    }
}

/// Resolve on Ctrl+C or SIGTERM
async fn setup_shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            warn!(error = %e, "Failed to listen for Ctrl+C");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                warn!(error = %e, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}

/// Print configuration summary for dry-run mode
fn print_config_summary(config: &ServiceConfig) {
    println!("\n=== Configuration Summary ===\n");
    println!("Bus:");
    println!("  Broker: {}", config.bus.broker);
    println!("  Client id: {}", config.bus.client_id);
    println!("  Topic: {} (QoS {})", config.bus.topic, config.bus.qos);
    println!("\nPipeline:");
    println!("  Queue capacity: {}", config.pipeline.queue_capacity);
    println!("  Overflow policy: {:?}", config.pipeline.overflow_policy);
    match config.pipeline.max_consecutive_failures {
        Some(n) => println!("  Failure threshold: {n}"),
        None => println!("  Failure threshold: disabled"),
    }
    println!("\nStorage:");
    println!("  Sink: {} ({})", config.storage.name, config.storage.sink_type);
    if let Some(path) = &config.storage.path {
        println!("  Path: {}", path.display());
    }
    if config.storage.sink_type == contracts::SinkType::Postgres {
        let pg = &config.storage.postgres;
        println!("  PostgreSQL: {}@{}:{}/{}", pg.username, pg.host, pg.port, pg.database);
    }
    println!();
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cli::SinkArg;
    use contracts::SinkType;

    #[test]
    fn test_defaults_without_config_file() {
        let config = load_config(&RunArgs::default()).unwrap();
        assert_eq!(config.bus.topic, "iot-messages");
        assert_eq!(config.storage.sink_type, SinkType::Log);
    }

    #[test]
    fn test_overrides_applied_and_validated() {
        let args = RunArgs {
            topic: Some("factory/+/telemetry".to_string()),
            sink: Some(SinkArg::Postgres),
            pg_host: Some("db.internal".to_string()),
            pg_port: Some(6543),
            max_consecutive_failures: Some(10),
            ..Default::default()
        };
        let config = load_config(&args).unwrap();
        assert_eq!(config.bus.topic, "factory/+/telemetry");
        assert_eq!(config.storage.sink_type, SinkType::Postgres);
        assert_eq!(config.storage.postgres.host, "db.internal");
        assert_eq!(config.storage.postgres.port, 6543);
        assert_eq!(config.pipeline.max_consecutive_failures, Some(10));
    }

    #[test]
    fn test_file_sink_override_without_output_rejected() {
        let args = RunArgs {
            sink: Some(SinkArg::File),
            ..Default::default()
        };
        let err = load_config(&args).unwrap_err();
        assert!(err.to_string().contains("storage.path"));
    }

    #[test]
    fn test_missing_config_file() {
        let args = RunArgs {
            config: Some("does/not/exist.toml".into()),
            ..Default::default()
        };
        let err = load_config(&args).unwrap_err();
        assert!(err.downcast_ref::<CliError>().is_some());
    }
}
