//! CLI argument definitions using clap.

use clap::{Parser, Subcommand, ValueEnum};
use std::path::PathBuf;

/// Telemetry Ingest - IoT device message ingestion service
#[derive(Parser, Debug)]
#[command(
    name = "telemetry-ingest",
    author,
    version,
    about = "IoT device telemetry ingestion service",
    long_about = "Subscribes to a message bus topic, decodes device telemetry documents \n\
                  and persists them to the configured storage backend.\n\n\
                  Malformed payloads are logged and skipped; shutdown drains in-flight messages."
)]
pub struct Cli {
    /// Increase logging verbosity (-v for debug, -vv for trace)
    #[arg(short, long, action = clap::ArgAction::Count, global = true, env = "TELEMETRY_INGEST_VERBOSE")]
    pub verbose: u8,

    /// Suppress all output except warnings and errors
    #[arg(short, long, global = true, conflicts_with = "verbose")]
    pub quiet: bool,

    /// Log output format
    #[arg(
        long,
        value_enum,
        default_value = "pretty",
        global = true,
        env = "TELEMETRY_INGEST_LOG_FORMAT"
    )]
    pub log_format: LogFormat,

    #[command(subcommand)]
    pub command: Commands,
}

/// Available CLI commands
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Run the ingestion service until SIGINT/SIGTERM
    Run(RunArgs),

    /// Validate configuration file without running
    Validate(ValidateArgs),

    /// Decode one wire document and print it
    Decode(DecodeArgs),
}

/// Arguments for the `run` command
#[derive(Parser, Debug, Clone, Default)]
pub struct RunArgs {
    /// Path to configuration file (TOML or JSON); defaults apply when omitted
    #[arg(short, long, env = "TELEMETRY_INGEST_CONFIG")]
    pub config: Option<PathBuf>,

    /// Override broker URL
    #[arg(long, env = "MQTT_BROKER")]
    pub broker: Option<String>,

    /// Override MQTT client id
    #[arg(long, env = "MQTT_CLIENT_ID")]
    pub client_id: Option<String>,

    /// Override subscribed topic
    #[arg(long, env = "MQTT_TOPIC")]
    pub topic: Option<String>,

    /// Override storage backend
    #[arg(long, value_enum)]
    pub sink: Option<SinkArg>,

    /// Output file for the file sink
    #[arg(long, env = "TELEMETRY_INGEST_OUTPUT")]
    pub output: Option<PathBuf>,

    /// Override PostgreSQL host
    #[arg(long, env = "POSTGRES_HOST")]
    pub pg_host: Option<String>,

    /// Override PostgreSQL port
    #[arg(long, env = "POSTGRES_PORT")]
    pub pg_port: Option<u16>,

    /// Override PostgreSQL database
    #[arg(long, env = "POSTGRES_DB")]
    pub pg_database: Option<String>,

    /// Override PostgreSQL user
    #[arg(long, env = "POSTGRES_USER")]
    pub pg_user: Option<String>,

    /// Override PostgreSQL password
    #[arg(long, env = "POSTGRES_PASSWORD", hide_env_values = true)]
    pub pg_password: Option<String>,

    /// Override hand-off queue capacity
    #[arg(long, env = "TELEMETRY_INGEST_QUEUE_CAPACITY")]
    pub queue_capacity: Option<usize>,

    /// Stop after this many consecutive persistence failures
    #[arg(long, env = "TELEMETRY_INGEST_MAX_FAILURES")]
    pub max_consecutive_failures: Option<u32>,

    /// Metrics server port (0 = disabled)
    #[arg(long, default_value = "0", env = "TELEMETRY_INGEST_METRICS_PORT")]
    pub metrics_port: u16,

    /// Validate configuration and exit without connecting
    #[arg(long)]
    pub dry_run: bool,
}

/// Arguments for the `validate` command
#[derive(Parser, Debug)]
pub struct ValidateArgs {
    /// Path to configuration file to validate
    #[arg(short, long, default_value = "telemetry.toml")]
    pub config: PathBuf,

    /// Output validation result as JSON
    #[arg(long)]
    pub json: bool,
}

/// Arguments for the `decode` command
#[derive(Parser, Debug)]
pub struct DecodeArgs {
    /// Wire document to decode (reads stdin when omitted)
    pub file: Option<PathBuf>,

    /// Print only the decoded message as JSON
    #[arg(long)]
    pub json: bool,
}

/// Storage backend selectable on the command line
#[derive(ValueEnum, Clone, Copy, Debug, PartialEq, Eq)]
pub enum SinkArg {
    Log,
    File,
    Postgres,
}

impl From<SinkArg> for contracts::SinkType {
    fn from(arg: SinkArg) -> Self {
        match arg {
            SinkArg::Log => Self::Log,
            SinkArg::File => Self::File,
            SinkArg::Postgres => Self::Postgres,
        }
    }
}

/// Log output format
#[derive(ValueEnum, Clone, Copy, Debug, Default)]
pub enum LogFormat {
    /// JSON structured logging
    Json,
    /// Human-readable pretty format
    #[default]
    Pretty,
    /// Compact single-line format
    Compact,
}

impl From<LogFormat> for observability::LogFormat {
    fn from(format: LogFormat) -> Self {
        match format {
            LogFormat::Json => Self::Json,
            LogFormat::Pretty => Self::Pretty,
            LogFormat::Compact => Self::Compact,
        }
    }
}
