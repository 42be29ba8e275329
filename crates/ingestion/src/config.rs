//! Pipeline configuration and metrics

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Mutex;
use std::time::Duration;

use contracts::{OverflowPolicy, PipelineSettings, ServiceConfig};
use observability::{RunningStats, StatsSummary};

/// Default payload excerpt length in failure logs
pub const DEFAULT_PAYLOAD_EXCERPT_BYTES: usize = 256;

/// Pipeline configuration
#[derive(Debug, Clone)]
pub struct PipelineConfig {
    /// Capacity of each hand-off queue
    pub queue_capacity: usize,

    /// Policy applied when a hand-off queue is full
    pub overflow_policy: OverflowPolicy,

    /// Consecutive persistence failures that stop the pipeline
    pub max_consecutive_failures: Option<u32>,

    /// Bytes of raw payload included in decode-failure logs
    pub payload_excerpt_bytes: usize,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            queue_capacity: 100,
            overflow_policy: OverflowPolicy::Block,
            max_consecutive_failures: None,
            payload_excerpt_bytes: DEFAULT_PAYLOAD_EXCERPT_BYTES,
        }
    }
}

impl From<&PipelineSettings> for PipelineConfig {
    fn from(settings: &PipelineSettings) -> Self {
        Self {
            queue_capacity: settings.queue_capacity.max(1),
            overflow_policy: settings.overflow_policy,
            max_consecutive_failures: settings.max_consecutive_failures,
            ..Default::default()
        }
    }
}

/// Lifecycle controller configuration
#[derive(Debug, Clone)]
pub struct ControllerConfig {
    /// Topic to subscribe to
    pub topic: String,

    /// Grace period handed to the bus on disconnect
    pub disconnect_timeout: Duration,

    /// Pipeline settings
    pub pipeline: PipelineConfig,
}

impl Default for ControllerConfig {
    fn default() -> Self {
        Self {
            topic: "iot-messages".to_string(),
            disconnect_timeout: Duration::from_millis(250),
            pipeline: PipelineConfig::default(),
        }
    }
}

impl From<&ServiceConfig> for ControllerConfig {
    fn from(config: &ServiceConfig) -> Self {
        Self {
            topic: config.bus.topic.clone(),
            disconnect_timeout: config.bus.disconnect_timeout(),
            pipeline: PipelineConfig::from(&config.pipeline),
        }
    }
}

/// Pipeline counters
///
/// Shared by all stages; every counter is monotonically increasing.
#[derive(Debug, Default)]
pub struct PipelineMetrics {
    received: AtomicU64,
    decoded: AtomicU64,
    decode_failures: AtomicU64,
    persisted: AtomicU64,
    persist_failures: AtomicU64,
    dropped: AtomicU64,
    persist_latency_ms: Mutex<RunningStats>,
}

impl PipelineMetrics {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record_received(&self) {
        self.received.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_decoded(&self) {
        self.decoded.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_decode_failure(&self) {
        self.decode_failures.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_persisted(&self, latency: Duration) {
        self.persisted.fetch_add(1, Ordering::Relaxed);
        if let Ok(mut stats) = self.persist_latency_ms.lock() {
            stats.push(latency.as_secs_f64() * 1000.0);
        }
    }

    pub fn record_persist_failure(&self) {
        self.persist_failures.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_dropped(&self) {
        self.dropped.fetch_add(1, Ordering::Relaxed);
    }

    /// Get snapshot
    pub fn snapshot(&self) -> MetricsSnapshot {
        let persist_latency_ms = self
            .persist_latency_ms
            .lock()
            .map(|stats| stats.summary())
            .unwrap_or_default();

        MetricsSnapshot {
            received: self.received.load(Ordering::Relaxed),
            decoded: self.decoded.load(Ordering::Relaxed),
            decode_failures: self.decode_failures.load(Ordering::Relaxed),
            persisted: self.persisted.load(Ordering::Relaxed),
            persist_failures: self.persist_failures.load(Ordering::Relaxed),
            dropped: self.dropped.load(Ordering::Relaxed),
            persist_latency_ms,
        }
    }
}

/// Metrics snapshot
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct MetricsSnapshot {
    /// Raw messages taken from the subscription
    pub received: u64,
    /// Messages decoded
    pub decoded: u64,
    /// Malformed payloads dropped
    pub decode_failures: u64,
    /// Records written
    pub persisted: u64,
    /// Records that failed to write
    pub persist_failures: u64,
    /// Items dropped on a full queue
    pub dropped: u64,
    /// Write latency
    pub persist_latency_ms: StatsSummary,
}

impl MetricsSnapshot {
    /// Items that entered the pipeline but neither persisted nor failed
    pub fn unaccounted(&self) -> u64 {
        self.received.saturating_sub(
            self.persisted + self.persist_failures + self.decode_failures + self.dropped,
        )
    }
}

impl std::fmt::Display for MetricsSnapshot {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        writeln!(f, "=== Ingestion Summary ===")?;
        writeln!(f, "Received: {}", self.received)?;
        writeln!(
            f,
            "Decoded: {} (malformed: {})",
            self.decoded, self.decode_failures
        )?;
        writeln!(
            f,
            "Persisted: {} (failed: {})",
            self.persisted, self.persist_failures
        )?;
        writeln!(f, "Dropped (queue full): {}", self.dropped)?;
        write!(f, "Persist latency (ms): {}", self.persist_latency_ms)
    }
}
