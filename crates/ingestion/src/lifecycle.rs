//! Lifecycle controller
//!
//! Startup: connect → storage readiness → subscribe → pipeline `Running`.
//! Shutdown (strict order): unsubscribe → cancel → wait `Stopped` → close
//! sink → disconnect bus. Cleanup failures are logged and collected, never
//! propagated.

use std::future::Future;

use codec::DeviceCodec;
use contracts::{ContractError, MessageBus, RecordSink};
use tokio_util::sync::CancellationToken;
use tracing::{error, info, instrument, warn};

use crate::config::{ControllerConfig, MetricsSnapshot};
use crate::error::{IngestionError, Result};
use crate::pipeline::{IngestionPipeline, PipelineHandle};
use crate::state::{PipelineState, StopReason};

/// Outcome of a completed shutdown
#[derive(Debug)]
pub struct ShutdownReport {
    /// Why the pipeline stopped
    pub reason: StopReason,
    /// Final pipeline counters
    pub metrics: MetricsSnapshot,
    /// Best-effort cleanup failures, in the order they happened
    pub errors: Vec<ContractError>,
}

impl ShutdownReport {
    /// Whether the process should exit with a success status
    ///
    /// Cleanup errors do not affect the exit status.
    pub fn is_success(&self) -> bool {
        self.reason.is_success()
    }
}

/// Owns the bus, the sink and the pipeline for one service run
pub struct LifecycleController<B, S> {
    bus: B,
    sink: Option<S>,
    config: ControllerConfig,
    pipeline: IngestionPipeline,
    handle: Option<PipelineHandle<S>>,
    connected: bool,
    subscribed: bool,
}

impl<B, S> LifecycleController<B, S>
where
    B: MessageBus,
    S: RecordSink + 'static,
{
    pub fn new(bus: B, sink: S, codec: DeviceCodec, config: ControllerConfig) -> Self {
        let pipeline = IngestionPipeline::new(config.pipeline.clone(), codec);
        Self {
            bus,
            sink: Some(sink),
            config,
            pipeline,
            handle: None,
            connected: false,
            subscribed: false,
        }
    }

    pub fn state(&self) -> PipelineState {
        self.pipeline.state()
    }

    pub fn pipeline(&self) -> &IngestionPipeline {
        &self.pipeline
    }

    /// Token cancelled when the pipeline stops, for any reason
    pub fn cancellation_token(&self) -> CancellationToken {
        self.pipeline.cancellation_token()
    }

    pub fn bus(&self) -> &B {
        &self.bus
    }

    /// Connect, check storage, subscribe and start the pipeline
    ///
    /// On failure the partially acquired resources are released and the
    /// pipeline never enters `Running`.
    ///
    /// # Errors
    /// `IngestionError::Startup` wrapping the `ContractError` of the failed step
    #[instrument(
        name = "lifecycle_start",
        skip(self),
        fields(bus = %self.bus.name(), topic = %self.config.topic)
    )]
    pub async fn start(&mut self) -> Result<()> {
        let Some(mut sink) = self.sink.take() else {
            return Err(IngestionError::AlreadyStarted {
                state: self.pipeline.state(),
            });
        };

        if let Err(e) = self.bus.connect().await {
            error!(error = %e, "bus connection failed");
            self.sink = Some(sink);
            return Err(IngestionError::startup("connect", e));
        }
        self.connected = true;
        info!("bus connected");

        if let Err(e) = sink.ensure_ready().await {
            error!(sink = %sink.name(), error = %e, "storage readiness check failed");
            self.sink = Some(sink);
            self.abort_startup().await;
            return Err(IngestionError::startup("storage readiness", e));
        }
        info!(sink = %sink.name(), "storage ready");

        let subscription = match self.bus.subscribe(&self.config.topic).await {
            Ok(subscription) => subscription,
            Err(e) => {
                error!(error = %e, "subscribe failed");
                self.sink = Some(sink);
                self.abort_startup().await;
                return Err(IngestionError::startup("subscribe", e));
            }
        };
        self.subscribed = true;

        self.handle = Some(self.pipeline.start(subscription, sink)?);
        info!("ingestion running");
        Ok(())
    }

    /// Release resources after a failed startup
    async fn abort_startup(&mut self) {
        if let Some(sink) = self.sink.as_mut() {
            if let Err(e) = sink.close().await {
                warn!(error = %e, "sink close failed after aborted startup");
            }
        }
        if self.connected {
            if let Err(e) = self.bus.disconnect(self.config.disconnect_timeout).await {
                warn!(error = %e, "bus disconnect failed after aborted startup");
            }
            self.connected = false;
        }
    }

    /// Run the shutdown sequence
    ///
    /// `reason` is recorded only if the pipeline has not already stopped on
    /// its own.
    #[instrument(name = "lifecycle_shutdown", skip(self), fields(bus = %self.bus.name()))]
    pub async fn shutdown(&mut self, reason: StopReason) -> ShutdownReport {
        let mut errors = Vec::new();
        self.pipeline.note_stop_reason(reason);

        // 1. unsubscribe
        if self.subscribed {
            if let Err(e) = self.bus.unsubscribe(&self.config.topic).await {
                let err = ContractError::shutdown("unsubscribe", e.to_string());
                warn!(error = %err, "shutdown step failed");
                errors.push(err);
            }
            self.subscribed = false;
        }

        // 2. cancel
        self.pipeline.stop(reason);

        // 3. wait for Stopped
        if let Some(handle) = self.handle.take() {
            match handle.wait_stopped().await {
                Ok(sink) => self.sink = Some(sink),
                Err(e) => {
                    let err = ContractError::shutdown("drain", e.to_string());
                    error!(error = %err, "pipeline did not stop cleanly");
                    errors.push(err);
                }
            }
        }

        // 4. close persistence
        if let Some(mut sink) = self.sink.take() {
            if let Err(e) = sink.close().await {
                let err = ContractError::shutdown("close sink", e.to_string());
                warn!(error = %err, "shutdown step failed");
                errors.push(err);
            }
        }

        // 5. disconnect bus
        if self.connected {
            if let Err(e) = self.bus.disconnect(self.config.disconnect_timeout).await {
                let err = ContractError::shutdown("disconnect", e.to_string());
                warn!(error = %err, "shutdown step failed");
                errors.push(err);
            }
            self.connected = false;
        }

        let report = ShutdownReport {
            reason: self.pipeline.stop_reason().unwrap_or(reason),
            metrics: self.pipeline.snapshot(),
            errors,
        };
        info!(
            reason = %report.reason,
            cleanup_errors = report.errors.len(),
            "shutdown complete"
        );
        report
    }

    /// Start, run until `shutdown_signal` resolves or the pipeline stops on
    /// its own, then shut down
    ///
    /// # Errors
    /// Startup errors only; everything after `Running` is reported in the
    /// `ShutdownReport`.
    pub async fn run_until<F>(mut self, shutdown_signal: F) -> Result<ShutdownReport>
    where
        F: Future<Output = ()>,
    {
        self.start().await?;

        let token = self.cancellation_token();
        tokio::select! {
            _ = shutdown_signal => {
                info!("shutdown signal received");
            }
            _ = token.cancelled() => {
                warn!(reason = ?self.pipeline.stop_reason(), "pipeline stopped on its own");
            }
        }

        Ok(self.shutdown(StopReason::Signal).await)
    }
}
