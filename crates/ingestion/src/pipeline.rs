//! Ingestion Pipeline main entry

use std::sync::Arc;

use async_channel::bounded;
use codec::DeviceCodec;
use contracts::{RecordSink, Subscription};
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, instrument};

use crate::config::{MetricsSnapshot, PipelineConfig, PipelineMetrics};
use crate::error::{IngestionError, Result};
use crate::stages::{decode_stage, persist_stage, receive_stage, StageContext, DECODE, PERSIST, RECEIVE};
use crate::state::{PipelineState, StateTracker, StopReason};

/// Ingestion Pipeline
///
/// receive → decode → persist, one task per stage, connected by bounded
/// queues and coordinated by a single cancellation token.
pub struct IngestionPipeline {
    config: Arc<PipelineConfig>,
    codec: DeviceCodec,
    metrics: Arc<PipelineMetrics>,
    token: CancellationToken,
    state: StateTracker,
}

impl IngestionPipeline {
    /// Create new Ingestion Pipeline in `Idle`
    pub fn new(config: PipelineConfig, codec: DeviceCodec) -> Self {
        Self {
            config: Arc::new(config),
            codec,
            metrics: Arc::new(PipelineMetrics::new()),
            token: CancellationToken::new(),
            state: StateTracker::new(),
        }
    }

    /// Current state
    pub fn state(&self) -> PipelineState {
        self.state.current()
    }

    /// Watch state transitions
    pub fn watch_state(&self) -> watch::Receiver<PipelineState> {
        self.state.subscribe()
    }

    /// Pipeline-wide cancellation token
    pub fn cancellation_token(&self) -> CancellationToken {
        self.token.clone()
    }

    /// Get metrics reference
    pub fn metrics(&self) -> Arc<PipelineMetrics> {
        self.metrics.clone()
    }

    pub fn snapshot(&self) -> MetricsSnapshot {
        self.metrics.snapshot()
    }

    /// Reason the pipeline stopped (or is stopping)
    pub fn stop_reason(&self) -> Option<StopReason> {
        self.state.stop_reason()
    }

    /// Record the stop reason without cancelling yet
    pub fn note_stop_reason(&self, reason: StopReason) {
        self.state.note_stop_reason(reason);
    }

    /// Request cancellation; one-shot, later calls only keep the first reason
    pub fn stop(&self, reason: StopReason) {
        self.state.note_stop_reason(reason);
        self.token.cancel();
    }

    /// Spawn the stages and transition `Idle → Running`
    ///
    /// # Errors
    /// `AlreadyStarted` if the pipeline left `Idle`
    #[instrument(
        name = "pipeline_start",
        skip(self, subscription, sink),
        fields(topic = %subscription.topic(), queue_capacity = self.config.queue_capacity)
    )]
    pub fn start<S>(&self, subscription: Subscription, sink: S) -> Result<PipelineHandle<S>>
    where
        S: RecordSink + 'static,
    {
        if !self.state.transition(PipelineState::Running) {
            return Err(IngestionError::AlreadyStarted {
                state: self.state.current(),
            });
        }

        let ctx = StageContext {
            config: self.config.clone(),
            metrics: self.metrics.clone(),
            token: self.token.clone(),
            state: self.state.clone(),
        };

        let (decode_tx, decode_rx) = bounded(self.config.queue_capacity);
        let (persist_tx, persist_rx) = bounded(self.config.queue_capacity);

        let receive = tokio::spawn(receive_stage(subscription, decode_tx, ctx.clone()));
        let decode = tokio::spawn(decode_stage(
            decode_rx,
            persist_tx,
            self.codec.clone(),
            ctx.clone(),
        ));
        let persist = tokio::spawn(persist_stage(persist_rx, sink, ctx.clone()));

        let supervisor = tokio::spawn(supervise(ctx, receive, decode, persist));

        info!(overflow_policy = ?self.config.overflow_policy, "pipeline running");
        Ok(PipelineHandle {
            supervisor,
            state: self.state.subscribe(),
        })
    }
}

/// Handle to a running pipeline
pub struct PipelineHandle<S> {
    supervisor: JoinHandle<Result<S>>,
    state: watch::Receiver<PipelineState>,
}

impl<S> PipelineHandle<S> {
    /// Current state
    pub fn state(&self) -> PipelineState {
        *self.state.borrow()
    }

    /// Wait until every stage has exited and hand the sink back
    ///
    /// Does not cancel; pair with `IngestionPipeline::stop`.
    pub async fn wait_stopped(self) -> Result<S> {
        match self.supervisor.await {
            Ok(result) => result,
            Err(e) => Err(IngestionError::stage_failed("supervisor", e.to_string())),
        }
    }
}

/// Drive `Running → Draining → Stopped`
///
/// Draining starts on cancellation, or when the receive stage exits on its
/// own. Stopped is published only after all three stage tasks are joined.
async fn supervise<S>(
    ctx: StageContext,
    mut receive: JoinHandle<()>,
    decode: JoinHandle<()>,
    persist: JoinHandle<S>,
) -> Result<S> {
    let mut receive_result = None;
    tokio::select! {
        _ = ctx.token.cancelled() => {}
        result = &mut receive => {
            receive_result = Some(result);
            ctx.request_stop(StopReason::StageFailure);
        }
    }
    ctx.state.transition(PipelineState::Draining);
    info!(reason = ?ctx.state.stop_reason(), "pipeline draining");

    let receive_result = match receive_result {
        Some(result) => result,
        None => receive.await,
    };
    let mut stage_failed = false;
    if let Err(e) = receive_result {
        error!(stage = RECEIVE, error = %e, "stage task failed");
        stage_failed = true;
    }
    if let Err(e) = decode.await {
        error!(stage = DECODE, error = %e, "stage task failed");
        stage_failed = true;
    }
    let persist_result = persist.await;
    if let Err(e) = &persist_result {
        error!(stage = PERSIST, error = %e, "stage task failed");
        stage_failed = true;
    }
    if stage_failed {
        ctx.state.note_stop_reason(StopReason::StageFailure);
    }

    ctx.state.transition(PipelineState::Stopped);
    info!(metrics = ?ctx.metrics.snapshot(), "pipeline stopped");

    persist_result.map_err(|e| IngestionError::stage_failed(PERSIST, e.to_string()))
}
