//! Persist stage: `DeviceMessage` → record sink

use std::time::Instant;

use async_channel::Receiver;
use contracts::{DeviceMessage, RecordSink};
use tracing::{debug, error, info, instrument, trace};

use super::{StageContext, PERSIST};
use crate::state::StopReason;

/// Write every decoded message until the decode stage closes the queue
///
/// The sink is flushed (not closed) on exit and handed back, so the
/// controller can close it after the pipeline is `Stopped`.
#[instrument(name = "persist_stage", skip_all, fields(sink = %sink.name()))]
pub(crate) async fn persist_stage<S: RecordSink>(
    rx: Receiver<DeviceMessage>,
    mut sink: S,
    ctx: StageContext,
) -> S {
    let sink_name = sink.name().to_string();
    debug!(stage = PERSIST, sink = %sink_name, "persist stage started");

    let mut draining = false;
    let mut consecutive_failures: u32 = 0;

    loop {
        let message = tokio::select! {
            item = rx.recv() => match item {
                Ok(message) => message,
                Err(_) => break,
            },
            _ = ctx.token.cancelled(), if !draining => {
                draining = true;
                info!(stage = PERSIST, pending = rx.len(), "draining");
                continue;
            }
        };
        observability::record_queue_depth(PERSIST, rx.len());

        let started = Instant::now();
        match sink.create_record(&message).await {
            Ok(()) => {
                let elapsed = started.elapsed();
                consecutive_failures = 0;
                ctx.metrics.record_persisted(elapsed);
                observability::record_persist_result(&sink_name, true);
                observability::record_persist_latency_ms(
                    &sink_name,
                    elapsed.as_secs_f64() * 1000.0,
                );
                trace!(stage = PERSIST, device_id = %message.device_id, "persisted");
            }
            Err(e) => {
                consecutive_failures = consecutive_failures.saturating_add(1);
                ctx.metrics.record_persist_failure();
                observability::record_persist_result(&sink_name, false);
                error!(
                    stage = PERSIST,
                    sink = %sink_name,
                    device_id = %message.device_id,
                    device_type = %message.device_type(),
                    time = %message.time,
                    consecutive_failures,
                    error = %e,
                    "persist failed, record dropped"
                );

                if let Some(threshold) = ctx.config.max_consecutive_failures {
                    if consecutive_failures >= threshold && !ctx.token.is_cancelled() {
                        error!(
                            stage = PERSIST,
                            threshold, "consecutive persistence failures reached threshold, stopping pipeline"
                        );
                        ctx.request_stop(StopReason::PersistFailureThreshold);
                    }
                }
            }
        }
    }

    if let Err(e) = sink.flush().await {
        error!(stage = PERSIST, sink = %sink_name, error = %e, "flush failed on drain");
    }

    debug!(stage = PERSIST, sink = %sink_name, "persist stage stopped");
    sink
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::PipelineConfig;
    use crate::stages::test_support::context;
    use contracts::{ContractError, DeviceRecord};

    /// Mock sink for testing
    #[derive(Default)]
    struct MockSink {
        written: Vec<String>,
        fail_ids: Vec<&'static str>,
        flushed: bool,
    }

    impl RecordSink for MockSink {
        fn name(&self) -> &str {
            "mock"
        }

        async fn ensure_ready(&mut self) -> Result<(), ContractError> {
            Ok(())
        }

        async fn create_record(&mut self, message: &DeviceMessage) -> Result<(), ContractError> {
            if self.fail_ids.contains(&message.device_id.as_str()) {
                return Err(ContractError::persistence("mock", "injected failure"));
            }
            self.written.push(message.device_id.clone());
            Ok(())
        }

        async fn flush(&mut self) -> Result<(), ContractError> {
            self.flushed = true;
            Ok(())
        }

        async fn close(&mut self) -> Result<(), ContractError> {
            Ok(())
        }
    }

    fn message(device_id: &str) -> DeviceMessage {
        DeviceMessage::new(
            "2024-01-01T00:00:00Z".parse().unwrap(),
            DeviceRecord::new(device_id, "n", "Unknown42"),
        )
    }

    #[tokio::test]
    async fn test_failure_isolation() {
        let ctx = context(PipelineConfig::default());
        let (tx, rx) = async_channel::bounded(8);
        for id in ["a", "bad", "b"] {
            tx.send(message(id)).await.unwrap();
        }
        drop(tx);

        let sink = MockSink {
            fail_ids: vec!["bad"],
            ..Default::default()
        };
        let sink = persist_stage(rx, sink, ctx.clone()).await;

        assert_eq!(sink.written, vec!["a", "b"]);
        assert!(sink.flushed);
        assert!(!ctx.token.is_cancelled());
        assert_eq!(ctx.metrics.snapshot().persist_failures, 1);
    }

    #[tokio::test]
    async fn test_threshold_cancels_pipeline() {
        let ctx = context(PipelineConfig {
            max_consecutive_failures: Some(2),
            ..Default::default()
        });
        let (tx, rx) = async_channel::bounded(8);
        for id in ["x", "y", "ok"] {
            tx.send(message(id)).await.unwrap();
        }
        drop(tx);

        let sink = MockSink {
            fail_ids: vec!["x", "y"],
            ..Default::default()
        };
        let sink = persist_stage(rx, sink, ctx.clone()).await;

        assert!(ctx.token.is_cancelled());
        assert_eq!(
            ctx.state.stop_reason(),
            Some(StopReason::PersistFailureThreshold)
        );
        // Items already queued are still drained
        assert_eq!(sink.written, vec!["ok"]);
    }

    #[tokio::test]
    async fn test_success_resets_failure_streak() {
        let ctx = context(PipelineConfig {
            max_consecutive_failures: Some(2),
            ..Default::default()
        });
        let (tx, rx) = async_channel::bounded(8);
        for id in ["x", "ok", "y"] {
            tx.send(message(id)).await.unwrap();
        }
        drop(tx);

        let sink = MockSink {
            fail_ids: vec!["x", "y"],
            ..Default::default()
        };
        persist_stage(rx, sink, ctx.clone()).await;

        assert!(!ctx.token.is_cancelled());
    }
}
