//! Decode stage: raw payload → `DeviceMessage`

use async_channel::{Receiver, Sender};
use codec::DeviceCodec;
use contracts::{DeviceMessage, RawMessage};
use tracing::{debug, info, instrument, trace, warn};

use super::{hand_off, HandOff, StageContext, DECODE, PERSIST};
use crate::state::StopReason;

/// Decode every raw message until the receive stage closes the queue
///
/// Malformed payloads are logged with an excerpt and dropped.
#[instrument(name = "decode_stage", skip_all)]
pub(crate) async fn decode_stage(
    rx: Receiver<RawMessage>,
    tx: Sender<DeviceMessage>,
    codec: DeviceCodec,
    ctx: StageContext,
) {
    debug!(stage = DECODE, "decode stage started");
    let mut draining = false;

    loop {
        let raw = tokio::select! {
            item = rx.recv() => match item {
                Ok(raw) => raw,
                Err(_) => break,
            },
            _ = ctx.token.cancelled(), if !draining => {
                draining = true;
                info!(stage = DECODE, pending = rx.len(), "draining");
                continue;
            }
        };
        observability::record_queue_depth(DECODE, rx.len());

        let message = match codec.decode(&raw.payload) {
            Ok(message) => message,
            Err(e) => {
                ctx.metrics.record_decode_failure();
                observability::record_decode_failure();
                warn!(
                    stage = DECODE,
                    topic = %raw.topic,
                    received_at = %raw.received_at,
                    error = %e,
                    payload = %raw.payload_excerpt(ctx.config.payload_excerpt_bytes),
                    "malformed payload dropped"
                );
                continue;
            }
        };

        ctx.metrics.record_decoded();
        observability::record_message_decoded(message.device_type());
        trace!(
            stage = DECODE,
            device_id = %message.device_id,
            device_type = %message.device_type(),
            "decoded"
        );

        if hand_off(&tx, message, &ctx, PERSIST).await == HandOff::Closed {
            ctx.request_stop(StopReason::StageFailure);
            break;
        }
    }

    debug!(stage = DECODE, "decode stage stopped");
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::PipelineConfig;
    use crate::stages::test_support::context;

    fn doc(device_id: &str) -> String {
        format!(
            r#"{{"time":"2024-01-01T00:00:00Z","device":{{"device_id":"{device_id}","name":"n","device_type":"TempRH","temp":20.5}}}}"#
        )
    }

    #[tokio::test]
    async fn test_malformed_item_dropped_others_kept() {
        let ctx = context(PipelineConfig::default());
        let (in_tx, in_rx) = async_channel::bounded(8);
        let (out_tx, out_rx) = async_channel::bounded(8);

        in_tx.send(RawMessage::new("t", doc("a"))).await.unwrap();
        in_tx.send(RawMessage::new("t", "{broken")).await.unwrap();
        in_tx.send(RawMessage::new("t", doc("b"))).await.unwrap();
        drop(in_tx);

        decode_stage(in_rx, out_tx, DeviceCodec::default(), ctx.clone()).await;

        let ids: Vec<String> = std::iter::from_fn(|| out_rx.try_recv().ok())
            .map(|m| m.device_id)
            .collect();
        assert_eq!(ids, vec!["a", "b"]);

        let snapshot = ctx.metrics.snapshot();
        assert_eq!(snapshot.decoded, 2);
        assert_eq!(snapshot.decode_failures, 1);
    }

    #[tokio::test]
    async fn test_drains_queue_after_cancellation() {
        let ctx = context(PipelineConfig::default());
        let (in_tx, in_rx) = async_channel::bounded(8);
        let (out_tx, out_rx) = async_channel::bounded(8);

        for id in ["a", "b", "c"] {
            in_tx.send(RawMessage::new("t", doc(id))).await.unwrap();
        }
        ctx.token.cancel();
        drop(in_tx);

        decode_stage(in_rx, out_tx, DeviceCodec::default(), ctx.clone()).await;

        assert_eq!(out_rx.len(), 3);
        assert_eq!(ctx.metrics.snapshot().decoded, 3);
    }
}
