//! Receive stage: subscription → decode queue

use async_channel::Sender;
use contracts::{RawMessage, Subscription};
use tracing::{debug, info, instrument, trace, warn};

use super::{hand_off, HandOff, StageContext, DECODE, RECEIVE};
use crate::state::StopReason;

/// Pull deliveries until cancelled or the subscription closes
///
/// Cancellation stops pulling immediately; deliveries still buffered in the
/// subscription are never taken. Returning drops `tx`, closing the decode
/// queue.
#[instrument(
    name = "receive_stage",
    skip(subscription, tx, ctx),
    fields(topic = %subscription.topic())
)]
pub(crate) async fn receive_stage(
    subscription: Subscription,
    tx: Sender<RawMessage>,
    ctx: StageContext,
) {
    debug!(stage = RECEIVE, "receive stage started");

    loop {
        let delivery = tokio::select! {
            biased;
            _ = ctx.token.cancelled() => {
                info!(
                    stage = RECEIVE,
                    buffered = subscription.len(),
                    "cancellation observed, no longer accepting deliveries"
                );
                break;
            }
            delivery = subscription.recv() => delivery,
        };

        let Some(raw) = delivery else {
            warn!(stage = RECEIVE, "subscription closed by bus, stopping pipeline");
            ctx.request_stop(StopReason::SubscriptionClosed);
            break;
        };

        ctx.metrics.record_received();
        observability::record_message_received(&raw.topic);
        trace!(stage = RECEIVE, bytes = raw.payload.len(), "delivery received");

        if hand_off(&tx, raw, &ctx, DECODE).await == HandOff::Closed {
            ctx.request_stop(StopReason::StageFailure);
            break;
        }
        observability::record_queue_depth(DECODE, tx.len());
    }

    debug!(stage = RECEIVE, "receive stage stopped");
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::PipelineConfig;
    use crate::stages::test_support::context;

    #[tokio::test]
    async fn test_forwards_in_order_until_cancelled() {
        let ctx = context(PipelineConfig::default());
        let (bus_tx, bus_rx) = async_channel::bounded(8);
        let (tx, rx) = async_channel::bounded(8);

        for i in 0..3 {
            bus_tx
                .send(RawMessage::new("t", format!("m{i}")))
                .await
                .unwrap();
        }

        let stage = tokio::spawn(receive_stage(
            Subscription::new("t", bus_rx),
            tx,
            ctx.clone(),
        ));

        for i in 0..3 {
            let raw = rx.recv().await.unwrap();
            assert_eq!(raw.payload, format!("m{i}").into_bytes());
        }

        ctx.token.cancel();
        stage.await.unwrap();

        // Decode queue closed once the stage exits
        assert!(rx.recv().await.is_err());
        assert_eq!(ctx.metrics.snapshot().received, 3);
        assert_eq!(ctx.state.stop_reason(), None);
    }

    #[tokio::test]
    async fn test_closed_subscription_cancels_pipeline() {
        let ctx = context(PipelineConfig::default());
        let (bus_tx, bus_rx) = async_channel::bounded::<RawMessage>(1);
        let (tx, _rx) = async_channel::bounded(1);
        drop(bus_tx);

        receive_stage(Subscription::new("t", bus_rx), tx, ctx.clone()).await;

        assert!(ctx.token.is_cancelled());
        assert_eq!(ctx.state.stop_reason(), Some(StopReason::SubscriptionClosed));
    }
}
