//! Pipeline stages: receive → decode → persist
//!
//! Each stage owns one upstream receiver and one downstream sender. Dropping
//! the sender when a stage exits is what tells the next stage its input is
//! finished.

mod decode;
mod persist;
mod receive;

pub(crate) use decode::decode_stage;
pub(crate) use persist::persist_stage;
pub(crate) use receive::receive_stage;

use std::sync::Arc;

use async_channel::{Sender, TrySendError};
use contracts::OverflowPolicy;
use tokio_util::sync::CancellationToken;
use tracing::{error, warn};

use crate::config::{PipelineConfig, PipelineMetrics};
use crate::state::{StateTracker, StopReason};

pub(crate) const RECEIVE: &str = "receive";
pub(crate) const DECODE: &str = "decode";
pub(crate) const PERSIST: &str = "persist";

/// Shared handles every stage is constructed with
#[derive(Debug, Clone)]
pub(crate) struct StageContext {
    pub config: Arc<PipelineConfig>,
    pub metrics: Arc<PipelineMetrics>,
    pub token: CancellationToken,
    pub state: StateTracker,
}

impl StageContext {
    /// Record why the pipeline is stopping and broadcast cancellation
    pub fn request_stop(&self, reason: StopReason) {
        self.state.note_stop_reason(reason);
        self.token.cancel();
    }
}

/// Outcome of handing an item to the next stage
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum HandOff {
    Sent,
    Dropped,
    Closed,
}

/// Send to the downstream queue, applying the overflow policy
///
/// `Block` waits for space even while draining, since the item has already
/// been pulled from upstream.
pub(crate) async fn hand_off<T>(
    tx: &Sender<T>,
    item: T,
    ctx: &StageContext,
    to_stage: &'static str,
) -> HandOff {
    match ctx.config.overflow_policy {
        OverflowPolicy::Block => match tx.send(item).await {
            Ok(()) => HandOff::Sent,
            Err(_) => {
                error!(stage = to_stage, "hand-off queue closed unexpectedly");
                HandOff::Closed
            }
        },
        OverflowPolicy::DropNewest => match tx.try_send(item) {
            Ok(()) => HandOff::Sent,
            Err(TrySendError::Full(_)) => {
                ctx.metrics.record_dropped();
                observability::record_message_dropped(to_stage);
                warn!(
                    stage = to_stage,
                    capacity = ?tx.capacity(),
                    "hand-off queue full, item dropped"
                );
                HandOff::Dropped
            }
            Err(TrySendError::Closed(_)) => {
                error!(stage = to_stage, "hand-off queue closed unexpectedly");
                HandOff::Closed
            }
        },
    }
}

#[cfg(test)]
pub(crate) mod test_support {
    use super::*;

    pub fn context(config: PipelineConfig) -> StageContext {
        StageContext {
            config: Arc::new(config),
            metrics: Arc::new(PipelineMetrics::new()),
            token: CancellationToken::new(),
            state: StateTracker::new(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_drop_newest_on_full_queue() {
        let ctx = test_support::context(PipelineConfig {
            overflow_policy: OverflowPolicy::DropNewest,
            ..Default::default()
        });
        let (tx, rx) = async_channel::bounded(1);

        assert_eq!(hand_off(&tx, 1, &ctx, DECODE).await, HandOff::Sent);
        assert_eq!(hand_off(&tx, 2, &ctx, DECODE).await, HandOff::Dropped);
        assert_eq!(ctx.metrics.snapshot().dropped, 1);
        assert_eq!(rx.recv().await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_block_waits_for_space() {
        let ctx = test_support::context(PipelineConfig::default());
        let (tx, rx) = async_channel::bounded(1);

        assert_eq!(hand_off(&tx, 1, &ctx, PERSIST).await, HandOff::Sent);

        let consumer = tokio::spawn(async move {
            let first = rx.recv().await.unwrap();
            let second = rx.recv().await.unwrap();
            (first, second)
        });

        assert_eq!(hand_off(&tx, 2, &ctx, PERSIST).await, HandOff::Sent);
        assert_eq!(consumer.await.unwrap(), (1, 2));
        assert_eq!(ctx.metrics.snapshot().dropped, 0);
    }

    #[tokio::test]
    async fn test_closed_queue() {
        let ctx = test_support::context(PipelineConfig::default());
        let (tx, rx) = async_channel::bounded::<u32>(1);
        drop(rx);
        assert_eq!(hand_off(&tx, 1, &ctx, DECODE).await, HandOff::Closed);
    }
}
