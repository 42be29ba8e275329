//! Pipeline state machine
//!
//! `Idle → Running → Draining → Stopped`. A pipeline that never started may
//! go straight from `Idle` to `Stopped`.

use std::fmt;
use std::sync::{Arc, OnceLock};

use tokio::sync::watch;

/// Pipeline lifecycle state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PipelineState {
    /// Constructed, not yet subscribed
    Idle,
    /// Stages accepting deliveries
    Running,
    /// Cancellation observed; in-flight items finishing
    Draining,
    /// Every stage has exited
    Stopped,
}

impl PipelineState {
    /// Check whether `next` is a legal successor
    pub fn can_transition_to(self, next: PipelineState) -> bool {
        matches!(
            (self, next),
            (Self::Idle, Self::Running)
                | (Self::Idle, Self::Stopped)
                | (Self::Running, Self::Draining)
                | (Self::Draining, Self::Stopped)
        )
    }
}

impl fmt::Display for PipelineState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Idle => "idle",
            Self::Running => "running",
            Self::Draining => "draining",
            Self::Stopped => "stopped",
        };
        f.write_str(name)
    }
}

/// Why the pipeline left `Running`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StopReason {
    /// Operator interrupt or explicit shutdown request
    Signal,
    /// The bus closed the subscription
    SubscriptionClosed,
    /// Consecutive persistence failures reached the configured threshold
    PersistFailureThreshold,
    /// A stage task terminated abnormally
    StageFailure,
}

impl StopReason {
    /// Whether the process should exit with a success status
    ///
    /// Only a requested stop counts; a subscription ending on its own means
    /// the bus gave up.
    pub fn is_success(self) -> bool {
        matches!(self, Self::Signal)
    }
}

impl fmt::Display for StopReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Signal => "signal",
            Self::SubscriptionClosed => "subscription closed",
            Self::PersistFailureThreshold => "persistence failure threshold",
            Self::StageFailure => "stage failure",
        };
        f.write_str(name)
    }
}

/// Shared state cell with change notification
#[derive(Debug, Clone)]
pub(crate) struct StateTracker {
    tx: Arc<watch::Sender<PipelineState>>,
    reason: Arc<OnceLock<StopReason>>,
}

impl StateTracker {
    pub fn new() -> Self {
        let (tx, _rx) = watch::channel(PipelineState::Idle);
        Self {
            tx: Arc::new(tx),
            reason: Arc::new(OnceLock::new()),
        }
    }

    pub fn current(&self) -> PipelineState {
        *self.tx.borrow()
    }

    pub fn subscribe(&self) -> watch::Receiver<PipelineState> {
        self.tx.subscribe()
    }

    /// Apply a transition; illegal transitions are ignored
    pub fn transition(&self, next: PipelineState) -> bool {
        self.tx.send_if_modified(|state| {
            if state.can_transition_to(next) {
                *state = next;
                true
            } else {
                false
            }
        })
    }

    /// Record the stop reason; the first caller wins
    pub fn note_stop_reason(&self, reason: StopReason) {
        let _ = self.reason.set(reason);
    }

    pub fn stop_reason(&self) -> Option<StopReason> {
        self.reason.get().copied()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_legal_transitions() {
        let tracker = StateTracker::new();
        assert_eq!(tracker.current(), PipelineState::Idle);

        assert!(!tracker.transition(PipelineState::Draining));
        assert!(tracker.transition(PipelineState::Running));
        assert!(!tracker.transition(PipelineState::Running));
        assert!(tracker.transition(PipelineState::Draining));
        assert!(!tracker.transition(PipelineState::Running));
        assert!(tracker.transition(PipelineState::Stopped));
        assert_eq!(tracker.current(), PipelineState::Stopped);
    }

    #[test]
    fn test_first_stop_reason_wins() {
        let tracker = StateTracker::new();
        tracker.note_stop_reason(StopReason::PersistFailureThreshold);
        tracker.note_stop_reason(StopReason::Signal);
        assert_eq!(
            tracker.stop_reason(),
            Some(StopReason::PersistFailureThreshold)
        );
        assert!(!StopReason::PersistFailureThreshold.is_success());
    }

    #[test]
    fn test_only_signal_is_success() {
        assert!(StopReason::Signal.is_success());
        assert!(!StopReason::SubscriptionClosed.is_success());
        assert!(!StopReason::StageFailure.is_success());
    }

    #[tokio::test]
    async fn test_watchers_observe_stopped() {
        let tracker = StateTracker::new();
        let mut rx = tracker.subscribe();

        let waiter = tokio::spawn(async move {
            rx.wait_for(|state| *state == PipelineState::Stopped)
                .await
                .map(|state| *state)
        });

        tracker.transition(PipelineState::Running);
        tracker.transition(PipelineState::Draining);
        tracker.transition(PipelineState::Stopped);

        assert_eq!(waiter.await.unwrap().unwrap(), PipelineState::Stopped);
    }
}
