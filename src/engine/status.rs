//! Pass status tracking
//!
//! One tracker per side (read, write). Passes are counted when submitted and
//! when they reach a terminal state, so `wait()` can tell whether anything
//! queued before the call is still outstanding.

use serde::Serialize;
use tokio::sync::watch;

/// State of the most recent pass on one side of a cache
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum PassStatus {
    Idle,
    InProgress,
    Finished,
    Error,
}

impl PassStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Idle => "idle",
            Self::InProgress => "in_progress",
            Self::Finished => "finished",
            Self::Error => "error",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Finished | Self::Error)
    }
}

#[derive(Debug, Clone, Copy)]
struct TrackerState {
    status: PassStatus,
    submitted: u64,
    completed: u64,
}

/// Status and completion counters for one side of a cache
pub struct StatusTracker {
    state: watch::Sender<TrackerState>,
}

impl StatusTracker {
    pub fn new() -> Self {
        let (state, _) = watch::channel(TrackerState {
            status: PassStatus::Idle,
            submitted: 0,
            completed: 0,
        });
        Self { state }
    }

    pub fn status(&self) -> PassStatus {
        self.state.borrow().status
    }

    /// Passes submitted but not yet terminal
    pub fn in_flight(&self) -> u64 {
        let state = self.state.borrow();
        state.submitted - state.completed
    }

    /// Register a new pass and return its number (starting at 1).
    ///
    /// The status reads `InProgress` from here until the last submitted pass
    /// is terminal.
    pub fn submit(&self) -> u64 {
        let mut pass = 0;
        self.state.send_modify(|state| {
            state.submitted += 1;
            state.status = PassStatus::InProgress;
            pass = state.submitted;
        });
        pass
    }

    /// Called by the worker when it picks the pass up.
    pub fn begin(&self) {
        self.state.send_modify(|state| state.status = PassStatus::InProgress);
    }

    /// Called by the worker when the pass is over. `status` must be terminal.
    ///
    /// While later passes are still queued the status stays `InProgress`.
    pub fn finish(&self, status: PassStatus) {
        debug_assert!(status.is_terminal());
        self.state.send_modify(|state| {
            state.completed += 1;
            state.status = if state.completed < state.submitted {
                PassStatus::InProgress
            } else {
                status
            };
        });
    }

    /// Resolve once every pass submitted before this call is terminal.
    pub async fn wait(&self) {
        let mut receiver = self.state.subscribe();
        let target = receiver.borrow().submitted;
        // The sender lives in `self`, so this only fails if it is being torn down.
        let _ = receiver.wait_for(|state| state.completed >= target).await;
    }
}

impl Default for StatusTracker {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::time::Duration;

    #[tokio::test]
    async fn wait_without_passes_returns_immediately() {
        let tracker = StatusTracker::new();
        assert_eq!(tracker.status(), PassStatus::Idle);
        tokio::time::timeout(Duration::from_secs(1), tracker.wait())
            .await
            .expect("nothing in flight");
    }

    #[tokio::test]
    async fn wait_blocks_until_the_pass_is_terminal() {
        let tracker = Arc::new(StatusTracker::new());
        let pass = tracker.submit();
        assert_eq!(pass, 1);
        assert_eq!(tracker.in_flight(), 1);

        let worker = {
            let tracker = tracker.clone();
            tokio::spawn(async move {
                tokio::time::sleep(Duration::from_millis(20)).await;
                tracker.begin();
                assert_eq!(tracker.status(), PassStatus::InProgress);
                tracker.finish(PassStatus::Error);
            })
        };

        tracker.wait().await;
        assert_eq!(tracker.status(), PassStatus::Error);
        assert_eq!(tracker.in_flight(), 0);
        worker.await.unwrap();
    }

    #[test]
    fn status_is_in_progress_until_the_last_pass_is_terminal() {
        let tracker = StatusTracker::new();
        tracker.submit();
        tracker.begin();
        tracker.finish(PassStatus::Finished);
        assert_eq!(tracker.status(), PassStatus::Finished);

        tracker.submit();
        assert_eq!(tracker.status(), PassStatus::InProgress);
        tracker.submit();
        tracker.begin();
        tracker.finish(PassStatus::Error);
        assert_eq!(tracker.status(), PassStatus::InProgress);

        tracker.begin();
        tracker.finish(PassStatus::Finished);
        assert_eq!(tracker.status(), PassStatus::Finished);
        assert_eq!(tracker.in_flight(), 0);
    }

    #[tokio::test]
    async fn later_submissions_do_not_extend_an_earlier_wait() {
        let tracker = Arc::new(StatusTracker::new());
        tracker.submit();

        let waiter = {
            let tracker = tracker.clone();
            tokio::spawn(async move { tracker.wait().await })
        };
        while tracker.state.receiver_count() == 0 {
            tokio::task::yield_now().await;
        }

        tracker.begin();
        tracker.finish(PassStatus::Finished);
        tracker.submit();

        tokio::time::timeout(Duration::from_secs(1), waiter)
            .await
            .expect("first pass is done")
            .unwrap();
        assert_eq!(tracker.in_flight(), 1);
    }
}
