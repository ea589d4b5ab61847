// src/engine/cancel.rs

//! Session-wide cancellation: `Running -> StopRequested -> Stopped`.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::watch;
use tokio_util::sync::CancellationToken;
use tracing::info;

use crate::types::CancelState;

/// Handle shared by everything that must react to a stop request.
///
/// - `request_stop` fires the token: the scheduler stops dispatching and
///   executors stop at their next safe point.
/// - The scheduler calls `mark_stopped` once every executor has ended.
/// - `grace` bounds how long in-flight work may take to wind down before
///   it is killed.
#[derive(Debug, Clone)]
pub struct Cancellation {
    token: CancellationToken,
    state: Arc<watch::Sender<CancelState>>,
    grace: Duration,
}

impl Cancellation {
    pub fn new(grace: Duration) -> Self {
        let (state, _rx) = watch::channel(CancelState::Running);
        Self {
            token: CancellationToken::new(),
            state: Arc::new(state),
            grace,
        }
    }

    /// Token that fires when a stop is requested.
    pub fn token(&self) -> CancellationToken {
        self.token.clone()
    }

    pub fn grace(&self) -> Duration {
        self.grace
    }

    pub fn state(&self) -> CancelState {
        *self.state.borrow()
    }

    pub fn is_stop_requested(&self) -> bool {
        self.token.is_cancelled()
    }

    /// Move `Running -> StopRequested` and fire the token.
    ///
    /// Returns `true` if this call performed the transition.
    pub fn request_stop(&self) -> bool {
        let changed = self.advance(CancelState::StopRequested);
        if changed {
            info!(grace = ?self.grace, "stop requested; no new tasks will be dispatched");
        }
        self.token.cancel();
        changed
    }

    /// Record that every executor has terminated.
    pub fn mark_stopped(&self) -> bool {
        self.advance(CancelState::Stopped)
    }

    /// Resolve once the state reaches `Stopped`.
    pub async fn stopped(&self) {
        let mut rx = self.state.subscribe();
        // The sender lives as long as `self`, so this cannot fail.
        let _ = rx.wait_for(|s| *s == CancelState::Stopped).await;
    }

    fn advance(&self, next: CancelState) -> bool {
        self.state.send_if_modified(|current| {
            if *current < next {
                *current = next;
                true
            } else {
                false
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn transitions_only_move_forward() {
        let c = Cancellation::new(Duration::from_secs(1));
        assert_eq!(c.state(), CancelState::Running);

        assert!(c.request_stop());
        assert_eq!(c.state(), CancelState::StopRequested);
        assert!(c.token().is_cancelled());
        assert!(!c.request_stop());

        assert!(c.mark_stopped());
        assert_eq!(c.state(), CancelState::Stopped);
        assert!(!c.request_stop());
        assert_eq!(c.state(), CancelState::Stopped);
    }

    #[test]
    fn normal_completion_can_skip_stop_requested() {
        let c = Cancellation::new(Duration::ZERO);
        assert!(c.mark_stopped());
        assert!(!c.is_stop_requested());
    }

    #[tokio::test]
    async fn stopped_future_resolves_after_mark() {
        let c = Cancellation::new(Duration::ZERO);
        let waiter = {
            let c = c.clone();
            tokio::spawn(async move { c.stopped().await })
        };
        c.request_stop();
        c.mark_stopped();
        tokio::time::timeout(Duration::from_secs(1), waiter)
            .await
            .expect("stopped() should resolve")
            .unwrap();
    }
}
