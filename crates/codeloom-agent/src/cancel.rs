//! Cancellation scope threaded through every provider call.
//!
//! A [`CancelScope`] pairs a [`CancellationToken`] with an optional deadline.
//! Every suspension point in the engine (awaiting the response, the next
//! body chunk, the backoff timer) races its future against
//! [`CancelScope::cancelled`] inside `tokio::select!`, so a single cancel or
//! an expired deadline stops the call wherever it is parked.

use std::time::Duration;

use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

use crate::error::{AgentError, CancelReason, Result};

/// Explicit cancellation plus an optional deadline.
#[derive(Debug, Clone, Default)]
pub struct CancelScope {
    token: CancellationToken,
    deadline: Option<Instant>,
}

impl CancelScope {
    /// A scope that only ends when cancelled explicitly.
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a deadline `timeout` from now.  An earlier deadline is kept; a
    /// timeout too large to represent leaves the scope without one.
    pub fn with_timeout(self, timeout: Duration) -> Self {
        match Instant::now().checked_add(timeout) {
            Some(deadline) => self.with_deadline(deadline),
            None => self,
        }
    }

    /// Add an absolute deadline.  An earlier deadline is kept.
    pub fn with_deadline(mut self, deadline: Instant) -> Self {
        self.deadline = Some(match self.deadline {
            Some(existing) => existing.min(deadline),
            None => deadline,
        });
        self
    }

    /// A child scope: cancelled when this one is, but cancelling it leaves
    /// the parent alone.  The deadline is inherited.
    pub fn child(&self) -> Self {
        Self {
            token: self.token.child_token(),
            deadline: self.deadline,
        }
    }

    /// The underlying token, for callers wiring up signal handlers.
    pub fn token(&self) -> &CancellationToken {
        &self.token
    }

    pub fn deadline(&self) -> Option<Instant> {
        self.deadline
    }

    /// Cancel the scope and all of its children.
    pub fn cancel(&self) {
        self.token.cancel();
    }

    /// Non-blocking check, used before each decoded line.
    pub fn check(&self) -> Result<()> {
        if self.token.is_cancelled() {
            return Err(AgentError::cancelled(CancelReason::Cancelled));
        }
        if self.deadline.is_some_and(|d| Instant::now() >= d) {
            return Err(AgentError::cancelled(CancelReason::DeadlineExceeded));
        }
        Ok(())
    }

    /// Resolves once the scope is cancelled or its deadline passes.
    pub async fn cancelled(&self) -> CancelReason {
        match self.deadline {
            Some(deadline) => {
                tokio::select! {
                    _ = self.token.cancelled() => CancelReason::Cancelled,
                    _ = tokio::time::sleep_until(deadline) => CancelReason::DeadlineExceeded,
                }
            }
            None => {
                self.token.cancelled().await;
                CancelReason::Cancelled
            }
        }
    }

    /// Run `fut` unless the scope ends first.
    pub async fn run<F, T>(&self, fut: F) -> Result<T>
    where
        F: std::future::Future<Output = T>,
    {
        tokio::select! {
            biased;
            reason = self.cancelled() => Err(AgentError::cancelled(reason)),
            out = fut => Ok(out),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn check_reports_explicit_cancel() {
        let scope = CancelScope::new();
        assert!(scope.check().is_ok());
        scope.cancel();
        assert!(matches!(
            scope.check(),
            Err(AgentError::Cancelled {
                reason: CancelReason::Cancelled
            })
        ));
    }

    #[tokio::test]
    async fn unrepresentable_timeout_sets_no_deadline() {
        let scope = CancelScope::new().with_timeout(Duration::from_secs(u64::MAX / 2));
        assert!(scope.deadline().is_none());
        assert!(scope.check().is_ok());

        let bounded = CancelScope::new()
            .with_timeout(Duration::from_secs(60))
            .with_timeout(Duration::MAX);
        assert!(bounded.deadline().is_some());
    }

    #[tokio::test(start_paused = true)]
    async fn deadline_fires() {
        let scope = CancelScope::new().with_timeout(Duration::from_millis(50));
        assert!(scope.check().is_ok());

        let reason = scope.cancelled().await;
        assert_eq!(reason, CancelReason::DeadlineExceeded);
        assert!(matches!(
            scope.check(),
            Err(AgentError::Cancelled {
                reason: CancelReason::DeadlineExceeded
            })
        ));
    }

    #[tokio::test]
    async fn earlier_deadline_wins() {
        let now = Instant::now();
        let scope = CancelScope::new()
            .with_deadline(now + Duration::from_secs(5))
            .with_deadline(now + Duration::from_secs(60));
        assert_eq!(scope.deadline(), Some(now + Duration::from_secs(5)));
    }

    #[tokio::test]
    async fn child_follows_parent_only() {
        let parent = CancelScope::new();
        let child = parent.child();
        child.cancel();
        assert!(child.check().is_err());
        assert!(parent.check().is_ok());

        let other = parent.child();
        parent.cancel();
        assert!(other.check().is_err());
    }

    #[tokio::test(start_paused = true)]
    async fn run_aborts_pending_future() {
        let scope = CancelScope::new().with_timeout(Duration::from_millis(10));
        let out = scope
            .run(tokio::time::sleep(Duration::from_secs(3600)))
            .await;
        assert!(matches!(
            out,
            Err(AgentError::Cancelled {
                reason: CancelReason::DeadlineExceeded
            })
        ));

        let ok = CancelScope::new().run(async { 7 }).await.unwrap();
        assert_eq!(ok, 7);
    }
}
