//! Retry policy and attempt bookkeeping.
//!
//! The transport loop drives an explicit state machine:
//!
//! ```text
//! Attempting ──ok──────────────────────────> Terminated(success)
//!     │
//!     └─err─> classify ──fatal / ceiling──> Terminated(error)
//!                 │
//!                 └─retryable──> AwaitingBackoff ──timer──> Attempting
//!                                       │
//!                                       └─cancel──> Terminated(error)
//! ```
//!
//! [`RetryState`] owns the attempt counter and turns each failure into a
//! [`RetryDecision`]; the caller does the waiting so the cancellation race
//! stays next to the I/O it guards.

use std::time::Duration;

use rand::Rng;
use serde::{Deserialize, Serialize};

use crate::error::AgentError;

/// Retries allowed after the first attempt.
pub const MAX_RETRIES: u32 = 8;
/// Delay before the first retry.
pub const BASE_DELAY_MS: u64 = 2000;
/// Jitter added on top of each delay, as a fraction of that delay.
pub const JITTER_RATIO: f64 = 0.2;

/// How many times and how patiently to retry.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RetryPolicy {
    /// Retries allowed after the first attempt.
    pub max_retries: u32,
    /// Base of the exponential backoff, in milliseconds.
    pub base_delay_ms: u64,
    /// Jitter as a fraction of the computed backoff.
    pub jitter_ratio: f64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: MAX_RETRIES,
            base_delay_ms: BASE_DELAY_MS,
            jitter_ratio: JITTER_RATIO,
        }
    }
}

impl RetryPolicy {
    /// Policy that never retries.
    pub fn none() -> Self {
        Self {
            max_retries: 0,
            ..Self::default()
        }
    }

    /// Upper bound on the total number of attempts.
    pub fn max_attempts(&self) -> u32 {
        self.max_retries.saturating_add(1)
    }

    /// `base * 2^(attempt-1)` in milliseconds, without jitter.
    pub fn backoff_ms(&self, attempt: u32) -> u64 {
        let exponent = attempt.saturating_sub(1).min(30);
        self.base_delay_ms.saturating_mul(1u64 << exponent)
    }

    /// Backoff plus roughly `jitter_ratio` of it, randomized by ±10% so
    /// concurrent clients drift apart.
    pub fn delay(&self, attempt: u32) -> Duration {
        let backoff = self.backoff_ms(attempt);
        let spread = rand::rng().random_range(0.9..=1.1);
        let jitter = (backoff as f64 * self.jitter_ratio * spread) as u64;
        Duration::from_millis(backoff.saturating_add(jitter))
    }
}

/// What to do after a failed attempt.
#[derive(Debug)]
pub enum RetryDecision {
    /// Wait `delay`, then start attempt `next_attempt`.
    Retry {
        next_attempt: u32,
        delay: Duration,
        cause: AgentError,
    },
    /// Stop and report this error.
    Fail(AgentError),
}

/// Monotonic attempt counter bounded by the policy's ceiling.
#[derive(Debug, Clone)]
pub struct RetryState {
    policy: RetryPolicy,
    attempt: u32,
}

impl RetryState {
    pub fn new(policy: RetryPolicy) -> Self {
        Self { policy, attempt: 0 }
    }

    /// Number of the attempt in flight (1-based, 0 before the first).
    pub fn attempt(&self) -> u32 {
        self.attempt
    }

    /// Record the start of the next attempt and return its number.
    pub fn begin_attempt(&mut self) -> u32 {
        self.attempt = self.attempt.saturating_add(1);
        self.attempt
    }

    /// Classify the failure of the current attempt.
    ///
    /// Cancellation and non-retryable errors fail immediately, whatever the
    /// attempt count.  Retryable errors past the ceiling become
    /// [`AgentError::RetryExhausted`].
    pub fn on_failure(&self, err: AgentError) -> RetryDecision {
        if err.is_cancellation() || !err.is_retryable() {
            return RetryDecision::Fail(err);
        }
        if self.attempt > self.policy.max_retries {
            return RetryDecision::Fail(AgentError::RetryExhausted {
                attempts: self.attempt,
                last: Box::new(err),
            });
        }
        RetryDecision::Retry {
            next_attempt: self.attempt + 1,
            delay: self.policy.delay(self.attempt),
            cause: err,
        }
    }
}
