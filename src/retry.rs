//! Fixed-interval retry bookkeeping shared by connecting and statement execution.
//!
//! Backoff never grows: the session runs inside latency-sensitive load generation, so
//! the worst-case recovery time is `retry_limit * backoff` plus the attempts themselves.

use std::time::Duration;

/// How many times to retry after the initial attempt, and how long to wait in between.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    retry_limit: u32,
    backoff: Duration,
}

impl RetryPolicy {
    #[must_use]
    pub const fn new(retry_limit: u32, backoff: Duration) -> Self {
        Self {
            retry_limit,
            backoff,
        }
    }

    /// A policy that gives up after the first failure.
    #[must_use]
    pub const fn no_retry() -> Self {
        Self::new(0, Duration::ZERO)
    }

    #[must_use]
    pub fn retry_limit(&self) -> u32 {
        self.retry_limit
    }

    #[must_use]
    pub fn backoff(&self) -> Duration {
        self.backoff
    }

    /// Initial attempt plus every permitted retry.
    #[must_use]
    pub fn max_attempts(&self) -> u32 {
        self.retry_limit.saturating_add(1)
    }

    /// Start counting attempts under this policy.
    #[must_use]
    pub fn start(self) -> RetryState {
        RetryState {
            policy: self,
            attempt: 0,
        }
    }
}

/// Attempt counter for one bounded retry loop.
///
/// `attempt()` is zero for the initial try and grows by one per retry; it never exceeds
/// the policy's `retry_limit`.
#[derive(Debug, Clone)]
pub struct RetryState {
    policy: RetryPolicy,
    attempt: u32,
}

impl RetryState {
    #[must_use]
    pub fn attempt(&self) -> u32 {
        self.attempt
    }

    /// Attempts made so far, counting the current one.
    #[must_use]
    pub fn attempts_made(&self) -> u32 {
        self.attempt + 1
    }

    #[must_use]
    pub fn can_retry(&self) -> bool {
        self.attempt < self.policy.retry_limit
    }

    /// Move to the next attempt. Returns false, leaving the counter untouched, once the
    /// budget is spent.
    pub fn advance(&mut self) -> bool {
        if self.can_retry() {
            self.attempt += 1;
            true
        } else {
            false
        }
    }

    /// Sleep for the fixed backoff interval.
    pub async fn backoff(&self) {
        if !self.policy.backoff.is_zero() {
            tokio::time::sleep(self.policy.backoff).await;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn state_never_passes_the_limit() {
        let mut state = RetryPolicy::new(2, Duration::ZERO).start();
        assert_eq!(state.attempt(), 0);
        assert!(state.advance());
        assert!(state.advance());
        assert!(!state.advance());
        assert!(!state.advance());
        assert_eq!(state.attempt(), 2);
        assert_eq!(state.attempts_made(), 3);
    }

    #[test]
    fn no_retry_allows_one_attempt() {
        let policy = RetryPolicy::no_retry();
        assert_eq!(policy.max_attempts(), 1);
        assert!(!policy.start().can_retry());
    }

    #[tokio::test(start_paused = true)]
    async fn backoff_is_fixed() {
        let mut state = RetryPolicy::new(3, Duration::from_secs(2)).start();
        for _ in 0..3 {
            let started = tokio::time::Instant::now();
            state.backoff().await;
            assert_eq!(started.elapsed(), Duration::from_secs(2));
            state.advance();
        }
    }
}
