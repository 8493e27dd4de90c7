//! Retry policy for per-ticker provider calls.

use std::time::Duration;

use crate::source::SourceError;

/// How often a failed fetch is re-attempted. Total attempts = `max_retries + 1`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RetryPolicy {
    pub max_retries: u32,
    /// Wait between two attempts at the same request.
    pub delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::immediate(2)
    }
}

impl RetryPolicy {
    /// Retries straight away, without waiting.
    pub const fn immediate(max_retries: u32) -> Self {
        Self {
            max_retries,
            delay: Duration::ZERO,
        }
    }

    pub const fn none() -> Self {
        Self::immediate(0)
    }

    /// Whether attempt number `attempt` (0-based) may be followed by another one.
    pub fn should_retry(&self, attempt: u32, error: &SourceError) -> bool {
        error.retryable() && attempt < self.max_retries
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn only_transient_errors_are_retried_within_budget() {
        let policy = RetryPolicy::default();
        let transient = SourceError::unavailable("timeout");
        let permanent = SourceError::internal("bad payload");

        assert!(policy.should_retry(0, &transient));
        assert!(policy.should_retry(1, &transient));
        assert!(!policy.should_retry(2, &transient));
        assert!(!policy.should_retry(0, &permanent));
        assert!(!RetryPolicy::none().should_retry(0, &transient));
    }

    #[test]
    fn default_policy_does_not_wait_between_attempts() {
        assert_eq!(RetryPolicy::default().delay, Duration::ZERO);
        assert_eq!(RetryPolicy::default().max_retries, 2);
    }
}
