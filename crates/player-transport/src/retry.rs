//! Retry policy and the unified retry decision.

use std::time::Duration;

use crate::{BACKOFF_BASE_SECS, MAX_RETRY_ATTEMPTS};

/// Classified reason a connection went down.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureKind {
    /// Connect attempt was rejected or timed out.
    ConnectFailed,

    /// Established connection was closed by the peer.
    ConnectClosed,

    /// I/O error on an established connection.
    Io,
}

/// What to do about a classified failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RetryDecision {
    /// Reconnect after the given backoff delay.
    After(Duration),

    /// Reconnect immediately, outside the bounded budget.
    Immediate,

    /// Budget exhausted; stop retrying.
    GiveUp,
}

/// Reconnection policy configuration.
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    /// Highest bounded attempt number; attempts 0..=max_attempts run.
    pub max_attempts: u32,

    /// Exponential base applied per attempt, in seconds.
    pub base_secs: f64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: MAX_RETRY_ATTEMPTS,
            base_secs: BACKOFF_BASE_SECS,
        }
    }
}

impl RetryPolicy {
    /// Backoff delay for a given attempt number: base^attempt seconds.
    pub fn delay_for_attempt(&self, attempt: u32) -> Duration {
        Duration::from_secs_f64(self.base_secs.powi(attempt as i32))
    }

    /// Decide how to recover from a classified failure.
    ///
    /// Connect failures and peer closes follow bounded exponential
    /// backoff. I/O errors retry immediately regardless of the budget;
    /// both classes flow through this single decision point so the two
    /// recovery paths cannot race each other.
    pub fn decide(&self, kind: FailureKind, attempt: u32) -> RetryDecision {
        match kind {
            FailureKind::Io => RetryDecision::Immediate,
            FailureKind::ConnectFailed | FailureKind::ConnectClosed => {
                if attempt <= self.max_attempts {
                    RetryDecision::After(self.delay_for_attempt(attempt))
                } else {
                    RetryDecision::GiveUp
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_backoff_delays_are_exact_powers_of_two() {
        let policy = RetryPolicy::default();

        for (attempt, secs) in [(0, 1), (1, 2), (2, 4), (3, 8), (4, 16), (5, 32)] {
            assert_eq!(
                policy.delay_for_attempt(attempt),
                Duration::from_secs(secs),
                "attempt {attempt}"
            );
        }
    }

    #[test]
    fn test_bounded_failures_back_off_then_give_up() {
        let policy = RetryPolicy::default();

        for attempt in 0..=policy.max_attempts {
            assert_eq!(
                policy.decide(FailureKind::ConnectFailed, attempt),
                RetryDecision::After(policy.delay_for_attempt(attempt)),
            );
        }
        assert_eq!(
            policy.decide(FailureKind::ConnectFailed, policy.max_attempts + 1),
            RetryDecision::GiveUp,
        );
    }

    #[test]
    fn test_peer_close_treated_like_connect_failure() {
        let policy = RetryPolicy::default();

        assert_eq!(
            policy.decide(FailureKind::ConnectClosed, 2),
            RetryDecision::After(Duration::from_secs(4)),
        );
        assert_eq!(policy.decide(FailureKind::ConnectClosed, 6), RetryDecision::GiveUp);
    }

    #[test]
    fn test_io_errors_retry_immediately_at_any_attempt() {
        let policy = RetryPolicy::default();

        for attempt in [0, 3, 5, 6, 100] {
            assert_eq!(policy.decide(FailureKind::Io, attempt), RetryDecision::Immediate);
        }
    }
}
