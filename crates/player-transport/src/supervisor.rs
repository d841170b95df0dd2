//! Playback supervision state machine.
//!
//! Pure and synchronous: the async driver feeds it classified status
//! and error events and executes the actions it returns. Every retry
//! decision, for status failures and I/O errors alike, passes through
//! here, so the client can never double-connect.

use std::time::Duration;

use player_ipc::ConnectionState;

use crate::retry::{FailureKind, RetryDecision, RetryPolicy};

/// Status code carried by a connection status event.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StatusCode {
    /// Connection established and accepted.
    ConnectSuccess,

    /// Connect attempt rejected or timed out.
    ConnectFailed,

    /// Established connection closed.
    ConnectClosed,

    /// Any other code; ignored for forward compatibility.
    Other(String),
}

/// Action the driver must carry out after an event.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Action {
    /// Begin playback of the named stream.
    Play {
        /// Stream to request.
        stream_name: String,
    },

    /// Reconnect after the given delay.
    ScheduleRetry {
        /// Attempt number the reconnect belongs to.
        attempt: u32,

        /// Backoff delay.
        delay: Duration,
    },

    /// Reconnect immediately, no delay.
    RetryNow,

    /// Stop retrying; terminal until an external restart.
    GiveUp {
        /// Total bounded attempts made.
        attempts: u32,
    },

    /// Nothing to do.
    None,
}

/// Tracks the connection lifecycle and the retry budget.
#[derive(Debug)]
pub struct Supervisor {
    policy: RetryPolicy,
    stream_name: String,
    state: ConnectionState,
    attempt: u32,
}

impl Supervisor {
    /// Create a supervisor for the named stream.
    pub fn new(policy: RetryPolicy, stream_name: impl Into<String>) -> Self {
        Self {
            policy,
            stream_name: stream_name.into(),
            state: ConnectionState::Idle,
            attempt: 0,
        }
    }

    /// Current lifecycle state.
    pub fn state(&self) -> &ConnectionState {
        &self.state
    }

    /// Current bounded attempt counter.
    pub fn attempt(&self) -> u32 {
        self.attempt
    }

    /// Mark a connect attempt as in flight.
    pub fn connecting(&mut self) {
        self.state = ConnectionState::Connecting;
    }

    /// Handle a connection status event.
    pub fn on_status(&mut self, code: StatusCode) -> Action {
        match code {
            StatusCode::ConnectSuccess => {
                self.attempt = 0;
                self.state = ConnectionState::Connected;
                Action::Play {
                    stream_name: self.stream_name.clone(),
                }
            }
            StatusCode::ConnectFailed => self.on_failure(FailureKind::ConnectFailed),
            StatusCode::ConnectClosed => self.on_failure(FailureKind::ConnectClosed),
            StatusCode::Other(_) => Action::None,
        }
    }

    /// Handle an I/O error on an established connection.
    pub fn on_io_error(&mut self) -> Action {
        self.on_failure(FailureKind::Io)
    }

    /// Unified recovery decision for any failure class.
    pub fn on_failure(&mut self, kind: FailureKind) -> Action {
        if self.state.is_failed() {
            // Terminal; only an external restart leaves this state.
            return Action::None;
        }

        match self.policy.decide(kind, self.attempt) {
            RetryDecision::Immediate => {
                self.state = ConnectionState::Closed;
                Action::RetryNow
            }
            RetryDecision::After(delay) => {
                let attempt = self.attempt;
                self.attempt += 1;
                self.state = ConnectionState::Reconnecting { attempt };
                Action::ScheduleRetry { attempt, delay }
            }
            RetryDecision::GiveUp => {
                let attempts = self.attempt;
                self.state = ConnectionState::Failed {
                    reason: format!("gave up after {attempts} reconnect attempts"),
                };
                Action::GiveUp { attempts }
            }
        }
    }

    /// Reset to Idle with a fresh retry budget. Called on `stop()`.
    pub fn reset(&mut self) {
        self.state = ConnectionState::Idle;
        self.attempt = 0;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn supervisor() -> Supervisor {
        Supervisor::new(RetryPolicy::default(), "live")
    }

    #[test]
    fn test_success_resets_counter_and_plays_once() {
        let mut sup = supervisor();

        // Fail three times, then succeed.
        let mut delays = Vec::new();
        for _ in 0..3 {
            sup.connecting();
            match sup.on_status(StatusCode::ConnectFailed) {
                Action::ScheduleRetry { delay, .. } => delays.push(delay.as_secs()),
                other => panic!("expected scheduled retry, got {other:?}"),
            }
        }
        assert_eq!(delays, vec![1, 2, 4]);

        sup.connecting();
        let action = sup.on_status(StatusCode::ConnectSuccess);
        assert_eq!(
            action,
            Action::Play {
                stream_name: "live".to_string()
            }
        );
        assert_eq!(sup.attempt(), 0);
        assert!(sup.state().is_connected());
    }

    #[test]
    fn test_contiguous_failures_stop_after_budget() {
        let mut sup = supervisor();
        let mut scheduled = Vec::new();

        // Six bounded reconnects (attempts 0..=5), then give-up.
        for i in 0..7 {
            sup.connecting();
            match sup.on_status(StatusCode::ConnectFailed) {
                Action::ScheduleRetry { attempt, delay } => {
                    assert_eq!(attempt, i);
                    scheduled.push(delay.as_secs());
                }
                Action::GiveUp { attempts } => {
                    assert_eq!(i, 6);
                    assert_eq!(attempts, 6);
                }
                other => panic!("unexpected action {other:?}"),
            }
        }
        assert_eq!(scheduled, vec![1, 2, 4, 8, 16, 32]);
        assert!(sup.state().is_failed());

        // Further failures are no-ops.
        assert_eq!(sup.on_status(StatusCode::ConnectFailed), Action::None);
        assert_eq!(sup.on_io_error(), Action::None);
    }

    #[test]
    fn test_io_error_retries_now_regardless_of_counter() {
        let mut sup = supervisor();

        // Burn part of the budget first.
        for _ in 0..4 {
            sup.connecting();
            sup.on_status(StatusCode::ConnectFailed);
        }
        let before = sup.attempt();

        assert_eq!(sup.on_io_error(), Action::RetryNow);
        // Immediate retries neither consume nor reset the budget.
        assert_eq!(sup.attempt(), before);
    }

    #[test]
    fn test_peer_close_follows_bounded_backoff() {
        let mut sup = supervisor();
        sup.connecting();
        sup.on_status(StatusCode::ConnectSuccess);

        match sup.on_status(StatusCode::ConnectClosed) {
            Action::ScheduleRetry { attempt, delay } => {
                assert_eq!(attempt, 0);
                assert_eq!(delay, Duration::from_secs(1));
            }
            other => panic!("expected scheduled retry, got {other:?}"),
        }
    }

    #[test]
    fn test_unknown_status_codes_are_ignored() {
        let mut sup = supervisor();
        sup.connecting();
        sup.on_status(StatusCode::ConnectSuccess);

        let action = sup.on_status(StatusCode::Other("NetStream.Play.Reset".to_string()));
        assert_eq!(action, Action::None);
        assert!(sup.state().is_connected());
        assert_eq!(sup.attempt(), 0);
    }

    #[test]
    fn test_reset_from_any_state() {
        let mut sup = supervisor();
        for _ in 0..7 {
            sup.connecting();
            sup.on_status(StatusCode::ConnectFailed);
        }
        assert!(sup.state().is_failed());

        sup.reset();
        assert!(sup.state().is_idle());
        assert_eq!(sup.attempt(), 0);

        // The budget is fresh again after reset.
        sup.connecting();
        match sup.on_status(StatusCode::ConnectFailed) {
            Action::ScheduleRetry { attempt, delay } => {
                assert_eq!(attempt, 0);
                assert_eq!(delay, Duration::from_secs(1));
            }
            other => panic!("unexpected action {other:?}"),
        }
    }
}
