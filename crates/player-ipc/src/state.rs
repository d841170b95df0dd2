//! Connection lifecycle state machine.

use serde::{Deserialize, Serialize};

/// Lifecycle state of the playback connection.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub enum ConnectionState {
    /// Not started, or stopped by the host.
    #[default]
    Idle,

    /// Connection attempt in flight.
    Connecting,

    /// Connected and playing.
    Connected,

    /// Connection closed, waiting for a scheduled reconnect.
    Reconnecting {
        /// Attempt number the pending reconnect will use.
        attempt: u32,
    },

    /// Connection closed by the peer or by `stop()`.
    Closed,

    /// Retry budget exhausted; requires an explicit restart.
    Failed {
        /// Human-readable reason.
        reason: String,
    },
}

impl ConnectionState {
    /// Check if connected.
    pub fn is_connected(&self) -> bool {
        matches!(self, Self::Connected)
    }

    /// Check if in a transient state (connecting or reconnecting).
    pub fn is_transient(&self) -> bool {
        matches!(self, Self::Connecting | Self::Reconnecting { .. })
    }

    /// Check if terminally failed.
    pub fn is_failed(&self) -> bool {
        matches!(self, Self::Failed { .. })
    }

    /// Check if idle.
    pub fn is_idle(&self) -> bool {
        matches!(self, Self::Idle)
    }

    /// Returns a simple string representation of the state.
    pub fn name(&self) -> &'static str {
        match self {
            Self::Idle => "Idle",
            Self::Connecting => "Connecting",
            Self::Connected => "Connected",
            Self::Reconnecting { .. } => "Reconnecting",
            Self::Closed => "Closed",
            Self::Failed { .. } => "Failed",
        }
    }

    /// Get status message for the host UI.
    pub fn message(&self) -> String {
        match self {
            Self::Idle => "Idle".to_string(),
            Self::Connecting => "Connecting...".to_string(),
            Self::Connected => "Connected".to_string(),
            Self::Reconnecting { attempt } => format!("Reconnecting (attempt {attempt})"),
            Self::Closed => "Closed".to_string(),
            Self::Failed { reason } => format!("Failed: {reason}"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_is_idle() {
        assert!(ConnectionState::default().is_idle());
    }

    #[test]
    fn test_transient_states() {
        assert!(ConnectionState::Connecting.is_transient());
        assert!(ConnectionState::Reconnecting { attempt: 2 }.is_transient());
        assert!(!ConnectionState::Connected.is_transient());
        assert!(!ConnectionState::Closed.is_transient());
    }

    #[test]
    fn test_failed_carries_reason() {
        let state = ConnectionState::Failed {
            reason: "gave up after 6 attempts".to_string(),
        };
        assert!(state.is_failed());
        assert_eq!(state.message(), "Failed: gave up after 6 attempts");
    }
}
