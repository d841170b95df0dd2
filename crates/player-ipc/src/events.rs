//! Events sent from the player to its host.

use serde::{Deserialize, Serialize};

use crate::state::ConnectionState;

/// Events that the player can send to the host.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum PlayerEvent {
    /// Connection state has changed.
    StateChanged {
        /// Previous state.
        previous: ConnectionState,

        /// Current state.
        current: ConnectionState,
    },

    /// Playback of the named stream has started.
    PlaybackStarted {
        /// Stream name passed to the play request.
        stream_name: String,
    },

    /// Stream metadata arrived from the server.
    MetadataReceived {
        /// Metadata rendered as a display string.
        description: String,
    },

    /// A reconnect has been scheduled.
    RetryScheduled {
        /// Attempt number (0-based).
        attempt: u32,

        /// Delay before the attempt, in milliseconds.
        delay_ms: u64,
    },

    /// The retry budget is exhausted; the player will not reconnect
    /// on its own. Terminal until the host restarts it.
    RetryExhausted {
        /// Total bounded attempts made.
        attempts: u32,
    },

    /// Error occurred.
    Error {
        /// Error message.
        message: String,
    },
}
