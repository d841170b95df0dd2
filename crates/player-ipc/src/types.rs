//! Common types used across player messages.

use serde::{Deserialize, Serialize};

/// Configuration for a playback session.
///
/// Supplied explicitly by the host at construction; the player never
/// reads ambient global state.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PlaybackConfig {
    /// RTMP server URL (e.g., "rtmp://live.example.com/app").
    pub uri: String,

    /// Name of the stream to play.
    pub stream_name: String,

    /// Whether incoming video is processed initially. The host toggles
    /// this at runtime on background/foreground transitions.
    pub receive_video: bool,
}

impl Default for PlaybackConfig {
    fn default() -> Self {
        Self {
            uri: String::new(),
            stream_name: String::new(),
            receive_video: true,
        }
    }
}

impl PlaybackConfig {
    /// Create a config for the given endpoint and stream.
    pub fn new(uri: impl Into<String>, stream_name: impl Into<String>) -> Self {
        Self {
            uri: uri.into(),
            stream_name: stream_name.into(),
            ..Self::default()
        }
    }
}
