//! Error types for the transport module.

use thiserror::Error;

/// Errors that can occur during transport operations.
#[derive(Debug, Error)]
pub enum TransportError {
    /// Invalid RTMP URL.
    #[error("Invalid RTMP URL: {0}")]
    InvalidUrl(String),

    /// Stream name missing.
    #[error("Stream name must not be empty")]
    InvalidStreamName,

    /// Connection error (general).
    #[error("Connection error: {0}")]
    Connection(String),

    /// Connection closed by the peer.
    #[error("Connection closed by peer")]
    ConnectionClosed,

    /// RTMP protocol error.
    #[error("RTMP protocol error: {0}")]
    Protocol(String),

    /// Retry budget exhausted.
    #[error("Reconnect attempts exhausted after {0} attempts")]
    RetryExhausted(u32),

    /// Already started.
    #[error("Player already started")]
    AlreadyStarted,

    /// IO error.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}
