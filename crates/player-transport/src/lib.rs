//! Reconnecting RTMP playback client.
//!
//! This crate maintains a resilient connection to an RTMP endpoint,
//! recovering from transient connect failures with bounded exponential
//! backoff, and delivers received media to the host.

mod error;
mod idle;
mod retry;
mod rtmp;
mod supervisor;

pub use error::TransportError;
pub use idle::{IdleInhibitor, NoopIdleInhibitor};
pub use retry::{FailureKind, RetryDecision, RetryPolicy};
pub use rtmp::{MediaPacket, RtmpPlayer};
pub use supervisor::{Action, StatusCode, Supervisor};

/// Channel capacity for received media packets.
pub const MEDIA_CHANNEL_CAPACITY: usize = 64;

/// Result type for transport operations.
pub type TransportResult<T> = Result<T, TransportError>;

/// Maximum bounded reconnection attempt number; attempts 0..=max run.
pub const MAX_RETRY_ATTEMPTS: u32 = 5;

/// Exponential backoff base in seconds.
pub const BACKOFF_BASE_SECS: f64 = 2.0;
