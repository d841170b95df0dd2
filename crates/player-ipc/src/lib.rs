//! Typed messages for the RTMP player.
//!
//! This crate defines the lifecycle state machine, the events the player
//! emits to its host, and the playback configuration the host supplies.

mod events;
mod state;
mod types;

pub use events::PlayerEvent;
pub use state::ConnectionState;
pub use types::PlaybackConfig;

use crossbeam_channel::{Receiver, Sender};

/// Channel capacity for events (player → host).
pub const EVENT_CHANNEL_CAPACITY: usize = 256;

/// Creates a bounded event channel.
pub fn event_channel() -> (Sender<PlayerEvent>, Receiver<PlayerEvent>) {
    crossbeam_channel::bounded(EVENT_CHANNEL_CAPACITY)
}
