//! Command-line host for the RTMP player.
//!
//! Stands in for a UI: builds a playback configuration from arguments,
//! runs the player, and prints lifecycle events. Media packets are
//! drained and counted; a real host would hand them to a decoder.

use std::thread;

use anyhow::{bail, Context, Result};
use tracing::{error, info, warn};

use player_ipc::{event_channel, PlaybackConfig, PlayerEvent};
use player_transport::RtmpPlayer;

fn main() -> Result<()> {
    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive(tracing::Level::INFO.into()),
        )
        .init();

    let mut args = std::env::args().skip(1);
    let (uri, stream_name) = match (args.next(), args.next()) {
        (Some(uri), Some(name)) => (uri, name),
        _ => bail!("usage: player-cli <rtmp-url> <stream-name>"),
    };

    let config = PlaybackConfig::new(uri, stream_name);
    let (event_tx, event_rx) = event_channel();

    let mut player =
        RtmpPlayer::new(config, event_tx).context("invalid playback configuration")?;
    let media_rx = player.start().context("failed to start playback")?;

    // Drain media on a separate thread.
    thread::spawn(move || {
        let mut packets: u64 = 0;
        let mut bytes: u64 = 0;
        while let Ok(packet) = media_rx.recv() {
            packets += 1;
            bytes += packet.data.len() as u64;
            if packets % 500 == 0 {
                info!(packets, bytes, "Media received");
            }
        }
    });

    for event in event_rx.iter() {
        match event {
            PlayerEvent::StateChanged { previous, current } => {
                info!(from = previous.name(), to = current.name(), "{}", current.message());
            }
            PlayerEvent::PlaybackStarted { stream_name } => {
                info!(stream = %stream_name, "Playback started");
            }
            PlayerEvent::MetadataReceived { description } => {
                info!(%description, "Stream metadata");
            }
            PlayerEvent::RetryScheduled { attempt, delay_ms } => {
                info!(attempt, delay_ms, "Reconnect scheduled");
            }
            PlayerEvent::RetryExhausted { attempts } => {
                error!(attempts, "Retry budget exhausted; restart to try again");
                break;
            }
            PlayerEvent::Error { message } => {
                warn!(%message, "Player error");
            }
        }
    }

    player.stop();
    Ok(())
}
