//! RTMP playback client implementation.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;
use crossbeam_channel::{Receiver, Sender};
use parking_lot::RwLock;
use rml_rtmp::handshake::{Handshake, HandshakeProcessResult, PeerType};
use rml_rtmp::sessions::{
    ClientSession, ClientSessionConfig, ClientSessionEvent, ClientSessionResult,
};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;
use tokio::runtime::Runtime;
use tracing::{debug, info, instrument, trace, warn};
use url::Url;

use player_ipc::{ConnectionState, PlaybackConfig, PlayerEvent};

use crate::error::TransportError;
use crate::idle::{IdleInhibitor, NoopIdleInhibitor};
use crate::retry::RetryPolicy;
use crate::supervisor::{Action, StatusCode, Supervisor};
use crate::{TransportResult, MEDIA_CHANNEL_CAPACITY};

/// A media payload received from the server.
#[derive(Debug, Clone)]
pub struct MediaPacket {
    /// Packet data (FLV tag payload as delivered by the session).
    pub data: Bytes,

    /// Presentation timestamp in milliseconds.
    pub timestamp_ms: u32,

    /// Whether this is a video packet.
    pub is_video: bool,
}

/// Reconnecting RTMP playback client.
///
/// Owns a single logical connection. Connect failures and peer closes
/// are retried with bounded exponential backoff; I/O errors reconnect
/// immediately. Lifecycle transitions are reported on the event channel
/// supplied at construction.
pub struct RtmpPlayer {
    config: PlaybackConfig,
    policy: RetryPolicy,
    state: Arc<RwLock<ConnectionState>>,
    runtime: Option<Runtime>,
    should_stop: Arc<AtomicBool>,
    receive_video: Arc<AtomicBool>,
    event_tx: Sender<PlayerEvent>,
    idle_inhibitor: Arc<dyn IdleInhibitor>,
}

impl RtmpPlayer {
    /// Create a new player for the given configuration.
    pub fn new(config: PlaybackConfig, event_tx: Sender<PlayerEvent>) -> TransportResult<Self> {
        validate_uri(&config.uri)?;

        if config.stream_name.is_empty() {
            return Err(TransportError::InvalidStreamName);
        }

        Ok(Self {
            receive_video: Arc::new(AtomicBool::new(config.receive_video)),
            config,
            policy: RetryPolicy::default(),
            state: Arc::new(RwLock::new(ConnectionState::Idle)),
            runtime: None,
            should_stop: Arc::new(AtomicBool::new(false)),
            event_tx,
            idle_inhibitor: Arc::new(NoopIdleInhibitor),
        })
    }

    /// Override the retry policy.
    pub fn with_retry_policy(mut self, policy: RetryPolicy) -> Self {
        self.policy = policy;
        self
    }

    /// Replace the idle inhibitor engaged while playback is active.
    pub fn with_idle_inhibitor(mut self, inhibitor: Arc<dyn IdleInhibitor>) -> Self {
        self.idle_inhibitor = inhibitor;
        self
    }

    /// Start the playback session.
    ///
    /// Returns the channel on which received media arrives. Outcome of
    /// the connect attempt is reported asynchronously on the event
    /// channel. After a terminal failure, call [`stop`](Self::stop)
    /// before starting again.
    #[instrument(name = "player_start", skip(self))]
    pub fn start(&mut self) -> TransportResult<Receiver<MediaPacket>> {
        if self.runtime.is_some() {
            return Err(TransportError::AlreadyStarted);
        }

        info!(uri = %self.config.uri, stream = %self.config.stream_name, "Starting playback");
        self.idle_inhibitor.inhibit();

        let runtime = Runtime::new().map_err(TransportError::Io)?;

        let (media_tx, media_rx): (Sender<MediaPacket>, Receiver<MediaPacket>) =
            crossbeam_channel::bounded(MEDIA_CHANNEL_CAPACITY);

        let should_stop = Arc::clone(&self.should_stop);
        should_stop.store(false, Ordering::SeqCst);

        let state = Arc::clone(&self.state);
        let receive_video = Arc::clone(&self.receive_video);
        let config = self.config.clone();
        let policy = self.policy.clone();
        let event_tx = self.event_tx.clone();

        runtime.spawn(async move {
            if let Err(e) = run_playback(
                config,
                policy,
                media_tx,
                event_tx,
                state,
                receive_video,
                should_stop,
            )
            .await
            {
                warn!("Playback session ended: {}", e);
            }
        });

        self.runtime = Some(runtime);
        Ok(media_rx)
    }

    /// Stop the session unconditionally.
    ///
    /// Idempotent, safe in any state. Cancels any pending scheduled
    /// retry, releases the idle inhibitor, and resets the retry budget
    /// (a later `start` begins from attempt 0).
    #[instrument(name = "player_stop", skip(self))]
    pub fn stop(&mut self) {
        self.should_stop.store(true, Ordering::SeqCst);

        if let Some(runtime) = self.runtime.take() {
            info!("Stopping playback");
            // Dropping the runtime cancels the connection task and any
            // pending retry sleep.
            runtime.shutdown_timeout(Duration::from_secs(5));
            self.idle_inhibitor.release();
        }

        let previous = {
            let mut guard = self.state.write();
            std::mem::replace(&mut *guard, ConnectionState::Idle)
        };
        if previous != ConnectionState::Idle {
            let _ = self.event_tx.try_send(PlayerEvent::StateChanged {
                previous,
                current: ConnectionState::Idle,
            });
        }
    }

    /// Toggle whether incoming video is processed.
    ///
    /// Does not touch the connection; audio keeps flowing while video
    /// is off. Used by hosts on background/foreground transitions.
    pub fn set_receive_video(&self, enabled: bool) {
        self.receive_video.store(enabled, Ordering::SeqCst);
    }

    /// Whether incoming video is currently processed.
    pub fn receive_video(&self) -> bool {
        self.receive_video.load(Ordering::SeqCst)
    }

    /// Get the current connection state.
    pub fn state(&self) -> ConnectionState {
        self.state.read().clone()
    }

    /// Check if connected.
    pub fn is_connected(&self) -> bool {
        self.state.read().is_connected()
    }
}

impl Drop for RtmpPlayer {
    fn drop(&mut self) {
        self.stop();
    }
}

fn validate_uri(uri: &str) -> TransportResult<()> {
    if uri.is_empty() {
        return Err(TransportError::InvalidUrl("URL must not be empty".to_string()));
    }

    if !uri.starts_with("rtmp://") && !uri.starts_with("rtmps://") {
        return Err(TransportError::InvalidUrl(
            "URL must start with rtmp:// or rtmps://".to_string(),
        ));
    }

    let parsed = Url::parse(uri).map_err(|e| TransportError::InvalidUrl(e.to_string()))?;

    if parsed.host_str().is_none() {
        return Err(TransportError::InvalidUrl("Missing host".to_string()));
    }

    if parsed.path().trim_start_matches('/').is_empty() {
        return Err(TransportError::InvalidUrl(
            "Missing application name in URL path".to_string(),
        ));
    }

    Ok(())
}

/// Publish a state change to the mirror and the event channel.
fn publish_state(
    mirror: &Arc<RwLock<ConnectionState>>,
    event_tx: &Sender<PlayerEvent>,
    current: &ConnectionState,
) {
    let previous = {
        let mut guard = mirror.write();
        if *guard == *current {
            return;
        }
        std::mem::replace(&mut *guard, current.clone())
    };

    debug!(
        previous = previous.name(),
        current = current.name(),
        "State transition"
    );

    let _ = event_tx.try_send(PlayerEvent::StateChanged {
        previous,
        current: current.clone(),
    });
}

/// How an established session ended.
enum SessionEnd {
    /// Host requested stop.
    Stopped,

    /// Peer closed the connection.
    Closed,

    /// I/O error on the wire.
    IoError(TransportError),
}

async fn run_playback(
    config: PlaybackConfig,
    policy: RetryPolicy,
    media_tx: Sender<MediaPacket>,
    event_tx: Sender<PlayerEvent>,
    state: Arc<RwLock<ConnectionState>>,
    receive_video: Arc<AtomicBool>,
    should_stop: Arc<AtomicBool>,
) -> TransportResult<()> {
    let mut supervisor = Supervisor::new(policy, config.stream_name.clone());

    loop {
        if should_stop.load(Ordering::SeqCst) {
            break;
        }

        supervisor.connecting();
        publish_state(&state, &event_tx, supervisor.state());

        let action = match connect_rtmp(&config.uri).await {
            Ok(mut connection) => {
                info!("RTMP connection established");
                let action = supervisor.on_status(StatusCode::ConnectSuccess);
                publish_state(&state, &event_tx, supervisor.state());

                if let Action::Play { stream_name } = action {
                    match start_playback(&mut connection, &stream_name).await {
                        Ok(()) => {
                            let _ = event_tx.try_send(PlayerEvent::PlaybackStarted {
                                stream_name: stream_name.clone(),
                            });

                            match pump_media(
                                connection,
                                &media_tx,
                                &event_tx,
                                &receive_video,
                                &should_stop,
                            )
                            .await
                            {
                                SessionEnd::Stopped => break,
                                SessionEnd::Closed => {
                                    warn!("Connection closed by peer");
                                    supervisor.on_status(StatusCode::ConnectClosed)
                                }
                                SessionEnd::IoError(e) => {
                                    warn!("I/O error on connection: {}", e);
                                    let _ = event_tx.try_send(PlayerEvent::Error {
                                        message: e.to_string(),
                                    });
                                    supervisor.on_io_error()
                                }
                            }
                        }
                        Err(e) => {
                            warn!("Play request failed: {}", e);
                            let _ = event_tx.try_send(PlayerEvent::Error {
                                message: e.to_string(),
                            });
                            supervisor.on_status(StatusCode::ConnectFailed)
                        }
                    }
                } else {
                    Action::None
                }
            }
            Err(e) => {
                warn!(attempt = supervisor.attempt(), "Connect attempt failed: {}", e);
                let _ = event_tx.try_send(PlayerEvent::Error {
                    message: e.to_string(),
                });
                supervisor.on_status(StatusCode::ConnectFailed)
            }
        };

        publish_state(&state, &event_tx, supervisor.state());

        match action {
            Action::ScheduleRetry { attempt, delay } => {
                info!(attempt, ?delay, "Reconnect scheduled");
                let _ = event_tx.try_send(PlayerEvent::RetryScheduled {
                    attempt,
                    delay_ms: delay.as_millis() as u64,
                });
                // Scheduled retry; cancelled when stop() drops the runtime.
                tokio::time::sleep(delay).await;
            }
            Action::RetryNow => {
                info!("Reconnecting immediately after I/O error");
            }
            Action::GiveUp { attempts } => {
                warn!(attempts, "Retry budget exhausted, giving up");
                let _ = event_tx.try_send(PlayerEvent::RetryExhausted { attempts });
                return Err(TransportError::RetryExhausted(attempts));
            }
            Action::Play { .. } | Action::None => {}
        }
    }

    Ok(())
}

/// RTMP playback connection with session state.
struct RtmpConnection {
    /// TCP stream to the RTMP server.
    stream: TcpStream,

    /// RTMP client session for protocol handling.
    session: ClientSession,
}

async fn connect_rtmp(uri: &str) -> TransportResult<RtmpConnection> {
    debug!(uri = %uri, "Connecting to RTMP server");

    // Parse URL to extract host, port, app name
    let parsed = Url::parse(uri).map_err(|e| TransportError::InvalidUrl(e.to_string()))?;

    let host = parsed
        .host_str()
        .ok_or_else(|| TransportError::InvalidUrl("Missing host".to_string()))?;
    let port = parsed.port().unwrap_or(1935);
    let app_name = parsed.path().trim_start_matches('/').to_string();

    if app_name.is_empty() {
        return Err(TransportError::InvalidUrl(
            "Missing application name in URL path".to_string(),
        ));
    }

    info!(host = %host, port = port, app = %app_name, "Connecting to RTMP server");

    // Establish TCP connection
    let addr = format!("{}:{}", host, port);
    let mut stream = TcpStream::connect(&addr)
        .await
        .map_err(|e| TransportError::Connection(format!("TCP connect failed: {}", e)))?;

    debug!("TCP connection established, starting handshake");

    // Perform RTMP handshake
    let mut handshake = Handshake::new(PeerType::Client);

    // Generate and send C0+C1
    let p0_p1 = handshake
        .generate_outbound_p0_and_p1()
        .map_err(|e| TransportError::Connection(format!("Handshake generation failed: {:?}", e)))?;
    stream
        .write_all(&p0_p1)
        .await
        .map_err(|e| TransportError::Connection(format!("Handshake write failed: {}", e)))?;

    // Read handshake response (S0+S1+S2 = 1 + 1536 + 1536 = 3073 bytes)
    let mut handshake_buf = vec![0u8; 4096];
    let mut handshake_complete = false;
    let mut leftover_bytes = Vec::new();

    while !handshake_complete {
        let n = stream
            .read(&mut handshake_buf)
            .await
            .map_err(|e| TransportError::Connection(format!("Handshake read failed: {}", e)))?;

        if n == 0 {
            return Err(TransportError::Connection(
                "Connection closed during handshake".to_string(),
            ));
        }

        match handshake.process_bytes(&handshake_buf[..n]) {
            Ok(HandshakeProcessResult::InProgress { response_bytes }) => {
                if !response_bytes.is_empty() {
                    stream.write_all(&response_bytes).await.map_err(|e| {
                        TransportError::Connection(format!("Handshake write failed: {}", e))
                    })?;
                }
            }
            Ok(HandshakeProcessResult::Completed {
                response_bytes,
                remaining_bytes,
            }) => {
                if !response_bytes.is_empty() {
                    stream.write_all(&response_bytes).await.map_err(|e| {
                        TransportError::Connection(format!("Handshake write failed: {}", e))
                    })?;
                }
                leftover_bytes = remaining_bytes;
                handshake_complete = true;
            }
            Err(e) => {
                return Err(TransportError::Connection(format!(
                    "Handshake failed: {:?}",
                    e
                )));
            }
        }
    }

    debug!("Handshake complete, creating RTMP session");

    // Create RTMP client session
    let config = ClientSessionConfig::new();
    let (mut session, initial_results) = ClientSession::new(config)
        .map_err(|e| TransportError::Connection(format!("Session creation failed: {:?}", e)))?;

    // Send initial session packets (chunk size, etc.)
    for result in initial_results {
        if let ClientSessionResult::OutboundResponse(packet) = result {
            stream
                .write_all(&packet.bytes)
                .await
                .map_err(TransportError::Io)?;
        }
    }

    // Process any leftover bytes from handshake
    if !leftover_bytes.is_empty() {
        let _ = session.handle_input(&leftover_bytes);
    }

    // Request connection to the application
    debug!(app = %app_name, "Requesting RTMP connection");
    let connect_results = session
        .request_connection(app_name)
        .map_err(|e| TransportError::Connection(format!("Connection request failed: {:?}", e)))?;

    if let ClientSessionResult::OutboundResponse(packet) = connect_results {
        stream
            .write_all(&packet.bytes)
            .await
            .map_err(TransportError::Io)?;
    }

    // Wait for connection acceptance
    let mut connected = false;
    let mut read_buf = vec![0u8; 4096];

    for _ in 0..50 {
        // Timeout after ~5 seconds
        tokio::select! {
            result = stream.read(&mut read_buf) => {
                let n = result.map_err(TransportError::Io)?;
                if n == 0 {
                    return Err(TransportError::Connection("Connection closed".to_string()));
                }

                let results = session
                    .handle_input(&read_buf[..n])
                    .map_err(|e| TransportError::Connection(format!("Session input error: {:?}", e)))?;

                for result in results {
                    match result {
                        ClientSessionResult::OutboundResponse(packet) => {
                            stream.write_all(&packet.bytes).await.map_err(TransportError::Io)?;
                        }
                        ClientSessionResult::RaisedEvent(event) => {
                            match event {
                                ClientSessionEvent::ConnectionRequestAccepted => {
                                    debug!("Connection accepted by server");
                                    connected = true;
                                }
                                ClientSessionEvent::ConnectionRequestRejected { description } => {
                                    return Err(TransportError::Connection(
                                        format!("Connection rejected: {}", description),
                                    ));
                                }
                                _ => {
                                    trace!("Received event: {:?}", event);
                                }
                            }
                        }
                        _ => {}
                    }
                }

                if connected {
                    break;
                }
            }
            _ = tokio::time::sleep(Duration::from_millis(100)) => {
                continue;
            }
        }
    }

    if !connected {
        return Err(TransportError::Connection(
            "Timeout waiting for connection acceptance".to_string(),
        ));
    }

    Ok(RtmpConnection { stream, session })
}

/// Request playback of the named stream and wait for acceptance.
async fn start_playback(connection: &mut RtmpConnection, stream_name: &str) -> TransportResult<()> {
    debug!(stream = %stream_name, "Requesting playback");

    let play_results = connection
        .session
        .request_playback(stream_name.to_string())
        .map_err(|e| TransportError::Connection(format!("Play request failed: {:?}", e)))?;

    if let ClientSessionResult::OutboundResponse(packet) = play_results {
        connection
            .stream
            .write_all(&packet.bytes)
            .await
            .map_err(TransportError::Io)?;
    }

    // Wait for playback acceptance
    let mut playing = false;
    let mut read_buf = vec![0u8; 4096];

    for _ in 0..30 {
        tokio::select! {
            result = connection.stream.read(&mut read_buf) => {
                let n = result.map_err(TransportError::Io)?;
                if n == 0 {
                    return Err(TransportError::ConnectionClosed);
                }

                let results = connection
                    .session
                    .handle_input(&read_buf[..n])
                    .map_err(|e| TransportError::Connection(format!("Session input error: {:?}", e)))?;

                for result in results {
                    match result {
                        ClientSessionResult::OutboundResponse(packet) => {
                            connection
                                .stream
                                .write_all(&packet.bytes)
                                .await
                                .map_err(TransportError::Io)?;
                        }
                        ClientSessionResult::RaisedEvent(
                            ClientSessionEvent::PlaybackRequestAccepted,
                        ) => {
                            debug!("Playback request accepted");
                            playing = true;
                        }
                        ClientSessionResult::RaisedEvent(event) => {
                            trace!("Received event: {:?}", event);
                        }
                        _ => {}
                    }
                }

                if playing {
                    break;
                }
            }
            _ = tokio::time::sleep(Duration::from_millis(100)) => {
                continue;
            }
        }
    }

    if !playing {
        return Err(TransportError::Connection(
            "Timeout waiting for playback acceptance".to_string(),
        ));
    }

    info!(stream = %stream_name, "Playback started");
    Ok(())
}

/// Pump received media into the host channel until the session ends.
async fn pump_media(
    mut connection: RtmpConnection,
    media_tx: &Sender<MediaPacket>,
    event_tx: &Sender<PlayerEvent>,
    receive_video: &Arc<AtomicBool>,
    should_stop: &Arc<AtomicBool>,
) -> SessionEnd {
    let mut read_buf = vec![0u8; 8192];
    let mut video_dropped: u64 = 0;

    loop {
        if should_stop.load(Ordering::SeqCst) {
            return SessionEnd::Stopped;
        }

        tokio::select! {
            result = connection.stream.read(&mut read_buf) => {
                let n = match result {
                    Ok(0) => return SessionEnd::Closed,
                    Ok(n) => n,
                    Err(e) => return SessionEnd::IoError(TransportError::Io(e)),
                };

                let results = match connection.session.handle_input(&read_buf[..n]) {
                    Ok(results) => results,
                    Err(e) => {
                        return SessionEnd::IoError(TransportError::Protocol(format!("{:?}", e)));
                    }
                };

                for result in results {
                    match result {
                        ClientSessionResult::OutboundResponse(packet) => {
                            if let Err(e) = connection.stream.write_all(&packet.bytes).await {
                                return SessionEnd::IoError(TransportError::Io(e));
                            }
                        }
                        ClientSessionResult::RaisedEvent(event) => match event {
                            ClientSessionEvent::VideoDataReceived { data, timestamp } => {
                                if receive_video.load(Ordering::SeqCst) {
                                    forward_media(media_tx, data, timestamp.value, true);
                                } else {
                                    // Backgrounded: video dropped, audio continues.
                                    video_dropped += 1;
                                    if video_dropped % 1000 == 1 {
                                        trace!(video_dropped, "Dropping video while disabled");
                                    }
                                }
                            }
                            ClientSessionEvent::AudioDataReceived { data, timestamp } => {
                                forward_media(media_tx, data, timestamp.value, false);
                            }
                            ClientSessionEvent::StreamMetadataReceived { metadata } => {
                                debug!(?metadata, "Stream metadata received");
                                let _ = event_tx.try_send(PlayerEvent::MetadataReceived {
                                    description: format!("{:?}", metadata),
                                });
                            }
                            other => {
                                trace!("Received event: {:?}", other);
                            }
                        },
                        _ => {}
                    }
                }
            }
            _ = tokio::time::sleep(Duration::from_millis(100)) => {
                continue;
            }
        }
    }
}

fn forward_media(media_tx: &Sender<MediaPacket>, data: Bytes, timestamp_ms: u32, is_video: bool) {
    let packet = MediaPacket {
        data,
        timestamp_ms,
        is_video,
    };

    // Never block the connection task; a slow host loses packets.
    if media_tx.try_send(packet).is_err() {
        warn!(is_video, "Media channel full, dropping packet");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use player_ipc::event_channel;

    fn config() -> PlaybackConfig {
        PlaybackConfig::new("rtmp://localhost/live", "stream")
    }

    #[test]
    fn test_rejects_empty_uri() {
        let (tx, _rx) = event_channel();
        let result = RtmpPlayer::new(PlaybackConfig::new("", "stream"), tx);
        assert!(matches!(result, Err(TransportError::InvalidUrl(_))));
    }

    #[test]
    fn test_rejects_non_rtmp_scheme() {
        let (tx, _rx) = event_channel();
        let result = RtmpPlayer::new(PlaybackConfig::new("http://example.com/live", "stream"), tx);
        assert!(matches!(result, Err(TransportError::InvalidUrl(_))));
    }

    #[test]
    fn test_rejects_missing_app_name() {
        let (tx, _rx) = event_channel();
        let result = RtmpPlayer::new(PlaybackConfig::new("rtmp://example.com", "stream"), tx);
        assert!(matches!(result, Err(TransportError::InvalidUrl(_))));
    }

    #[test]
    fn test_rejects_empty_stream_name() {
        let (tx, _rx) = event_channel();
        let result = RtmpPlayer::new(PlaybackConfig::new("rtmp://example.com/live", ""), tx);
        assert!(matches!(result, Err(TransportError::InvalidStreamName)));
    }

    #[test]
    fn test_stop_is_idempotent_in_any_state() {
        let (tx, _rx) = event_channel();
        let mut player = RtmpPlayer::new(config(), tx).unwrap();

        // Stop before start, twice; state stays Idle.
        player.stop();
        player.stop();
        assert!(player.state().is_idle());
    }

    #[test]
    fn test_receive_video_toggle_does_not_touch_state() {
        let (tx, _rx) = event_channel();
        let player = RtmpPlayer::new(config(), tx).unwrap();

        let before = player.state();
        player.set_receive_video(false);
        assert!(!player.receive_video());
        player.set_receive_video(true);
        assert!(player.receive_video());
        assert_eq!(player.state(), before);
    }

    #[test]
    fn test_initial_receive_video_comes_from_config() {
        let (tx, _rx) = event_channel();
        let mut cfg = config();
        cfg.receive_video = false;
        let player = RtmpPlayer::new(cfg, tx).unwrap();
        assert!(!player.receive_video());
    }
}
