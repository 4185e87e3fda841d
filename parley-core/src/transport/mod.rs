//! WebSocket session transport.
//!
//! One logical connection per interview session, owned by an actor task.
//! The actor demultiplexes inbound traffic by frame type only: Binary is
//! PCM audio, Text is a tagged control message. Everything the rest of the
//! client needs arrives as [`TransportEvent`]s on an mpsc channel; commands
//! travel the other way through a cloneable [`TransportHandle`].
//!
//! Abnormal drops are retried with linear backoff (`attempt × base_delay`)
//! up to a bounded attempt count; a deliberate [`SessionTransport::disconnect`]
//! disables retries and closes with the normal code.

mod reconnect;

pub use reconnect::ReconnectPolicy;

use std::sync::{
    atomic::{AtomicBool, Ordering},
    Arc,
};
use std::time::Duration;

use futures_util::{SinkExt, StreamExt};
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::sync::mpsc;
use tokio_tungstenite::{
    connect_async,
    tungstenite::protocol::{frame::coding::CloseCode, CloseFrame, Message},
    WebSocketStream,
};
use tracing::{debug, info, warn};

use crate::buffering::AudioFrame;
use crate::protocol::{pcm_from_bytes, pcm_to_bytes, ClientCommand, ServerEvent};

#[derive(Debug, Clone)]
pub struct TransportConfig {
    /// WebSocket base URL, e.g. `ws://localhost:8000`.
    pub server_url: String,
    pub max_reconnect_attempts: u32,
    pub reconnect_base_delay: Duration,
}

impl Default for TransportConfig {
    fn default() -> Self {
        Self {
            server_url: "ws://127.0.0.1:8000".into(),
            max_reconnect_attempts: 3,
            reconnect_base_delay: Duration::from_secs(2),
        }
    }
}

impl TransportConfig {
    pub fn session_url(&self, session_id: &str) -> String {
        format!(
            "{}/ws/interview/{session_id}",
            self.server_url.trim_end_matches('/')
        )
    }
}

/// Inbound notifications from the transport actor.
#[derive(Debug, Clone, PartialEq)]
pub enum TransportEvent {
    Connected,
    /// Decoded PCM from a binary frame.
    Audio(Vec<i16>),
    /// Parsed control message from a text frame.
    Event(ServerEvent),
    /// The socket is down. `reconnecting` tells the consumer whether a
    /// retry is already scheduled.
    Disconnected { reconnecting: bool },
    /// The retry budget is spent; the transport is terminally down.
    ReconnectsExhausted,
}

pub(crate) enum Command {
    SendAudio(AudioFrame),
    SendControl(ClientCommand),
    Disconnect,
}

/// Cheap cloneable sender half of the transport. Sends silently drop while
/// the socket is down; audio loss during a reconnect window is accepted.
#[derive(Clone)]
pub struct TransportHandle {
    cmd_tx: mpsc::UnboundedSender<Command>,
    connected: Arc<AtomicBool>,
}

impl TransportHandle {
    pub fn is_connected(&self) -> bool {
        self.connected.load(Ordering::Acquire)
    }

    pub fn send_audio(&self, frame: AudioFrame) {
        if !self.is_connected() {
            debug!("dropping audio frame while disconnected");
            return;
        }
        let _ = self.cmd_tx.send(Command::SendAudio(frame));
    }

    pub fn send_control(&self, command: ClientCommand) {
        if !self.is_connected() {
            debug!("dropping control message while disconnected");
            return;
        }
        let _ = self.cmd_tx.send(Command::SendControl(command));
    }

    /// Handle wired to a bare channel instead of an actor, for exercising
    /// producers of commands in isolation.
    #[cfg(test)]
    pub(crate) fn detached(
        connected: bool,
    ) -> (Self, mpsc::UnboundedReceiver<Command>) {
        let (cmd_tx, cmd_rx) = mpsc::unbounded_channel();
        (
            Self {
                cmd_tx,
                connected: Arc::new(AtomicBool::new(connected)),
            },
            cmd_rx,
        )
    }
}

/// Owner of the actor's command side. Dropping it requests a disconnect;
/// the actor task exits on its own once the close handshake finishes.
pub struct SessionTransport {
    handle: TransportHandle,
}

impl SessionTransport {
    /// Spawns the connection actor for one session. The first `Connected`
    /// (or, if every attempt fails, `ReconnectsExhausted`) arrives on the
    /// returned event channel. Must be called within a tokio runtime.
    pub fn connect(
        config: TransportConfig,
        session_id: &str,
    ) -> (Self, mpsc::UnboundedReceiver<TransportEvent>) {
        let (cmd_tx, cmd_rx) = mpsc::unbounded_channel();
        let (event_tx, event_rx) = mpsc::unbounded_channel();
        let connected = Arc::new(AtomicBool::new(false));

        let url = config.session_url(session_id);
        let policy = ReconnectPolicy::new(config.max_reconnect_attempts, config.reconnect_base_delay);
        tokio::spawn(run_actor(
            url,
            policy,
            cmd_rx,
            event_tx,
            Arc::clone(&connected),
        ));

        (
            Self {
                handle: TransportHandle { cmd_tx, connected },
            },
            event_rx,
        )
    }

    pub fn handle(&self) -> TransportHandle {
        self.handle.clone()
    }

    /// Deliberate teardown: closes with the normal code and cancels any
    /// pending reconnect attempt. Idempotent.
    pub fn disconnect(&self) {
        let _ = self.handle.cmd_tx.send(Command::Disconnect);
    }

    pub fn is_connected(&self) -> bool {
        self.handle.is_connected()
    }
}

impl Drop for SessionTransport {
    fn drop(&mut self) {
        self.disconnect();
    }
}

/// Why a drive loop ended.
enum DriveOutcome {
    /// Peer closed with the normal code; no retry.
    Graceful,
    /// Error or abnormal close; eligible for retry.
    Abnormal,
    /// Local `disconnect()`; no retry.
    Local,
}

async fn run_actor(
    url: String,
    mut policy: ReconnectPolicy,
    mut cmd_rx: mpsc::UnboundedReceiver<Command>,
    event_tx: mpsc::UnboundedSender<TransportEvent>,
    connected: Arc<AtomicBool>,
) {
    loop {
        match connect_async(url.as_str()).await {
            Ok((ws, _response)) => {
                policy.record_open();
                connected.store(true, Ordering::Release);
                info!(url = %url, "session socket open");
                let _ = event_tx.send(TransportEvent::Connected);

                let outcome = drive(ws, &mut cmd_rx, &event_tx).await;
                connected.store(false, Ordering::Release);

                match outcome {
                    DriveOutcome::Graceful | DriveOutcome::Local => {
                        let _ = event_tx.send(TransportEvent::Disconnected {
                            reconnecting: false,
                        });
                        return;
                    }
                    DriveOutcome::Abnormal => {}
                }
            }
            Err(e) => {
                warn!(url = %url, error = %e, "connect failed");
            }
        }

        match policy.next_delay() {
            Some(delay) => {
                let _ = event_tx.send(TransportEvent::Disconnected { reconnecting: true });
                info!(
                    attempt = policy.attempts_used(),
                    delay_ms = delay.as_millis() as u64,
                    "scheduling reconnect"
                );
                if !wait_backoff(delay, &mut cmd_rx).await {
                    // Deliberate disconnect while waiting.
                    let _ = event_tx.send(TransportEvent::Disconnected {
                        reconnecting: false,
                    });
                    return;
                }
            }
            None => {
                let _ = event_tx.send(TransportEvent::Disconnected {
                    reconnecting: false,
                });
                let _ = event_tx.send(TransportEvent::ReconnectsExhausted);
                warn!(url = %url, "reconnect attempts exhausted");
                return;
            }
        }
    }
}

/// Runs one live connection until it ends. Generic over the stream so the
/// integration tests can drive plain-TCP loopback sockets.
async fn drive<S>(
    ws: WebSocketStream<S>,
    cmd_rx: &mut mpsc::UnboundedReceiver<Command>,
    event_tx: &mpsc::UnboundedSender<TransportEvent>,
) -> DriveOutcome
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    let (mut sink, mut stream) = ws.split();

    loop {
        tokio::select! {
            cmd = cmd_rx.recv() => match cmd {
                Some(Command::SendAudio(frame)) => {
                    let bytes = pcm_to_bytes(&frame.samples);
                    if sink.send(Message::Binary(bytes)).await.is_err() {
                        return DriveOutcome::Abnormal;
                    }
                }
                Some(Command::SendControl(command)) => match serde_json::to_string(&command) {
                    Ok(json) => {
                        if sink.send(Message::Text(json)).await.is_err() {
                            return DriveOutcome::Abnormal;
                        }
                    }
                    Err(e) => warn!(error = %e, "failed to encode control message"),
                },
                Some(Command::Disconnect) | None => {
                    let _ = sink
                        .send(Message::Close(Some(CloseFrame {
                            code: CloseCode::Normal,
                            reason: "client disconnect".into(),
                        })))
                        .await;
                    let _ = sink.flush().await;
                    return DriveOutcome::Local;
                }
            },
            msg = stream.next() => match msg {
                Some(Ok(Message::Binary(bytes))) => {
                    let _ = event_tx.send(TransportEvent::Audio(pcm_from_bytes(&bytes)));
                }
                Some(Ok(Message::Text(text))) => {
                    match serde_json::from_str::<ServerEvent>(&text) {
                        Ok(event) => {
                            let _ = event_tx.send(TransportEvent::Event(event));
                        }
                        // Malformed JSON never tears down the socket.
                        Err(e) => warn!(error = %e, "dropping unparseable control message"),
                    }
                }
                Some(Ok(Message::Ping(payload))) => {
                    if sink.send(Message::Pong(payload)).await.is_err() {
                        return DriveOutcome::Abnormal;
                    }
                }
                Some(Ok(Message::Pong(_))) | Some(Ok(Message::Frame(_))) => {}
                Some(Ok(Message::Close(frame))) => {
                    let graceful = frame
                        .map(|f| f.code == CloseCode::Normal)
                        .unwrap_or(false);
                    debug!(graceful, "peer closed session socket");
                    return if graceful {
                        DriveOutcome::Graceful
                    } else {
                        DriveOutcome::Abnormal
                    };
                }
                Some(Err(e)) => {
                    warn!(error = %e, "session socket error");
                    return DriveOutcome::Abnormal;
                }
                None => return DriveOutcome::Abnormal,
            }
        }
    }
}

/// Sleeps out a backoff window while still honoring deliberate disconnects.
/// Returns `false` when the retry should be abandoned. Queued sends arriving
/// while the socket is down are discarded.
async fn wait_backoff(delay: Duration, cmd_rx: &mut mpsc::UnboundedReceiver<Command>) -> bool {
    let sleep = tokio::time::sleep(delay);
    tokio::pin!(sleep);

    loop {
        tokio::select! {
            _ = &mut sleep => return true,
            cmd = cmd_rx.recv() => match cmd {
                Some(Command::Disconnect) | None => return false,
                Some(_) => debug!("dropping send during reconnect backoff"),
            }
        }
    }
}
