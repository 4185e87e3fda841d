//! `InterviewClient` — top-level lifecycle controller.
//!
//! ## Lifecycle
//!
//! ```text
//! InterviewClient::new()
//!     └─► connect(session_id)   → playback open, transport actor spawned
//!         └─► start_capture()   → microphone open, capture worker spawned
//!             └─► stop_capture()
//!         └─► disconnect()      → normal close, streams dropped
//! ```
//!
//! Lifecycle misuse (`start_capture` while running, `stop_capture` while
//! stopped) returns an error rather than panicking. A second `connect`
//! replaces the previous connection.
//!
//! ## Threading
//!
//! `cpal::Stream` is `!Send` on Windows/macOS, so capture and playback are
//! created *inside* `spawn_blocking` closures and never cross a thread
//! boundary. A sync oneshot channel carries open-device errors back to the
//! caller.

pub mod capture_worker;

use std::sync::{
    atomic::{AtomicBool, AtomicU64, Ordering},
    Arc,
};
use std::time::Duration;

use parking_lot::Mutex;
use tokio::sync::{broadcast, mpsc};
use tracing::info;

use crate::{
    audio::{AudioCapture, AudioPlayback},
    buffering::create_capture_ring,
    error::{ParleyError, Result},
    events::{AudioActivityEvent, ClientEvent, ConnectionStatus},
    protocol::ClientCommand,
    session::SessionState,
    transport::{SessionTransport, TransportConfig, TransportEvent},
    turn::TurnConfig,
};

/// Broadcast capacity: 256 events buffered for slow subscribers.
const BROADCAST_CAP: usize = 256;

#[derive(Debug, Clone, Default)]
pub struct ClientConfig {
    pub transport: TransportConfig,
    pub turn: TurnConfig,
    /// Input device name; `None` selects the system default.
    pub preferred_input_device: Option<String>,
}

/// The top-level client handle.
///
/// `Send + Sync` via interior mutability; wrap in `Arc` to share between
/// the host UI and event-forwarding tasks.
pub struct InterviewClient {
    config: ClientConfig,
    state: Arc<Mutex<SessionState>>,
    transport: Mutex<Option<SessionTransport>>,
    /// `true` while the capture stream + worker are active.
    capturing: Arc<AtomicBool>,
    /// `true` while the playback stream is active.
    playback_running: Arc<AtomicBool>,
    playback_tx: Mutex<Option<crossbeam_channel::Sender<Vec<i16>>>>,
    event_tx: broadcast::Sender<ClientEvent>,
    activity_tx: broadcast::Sender<AudioActivityEvent>,
    /// Monotonic sequence for activity events.
    seq: Arc<AtomicU64>,
    /// Bumped on every connect/teardown so a replaced connection's event
    /// loop stops folding into the new session's state.
    generation: Arc<AtomicU64>,
}

impl InterviewClient {
    pub fn new(config: ClientConfig) -> Self {
        let (event_tx, _) = broadcast::channel(BROADCAST_CAP);
        let (activity_tx, _) = broadcast::channel(BROADCAST_CAP);

        Self {
            config,
            state: Arc::new(Mutex::new(SessionState::new(""))),
            transport: Mutex::new(None),
            capturing: Arc::new(AtomicBool::new(false)),
            playback_running: Arc::new(AtomicBool::new(false)),
            playback_tx: Mutex::new(None),
            event_tx,
            activity_tx,
            seq: Arc::new(AtomicU64::new(0)),
            generation: Arc::new(AtomicU64::new(0)),
        }
    }

    /// Opens the playback stream and spawns the transport actor for one
    /// session, replacing any previous connection.
    ///
    /// Returns once the output device is confirmed open. The socket itself
    /// connects in the background: the outcome arrives as `Connection`
    /// events (and `ReconnectsExhausted` if every attempt fails).
    ///
    /// Must be called within a tokio runtime.
    ///
    /// # Errors
    /// `ParleyError::NoDefaultOutputDevice` / `ParleyError::AudioStream` on
    /// playback device failure.
    pub fn connect(&self, session_id: &str) -> Result<()> {
        self.teardown_connection();

        // The generation bump shares the state lock with the reset so a
        // previous connection's event loop can never fold into this session.
        let generation = {
            let mut state = self.state.lock();
            let generation = self.generation.fetch_add(1, Ordering::SeqCst) + 1;
            *state = SessionState::new(session_id);
            let event = state.set_connection(ConnectionStatus::Connecting);
            let _ = self.event_tx.send(event);
            generation
        };

        let playback_tx = match self.open_playback() {
            Ok(tx) => tx,
            Err(e) => {
                self.mark_connect_failed();
                return Err(e);
            }
        };
        *self.playback_tx.lock() = Some(playback_tx.clone());

        let (transport, event_rx) =
            SessionTransport::connect(self.config.transport.clone(), session_id);
        *self.transport.lock() = Some(transport);

        tokio::spawn(event_loop(
            event_rx,
            Arc::clone(&self.state),
            self.event_tx.clone(),
            playback_tx,
            generation,
            Arc::clone(&self.generation),
        ));

        info!(session_id, "client connected to session");
        Ok(())
    }

    /// Opens the microphone and spawns the capture worker.
    ///
    /// Blocks until the input device is confirmed open (or fails), then
    /// returns; the worker keeps running on a background blocking thread.
    ///
    /// # Errors
    /// - `ParleyError::AlreadyCapturing` if capture is active.
    /// - `ParleyError::NotConnected` before `connect`.
    /// - `ParleyError::NoDefaultInputDevice` / `ParleyError::AudioStream`
    ///   on device failure; no retry is attempted.
    pub fn start_capture(&self) -> Result<()> {
        if self.capturing.load(Ordering::SeqCst) {
            return Err(ParleyError::AlreadyCapturing);
        }
        let transport = {
            let guard = self.transport.lock();
            guard.as_ref().ok_or(ParleyError::NotConnected)?.handle()
        };

        self.capturing.store(true, Ordering::SeqCst);

        let (producer, consumer) = create_capture_ring();
        let running = Arc::clone(&self.capturing);
        let turn_config = self.config.turn.clone();
        let activity_tx = self.activity_tx.clone();
        let seq = Arc::clone(&self.seq);
        let preferred = self.config.preferred_input_device.clone();

        // Sync oneshot: the worker thread reports open success/failure,
        // carrying the actual capture sample rate.
        let (open_tx, open_rx) = std::sync::mpsc::channel::<Result<u32>>();

        tokio::task::spawn_blocking(move || {
            // The stream must be created and dropped on this thread.
            let capture = match AudioCapture::open_with_preference(
                producer,
                Arc::clone(&running),
                preferred.as_deref(),
            ) {
                Ok(c) => {
                    let _ = open_tx.send(Ok(c.sample_rate));
                    c
                }
                Err(e) => {
                    let _ = open_tx.send(Err(e));
                    running.store(false, Ordering::SeqCst);
                    return;
                }
            };

            let capture_sample_rate = capture.sample_rate;
            capture_worker::run(capture_worker::WorkerContext {
                consumer,
                running,
                transport,
                turn_config,
                activity_tx,
                seq,
                capture_sample_rate,
            });

            // Releases the audio device on this thread.
            drop(capture);
        });

        match open_rx.recv() {
            Ok(Ok(rate)) => {
                info!(capture_sample_rate = rate, "capture started");
                Ok(())
            }
            Ok(Err(e)) => {
                self.capturing.store(false, Ordering::SeqCst);
                Err(e)
            }
            Err(_) => {
                self.capturing.store(false, Ordering::SeqCst);
                Err(ParleyError::Other(anyhow::anyhow!(
                    "capture task died before reporting device state"
                )))
            }
        }
    }

    /// Stops the capture worker; the stream drops on its own thread.
    ///
    /// # Errors
    /// `ParleyError::NotCapturing` if capture is not active.
    pub fn stop_capture(&self) -> Result<()> {
        if !self.capturing.load(Ordering::SeqCst) {
            return Err(ParleyError::NotCapturing);
        }
        self.capturing.store(false, Ordering::SeqCst);
        info!("capture stop requested");
        Ok(())
    }

    /// Deliberate teardown: stops capture and playback, closes the socket
    /// with the normal code, and cancels any scheduled reconnect. Safe to
    /// call repeatedly.
    pub fn disconnect(&self) {
        if self.capturing.load(Ordering::SeqCst) {
            let _ = self.stop_capture();
        }
        self.teardown_connection();
        let event = self
            .state
            .lock()
            .set_connection(ConnectionStatus::Disconnected);
        let _ = self.event_tx.send(event);
        info!("client disconnected");
    }

    /// Sends a typed answer in place of speech.
    ///
    /// # Errors
    /// `ParleyError::NotConnected` before `connect`. While the socket is
    /// down mid-session the message is silently dropped, like audio.
    pub fn send_text(&self, text: &str) -> Result<()> {
        let guard = self.transport.lock();
        let transport = guard.as_ref().ok_or(ParleyError::NotConnected)?;
        transport.handle().send_control(ClientCommand::TextInput {
            text: text.to_owned(),
        });
        Ok(())
    }

    /// Snapshot of the current session state.
    pub fn snapshot(&self) -> SessionState {
        self.state.lock().clone()
    }

    pub fn connection_status(&self) -> ConnectionStatus {
        self.state.lock().connection
    }

    pub fn is_capturing(&self) -> bool {
        self.capturing.load(Ordering::SeqCst)
    }

    /// Subscribe to state-change events (transcript, phase, connection...).
    pub fn subscribe_events(&self) -> broadcast::Receiver<ClientEvent> {
        self.event_tx.subscribe()
    }

    /// Subscribe to per-frame capture activity (RMS levels, turn signals).
    pub fn subscribe_activity(&self) -> broadcast::Receiver<AudioActivityEvent> {
        self.activity_tx.subscribe()
    }

    // ── Internal helpers ─────────────────────────────────────────────────

    /// Opens the output stream on its own blocking thread and returns the
    /// sender feeding it. Blocks until the device is confirmed open.
    fn open_playback(&self) -> Result<crossbeam_channel::Sender<Vec<i16>>> {
        let (playback_tx, playback_rx) = crossbeam_channel::unbounded::<Vec<i16>>();
        self.playback_running.store(true, Ordering::SeqCst);
        let running = Arc::clone(&self.playback_running);

        let (open_tx, open_rx) = std::sync::mpsc::channel::<Result<()>>();
        tokio::task::spawn_blocking(move || {
            let playback = match AudioPlayback::open_default(playback_rx, Arc::clone(&running)) {
                Ok(p) => {
                    let _ = open_tx.send(Ok(()));
                    p
                }
                Err(e) => {
                    let _ = open_tx.send(Err(e));
                    running.store(false, Ordering::SeqCst);
                    return;
                }
            };

            // Park until teardown; the callback does all the work.
            while running.load(Ordering::Relaxed) {
                std::thread::sleep(Duration::from_millis(50));
            }
            drop(playback);
        });

        match open_rx.recv() {
            Ok(Ok(())) => Ok(playback_tx),
            Ok(Err(e)) => {
                self.playback_running.store(false, Ordering::SeqCst);
                Err(e)
            }
            Err(_) => {
                self.playback_running.store(false, Ordering::SeqCst);
                Err(ParleyError::Other(anyhow::anyhow!(
                    "playback task died before reporting device state"
                )))
            }
        }
    }

    /// Leaves a failed `connect` in the same observable state as a fresh
    /// client rather than stranding it at `Connecting`.
    fn mark_connect_failed(&self) {
        let event = self
            .state
            .lock()
            .set_connection(ConnectionStatus::Disconnected);
        let _ = self.event_tx.send(event);
    }

    fn teardown_connection(&self) {
        if let Some(transport) = self.transport.lock().take() {
            transport.disconnect();
        }
        self.playback_running.store(false, Ordering::SeqCst);
        self.playback_tx.lock().take();
    }
}

impl Drop for InterviewClient {
    fn drop(&mut self) {
        self.capturing.store(false, Ordering::SeqCst);
        self.playback_running.store(false, Ordering::SeqCst);
    }
}

/// Folds transport events into session state and fans the changes out.
/// Ends when the transport actor closes its channel, or early when a
/// replacement `connect` bumps the generation counter. The generation is
/// checked under the state lock, the same lock `connect` bumps it under,
/// so a stale loop cannot write the old connection's terminal events into
/// the new session.
async fn event_loop(
    mut event_rx: mpsc::UnboundedReceiver<TransportEvent>,
    state: Arc<Mutex<SessionState>>,
    event_tx: broadcast::Sender<ClientEvent>,
    playback_tx: crossbeam_channel::Sender<Vec<i16>>,
    my_generation: u64,
    generation: Arc<AtomicU64>,
) {
    while let Some(event) = event_rx.recv().await {
        let mut guard = state.lock();
        if generation.load(Ordering::SeqCst) != my_generation {
            return;
        }
        match event {
            TransportEvent::Connected => {
                let change = guard.set_connection(ConnectionStatus::Connected);
                let _ = event_tx.send(change);
            }
            TransportEvent::Audio(pcm) => {
                // Dropped on the floor once playback has been torn down.
                let _ = playback_tx.send(pcm);
            }
            TransportEvent::Event(server_event) => {
                let change = guard.apply(&server_event);
                if let Some(change) = change {
                    let _ = event_tx.send(change);
                }
            }
            TransportEvent::Disconnected { reconnecting } => {
                let status = if reconnecting {
                    ConnectionStatus::Reconnecting
                } else {
                    ConnectionStatus::Disconnected
                };
                let change = guard.set_connection(status);
                let _ = event_tx.send(change);
            }
            TransportEvent::ReconnectsExhausted => {
                let _ = event_tx.send(ClientEvent::ReconnectsExhausted);
            }
        }
    }
}
