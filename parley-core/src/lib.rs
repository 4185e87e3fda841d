//! # parley-core
//!
//! Reusable voice-interview session SDK.
//!
//! ```text
//! Microphone ─► AudioCapture ─► SPSC ring ─► capture worker (blocking thread)
//!                                                 │ resample → 4096-sample frames
//!                                                 │ TurnDetector (end-of-turn)
//!                                                 ▼
//!                               SessionTransport ══ one WebSocket ══ server
//!                                                 │
//!                        binary PCM ─► PlaybackQueue ─► AudioPlayback
//!                        text JSON  ─► SessionState fold ─► ClientEvent fan-out
//! ```
//!
//! Audio callbacks are allocation-free and lock-free; heap and network work
//! happens on the capture worker thread and the tokio event loop.

#![forbid(unsafe_code)]
#![warn(clippy::all)]

pub mod api;
pub mod audio;
pub mod buffering;
pub mod client;
pub mod error;
pub mod events;
pub mod protocol;
pub mod session;
pub mod transport;
pub mod turn;

pub use client::{ClientConfig, InterviewClient};
pub use error::{ParleyError, Result};
pub use events::{AudioActivityEvent, ClientEvent, ConnectionStatus};
pub use protocol::{ClientCommand, Phase, Role, ServerEvent};
pub use session::{SessionState, TranscriptEntry};
pub use transport::{SessionTransport, TransportConfig, TransportEvent, TransportHandle};
pub use turn::{TurnConfig, TurnDetector};
