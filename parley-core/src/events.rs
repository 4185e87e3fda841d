//! Events broadcast to the presentation layer.

use serde::Serialize;

use crate::protocol::Phase;
use crate::session::TranscriptEntry;

/// Connection lifecycle as seen by subscribers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ConnectionStatus {
    Disconnected,
    Connecting,
    Connected,
    Reconnecting,
}

/// State-change notifications fanned out by [`crate::client::InterviewClient`].
///
/// These are derived from the session fold, so subscribers can render
/// incrementally without re-diffing the full snapshot.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "kind", rename_all = "camelCase")]
pub enum ClientEvent {
    Connection { status: ConnectionStatus },
    ReconnectsExhausted,
    Transcript { entry: TranscriptEntry },
    Phase { phase: Phase },
    Progress {
        question_number: u32,
        total_questions: u32,
    },
    Completed,
    Notice { message: String },
}

/// Per-frame capture telemetry for level meters and turn-taking UI.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AudioActivityEvent {
    pub seq: u64,
    pub rms: f32,
    pub end_of_turn: bool,
}
