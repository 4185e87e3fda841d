//! Wire protocol for the interview WebSocket.
//!
//! A single socket carries two kinds of traffic, demultiplexed by frame type:
//!
//! - **Binary** frames are raw PCM: client → server 16 kHz mono i16 LE,
//!   server → client 24 kHz mono i16 LE. No header, no length prefix.
//! - **Text** frames are JSON objects tagged by a `type` field.

use serde::{Deserialize, Serialize};

/// Interview phase as reported by the server. Forward-only by remote
/// contract; the client trusts whatever arrives (last-writer-wins).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Phase {
    Greeting,
    Questions,
    Closing,
    Complete,
}

impl Phase {
    pub fn is_terminal(self) -> bool {
        matches!(self, Phase::Complete)
    }
}

/// Who produced a transcript line.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Agent,
}

/// Control messages sent by the server over text frames.
///
/// The `Unknown` catch-all lets newer servers add tags without breaking
/// older clients: an unrecognized `type` deserializes instead of erroring,
/// and the session fold ignores it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ServerEvent {
    Transcript {
        role: Role,
        text: String,
        is_final: bool,
    },
    Phase {
        phase: Phase,
    },
    Metadata {
        question_number: u32,
        total_questions: u32,
    },
    InterviewComplete {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        session_id: Option<String>,
    },
    Error {
        message: String,
    },
    #[serde(other)]
    Unknown,
}

/// Control messages sent by the client over text frames.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ClientCommand {
    TextInput { text: String },
    EndOfTurn,
}

/// Serializes i16 PCM to the little-endian byte layout used on the wire.
pub fn pcm_to_bytes(samples: &[i16]) -> Vec<u8> {
    let mut bytes = Vec::with_capacity(samples.len() * 2);
    for s in samples {
        bytes.extend_from_slice(&s.to_le_bytes());
    }
    bytes
}

/// Parses little-endian i16 PCM from raw bytes. A trailing odd byte is
/// dropped; servers never send one but a truncated frame should not panic.
pub fn pcm_from_bytes(bytes: &[u8]) -> Vec<i16> {
    bytes
        .chunks_exact(2)
        .map(|pair| i16::from_le_bytes([pair[0], pair[1]]))
        .collect()
}
