//! Session state machine.
//!
//! All inbound control messages fold into a single [`SessionState`] owned by
//! the client event loop. The fold is pure with respect to I/O: it mutates
//! the state and reports what changed as a [`ClientEvent`] for subscribers.

use serde::Serialize;
use tracing::{debug, warn};

use crate::events::{ClientEvent, ConnectionStatus};
use crate::protocol::{Phase, Role, ServerEvent};

/// One line of the interview transcript.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TranscriptEntry {
    pub role: Role,
    pub text: String,
    pub is_final: bool,
}

#[derive(Debug, Clone, Serialize)]
pub struct SessionState {
    pub session_id: String,
    pub phase: Phase,
    pub transcript: Vec<TranscriptEntry>,
    pub question_number: u32,
    pub total_questions: u32,
    pub connection: ConnectionStatus,
    pub completed: bool,
    pub last_error: Option<String>,
}

impl SessionState {
    pub fn new(session_id: impl Into<String>) -> Self {
        Self {
            session_id: session_id.into(),
            phase: Phase::Greeting,
            transcript: Vec::new(),
            question_number: 0,
            total_questions: 0,
            connection: ConnectionStatus::Disconnected,
            completed: false,
            last_error: None,
        }
    }

    /// Folds one server event into the state, returning the notification
    /// subscribers should receive, if any.
    pub fn apply(&mut self, event: &ServerEvent) -> Option<ClientEvent> {
        match event {
            ServerEvent::Transcript {
                role,
                text,
                is_final,
            } => {
                let entry = self.merge_transcript(*role, text, *is_final);
                Some(ClientEvent::Transcript { entry })
            }
            ServerEvent::Phase { phase } => {
                // Last-writer-wins by remote contract; the server only
                // moves forward but nothing here enforces that.
                self.phase = *phase;
                if phase.is_terminal() {
                    self.completed = true;
                }
                Some(ClientEvent::Phase { phase: *phase })
            }
            ServerEvent::Metadata {
                question_number,
                total_questions,
            } => {
                self.question_number = *question_number;
                self.total_questions = *total_questions;
                Some(ClientEvent::Progress {
                    question_number: *question_number,
                    total_questions: *total_questions,
                })
            }
            ServerEvent::InterviewComplete { .. } => {
                self.completed = true;
                Some(ClientEvent::Completed)
            }
            ServerEvent::Error { message } => {
                warn!(message = %message, "server reported an error");
                self.last_error = Some(message.clone());
                Some(ClientEvent::Notice {
                    message: message.clone(),
                })
            }
            ServerEvent::Unknown => {
                debug!("ignoring unrecognized control message");
                None
            }
        }
    }

    pub fn set_connection(&mut self, status: ConnectionStatus) -> ClientEvent {
        self.connection = status;
        ClientEvent::Connection { status }
    }

    /// Streaming transcript merge: when the previous entry has the same
    /// role and was non-final, a final replaces its text and a non-final
    /// appends to it. Anything else starts a new entry.
    fn merge_transcript(&mut self, role: Role, text: &str, is_final: bool) -> TranscriptEntry {
        if let Some(last) = self.transcript.last_mut() {
            if last.role == role && !last.is_final {
                if is_final {
                    last.text = text.to_owned();
                } else {
                    last.text.push_str(text);
                }
                last.is_final = is_final;
                return last.clone();
            }
        }
        let entry = TranscriptEntry {
            role,
            text: text.to_owned(),
            is_final,
        };
        self.transcript.push(entry.clone());
        entry
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn transcript(role: Role, text: &str, is_final: bool) -> ServerEvent {
        ServerEvent::Transcript {
            role,
            text: text.into(),
            is_final,
        }
    }

    #[test]
    fn partials_merge_into_one_final_entry() {
        let mut state = SessionState::new("s1");
        state.apply(&transcript(Role::User, "Hel", false));
        state.apply(&transcript(Role::User, "lo", false));
        state.apply(&transcript(Role::User, "Hello there", true));

        assert_eq!(state.transcript.len(), 1);
        assert_eq!(state.transcript[0].text, "Hello there");
        assert!(state.transcript[0].is_final);
    }

    #[test]
    fn partial_appends_to_previous_partial() {
        let mut state = SessionState::new("s1");
        state.apply(&transcript(Role::Agent, "Tell me ", false));
        state.apply(&transcript(Role::Agent, "about yourself.", false));

        assert_eq!(state.transcript.len(), 1);
        assert_eq!(state.transcript[0].text, "Tell me about yourself.");
        assert!(!state.transcript[0].is_final);
    }

    #[test]
    fn role_change_starts_a_new_entry() {
        let mut state = SessionState::new("s1");
        state.apply(&transcript(Role::Agent, "Why Rust?", true));
        state.apply(&transcript(Role::User, "Because", false));
        state.apply(&transcript(Role::Agent, "Go on.", false));

        assert_eq!(state.transcript.len(), 3);
        assert_eq!(state.transcript[1].text, "Because");
    }

    #[test]
    fn final_entry_is_never_merged_into() {
        let mut state = SessionState::new("s1");
        state.apply(&transcript(Role::User, "Done.", true));
        state.apply(&transcript(Role::User, "One more thing", false));

        assert_eq!(state.transcript.len(), 2);
        assert_eq!(state.transcript[0].text, "Done.");
    }

    #[test]
    fn phase_is_last_writer_wins_even_on_regression() {
        let mut state = SessionState::new("s1");
        state.apply(&ServerEvent::Phase {
            phase: Phase::Questions,
        });
        state.apply(&ServerEvent::Phase {
            phase: Phase::Greeting,
        });
        assert_eq!(state.phase, Phase::Greeting);
    }

    #[test]
    fn terminal_phase_sets_completed() {
        let mut state = SessionState::new("s1");
        state.apply(&ServerEvent::Phase {
            phase: Phase::Complete,
        });
        assert!(state.completed);
    }

    #[test]
    fn interview_complete_sets_completed_regardless_of_phase() {
        let mut state = SessionState::new("s1");
        state.apply(&ServerEvent::Phase {
            phase: Phase::Questions,
        });
        let event = state.apply(&ServerEvent::InterviewComplete { session_id: None });
        assert!(state.completed);
        assert_eq!(state.phase, Phase::Questions);
        assert_eq!(event, Some(ClientEvent::Completed));
    }

    #[test]
    fn metadata_overwrites_counters() {
        let mut state = SessionState::new("s1");
        state.apply(&ServerEvent::Metadata {
            question_number: 3,
            total_questions: 5,
        });
        assert_eq!(state.question_number, 3);
        assert_eq!(state.total_questions, 5);
    }

    #[test]
    fn server_error_surfaces_without_completing() {
        let mut state = SessionState::new("s1");
        let event = state.apply(&ServerEvent::Error {
            message: "tts backend unavailable".into(),
        });
        assert_eq!(state.last_error.as_deref(), Some("tts backend unavailable"));
        assert!(!state.completed);
        assert_eq!(
            event,
            Some(ClientEvent::Notice {
                message: "tts backend unavailable".into()
            })
        );
    }

    #[test]
    fn unknown_event_is_a_no_op() {
        let mut state = SessionState::new("s1");
        assert_eq!(state.apply(&ServerEvent::Unknown), None);
        assert!(state.transcript.is_empty());
    }
}
