use serde::Serialize;
use std::fmt;

/// Lifecycle of a voice session.
///
/// `Idle → Connecting → Ready → {Listening, Speaking} → Closed`, with
/// `Error` reachable from anywhere. `Error` and `Closed` are terminal.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "state", content = "message", rename_all = "snake_case")]
pub enum SessionStatus {
    Idle,
    Connecting,
    Ready,
    /// Waiting for the user; the assistant is silent
    Listening,
    /// The assistant is emitting text or audio
    Speaking,
    Error(String),
    Closed,
}

impl SessionStatus {
    /// Whether inbound events should still be processed.
    pub fn is_live(&self) -> bool {
        matches!(
            self,
            SessionStatus::Connecting
                | SessionStatus::Ready
                | SessionStatus::Listening
                | SessionStatus::Speaking
        )
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, SessionStatus::Error(_) | SessionStatus::Closed)
    }
}

impl fmt::Display for SessionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SessionStatus::Idle => write!(f, "idle"),
            SessionStatus::Connecting => write!(f, "connecting"),
            SessionStatus::Ready => write!(f, "ready"),
            SessionStatus::Listening => write!(f, "listening"),
            SessionStatus::Speaking => write!(f, "speaking"),
            SessionStatus::Error(message) => write!(f, "error: {message}"),
            SessionStatus::Closed => write!(f, "closed"),
        }
    }
}
