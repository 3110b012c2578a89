use crate::ids;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Assistant,
    /// Connection notices and errors
    Status,
}

/// One line of the live transcript shown while the overlay is open
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TranscriptEntry {
    /// Process-unique key for the UI
    pub id: u64,

    pub role: Role,

    /// Text accumulated so far
    pub text: String,

    /// When the entry was opened
    pub timestamp: DateTime<Utc>,
}

/// Per-turn text waiting to be flushed to the chat log.
///
/// User and assistant deltas accumulate separately and are concatenated in
/// arrival order.
#[derive(Debug, Default)]
pub struct TranscriptAccumulator {
    user: String,
    assistant: String,
}

impl TranscriptAccumulator {
    pub fn push_user(&mut self, delta: &str) {
        self.user.push_str(delta);
    }

    pub fn push_assistant(&mut self, delta: &str) {
        self.assistant.push_str(delta);
    }

    /// Take the pending user text, if any, leaving the accumulator empty.
    pub fn take_user(&mut self) -> Option<String> {
        take_non_empty(&mut self.user)
    }

    pub fn take_assistant(&mut self) -> Option<String> {
        take_non_empty(&mut self.assistant)
    }

    pub fn is_empty(&self) -> bool {
        self.user.is_empty() && self.assistant.is_empty()
    }
}

fn take_non_empty(buf: &mut String) -> Option<String> {
    if buf.is_empty() {
        None
    } else {
        Some(std::mem::take(buf))
    }
}

/// Display log: deltas grow the open entry of the same role; a role change
/// or a turn boundary starts a new one.
#[derive(Debug, Default)]
pub struct TranscriptLog {
    entries: Vec<TranscriptEntry>,
    open: bool,
}

impl TranscriptLog {
    pub fn append(&mut self, role: Role, delta: &str) {
        if delta.is_empty() {
            return;
        }

        match self.entries.last_mut() {
            Some(last) if self.open && last.role == role => last.text.push_str(delta),
            _ => {
                self.entries.push(TranscriptEntry {
                    id: ids::next_id(),
                    role,
                    text: delta.to_string(),
                    timestamp: Utc::now(),
                });
                self.open = role != Role::Status;
            }
        }
    }

    /// Seal the open entry; the next delta starts a fresh one.
    pub fn close_turn(&mut self) {
        self.open = false;
    }

    pub fn entries(&self) -> &[TranscriptEntry] {
        &self.entries
    }
}
