use super::state::SessionStatus;
use chrono::{DateTime, Utc};
use serde::Serialize;

/// Statistics about a voice session
#[derive(Debug, Clone, Serialize)]
pub struct SessionStats {
    /// Session id assigned by the voice service, once started
    pub session_id: Option<String>,

    pub status: SessionStatus,

    pub muted: bool,

    /// When the session object was created
    pub started_at: DateTime<Utc>,

    /// Total duration in seconds
    pub duration_secs: f64,

    /// Microphone frames handed to the channel
    pub frames_sent: usize,

    /// Microphone frames dropped while muted or without a session
    pub frames_dropped: usize,

    /// Reply chunks scheduled for playback
    pub chunks_scheduled: usize,

    /// Reply chunks dropped as undecodable
    pub chunks_dropped: usize,

    pub turns_completed: usize,

    pub interruptions: usize,

    /// Number of entries in the live transcript
    pub transcript_entries: usize,
}
