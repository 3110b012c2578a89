//! Voice session management
//!
//! This module provides the `VoiceSession` state machine that manages:
//! - Session lifecycle against the remote voice service
//! - Turn-taking and barge-in
//! - Transcript accumulation and the live transcript log
//! - Session statistics

mod config;
mod session;
mod state;
mod stats;
mod transcript;

pub use config::SessionConfig;
pub use session::{ErrorCallback, MessageCallback, SessionCallbacks, VoiceSession};
pub use state::SessionStatus;
pub use stats::SessionStats;
pub use transcript::{Role, TranscriptAccumulator, TranscriptEntry, TranscriptLog};
