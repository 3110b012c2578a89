use crate::pipeline::DEFAULT_PLAYBACK_RATE;
use serde::{Deserialize, Serialize};

/// Configuration for one voice session
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionConfig {
    /// Knowledge context (notebook) the session is bound to
    pub context_id: String,

    /// Rate frames are sent at (the voice service expects 16kHz)
    pub capture_sample_rate: u32,

    /// Samples per capture frame
    pub frame_size: usize,

    /// Playback rate when a chunk does not declare one
    pub default_playback_rate: u32,

    /// Open the session with the microphone muted
    pub start_muted: bool,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            context_id: "default".to_string(),
            capture_sample_rate: 16000, // 16kHz speech
            frame_size: 4096,
            default_playback_rate: DEFAULT_PLAYBACK_RATE,
            start_muted: false,
        }
    }
}
