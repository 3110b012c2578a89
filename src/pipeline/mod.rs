//! Realtime audio paths: microphone to channel, channel to speaker.

pub mod capture;
pub mod playback;

pub use capture::{CaptureCounters, CaptureGate, CapturePipeline, FrameOutcome};
pub use playback::{parse_sample_rate, PlaybackScheduler, ScheduledChunk, DEFAULT_PLAYBACK_RATE};
