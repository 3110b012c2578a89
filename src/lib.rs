pub mod audio;
pub mod channel;
pub mod config;
pub mod error;
pub mod http;
pub mod ids;
pub mod overlay;
pub mod pipeline;
pub mod session;

pub use audio::{
    AudioBackend, AudioBackendConfig, AudioBackendFactory, AudioFile, AudioFrame, AudioSink,
    AudioSource, CpalSinkFactory, FileBackend, HeadlessSinkFactory, LevelMeter, ManualClock,
    MicrophoneBackend, SinkFactory,
};
pub use channel::{MemoryChannel, NatsChannel, SessionChannel, SessionEvent, Subscription};
pub use config::Config;
pub use error::{Result, VoiceError};
pub use http::{create_router, AppState};
pub use overlay::{OverlayHandle, VoiceOverlay};
pub use pipeline::{CaptureGate, CapturePipeline, PlaybackScheduler};
pub use session::{
    SessionCallbacks, SessionConfig, SessionStats, SessionStatus, TranscriptEntry, VoiceSession,
};
