pub mod backend;
pub mod file;
pub mod meter;
pub mod microphone;
pub mod output;
pub mod pcm;
pub mod resample;
mod stream_thread;

pub use backend::{AudioBackend, AudioBackendConfig, AudioBackendFactory, AudioFrame, AudioSource};
pub use file::{AudioFile, FileBackend};
pub use meter::LevelMeter;
pub use microphone::MicrophoneBackend;
pub use output::{
    AudioSink, CpalSinkFactory, HeadlessSinkFactory, ManualClock, PlaybackBuffer,
    ScheduledRecord, SinkFactory,
};
pub use resample::resample;
