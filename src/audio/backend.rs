use crate::error::Result;
use std::path::PathBuf;
use tokio::sync::mpsc;

/// One capture callback's worth of audio (mono, normalized f32).
#[derive(Debug, Clone)]
pub struct AudioFrame {
    /// Mono samples in `[-1, 1]`
    pub samples: Vec<f32>,
    /// Device-negotiated sample rate in Hz (may differ from the requested rate)
    pub sample_rate: u32,
    /// Timestamp in milliseconds since capture started
    pub timestamp_ms: u64,
}

impl AudioFrame {
    pub fn duration_secs(&self) -> f64 {
        if self.sample_rate == 0 {
            return 0.0;
        }
        self.samples.len() as f64 / self.sample_rate as f64
    }
}

/// Configuration for audio backend
#[derive(Debug, Clone)]
pub struct AudioBackendConfig {
    /// Nominal capture rate requested from the device
    pub target_sample_rate: u32,
    /// Samples per emitted frame
    pub frame_size: usize,
    /// Input device name (`None` = system default)
    pub device: Option<String>,
    /// Frames buffered between the audio thread and the pipeline
    pub queue_depth: usize,
}

impl Default for AudioBackendConfig {
    fn default() -> Self {
        Self {
            target_sample_rate: 16000, // 16kHz speech
            frame_size: 4096,
            device: None,
            queue_depth: 32,
        }
    }
}

/// Audio capture backend trait
///
/// Implementations:
/// - Microphone: cpal input stream
/// - File: replay a WAV file (for testing/offline runs)
#[async_trait::async_trait]
pub trait AudioBackend: Send + Sync {
    /// Start capturing audio
    ///
    /// Returns a channel receiver that will receive audio frames
    async fn start(&mut self) -> Result<mpsc::Receiver<AudioFrame>>;

    /// Stop capturing audio and release the device
    async fn stop(&mut self) -> Result<()>;

    /// Check if backend is currently capturing
    fn is_capturing(&self) -> bool;

    /// Rate the device actually delivers, known once capture has started
    fn actual_sample_rate(&self) -> Option<u32>;

    /// Get backend name for logging
    fn name(&self) -> &str;
}

/// Audio backend factory
pub struct AudioBackendFactory;

impl AudioBackendFactory {
    pub fn create(source: AudioSource, config: AudioBackendConfig) -> Result<Box<dyn AudioBackend>> {
        match source {
            AudioSource::Microphone => {
                let backend = super::microphone::MicrophoneBackend::new(config);
                Ok(Box::new(backend))
            }

            AudioSource::File { path, realtime } => {
                let backend = super::file::FileBackend::open(path, config, realtime)?;
                Ok(Box::new(backend))
            }
        }
    }
}

/// Audio source type
#[derive(Debug, Clone)]
pub enum AudioSource {
    /// Microphone input (all platforms)
    Microphone,
    /// WAV file input, optionally paced at the file's own rate
    File { path: PathBuf, realtime: bool },
}
