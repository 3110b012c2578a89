use super::backend::{AudioBackend, AudioBackendConfig, AudioFrame};
use super::{pcm, resample};
use crate::error::{Result, VoiceError};
use hound::{SampleFormat, WavReader};
use std::path::Path;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, info};

pub struct AudioFile {
    pub path: String,
    pub duration_seconds: f64,
    pub sample_rate: u32,
    pub channels: u16,
    /// Interleaved normalized samples
    pub samples: Vec<f32>,
}

impl AudioFile {
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        info!("Opening audio file: {}", path.display());

        let reader = WavReader::open(path)
            .map_err(|e| VoiceError::Device(format!("failed to open WAV file: {e}")))?;

        let spec = reader.spec();
        let samples: Vec<f32> = match (spec.sample_format, spec.bits_per_sample) {
            (SampleFormat::Int, 16) => {
                let raw = reader
                    .into_samples::<i16>()
                    .collect::<std::result::Result<Vec<_>, _>>()
                    .map_err(|e| VoiceError::Decode(format!("failed to read samples: {e}")))?;
                pcm::int16_to_float(&raw)
            }
            (SampleFormat::Float, 32) => reader
                .into_samples::<f32>()
                .collect::<std::result::Result<Vec<_>, _>>()
                .map_err(|e| VoiceError::Decode(format!("failed to read samples: {e}")))?,
            (format, bits) => {
                return Err(VoiceError::Decode(format!(
                    "unsupported WAV encoding: {bits}-bit {format:?}"
                )))
            }
        };

        let duration_seconds =
            samples.len() as f64 / (spec.sample_rate as f64 * spec.channels as f64);

        info!(
            "Audio file loaded: {:.1}s, {}Hz, {} channels, {} samples",
            duration_seconds,
            spec.sample_rate,
            spec.channels,
            samples.len()
        );

        Ok(Self {
            path: path.display().to_string(),
            duration_seconds,
            sample_rate: spec.sample_rate,
            channels: spec.channels,
            samples,
        })
    }

    /// Average interleaved channels down to mono.
    pub fn to_mono(&self) -> Vec<f32> {
        if self.channels <= 1 {
            return self.samples.clone();
        }

        let ch = self.channels as usize;
        self.samples
            .chunks_exact(ch)
            .map(|frame| frame.iter().sum::<f32>() / ch as f32)
            .collect()
    }

    /// Mono samples at `target_rate`.
    pub fn resample_to_mono(&self, target_rate: u32) -> Vec<f32> {
        let mono = self.to_mono();
        resample::resample(&mono, self.sample_rate, target_rate).into_owned()
    }
}

/// Replays a WAV file as if it were a microphone.
///
/// Frames carry the file's own rate so the capture pipeline resamples them
/// exactly like frames from a device that ignored the requested rate.
pub struct FileBackend {
    file: AudioFile,
    config: AudioBackendConfig,
    realtime: bool,
    task: Option<JoinHandle<()>>,
}

impl FileBackend {
    pub fn open(path: impl AsRef<Path>, config: AudioBackendConfig, realtime: bool) -> Result<Self> {
        let file = AudioFile::open(path)?;
        Ok(Self::from_file(file, config, realtime))
    }

    pub fn from_file(file: AudioFile, config: AudioBackendConfig, realtime: bool) -> Self {
        Self {
            file,
            config,
            realtime,
            task: None,
        }
    }
}

#[async_trait::async_trait]
impl AudioBackend for FileBackend {
    async fn start(&mut self) -> Result<mpsc::Receiver<AudioFrame>> {
        if self.task.is_some() {
            return Err(VoiceError::Device("file backend already capturing".into()));
        }

        let (tx, rx) = mpsc::channel(self.config.queue_depth);
        let samples = self.file.to_mono();
        let sample_rate = self.file.sample_rate;
        let frame_size = self.config.frame_size.max(1);
        let realtime = self.realtime;

        info!(
            "Replaying {} ({} frames of {} samples)",
            self.file.path,
            samples.len().div_ceil(frame_size),
            frame_size
        );

        let task = tokio::spawn(async move {
            let frame_period = Duration::from_secs_f64(frame_size as f64 / sample_rate.max(1) as f64);
            let mut interval = tokio::time::interval(frame_period);

            for (i, chunk) in samples.chunks(frame_size).enumerate() {
                if realtime {
                    interval.tick().await;
                }

                let frame = AudioFrame {
                    samples: chunk.to_vec(),
                    sample_rate,
                    timestamp_ms: (i * frame_size) as u64 * 1000 / sample_rate.max(1) as u64,
                };
                if tx.send(frame).await.is_err() {
                    debug!("frame receiver dropped, ending file replay");
                    break;
                }
            }
        });

        self.task = Some(task);
        Ok(rx)
    }

    async fn stop(&mut self) -> Result<()> {
        if let Some(task) = self.task.take() {
            task.abort();
            info!("File replay stopped");
        }
        Ok(())
    }

    fn is_capturing(&self) -> bool {
        self.task.as_ref().is_some_and(|t| !t.is_finished())
    }

    fn actual_sample_rate(&self) -> Option<u32> {
        Some(self.file.sample_rate)
    }

    fn name(&self) -> &str {
        "WAV file"
    }
}

impl Drop for FileBackend {
    fn drop(&mut self) {
        if let Some(task) = self.task.take() {
            task.abort();
        }
    }
}
