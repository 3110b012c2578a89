//! Microphone capture backend using cpal.
//!
//! Requests mono at the nominal rate and falls back to the device default
//! configuration. The rate the device actually delivers is tracked and
//! stamped on every frame so the pipeline can resample.

use super::backend::{AudioBackend, AudioBackendConfig, AudioFrame};
use super::stream_thread::StreamThread;
use crate::error::{Result, VoiceError};
use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use cpal::StreamConfig;
use std::time::Instant;
use tokio::sync::mpsc;
use tracing::{debug, error, info, warn};

pub struct MicrophoneBackend {
    config: AudioBackendConfig,
    stream: Option<StreamThread>,
    actual_rate: Option<u32>,
}

impl MicrophoneBackend {
    pub fn new(config: AudioBackendConfig) -> Self {
        Self {
            config,
            stream: None,
            actual_rate: None,
        }
    }

    /// List available input devices.
    pub fn list_input_devices() -> Result<Vec<String>> {
        let host = cpal::default_host();
        let devices = host
            .input_devices()
            .map_err(|e| VoiceError::Device(format!("cannot enumerate devices: {e}")))?;

        let mut names = Vec::new();
        for device in devices {
            if let Ok(desc) = device.description() {
                names.push(desc.name().to_owned());
            }
        }
        Ok(names)
    }
}

fn find_input_device(name: Option<&str>) -> Result<cpal::Device> {
    let host = cpal::default_host();

    match name {
        Some(name) => host
            .input_devices()
            .map_err(|e| VoiceError::Device(format!("cannot enumerate devices: {e}")))?
            .find(|d| {
                d.description()
                    .ok()
                    .map(|desc| desc.name() == name)
                    .unwrap_or(false)
            })
            .ok_or_else(|| VoiceError::Device(format!("input device '{name}' not found"))),
        None => host
            .default_input_device()
            .ok_or_else(|| VoiceError::Device("no default input device".into())),
    }
}

/// Build the audio-thread callback: downmix to mono, cut fixed-size frames,
/// hand them off without blocking.
fn frame_callback(
    tx: mpsc::Sender<AudioFrame>,
    channels: u16,
    sample_rate: u32,
    frame_size: usize,
) -> impl FnMut(&[f32], &cpal::InputCallbackInfo) + Send + 'static {
    let channels = channels.max(1) as usize;
    let started = Instant::now();
    let mut pending: Vec<f32> = Vec::with_capacity(frame_size);

    move |data: &[f32], _info: &cpal::InputCallbackInfo| {
        for frame in data.chunks(channels) {
            pending.push(frame.iter().sum::<f32>() / frame.len() as f32);

            if pending.len() >= frame_size {
                let samples = std::mem::replace(&mut pending, Vec::with_capacity(frame_size));
                let frame = AudioFrame {
                    samples,
                    sample_rate,
                    timestamp_ms: started.elapsed().as_millis() as u64,
                };
                if tx.try_send(frame).is_err() {
                    debug!("capture queue full, dropping frame");
                }
            }
        }
    }
}

fn open_input_stream(
    config: &AudioBackendConfig,
    tx: mpsc::Sender<AudioFrame>,
) -> Result<(cpal::Stream, u32)> {
    let device = find_input_device(config.device.as_deref())?;

    let device_name = device
        .description()
        .map(|d| d.name().to_owned())
        .unwrap_or_else(|_| "<unknown>".into());
    info!("using input device: {device_name}");

    let preferred = StreamConfig {
        channels: 1,
        sample_rate: config.target_sample_rate,
        buffer_size: cpal::BufferSize::Default,
    };

    let on_error = |err: cpal::StreamError| error!("audio input stream error: {err}");

    let (stream, rate) = match device.build_input_stream(
        &preferred,
        frame_callback(tx.clone(), 1, config.target_sample_rate, config.frame_size),
        on_error,
        None,
    ) {
        Ok(stream) => (stream, config.target_sample_rate),
        Err(e) => {
            debug!("mono {}Hz input rejected ({e}), using device default", config.target_sample_rate);

            let default_config = device
                .default_input_config()
                .map_err(|e| VoiceError::Permission(format!("no usable input config: {e}")))?;
            let native = StreamConfig {
                channels: default_config.channels(),
                sample_rate: default_config.sample_rate(),
                buffer_size: cpal::BufferSize::Default,
            };

            let stream = device
                .build_input_stream(
                    &native,
                    frame_callback(tx, native.channels, native.sample_rate, config.frame_size),
                    on_error,
                    None,
                )
                .map_err(|e| VoiceError::Permission(format!("failed to build input stream: {e}")))?;
            (stream, native.sample_rate)
        }
    };

    stream
        .play()
        .map_err(|e| VoiceError::Permission(format!("failed to start input stream: {e}")))?;

    Ok((stream, rate))
}

#[async_trait::async_trait]
impl AudioBackend for MicrophoneBackend {
    async fn start(&mut self) -> Result<mpsc::Receiver<AudioFrame>> {
        if self.stream.is_some() {
            return Err(VoiceError::Device("microphone already capturing".into()));
        }

        let (tx, rx) = mpsc::channel(self.config.queue_depth);
        let config = self.config.clone();

        let (stream, rate) = tokio::task::spawn_blocking(move || {
            StreamThread::spawn("mic-capture", move || open_input_stream(&config, tx))
        })
        .await
        .map_err(|e| VoiceError::Device(format!("capture setup task failed: {e}")))??;

        if rate != self.config.target_sample_rate {
            info!(
                "capturing at {}Hz, frames will be resampled to {}Hz",
                rate, self.config.target_sample_rate
            );
        }
        info!("microphone capture started ({}Hz)", rate);

        self.stream = Some(stream);
        self.actual_rate = Some(rate);
        Ok(rx)
    }

    async fn stop(&mut self) -> Result<()> {
        if let Some(stream) = self.stream.take() {
            // Joining the owner thread blocks until the device is released.
            if let Err(e) = tokio::task::spawn_blocking(move || stream.shutdown()).await {
                warn!("microphone shutdown task failed: {e}");
            }
            info!("microphone capture stopped");
        }
        Ok(())
    }

    fn is_capturing(&self) -> bool {
        self.stream.is_some()
    }

    fn actual_sample_rate(&self) -> Option<u32> {
        self.actual_rate
    }

    fn name(&self) -> &str {
        "cpal microphone"
    }
}
