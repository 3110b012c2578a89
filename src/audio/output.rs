//! Audio output sinks for the playback scheduler.
//!
//! A sink is one output pipeline at one sample rate with its own clock that
//! starts at zero when the sink is created. Buffers are scheduled against that
//! clock; closing a sink silences everything it still had queued.

use super::resample;
use super::stream_thread::StreamThread;
use crate::error::{Result, VoiceError};
use crate::ids;
use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use cpal::StreamConfig;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Instant;
use tracing::{debug, error, info};

/// Decoded mono samples ready to be scheduled.
#[derive(Debug, Clone)]
pub struct PlaybackBuffer {
    pub samples: Vec<f32>,
    pub sample_rate: u32,
}

impl PlaybackBuffer {
    pub fn duration_secs(&self) -> f64 {
        if self.sample_rate == 0 {
            return 0.0;
        }
        self.samples.len() as f64 / self.sample_rate as f64
    }
}

pub trait AudioSink: Send {
    /// Rate the sink was built for.
    fn sample_rate(&self) -> u32;

    /// Seconds elapsed on this sink's clock.
    fn current_time(&self) -> f64;

    /// Queue `buffer` to begin at `start_at` seconds on the sink clock.
    fn schedule(&mut self, buffer: PlaybackBuffer, start_at: f64);

    /// Release the output device. Idempotent.
    fn close(&mut self);
}

pub trait SinkFactory: Send + Sync {
    fn create(&self, sample_rate: u32) -> Result<Box<dyn AudioSink>>;
}

// ============================================================================
// cpal output
// ============================================================================

struct QueuedBuffer {
    start_frame: u64,
    samples: Vec<f32>,
}

#[derive(Default)]
struct SinkShared {
    frames_rendered: AtomicU64,
    queue: Mutex<VecDeque<QueuedBuffer>>,
}

impl SinkShared {
    fn lock_queue(&self) -> std::sync::MutexGuard<'_, VecDeque<QueuedBuffer>> {
        match self.queue.lock() {
            Ok(q) => q,
            Err(poisoned) => poisoned.into_inner(),
        }
    }

    /// Queue a buffer. A start frame the render callback has already passed
    /// is moved up to the current frame so no samples are skipped.
    fn enqueue(&self, start_frame: u64, samples: Vec<f32>) {
        let mut queue = self.lock_queue();
        let start_frame = start_frame.max(self.frames_rendered.load(Ordering::Acquire));
        queue.push_back(QueuedBuffer {
            start_frame,
            samples,
        });
    }

    fn render(&self, data: &mut [f32], channels: usize) {
        let frames = data.len() / channels;
        // The clock only moves while the queue is locked.
        let mut queue = self.lock_queue();
        let base = self.frames_rendered.load(Ordering::Acquire);

        for (i, out) in data.chunks_mut(channels).enumerate() {
            let pos = base + i as u64;

            while queue
                .front()
                .is_some_and(|b| pos >= b.start_frame + b.samples.len() as u64)
            {
                queue.pop_front();
            }

            let mut sample = 0.0;
            for buffer in queue.iter() {
                if buffer.start_frame > pos {
                    break;
                }
                if let Some(s) = buffer.samples.get((pos - buffer.start_frame) as usize) {
                    sample += *s;
                }
            }
            out.fill(sample.clamp(-1.0, 1.0));
        }

        self.frames_rendered.fetch_add(frames as u64, Ordering::Release);
        drop(queue);
    }
}

/// Output through the system audio device.
pub struct CpalSink {
    sample_rate: u32,
    device_rate: u32,
    shared: Arc<SinkShared>,
    stream: Option<StreamThread>,
}

impl AudioSink for CpalSink {
    fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    fn current_time(&self) -> f64 {
        self.shared.frames_rendered.load(Ordering::Acquire) as f64 / self.device_rate as f64
    }

    fn schedule(&mut self, buffer: PlaybackBuffer, start_at: f64) {
        if self.stream.is_none() {
            return;
        }

        let samples = resample::resample(&buffer.samples, buffer.sample_rate, self.device_rate)
            .into_owned();
        let start_frame = (start_at * self.device_rate as f64).round() as u64;
        self.shared.enqueue(start_frame, samples);
    }

    fn close(&mut self) {
        if let Some(stream) = self.stream.take() {
            stream.shutdown();
            debug!("output sink at {}Hz closed", self.sample_rate);
        }
    }
}

impl Drop for CpalSink {
    fn drop(&mut self) {
        self.close();
    }
}

pub struct CpalSinkFactory {
    device: Option<String>,
}

impl CpalSinkFactory {
    pub fn new(device: Option<String>) -> Self {
        Self { device }
    }

    /// List available output devices.
    pub fn list_output_devices() -> Result<Vec<String>> {
        let host = cpal::default_host();
        let devices = host
            .output_devices()
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

fn find_output_device(name: Option<&str>) -> Result<cpal::Device> {
    let host = cpal::default_host();

    match name {
        Some(name) => host
            .output_devices()
            .map_err(|e| VoiceError::Device(format!("cannot enumerate devices: {e}")))?
            .find(|d| {
                d.description()
                    .ok()
                    .map(|desc| desc.name() == name)
                    .unwrap_or(false)
            })
            .ok_or_else(|| VoiceError::Device(format!("output device '{name}' not found"))),
        None => host
            .default_output_device()
            .ok_or_else(|| VoiceError::Device("no default output device".into())),
    }
}

fn open_output_stream(
    device_name: Option<&str>,
    sample_rate: u32,
    shared: Arc<SinkShared>,
) -> Result<(cpal::Stream, u32)> {
    let device = find_output_device(device_name)?;
    let on_error = |err: cpal::StreamError| error!("audio output stream error: {err}");

    let preferred = StreamConfig {
        channels: 1,
        sample_rate,
        buffer_size: cpal::BufferSize::Default,
    };

    let render = Arc::clone(&shared);
    let (stream, device_rate) = match device.build_output_stream(
        &preferred,
        move |data: &mut [f32], _info: &cpal::OutputCallbackInfo| render.render(data, 1),
        on_error,
        None,
    ) {
        Ok(stream) => (stream, sample_rate),
        Err(e) => {
            debug!("mono {sample_rate}Hz output rejected ({e}), using device default");

            let default_config = device
                .default_output_config()
                .map_err(|e| VoiceError::Device(format!("no usable output config: {e}")))?;
            let native = StreamConfig {
                channels: default_config.channels(),
                sample_rate: default_config.sample_rate(),
                buffer_size: cpal::BufferSize::Default,
            };
            let channels = native.channels.max(1) as usize;

            let stream = device
                .build_output_stream(
                    &native,
                    move |data: &mut [f32], _info: &cpal::OutputCallbackInfo| {
                        shared.render(data, channels)
                    },
                    on_error,
                    None,
                )
                .map_err(|e| VoiceError::Device(format!("failed to build output stream: {e}")))?;
            (stream, native.sample_rate)
        }
    };

    stream
        .play()
        .map_err(|e| VoiceError::Device(format!("failed to start output stream: {e}")))?;

    Ok((stream, device_rate))
}

impl SinkFactory for CpalSinkFactory {
    fn create(&self, sample_rate: u32) -> Result<Box<dyn AudioSink>> {
        let shared = Arc::new(SinkShared::default());
        let device = self.device.clone();
        let stream_shared = Arc::clone(&shared);

        let target = ids::next_render_target("playback");

        let (stream, device_rate) = StreamThread::spawn(&target, move || {
            open_output_stream(device.as_deref(), sample_rate, stream_shared)
        })?;

        info!(
            "output sink {} opened at {}Hz (device {}Hz)",
            target, sample_rate, device_rate
        );

        Ok(Box::new(CpalSink {
            sample_rate,
            device_rate,
            shared,
            stream: Some(stream),
        }))
    }
}

// ============================================================================
// Headless output
// ============================================================================

/// A clock advanced by hand, shared by every headless sink built from one
/// factory.
#[derive(Debug, Default)]
pub struct ManualClock {
    micros: AtomicU64,
}

impl ManualClock {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn now(&self) -> f64 {
        self.micros.load(Ordering::SeqCst) as f64 / 1_000_000.0
    }

    pub fn advance(&self, secs: f64) {
        self.micros
            .fetch_add((secs * 1_000_000.0).round() as u64, Ordering::SeqCst);
    }
}

#[derive(Debug, Clone)]
enum ClockSource {
    Wall,
    Manual(Arc<ManualClock>),
}

/// One buffer handed to a headless sink.
#[derive(Debug, Clone, PartialEq)]
pub struct ScheduledRecord {
    /// Which sink (in creation order) received the buffer
    pub sink_index: usize,
    pub start_at: f64,
    pub duration: f64,
    pub sample_rate: u32,
}

/// Output that plays nothing but keeps honest time.
///
/// With a wall clock it stands in for a speaker (`--no-playback`); with a
/// [`ManualClock`] every scheduling decision is reproducible.
#[derive(Clone)]
pub struct HeadlessSinkFactory {
    clock: ClockSource,
    records: Arc<Mutex<Vec<ScheduledRecord>>>,
    created: Arc<AtomicUsize>,
    closed: Arc<AtomicUsize>,
}

impl HeadlessSinkFactory {
    pub fn wall_clock() -> Self {
        Self::with_clock(ClockSource::Wall)
    }

    pub fn manual(clock: Arc<ManualClock>) -> Self {
        Self::with_clock(ClockSource::Manual(clock))
    }

    fn with_clock(clock: ClockSource) -> Self {
        Self {
            clock,
            records: Arc::new(Mutex::new(Vec::new())),
            created: Arc::new(AtomicUsize::new(0)),
            closed: Arc::new(AtomicUsize::new(0)),
        }
    }

    pub fn records(&self) -> Vec<ScheduledRecord> {
        match self.records.lock() {
            Ok(r) => r.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        }
    }

    pub fn sinks_created(&self) -> usize {
        self.created.load(Ordering::SeqCst)
    }

    pub fn sinks_closed(&self) -> usize {
        self.closed.load(Ordering::SeqCst)
    }
}

impl SinkFactory for HeadlessSinkFactory {
    fn create(&self, sample_rate: u32) -> Result<Box<dyn AudioSink>> {
        let index = self.created.fetch_add(1, Ordering::SeqCst);
        let epoch = match &self.clock {
            ClockSource::Wall => Epoch::Wall(Instant::now()),
            ClockSource::Manual(clock) => Epoch::Manual(Arc::clone(clock), clock.now()),
        };

        debug!("headless sink #{index} opened at {sample_rate}Hz");

        Ok(Box::new(HeadlessSink {
            index,
            sample_rate,
            epoch,
            open: true,
            records: Arc::clone(&self.records),
            closed: Arc::clone(&self.closed),
        }))
    }
}

enum Epoch {
    Wall(Instant),
    Manual(Arc<ManualClock>, f64),
}

struct HeadlessSink {
    index: usize,
    sample_rate: u32,
    epoch: Epoch,
    open: bool,
    records: Arc<Mutex<Vec<ScheduledRecord>>>,
    closed: Arc<AtomicUsize>,
}

impl AudioSink for HeadlessSink {
    fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    fn current_time(&self) -> f64 {
        match &self.epoch {
            Epoch::Wall(started) => started.elapsed().as_secs_f64(),
            Epoch::Manual(clock, base) => (clock.now() - base).max(0.0),
        }
    }

    fn schedule(&mut self, buffer: PlaybackBuffer, start_at: f64) {
        if !self.open {
            return;
        }

        let record = ScheduledRecord {
            sink_index: self.index,
            start_at,
            duration: buffer.duration_secs(),
            sample_rate: buffer.sample_rate,
        };
        match self.records.lock() {
            Ok(mut r) => r.push(record),
            Err(poisoned) => poisoned.into_inner().push(record),
        }
    }

    fn close(&mut self) {
        if self.open {
            self.open = false;
            self.closed.fetch_add(1, Ordering::SeqCst);
        }
    }
}

impl Drop for HeadlessSink {
    fn drop(&mut self) {
        self.close();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_render_places_buffers_at_start_frame() {
        let shared = SinkShared::default();
        shared.queue.lock().unwrap().push_back(QueuedBuffer {
            start_frame: 2,
            samples: vec![0.5, 0.25],
        });

        let mut out = [1.0f32; 6];
        shared.render(&mut out, 1);

        assert_eq!(out, [0.0, 0.0, 0.5, 0.25, 0.0, 0.0]);
        assert_eq!(shared.frames_rendered.load(Ordering::SeqCst), 6);
        assert!(shared.queue.lock().unwrap().is_empty());
    }

    #[test]
    fn test_stale_start_frame_plays_from_first_sample() {
        let shared = SinkShared::default();
        let mut out = [0.0f32; 4];
        shared.render(&mut out, 1);

        // Start computed from a clock read before the last block rendered
        shared.enqueue(1, vec![0.5, 0.25]);
        shared.render(&mut out, 1);

        assert_eq!(out, [0.5, 0.25, 0.0, 0.0]);
        assert_eq!(shared.frames_rendered.load(Ordering::SeqCst), 8);
    }

    #[test]
    fn test_enqueue_keeps_future_start_frame() {
        let shared = SinkShared::default();
        shared.enqueue(3, vec![0.5]);

        let mut out = [0.0f32; 4];
        shared.render(&mut out, 1);

        assert_eq!(out, [0.0, 0.0, 0.0, 0.5]);
    }

    #[test]
    fn test_render_duplicates_across_channels() {
        let shared = SinkShared::default();
        shared.queue.lock().unwrap().push_back(QueuedBuffer {
            start_frame: 0,
            samples: vec![0.1, 0.2],
        });

        let mut out = [0.0f32; 4];
        shared.render(&mut out, 2);

        assert_eq!(out, [0.1, 0.1, 0.2, 0.2]);
    }

    #[test]
    fn test_headless_clock_starts_at_zero_per_sink() {
        let clock = ManualClock::new();
        let factory = HeadlessSinkFactory::manual(Arc::clone(&clock));

        clock.advance(3.0);
        let sink = factory.create(24000).unwrap();
        assert_eq!(sink.current_time(), 0.0);

        clock.advance(0.5);
        assert!((sink.current_time() - 0.5).abs() < 1e-9);
    }

    #[test]
    fn test_headless_close_counts_once() {
        let factory = HeadlessSinkFactory::manual(ManualClock::new());
        let mut sink = factory.create(16000).unwrap();
        sink.close();
        sink.close();
        drop(sink);
        assert_eq!(factory.sinks_closed(), 1);
    }
}
