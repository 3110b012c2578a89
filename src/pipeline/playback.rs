//! Gapless playback of audio chunks that arrive at irregular intervals.
//!
//! Each chunk starts at `max(sink clock now, playback clock)`, and the
//! playback clock then moves to the chunk's end. Chunk N therefore never
//! overlaps chunk N-1 and never waits behind an already drained queue.

use crate::audio::output::{AudioSink, PlaybackBuffer, SinkFactory};
use crate::audio::pcm;
use crate::error::{Result, VoiceError};
use std::sync::Arc;
use tracing::{debug, info};

/// Rate assumed when a chunk's descriptor does not carry one.
pub const DEFAULT_PLAYBACK_RATE: u32 = 24_000;

/// Extract `rate=<Hz>` from a MIME-like descriptor such as
/// `audio/pcm;rate=24000`, or fall back to `default_rate`.
pub fn parse_sample_rate(mime_type: Option<&str>, default_rate: u32) -> u32 {
    mime_type
        .and_then(|mime| {
            mime.split(';')
                .filter_map(|param| param.trim().strip_prefix("rate="))
                .find_map(|rate| rate.trim().parse::<u32>().ok())
        })
        .filter(|rate| *rate > 0)
        .unwrap_or(default_rate)
}

/// Where a chunk landed on the sink timeline.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ScheduledChunk {
    pub start_time: f64,
    pub duration: f64,
    pub sample_rate: u32,
}

pub struct PlaybackScheduler {
    sinks: Arc<dyn SinkFactory>,
    sink: Option<Box<dyn AudioSink>>,
    /// End time of the last scheduled chunk on the current sink's clock
    playback_clock: f64,
    default_rate: u32,
}

impl PlaybackScheduler {
    pub fn new(sinks: Arc<dyn SinkFactory>) -> Self {
        Self::with_default_rate(sinks, DEFAULT_PLAYBACK_RATE)
    }

    pub fn with_default_rate(sinks: Arc<dyn SinkFactory>, default_rate: u32) -> Self {
        Self {
            sinks,
            sink: None,
            playback_clock: 0.0,
            default_rate,
        }
    }

    /// Decode a base64 PCM16 chunk and queue it right after the previous one.
    ///
    /// A malformed chunk is rejected before the sink is touched, so it never
    /// disturbs audio that is already queued.
    pub fn schedule(&mut self, audio_data: &str, mime_type: Option<&str>) -> Result<ScheduledChunk> {
        let sample_rate = parse_sample_rate(mime_type, self.default_rate);
        let samples = pcm::decode_samples(audio_data)?;

        self.ensure_sink(sample_rate)?;
        let sink = self
            .sink
            .as_mut()
            .ok_or_else(|| VoiceError::Device("playback sink unavailable".into()))?;
        let buffer = PlaybackBuffer {
            samples,
            sample_rate,
        };
        let duration = buffer.duration_secs();

        let start_time = sink.current_time().max(self.playback_clock);
        sink.schedule(buffer, start_time);
        self.playback_clock = start_time + duration;

        debug!(
            "scheduled {:.3}s chunk at {:.3}s ({}Hz)",
            duration, start_time, sample_rate
        );

        Ok(ScheduledChunk {
            start_time,
            duration,
            sample_rate,
        })
    }

    /// Tear down the sink and everything queued on it.
    pub fn reset(&mut self) {
        if let Some(mut sink) = self.sink.take() {
            sink.close();
            debug!("playback sink torn down");
        }
        self.playback_clock = 0.0;
    }

    pub fn playback_clock(&self) -> f64 {
        self.playback_clock
    }

    pub fn sink_rate(&self) -> Option<u32> {
        self.sink.as_ref().map(|s| s.sample_rate())
    }

    /// (Re)build the sink when none exists or its rate differs. A new sink
    /// means a new timeline, so the playback clock restarts at zero.
    fn ensure_sink(&mut self, sample_rate: u32) -> Result<()> {
        if self.sink_rate() != Some(sample_rate) {
            if let Some(previous) = self.sink_rate() {
                info!(
                    "playback rate changed {}Hz -> {}Hz, rebuilding sink",
                    previous, sample_rate
                );
            }
            self.reset();
            self.sink = Some(self.sinks.create(sample_rate)?);
        }
        Ok(())
    }
}

impl Drop for PlaybackScheduler {
    fn drop(&mut self) {
        self.reset();
    }
}
