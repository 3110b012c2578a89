//! Microphone → Session Channel bridge.
//!
//! Every frame is metered for the UI, then either dropped (muted, or no
//! session yet) or resampled to the wire rate, encoded and handed to the
//! channel without waiting for delivery.

use crate::audio::backend::AudioFrame;
use crate::audio::meter::LevelMeter;
use crate::audio::{pcm, resample};
use crate::channel::{OutboundAudio, SessionChannel};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, RwLock};
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tracing::{debug, info};

/// The mute flag and current session id, read fresh on every frame.
///
/// The session state machine writes it; the capture path only reads. Frames
/// never see a value captured when capture started.
#[derive(Debug, Default)]
pub struct CaptureGate {
    muted: AtomicBool,
    session_id: RwLock<Option<String>>,
}

impl CaptureGate {
    pub fn new(muted: bool) -> Arc<Self> {
        Arc::new(Self {
            muted: AtomicBool::new(muted),
            session_id: RwLock::new(None),
        })
    }

    pub fn is_muted(&self) -> bool {
        self.muted.load(Ordering::SeqCst)
    }

    pub fn set_muted(&self, muted: bool) {
        self.muted.store(muted, Ordering::SeqCst);
    }

    /// Flip the mute flag and return the new value.
    pub fn toggle_muted(&self) -> bool {
        !self.muted.fetch_xor(true, Ordering::SeqCst)
    }

    pub fn session_id(&self) -> Option<String> {
        match self.session_id.read() {
            Ok(id) => id.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        }
    }

    pub fn set_session_id(&self, session_id: Option<String>) {
        match self.session_id.write() {
            Ok(mut id) => *id = session_id,
            Err(poisoned) => *poisoned.into_inner() = session_id,
        }
    }
}

/// What happened to one capture frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FrameOutcome {
    Sent,
    DroppedMuted,
    DroppedNoSession,
}

/// Frame counters shared with whoever reports session statistics.
#[derive(Debug, Default)]
pub struct CaptureCounters {
    pub frames_sent: AtomicUsize,
    pub frames_dropped: AtomicUsize,
}

impl CaptureCounters {
    pub fn sent(&self) -> usize {
        self.frames_sent.load(Ordering::SeqCst)
    }

    pub fn dropped(&self) -> usize {
        self.frames_dropped.load(Ordering::SeqCst)
    }
}

pub struct CapturePipeline {
    channel: Arc<dyn SessionChannel>,
    gate: Arc<CaptureGate>,
    target_rate: u32,
    meter: LevelMeter,
    level_tx: watch::Sender<f32>,
    counters: Arc<CaptureCounters>,
}

impl CapturePipeline {
    pub fn new(
        channel: Arc<dyn SessionChannel>,
        gate: Arc<CaptureGate>,
        target_rate: u32,
        counters: Arc<CaptureCounters>,
    ) -> (Self, watch::Receiver<f32>) {
        let (level_tx, level_rx) = watch::channel(0.0);
        let pipeline = Self {
            channel,
            gate,
            target_rate,
            meter: LevelMeter::new(),
            level_tx,
            counters,
        };
        (pipeline, level_rx)
    }

    /// Handle one frame. Synchronous and bounded by the frame size.
    pub fn process_frame(&mut self, frame: &AudioFrame) -> FrameOutcome {
        let level = self.meter.process(&frame.samples);
        self.level_tx.send_replace(level);

        if self.gate.is_muted() {
            self.counters.frames_dropped.fetch_add(1, Ordering::Relaxed);
            return FrameOutcome::DroppedMuted;
        }
        let Some(session_id) = self.gate.session_id() else {
            self.counters.frames_dropped.fetch_add(1, Ordering::Relaxed);
            return FrameOutcome::DroppedNoSession;
        };

        let samples = resample::resample(&frame.samples, frame.sample_rate, self.target_rate);
        let audio_data = pcm::encode_samples(&samples);

        self.channel.send_audio(OutboundAudio {
            session_id,
            audio_data,
        });
        self.counters.frames_sent.fetch_add(1, Ordering::Relaxed);

        FrameOutcome::Sent
    }

    /// Drive the pipeline from a backend's frame stream until it ends.
    pub fn spawn(mut self, mut frames: mpsc::Receiver<AudioFrame>) -> JoinHandle<()> {
        tokio::spawn(async move {
            info!("Capture pipeline started ({}Hz out)", self.target_rate);

            while let Some(frame) = frames.recv().await {
                let outcome = self.process_frame(&frame);
                if outcome != FrameOutcome::Sent {
                    debug!("frame at {}ms dropped: {:?}", frame.timestamp_ms, outcome);
                }
            }

            self.level_tx.send_replace(0.0);
            info!(
                "Capture pipeline stopped ({} frames sent, {} dropped)",
                self.counters.sent(),
                self.counters.dropped()
            );
        })
    }
}
