//! Voice overlay driver.
//!
//! Wires a [`VoiceSession`], a capture backend and the session channel to
//! user intent. One control task owns the session; the [`OverlayHandle`]
//! talks to it through a command queue and watches its published state.

use crate::audio::backend::AudioBackend;
use crate::audio::output::SinkFactory;
use crate::channel::{SessionChannel, SessionEvent, Subscription};
use crate::error::{Result, VoiceError};
use crate::pipeline::{CaptureGate, CapturePipeline};
use crate::session::{
    SessionCallbacks, SessionConfig, SessionStats, SessionStatus, TranscriptEntry, VoiceSession,
};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, oneshot, watch, Notify};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};
use uuid::Uuid;

const COMMAND_QUEUE_DEPTH: usize = 16;

/// How long teardown waits for the capture task to drain
const CAPTURE_DRAIN_TIMEOUT: Duration = Duration::from_secs(1);

#[derive(Debug)]
enum OverlayCommand {
    ToggleMute(oneshot::Sender<bool>),
    SetMuted(bool, oneshot::Sender<bool>),
}

pub struct VoiceOverlay {
    config: SessionConfig,
    channel: Arc<dyn SessionChannel>,
    sinks: Arc<dyn SinkFactory>,
    backend: Box<dyn AudioBackend>,
    callbacks: SessionCallbacks,
}

impl VoiceOverlay {
    pub fn new(
        config: SessionConfig,
        channel: Arc<dyn SessionChannel>,
        sinks: Arc<dyn SinkFactory>,
        backend: Box<dyn AudioBackend>,
    ) -> Self {
        Self {
            config,
            channel,
            sinks,
            backend,
            callbacks: SessionCallbacks::default(),
        }
    }

    pub fn with_callbacks(mut self, callbacks: SessionCallbacks) -> Self {
        self.callbacks = callbacks;
        self
    }

    /// Mount the overlay: spawn its control task and return the handle.
    ///
    /// Must be called from within a tokio runtime.
    pub fn open(self) -> OverlayHandle {
        let id = Uuid::new_v4();
        let target_rate = self.config.capture_sample_rate;
        let session = VoiceSession::new(self.config, self.channel, self.sinks, self.callbacks);

        let (pipeline, level) =
            CapturePipeline::new(session.channel(), session.gate(), target_rate, session.counters());
        let (commands_tx, commands_rx) = mpsc::channel(COMMAND_QUEUE_DEPTH);
        let mounted = Arc::new(AtomicBool::new(true));
        let unmounted = Arc::new(Notify::new());

        info!("Opening voice overlay {} ({})", id, self.backend.name());

        let gate = session.gate();
        let status = session.subscribe_status();
        let transcript = session.subscribe_transcript();

        let control = OverlayTask {
            id,
            session,
            backend: self.backend,
            commands: commands_rx,
            mounted: Arc::clone(&mounted),
            unmounted: Arc::clone(&unmounted),
        };
        let task = tokio::spawn(control.run(pipeline));

        OverlayHandle {
            id,
            commands: commands_tx,
            mounted,
            unmounted,
            gate,
            status,
            level,
            transcript,
            task: Some(task),
        }
    }
}

/// Handle to a mounted overlay. Dropping it unmounts the overlay; the control
/// task then tears everything down on its own.
pub struct OverlayHandle {
    id: Uuid,
    commands: mpsc::Sender<OverlayCommand>,
    mounted: Arc<AtomicBool>,
    unmounted: Arc<Notify>,
    gate: Arc<CaptureGate>,
    status: watch::Receiver<SessionStatus>,
    level: watch::Receiver<f32>,
    transcript: watch::Receiver<Vec<TranscriptEntry>>,
    task: Option<JoinHandle<SessionStats>>,
}

impl OverlayHandle {
    pub fn id(&self) -> Uuid {
        self.id
    }

    /// Flip mute. Returns the new value once the session has applied it.
    pub async fn toggle_mute(&self) -> Result<bool> {
        let (tx, rx) = oneshot::channel();
        self.send(OverlayCommand::ToggleMute(tx)).await?;
        rx.await.map_err(|_| closed())
    }

    pub async fn set_muted(&self, muted: bool) -> Result<bool> {
        let (tx, rx) = oneshot::channel();
        self.send(OverlayCommand::SetMuted(muted, tx)).await?;
        rx.await.map_err(|_| closed())
    }

    pub fn is_muted(&self) -> bool {
        self.gate.is_muted()
    }

    pub fn session_id(&self) -> Option<String> {
        self.gate.session_id()
    }

    pub fn status(&self) -> SessionStatus {
        self.status.borrow().clone()
    }

    /// Watch status changes.
    pub fn status_updates(&self) -> watch::Receiver<SessionStatus> {
        self.status.clone()
    }

    /// Latest microphone level in [0, 1].
    pub fn level(&self) -> f32 {
        *self.level.borrow()
    }

    pub fn level_updates(&self) -> watch::Receiver<f32> {
        self.level.clone()
    }

    pub fn transcript(&self) -> Vec<TranscriptEntry> {
        self.transcript.borrow().clone()
    }

    pub fn transcript_updates(&self) -> watch::Receiver<Vec<TranscriptEntry>> {
        self.transcript.clone()
    }

    /// Whether the control task has finished.
    pub fn is_finished(&self) -> bool {
        self.task.as_ref().map_or(true, |t| t.is_finished())
    }

    /// Unmount and wait for teardown. Returns the final statistics.
    pub async fn close(mut self) -> Result<SessionStats> {
        self.unmount();
        let task = self.task.take().ok_or_else(closed)?;
        task.await
            .map_err(|e| VoiceError::Channel(format!("overlay task failed: {e}")))
    }

    async fn send(&self, command: OverlayCommand) -> Result<()> {
        self.commands.send(command).await.map_err(|_| closed())
    }

    fn unmount(&self) {
        if self.mounted.swap(false, Ordering::SeqCst) {
            debug!("overlay {} unmounted", self.id);
            // Leaves a permit if the task is not waiting yet.
            self.unmounted.notify_one();
        }
    }
}

impl Drop for OverlayHandle {
    fn drop(&mut self) {
        self.unmount();
    }
}

fn closed() -> VoiceError {
    VoiceError::Channel("overlay is closed".into())
}

struct OverlayTask {
    id: Uuid,
    session: VoiceSession,
    backend: Box<dyn AudioBackend>,
    commands: mpsc::Receiver<OverlayCommand>,
    mounted: Arc<AtomicBool>,
    unmounted: Arc<Notify>,
}

impl OverlayTask {
    async fn run(mut self, pipeline: CapturePipeline) -> SessionStats {
        let mut subscription = match self.session.channel().subscribe().await {
            Ok(subscription) => Some(subscription),
            Err(e) => {
                self.session
                    .fail(&VoiceError::SessionStart(format!("subscribe failed: {e}")));
                None
            }
        };

        let mut frames = None;
        if subscription.is_some() {
            let (started, capture) = tokio::join!(self.session.start(), self.backend.start());
            if let Err(e) = started {
                debug!("overlay {} has no session: {}", self.id, e);
            }
            match capture {
                Ok(rx) => frames = Some(rx),
                Err(e) => self.session.report(&e),
            }
        }

        if !self.mounted.load(Ordering::SeqCst) {
            info!("overlay {} closed during startup", self.id);
            return self.teardown(subscription, None).await;
        }

        let capture_task = frames.map(|frames| pipeline.spawn(frames));

        loop {
            tokio::select! {
                biased;

                _ = self.unmounted.notified() => break,

                command = self.commands.recv() => match command {
                    Some(OverlayCommand::ToggleMute(reply)) => {
                        let _ = reply.send(self.session.toggle_mute());
                    }
                    Some(OverlayCommand::SetMuted(muted, reply)) => {
                        self.session.set_muted(muted);
                        let _ = reply.send(muted);
                    }
                    None => break,
                },

                event = next_event(&mut subscription) => match event {
                    Some(event) => self.session.handle_event(event),
                    None => {
                        warn!("overlay {}: event stream ended", self.id);
                        break;
                    }
                },
            }
        }

        self.teardown(subscription, capture_task).await
    }

    async fn teardown(
        mut self,
        subscription: Option<Subscription>,
        capture_task: Option<JoinHandle<()>>,
    ) -> SessionStats {
        info!("Tearing down voice overlay {}", self.id);

        if let Err(e) = self.backend.stop().await {
            warn!("failed to stop {} capture: {}", self.backend.name(), e);
        }
        if let Some(mut task) = capture_task {
            if tokio::time::timeout(CAPTURE_DRAIN_TIMEOUT, &mut task)
                .await
                .is_err()
            {
                warn!("capture pipeline did not drain, aborting");
                task.abort();
            }
        }

        if let Some(subscription) = subscription {
            subscription.unsubscribe();
        }

        self.session.stop().await;

        let stats = self.session.stats();
        info!(
            "Voice overlay {} closed: {} frames sent, {} chunks played, {} turns",
            self.id, stats.frames_sent, stats.chunks_scheduled, stats.turns_completed
        );
        stats
    }
}

async fn next_event(subscription: &mut Option<Subscription>) -> Option<SessionEvent> {
    match subscription {
        Some(subscription) => subscription.next().await,
        None => std::future::pending().await,
    }
}
