use super::config::SessionConfig;
use super::state::SessionStatus;
use super::stats::SessionStats;
use super::transcript::{Role, TranscriptAccumulator, TranscriptEntry, TranscriptLog};
use crate::audio::output::SinkFactory;
use crate::channel::{SessionChannel, SessionEvent, TextKind};
use crate::error::{Result, VoiceError};
use crate::pipeline::{CaptureCounters, CaptureGate, PlaybackScheduler};
use chrono::{DateTime, Utc};
use std::fmt;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tracing::{debug, error, info, warn};

/// Upper bound on waiting for the service to acknowledge a stop
const STOP_TIMEOUT: Duration = Duration::from_secs(2);

pub type MessageCallback = Arc<dyn Fn(String) + Send + Sync>;
pub type ErrorCallback = Arc<dyn Fn(&VoiceError) + Send + Sync>;

/// Hooks into the surrounding chat UI.
///
/// Each callback is optional. Without `on_user_message` the user's flushed
/// text is discarded; without `on_ai_message` the assistant's is.
#[derive(Clone, Default)]
pub struct SessionCallbacks {
    pub on_user_message: Option<MessageCallback>,
    pub on_ai_message: Option<MessageCallback>,
    pub on_error: Option<ErrorCallback>,
}

impl SessionCallbacks {
    pub fn on_user_message(mut self, f: impl Fn(String) + Send + Sync + 'static) -> Self {
        self.on_user_message = Some(Arc::new(f));
        self
    }

    pub fn on_ai_message(mut self, f: impl Fn(String) + Send + Sync + 'static) -> Self {
        self.on_ai_message = Some(Arc::new(f));
        self
    }

    pub fn on_error(mut self, f: impl Fn(&VoiceError) + Send + Sync + 'static) -> Self {
        self.on_error = Some(Arc::new(f));
        self
    }
}

impl fmt::Debug for SessionCallbacks {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SessionCallbacks")
            .field("on_user_message", &self.on_user_message.is_some())
            .field("on_ai_message", &self.on_ai_message.is_some())
            .field("on_error", &self.on_error.is_some())
            .finish()
    }
}

/// One voice conversation: lifecycle, turn-taking, transcript and playback.
///
/// Owned by a single control task. Inbound events and user commands are
/// applied one at a time in arrival order.
pub struct VoiceSession {
    /// Session configuration
    config: SessionConfig,

    channel: Arc<dyn SessionChannel>,

    scheduler: PlaybackScheduler,

    /// Mute flag and session id as seen by the capture path
    gate: Arc<CaptureGate>,

    /// Id assigned by the service once `start` succeeds
    session_id: Option<String>,

    status_tx: watch::Sender<SessionStatus>,

    transcript_tx: watch::Sender<Vec<TranscriptEntry>>,

    /// Text waiting for the next turn boundary
    pending: TranscriptAccumulator,

    log: TranscriptLog,

    callbacks: SessionCallbacks,

    counters: Arc<CaptureCounters>,

    started_at: DateTime<Utc>,
    chunks_scheduled: usize,
    chunks_dropped: usize,
    turns_completed: usize,
    interruptions: usize,
}

impl VoiceSession {
    pub fn new(
        config: SessionConfig,
        channel: Arc<dyn SessionChannel>,
        sinks: Arc<dyn SinkFactory>,
        callbacks: SessionCallbacks,
    ) -> Self {
        let (status_tx, _) = watch::channel(SessionStatus::Idle);
        let (transcript_tx, _) = watch::channel(Vec::new());

        Self {
            gate: CaptureGate::new(config.start_muted),
            scheduler: PlaybackScheduler::with_default_rate(sinks, config.default_playback_rate),
            config,
            channel,
            session_id: None,
            status_tx,
            transcript_tx,
            pending: TranscriptAccumulator::default(),
            log: TranscriptLog::default(),
            callbacks,
            counters: Arc::new(CaptureCounters::default()),
            started_at: Utc::now(),
            chunks_scheduled: 0,
            chunks_dropped: 0,
            turns_completed: 0,
            interruptions: 0,
        }
    }

    /// Ask the service for a session bound to the configured context.
    ///
    /// On failure the session moves to `Error` and stays unusable.
    pub async fn start(&mut self) -> Result<String> {
        if self.session_id.is_some() || self.status().is_terminal() {
            return Err(VoiceError::SessionStart(format!(
                "session cannot be started from state {}",
                self.status()
            )));
        }

        info!("Starting voice session for context {}", self.config.context_id);
        self.set_status(SessionStatus::Connecting);

        match self.channel.start(&self.config.context_id).await {
            Ok(session_id) => {
                info!("Voice session {} started", session_id);
                self.session_id = Some(session_id.clone());
                self.gate.set_session_id(Some(session_id.clone()));
                self.set_status(SessionStatus::Ready);
                Ok(session_id)
            }
            Err(e) => {
                let e = if matches!(e, VoiceError::SessionStart(_)) {
                    e
                } else {
                    VoiceError::SessionStart(e.to_string())
                };
                self.fail(&e);
                Err(e)
            }
        }
    }

    /// Apply one inbound event.
    pub fn handle_event(&mut self, event: SessionEvent) {
        if !self.status().is_live() {
            debug!("ignoring event in state {}", self.status());
            return;
        }
        if let Some(event_session) = event.session_id() {
            if self.session_id.as_deref() != Some(event_session) {
                debug!("ignoring event for session {}", event_session);
                return;
            }
        }

        match event {
            SessionEvent::Text { kind, text, .. } => self.handle_text(kind, text),
            SessionEvent::Audio {
                audio_data,
                mime_type,
                ..
            } => match self.scheduler.schedule(&audio_data, mime_type.as_deref()) {
                Ok(_) => {
                    self.chunks_scheduled += 1;
                    self.set_status(SessionStatus::Speaking);
                }
                Err(e) => {
                    self.chunks_dropped += 1;
                    warn!("dropping audio chunk: {}", e);
                }
            },
            SessionEvent::TurnComplete { .. } => {
                self.set_status(SessionStatus::Listening);
                self.flush_user();
                self.flush_assistant();
                self.close_turn();
                self.turns_completed += 1;
            }
            SessionEvent::Interrupted { .. } => {
                info!("assistant interrupted, discarding queued playback");
                self.set_status(SessionStatus::Listening);
                self.flush_assistant();
                self.scheduler.reset();
                self.close_turn();
                self.interruptions += 1;
            }
        }
    }

    fn handle_text(&mut self, kind: TextKind, text: String) {
        match kind {
            TextKind::Ready => {
                if self.status() == SessionStatus::Connecting {
                    self.set_status(SessionStatus::Ready);
                }
                let notice = if text.is_empty() { "Connected" } else { text.as_str() };
                self.record(Role::Status, notice);
            }
            TextKind::Error => self.fail(&VoiceError::Remote(text)),
            TextKind::Input => {
                self.pending.push_user(&text);
                self.record(Role::User, &text);
            }
            TextKind::Output => {
                self.pending.push_assistant(&text);
                self.record(Role::Assistant, &text);
                self.set_status(SessionStatus::Speaking);
            }
        }
    }

    /// Flip the microphone mute flag. Returns the new value.
    pub fn toggle_mute(&mut self) -> bool {
        let muted = self.gate.toggle_muted();
        info!("Microphone {}", if muted { "muted" } else { "unmuted" });
        muted
    }

    pub fn set_muted(&mut self, muted: bool) {
        self.gate.set_muted(muted);
        info!("Microphone {}", if muted { "muted" } else { "unmuted" });
    }

    /// Report an error that leaves the session open, such as a denied
    /// microphone. Capture stays off but playback and transcripts continue.
    pub fn report(&mut self, err: &VoiceError) {
        warn!("{}", err);
        self.record(Role::Status, &err.to_string());
        self.notify_error(err);
    }

    /// End the session. Stop failures are logged and swallowed.
    pub async fn stop(&mut self) {
        if self.status() == SessionStatus::Closed {
            return;
        }

        self.gate.set_session_id(None);
        self.scheduler.reset();

        // Kept for the final stats; the closed status guards a second stop.
        if let Some(session_id) = self.session_id.clone() {
            info!("Stopping voice session {}", session_id);
            match tokio::time::timeout(STOP_TIMEOUT, self.channel.stop(&session_id)).await {
                Ok(Ok(())) => {}
                Ok(Err(e)) => warn!("failed to stop session {}: {}", session_id, e),
                Err(_) => warn!("timed out stopping session {}", session_id),
            }
        }

        self.set_status(SessionStatus::Closed);
    }

    pub fn status(&self) -> SessionStatus {
        self.status_tx.borrow().clone()
    }

    pub fn subscribe_status(&self) -> watch::Receiver<SessionStatus> {
        self.status_tx.subscribe()
    }

    pub fn subscribe_transcript(&self) -> watch::Receiver<Vec<TranscriptEntry>> {
        self.transcript_tx.subscribe()
    }

    pub fn session_id(&self) -> Option<&str> {
        self.session_id.as_deref()
    }

    pub fn is_muted(&self) -> bool {
        self.gate.is_muted()
    }

    pub fn config(&self) -> &SessionConfig {
        &self.config
    }

    pub fn channel(&self) -> Arc<dyn SessionChannel> {
        Arc::clone(&self.channel)
    }

    /// Shared cell the capture pipeline reads on every frame.
    pub fn gate(&self) -> Arc<CaptureGate> {
        Arc::clone(&self.gate)
    }

    pub fn counters(&self) -> Arc<CaptureCounters> {
        Arc::clone(&self.counters)
    }

    pub fn transcript(&self) -> &[TranscriptEntry] {
        self.log.entries()
    }

    pub fn playback(&self) -> &PlaybackScheduler {
        &self.scheduler
    }

    /// Get current statistics
    pub fn stats(&self) -> SessionStats {
        let duration = Utc::now().signed_duration_since(self.started_at);

        SessionStats {
            session_id: self.session_id.clone(),
            status: self.status(),
            muted: self.is_muted(),
            started_at: self.started_at,
            duration_secs: duration.num_milliseconds() as f64 / 1000.0,
            frames_sent: self.counters.sent(),
            frames_dropped: self.counters.dropped(),
            chunks_scheduled: self.chunks_scheduled,
            chunks_dropped: self.chunks_dropped,
            turns_completed: self.turns_completed,
            interruptions: self.interruptions,
            transcript_entries: self.log.entries().len(),
        }
    }

    /// Move to `Error` and stop sending audio. The session is unusable
    /// afterwards.
    pub fn fail(&mut self, err: &VoiceError) {
        error!("Voice session failed: {}", err);
        self.gate.set_session_id(None);
        self.set_status(SessionStatus::Error(err.to_string()));
        self.record(Role::Status, &err.to_string());
        self.notify_error(err);
    }

    fn notify_error(&self, err: &VoiceError) {
        if let Some(on_error) = &self.callbacks.on_error {
            on_error(err);
        }
    }

    fn flush_user(&mut self) {
        if let Some(text) = self.pending.take_user() {
            debug!("flushing user turn ({} chars)", text.len());
            if let Some(on_user_message) = &self.callbacks.on_user_message {
                on_user_message(text);
            }
        }
    }

    fn flush_assistant(&mut self) {
        if let Some(text) = self.pending.take_assistant() {
            debug!("flushing assistant turn ({} chars)", text.len());
            if let Some(on_ai_message) = &self.callbacks.on_ai_message {
                on_ai_message(text);
            }
        }
    }

    fn record(&mut self, role: Role, text: &str) {
        self.log.append(role, text);
        self.transcript_tx.send_replace(self.log.entries().to_vec());
    }

    fn close_turn(&mut self) {
        self.log.close_turn();
    }

    fn set_status(&self, status: SessionStatus) {
        let changed = self.status_tx.send_if_modified(|current| {
            if *current == status {
                false
            } else {
                *current = status.clone();
                true
            }
        });
        if changed {
            debug!("session status -> {}", status);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audio::pcm;
    use crate::audio::{HeadlessSinkFactory, ManualClock};
    use crate::channel::MemoryChannel;
    use std::sync::Mutex;

    struct Fixture {
        session: VoiceSession,
        sinks: HeadlessSinkFactory,
        ai_messages: Arc<Mutex<Vec<String>>>,
        user_messages: Arc<Mutex<Vec<String>>>,
    }

    fn fixture(channel: &MemoryChannel) -> Fixture {
        let sinks = HeadlessSinkFactory::manual(ManualClock::new());
        let ai_messages = Arc::new(Mutex::new(Vec::new()));
        let user_messages = Arc::new(Mutex::new(Vec::new()));

        let ai = Arc::clone(&ai_messages);
        let user = Arc::clone(&user_messages);
        let callbacks = SessionCallbacks::default()
            .on_ai_message(move |text| ai.lock().unwrap().push(text))
            .on_user_message(move |text| user.lock().unwrap().push(text));

        let session = VoiceSession::new(
            SessionConfig::default(),
            Arc::new(channel.clone()),
            Arc::new(sinks.clone()),
            callbacks,
        );

        Fixture {
            session,
            sinks,
            ai_messages,
            user_messages,
        }
    }

    fn text(kind: TextKind, text: &str) -> SessionEvent {
        SessionEvent::Text {
            session_id: "session-1".into(),
            kind,
            text: text.into(),
        }
    }

    fn turn_complete() -> SessionEvent {
        SessionEvent::TurnComplete { session_id: None }
    }

    fn audio_chunk(seconds: f64) -> SessionEvent {
        let samples = vec![0.1f32; (24_000.0 * seconds) as usize];
        SessionEvent::Audio {
            session_id: "session-1".into(),
            audio_data: pcm::encode_samples(&samples),
            mime_type: Some("audio/pcm;rate=24000".into()),
        }
    }

    #[tokio::test]
    async fn test_start_moves_to_ready() {
        let channel = MemoryChannel::new();
        let mut f = fixture(&channel);

        let id = f.session.start().await.unwrap();
        assert_eq!(id, "session-1");
        assert_eq!(f.session.status(), SessionStatus::Ready);
        assert_eq!(f.session.gate().session_id().as_deref(), Some("session-1"));
    }

    #[tokio::test]
    async fn test_start_failure_is_terminal() {
        let channel = MemoryChannel::new();
        channel.fail_next_start("no quota");
        let mut f = fixture(&channel);

        let err = f.session.start().await.unwrap_err();
        assert!(matches!(err, VoiceError::SessionStart(_)));
        assert!(matches!(f.session.status(), SessionStatus::Error(_)));

        // Unusable afterwards
        assert!(f.session.start().await.is_err());
        f.session.handle_event(text(TextKind::Output, "late"));
        assert!(f.ai_messages.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_turn_complete_flushes_once() {
        let channel = MemoryChannel::new();
        let mut f = fixture(&channel);
        f.session.start().await.unwrap();

        f.session.handle_event(text(TextKind::Output, "Hello"));
        f.session.handle_event(text(TextKind::Output, " world"));
        assert_eq!(f.session.status(), SessionStatus::Speaking);
        f.session.handle_event(turn_complete());

        assert_eq!(*f.ai_messages.lock().unwrap(), vec!["Hello world"]);
        assert_eq!(f.session.status(), SessionStatus::Listening);

        f.session.handle_event(text(TextKind::Output, "Next"));
        f.session.handle_event(turn_complete());
        assert_eq!(*f.ai_messages.lock().unwrap(), vec!["Hello world", "Next"]);
    }

    #[tokio::test]
    async fn test_turn_complete_flushes_user_then_assistant() {
        let channel = MemoryChannel::new();
        let mut f = fixture(&channel);
        f.session.start().await.unwrap();

        f.session.handle_event(text(TextKind::Input, "What is"));
        f.session.handle_event(text(TextKind::Input, " this?"));
        assert_eq!(f.session.status(), SessionStatus::Ready);
        f.session.handle_event(text(TextKind::Output, "A notebook."));
        f.session.handle_event(turn_complete());

        assert_eq!(*f.user_messages.lock().unwrap(), vec!["What is this?"]);
        assert_eq!(*f.ai_messages.lock().unwrap(), vec!["A notebook."]);
        assert_eq!(f.session.stats().turns_completed, 1);
    }

    #[tokio::test]
    async fn test_interrupted_flushes_partial_and_resets_playback() {
        let channel = MemoryChannel::new();
        let mut f = fixture(&channel);
        f.session.start().await.unwrap();

        f.session.handle_event(audio_chunk(1.0));
        f.session.handle_event(text(TextKind::Output, "Hel"));
        assert_eq!(f.sinks.sinks_created(), 1);

        f.session
            .handle_event(SessionEvent::Interrupted { session_id: None });

        assert_eq!(*f.ai_messages.lock().unwrap(), vec!["Hel"]);
        assert_eq!(f.sinks.sinks_closed(), 1);
        assert_eq!(f.session.playback().playback_clock(), 0.0);
        assert_eq!(f.session.status(), SessionStatus::Listening);

        // Nothing left to flush on the next boundary
        f.session.handle_event(turn_complete());
        assert_eq!(f.ai_messages.lock().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_malformed_chunk_is_dropped() {
        let channel = MemoryChannel::new();
        let mut f = fixture(&channel);
        f.session.start().await.unwrap();

        f.session.handle_event(SessionEvent::Audio {
            session_id: "session-1".into(),
            audio_data: "not base64!".into(),
            mime_type: None,
        });
        f.session.handle_event(audio_chunk(0.5));

        let stats = f.session.stats();
        assert_eq!(stats.chunks_dropped, 1);
        assert_eq!(stats.chunks_scheduled, 1);
        assert_eq!(f.sinks.records().len(), 1);
    }

    #[tokio::test]
    async fn test_events_for_other_sessions_are_ignored() {
        let channel = MemoryChannel::new();
        let mut f = fixture(&channel);
        f.session.start().await.unwrap();

        f.session.handle_event(SessionEvent::Text {
            session_id: "session-99".into(),
            kind: TextKind::Output,
            text: "stray".into(),
        });
        f.session.handle_event(turn_complete());

        assert!(f.ai_messages.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_remote_error_stops_capture() {
        let channel = MemoryChannel::new();
        let mut f = fixture(&channel);
        f.session.start().await.unwrap();

        f.session.handle_event(text(TextKind::Error, "model overloaded"));

        assert!(matches!(f.session.status(), SessionStatus::Error(_)));
        assert_eq!(f.session.gate().session_id(), None);
        let last = f.session.transcript().last().unwrap();
        assert_eq!(last.role, Role::Status);
    }

    #[tokio::test]
    async fn test_mute_does_not_change_status() {
        let channel = MemoryChannel::new();
        let mut f = fixture(&channel);
        f.session.start().await.unwrap();

        assert!(f.session.toggle_mute());
        assert_eq!(f.session.status(), SessionStatus::Ready);
        assert!(!f.session.toggle_mute());
        assert_eq!(f.session.status(), SessionStatus::Ready);
    }

    #[tokio::test]
    async fn test_stop_swallows_failures() {
        let channel = MemoryChannel::new();
        channel.fail_stop(true);
        let mut f = fixture(&channel);
        f.session.start().await.unwrap();

        f.session.stop().await;

        assert_eq!(f.session.status(), SessionStatus::Closed);
        assert_eq!(channel.stop_calls(), vec!["session-1"]);
        assert_eq!(f.session.gate().session_id(), None);

        // Second stop is a no-op
        f.session.stop().await;
        assert_eq!(channel.stop_calls().len(), 1);
    }

    #[tokio::test]
    async fn test_stats_after_stop_keep_session_id() {
        let channel = MemoryChannel::new();
        let mut f = fixture(&channel);
        f.session.start().await.unwrap();

        f.session.stop().await;

        let stats = f.session.stats();
        assert_eq!(stats.status, SessionStatus::Closed);
        assert_eq!(stats.session_id.as_deref(), Some("session-1"));
        assert_eq!(f.session.session_id(), Some("session-1"));
    }
}
