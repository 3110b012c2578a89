//! In-process session channel.
//!
//! Stands in for the voice service when the pipeline runs without a broker:
//! session ids are assigned locally, outbound frames and stop calls are
//! recorded, and inbound events are injected with [`MemoryChannel::emit`].

use super::{OutboundAudio, SessionChannel, SessionEvent, Subscription};
use crate::error::{Result, VoiceError};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;
use tokio::sync::mpsc;
use tracing::debug;

const SUBSCRIPTION_CAPACITY: usize = 1024;

#[derive(Default)]
struct MemoryState {
    next_session: AtomicUsize,
    fail_start: Mutex<Option<String>>,
    fail_stop: AtomicBool,
    start_delay: Mutex<Option<Duration>>,
    sent: Mutex<Vec<OutboundAudio>>,
    stopped: Mutex<Vec<String>>,
    subscribers: Mutex<Vec<mpsc::Sender<SessionEvent>>>,
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    match mutex.lock() {
        Ok(guard) => guard,
        Err(poisoned) => poisoned.into_inner(),
    }
}

#[derive(Clone, Default)]
pub struct MemoryChannel {
    state: Arc<MemoryState>,
}

impl MemoryChannel {
    pub fn new() -> Self {
        Self::default()
    }

    /// Deliver an inbound event to every live subscription.
    pub fn emit(&self, event: SessionEvent) {
        let mut subscribers = lock(&self.state.subscribers);
        subscribers.retain(|tx| !tx.is_closed());
        for tx in subscribers.iter() {
            if tx.try_send(event.clone()).is_err() {
                debug!("memory subscription full, dropping event");
            }
        }
    }

    /// Make the next `start` call fail with `message`.
    pub fn fail_next_start(&self, message: impl Into<String>) {
        *lock(&self.state.fail_start) = Some(message.into());
    }

    /// Make `stop` calls fail (the failure must be swallowed by callers).
    pub fn fail_stop(&self, fail: bool) {
        self.state.fail_stop.store(fail, Ordering::SeqCst);
    }

    /// Delay `start` replies, simulating a slow service.
    pub fn set_start_delay(&self, delay: Duration) {
        *lock(&self.state.start_delay) = Some(delay);
    }

    pub fn sent_frames(&self) -> Vec<OutboundAudio> {
        lock(&self.state.sent).clone()
    }

    pub fn stop_calls(&self) -> Vec<String> {
        lock(&self.state.stopped).clone()
    }

    pub fn subscriber_count(&self) -> usize {
        lock(&self.state.subscribers)
            .iter()
            .filter(|tx| !tx.is_closed())
            .count()
    }
}

#[async_trait::async_trait]
impl SessionChannel for MemoryChannel {
    async fn start(&self, context_id: &str) -> Result<String> {
        let delay = *lock(&self.state.start_delay);
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }

        if let Some(message) = lock(&self.state.fail_start).take() {
            return Err(VoiceError::SessionStart(message));
        }

        let n = self.state.next_session.fetch_add(1, Ordering::SeqCst) + 1;
        let session_id = format!("session-{n}");
        debug!("memory channel started {session_id} for context {context_id}");
        Ok(session_id)
    }

    fn send_audio(&self, frame: OutboundAudio) {
        lock(&self.state.sent).push(frame);
    }

    async fn stop(&self, session_id: &str) -> Result<()> {
        lock(&self.state.stopped).push(session_id.to_string());
        if self.state.fail_stop.load(Ordering::SeqCst) {
            return Err(VoiceError::Channel("stop rejected".into()));
        }
        Ok(())
    }

    async fn subscribe(&self) -> Result<Subscription> {
        let (tx, rx) = mpsc::channel(SUBSCRIPTION_CAPACITY);
        lock(&self.state.subscribers).push(tx);
        Ok(Subscription::new(rx, None))
    }
}
