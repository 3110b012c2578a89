//! Session Channel: the boundary to the remote voice service.
//!
//! Outbound: start a session, stream microphone frames, stop the session.
//! Inbound: a single ordered stream of [`SessionEvent`]s.

pub mod memory;
pub mod messages;
pub mod nats;

pub use memory::MemoryChannel;
pub use messages::TextKind;
pub use nats::NatsChannel;

use crate::error::Result;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

/// An inbound event from the voice service, in arrival order.
#[derive(Debug, Clone, PartialEq)]
pub enum SessionEvent {
    Text {
        session_id: String,
        kind: TextKind,
        text: String,
    },
    Audio {
        session_id: String,
        audio_data: String,
        mime_type: Option<String>,
    },
    TurnComplete {
        session_id: Option<String>,
    },
    Interrupted {
        session_id: Option<String>,
    },
}

impl SessionEvent {
    /// Session the event belongs to, when the service says.
    pub fn session_id(&self) -> Option<&str> {
        match self {
            SessionEvent::Text { session_id, .. } | SessionEvent::Audio { session_id, .. } => {
                Some(session_id)
            }
            SessionEvent::TurnComplete { session_id } | SessionEvent::Interrupted { session_id } => {
                session_id.as_deref()
            }
        }
    }
}

/// One encoded microphone frame bound for the service.
#[derive(Debug, Clone, PartialEq)]
pub struct OutboundAudio {
    pub session_id: String,
    /// Base64 PCM16 mono at the capture target rate
    pub audio_data: String,
}

#[async_trait::async_trait]
pub trait SessionChannel: Send + Sync {
    /// Begin a session bound to a knowledge context. Returns the session id.
    async fn start(&self, context_id: &str) -> Result<String>;

    /// Hand a frame to the transport without waiting for delivery.
    ///
    /// Called from the capture path; must return immediately. Failures are
    /// dropped by the implementation.
    fn send_audio(&self, frame: OutboundAudio);

    /// Ask the service to end the session. Best-effort.
    async fn stop(&self, session_id: &str) -> Result<()>;

    /// Subscribe to inbound events for all sessions on this channel.
    async fn subscribe(&self) -> Result<Subscription>;
}

/// Inbound event stream. Dropping it unsubscribes.
pub struct Subscription {
    events: mpsc::Receiver<SessionEvent>,
    forwarder: Option<JoinHandle<()>>,
}

impl Subscription {
    pub fn new(events: mpsc::Receiver<SessionEvent>, forwarder: Option<JoinHandle<()>>) -> Self {
        Self { events, forwarder }
    }

    /// Next event, or `None` once the channel has closed.
    pub async fn next(&mut self) -> Option<SessionEvent> {
        self.events.recv().await
    }

    pub fn unsubscribe(mut self) {
        self.shutdown();
    }

    fn shutdown(&mut self) {
        self.events.close();
        if let Some(forwarder) = self.forwarder.take() {
            forwarder.abort();
        }
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        self.shutdown();
    }
}
