use super::messages::{
    AudioFrameMessage, ResponseAudioMessage, ResponseTextMessage, StartRequest, StartResponse,
    StopRequest,
};
use super::{OutboundAudio, SessionChannel, SessionEvent, Subscription};
use crate::error::{Result, VoiceError};
use anyhow::Context;
use async_nats::Client;
use futures::stream::StreamExt;
use tokio::runtime::Handle;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

const EVENT_BUFFER: usize = 256;

/// Session channel over NATS.
///
/// Subjects (with the default `voice` prefix):
/// - `voice.start` request/reply, `voice.stop` publish
/// - `voice.audio.<session>` outbound frames
/// - `voice.session.<session>.{text,audio,turn_complete,interrupted}` inbound
pub struct NatsChannel {
    client: Client,
    prefix: String,
    runtime: Handle,
}

impl NatsChannel {
    /// Connect to NATS server
    pub async fn connect(url: &str, prefix: impl Into<String>) -> anyhow::Result<Self> {
        info!("Connecting to NATS at {}", url);

        let client = async_nats::connect(url)
            .await
            .context("Failed to connect to NATS")?;

        info!("Connected to NATS successfully");

        Ok(Self {
            client,
            prefix: prefix.into(),
            runtime: Handle::current(),
        })
    }

    fn subject(&self, suffix: &str) -> String {
        format!("{}.{}", self.prefix, suffix)
    }
}

/// Decode one inbound message by its subject suffix.
///
/// Returns `Ok(None)` for subjects that are not session events.
pub fn decode_event(prefix: &str, subject: &str, payload: &[u8]) -> Result<Option<SessionEvent>> {
    let Some(rest) = subject
        .strip_prefix(prefix)
        .and_then(|s| s.strip_prefix(".session."))
    else {
        return Ok(None);
    };
    let Some((session_id, kind)) = rest.rsplit_once('.') else {
        return Ok(None);
    };

    let bad_payload = |e: serde_json::Error| VoiceError::Channel(format!("bad {kind} payload: {e}"));

    let event = match kind {
        "text" => {
            let msg: ResponseTextMessage = serde_json::from_slice(payload).map_err(bad_payload)?;
            SessionEvent::Text {
                session_id: msg.session_id,
                kind: msg.kind,
                text: msg.text,
            }
        }
        "audio" => {
            let msg: ResponseAudioMessage = serde_json::from_slice(payload).map_err(bad_payload)?;
            SessionEvent::Audio {
                session_id: msg.session_id,
                audio_data: msg.audio_data,
                mime_type: msg.mime_type,
            }
        }
        "turn_complete" => SessionEvent::TurnComplete {
            session_id: Some(session_id.to_string()),
        },
        "interrupted" => SessionEvent::Interrupted {
            session_id: Some(session_id.to_string()),
        },
        _ => return Ok(None),
    };

    Ok(Some(event))
}

#[async_trait::async_trait]
impl SessionChannel for NatsChannel {
    async fn start(&self, context_id: &str) -> Result<String> {
        let request = StartRequest {
            context_id: context_id.to_string(),
        };
        let payload = serde_json::to_vec(&request)
            .map_err(|e| VoiceError::SessionStart(format!("failed to encode request: {e}")))?;

        let reply = self
            .client
            .request(self.subject("start"), payload.into())
            .await
            .map_err(|e| VoiceError::SessionStart(e.to_string()))?;

        let response: StartResponse = serde_json::from_slice(&reply.payload)
            .map_err(|e| VoiceError::SessionStart(format!("malformed start reply: {e}")))?;

        match (response.session_id, response.error) {
            (_, Some(error)) => Err(VoiceError::SessionStart(error)),
            (Some(session_id), None) => {
                info!("Voice session {} started for context {}", session_id, context_id);
                Ok(session_id)
            }
            (None, None) => Err(VoiceError::SessionStart("reply carried no session id".into())),
        }
    }

    fn send_audio(&self, frame: OutboundAudio) {
        let subject = self.subject(&format!("audio.{}", frame.session_id));
        let message = AudioFrameMessage {
            session_id: frame.session_id,
            audio_data: frame.audio_data,
        };
        let payload = match serde_json::to_vec(&message) {
            Ok(p) => p,
            Err(e) => {
                debug!("dropping audio frame: {e}");
                return;
            }
        };

        let client = self.client.clone();
        self.runtime.spawn(async move {
            if let Err(e) = client.publish(subject, payload.into()).await {
                debug!("dropping audio frame: {}", VoiceError::TransportSend(e.to_string()));
            }
        });
    }

    async fn stop(&self, session_id: &str) -> Result<()> {
        let request = StopRequest {
            session_id: session_id.to_string(),
        };
        let payload =
            serde_json::to_vec(&request).map_err(|e| VoiceError::Channel(e.to_string()))?;

        self.client
            .publish(self.subject("stop"), payload.into())
            .await
            .map_err(|e| VoiceError::Channel(format!("failed to publish stop: {e}")))?;
        self.client
            .flush()
            .await
            .map_err(|e| VoiceError::Channel(format!("failed to flush stop: {e}")))?;

        info!("Requested stop for voice session {}", session_id);
        Ok(())
    }

    async fn subscribe(&self) -> Result<Subscription> {
        let subject = self.subject("session.>");

        info!("Subscribing to voice events on {}", subject);

        let mut subscriber = self
            .client
            .subscribe(subject)
            .await
            .map_err(|e| VoiceError::Channel(format!("failed to subscribe: {e}")))?;

        let (tx, rx) = mpsc::channel(EVENT_BUFFER);
        let prefix = self.prefix.clone();

        let forwarder = tokio::spawn(async move {
            while let Some(msg) = subscriber.next().await {
                match decode_event(&prefix, msg.subject.as_str(), &msg.payload) {
                    Ok(Some(event)) => {
                        if tx.send(event).await.is_err() {
                            break;
                        }
                    }
                    Ok(None) => debug!("ignoring message on {}", msg.subject.as_str()),
                    Err(e) => warn!("Failed to parse voice event: {}", e),
                }
            }
            debug!("voice event forwarder stopped");
        });

        Ok(Subscription::new(rx, Some(forwarder)))
    }
}
