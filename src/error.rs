//! Error types for the voice session pipeline.

/// Errors raised by the voice pipeline.
///
/// [`VoiceError::Permission`], [`VoiceError::SessionStart`] and
/// [`VoiceError::Remote`] reach the UI layer through `on_error`. The rest are
/// handled where they occur: a bad chunk is dropped, a failed send is
/// forgotten.
#[derive(Debug, thiserror::Error)]
pub enum VoiceError {
    /// Microphone access was denied or the capture stream could not run.
    #[error("microphone unavailable: {0}")]
    Permission(String),

    /// The remote service refused or failed to begin a session.
    #[error("failed to start voice session: {0}")]
    SessionStart(String),

    /// An inbound audio payload could not be decoded.
    #[error("malformed audio payload: {0}")]
    Decode(String),

    /// An outbound frame could not be delivered.
    #[error("failed to send audio frame: {0}")]
    TransportSend(String),

    /// Audio device or stream error outside of capture permission.
    #[error("audio device error: {0}")]
    Device(String),

    /// Session channel (transport) error.
    #[error("session channel error: {0}")]
    Channel(String),

    /// The remote side reported an error for an established session.
    #[error("remote session error: {0}")]
    Remote(String),
}

impl From<base64::DecodeError> for VoiceError {
    fn from(e: base64::DecodeError) -> Self {
        VoiceError::Decode(e.to_string())
    }
}

/// Convenience result type.
pub type Result<T> = std::result::Result<T, VoiceError>;
