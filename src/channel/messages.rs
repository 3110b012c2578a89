use serde::{Deserialize, Serialize};

/// Request body for starting a voice session
#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StartRequest {
    pub context_id: String,
}

/// Reply to a start request: either a session id or an error message
#[derive(Debug, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StartResponse {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub session_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// Outbound microphone frame
#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AudioFrameMessage {
    pub session_id: String,
    pub audio_data: String, // Base64-encoded PCM16 at 16kHz
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StopRequest {
    pub session_id: String,
}

/// Kind of a text response from the voice service
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TextKind {
    /// Remote side is live
    Ready,
    /// Session failed; `text` carries the message
    Error,
    /// Partial transcript of the user's speech
    Input,
    /// Partial transcript of the assistant's speech
    Output,
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResponseTextMessage {
    pub session_id: String,
    #[serde(default)]
    pub text: String,
    #[serde(rename = "type")]
    pub kind: TextKind,
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResponseAudioMessage {
    pub session_id: String,
    pub audio_data: String, // Base64-encoded PCM16
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mime_type: Option<String>, // e.g. "audio/pcm;rate=24000"
}
