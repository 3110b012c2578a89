use super::state::AppState;
use crate::audio::AudioBackendFactory;
use crate::overlay::{OverlayHandle, VoiceOverlay};
use crate::session::{SessionCallbacks, SessionStats, SessionStatus, TranscriptEntry};
use axum::{
    extract::State,
    http::StatusCode,
    response::{IntoResponse, Json, Response},
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{error, info};

// ============================================================================
// Request/Response Types
// ============================================================================

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OpenRequest {
    /// Knowledge context to bind the session to (default from config)
    #[serde(default, alias = "context_id")]
    pub context_id: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct OpenResponse {
    pub overlay_id: String,
    pub context_id: String,
    pub status: SessionStatus,
}

#[derive(Debug, Serialize)]
pub struct MuteResponse {
    pub overlay_id: String,
    pub muted: bool,
}

#[derive(Debug, Serialize)]
pub struct StatusResponse {
    pub overlay_id: String,
    pub session_id: Option<String>,
    pub status: SessionStatus,
    pub muted: bool,
    pub level: f32,
}

#[derive(Debug, Serialize)]
pub struct TranscriptResponse {
    pub overlay_id: String,
    pub entries: Vec<TranscriptEntry>,
}

#[derive(Debug, Serialize)]
pub struct CloseResponse {
    pub overlay_id: String,
    pub stats: SessionStats,
}

#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub error: String,
}

fn error_response(status: StatusCode, message: impl Into<String>) -> Response {
    (
        status,
        Json(ErrorResponse {
            error: message.into(),
        }),
    )
        .into_response()
}

fn not_open() -> Response {
    error_response(StatusCode::NOT_FOUND, "No voice overlay is open")
}

// ============================================================================
// Handlers
// ============================================================================

/// POST /voice/open
/// Open the overlay and start a voice session
pub async fn open_overlay(
    State(state): State<AppState>,
    body: Option<Json<OpenRequest>>,
) -> Response {
    let req = body.map(|Json(req)| req).unwrap_or_default();
    let mut slot = state.overlay.lock().await;

    if let Some(existing) = slot.as_ref() {
        if !existing.is_finished() {
            return error_response(
                StatusCode::CONFLICT,
                format!("Voice overlay {} is already open", existing.id()),
            );
        }
    }

    let session_config = state.config.session_config(req.context_id.as_deref());
    let backend = match AudioBackendFactory::create(state.source.clone(), state.config.backend_config())
    {
        Ok(backend) => backend,
        Err(e) => {
            error!("Failed to create capture backend: {}", e);
            return error_response(
                StatusCode::INTERNAL_SERVER_ERROR,
                format!("Failed to create capture backend: {}", e),
            );
        }
    };

    let context_id = session_config.context_id.clone();
    let callbacks = SessionCallbacks::default()
        .on_user_message(|text| info!("user: {}", text))
        .on_ai_message(|text| info!("assistant: {}", text));

    let handle = VoiceOverlay::new(
        session_config,
        Arc::clone(&state.channel),
        Arc::clone(&state.sinks),
        backend,
    )
    .with_callbacks(callbacks)
    .open();

    info!("Voice overlay {} opened for context {}", handle.id(), context_id);

    let response = OpenResponse {
        overlay_id: handle.id().to_string(),
        context_id,
        status: handle.status(),
    };
    *slot = Some(handle);

    (StatusCode::OK, Json(response)).into_response()
}

/// POST /voice/mute
/// Toggle the microphone
pub async fn toggle_mute(State(state): State<AppState>) -> Response {
    let slot = state.overlay.lock().await;
    let Some(handle) = slot.as_ref() else {
        return not_open();
    };

    match handle.toggle_mute().await {
        Ok(muted) => (
            StatusCode::OK,
            Json(MuteResponse {
                overlay_id: handle.id().to_string(),
                muted,
            }),
        )
            .into_response(),
        Err(e) => error_response(StatusCode::GONE, e.to_string()),
    }
}

/// POST /voice/close
/// Close the overlay and return final statistics
pub async fn close_overlay(State(state): State<AppState>) -> Response {
    let handle: Option<OverlayHandle> = state.overlay.lock().await.take();
    let Some(handle) = handle else {
        return not_open();
    };

    let overlay_id = handle.id().to_string();
    match handle.close().await {
        Ok(stats) => {
            info!("Voice overlay {} closed", overlay_id);
            (StatusCode::OK, Json(CloseResponse { overlay_id, stats })).into_response()
        }
        Err(e) => {
            error!("Failed to close overlay {}: {}", overlay_id, e);
            error_response(StatusCode::INTERNAL_SERVER_ERROR, e.to_string())
        }
    }
}

/// GET /voice/status
/// Get status of the open overlay
pub async fn get_status(State(state): State<AppState>) -> Response {
    let slot = state.overlay.lock().await;
    match slot.as_ref() {
        Some(handle) => (
            StatusCode::OK,
            Json(StatusResponse {
                overlay_id: handle.id().to_string(),
                session_id: handle.session_id(),
                status: handle.status(),
                muted: handle.is_muted(),
                level: handle.level(),
            }),
        )
            .into_response(),
        None => not_open(),
    }
}

/// GET /voice/transcript
/// Get the live transcript of the open overlay
pub async fn get_transcript(State(state): State<AppState>) -> Response {
    let slot = state.overlay.lock().await;
    match slot.as_ref() {
        Some(handle) => (
            StatusCode::OK,
            Json(TranscriptResponse {
                overlay_id: handle.id().to_string(),
                entries: handle.transcript(),
            }),
        )
            .into_response(),
        None => not_open(),
    }
}

/// GET /health
/// Health check endpoint
pub async fn health_check() -> impl IntoResponse {
    (StatusCode::OK, "OK")
}
