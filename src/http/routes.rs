use super::handlers;
use super::state::AppState;
use axum::{
    routing::{get, post},
    Router,
};
use tower_http::{cors::CorsLayer, trace::TraceLayer};

/// Create the HTTP router with all routes
pub fn create_router(state: AppState) -> Router {
    Router::new()
        // Health check
        .route("/health", get(handlers::health_check))
        // Overlay control
        .route("/voice/open", post(handlers::open_overlay))
        .route("/voice/mute", post(handlers::toggle_mute))
        .route("/voice/close", post(handlers::close_overlay))
        // Overlay queries
        .route("/voice/status", get(handlers::get_status))
        .route("/voice/transcript", get(handlers::get_transcript))
        // Add tracing middleware for request logging
        .layer(TraceLayer::new_for_http())
        // The local UI is served from another origin
        .layer(CorsLayer::permissive())
        .with_state(state)
}
