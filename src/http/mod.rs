//! HTTP API server for a local UI
//!
//! This module provides a REST API for driving one voice overlay:
//! - POST /voice/open - Open the overlay and start a session
//! - POST /voice/mute - Toggle the microphone
//! - POST /voice/close - Close the overlay and return statistics
//! - GET /voice/status - Query session status
//! - GET /voice/transcript - Get the live transcript
//! - GET /health - Health check

mod handlers;
mod routes;
mod state;

pub use routes::create_router;
pub use state::AppState;
