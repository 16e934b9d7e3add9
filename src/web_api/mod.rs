//! WebAPI - HTTP/WebSocket Endpoints
//!
//! ## Responsibilities
//!
//! - REST routes (configuration, recording control, upload, chat relay)
//! - WebSocket routes (preview feed, recording status, event channel)
//! - Response formatting

mod routes;

pub use routes::create_router;

use axum::extract::State;
use axum::response::IntoResponse;
use axum::Json;

use crate::models::HealthResponse;
use crate::state::AppState;

/// Health check endpoint
pub async fn health_check(State(state): State<AppState>) -> impl IntoResponse {
    let response = HealthResponse {
        status: "ok".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        recorder: state.recorder.state().await,
        preview_clients: state.preview.connection_count(),
        event_clients: state.events.connection_count(),
    };

    Json(response)
}
