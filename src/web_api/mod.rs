//! WebAPI - REST API Endpoints
//!
//! ## Responsibilities
//!
//! - HTTP API routes
//! - Request validation
//! - Response formatting

mod routes;

pub use routes::create_router;

use axum::extract::State;
use axum::response::IntoResponse;
use axum::Json;
use serde_json::json;

use crate::models::StatusResponse;
use crate::state::AppState;

/// Health check endpoint
pub async fn health_check() -> impl IntoResponse {
    Json(json!({
        "status": "ok",
        "version": env!("CARGO_PKG_VERSION")
    }))
}

/// Status endpoint
pub async fn device_status(State(state): State<AppState>) -> impl IntoResponse {
    Json(StatusResponse {
        status: "active".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        door_opening: state.actuator.is_opening(),
        gallery_size: state.gallery_size,
        stream_viewers: state.frames.viewer_count(),
    })
}
