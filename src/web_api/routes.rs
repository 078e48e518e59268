//! API Routes

use axum::{
    body::Body,
    extract::{Path, Query, State},
    http::{header, HeaderMap, StatusCode},
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use futures::stream;
use serde::{Deserialize, Serialize};

use crate::access_log::AccessRecord;
use crate::authorization::AccessMethod;
use crate::error::{Error, Result};
use crate::models::ApiResponse;
use crate::state::AppState;

/// Create API router
pub fn create_router(state: AppState) -> Router {
    Router::new()
        // Health & Status
        .route("/healthz", get(super::health_check))
        .route("/api/status", get(super::device_status))
        // Access records
        .route("/api/logs", get(list_logs))
        // Passes
        .route("/api/users", get(list_users))
        .route("/api/users", post(invite_user))
        .route("/api/users/:username/active", post(set_user_active))
        // Remote trigger
        .route("/api/door/open", post(open_remote))
        // Live view
        .route("/video_feed", get(video_feed))
        .with_state(state)
}

/// Header-based API key check for the mutating endpoints
fn require_api_key(headers: &HeaderMap, state: &AppState) -> Result<()> {
    let provided = headers.get("x-api-key").and_then(|v| v.to_str().ok());
    if provided != Some(state.config.api_secret_key.as_str()) {
        return Err(Error::Unauthorized("invalid API key".to_string()));
    }
    Ok(())
}

#[derive(Debug, Deserialize)]
struct LogsQuery {
    limit: Option<usize>,
}

/// GET /api/logs
async fn list_logs(
    State(state): State<AppState>,
    Query(query): Query<LogsQuery>,
) -> Json<Vec<AccessRecord>> {
    let limit = query.limit.unwrap_or(15).min(500);
    Json(state.access_log.recent(limit).await)
}

/// Pass listing entry; the token itself is never exposed here
#[derive(Debug, Clone, Serialize, Deserialize)]
struct UserSummary {
    username: String,
    is_active: bool,
}

/// GET /api/users
async fn list_users(State(state): State<AppState>) -> Json<Vec<UserSummary>> {
    let users = state
        .credentials
        .list()
        .await
        .into_iter()
        .map(|c| UserSummary {
            username: c.username,
            is_active: c.is_active,
        })
        .collect();
    Json(users)
}

#[derive(Debug, Deserialize)]
struct InviteRequest {
    username: String,
}

/// POST /api/users
///
/// Provisions a pass and responds with the QR image for the new token.
async fn invite_user(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(request): Json<InviteRequest>,
) -> Result<Response> {
    require_api_key(&headers, &state)?;

    let credential = state.credentials.create(&request.username).await?;
    let png = render_pass_png(&credential.token)?;

    tracing::info!(username = %credential.username, "QR pass issued");

    Ok((
        StatusCode::CREATED,
        [(header::CONTENT_TYPE, "image/png")],
        png,
    )
        .into_response())
}

#[derive(Debug, Deserialize)]
struct SetActiveRequest {
    active: bool,
}

/// POST /api/users/:username/active
///
/// Enables or disables a user's pass without reissuing it.
async fn set_user_active(
    State(state): State<AppState>,
    Path(username): Path<String>,
    headers: HeaderMap,
    Json(request): Json<SetActiveRequest>,
) -> Result<Json<ApiResponse>> {
    require_api_key(&headers, &state)?;
    state
        .credentials
        .set_active(&username, request.active)
        .await?;
    Ok(Json(ApiResponse::ok("Pass updated")))
}

/// Render a pass token as a QR PNG
fn render_pass_png(token: &str) -> Result<Vec<u8>> {
    let code = qrcode::QrCode::new(token.as_bytes())
        .map_err(|e| Error::Internal(format!("QR encode failed: {:?}", e)))?;
    let rendered = code
        .render::<image::Luma<u8>>()
        .min_dimensions(320, 320)
        .build();

    let mut buf = std::io::Cursor::new(Vec::new());
    image::DynamicImage::ImageLuma8(rendered)
        .write_to(&mut buf, image::ImageOutputFormat::Png)?;
    Ok(buf.into_inner())
}

/// POST /api/door/open
///
/// Remote trigger, subject to the same single-flight door check as every
/// other method.
async fn open_remote(
    State(state): State<AppState>,
    headers: HeaderMap,
) -> Result<Json<ApiResponse>> {
    require_api_key(&headers, &state)?;

    if state.actuator.is_opening() {
        return Err(Error::DoorBusy("door is already opening".to_string()));
    }

    if state.actuator.trigger("remote operator", AccessMethod::Remote) {
        Ok(Json(ApiResponse::ok("Access granted")))
    } else {
        // lost the race against another trigger
        Err(Error::DoorBusy("door is already opening".to_string()))
    }
}

/// GET /video_feed
///
/// Continuous multipart JPEG stream of the annotated frames.
async fn video_feed(State(state): State<AppState>) -> Response {
    let rx = state.frames.subscribe();

    let body = stream::unfold(rx, |mut rx| async move {
        if rx.changed().await.is_err() {
            return None;
        }
        let jpeg = rx.borrow_and_update().clone()?;

        let mut part = Vec::with_capacity(jpeg.len() + 96);
        part.extend_from_slice(b"--frame\r\nContent-Type: image/jpeg\r\n");
        part.extend_from_slice(format!("Content-Length: {}\r\n\r\n", jpeg.len()).as_bytes());
        part.extend_from_slice(&jpeg);
        part.extend_from_slice(b"\r\n");

        Some((Ok::<_, std::convert::Infallible>(part), rx))
    });

    Response::builder()
        .header(
            header::CONTENT_TYPE,
            "multipart/x-mixed-replace; boundary=frame",
        )
        .body(Body::from_stream(body))
        .expect("static response parts are valid")
}
