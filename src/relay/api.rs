use std::sync::Arc;

use axum::{
    Json, Router,
    extract::{Path, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::get,
};
use board_common::MemberPermission;
use chrono::{DateTime, Utc};
use serde::Serialize;

use super::hub::RelayHub;
use crate::invite;

// ── Shared application state ──────────────────────────────────────────

pub struct AppState {
    pub hub: Arc<RelayHub>,
    /// Origin used when building invite links, e.g. `https://boards.example.com`.
    pub public_origin: String,
    pub started_at: DateTime<Utc>,
}

pub type SharedState = Arc<AppState>;

impl AppState {
    pub fn new(hub: Arc<RelayHub>, public_origin: impl Into<String>) -> Self {
        Self {
            hub,
            public_origin: public_origin.into(),
            started_at: Utc::now(),
        }
    }
}

// ── Response payload types ────────────────────────────────────────────

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PresenceResponse {
    pub board_id: String,
    pub actor_ids: Vec<String>,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
pub struct InvitePreview {
    pub board_id: String,
    pub board_title: String,
    pub board_description: String,
    pub board_color: String,
    pub email: String,
    pub permission: MemberPermission,
    pub invited_at: Option<DateTime<Utc>>,
    pub link: String,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
pub struct HealthResponse {
    pub status: &'static str,
    pub rooms: usize,
    pub uptime_secs: i64,
}

// ── Error handling ────────────────────────────────────────────────────

pub enum ApiError {
    NotFound(String),
    BadRequest(String),
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, message) = match self {
            ApiError::NotFound(msg) => (StatusCode::NOT_FOUND, msg),
            ApiError::BadRequest(msg) => (StatusCode::BAD_REQUEST, msg),
        };
        (status, Json(serde_json::json!({"error": message}))).into_response()
    }
}

// ── Router ────────────────────────────────────────────────────────────

pub fn api_router() -> Router<SharedState> {
    Router::new()
        .route("/api/boards/{board_id}/presence", get(board_presence))
        .route("/invite/{token}", get(invite_preview))
        .route("/health", get(health_check))
}

// ── Handlers ──────────────────────────────────────────────────────────

async fn board_presence(
    State(state): State<SharedState>,
    Path(board_id): Path<String>,
) -> Json<PresenceResponse> {
    let actor_ids = state.hub.online(&board_id);
    Json(PresenceResponse { board_id, actor_ids })
}

/// Decode an invite token so a landing page can render the board stub.
async fn invite_preview(
    State(state): State<SharedState>,
    Path(token): Path<String>,
) -> Result<Json<InvitePreview>, ApiError> {
    let payload = invite::decode(&token).map_err(|e| ApiError::BadRequest(e.to_string()))?;
    if payload.board_title.trim().is_empty() {
        return Err(ApiError::NotFound("Invite does not name a board".into()));
    }
    Ok(Json(InvitePreview {
        link: invite::invite_link(&state.public_origin, &token),
        invited_at: DateTime::from_timestamp_millis(payload.timestamp),
        board_id: payload.board_id,
        board_title: payload.board_title,
        board_description: payload.board_description,
        board_color: payload.board_color,
        email: payload.email,
        permission: payload.permission,
    }))
}

async fn health_check(State(state): State<SharedState>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok",
        rooms: state.hub.room_count(),
        uptime_secs: (Utc::now() - state.started_at).num_seconds(),
    })
}
