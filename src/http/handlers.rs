use super::state::AppState;
use crate::session::{ConnectionId, SessionSummary};
use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::{IntoResponse, Json},
};
use serde::Serialize;

// ============================================================================
// Response Types
// ============================================================================

#[derive(Debug, Serialize)]
pub struct SessionListResponse {
    pub count: usize,
    pub sessions: Vec<SessionSummary>,
}

#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub error: String,
}

fn not_found(session_id: &str) -> axum::response::Response {
    (
        StatusCode::NOT_FOUND,
        Json(ErrorResponse {
            error: format!("Session {} not found", session_id),
        }),
    )
        .into_response()
}

// ============================================================================
// Handlers
// ============================================================================

/// GET /api/sessions
/// List connected clients and their camera state
pub async fn list_sessions(State(state): State<AppState>) -> impl IntoResponse {
    let sessions = state.manager.list().await;

    (
        StatusCode::OK,
        Json(SessionListResponse {
            count: sessions.len(),
            sessions,
        }),
    )
}

/// GET /api/sessions/:session_id/stats
/// Current detection statistics of one session
pub async fn session_stats(
    State(state): State<AppState>,
    Path(session_id): Path<String>,
) -> impl IntoResponse {
    let Ok(id) = session_id.parse::<ConnectionId>() else {
        return not_found(&session_id);
    };

    match state.manager.get(id).await {
        Some(session) => (StatusCode::OK, Json(session.stats().snapshot().await)).into_response(),
        None => not_found(&session_id),
    }
}

/// GET /health
/// Health check endpoint
pub async fn health_check() -> impl IntoResponse {
    (StatusCode::OK, "OK")
}
