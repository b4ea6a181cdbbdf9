use axum::{
    extract::{Path, State},
    http::StatusCode,
    Json,
};
use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::sessions::model::WhiteboardObject;
use crate::sessions::store::StoreError;
use crate::state::AppState;

// --- Response types ---

#[derive(Debug, Serialize)]
pub struct CreateSessionResponse {
    pub session_id: String,
    pub message: String,
}

#[derive(Debug, Serialize)]
pub struct SessionResponse {
    pub session_id: String,
    pub objects: Vec<WhiteboardObject>,
    pub active_users: Vec<String>,
}

#[derive(Debug, Serialize)]
pub struct ExportResponse {
    pub session_id: String,
    pub objects: Vec<WhiteboardObject>,
    pub exported_at: DateTime<Utc>,
    pub total_objects: usize,
}

fn status_for(err: StoreError) -> StatusCode {
    match err {
        StoreError::SessionNotFound => StatusCode::NOT_FOUND,
        _ => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

// --- Handlers ---

/// POST /api/sessions — Create a new whiteboard session.
pub async fn create_session(
    State(state): State<AppState>,
) -> Result<Json<CreateSessionResponse>, StatusCode> {
    let session_id = state.store.create().await.map_err(status_for)?;
    tracing::info!(session_id = %session_id, "Session created");

    Ok(Json(CreateSessionResponse {
        session_id,
        message: "Session created successfully".to_string(),
    }))
}

/// GET /api/sessions/{session_id} — Session document plus who is currently
/// connected, for request handlers that report "who's online" alongside the
/// persisted state.
pub async fn get_session(
    State(state): State<AppState>,
    Path(session_id): Path<String>,
) -> Result<Json<SessionResponse>, StatusCode> {
    let session = state
        .store
        .find(&session_id)
        .await
        .map_err(status_for)?
        .ok_or(StatusCode::NOT_FOUND)?;

    // Reading a session counts as activity; best-effort
    if let Err(e) = state.store.touch_activity(&session_id).await {
        tracing::warn!(session_id = %session_id, error = %e, "Failed to touch session activity");
    }

    let active_users = state.registry.members(&session_id);

    Ok(Json(SessionResponse {
        session_id: session.session_id,
        objects: session.objects,
        active_users,
    }))
}

/// POST /api/sessions/{session_id}/export — Snapshot of the object list.
pub async fn export_session(
    State(state): State<AppState>,
    Path(session_id): Path<String>,
) -> Result<Json<ExportResponse>, StatusCode> {
    let session = state
        .store
        .find(&session_id)
        .await
        .map_err(status_for)?
        .ok_or(StatusCode::NOT_FOUND)?;

    let total_objects = session.objects.len();

    Ok(Json(ExportResponse {
        session_id: session.session_id,
        objects: session.objects,
        exported_at: Utc::now(),
        total_objects,
    }))
}
