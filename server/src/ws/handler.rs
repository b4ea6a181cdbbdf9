use axum::{
    extract::{
        ws::{CloseFrame, Message, WebSocketUpgrade},
        Path, State,
    },
    response::Response,
};

use crate::state::AppState;
use crate::ws::actor;

/// WebSocket close codes:
/// 4004 = session not found
/// 1011 = server error during session lookup
const CLOSE_SESSION_NOT_FOUND: u16 = 4004;
const CLOSE_INTERNAL_ERROR: u16 = 1011;

/// GET /ws/{session_id}
/// Validates that the session exists before the connection joins the relay.
/// On failure, upgrades then immediately closes with the appropriate close
/// code — no registration side effects happen for a rejected connection.
pub async fn ws_upgrade(
    State(state): State<AppState>,
    Path(session_id): Path<String>,
    ws: WebSocketUpgrade,
) -> Response {
    match state.store.find(&session_id).await {
        Ok(Some(_)) => {
            tracing::info!(session_id = %session_id, "WebSocket connection accepted");
            ws.on_upgrade(move |socket| actor::run_connection(socket, state, session_id))
        }
        Ok(None) => {
            tracing::warn!(session_id = %session_id, "WebSocket rejected: unknown session");
            close_after_upgrade(ws, CLOSE_SESSION_NOT_FOUND, "Session not found")
        }
        Err(e) => {
            tracing::error!(session_id = %session_id, error = %e, "Session lookup failed");
            close_after_upgrade(ws, CLOSE_INTERNAL_ERROR, "Session lookup failed")
        }
    }
}

/// Upgrade the connection, then immediately close it with the given code so
/// the client sees a reason instead of a rejected handshake.
fn close_after_upgrade(ws: WebSocketUpgrade, code: u16, reason: &'static str) -> Response {
    ws.on_upgrade(move |mut socket| async move {
        let close_frame = CloseFrame {
            code,
            reason: reason.into(),
        };
        let _ = socket.send(Message::Close(Some(close_frame))).await;
    })
}
