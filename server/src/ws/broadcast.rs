//! Fan-out delivery of protocol events to a session's live connections.
//!
//! Delivery is at-most-once and best-effort: events are serialized once and
//! pushed into each connection's outbound channel without blocking, so a
//! broken or slow peer never delays the rest of the room. Order across peers
//! is unspecified.

use axum::extract::ws::Message;

use super::protocol::ServerMessage;
use super::{ConnectionSender, SessionRegistry};

/// Serialize an event and push it into one connection's outbound channel.
/// Returns false when the channel is closed or serialization fails.
pub fn send_to_handle(tx: &ConnectionSender, message: &ServerMessage) -> bool {
    match serde_json::to_string(message) {
        Ok(text) => tx.send(Message::Text(text.into())).is_ok(),
        Err(e) => {
            tracing::error!(error = %e, "Failed to serialize outbound event");
            false
        }
    }
}

/// Send an event to a single member of a session. Returns false when the
/// member is unknown or its transport is gone.
pub fn send_to_member(
    registry: &SessionRegistry,
    session_id: &str,
    user_id: &str,
    message: &ServerMessage,
) -> bool {
    match registry.handle_for(session_id, user_id) {
        Some(tx) => send_to_handle(&tx, message),
        None => false,
    }
}

/// Deliver an event to every member of a session except `exclude` (used to
/// suppress echoing an event back to its originator).
///
/// Members whose channel turned out closed are collected during the pass and
/// unregistered after it completes, so one dead peer never aborts delivery to
/// the rest. Broadcasting into an unknown or empty session is a no-op.
pub fn broadcast_to_session(
    registry: &SessionRegistry,
    session_id: &str,
    message: &ServerMessage,
    exclude: Option<&str>,
) {
    let members = registry.handles(session_id);
    if members.is_empty() {
        return;
    }

    let text = match serde_json::to_string(message) {
        Ok(text) => text,
        Err(e) => {
            tracing::error!(error = %e, "Failed to serialize broadcast event");
            return;
        }
    };
    let frame = Message::Text(text.into());

    let mut broken = Vec::new();
    for (user_id, tx) in members {
        if exclude == Some(user_id.as_str()) {
            continue;
        }
        if tx.send(frame.clone()).is_err() {
            broken.push(user_id);
        }
    }

    for user_id in broken {
        if registry.unregister(session_id, &user_id) {
            tracing::info!(
                session_id = %session_id,
                user_id = %user_id,
                "Removed broken connection during broadcast"
            );
        }
    }
}
