//! The whiteboard event catalog and per-event dispatch.
//!
//! One JSON object per text frame, discriminated by `type`. Inbound events
//! are applied to the persistent session state first and broadcast only when
//! the write succeeded; a failed write is reported to the sender alone and
//! never tears down the connection.

use chrono::Utc;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use uuid::Uuid;

use super::broadcast::{broadcast_to_session, send_to_handle, send_to_member};
use super::ConnectionSender;
use crate::sessions::model::WhiteboardObject;
use crate::sessions::store::StoreError;
use crate::state::AppState;

/// Client-supplied object body for `add_object`. The server fills in a
/// generated id when the client omits one.
#[derive(Debug, Deserialize)]
pub struct ObjectPayload {
    #[serde(default)]
    pub id: Option<String>,
    #[serde(rename = "type")]
    pub kind: String,
    #[serde(default)]
    pub data: Map<String, Value>,
}

/// Inbound events.
#[derive(Debug, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ClientMessage {
    AddObject {
        object: ObjectPayload,
    },
    UpdateObject {
        object_id: String,
        updates: Map<String, Value>,
    },
    DeleteObject {
        object_id: String,
    },
    ClearCanvas,
    ToolChange {
        tool: String,
    },
    Ping,
}

/// Outbound events. Broadcasts carry the originating connection's `user_id`;
/// `session_state` instead carries the *recipient's* identity (that is how a
/// client learns who it is), and `pong`/`error` go only to the requester.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ServerMessage {
    SessionState {
        objects: Vec<WhiteboardObject>,
        active_users: Vec<String>,
        user_id: String,
    },
    UserJoined {
        user_id: String,
        active_users: Vec<String>,
    },
    UserLeft {
        user_id: String,
        active_users: Vec<String>,
    },
    ObjectAdded {
        object: WhiteboardObject,
        user_id: String,
    },
    ObjectUpdated {
        object_id: String,
        updates: Map<String, Value>,
        user_id: String,
    },
    ObjectDeleted {
        object_id: String,
        user_id: String,
    },
    CanvasCleared {
        user_id: String,
    },
    ToolChanged {
        tool: String,
        user_id: String,
    },
    Pong,
    Error {
        message: String,
    },
}

/// Handle one inbound text frame: parse, apply, broadcast.
///
/// Malformed and unrecognized input are both answered with an `error` event
/// to the sender only; the connection loop always continues.
pub async fn handle_text_message(
    text: &str,
    state: &AppState,
    session_id: &str,
    user_id: &str,
    tx: &ConnectionSender,
) {
    let value: Value = match serde_json::from_str(text) {
        Ok(value) => value,
        Err(e) => {
            tracing::warn!(user_id = %user_id, error = %e, "Malformed message");
            send_to_handle(
                tx,
                &ServerMessage::Error {
                    message: "malformed message: expected a JSON object".to_string(),
                },
            );
            return;
        }
    };

    let message: ClientMessage = match serde_json::from_value(value) {
        Ok(message) => message,
        Err(e) => {
            tracing::debug!(user_id = %user_id, error = %e, "Unrecognized event");
            send_to_handle(
                tx,
                &ServerMessage::Error {
                    message: format!("unrecognized event: {e}"),
                },
            );
            return;
        }
    };

    dispatch(message, state, session_id, user_id, tx).await;
}

async fn dispatch(
    message: ClientMessage,
    state: &AppState,
    session_id: &str,
    user_id: &str,
    tx: &ConnectionSender,
) {
    match message {
        ClientMessage::AddObject { object } => {
            let object = WhiteboardObject {
                id: object.id.unwrap_or_else(|| Uuid::new_v4().to_string()),
                kind: object.kind,
                data: object.data,
                created_by: Some(user_id.to_string()),
                created_at: Utc::now(),
            };

            match state.store.append_object(session_id, object.clone()).await {
                Ok(()) => broadcast_to_session(
                    &state.registry,
                    session_id,
                    &ServerMessage::ObjectAdded {
                        object,
                        user_id: user_id.to_string(),
                    },
                    Some(user_id),
                ),
                Err(e) => persist_failed(tx, user_id, "add_object", &e),
            }
        }

        ClientMessage::UpdateObject { object_id, updates } => {
            match state
                .store
                .merge_update_object(session_id, &object_id, updates.clone())
                .await
            {
                // Peers receive the partial updates, not the merged object:
                // they apply the same field-wise merge locally
                Ok(()) => broadcast_to_session(
                    &state.registry,
                    session_id,
                    &ServerMessage::ObjectUpdated {
                        object_id,
                        updates,
                        user_id: user_id.to_string(),
                    },
                    Some(user_id),
                ),
                Err(e) => persist_failed(tx, user_id, "update_object", &e),
            }
        }

        ClientMessage::DeleteObject { object_id } => {
            match state.store.remove_object(session_id, &object_id).await {
                Ok(()) => broadcast_to_session(
                    &state.registry,
                    session_id,
                    &ServerMessage::ObjectDeleted {
                        object_id,
                        user_id: user_id.to_string(),
                    },
                    Some(user_id),
                ),
                Err(e) => persist_failed(tx, user_id, "delete_object", &e),
            }
        }

        ClientMessage::ClearCanvas => match state.store.clear_objects(session_id).await {
            Ok(()) => broadcast_to_session(
                &state.registry,
                session_id,
                &ServerMessage::CanvasCleared {
                    user_id: user_id.to_string(),
                },
                Some(user_id),
            ),
            Err(e) => persist_failed(tx, user_id, "clear_canvas", &e),
        },

        // Ephemeral: nothing persisted, nothing timestamped
        ClientMessage::ToolChange { tool } => broadcast_to_session(
            &state.registry,
            session_id,
            &ServerMessage::ToolChanged {
                tool,
                user_id: user_id.to_string(),
            },
            Some(user_id),
        ),

        // Direct reply to the sender only, never broadcast
        ClientMessage::Ping => {
            if !send_to_member(&state.registry, session_id, user_id, &ServerMessage::Pong) {
                tracing::debug!(user_id = %user_id, "Pong not delivered");
            }
        }
    }
}

/// A store write failed: the event was not applied, so it must not be
/// broadcast. The sender is told so its canvas stays honest.
fn persist_failed(tx: &ConnectionSender, user_id: &str, event: &str, err: &StoreError) {
    tracing::warn!(user_id = %user_id, event = event, error = %err, "Event not applied");
    send_to_handle(
        tx,
        &ServerMessage::Error {
            message: format!("{event} failed: {err}"),
        },
    );
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn parses_add_object_with_and_without_id() {
        let with_id: ClientMessage = serde_json::from_value(json!({
            "type": "add_object",
            "object": {"id": "o1", "type": "rect", "data": {"x": 1}}
        }))
        .unwrap();
        match with_id {
            ClientMessage::AddObject { object } => {
                assert_eq!(object.id.as_deref(), Some("o1"));
                assert_eq!(object.kind, "rect");
                assert_eq!(object.data.get("x"), Some(&json!(1)));
            }
            other => panic!("expected add_object, got {other:?}"),
        }

        let without_id: ClientMessage = serde_json::from_value(json!({
            "type": "add_object",
            "object": {"type": "path"}
        }))
        .unwrap();
        match without_id {
            ClientMessage::AddObject { object } => {
                assert!(object.id.is_none());
                assert!(object.data.is_empty());
            }
            other => panic!("expected add_object, got {other:?}"),
        }
    }

    #[test]
    fn parses_the_rest_of_the_catalog() {
        let update: ClientMessage = serde_json::from_value(json!({
            "type": "update_object", "object_id": "o1", "updates": {"color": "red"}
        }))
        .unwrap();
        assert!(matches!(update, ClientMessage::UpdateObject { .. }));

        let delete: ClientMessage =
            serde_json::from_value(json!({"type": "delete_object", "object_id": "o1"})).unwrap();
        assert!(matches!(delete, ClientMessage::DeleteObject { .. }));

        let clear: ClientMessage = serde_json::from_value(json!({"type": "clear_canvas"})).unwrap();
        assert!(matches!(clear, ClientMessage::ClearCanvas));

        let tool: ClientMessage =
            serde_json::from_value(json!({"type": "tool_change", "tool": "pen"})).unwrap();
        assert!(matches!(tool, ClientMessage::ToolChange { .. }));

        let ping: ClientMessage = serde_json::from_value(json!({"type": "ping"})).unwrap();
        assert!(matches!(ping, ClientMessage::Ping));
    }

    #[test]
    fn unknown_type_does_not_parse() {
        let result: Result<ClientMessage, _> =
            serde_json::from_value(json!({"type": "teleport", "to": "mars"}));
        assert!(result.is_err());
    }

    #[test]
    fn outbound_events_are_tagged_snake_case() {
        let event = ServerMessage::ObjectDeleted {
            object_id: "o1".to_string(),
            user_id: "u1".to_string(),
        };
        let value = serde_json::to_value(&event).unwrap();
        assert_eq!(
            value,
            json!({"type": "object_deleted", "object_id": "o1", "user_id": "u1"})
        );

        let pong = serde_json::to_value(ServerMessage::Pong).unwrap();
        assert_eq!(pong, json!({"type": "pong"}));
    }

    #[test]
    fn object_updated_carries_only_the_partial_updates() {
        let mut updates = Map::new();
        updates.insert("x".to_string(), json!(5));
        let event = ServerMessage::ObjectUpdated {
            object_id: "o1".to_string(),
            updates,
            user_id: "u1".to_string(),
        };
        let value = serde_json::to_value(&event).unwrap();
        assert_eq!(value["updates"], json!({"x": 5}));
        assert!(value.get("object").is_none());
    }
}
