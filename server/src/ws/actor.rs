use axum::extract::ws::{Message, WebSocket};
use futures_util::{SinkExt, StreamExt};
use tokio::sync::mpsc;
use tokio::time::timeout;
use uuid::Uuid;

use super::broadcast::{broadcast_to_session, send_to_handle};
use super::protocol::{self, ServerMessage};
use super::SessionRegistry;
use crate::state::AppState;

/// Run the actor-per-connection pattern for a validated session connection.
///
/// Splits the WebSocket into reader and writer halves:
/// - Writer task: owns the sink, forwards messages from an mpsc channel
/// - Reader loop: processes incoming frames, dispatches protocol events
///
/// The mpsc channel lets any part of the system push messages to this client
/// by cloning the sender. Returns only once the connection is fully closed.
pub async fn run_connection(socket: WebSocket, state: AppState, session_id: String) {
    let (ws_sender, mut ws_receiver) = socket.split();
    let (tx, rx) = mpsc::unbounded_channel::<Message>();

    // Spawn writer task: forwards mpsc messages to WebSocket sink
    let writer_handle = tokio::spawn(writer_task(ws_sender, rx));

    // Identity is assigned exactly once, before registration, and never
    // reused for another transport.
    let user_id = Uuid::new_v4().to_string();

    state.registry.register(&session_id, &user_id, tx.clone());

    // Departure cleanup runs on every exit path from here on — normal
    // return, receive error, or a panic mid-loop — and at most once.
    let _guard = ConnectionGuard {
        registry: state.registry.clone(),
        session_id: session_id.clone(),
        user_id: user_id.clone(),
    };

    // Announce the join to everyone already present
    broadcast_to_session(
        &state.registry,
        &session_id,
        &ServerMessage::UserJoined {
            user_id: user_id.clone(),
            active_users: state.registry.members(&session_id),
        },
        Some(&user_id),
    );

    // Push the current snapshot to the new connection only
    match state.store.find(&session_id).await {
        Ok(Some(session)) => {
            send_to_handle(
                &tx,
                &ServerMessage::SessionState {
                    objects: session.objects,
                    active_users: state.registry.members(&session_id),
                    user_id: user_id.clone(),
                },
            );
        }
        Ok(None) | Err(_) => {
            // Session vanished or store unreachable between upgrade and join.
            // The writer drains the queued error once tx handles drop.
            tracing::warn!(
                session_id = %session_id,
                user_id = %user_id,
                "Could not load session snapshot, closing"
            );
            send_to_handle(
                &tx,
                &ServerMessage::Error {
                    message: "session state unavailable".to_string(),
                },
            );
            return;
        }
    }

    tracing::info!(
        session_id = %session_id,
        user_id = %user_id,
        "WebSocket actor started"
    );

    // Reader loop. Inbound silence for a full idle window triggers a
    // liveness probe; only transport failure or an explicit close exits.
    loop {
        let inbound = match timeout(state.liveness.idle_ping_interval, ws_receiver.next()).await {
            Ok(inbound) => inbound,
            Err(_) => {
                if tx.send(Message::Ping(Vec::new().into())).is_err() {
                    // Writer task has died — connection is gone
                    break;
                }
                continue;
            }
        };

        match inbound {
            Some(Ok(Message::Text(text))) => {
                protocol::handle_text_message(text.as_str(), &state, &session_id, &user_id, &tx)
                    .await;
            }
            Some(Ok(Message::Ping(data))) => {
                // Respond to client pings with pong
                let _ = tx.send(Message::Pong(data));
            }
            Some(Ok(Message::Pong(_))) => {
                // Probe answered; nothing to do
            }
            Some(Ok(Message::Binary(_))) => {
                tracing::debug!(user_id = %user_id, "Ignoring binary frame on text protocol");
            }
            Some(Ok(Message::Close(frame))) => {
                tracing::info!(
                    user_id = %user_id,
                    reason = ?frame,
                    "Client initiated close"
                );
                break;
            }
            Some(Err(e)) => {
                tracing::warn!(
                    user_id = %user_id,
                    error = %e,
                    "WebSocket receive error"
                );
                break;
            }
            None => {
                // Stream ended — client disconnected
                tracing::info!(user_id = %user_id, "WebSocket stream ended");
                break;
            }
        }
    }

    writer_handle.abort();

    tracing::info!(
        session_id = %session_id,
        user_id = %user_id,
        "WebSocket actor stopped"
    );
}

/// Writer task: receives messages from mpsc channel and forwards them to the
/// WebSocket sink.
async fn writer_task(
    mut ws_sender: futures_util::stream::SplitSink<WebSocket, Message>,
    mut rx: mpsc::UnboundedReceiver<Message>,
) {
    while let Some(msg) = rx.recv().await {
        if ws_sender.send(msg).await.is_err() {
            // WebSocket send failed — connection is broken
            break;
        }
    }
}

/// Owns the departure half of a connection's lifecycle. Dropping it — on any
/// exit path, including unwinding — runs the cleanup exactly once.
struct ConnectionGuard {
    registry: SessionRegistry,
    session_id: String,
    user_id: String,
}

impl Drop for ConnectionGuard {
    fn drop(&mut self) {
        cleanup_connection(&self.registry, &self.session_id, &self.user_id);
    }
}

/// Unregister an identity and, when the session still has members, announce
/// the departure with the updated member list.
///
/// Calling this again for the same identity is a no-op: `unregister` reports
/// whether anything was actually removed, so a departure is never
/// double-counted or re-broadcast, whichever code path triggered it.
pub fn cleanup_connection(registry: &SessionRegistry, session_id: &str, user_id: &str) {
    if !registry.unregister(session_id, user_id) {
        return;
    }

    let remaining = registry.members(session_id);
    if remaining.is_empty() {
        // Nobody left to tell
        return;
    }

    broadcast_to_session(
        registry,
        session_id,
        &ServerMessage::UserLeft {
            user_id: user_id.to_string(),
            active_users: remaining,
        },
        None,
    );
}

#[cfg(test)]
mod tests {
    use super::*;

    fn registry_with(members: &[&str]) -> (SessionRegistry, Vec<mpsc::UnboundedReceiver<Message>>) {
        let registry = SessionRegistry::new();
        let mut receivers = Vec::new();
        for id in members {
            let (tx, rx) = mpsc::unbounded_channel();
            registry.register("S1", id, tx);
            receivers.push(rx);
        }
        (registry, receivers)
    }

    fn drain_types(rx: &mut mpsc::UnboundedReceiver<Message>) -> Vec<String> {
        let mut types = Vec::new();
        while let Ok(Message::Text(text)) = rx.try_recv() {
            let value: serde_json::Value = serde_json::from_str(text.as_str()).unwrap();
            types.push(value["type"].as_str().unwrap().to_string());
        }
        types
    }

    #[test]
    fn cleanup_broadcasts_departure_to_remaining_members() {
        let (registry, mut receivers) = registry_with(&["a", "b"]);

        cleanup_connection(&registry, "S1", "a");

        assert_eq!(registry.members("S1"), vec!["b"]);
        let types = drain_types(&mut receivers[1]);
        assert_eq!(types, vec!["user_left"]);
    }

    #[test]
    fn cleanup_twice_broadcasts_at_most_once() {
        let (registry, mut receivers) = registry_with(&["a", "b"]);

        cleanup_connection(&registry, "S1", "a");
        cleanup_connection(&registry, "S1", "a");

        assert_eq!(registry.members("S1"), vec!["b"]);
        let types = drain_types(&mut receivers[1]);
        assert_eq!(types, vec!["user_left"], "departure announced exactly once");
    }

    #[test]
    fn last_member_cleanup_skips_the_broadcast_and_empties_the_registry() {
        let (registry, _receivers) = registry_with(&["a"]);

        cleanup_connection(&registry, "S1", "a");

        assert!(registry.members("S1").is_empty());
        // A second call against the now-unknown session is still safe
        cleanup_connection(&registry, "S1", "a");
    }

    #[test]
    fn departure_carries_the_updated_member_list() {
        let (registry, mut receivers) = registry_with(&["a", "b", "c"]);

        cleanup_connection(&registry, "S1", "b");

        let msg = receivers[0].try_recv().unwrap();
        let Message::Text(text) = msg else {
            panic!("expected text frame")
        };
        let value: serde_json::Value = serde_json::from_str(text.as_str()).unwrap();
        assert_eq!(value["user_id"], "b");
        let mut listed: Vec<&str> = value["active_users"]
            .as_array()
            .unwrap()
            .iter()
            .map(|v| v.as_str().unwrap())
            .collect();
        listed.sort();
        assert_eq!(listed, vec!["a", "c"]);
    }
}
