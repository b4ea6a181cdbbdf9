pub mod actor;
pub mod broadcast;
pub mod handler;
pub mod protocol;

use std::collections::HashMap;
use std::sync::Arc;

use dashmap::DashMap;
use tokio::sync::mpsc;

/// Type alias for the sender half of a WebSocket connection's channel.
/// Other parts of the system can clone this to push messages to a specific client.
pub type ConnectionSender = mpsc::UnboundedSender<axum::extract::ws::Message>;

/// Connection registry: session id -> (connection identity -> live sender).
///
/// The only state shared and mutated across independent connection loops.
/// DashMap serializes access per shard; the session entry itself is removed
/// when its last member leaves, so empty sessions never linger here (the
/// persisted session document is unaffected).
#[derive(Clone, Default)]
pub struct SessionRegistry {
    inner: Arc<DashMap<String, HashMap<String, ConnectionSender>>>,
}

impl SessionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a handle under (session, identity); creates the session's
    /// membership entry if this is its first member.
    pub fn register(&self, session_id: &str, user_id: &str, tx: ConnectionSender) {
        self.inner
            .entry(session_id.to_string())
            .or_default()
            .insert(user_id.to_string(), tx);

        tracing::debug!(
            session_id = %session_id,
            user_id = %user_id,
            "Connection registered"
        );
    }

    /// Remove the (session, identity) mapping if present; drops the session
    /// entry when the last member leaves. Safe to call when the session or
    /// identity is already gone — returns true only when a mapping was
    /// actually removed, which is what makes disconnect handling idempotent.
    pub fn unregister(&self, session_id: &str, user_id: &str) -> bool {
        let mut removed = false;
        let mut now_empty = false;
        if let Some(mut members) = self.inner.get_mut(session_id) {
            removed = members.remove(user_id).is_some();
            now_empty = members.is_empty();
        }
        if now_empty {
            // Re-checked under the entry lock: a concurrent join wins
            self.inner.remove_if(session_id, |_, members| members.is_empty());
        }

        if removed {
            tracing::debug!(
                session_id = %session_id,
                user_id = %user_id,
                "Connection unregistered"
            );
        }
        removed
    }

    /// Current member identities of a session; empty when unknown.
    pub fn members(&self, session_id: &str) -> Vec<String> {
        self.inner
            .get(session_id)
            .map(|members| members.keys().cloned().collect())
            .unwrap_or_default()
    }

    /// Targeted lookup of one member's sender.
    pub fn handle_for(&self, session_id: &str, user_id: &str) -> Option<ConnectionSender> {
        self.inner
            .get(session_id)
            .and_then(|members| members.get(user_id).cloned())
    }

    /// Snapshot of (identity, sender) pairs for fan-out. Handles are cloned
    /// out so no registry lock is held while messages are pushed.
    pub fn handles(&self, session_id: &str) -> Vec<(String, ConnectionSender)> {
        self.inner
            .get(session_id)
            .map(|members| {
                members
                    .iter()
                    .map(|(id, tx)| (id.clone(), tx.clone()))
                    .collect()
            })
            .unwrap_or_default()
    }
}
