use std::time::Duration;

use crate::sessions::store::SessionStore;
use crate::ws::SessionRegistry;

/// Liveness policy for WebSocket connection loops.
///
/// A connection that has sent nothing for `idle_ping_interval` gets a
/// transport-level Ping probe. A quiet client is never evicted for silence
/// alone; a dead transport surfaces as a send/receive failure, which is the
/// only path to closure.
#[derive(Debug, Clone, Copy)]
pub struct LivenessPolicy {
    pub idle_ping_interval: Duration,
}

impl Default for LivenessPolicy {
    fn default() -> Self {
        Self {
            idle_ping_interval: Duration::from_secs(60),
        }
    }
}

/// Shared application state passed to all handlers via axum State extractor.
#[derive(Clone)]
pub struct AppState {
    /// Persistent session/object store (SQLite)
    pub store: SessionStore,
    /// Live WebSocket membership per session
    pub registry: SessionRegistry,
    /// Idle-ping policy for connection loops
    pub liveness: LivenessPolicy,
    /// Allowed CORS origin for the browser client
    pub cors_origin: String,
}
