use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// A single drawn object on the whiteboard.
///
/// `data` is opaque application payload — the relay never inspects its shape,
/// it only merges supplied keys over existing ones on update so that
/// concurrent partial edits of different fields do not clobber each other.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct WhiteboardObject {
    /// Unique within its session; client-supplied or server-generated
    pub id: String,
    /// Free-form drawing primitive name ("rect", "path", ...)
    #[serde(rename = "type")]
    pub kind: String,
    #[serde(default)]
    pub data: Map<String, Value>,
    /// Connection identity of the creator
    #[serde(default)]
    pub created_by: Option<String>,
    pub created_at: DateTime<Utc>,
}

/// A persisted whiteboard session document.
///
/// Object order is insertion order and doubles as display z-order. The
/// session survives with zero live connections; only an external collaborator
/// ever deletes it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Session {
    pub session_id: String,
    pub objects: Vec<WhiteboardObject>,
    pub created_at: DateTime<Utc>,
    pub last_activity: DateTime<Utc>,
    pub is_active: bool,
}
