use rusqlite_migration::{Migrations, M};

/// Define all schema migrations.
/// Uses SQLite user_version pragma for tracking — no migration table needed.
pub fn migrations() -> Migrations<'static> {
    Migrations::new(vec![M::up(
        "-- Migration 1: Initial schema

-- One row per whiteboard session. The drawn objects live in a single JSON
-- array column so every edit is one single-row write; the relay relies on
-- that for per-event atomicity.
CREATE TABLE sessions (
    session_id TEXT PRIMARY KEY,
    objects TEXT NOT NULL DEFAULT '[]',
    created_at TEXT NOT NULL,
    last_activity TEXT NOT NULL,
    is_active INTEGER NOT NULL DEFAULT 1
);

CREATE INDEX idx_sessions_last_activity ON sessions(last_activity);
",
    )])
}
