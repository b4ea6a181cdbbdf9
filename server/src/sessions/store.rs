//! Persistent session state accessor.
//!
//! Thin contract over the SQLite store: every object mutation is a
//! read-modify-write of one session row performed while holding the
//! connection lock, so each edit event lands as a single atomic document
//! update. Store failures are recoverable per event — the caller skips the
//! broadcast and keeps the connection alive.

use chrono::{DateTime, Utc};
use rusqlite::{params, OptionalExtension};
use serde_json::{Map, Value};
use thiserror::Error;
use uuid::Uuid;

use crate::db::DbPool;
use crate::sessions::model::{Session, WhiteboardObject};

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("session not found")]
    SessionNotFound,
    #[error("object not found")]
    ObjectNotFound,
    #[error("database error: {0}")]
    Db(#[from] rusqlite::Error),
    #[error("corrupt session record: {0}")]
    Corrupt(String),
    #[error("database lock poisoned")]
    LockPoisoned,
    #[error("storage task failed")]
    TaskFailed,
}

/// Handle to the session store. Cheap to clone; all queries run on the
/// blocking thread pool.
#[derive(Clone)]
pub struct SessionStore {
    db: DbPool,
}

impl SessionStore {
    pub fn new(db: DbPool) -> Self {
        Self { db }
    }

    /// Create a new empty session and return its id.
    ///
    /// The id is a short client-facing token: first 8 hex chars of a UUID,
    /// uppercased. Retried on the rare unique-constraint collision.
    pub async fn create(&self) -> Result<String, StoreError> {
        let db = self.db.clone();
        tokio::task::spawn_blocking(move || {
            let conn = db.lock().map_err(|_| StoreError::LockPoisoned)?;
            let mut last_err = None;
            for _ in 0..4 {
                let session_id = Uuid::new_v4().simple().to_string()[..8].to_uppercase();
                let now = Utc::now().to_rfc3339();
                match conn.execute(
                    "INSERT INTO sessions (session_id, objects, created_at, last_activity, is_active)
                     VALUES (?1, '[]', ?2, ?2, 1)",
                    params![session_id, now],
                ) {
                    Ok(_) => return Ok(session_id),
                    Err(rusqlite::Error::SqliteFailure(e, msg))
                        if e.code == rusqlite::ErrorCode::ConstraintViolation =>
                    {
                        last_err = Some(rusqlite::Error::SqliteFailure(e, msg));
                    }
                    Err(e) => return Err(e.into()),
                }
            }
            Err(last_err.map(StoreError::Db).unwrap_or(StoreError::TaskFailed))
        })
        .await
        .map_err(|_| StoreError::TaskFailed)?
    }

    /// Look up a session document by id. `Ok(None)` when unknown.
    pub async fn find(&self, session_id: &str) -> Result<Option<Session>, StoreError> {
        let db = self.db.clone();
        let session_id = session_id.to_string();
        tokio::task::spawn_blocking(move || {
            let conn = db.lock().map_err(|_| StoreError::LockPoisoned)?;
            let row = conn
                .query_row(
                    "SELECT objects, created_at, last_activity, is_active
                     FROM sessions WHERE session_id = ?1",
                    params![session_id],
                    |row| {
                        Ok((
                            row.get::<_, String>(0)?,
                            row.get::<_, String>(1)?,
                            row.get::<_, String>(2)?,
                            row.get::<_, bool>(3)?,
                        ))
                    },
                )
                .optional()?;

            match row {
                Some((objects, created_at, last_activity, is_active)) => Ok(Some(Session {
                    session_id,
                    objects: parse_objects(&objects)?,
                    created_at: parse_timestamp(&created_at)?,
                    last_activity: parse_timestamp(&last_activity)?,
                    is_active,
                })),
                None => Ok(None),
            }
        })
        .await
        .map_err(|_| StoreError::TaskFailed)?
    }

    /// Append an object to the session's list. Insertion order is z-order.
    pub async fn append_object(
        &self,
        session_id: &str,
        object: WhiteboardObject,
    ) -> Result<(), StoreError> {
        self.mutate_objects(session_id, move |objects| {
            objects.push(object);
            Ok(())
        })
        .await
    }

    /// Merge `updates` into an existing object's data, field-wise: only the
    /// supplied keys are overwritten, untouched keys survive. Errors with
    /// `ObjectNotFound` when the id is absent.
    pub async fn merge_update_object(
        &self,
        session_id: &str,
        object_id: &str,
        updates: Map<String, Value>,
    ) -> Result<(), StoreError> {
        let object_id = object_id.to_string();
        self.mutate_objects(session_id, move |objects| {
            let object = objects
                .iter_mut()
                .find(|o| o.id == object_id)
                .ok_or(StoreError::ObjectNotFound)?;
            for (key, value) in updates {
                object.data.insert(key, value);
            }
            Ok(())
        })
        .await
    }

    /// Remove an object by id. No-op when the id is absent.
    pub async fn remove_object(&self, session_id: &str, object_id: &str) -> Result<(), StoreError> {
        let object_id = object_id.to_string();
        self.mutate_objects(session_id, move |objects| {
            objects.retain(|o| o.id != object_id);
            Ok(())
        })
        .await
    }

    /// Empty the session's object list.
    pub async fn clear_objects(&self, session_id: &str) -> Result<(), StoreError> {
        self.mutate_objects(session_id, |objects| {
            objects.clear();
            Ok(())
        })
        .await
    }

    /// Refresh the session's last-activity timestamp. Best-effort.
    pub async fn touch_activity(&self, session_id: &str) -> Result<(), StoreError> {
        let db = self.db.clone();
        let session_id = session_id.to_string();
        tokio::task::spawn_blocking(move || {
            let conn = db.lock().map_err(|_| StoreError::LockPoisoned)?;
            conn.execute(
                "UPDATE sessions SET last_activity = ?1 WHERE session_id = ?2",
                params![Utc::now().to_rfc3339(), session_id],
            )?;
            Ok(())
        })
        .await
        .map_err(|_| StoreError::TaskFailed)?
    }

    /// Read-modify-write of the session's object list under one lock hold.
    /// Also refreshes last_activity, since every caller is a mutating event.
    async fn mutate_objects<F>(&self, session_id: &str, mutate: F) -> Result<(), StoreError>
    where
        F: FnOnce(&mut Vec<WhiteboardObject>) -> Result<(), StoreError> + Send + 'static,
    {
        let db = self.db.clone();
        let session_id = session_id.to_string();
        tokio::task::spawn_blocking(move || {
            let conn = db.lock().map_err(|_| StoreError::LockPoisoned)?;
            let raw: Option<String> = conn
                .query_row(
                    "SELECT objects FROM sessions WHERE session_id = ?1",
                    params![session_id],
                    |row| row.get(0),
                )
                .optional()?;
            let raw = raw.ok_or(StoreError::SessionNotFound)?;

            let mut objects = parse_objects(&raw)?;
            mutate(&mut objects)?;

            let serialized =
                serde_json::to_string(&objects).map_err(|e| StoreError::Corrupt(e.to_string()))?;
            conn.execute(
                "UPDATE sessions SET objects = ?1, last_activity = ?2 WHERE session_id = ?3",
                params![serialized, Utc::now().to_rfc3339(), session_id],
            )?;
            Ok(())
        })
        .await
        .map_err(|_| StoreError::TaskFailed)?
    }
}

fn parse_objects(raw: &str) -> Result<Vec<WhiteboardObject>, StoreError> {
    serde_json::from_str(raw).map_err(|e| StoreError::Corrupt(e.to_string()))
}

fn parse_timestamp(raw: &str) -> Result<DateTime<Utc>, StoreError> {
    DateTime::parse_from_rfc3339(raw)
        .map(|ts| ts.with_timezone(&Utc))
        .map_err(|e| StoreError::Corrupt(e.to_string()))
}
