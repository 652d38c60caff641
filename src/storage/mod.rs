//! Session persistence.
//!
//! Sessions are stored as whole JSON documents, one row per session, with
//! a few denormalized columns for listing. A single upsert per transition
//! keeps each save atomic.

mod sqlite;

pub use sqlite::SqliteStorage;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::StorageResult;
use crate::pipeline::Session;

/// Row-level view of a session for listings; the full document is not
/// deserialized.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionSummary {
    pub session_id: String,
    pub initial_query: String,
    pub status: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Persistence boundary for sessions.
#[async_trait]
pub trait Storage: Send + Sync {
    /// Insert or fully replace the session document.
    async fn save_session(&self, session: &Session) -> StorageResult<()>;

    /// Load a session by id; `None` when it does not exist.
    async fn load_session(&self, session_id: &str) -> StorageResult<Option<Session>>;

    /// All sessions, most recently updated first.
    async fn list_sessions(&self) -> StorageResult<Vec<SessionSummary>>;

    /// Delete a session; fails with `SessionNotFound` if absent.
    async fn delete_session(&self, session_id: &str) -> StorageResult<()>;
}
