use std::path::Path;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions};
use sqlx::{Row, SqlitePool};
use tracing::{debug, info};

use super::{SessionSummary, Storage};
use crate::error::{StorageError, StorageResult};
use crate::pipeline::Session;

/// SQLite-backed session store.
pub struct SqliteStorage {
    pool: SqlitePool,
}

impl SqliteStorage {
    /// Open (creating if necessary) the database at `path` and run
    /// pending migrations.
    pub async fn new(path: &Path, max_connections: u32) -> StorageResult<Self> {
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent).map_err(|e| StorageError::Connection {
                    message: format!("creating database directory: {}", e),
                })?;
            }
        }

        let options = SqliteConnectOptions::new()
            .filename(path)
            .create_if_missing(true);

        let pool = SqlitePoolOptions::new()
            .max_connections(max_connections)
            .connect_with(options)
            .await
            .map_err(|e| StorageError::Connection {
                message: e.to_string(),
            })?;

        sqlx::migrate!("./migrations")
            .run(&pool)
            .await
            .map_err(|e| StorageError::Migration {
                message: e.to_string(),
            })?;

        info!(path = %path.display(), "session store ready");
        Ok(Self { pool })
    }
}

#[async_trait]
impl Storage for SqliteStorage {
    async fn save_session(&self, session: &Session) -> StorageResult<()> {
        let document =
            serde_json::to_string(session).map_err(|e| StorageError::Serialize {
                message: e.to_string(),
            })?;

        sqlx::query(
            r#"
            INSERT INTO sessions (id, initial_query, status, document, created_at, updated_at)
            VALUES (?, ?, ?, ?, ?, ?)
            ON CONFLICT(id) DO UPDATE SET
                status = excluded.status,
                document = excluded.document,
                updated_at = excluded.updated_at
            "#,
        )
        .bind(&session.session_id)
        .bind(&session.initial_query)
        .bind(session.status.to_string())
        .bind(&document)
        .bind(session.created_at.to_rfc3339())
        .bind(session.updated_at.to_rfc3339())
        .execute(&self.pool)
        .await?;

        debug!(session_id = %session.session_id, status = %session.status, "session saved");
        Ok(())
    }

    async fn load_session(&self, session_id: &str) -> StorageResult<Option<Session>> {
        let row = sqlx::query("SELECT document FROM sessions WHERE id = ?")
            .bind(session_id)
            .fetch_optional(&self.pool)
            .await?;

        let Some(row) = row else {
            return Ok(None);
        };

        let document: String = row.get("document");
        let session =
            serde_json::from_str(&document).map_err(|e| StorageError::Serialize {
                message: format!("corrupt session document {}: {}", session_id, e),
            })?;
        Ok(Some(session))
    }

    async fn list_sessions(&self) -> StorageResult<Vec<SessionSummary>> {
        let rows = sqlx::query(
            "SELECT id, initial_query, status, created_at, updated_at \
             FROM sessions ORDER BY updated_at DESC",
        )
        .fetch_all(&self.pool)
        .await?;

        let mut summaries = Vec::with_capacity(rows.len());
        for row in rows {
            summaries.push(SessionSummary {
                session_id: row.get("id"),
                initial_query: row.get("initial_query"),
                status: row.get("status"),
                created_at: parse_timestamp(&row.get::<String, _>("created_at"))?,
                updated_at: parse_timestamp(&row.get::<String, _>("updated_at"))?,
            });
        }
        Ok(summaries)
    }

    async fn delete_session(&self, session_id: &str) -> StorageResult<()> {
        let result = sqlx::query("DELETE FROM sessions WHERE id = ?")
            .bind(session_id)
            .execute(&self.pool)
            .await?;

        if result.rows_affected() == 0 {
            return Err(StorageError::SessionNotFound {
                session_id: session_id.to_string(),
            });
        }
        Ok(())
    }
}

fn parse_timestamp(raw: &str) -> StorageResult<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(raw)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| StorageError::Serialize {
            message: format!("bad timestamp {}: {}", raw, e),
        })
}
