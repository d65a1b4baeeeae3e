//! SQLite-backed session store and file registry.

use crate::error::{MetadataError, MetadataResult};
use crate::registry::FileRegistry;
use crate::store::SessionStore;
use async_trait::async_trait;
use hoist_core::record::{FileRecord, NewFileRecord};
use hoist_core::session::{SessionId, UploadSession};
use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions};
use sqlx::{Pool, Sqlite};
use std::path::Path;
use std::str::FromStr;
use std::time::Duration;
use time::OffsetDateTime;
use uuid::Uuid;

/// SQLite-backed metadata store.
///
/// Sessions are stored as JSON payloads next to the columns queries touch:
/// `version` for compare-and-swap, and the two expiry clocks for sweeping.
/// Timestamps are compared as unix milliseconds so ordering never depends on
/// string formatting.
pub struct SqliteStore {
    pool: Pool<Sqlite>,
}

impl SqliteStore {
    /// Open a store at the given path, creating the database if missing.
    pub async fn open(path: impl AsRef<Path>) -> MetadataResult<Self> {
        let path = path.as_ref();
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let opts = SqliteConnectOptions::from_str(&format!("sqlite:{}?mode=rwc", path.display()))?
            .create_if_missing(true)
            .journal_mode(sqlx::sqlite::SqliteJournalMode::Wal)
            .synchronous(sqlx::sqlite::SqliteSynchronous::Normal)
            .foreign_keys(true)
            // Prevent transient "database is locked" errors under concurrent access.
            .busy_timeout(Duration::from_secs(5));

        let pool = SqlitePoolOptions::new()
            // SQLite permits limited write concurrency; a single connection
            // avoids persistent "database is locked" failures under load.
            .max_connections(1)
            .connect_with(opts)
            .await?;

        let store = Self { pool };
        store.migrate().await?;
        tracing::debug!(path = %path.display(), "opened sqlite metadata store");
        Ok(store)
    }

    async fn migrate(&self) -> MetadataResult<()> {
        sqlx::query(SCHEMA_SQL).execute(&self.pool).await?;
        Ok(())
    }

    /// Get a reference to the connection pool.
    pub fn pool(&self) -> &Pool<Sqlite> {
        &self.pool
    }
}

fn unix_ms(at: OffsetDateTime) -> i64 {
    (at.unix_timestamp_nanos() / 1_000_000) as i64
}

fn is_unique_violation(err: &sqlx::Error) -> bool {
    matches!(err, sqlx::Error::Database(db_err) if db_err.message().contains("UNIQUE constraint"))
}

#[async_trait]
impl SessionStore for SqliteStore {
    async fn create(&self, session: &UploadSession, ttl: Duration) -> MetadataResult<()> {
        let payload = serde_json::to_string(session)?;
        let ttl_secs = ttl.as_secs() as i64;
        let now_ms = unix_ms(OffsetDateTime::now_utc());

        let result = sqlx::query(
            r#"
            INSERT INTO upload_sessions (
                session_id, user_id, version, payload,
                expires_unix_ms, ttl_secs, deadline_unix_ms
            ) VALUES (?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(session.id.to_string())
        .bind(&session.user_id)
        .bind(session.version as i64)
        .bind(payload)
        .bind(unix_ms(session.expires_at))
        .bind(ttl_secs)
        .bind(now_ms + ttl_secs * 1000)
        .execute(&self.pool)
        .await;

        match result {
            Ok(_) => Ok(()),
            Err(e) if is_unique_violation(&e) => Err(MetadataError::AlreadyExists(format!(
                "session {}",
                session.id
            ))),
            Err(e) => Err(e.into()),
        }
    }

    async fn get(&self, id: SessionId) -> MetadataResult<Option<UploadSession>> {
        let row: Option<(String,)> = sqlx::query_as(
            "SELECT payload FROM upload_sessions WHERE session_id = ? AND deadline_unix_ms > ?",
        )
        .bind(id.to_string())
        .bind(unix_ms(OffsetDateTime::now_utc()))
        .fetch_optional(&self.pool)
        .await?;

        match row {
            Some((payload,)) => Ok(Some(serde_json::from_str(&payload)?)),
            None => Ok(None),
        }
    }

    async fn put(&self, session: &mut UploadSession) -> MetadataResult<()> {
        let expected = session.version;
        let mut next = session.clone();
        next.version = expected + 1;
        let payload = serde_json::to_string(&next)?;

        let result = sqlx::query(
            r#"
            UPDATE upload_sessions
               SET payload = ?, version = ?, expires_unix_ms = ?,
                   deadline_unix_ms = ? + ttl_secs * 1000
             WHERE session_id = ? AND version = ?
            "#,
        )
        .bind(payload)
        .bind(next.version as i64)
        .bind(unix_ms(next.expires_at))
        .bind(unix_ms(OffsetDateTime::now_utc()))
        .bind(session.id.to_string())
        .bind(expected as i64)
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            // Distinguish a missing row from a lost compare-and-swap race.
            let found: Option<(i64,)> =
                sqlx::query_as("SELECT version FROM upload_sessions WHERE session_id = ?")
                    .bind(session.id.to_string())
                    .fetch_optional(&self.pool)
                    .await?;
            return match found {
                None => Err(MetadataError::NotFound(format!("session {}", session.id))),
                Some(_) => Err(MetadataError::VersionConflict {
                    id: session.id.to_string(),
                    expected,
                }),
            };
        }

        session.version = next.version;
        Ok(())
    }

    async fn delete(&self, id: SessionId) -> MetadataResult<()> {
        sqlx::query("DELETE FROM upload_sessions WHERE session_id = ?")
            .bind(id.to_string())
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn list_expired(
        &self,
        now: OffsetDateTime,
        limit: u32,
    ) -> MetadataResult<Vec<UploadSession>> {
        let now_ms = unix_ms(now);
        let rows: Vec<(String,)> = sqlx::query_as(
            r#"
            SELECT payload FROM upload_sessions
             WHERE expires_unix_ms <= ? OR deadline_unix_ms <= ?
             ORDER BY expires_unix_ms
             LIMIT ?
            "#,
        )
        .bind(now_ms)
        .bind(now_ms)
        .bind(limit as i64)
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter()
            .map(|(payload,)| serde_json::from_str(&payload).map_err(Into::into))
            .collect()
    }

    async fn health_check(&self) -> MetadataResult<()> {
        sqlx::query("SELECT 1").execute(&self.pool).await?;
        Ok(())
    }
}

#[async_trait]
impl FileRegistry for SqliteStore {
    async fn create_file_record(&self, new: NewFileRecord) -> MetadataResult<FileRecord> {
        let record = FileRecord::from_new(new);
        let payload = serde_json::to_string(&record)?;
        sqlx::query(
            r#"
            INSERT INTO file_records (record_id, user_id, storage_key, payload, created_unix_ms)
            VALUES (?, ?, ?, ?, ?)
            "#,
        )
        .bind(record.id.to_string())
        .bind(&record.user_id)
        .bind(&record.storage_key)
        .bind(payload)
        .bind(unix_ms(record.created_at))
        .execute(&self.pool)
        .await?;
        Ok(record)
    }

    async fn get_file_record(&self, id: Uuid) -> MetadataResult<Option<FileRecord>> {
        let row: Option<(String,)> =
            sqlx::query_as("SELECT payload FROM file_records WHERE record_id = ?")
                .bind(id.to_string())
                .fetch_optional(&self.pool)
                .await?;

        match row {
            Some((payload,)) => Ok(Some(serde_json::from_str(&payload)?)),
            None => Ok(None),
        }
    }
}

/// SQL schema for SQLite.
const SCHEMA_SQL: &str = r#"
-- Upload sessions. The full session lives in payload (JSON); the other
-- columns exist for compare-and-swap and sweep queries.
CREATE TABLE IF NOT EXISTS upload_sessions (
    session_id TEXT PRIMARY KEY,
    user_id TEXT NOT NULL,
    version INTEGER NOT NULL,
    payload TEXT NOT NULL,
    expires_unix_ms INTEGER NOT NULL,
    ttl_secs INTEGER NOT NULL,
    deadline_unix_ms INTEGER NOT NULL
);
CREATE INDEX IF NOT EXISTS idx_upload_sessions_expiry ON upload_sessions(expires_unix_ms, deadline_unix_ms);

-- File records written at upload confirmation.
CREATE TABLE IF NOT EXISTS file_records (
    record_id TEXT PRIMARY KEY,
    user_id TEXT NOT NULL,
    storage_key TEXT NOT NULL,
    payload TEXT NOT NULL,
    created_unix_ms INTEGER NOT NULL
);
CREATE INDEX IF NOT EXISTS idx_file_records_user ON file_records(user_id);
"#;
