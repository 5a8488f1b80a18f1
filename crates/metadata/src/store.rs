//! Metadata store trait and SQLite implementation.

use crate::error::{MetadataError, MetadataResult};
use crate::models::{ChunkRow, SessionRow};
use crate::repos::{ChunkRepo, SessionRepo};
use async_trait::async_trait;
use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions};
use sqlx::{Pool, Sqlite};
use std::path::Path;
use std::str::FromStr;
use std::time::Duration;
use stevedore_core::session::SessionStatus;
use time::OffsetDateTime;

/// Combined metadata store trait.
#[async_trait]
pub trait MetadataStore: SessionRepo + ChunkRepo + Send + Sync {
    /// Create the schema if it does not exist.
    async fn migrate(&self) -> MetadataResult<()>;

    /// Check database connectivity and health.
    async fn health_check(&self) -> MetadataResult<()>;
}

/// SQLite-based metadata store.
pub struct SqliteStore {
    pool: Pool<Sqlite>,
}

impl SqliteStore {
    /// Create a new SQLite store, running migrations.
    pub async fn new(path: impl AsRef<Path>) -> MetadataResult<Self> {
        let path = path.as_ref();

        // Ensure parent directory exists
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
            // SQLite permits limited write concurrency; a single connection avoids
            // persistent "database is locked" failures under handler concurrency
            // and makes the status compare-and-set linearizable per key.
            .max_connections(1)
            .connect_with(opts)
            .await?;

        let store = Self { pool };
        store.migrate().await?;
        tracing::debug!(path = %path.display(), "Opened SQLite metadata store");
        Ok(store)
    }

    /// Get a reference to the connection pool.
    pub fn pool(&self) -> &Pool<Sqlite> {
        &self.pool
    }
}

#[async_trait]
impl MetadataStore for SqliteStore {
    async fn migrate(&self) -> MetadataResult<()> {
        sqlx::query(SCHEMA_SQL).execute(&self.pool).await?;
        Ok(())
    }

    async fn health_check(&self) -> MetadataResult<()> {
        sqlx::query("SELECT 1").execute(&self.pool).await?;
        Ok(())
    }
}

/// Chunk rows inserted per statement during session creation.
const CHUNK_INSERT_BATCH: u64 = 500;

#[async_trait]
impl SessionRepo for SqliteStore {
    async fn create_session(&self, session: &SessionRow, total_chunks: u64) -> MetadataResult<()> {
        let mut tx = self.pool.begin().await?;

        let result = sqlx::query(
            "INSERT INTO upload_sessions \
             (upload_id, filename, total_size, chunk_size, total_chunks, status, final_hash, created_at, updated_at) \
             VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)",
        )
        .bind(&session.upload_id)
        .bind(&session.filename)
        .bind(session.total_size)
        .bind(session.chunk_size)
        .bind(session.total_chunks)
        .bind(&session.status)
        .bind(&session.final_hash)
        .bind(session.created_at)
        .bind(session.updated_at)
        .execute(&mut *tx)
        .await;

        match result {
            Ok(_) => {}
            Err(sqlx::Error::Database(db)) if db.is_unique_violation() => {
                return Err(MetadataError::AlreadyExists(format!(
                    "upload session {}",
                    session.upload_id
                )));
            }
            Err(e) => return Err(e.into()),
        }

        // All chunk records are created in the same transaction so a session
        // is never observable without its full PENDING chunk set.
        let mut index = 0u64;
        while index < total_chunks {
            let end = (index + CHUNK_INSERT_BATCH).min(total_chunks);
            let mut qb = sqlx::QueryBuilder::<Sqlite>::new(
                "INSERT INTO upload_chunks (upload_id, chunk_index, status) ",
            );
            qb.push_values(index..end, |mut b, i| {
                b.push_bind(&session.upload_id)
                    .push_bind(i as i64)
                    .push_bind("PENDING");
            });
            qb.build().execute(&mut *tx).await?;
            index = end;
        }

        tx.commit().await?;
        Ok(())
    }

    async fn get_session(&self, upload_id: &str) -> MetadataResult<Option<SessionRow>> {
        let row = sqlx::query_as::<_, SessionRow>(
            "SELECT * FROM upload_sessions WHERE upload_id = ?",
        )
        .bind(upload_id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(row)
    }

    async fn transition_session(
        &self,
        upload_id: &str,
        from: SessionStatus,
        to: SessionStatus,
        final_hash: Option<&str>,
        updated_at: OffsetDateTime,
    ) -> MetadataResult<bool> {
        // Single-statement compare-and-set: the row count tells the caller
        // whether it won the transition. final_hash is write-once by
        // construction because only the PROCESSING -> COMPLETED swap passes
        // Some, and COMPLETED never matches a `from` again.
        let result = sqlx::query(
            "UPDATE upload_sessions \
             SET status = ?, final_hash = COALESCE(?, final_hash), updated_at = ? \
             WHERE upload_id = ? AND status = ?",
        )
        .bind(to.as_str())
        .bind(final_hash)
        .bind(updated_at)
        .bind(upload_id)
        .bind(from.as_str())
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected() > 0)
    }

    async fn list_sessions_where(
        &self,
        statuses: &[SessionStatus],
        created_before: OffsetDateTime,
    ) -> MetadataResult<Vec<SessionRow>> {
        if statuses.is_empty() {
            return Ok(Vec::new());
        }

        let mut qb =
            sqlx::QueryBuilder::<Sqlite>::new("SELECT * FROM upload_sessions WHERE status IN (");
        let mut sep = qb.separated(", ");
        for status in statuses {
            sep.push_bind(status.as_str());
        }
        qb.push(") AND created_at < ");
        qb.push_bind(created_before);
        qb.push(" ORDER BY created_at");

        let rows = qb
            .build_query_as::<SessionRow>()
            .fetch_all(&self.pool)
            .await?;
        Ok(rows)
    }

    async fn delete_session(&self, upload_id: &str) -> MetadataResult<()> {
        // Chunk rows go with the session via ON DELETE CASCADE.
        sqlx::query("DELETE FROM upload_sessions WHERE upload_id = ?")
            .bind(upload_id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }
}

#[async_trait]
impl ChunkRepo for SqliteStore {
    async fn get_chunk(
        &self,
        upload_id: &str,
        chunk_index: u64,
    ) -> MetadataResult<Option<ChunkRow>> {
        let row = sqlx::query_as::<_, ChunkRow>(
            "SELECT * FROM upload_chunks WHERE upload_id = ? AND chunk_index = ?",
        )
        .bind(upload_id)
        .bind(chunk_index as i64)
        .fetch_optional(&self.pool)
        .await?;
        Ok(row)
    }

    async fn list_chunks(&self, upload_id: &str) -> MetadataResult<Vec<ChunkRow>> {
        let rows = sqlx::query_as::<_, ChunkRow>(
            "SELECT * FROM upload_chunks WHERE upload_id = ? ORDER BY chunk_index",
        )
        .bind(upload_id)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows)
    }

    async fn mark_chunk_received(
        &self,
        upload_id: &str,
        chunk_index: u64,
        received_at: OffsetDateTime,
    ) -> MetadataResult<()> {
        // Idempotent upsert; the first receipt timestamp wins on retries.
        sqlx::query(
            "INSERT INTO upload_chunks (upload_id, chunk_index, status, received_at) \
             VALUES (?, ?, 'RECEIVED', ?) \
             ON CONFLICT(upload_id, chunk_index) DO UPDATE SET \
             status = 'RECEIVED', \
             received_at = COALESCE(upload_chunks.received_at, excluded.received_at)",
        )
        .bind(upload_id)
        .bind(chunk_index as i64)
        .bind(received_at)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn count_received(&self, upload_id: &str) -> MetadataResult<u64> {
        let count: i64 = sqlx::query_scalar(
            "SELECT COUNT(*) FROM upload_chunks WHERE upload_id = ? AND status = 'RECEIVED'",
        )
        .bind(upload_id)
        .fetch_one(&self.pool)
        .await?;
        Ok(count as u64)
    }
}

const SCHEMA_SQL: &str = r#"
-- Upload sessions
CREATE TABLE IF NOT EXISTS upload_sessions (
    upload_id TEXT PRIMARY KEY,
    filename TEXT NOT NULL,
    total_size INTEGER NOT NULL,
    chunk_size INTEGER NOT NULL,
    total_chunks INTEGER NOT NULL,
    status TEXT NOT NULL DEFAULT 'UPLOADING',
    final_hash TEXT,
    created_at TEXT NOT NULL,
    updated_at TEXT NOT NULL
);
CREATE INDEX IF NOT EXISTS idx_upload_sessions_status ON upload_sessions(status, created_at);

-- Per-chunk receipt records
CREATE TABLE IF NOT EXISTS upload_chunks (
    upload_id TEXT NOT NULL,
    chunk_index INTEGER NOT NULL,
    status TEXT NOT NULL DEFAULT 'PENDING',
    received_at TEXT,
    PRIMARY KEY (upload_id, chunk_index),
    FOREIGN KEY (upload_id) REFERENCES upload_sessions(upload_id) ON DELETE CASCADE
);
CREATE INDEX IF NOT EXISTS idx_upload_chunks_status ON upload_chunks(upload_id, status);
"#;
