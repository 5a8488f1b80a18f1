//! Upload session repository.

use crate::error::MetadataResult;
use crate::models::SessionRow;
use async_trait::async_trait;
use stevedore_core::session::SessionStatus;
use time::OffsetDateTime;

/// Repository for upload session operations.
#[async_trait]
pub trait SessionRepo: Send + Sync {
    /// Create a new session together with all of its chunk records.
    ///
    /// The session row and `total_chunks` PENDING chunk rows (indices
    /// `0..total_chunks`) are inserted in a single transaction, so a session
    /// is never observable without its full chunk set. Fails with
    /// `AlreadyExists` when a session with the same id exists; in that case
    /// nothing is written.
    async fn create_session(&self, session: &SessionRow, total_chunks: u64) -> MetadataResult<()>;

    /// Get a session by id.
    async fn get_session(&self, upload_id: &str) -> MetadataResult<Option<SessionRow>>;

    /// Compare-and-set the session status.
    ///
    /// Applies `final_hash` (when given) and `updated_at`, and advances the
    /// status to `to`, only if the current status equals `from`. Returns
    /// whether the swap occurred. This is the sole concurrency primitive the
    /// coordinator relies on; the store must make it linearizable per key.
    async fn transition_session(
        &self,
        upload_id: &str,
        from: SessionStatus,
        to: SessionStatus,
        final_hash: Option<&str>,
        updated_at: OffsetDateTime,
    ) -> MetadataResult<bool>;

    /// List sessions in any of `statuses` created before `created_before`.
    async fn list_sessions_where(
        &self,
        statuses: &[SessionStatus],
        created_before: OffsetDateTime,
    ) -> MetadataResult<Vec<SessionRow>>;

    /// Delete a session and its chunk records.
    async fn delete_session(&self, upload_id: &str) -> MetadataResult<()>;
}
