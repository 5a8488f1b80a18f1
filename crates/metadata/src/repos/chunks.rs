//! Chunk receipt repository.

use crate::error::MetadataResult;
use crate::models::ChunkRow;
use async_trait::async_trait;
use time::OffsetDateTime;

/// Repository for chunk receipt operations.
#[async_trait]
pub trait ChunkRepo: Send + Sync {
    /// Get a chunk record by composite key.
    async fn get_chunk(&self, upload_id: &str, chunk_index: u64)
    -> MetadataResult<Option<ChunkRow>>;

    /// List all chunk records for a session, ordered by index.
    async fn list_chunks(&self, upload_id: &str) -> MetadataResult<Vec<ChunkRow>>;

    /// Mark a chunk as received.
    ///
    /// Idempotent upsert: after return the chunk's status is RECEIVED no
    /// matter how many times it is called. Callers must only invoke this
    /// after the chunk's bytes have been written and flushed to the target
    /// file; the receipt is the durable claim that the data is on disk.
    async fn mark_chunk_received(
        &self,
        upload_id: &str,
        chunk_index: u64,
        received_at: OffsetDateTime,
    ) -> MetadataResult<()>;

    /// Count chunks with status RECEIVED for a session.
    async fn count_received(&self, upload_id: &str) -> MetadataResult<u64>;
}
