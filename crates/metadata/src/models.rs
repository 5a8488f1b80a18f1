//! Database models mapping to the metadata schema.

use crate::error::MetadataResult;
use sqlx::FromRow;
use stevedore_core::session::{ChunkRecord, ChunkStatus, SessionStatus, UploadSession};
use time::OffsetDateTime;

/// Upload session record.
#[derive(Debug, Clone, FromRow)]
pub struct SessionRow {
    pub upload_id: String,
    pub filename: String,
    pub total_size: i64,
    pub chunk_size: i64,
    pub total_chunks: i64,
    pub status: String,
    pub final_hash: Option<String>,
    pub created_at: OffsetDateTime,
    pub updated_at: OffsetDateTime,
}

impl SessionRow {
    /// Parse the stored status string.
    pub fn session_status(&self) -> MetadataResult<SessionStatus> {
        Ok(SessionStatus::parse(&self.status)?)
    }

    /// Convert into the core domain type.
    pub fn into_session(self) -> MetadataResult<UploadSession> {
        let status = SessionStatus::parse(&self.status)?;
        Ok(UploadSession {
            id: self.upload_id,
            filename: self.filename,
            total_size: self.total_size as u64,
            chunk_size: self.chunk_size as u64,
            total_chunks: self.total_chunks as u64,
            status,
            final_hash: self.final_hash,
            created_at: self.created_at,
            updated_at: self.updated_at,
        })
    }
}

/// Chunk receipt record.
#[derive(Debug, Clone, FromRow)]
pub struct ChunkRow {
    pub upload_id: String,
    pub chunk_index: i64,
    pub status: String,
    pub received_at: Option<OffsetDateTime>,
}

impl ChunkRow {
    /// Parse the stored status string.
    pub fn chunk_status(&self) -> MetadataResult<ChunkStatus> {
        Ok(ChunkStatus::parse(&self.status)?)
    }

    /// Convert into the core domain type.
    pub fn into_record(self) -> MetadataResult<ChunkRecord> {
        let status = ChunkStatus::parse(&self.status)?;
        Ok(ChunkRecord {
            upload_id: self.upload_id,
            chunk_index: self.chunk_index as u64,
            status,
            received_at: self.received_at,
        })
    }
}
