//! Upload session types, chunk records, and lifecycle.

use serde::{Deserialize, Serialize};
use std::fmt;
use time::OffsetDateTime;

/// Upload session status.
///
/// Transitions are one-way: `Uploading -> Processing -> Completed`, with
/// `Failed` reachable from either non-terminal state. There is no transition
/// out of `Completed` or `Failed`.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum SessionStatus {
    /// Session is open and accepting chunks.
    Uploading,
    /// A single worker is finalizing the assembled file.
    Processing,
    /// Finalized: digest recorded, all chunks received.
    Completed,
    /// Finalization failed; the session is dead.
    Failed,
}

impl SessionStatus {
    /// The stored/wire representation.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Uploading => "UPLOADING",
            Self::Processing => "PROCESSING",
            Self::Completed => "COMPLETED",
            Self::Failed => "FAILED",
        }
    }

    /// Parse from the stored representation.
    pub fn parse(s: &str) -> crate::Result<Self> {
        match s {
            "UPLOADING" => Ok(Self::Uploading),
            "PROCESSING" => Ok(Self::Processing),
            "COMPLETED" => Ok(Self::Completed),
            "FAILED" => Ok(Self::Failed),
            other => Err(crate::Error::UnknownStatus(other.to_string())),
        }
    }

    /// Check if the session can still receive chunks.
    pub fn is_active(&self) -> bool {
        matches!(self, Self::Uploading)
    }

    /// Check if the session reached a terminal state.
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Completed | Self::Failed)
    }
}

impl fmt::Display for SessionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Receipt status of a single chunk.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum ChunkStatus {
    /// Not yet received (or a previous attempt failed before the write).
    Pending,
    /// Bytes written and flushed to the target file.
    Received,
}

impl ChunkStatus {
    /// The stored/wire representation.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "PENDING",
            Self::Received => "RECEIVED",
        }
    }

    /// Parse from the stored representation.
    pub fn parse(s: &str) -> crate::Result<Self> {
        match s {
            "PENDING" => Ok(Self::Pending),
            "RECEIVED" => Ok(Self::Received),
            other => Err(crate::Error::UnknownChunkStatus(other.to_string())),
        }
    }
}

impl fmt::Display for ChunkStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// An upload session tracking resumable upload state.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UploadSession {
    /// Client-supplied opaque identifier, stable across retries.
    pub id: String,
    /// Original file name; used for logging and container peek dispatch.
    pub filename: String,
    /// Declared length of the final file in bytes.
    pub total_size: u64,
    /// Chunk size frozen at session creation.
    pub chunk_size: u64,
    /// Number of chunks: `ceil(total_size / chunk_size)`.
    pub total_chunks: u64,
    /// Current lifecycle status.
    pub status: SessionStatus,
    /// Lowercase hex SHA-256 of the assembled file; set iff `Completed`.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub final_hash: Option<String>,
    /// When the session was created.
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
    /// When the session was last updated.
    #[serde(with = "time::serde::rfc3339")]
    pub updated_at: OffsetDateTime,
}

impl UploadSession {
    /// Byte range covered by one chunk of this session.
    pub fn chunk_span(&self, index: u64) -> crate::Result<(u64, u64)> {
        if index >= self.total_chunks {
            return Err(crate::Error::ChunkIndexOutOfRange {
                index,
                total_chunks: self.total_chunks,
            });
        }
        Ok(chunk_span(self.total_size, self.chunk_size, index))
    }
}

/// Receipt record for one `(upload_id, chunk_index)` pair.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChunkRecord {
    pub upload_id: String,
    pub chunk_index: u64,
    pub status: ChunkStatus,
    #[serde(
        with = "time::serde::rfc3339::option",
        skip_serializing_if = "Option::is_none",
        default
    )]
    pub received_at: Option<OffsetDateTime>,
}

/// Calculate the number of chunks for a file of `total_size` bytes.
pub fn total_chunks_for(total_size: u64, chunk_size: u64) -> u64 {
    total_size.div_ceil(chunk_size)
}

/// Byte offset and length of chunk `index`.
///
/// Chunks cover `[index * chunk_size, min((index + 1) * chunk_size, total_size))`;
/// only the last chunk may be shorter than `chunk_size`.
pub fn chunk_span(total_size: u64, chunk_size: u64, index: u64) -> (u64, u64) {
    let offset = index * chunk_size;
    let len = chunk_size.min(total_size - offset);
    (offset, len)
}

/// Validate a client-supplied upload id.
///
/// Ids become file names under the upload directory, so anything that could
/// escape it (separators, `..`) or break tooling (control characters) is
/// rejected up front.
pub fn validate_upload_id(id: &str) -> crate::Result<()> {
    if id.is_empty() {
        return Err(crate::Error::InvalidUploadId("empty".to_string()));
    }
    if id.len() > crate::MAX_UPLOAD_ID_LEN {
        return Err(crate::Error::InvalidUploadId(format!(
            "longer than {} bytes",
            crate::MAX_UPLOAD_ID_LEN
        )));
    }
    if id == "." || id == ".." {
        return Err(crate::Error::InvalidUploadId(id.to_string()));
    }
    if id
        .chars()
        .any(|c| c == '/' || c == '\\' || c.is_control())
    {
        return Err(crate::Error::InvalidUploadId(format!(
            "contains unsafe characters: {id:?}"
        )));
    }
    Ok(())
}

// =============================================================================
// Wire DTOs
// =============================================================================

/// Request body for `POST /api/upload/init`.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InitRequest {
    pub upload_id: String,
    pub filename: String,
    pub file_size: i64,
}

/// Response body for `POST /api/upload/init`.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InitResponse {
    pub upload_id: String,
    /// Indices whose receipt is already durable; the client skips these.
    pub uploaded_chunks: Vec<u64>,
    pub status: SessionStatus,
}

/// Response body for `POST /api/upload/chunk`.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChunkUploadResponse {
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub message: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub is_complete: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub received_chunks: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub total_chunks: Option<u64>,
}

impl ChunkUploadResponse {
    /// A chunk was written and durably recorded.
    pub fn stored(received_chunks: u64, total_chunks: u64, is_complete: bool) -> Self {
        Self {
            success: true,
            message: None,
            is_complete: Some(is_complete),
            received_chunks: Some(received_chunks),
            total_chunks: Some(total_chunks),
        }
    }

    /// The payload was discarded because the work is already done.
    pub fn skipped(message: impl Into<String>) -> Self {
        Self {
            success: true,
            message: Some(message.into()),
            is_complete: None,
            received_chunks: None,
            total_chunks: None,
        }
    }
}

/// Response body for `GET /api/upload/{uploadId}/status`.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct StatusResponse {
    pub upload: UploadSession,
    pub chunks: Vec<ChunkRecord>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_roundtrip() {
        for status in [
            SessionStatus::Uploading,
            SessionStatus::Processing,
            SessionStatus::Completed,
            SessionStatus::Failed,
        ] {
            assert_eq!(SessionStatus::parse(status.as_str()).unwrap(), status);
        }
        assert!(SessionStatus::parse("open").is_err());
    }

    #[test]
    fn test_status_flags() {
        assert!(SessionStatus::Uploading.is_active());
        assert!(!SessionStatus::Uploading.is_terminal());
        assert!(!SessionStatus::Processing.is_active());
        assert!(!SessionStatus::Processing.is_terminal());
        assert!(SessionStatus::Completed.is_terminal());
        assert!(SessionStatus::Failed.is_terminal());
    }

    #[test]
    fn test_status_serializes_uppercase() {
        let json = serde_json::to_string(&SessionStatus::Uploading).unwrap();
        assert_eq!(json, "\"UPLOADING\"");
    }

    #[test]
    fn test_total_chunks_for() {
        assert_eq!(total_chunks_for(10, 4), 3);
        assert_eq!(total_chunks_for(8, 4), 2);
        assert_eq!(total_chunks_for(1, 4), 1);
        assert_eq!(total_chunks_for(4, 4), 1);
    }

    #[test]
    fn test_chunk_span() {
        // 10 bytes in chunks of 4: [0,4) [4,8) [8,10)
        assert_eq!(chunk_span(10, 4, 0), (0, 4));
        assert_eq!(chunk_span(10, 4, 1), (4, 4));
        assert_eq!(chunk_span(10, 4, 2), (8, 2));
        // exact multiple: no short tail
        assert_eq!(chunk_span(8, 4, 1), (4, 4));
        // single byte file
        assert_eq!(chunk_span(1, 4, 0), (0, 1));
    }

    #[test]
    fn test_session_chunk_span_bounds() {
        let now = OffsetDateTime::now_utc();
        let session = UploadSession {
            id: "u1".to_string(),
            filename: "a.bin".to_string(),
            total_size: 10,
            chunk_size: 4,
            total_chunks: 3,
            status: SessionStatus::Uploading,
            final_hash: None,
            created_at: now,
            updated_at: now,
        };
        assert_eq!(session.chunk_span(2).unwrap(), (8, 2));
        assert!(session.chunk_span(3).is_err());
    }

    #[test]
    fn test_validate_upload_id() {
        validate_upload_id("u1").unwrap();
        validate_upload_id("client-42_A.part").unwrap();
        assert!(validate_upload_id("").is_err());
        assert!(validate_upload_id("a/b").is_err());
        assert!(validate_upload_id("a\\b").is_err());
        assert!(validate_upload_id("..").is_err());
        assert!(validate_upload_id("has\nnewline").is_err());
        assert!(validate_upload_id(&"x".repeat(200)).is_err());
    }

    #[test]
    fn test_chunk_response_shapes() {
        let stored = serde_json::to_value(ChunkUploadResponse::stored(2, 3, false)).unwrap();
        assert_eq!(stored["success"], true);
        assert_eq!(stored["receivedChunks"], 2);
        assert_eq!(stored["totalChunks"], 3);
        assert_eq!(stored["isComplete"], false);
        assert!(stored.get("message").is_none());

        let skipped =
            serde_json::to_value(ChunkUploadResponse::skipped("Chunk already uploaded")).unwrap();
        assert_eq!(skipped["success"], true);
        assert_eq!(skipped["message"], "Chunk already uploaded");
        assert!(skipped.get("receivedChunks").is_none());
    }
}
