//! Error types for the core domain.

use thiserror::Error;

/// Core domain error type.
#[derive(Debug, Error)]
pub enum Error {
    #[error("invalid upload id: {0}")]
    InvalidUploadId(String),

    #[error("invalid hash: {0}")]
    InvalidHash(String),

    #[error("chunk index {index} out of range (session has {total_chunks} chunks)")]
    ChunkIndexOutOfRange { index: u64, total_chunks: u64 },

    #[error("unknown session status: {0}")]
    UnknownStatus(String),

    #[error("unknown chunk status: {0}")]
    UnknownChunkStatus(String),
}

/// Result type alias for core operations.
pub type Result<T> = std::result::Result<T, Error>;
