//! Storage error types.

use thiserror::Error;

/// Storage operation errors.
#[derive(Debug, Error)]
pub enum StorageError {
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("not found: {0}")]
    NotFound(String),

    #[error("invalid storage key: {0}")]
    InvalidKey(String),

    #[error(
        "chunk {index} length mismatch: expected {expected} bytes, got {actual}"
    )]
    LengthMismatch {
        index: u64,
        expected: u64,
        actual: u64,
    },

    #[error("malformed archive: {0}")]
    InvalidArchive(String),
}

/// Result type for storage operations.
pub type StorageResult<T> = std::result::Result<T, StorageError>;
