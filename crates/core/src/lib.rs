//! Core domain types and shared logic for the Stevedore upload service.
//!
//! This crate defines the canonical data model used across all other crates:
//! - Upload session lifecycle and status state machine
//! - Per-chunk receipt records and chunk arithmetic
//! - Content hashing
//! - Wire DTOs for the HTTP surface
//! - Application configuration

pub mod config;
pub mod error;
pub mod hash;
pub mod session;

pub use error::{Error, Result};
pub use hash::{ContentHash, ContentHasher};
pub use session::{
    ChunkRecord, ChunkStatus, SessionStatus, UploadSession, chunk_span, total_chunks_for,
    validate_upload_id,
};

/// Default chunk size: 5 MiB.
pub const DEFAULT_CHUNK_SIZE: u64 = 5 * 1024 * 1024;

/// Maximum accepted upload id length in bytes.
pub const MAX_UPLOAD_ID_LEN: usize = 128;
