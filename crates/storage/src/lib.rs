//! On-disk data plane for the Stevedore upload service.
//!
//! Three concerns live here:
//! - `target`: offset-addressed chunk writes into per-session target files
//! - `scratch`: spool files buffering one in-flight chunk payload each
//! - `digest` / `zip`: read-only passes over finished target files

pub mod digest;
pub mod error;
pub mod scratch;
pub mod target;
pub mod zip;

pub use error::{StorageError, StorageResult};
pub use scratch::{ScratchDir, ScratchFile, ScratchWriter};
pub use target::TargetStore;
