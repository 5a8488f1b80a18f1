//! Metadata store abstraction and SQLite implementation for Stevedore.
//!
//! This crate owns the control-plane data model:
//! - Upload session records with their status state machine
//! - Per-chunk receipt records
//!
//! The store is the single authority for consistency: all mutual exclusion in
//! the upload pipeline flows through its per-key status compare-and-set.

pub mod error;
pub mod models;
pub mod repos;
pub mod store;

pub use error::{MetadataError, MetadataResult};
pub use models::{ChunkRow, SessionRow};
pub use repos::{ChunkRepo, SessionRepo};
pub use store::{MetadataStore, SqliteStore};

use std::sync::Arc;
use stevedore_core::config::MetadataConfig;

/// Create a metadata store from configuration.
pub async fn from_config(config: &MetadataConfig) -> MetadataResult<Arc<dyn MetadataStore>> {
    match config {
        MetadataConfig::Sqlite { path } => {
            let store = SqliteStore::new(path).await?;
            Ok(Arc::new(store) as Arc<dyn MetadataStore>)
        }
    }
}
