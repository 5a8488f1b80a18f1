//! Application configuration.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

/// Top-level application configuration.
///
/// Every field has a default so the server boots without a config file;
/// values come from an optional TOML file merged with `STEVEDORE_`-prefixed
/// environment variables.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub server: ServerConfig,
    pub storage: StorageConfig,
    pub metadata: MetadataConfig,
    pub janitor: JanitorConfig,
}

impl AppConfig {
    /// Create a test configuration rooted at a temporary directory.
    ///
    /// **For testing only.** Uses a tiny chunk size so tests exercise
    /// multi-chunk uploads with small payloads.
    pub fn for_testing(root: impl Into<PathBuf>) -> Self {
        let root = root.into();
        Self {
            server: ServerConfig {
                chunk_size: 4,
                ..Default::default()
            },
            storage: StorageConfig {
                upload_dir: root.join("upload"),
                temp_dir: root.join("temp"),
            },
            metadata: MetadataConfig::Sqlite {
                path: root.join("metadata.db"),
            },
            janitor: JanitorConfig::default(),
        }
    }
}

/// HTTP server configuration.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    /// Bind address (e.g., "0.0.0.0:3001").
    pub bind: String,
    /// Chunk size in bytes for new sessions.
    pub chunk_size: u64,
    /// Enable the /metrics endpoint for Prometheus scraping.
    pub metrics_enabled: bool,
}

impl ServerConfig {
    /// Maximum request body for chunk uploads: one chunk plus multipart framing.
    pub fn max_chunk_body_bytes(&self) -> usize {
        self.chunk_size as usize + CHUNK_BODY_OVERHEAD
    }
}

/// Extra request body allowance for multipart boundaries and text parts.
const CHUNK_BODY_OVERHEAD: usize = 1024 * 1024;

fn default_bind() -> String {
    "0.0.0.0:3001".to_string()
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind: default_bind(),
            chunk_size: crate::DEFAULT_CHUNK_SIZE,
            metrics_enabled: true,
        }
    }
}

/// On-disk data plane configuration.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    /// Directory holding assembled target files, one per session.
    pub upload_dir: PathBuf,
    /// Directory holding in-flight chunk spool files.
    pub temp_dir: PathBuf,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            upload_dir: PathBuf::from("upload"),
            temp_dir: PathBuf::from("temp"),
        }
    }
}

/// Metadata store configuration.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum MetadataConfig {
    /// SQLite-backed store.
    Sqlite {
        /// Database file path.
        path: PathBuf,
    },
}

impl Default for MetadataConfig {
    fn default() -> Self {
        Self::Sqlite {
            path: PathBuf::from("data/stevedore.db"),
        }
    }
}

/// Janitor sweep configuration.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct JanitorConfig {
    /// Whether the background sweep loop runs at all.
    pub enabled: bool,
    /// Seconds between sweeps.
    pub interval_secs: u64,
    /// Age after which non-completed sessions are reclaimed.
    pub session_retention_secs: u64,
    /// Age after which orphaned scratch files are reclaimed.
    pub scratch_ttl_secs: u64,
}

impl JanitorConfig {
    pub fn interval(&self) -> Duration {
        Duration::from_secs(self.interval_secs)
    }

    pub fn session_retention(&self) -> Duration {
        Duration::from_secs(self.session_retention_secs)
    }

    pub fn scratch_ttl(&self) -> Duration {
        Duration::from_secs(self.scratch_ttl_secs)
    }
}

impl Default for JanitorConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            interval_secs: 3600,
            session_retention_secs: 24 * 3600,
            scratch_ttl_secs: 3600,
        }
    }
}
