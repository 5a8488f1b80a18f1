//! Application state shared across handlers.

use crate::coordinator::Coordinator;
use std::sync::Arc;
use stevedore_core::config::AppConfig;
use stevedore_metadata::MetadataStore;
use stevedore_storage::{ScratchDir, TargetStore};

/// Shared application state.
#[derive(Clone)]
pub struct AppState {
    /// Application configuration.
    pub config: Arc<AppConfig>,
    /// Metadata store (exposed for health checks).
    pub metadata: Arc<dyn MetadataStore>,
    /// Session coordinator.
    pub coordinator: Coordinator,
}

impl AppState {
    /// Create a new application state.
    pub fn new(
        config: AppConfig,
        metadata: Arc<dyn MetadataStore>,
        targets: TargetStore,
        scratch: ScratchDir,
    ) -> Self {
        let coordinator = Coordinator::new(
            metadata.clone(),
            targets,
            scratch,
            config.server.chunk_size,
        );
        Self {
            config: Arc::new(config),
            metadata,
            coordinator,
        }
    }
}
