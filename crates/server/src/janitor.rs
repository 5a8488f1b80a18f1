//! Background reclamation of abandoned sessions and stale scratch files.

use crate::error::ApiResult;
use crate::metrics;
use std::sync::Arc;
use stevedore_core::config::JanitorConfig;
use stevedore_core::session::SessionStatus;
use stevedore_metadata::MetadataStore;
use stevedore_storage::{ScratchDir, TargetStore};
use time::OffsetDateTime;
use tokio::task::JoinHandle;

/// Counters from one janitor sweep.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct JanitorStats {
    /// Sessions (and their target files and records) reclaimed.
    pub expired_sessions: usize,
    /// Stale scratch files removed.
    pub scratch_files: usize,
    /// Sessions skipped because their target file could not be removed.
    pub errors: usize,
}

/// Periodic sweeper for expired sessions and orphaned scratch files.
#[derive(Clone)]
pub struct Janitor {
    metadata: Arc<dyn MetadataStore>,
    targets: TargetStore,
    scratch: ScratchDir,
    config: JanitorConfig,
}

impl Janitor {
    pub fn new(
        metadata: Arc<dyn MetadataStore>,
        targets: TargetStore,
        scratch: ScratchDir,
        config: JanitorConfig,
    ) -> Self {
        Self {
            metadata,
            targets,
            scratch,
            config,
        }
    }

    /// Run the sweep loop forever on a background task.
    pub fn spawn(self) -> JoinHandle<()> {
        let interval = self.config.interval();
        tokio::spawn(async move {
            tracing::info!(
                interval_secs = interval.as_secs(),
                retention_secs = self.config.session_retention_secs,
                "Janitor started"
            );
            loop {
                tokio::time::sleep(interval).await;
                match self.sweep_once().await {
                    Ok(stats) => {
                        if stats != JanitorStats::default() {
                            tracing::info!(
                                expired_sessions = stats.expired_sessions,
                                scratch_files = stats.scratch_files,
                                errors = stats.errors,
                                "Janitor sweep finished"
                            );
                        }
                    }
                    Err(e) => {
                        tracing::error!(error = %e, "Janitor sweep failed");
                    }
                }
            }
        })
    }

    /// One full sweep: expired sessions first, then stale scratch files.
    ///
    /// Only UPLOADING and FAILED sessions past the retention horizon are
    /// touched; COMPLETED and PROCESSING sessions are never candidates. Per
    /// session the target file goes before the records, so a crash between
    /// the two leaves reclaimable orphan records rather than orphan bytes
    /// referenced by a live record.
    pub async fn sweep_once(&self) -> ApiResult<JanitorStats> {
        let mut stats = JanitorStats::default();

        let cutoff = OffsetDateTime::now_utc() - self.config.session_retention();
        let expired = self
            .metadata
            .list_sessions_where(&[SessionStatus::Uploading, SessionStatus::Failed], cutoff)
            .await?;

        for session in expired {
            let upload_id = &session.upload_id;
            match self.targets.remove(upload_id).await {
                Ok(_) => {}
                Err(e) => {
                    // Keep the records so the bytes stay reachable for the
                    // next sweep.
                    tracing::warn!(
                        upload_id = %upload_id,
                        error = %e,
                        "Failed to remove target file, keeping session for next sweep"
                    );
                    stats.errors += 1;
                    continue;
                }
            }
            self.metadata.delete_session(upload_id).await?;
            metrics::JANITOR_SESSIONS_REMOVED.inc();
            stats.expired_sessions += 1;
            tracing::info!(
                upload_id = %upload_id,
                status = %session.status,
                "Reclaimed expired upload session"
            );
        }

        let removed = self
            .scratch
            .sweep_older_than(self.config.scratch_ttl())
            .await?;
        metrics::JANITOR_SCRATCH_REMOVED.inc_by(removed as u64);
        stats.scratch_files = removed;

        Ok(stats)
    }
}
