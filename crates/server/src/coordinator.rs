//! Session coordinator: admission, assembly, and exactly-once finalization.
//!
//! The coordinator is the only writer of session/chunk records and of target
//! files. It holds no locks of its own: concurrent requests on the same
//! session are safe because chunk writes land at disjoint offsets and every
//! status change goes through the metadata store's per-key compare-and-set.

use crate::error::{ApiError, ApiResult};
use crate::metrics;
use std::sync::Arc;
use std::time::Instant;
use stevedore_core::session::{
    ChunkRecord, ChunkStatus, SessionStatus, UploadSession, total_chunks_for, validate_upload_id,
};
use stevedore_metadata::{MetadataStore, SessionRow};
use stevedore_storage::{ScratchDir, ScratchFile, TargetStore};
use time::OffsetDateTime;

/// Entries reported by a container peek.
const PEEK_ENTRY_LIMIT: usize = 5;

/// Result of an `init` call.
#[derive(Debug)]
pub struct InitOutcome {
    pub session: UploadSession,
    /// Indices whose receipt was durable before this call.
    pub uploaded_chunks: Vec<u64>,
    /// False when an existing session was resumed.
    pub created: bool,
}

/// Result of a `receive_chunk` call.
#[derive(Debug)]
pub enum ChunkOutcome {
    /// The payload was written and durably recorded.
    Stored {
        received_chunks: u64,
        total_chunks: u64,
        is_complete: bool,
    },
    /// This chunk was already received; the payload was discarded.
    Duplicate,
    /// The session is past UPLOADING; the payload was discarded.
    AlreadyFinalized,
}

/// Orchestrates the upload lifecycle over the metadata store and the on-disk
/// data plane.
#[derive(Clone)]
pub struct Coordinator {
    metadata: Arc<dyn MetadataStore>,
    targets: TargetStore,
    scratch: ScratchDir,
    chunk_size: u64,
}

impl Coordinator {
    pub fn new(
        metadata: Arc<dyn MetadataStore>,
        targets: TargetStore,
        scratch: ScratchDir,
        chunk_size: u64,
    ) -> Self {
        Self {
            metadata,
            targets,
            scratch,
            chunk_size,
        }
    }

    pub fn metadata(&self) -> &Arc<dyn MetadataStore> {
        &self.metadata
    }

    pub fn targets(&self) -> &TargetStore {
        &self.targets
    }

    pub fn scratch(&self) -> &ScratchDir {
        &self.scratch
    }

    pub fn chunk_size(&self) -> u64 {
        self.chunk_size
    }

    /// Create an upload session, or resume the existing one with the same id.
    ///
    /// Idempotent: a retried init returns the surviving session and its
    /// accurate progress. When the id already exists, the stored session wins
    /// and mismatched filename/size are not detected.
    #[tracing::instrument(skip(self, filename), fields(upload_id = %upload_id))]
    pub async fn init(
        &self,
        upload_id: &str,
        filename: &str,
        file_size: i64,
    ) -> ApiResult<InitOutcome> {
        validate_upload_id(upload_id)?;
        if filename.is_empty() {
            return Err(ApiError::BadRequest("filename must not be empty".to_string()));
        }
        if file_size <= 0 {
            return Err(ApiError::BadRequest(format!(
                "fileSize must be positive, got {file_size}"
            )));
        }

        let total_size = file_size as u64;
        let total_chunks = total_chunks_for(total_size, self.chunk_size);
        let now = OffsetDateTime::now_utc();
        let row = SessionRow {
            upload_id: upload_id.to_string(),
            filename: filename.to_string(),
            total_size: file_size,
            chunk_size: self.chunk_size as i64,
            total_chunks: total_chunks as i64,
            status: SessionStatus::Uploading.as_str().to_string(),
            final_hash: None,
            created_at: now,
            updated_at: now,
        };

        match self.metadata.create_session(&row, total_chunks).await {
            Ok(()) => {
                metrics::SESSIONS_CREATED.inc();
                tracing::info!(
                    upload_id = %upload_id,
                    total_size,
                    total_chunks,
                    "Created upload session"
                );
                Ok(InitOutcome {
                    session: row.into_session()?,
                    uploaded_chunks: Vec::new(),
                    created: true,
                })
            }
            Err(stevedore_metadata::MetadataError::AlreadyExists(_)) => {
                // Same id, possibly a retry or a resume after restart. The
                // stored session is authoritative.
                let existing = self.metadata.get_session(upload_id).await?.ok_or_else(|| {
                    ApiError::Internal(format!(
                        "session {upload_id} vanished between insert and load"
                    ))
                })?;
                let uploaded_chunks = self.received_indices(upload_id).await?;

                metrics::SESSIONS_RESUMED.inc();
                tracing::info!(
                    upload_id = %upload_id,
                    received = uploaded_chunks.len(),
                    "Resumed existing upload session"
                );
                Ok(InitOutcome {
                    session: existing.into_session()?,
                    uploaded_chunks,
                    created: false,
                })
            }
            Err(e) => Err(e.into()),
        }
    }

    /// Accept one spooled chunk payload.
    ///
    /// The write-then-record order is load-bearing: a chunk is only marked
    /// RECEIVED once its bytes are flushed to the target file, so a crash
    /// between the two leaves a retryable PENDING record, never a lying one.
    /// The spool file is removed on every exit path (its drop guard covers
    /// the error returns).
    #[tracing::instrument(skip(self, spool), fields(upload_id = %upload_id, chunk_index))]
    pub async fn receive_chunk(
        &self,
        upload_id: &str,
        chunk_index: u64,
        spool: ScratchFile,
    ) -> ApiResult<ChunkOutcome> {
        let session = self
            .metadata
            .get_session(upload_id)
            .await?
            .ok_or_else(|| ApiError::NotFound(format!("upload session {upload_id} not found")))?;
        let status = session.session_status()?;
        let session = session.into_session()?;

        if !status.is_active() {
            tracing::debug!(
                upload_id = %upload_id,
                status = %status,
                "Discarding chunk for finalized session"
            );
            self.discard_spool(spool).await;
            return Ok(ChunkOutcome::AlreadyFinalized);
        }

        // Range check before the record lookup so an out-of-range index is a
        // client error rather than a missing-record anomaly.
        let (offset, expected_len) = session.chunk_span(chunk_index)?;

        let chunk = self
            .metadata
            .get_chunk(upload_id, chunk_index)
            .await?
            .ok_or_else(|| {
                ApiError::Internal(format!(
                    "chunk record {upload_id}/{chunk_index} missing for live session"
                ))
            })?;
        if chunk.chunk_status()? == ChunkStatus::Received {
            metrics::CHUNKS_DUPLICATE.inc();
            self.discard_spool(spool).await;
            return Ok(ChunkOutcome::Duplicate);
        }

        let write_start = Instant::now();
        self.targets
            .write_chunk(upload_id, chunk_index, offset, expected_len, spool.path())
            .await?;

        let now = OffsetDateTime::now_utc();
        self.metadata
            .mark_chunk_received(upload_id, chunk_index, now)
            .await?;

        self.discard_spool(spool).await;

        metrics::CHUNKS_RECEIVED.inc();
        metrics::BYTES_RECEIVED.inc_by(expected_len);
        metrics::CHUNK_WRITE_DURATION.observe(write_start.elapsed().as_secs_f64());

        let received_chunks = self.metadata.count_received(upload_id).await?;
        let is_complete = received_chunks == session.total_chunks;

        tracing::debug!(
            upload_id = %upload_id,
            chunk_index,
            received_chunks,
            total_chunks = session.total_chunks,
            "Chunk received"
        );

        if is_complete {
            // The last arriving chunk's handler performs finalization inline.
            self.try_finalize(upload_id).await?;
        }

        Ok(ChunkOutcome::Stored {
            received_chunks,
            total_chunks: session.total_chunks,
            is_complete,
        })
    }

    /// Attempt the exactly-once finalization of a fully received upload.
    ///
    /// Returns whether this caller performed it. Multiple workers may race
    /// here (the true last chunk and a retried duplicate finishing together);
    /// the UPLOADING -> PROCESSING compare-and-set picks the single winner,
    /// and a session already past UPLOADING refuses the claim.
    #[tracing::instrument(skip(self), fields(upload_id = %upload_id))]
    pub async fn try_finalize(&self, upload_id: &str) -> ApiResult<bool> {
        let claimed = self
            .metadata
            .transition_session(
                upload_id,
                SessionStatus::Uploading,
                SessionStatus::Processing,
                None,
                OffsetDateTime::now_utc(),
            )
            .await?;
        if !claimed {
            tracing::debug!(
                upload_id = %upload_id,
                "Finalization already claimed by another worker"
            );
            return Ok(false);
        }

        // From here this worker owns the session exclusively; any error must
        // push it to FAILED so it cannot sit in PROCESSING forever.
        let finalize_start = Instant::now();
        match self.run_finalization(upload_id).await {
            Ok(final_hash) => {
                metrics::SESSIONS_COMPLETED.inc();
                metrics::FINALIZE_DURATION.observe(finalize_start.elapsed().as_secs_f64());
                tracing::info!(
                    upload_id = %upload_id,
                    final_hash = %final_hash,
                    "Upload completed"
                );
                Ok(true)
            }
            Err(err) => {
                tracing::error!(
                    upload_id = %upload_id,
                    error = %err,
                    "Finalization failed, marking session FAILED"
                );
                if let Err(mark_err) = self
                    .metadata
                    .transition_session(
                        upload_id,
                        SessionStatus::Processing,
                        SessionStatus::Failed,
                        None,
                        OffsetDateTime::now_utc(),
                    )
                    .await
                {
                    tracing::error!(
                        upload_id = %upload_id,
                        error = %mark_err,
                        "Failed to mark session FAILED after finalization error"
                    );
                }
                metrics::SESSIONS_FAILED.inc();
                Err(err)
            }
        }
    }

    /// Digest, peek, and seal. Caller owns the PROCESSING claim.
    async fn run_finalization(&self, upload_id: &str) -> ApiResult<String> {
        let session = self
            .metadata
            .get_session(upload_id)
            .await?
            .ok_or_else(|| {
                ApiError::Internal(format!("session {upload_id} vanished during finalization"))
            })?
            .into_session()?;

        let on_disk = self.targets.len(upload_id).await?;
        if on_disk != session.total_size {
            return Err(ApiError::Internal(format!(
                "assembled file is {on_disk} bytes, expected {}",
                session.total_size
            )));
        }

        let final_hash = self.targets.sha256(upload_id).await?;

        // Container peek is best-effort: failures are logged, never surfaced.
        if session.filename.to_lowercase().ends_with(".zip") {
            match self.targets.peek_zip(upload_id, PEEK_ENTRY_LIMIT).await {
                Ok(entries) => {
                    tracing::info!(
                        upload_id = %upload_id,
                        filename = %session.filename,
                        entries = ?entries,
                        "Archive root entries"
                    );
                }
                Err(e) => {
                    tracing::warn!(
                        upload_id = %upload_id,
                        filename = %session.filename,
                        error = %e,
                        "Container peek failed"
                    );
                }
            }
        }

        let sealed = self
            .metadata
            .transition_session(
                upload_id,
                SessionStatus::Processing,
                SessionStatus::Completed,
                Some(&final_hash),
                OffsetDateTime::now_utc(),
            )
            .await?;
        if !sealed {
            return Err(ApiError::Internal(format!(
                "session {upload_id} left PROCESSING out of band"
            )));
        }

        Ok(final_hash)
    }

    /// Load the session and all chunk records. Read-only.
    pub async fn status(
        &self,
        upload_id: &str,
    ) -> ApiResult<(UploadSession, Vec<ChunkRecord>)> {
        let session = self
            .metadata
            .get_session(upload_id)
            .await?
            .ok_or_else(|| ApiError::NotFound(format!("upload session {upload_id} not found")))?
            .into_session()?;

        let mut chunks = Vec::new();
        for row in self.metadata.list_chunks(upload_id).await? {
            chunks.push(row.into_record()?);
        }
        Ok((session, chunks))
    }

    async fn received_indices(&self, upload_id: &str) -> ApiResult<Vec<u64>> {
        let mut indices = Vec::new();
        for row in self.metadata.list_chunks(upload_id).await? {
            if row.chunk_status()? == ChunkStatus::Received {
                indices.push(row.chunk_index as u64);
            }
        }
        Ok(indices)
    }

    async fn discard_spool(&self, spool: ScratchFile) {
        if let Err(e) = spool.remove().await {
            tracing::warn!(error = %e, "Failed to remove scratch file");
        }
    }
}
