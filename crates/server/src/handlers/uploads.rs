//! Upload endpoint handlers: thin adapters over the session coordinator.

use crate::coordinator::ChunkOutcome;
use crate::error::{ApiError, ApiResult};
use crate::state::AppState;
use axum::Json;
use axum::extract::{Multipart, Path, Request, State};
use stevedore_core::session::{
    ChunkUploadResponse, InitRequest, InitResponse, StatusResponse,
};
use stevedore_storage::ScratchFile;

/// Maximum request body size for init requests (64 KiB).
const MAX_INIT_BODY_SIZE: usize = 64 * 1024;

/// POST /api/upload/init - Create or resume an upload session.
#[tracing::instrument(skip(state, req))]
pub async fn init_upload(
    State(state): State<AppState>,
    req: Request,
) -> ApiResult<Json<InitResponse>> {
    let body: InitRequest = {
        let bytes = axum::body::to_bytes(req.into_body(), MAX_INIT_BODY_SIZE)
            .await
            .map_err(|e| ApiError::BadRequest(format!("failed to read body: {e}")))?;
        serde_json::from_slice(&bytes)
            .map_err(|e| ApiError::BadRequest(format!("invalid JSON: {e}")))?
    };

    let outcome = state
        .coordinator
        .init(&body.upload_id, &body.filename, body.file_size)
        .await?;

    Ok(Json(InitResponse {
        upload_id: outcome.session.id,
        uploaded_chunks: outcome.uploaded_chunks,
        status: outcome.session.status,
    }))
}

/// Collected parts of a chunk upload request.
#[derive(Default)]
struct ChunkForm {
    upload_id: Option<String>,
    chunk_index: Option<u64>,
    total_chunks: Option<u64>,
    spool: Option<ScratchFile>,
}

impl ChunkForm {
    fn require(self) -> ApiResult<(String, u64, u64, ScratchFile)> {
        let upload_id = self
            .upload_id
            .ok_or_else(|| ApiError::BadRequest("missing field: uploadId".to_string()))?;
        let chunk_index = self
            .chunk_index
            .ok_or_else(|| ApiError::BadRequest("missing field: chunkIndex".to_string()))?;
        let total_chunks = self
            .total_chunks
            .ok_or_else(|| ApiError::BadRequest("missing field: totalChunks".to_string()))?;
        let spool = self
            .spool
            .ok_or_else(|| ApiError::BadRequest("missing field: chunk".to_string()))?;
        Ok((upload_id, chunk_index, total_chunks, spool))
    }
}

async fn text_part(field: axum::extract::multipart::Field<'_>, name: &str) -> ApiResult<String> {
    field
        .text()
        .await
        .map_err(|e| ApiError::BadRequest(format!("unreadable field {name}: {e}")))
}

fn int_part(name: &str, value: &str) -> ApiResult<u64> {
    value
        .parse::<u64>()
        .map_err(|e| ApiError::BadRequest(format!("invalid {name} {value:?}: {e}")))
}

/// POST /api/upload/chunk - Receive one chunk (multipart/form-data).
///
/// The binary part is spooled to scratch as it streams in, so a chunk never
/// has to fit in memory; the text parts naming the session may arrive before
/// or after it. Any failure drops the spool, which deletes itself.
#[tracing::instrument(skip(state, multipart), fields(upload_id))]
pub async fn upload_chunk(
    State(state): State<AppState>,
    mut multipart: Multipart,
) -> ApiResult<Json<ChunkUploadResponse>> {
    let mut form = ChunkForm::default();

    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| ApiError::BadRequest(format!("malformed multipart body: {e}")))?
    {
        let name = field.name().map(str::to_string);
        match name.as_deref() {
            Some("uploadId") => {
                form.upload_id = Some(text_part(field, "uploadId").await?);
            }
            Some("chunkIndex") => {
                let value = text_part(field, "chunkIndex").await?;
                form.chunk_index = Some(int_part("chunkIndex", &value)?);
            }
            Some("totalChunks") => {
                let value = text_part(field, "totalChunks").await?;
                form.total_chunks = Some(int_part("totalChunks", &value)?);
            }
            Some("chunk") => {
                let mut field = field;
                let mut writer = state.coordinator.scratch().create().await?;
                while let Some(bytes) = field
                    .chunk()
                    .await
                    .map_err(|e| ApiError::BadRequest(format!("truncated chunk payload: {e}")))?
                {
                    writer.append(&bytes).await?;
                }
                form.spool = Some(writer.finish().await?);
            }
            _ => {
                // Unknown parts are drained and ignored.
            }
        }
    }

    let (upload_id, chunk_index, declared_total, spool) = form.require()?;
    tracing::Span::current().record("upload_id", upload_id.as_str());

    let outcome = state
        .coordinator
        .receive_chunk(&upload_id, chunk_index, spool)
        .await?;

    let response = match outcome {
        ChunkOutcome::Stored {
            received_chunks,
            total_chunks,
            is_complete,
        } => {
            if declared_total != total_chunks {
                tracing::debug!(
                    upload_id = %upload_id,
                    declared_total,
                    total_chunks,
                    "Client-declared totalChunks disagrees with session"
                );
            }
            ChunkUploadResponse::stored(received_chunks, total_chunks, is_complete)
        }
        ChunkOutcome::Duplicate => ChunkUploadResponse::skipped("Chunk already uploaded"),
        ChunkOutcome::AlreadyFinalized => {
            ChunkUploadResponse::skipped("Upload already finalized")
        }
    };

    Ok(Json(response))
}

/// GET /api/upload/{uploadId}/status - Session and chunk records.
#[tracing::instrument(skip(state), fields(upload_id = %upload_id))]
pub async fn upload_status(
    State(state): State<AppState>,
    Path(upload_id): Path<String>,
) -> ApiResult<Json<StatusResponse>> {
    let (upload, chunks) = state.coordinator.status(&upload_id).await?;
    Ok(Json(StatusResponse { upload, chunks }))
}
