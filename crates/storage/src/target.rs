//! Target file store: offset-addressed chunk writes into assembled files.

use crate::digest;
use crate::error::{StorageError, StorageResult};
use crate::zip;
use std::path::{Path, PathBuf};
use tokio::fs;
use tokio::io::{AsyncReadExt, AsyncSeekExt, AsyncWriteExt, SeekFrom};
use tracing::instrument;

/// Buffer size for streaming copies between spool and target files.
const COPY_BUF_SIZE: usize = 64 * 1024;

/// Store of assembled target files, one per upload session, rooted at the
/// upload directory.
///
/// Files are created lazily on the first chunk write and are implicitly
/// sparse until every chunk has landed. Writes at distinct chunk offsets
/// never overlap, so the store performs no locking of its own.
#[derive(Clone, Debug)]
pub struct TargetStore {
    root: PathBuf,
}

impl TargetStore {
    /// Create a new target store, creating the root directory if needed.
    pub async fn new(root: impl AsRef<Path>) -> StorageResult<Self> {
        let root = root.as_ref().to_path_buf();
        fs::create_dir_all(&root).await?;
        Ok(Self { root })
    }

    /// Root directory of the store.
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Resolve the target path for an upload id.
    ///
    /// Ids were validated at session creation, but the store refuses path
    /// escapes on its own as well: an id must be a single normal path
    /// component under the root.
    pub fn target_path(&self, upload_id: &str) -> StorageResult<PathBuf> {
        if upload_id.is_empty()
            || upload_id.contains('/')
            || upload_id.contains('\\')
            || upload_id == "."
            || upload_id == ".."
        {
            return Err(StorageError::InvalidKey(format!(
                "unsafe upload id: {upload_id:?}"
            )));
        }
        let path = self.root.join(upload_id);
        match path.components().next_back() {
            Some(std::path::Component::Normal(_)) => Ok(path),
            _ => Err(StorageError::InvalidKey(format!(
                "unsafe upload id: {upload_id:?}"
            ))),
        }
    }

    /// Write one chunk's payload from a spool file into the target at the
    /// given offset.
    ///
    /// The spooled payload's length is checked against `expected_len` before
    /// the target file is opened; a mismatch leaves the target untouched.
    /// The write is flushed and `sync_data`-ed before returning, so a
    /// successful return means the bytes are durable.
    #[instrument(skip(self, spool_path), fields(upload_id = %upload_id, chunk_index))]
    pub async fn write_chunk(
        &self,
        upload_id: &str,
        chunk_index: u64,
        offset: u64,
        expected_len: u64,
        spool_path: &Path,
    ) -> StorageResult<()> {
        let spooled_len = fs::metadata(spool_path).await?.len();
        if spooled_len != expected_len {
            return Err(StorageError::LengthMismatch {
                index: chunk_index,
                expected: expected_len,
                actual: spooled_len,
            });
        }

        let path = self.target_path(upload_id)?;
        let mut src = fs::File::open(spool_path).await?;
        let mut dst = fs::OpenOptions::new()
            .write(true)
            .create(true)
            .truncate(false)
            .open(&path)
            .await?;
        dst.seek(SeekFrom::Start(offset)).await?;

        let mut buf = vec![0u8; COPY_BUF_SIZE];
        let mut written: u64 = 0;
        loop {
            let n = src.read(&mut buf).await?;
            if n == 0 {
                break;
            }
            dst.write_all(&buf[..n]).await?;
            written += n as u64;
        }
        // The spool is private to this request, but a short read would
        // silently corrupt the file, so the copied length is re-checked.
        if written != expected_len {
            return Err(StorageError::Io(std::io::Error::other(format!(
                "spool shrank during copy: wrote {written} of {expected_len} bytes"
            ))));
        }

        dst.flush().await?;
        dst.sync_data().await?;
        Ok(())
    }

    /// Current length of a target file in bytes.
    pub async fn len(&self, upload_id: &str) -> StorageResult<u64> {
        let path = self.target_path(upload_id)?;
        let metadata = fs::metadata(&path).await.map_err(|e| {
            if e.kind() == std::io::ErrorKind::NotFound {
                StorageError::NotFound(upload_id.to_string())
            } else {
                StorageError::Io(e)
            }
        })?;
        Ok(metadata.len())
    }

    /// Delete a target file. Returns whether a file existed.
    #[instrument(skip(self), fields(upload_id = %upload_id))]
    pub async fn remove(&self, upload_id: &str) -> StorageResult<bool> {
        let path = self.target_path(upload_id)?;
        match fs::remove_file(&path).await {
            Ok(()) => Ok(true),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(false),
            Err(e) => Err(StorageError::Io(e)),
        }
    }

    /// Streaming SHA-256 over a target file, as lowercase hex.
    pub async fn sha256(&self, upload_id: &str) -> StorageResult<String> {
        let path = self.target_path(upload_id)?;
        digest::sha256_file(&path).await
    }

    /// Best-effort listing of a target file's root-level ZIP entries.
    pub async fn peek_zip(&self, upload_id: &str, limit: usize) -> StorageResult<Vec<String>> {
        let path = self.target_path(upload_id)?;
        zip::list_root_entries(&path, limit).await
    }
}
