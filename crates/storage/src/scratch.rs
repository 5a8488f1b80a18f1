//! Scratch spool directory for in-flight chunk payloads.
//!
//! Each chunk request streams its payload into a uniquely named spool file
//! before the target write, so a whole chunk never has to sit in memory.
//! Spool files live only for the duration of one request; anything left
//! behind by a crash is reclaimed by the janitor's mtime sweep.

use crate::error::{StorageError, StorageResult};
use std::path::{Path, PathBuf};
use std::time::{Duration, SystemTime};
use tokio::fs;
use tokio::io::AsyncWriteExt;
use uuid::Uuid;

/// Directory holding spool files.
#[derive(Clone, Debug)]
pub struct ScratchDir {
    root: PathBuf,
}

impl ScratchDir {
    /// Create a new scratch directory, creating it on disk if needed.
    pub async fn new(root: impl AsRef<Path>) -> StorageResult<Self> {
        let root = root.as_ref().to_path_buf();
        fs::create_dir_all(&root).await?;
        Ok(Self { root })
    }

    /// Root directory of the spool.
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Open a fresh, uniquely named spool file for writing.
    pub async fn create(&self) -> StorageResult<ScratchWriter> {
        let path = self.root.join(format!("chunk-{}.part", Uuid::new_v4()));
        let file = fs::OpenOptions::new()
            .write(true)
            .create_new(true)
            .open(&path)
            .await?;
        Ok(ScratchWriter { path, file, len: 0 })
    }

    /// Delete spool files whose mtime is older than `max_age`.
    ///
    /// Returns the number of files removed. Individual failures are logged
    /// and skipped so one bad entry cannot wedge the sweep.
    pub async fn sweep_older_than(&self, max_age: Duration) -> StorageResult<usize> {
        let cutoff = SystemTime::now() - max_age;
        let mut removed = 0usize;

        let mut entries = fs::read_dir(&self.root).await?;
        while let Some(entry) = entries.next_entry().await? {
            let path = entry.path();
            let metadata = match entry.metadata().await {
                Ok(m) if m.is_file() => m,
                Ok(_) => continue,
                Err(e) => {
                    tracing::warn!(path = %path.display(), error = %e, "Failed to stat scratch entry");
                    continue;
                }
            };
            let modified = match metadata.modified() {
                Ok(t) => t,
                Err(e) => {
                    tracing::warn!(path = %path.display(), error = %e, "Scratch entry has no mtime");
                    continue;
                }
            };
            if modified >= cutoff {
                continue;
            }
            match fs::remove_file(&path).await {
                Ok(()) => removed += 1,
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
                Err(e) => {
                    tracing::warn!(path = %path.display(), error = %e, "Failed to remove stale scratch file");
                }
            }
        }

        Ok(removed)
    }
}

/// An open spool file accepting payload bytes.
pub struct ScratchWriter {
    path: PathBuf,
    file: fs::File,
    len: u64,
}

impl ScratchWriter {
    /// Append payload bytes.
    pub async fn append(&mut self, data: &[u8]) -> StorageResult<()> {
        self.file.write_all(data).await?;
        self.len += data.len() as u64;
        Ok(())
    }

    /// Flush and close the writer, yielding the finished spool file.
    pub async fn finish(mut self) -> StorageResult<ScratchFile> {
        self.file.flush().await?;
        Ok(ScratchFile {
            path: std::mem::take(&mut self.path),
            len: self.len,
            removed: false,
        })
    }
}

impl Drop for ScratchWriter {
    fn drop(&mut self) {
        // finish() moves the path out; a non-empty path means the writer was
        // abandoned mid-spool and the partial file must go.
        if !self.path.as_os_str().is_empty() {
            let _ = std::fs::remove_file(&self.path);
        }
    }
}

/// A fully spooled payload awaiting its target write.
///
/// Deletes itself on drop as a backstop; callers remove it explicitly on the
/// happy path.
pub struct ScratchFile {
    path: PathBuf,
    len: u64,
    removed: bool,
}

impl ScratchFile {
    /// Path of the spool file.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Spooled payload length in bytes.
    pub fn len(&self) -> u64 {
        self.len
    }

    /// Whether the spooled payload is empty.
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Remove the spool file.
    pub async fn remove(mut self) -> StorageResult<()> {
        self.removed = true;
        match fs::remove_file(&self.path).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(StorageError::Io(e)),
        }
    }
}

impl Drop for ScratchFile {
    fn drop(&mut self) {
        if !self.removed {
            let _ = std::fs::remove_file(&self.path);
        }
    }
}
