//! Streaming file digests.

use crate::error::StorageResult;
use std::path::Path;
use stevedore_core::hash::ContentHasher;
use tokio::fs;
use tokio::io::AsyncReadExt;

/// Buffer size for streaming digest reads.
const DIGEST_BUF_SIZE: usize = 64 * 1024;

/// Sequential SHA-256 over a whole file, returned as lowercase hex.
///
/// Reads in fixed-size buffers so memory use is independent of file size.
pub async fn sha256_file(path: &Path) -> StorageResult<String> {
    let mut file = fs::File::open(path).await?;
    let mut hasher = ContentHasher::new();
    let mut buf = vec![0u8; DIGEST_BUF_SIZE];
    loop {
        let n = file.read(&mut buf).await?;
        if n == 0 {
            break;
        }
        hasher.update(&buf[..n]);
    }
    Ok(hasher.finalize().to_hex())
}
