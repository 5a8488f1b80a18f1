//! Minimal ZIP container peek.
//!
//! Lists entry names from an archive's central directory without extracting
//! or decompressing anything. Only enough of the format is understood to walk
//! the end-of-central-directory record and the central directory headers;
//! multi-disk and ZIP64 archives are reported as malformed. Callers treat
//! every error here as a tolerated peek failure.

use crate::error::{StorageError, StorageResult};
use std::path::Path;
use tokio::fs;
use tokio::io::{AsyncReadExt, AsyncSeekExt, SeekFrom};

/// End-of-central-directory signature ("PK\x05\x06").
const EOCD_SIG: [u8; 4] = [0x50, 0x4b, 0x05, 0x06];
/// Central directory file header signature ("PK\x01\x02").
const CDFH_SIG: [u8; 4] = [0x50, 0x4b, 0x01, 0x02];
/// Fixed size of the end-of-central-directory record (without comment).
const EOCD_LEN: u64 = 22;
/// Fixed size of a central directory file header (without variable fields).
const CDFH_LEN: usize = 46;
/// The EOCD may be followed by a comment of up to 65535 bytes.
const MAX_EOCD_SEARCH: u64 = EOCD_LEN + 65535;
/// Refuse to load unreasonable central directories into memory.
const MAX_CD_SIZE: u64 = 16 * 1024 * 1024;

fn u16_le(buf: &[u8], pos: usize) -> u16 {
    u16::from_le_bytes([buf[pos], buf[pos + 1]])
}

fn u32_le(buf: &[u8], pos: usize) -> u32 {
    u32::from_le_bytes([buf[pos], buf[pos + 1], buf[pos + 2], buf[pos + 3]])
}

/// List up to `limit` entry names that sit at the archive root: names with no
/// `/` at all, or directory markers ending in `/`.
pub async fn list_root_entries(path: &Path, limit: usize) -> StorageResult<Vec<String>> {
    let mut file = fs::File::open(path).await?;
    let file_len = file.metadata().await?.len();
    if file_len < EOCD_LEN {
        return Err(StorageError::InvalidArchive(
            "file too short for an end-of-central-directory record".to_string(),
        ));
    }

    // Scan the file tail backwards for the EOCD signature.
    let tail_len = file_len.min(MAX_EOCD_SEARCH);
    let tail_start = file_len - tail_len;
    file.seek(SeekFrom::Start(tail_start)).await?;
    let mut tail = vec![0u8; tail_len as usize];
    file.read_exact(&mut tail).await?;

    let eocd_pos = (0..=tail.len().saturating_sub(EOCD_LEN as usize))
        .rev()
        .find(|&i| tail[i..i + 4] == EOCD_SIG)
        .ok_or_else(|| {
            StorageError::InvalidArchive(
                "end-of-central-directory signature not found".to_string(),
            )
        })?;
    let eocd = &tail[eocd_pos..];

    let disk_number = u16_le(eocd, 4);
    let cd_disk = u16_le(eocd, 6);
    if disk_number != 0 || cd_disk != 0 {
        return Err(StorageError::InvalidArchive(
            "multi-disk archives not supported".to_string(),
        ));
    }

    let total_entries = u16_le(eocd, 10) as usize;
    let cd_size = u32_le(eocd, 12) as u64;
    let cd_offset = u32_le(eocd, 16) as u64;
    if cd_size > MAX_CD_SIZE {
        return Err(StorageError::InvalidArchive(format!(
            "central directory too large: {cd_size} bytes"
        )));
    }
    if cd_offset.checked_add(cd_size).is_none_or(|end| end > file_len) {
        return Err(StorageError::InvalidArchive(
            "central directory extends past end of file".to_string(),
        ));
    }

    file.seek(SeekFrom::Start(cd_offset)).await?;
    let mut cd = vec![0u8; cd_size as usize];
    file.read_exact(&mut cd).await?;

    let mut entries = Vec::new();
    let mut pos = 0usize;
    for _ in 0..total_entries {
        if entries.len() >= limit {
            break;
        }
        if pos + CDFH_LEN > cd.len() || cd[pos..pos + 4] != CDFH_SIG {
            return Err(StorageError::InvalidArchive(
                "truncated central directory header".to_string(),
            ));
        }
        let name_len = u16_le(&cd, pos + 28) as usize;
        let extra_len = u16_le(&cd, pos + 30) as usize;
        let comment_len = u16_le(&cd, pos + 32) as usize;
        let name_start = pos + CDFH_LEN;
        let name_end = name_start + name_len;
        if name_end > cd.len() {
            return Err(StorageError::InvalidArchive(
                "entry name extends past central directory".to_string(),
            ));
        }
        let name = String::from_utf8_lossy(&cd[name_start..name_end]).into_owned();
        if !name.contains('/') || name.ends_with('/') {
            entries.push(name);
        }
        pos = name_end + extra_len + comment_len;
    }

    Ok(entries)
}
