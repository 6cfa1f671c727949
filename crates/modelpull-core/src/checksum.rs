//! Checksum verification (SHA-256) of completed temp files.
//!
//! Runs after all chunks of a file are durable, never inline with the
//! transfer path, so hashing does not compete with network throughput.

use anyhow::{Context, Result};
use sha2::{Digest, Sha256};
use std::fs::File;
use std::io::Read;
use std::path::Path;

use crate::error::DownloadError;
use crate::manifest::ContentHash;

const BUF_SIZE: usize = 64 * 1024;

/// Compute SHA-256 of a file and return the digest as lowercase hex.
/// Reads in chunks to keep memory use bounded; suitable for large files.
pub fn sha256_path(path: &Path) -> Result<String> {
    let mut f = File::open(path).with_context(|| format!("open {}", path.display()))?;
    let mut hasher = Sha256::new();
    let mut buf = vec![0u8; BUF_SIZE];
    loop {
        let n = f
            .read(&mut buf)
            .with_context(|| format!("read {}", path.display()))?;
        if n == 0 {
            break;
        }
        hasher.update(&buf[..n]);
    }
    Ok(hex::encode(hasher.finalize()))
}

/// Checks `path` against the expected size and content hash.
///
/// `display_path` names the file in the returned error (the registry path,
/// not the temp file). Size is always checked; the digest only when the
/// registry reported one.
pub fn verify_file(
    path: &Path,
    display_path: &str,
    expected: &ContentHash,
    expected_size: u64,
) -> Result<(), DownloadError> {
    let meta = std::fs::metadata(path).map_err(|e| DownloadError::disk_io(path, e))?;
    if meta.len() != expected_size {
        return Err(DownloadError::HashMismatch {
            path: display_path.to_string(),
            expected: format!("{expected_size} bytes"),
            actual: format!("{} bytes", meta.len()),
        });
    }
    let ContentHash::Sha256(want) = expected else {
        return Ok(());
    };
    let got = sha256_path(path).map_err(|e| {
        let source = e
            .downcast::<std::io::Error>()
            .unwrap_or_else(|e| std::io::Error::new(std::io::ErrorKind::Other, e.to_string()));
        DownloadError::disk_io(path, source)
    })?;
    if !got.eq_ignore_ascii_case(want) {
        return Err(DownloadError::HashMismatch {
            path: display_path.to_string(),
            expected: want.to_ascii_lowercase(),
            actual: got,
        });
    }
    tracing::debug!(path = %display_path, "sha256 verified");
    Ok(())
}
