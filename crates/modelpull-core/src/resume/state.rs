//! On-disk resume sidecar (`<final>.resume`).

use serde::{Deserialize, Serialize};
use std::fs;
use std::io;
use std::path::Path;

use crate::manifest::{ContentHash, RemoteFile};
use crate::segmenter::RangeSet;
use crate::storage::write_atomic;

/// Bumped whenever the sidecar layout changes; older sidecars are discarded.
pub const RESUME_FORMAT_VERSION: u32 = 1;

/// Byte ranges of a temp file known to be durable, plus the identity of the
/// remote file they belong to.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResumeState {
    pub version: u32,
    /// Registry path of the file.
    pub path: String,
    pub total_size: u64,
    pub content_hash: ContentHash,
    pub ranges: RangeSet,
}

impl ResumeState {
    /// Empty state for `file`.
    pub fn new(file: &RemoteFile) -> Self {
        Self {
            version: RESUME_FORMAT_VERSION,
            path: file.path.clone(),
            total_size: file.size_bytes,
            content_hash: file.content_hash.clone(),
            ranges: RangeSet::new(),
        }
    }

    /// Reads a sidecar. `Ok(None)` when it does not exist; unparsable content
    /// is an `InvalidData` error.
    pub fn load(path: &Path) -> io::Result<Option<Self>> {
        let data = match fs::read(path) {
            Ok(d) => d,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(e),
        };
        serde_json::from_slice(&data)
            .map(Some)
            .map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e))
    }

    /// Atomically replaces the sidecar: write `<path>.tmp`, fsync, rename.
    pub fn persist(&self, path: &Path) -> io::Result<()> {
        let json = serde_json::to_vec(self)
            .map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e))?;
        write_atomic(path, &json)
    }

    /// Deletes the sidecar; missing files are not an error.
    pub fn remove(path: &Path) -> io::Result<()> {
        match fs::remove_file(path) {
            Err(e) if e.kind() != io::ErrorKind::NotFound => Err(e),
            _ => Ok(()),
        }
    }
}
