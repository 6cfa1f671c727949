//! Reads what a previous run left in the destination directory.

use std::collections::HashMap;
use std::io;
use std::path::Path;

use super::state::ResumeState;
use crate::error::DownloadError;
use crate::manifest::RemoteManifest;
use crate::planner::target_path;
use crate::storage::{read_verified, sidecar_path, temp_path, verified_path};

/// Local observations for one remote file.
#[derive(Debug, Clone, Default)]
pub struct LocalFile {
    /// Length of the final file, if one exists.
    pub final_len: Option<u64>,
    /// Content hash recorded when the final file was promoted.
    pub verified: Option<String>,
    /// Sidecar whose temp file exists with the recorded size.
    pub resume: Option<ResumeState>,
}

/// Local state for every file of a manifest, keyed by registry path.
#[derive(Debug, Clone, Default)]
pub struct LocalSnapshot {
    files: HashMap<String, LocalFile>,
}

impl LocalSnapshot {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, remote_path: impl Into<String>, local: LocalFile) {
        self.files.insert(remote_path.into(), local);
    }

    pub fn get(&self, remote_path: &str) -> Option<&LocalFile> {
        self.files.get(remote_path)
    }
}

/// Builds a [`LocalSnapshot`] for `manifest` under `dest_dir`.
///
/// Sidecars are ignored (not deleted) when their temp file is missing or not
/// the recorded size, or when they cannot be parsed; the planner then starts
/// those files from zero. Paths that escape `dest_dir` are skipped here and
/// rejected by the planner.
pub fn scan_local(manifest: &RemoteManifest, dest_dir: &Path) -> Result<LocalSnapshot, DownloadError> {
    let mut snapshot = LocalSnapshot::new();
    for file in &manifest.files {
        let Ok(target) = target_path(dest_dir, &file.path) else {
            continue;
        };
        let final_len = match std::fs::metadata(&target) {
            Ok(m) if m.is_file() => Some(m.len()),
            Ok(_) => None,
            Err(e) if e.kind() == io::ErrorKind::NotFound => None,
            Err(e) => return Err(DownloadError::disk_io(&target, e)),
        };

        let verified = match final_len {
            Some(_) => read_verified(&target)
                .map_err(|e| DownloadError::disk_io(verified_path(&target), e))?,
            None => None,
        };

        let sidecar = sidecar_path(&target);
        let resume = match ResumeState::load(&sidecar) {
            Ok(Some(state)) => {
                let temp = temp_path(&target);
                match std::fs::metadata(&temp) {
                    Ok(m) if m.len() == state.total_size => Some(state),
                    Ok(m) => {
                        tracing::debug!(
                            path = %file.path,
                            temp_len = m.len(),
                            recorded = state.total_size,
                            "ignoring sidecar: temp file has wrong size"
                        );
                        None
                    }
                    Err(_) => {
                        tracing::debug!(path = %file.path, "ignoring sidecar: temp file missing");
                        None
                    }
                }
            }
            Ok(None) => None,
            Err(e) if e.kind() == io::ErrorKind::InvalidData => {
                tracing::warn!(path = %file.path, error = %e, "ignoring unreadable sidecar");
                None
            }
            Err(e) => return Err(DownloadError::disk_io(&sidecar, e)),
        };

        snapshot.insert(
            file.path.clone(),
            LocalFile {
                final_len,
                verified,
                resume,
            },
        );
    }
    Ok(snapshot)
}
