//! Transfer planning: which byte ranges of which files still need fetching.
//!
//! Planning is pure. [`crate::resume::scan_local`] reads the disk and hands
//! the result in as a [`LocalSnapshot`].

use std::path::{Component, Path, PathBuf};

use crate::error::DownloadError;
use crate::manifest::{RemoteFile, RemoteManifest};
use crate::reference::ModelReference;
use crate::resume::{validate_for_resume, LocalSnapshot, ResumeState};
use crate::segmenter::ByteRange;
use crate::storage::{sidecar_path, temp_path};

/// How a file enters this run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FileStatus {
    /// No usable local state.
    Fresh,
    /// Continuing from a valid sidecar.
    Resuming,
    /// Local state existed but no longer matches the remote file.
    Restarted(String),
    /// Final file already present with the expected size, verified against
    /// the current remote hash.
    AlreadyPresent,
}

/// Plan for a single remote file.
#[derive(Debug, Clone)]
pub struct FilePlan {
    pub file: RemoteFile,
    /// Final location under the destination directory.
    pub target: PathBuf,
    pub temp_path: PathBuf,
    pub sidecar_path: PathBuf,
    /// Gaps of `[0, size)` not covered by `resume.ranges`, in order.
    pub missing: Vec<ByteRange>,
    pub resume: ResumeState,
    pub status: FileStatus,
}

impl FilePlan {
    pub fn needs_transfer(&self) -> bool {
        self.status != FileStatus::AlreadyPresent
    }

    pub fn remaining_bytes(&self) -> u64 {
        self.missing.iter().map(ByteRange::len).sum()
    }

    /// True when the run creates (and preallocates) a new temp file.
    pub fn needs_new_temp(&self) -> bool {
        matches!(self.status, FileStatus::Fresh | FileStatus::Restarted(_))
    }
}

#[derive(Debug, Clone)]
pub struct TransferPlan {
    pub reference: ModelReference,
    pub dest_dir: PathBuf,
    pub files: Vec<FilePlan>,
}

impl TransferPlan {
    pub fn total_bytes(&self) -> u64 {
        self.files.iter().map(|f| f.file.size_bytes).sum()
    }

    pub fn remaining_bytes(&self) -> u64 {
        self.files.iter().map(FilePlan::remaining_bytes).sum()
    }

    /// Files whose earlier progress was thrown away, with the reason.
    pub fn discarded(&self) -> impl Iterator<Item = (&str, &str)> {
        self.files.iter().filter_map(|f| match &f.status {
            FileStatus::Restarted(reason) => Some((f.file.path.as_str(), reason.as_str())),
            _ => None,
        })
    }
}

/// Joins a registry path onto `dest_dir`, refusing anything that could land
/// outside it: absolute paths, `.`/`..`/empty components, backslashes.
pub fn target_path(dest_dir: &Path, remote_path: &str) -> Result<PathBuf, DownloadError> {
    let escape = || DownloadError::PathEscape {
        path: remote_path.to_string(),
    };
    if remote_path.is_empty() || remote_path.contains('\\') || remote_path.starts_with('/') {
        return Err(escape());
    }
    let mut out = dest_dir.to_path_buf();
    for part in remote_path.split('/') {
        if part.is_empty() || part == "." || part == ".." {
            return Err(escape());
        }
        let mut comps = Path::new(part).components();
        match (comps.next(), comps.next()) {
            (Some(Component::Normal(_)), None) => out.push(part),
            _ => return Err(escape()),
        }
    }
    Ok(out)
}

/// Computes the transfer plan for `manifest` into `dest_dir`.
pub fn plan(
    manifest: &RemoteManifest,
    dest_dir: &Path,
    local: &LocalSnapshot,
) -> Result<TransferPlan, DownloadError> {
    let mut files = Vec::with_capacity(manifest.files.len());
    for file in &manifest.files {
        files.push(plan_file(file, dest_dir, local)?);
    }
    Ok(TransferPlan {
        reference: manifest.reference.clone(),
        dest_dir: dest_dir.to_path_buf(),
        files,
    })
}

fn plan_file(file: &RemoteFile, dest_dir: &Path, local: &LocalSnapshot) -> Result<FilePlan, DownloadError> {
    let target = target_path(dest_dir, &file.path)?;
    let fresh = ResumeState::new(file);
    let whole = if file.size_bytes == 0 {
        Vec::new()
    } else {
        vec![ByteRange::new(0, file.size_bytes)]
    };
    let mut plan = FilePlan {
        file: file.clone(),
        temp_path: temp_path(&target),
        sidecar_path: sidecar_path(&target),
        target,
        missing: whole,
        resume: fresh,
        status: FileStatus::Fresh,
    };

    let Some(entry) = local.get(&file.path) else {
        return Ok(plan);
    };
    if entry.final_len == Some(file.size_bytes) {
        let expected = file.content_hash.to_string();
        if entry.verified.as_deref() == Some(expected.as_str()) {
            plan.missing.clear();
            plan.resume.ranges.insert(ByteRange::new(0, file.size_bytes));
            plan.status = FileStatus::AlreadyPresent;
            return Ok(plan);
        }
        let reason = match entry.verified {
            Some(_) => "remote file changed since it was verified",
            None => "final file has no verified hash",
        };
        tracing::info!(path = %file.path, reason, "downloading present file again");
        plan.status = FileStatus::Restarted(reason.to_string());
    }
    if let Some(state) = &entry.resume {
        match validate_for_resume(state, file) {
            Ok(()) => {
                plan.missing = state.ranges.gaps(file.size_bytes);
                plan.resume = state.clone();
                plan.status = FileStatus::Resuming;
            }
            Err(reason) => {
                tracing::info!(path = %file.path, %reason, "discarding resume state");
                plan.status = FileStatus::Restarted(reason.to_string());
            }
        }
    }
    Ok(plan)
}
