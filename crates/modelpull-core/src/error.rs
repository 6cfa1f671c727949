//! Typed errors surfaced by the core.
//!
//! Resolution-time kinds are fatal and never retried. Transfer-time kinds are
//! attached to a single file through [`FileFailure`]; one file failing never
//! aborts its siblings.

use std::fmt;
use std::path::PathBuf;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum DownloadError {
    #[error("invalid model reference {input:?}: {reason} (expected owner/name[:quant])")]
    InvalidReference { input: String, reason: &'static str },

    #[error("quant tag {tag:?} is ambiguous; candidates: {}", candidates.join(", "))]
    AmbiguousQuant { tag: String, candidates: Vec<String> },

    #[error("{repo} has no default variant; specify a quant tag (owner/name:TAG)")]
    QuantRequired { repo: String },

    #[error("no model files in {repo} match quant tag {tag:?}")]
    QuantNotFound { repo: String, tag: String },

    #[error("shard set {set} is incomplete: expected {expected} parts, found {found:?}")]
    IncompleteShardSet {
        set: String,
        expected: u32,
        found: Vec<u32>,
    },

    #[error("registry request {url} failed: {reason}")]
    Registry { url: String, reason: String },

    #[error("remote path {path:?} escapes the destination directory")]
    PathEscape { path: String },

    #[error("{path}: network error after {attempts} attempt(s): {reason}")]
    NetworkTransient {
        path: String,
        attempts: u32,
        reason: String,
    },

    #[error("{path}: server ignored the range request")]
    RangeUnsupported { path: String },

    #[error("{path}: HTTP {status}")]
    Http { path: String, status: u32 },

    #[error("{path}: content hash mismatch (expected {expected}, got {actual})")]
    HashMismatch {
        path: String,
        expected: String,
        actual: String,
    },

    #[error("disk I/O error on {}: {source}", path.display())]
    DiskIo {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error(
        "insufficient disk space in {}: need {required} bytes, {available} available",
        dir.display()
    )]
    InsufficientSpace {
        dir: PathBuf,
        required: u64,
        available: u64,
    },

    #[error("download cancelled")]
    Cancelled,

    #[error("{} file(s) failed: {}", failures.len(), join_failures(failures))]
    FilesFailed { failures: Vec<(String, FileFailure)> },
}

impl DownloadError {
    pub(crate) fn disk_io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        DownloadError::DiskIo {
            path: path.into(),
            source,
        }
    }
}

fn join_failures(failures: &[(String, FileFailure)]) -> String {
    failures
        .iter()
        .map(|(path, failure)| format!("{path}: {failure}"))
        .collect::<Vec<_>>()
        .join("; ")
}

/// Terminal failure of a single file.
///
/// `Retryable` failures leave resume state in place so a later run continues
/// where this one stopped; `Fatal` ones need a change on the remote or local
/// side before retrying makes sense.
#[derive(Debug)]
pub enum FileFailure {
    Retryable(DownloadError),
    Fatal(DownloadError),
}

impl FileFailure {
    pub fn error(&self) -> &DownloadError {
        match self {
            FileFailure::Retryable(e) | FileFailure::Fatal(e) => e,
        }
    }

    pub fn is_retryable(&self) -> bool {
        matches!(self, FileFailure::Retryable(_))
    }
}

impl fmt::Display for FileFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FileFailure::Retryable(e) => write!(f, "{} (retryable)", e),
            FileFailure::Fatal(e) => write!(f, "{}", e),
        }
    }
}
