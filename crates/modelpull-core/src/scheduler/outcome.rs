//! Terminal per-file outcomes and the run report.

use std::path::PathBuf;

use super::progress::ProgressStats;
use crate::error::{DownloadError, FileFailure};

#[derive(Debug)]
pub enum FileOutcome {
    /// Downloaded, verified and promoted in this run.
    Completed,
    /// Final file was already on disk.
    AlreadyPresent,
    Failed(FileFailure),
}

#[derive(Debug)]
pub struct FileReport {
    /// Registry path.
    pub file: String,
    pub target: PathBuf,
    pub outcome: FileOutcome,
}

#[derive(Debug)]
pub struct RunReport {
    pub files: Vec<FileReport>,
    pub stats: ProgressStats,
    pub cancelled: bool,
}

impl RunReport {
    pub fn is_success(&self) -> bool {
        self.files
            .iter()
            .all(|f| !matches!(f.outcome, FileOutcome::Failed(_)))
    }

    /// Final paths in manifest order, or the aggregated error.
    ///
    /// A cancelled run where every failure is the cancellation itself is
    /// `Cancelled`; otherwise every failed file is listed in `FilesFailed`.
    pub fn into_result(self) -> Result<Vec<PathBuf>, DownloadError> {
        let mut paths = Vec::new();
        let mut failures = Vec::new();
        for f in self.files {
            match f.outcome {
                FileOutcome::Completed | FileOutcome::AlreadyPresent => paths.push(f.target),
                FileOutcome::Failed(failure) => failures.push((f.file, failure)),
            }
        }
        if failures.is_empty() {
            return Ok(paths);
        }
        let only_cancelled = failures
            .iter()
            .all(|(_, f)| matches!(f.error(), DownloadError::Cancelled));
        if self.cancelled && only_cancelled {
            return Err(DownloadError::Cancelled);
        }
        Err(DownloadError::FilesFailed { failures })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn report(outcomes: Vec<FileOutcome>, cancelled: bool) -> RunReport {
        RunReport {
            files: outcomes
                .into_iter()
                .enumerate()
                .map(|(i, outcome)| FileReport {
                    file: format!("f{i}.gguf"),
                    target: PathBuf::from(format!("/d/f{i}.gguf")),
                    outcome,
                })
                .collect(),
            stats: ProgressStats::default(),
            cancelled,
        }
    }

    #[test]
    fn success_lists_paths_in_order() {
        let r = report(vec![FileOutcome::AlreadyPresent, FileOutcome::Completed], false);
        assert!(r.is_success());
        assert_eq!(
            r.into_result().unwrap(),
            vec![PathBuf::from("/d/f0.gguf"), PathBuf::from("/d/f1.gguf")]
        );
    }

    #[test]
    fn one_failure_keeps_siblings_but_fails_run() {
        let r = report(
            vec![
                FileOutcome::Completed,
                FileOutcome::Failed(FileFailure::Fatal(DownloadError::Http {
                    path: "f1.gguf".to_string(),
                    status: 404,
                })),
            ],
            false,
        );
        assert!(!r.is_success());
        match r.into_result() {
            Err(DownloadError::FilesFailed { failures }) => {
                assert_eq!(failures.len(), 1);
                assert_eq!(failures[0].0, "f1.gguf");
                assert!(!failures[0].1.is_retryable());
            }
            other => panic!("expected FilesFailed, got {other:?}"),
        }
    }

    #[test]
    fn cancellation_is_reported_as_such() {
        let r = report(
            vec![
                FileOutcome::Completed,
                FileOutcome::Failed(FileFailure::Retryable(DownloadError::Cancelled)),
            ],
            true,
        );
        assert!(matches!(r.into_result(), Err(DownloadError::Cancelled)));
    }
}
