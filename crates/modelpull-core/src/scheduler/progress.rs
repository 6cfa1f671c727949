//! Progress reporting for a run (bytes done, ETA, rate) and the event stream.
//!
//! Consumers compute rate = bytes_transferred / elapsed_secs and
//! ETA = (total_bytes - bytes_done) / rate.

use std::path::PathBuf;
use std::time::Duration;

use crate::segmenter::ByteRange;

/// Snapshot of aggregate progress across all files of a run.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ProgressStats {
    /// Bytes present on disk for the run's files (resumed + newly written).
    pub bytes_done: u64,
    /// Bytes fetched over the network in this run.
    pub bytes_transferred: u64,
    /// Total size of all files.
    pub total_bytes: u64,
    /// Elapsed time since the run started (seconds).
    pub elapsed_secs: f64,
    pub files_done: usize,
    pub file_count: usize,
    /// Chunks that succeeded only after at least one retry.
    pub chunks_recovered: usize,
}

impl ProgressStats {
    /// Network rate in bytes per second (0 if elapsed is 0).
    pub fn bytes_per_sec(&self) -> f64 {
        if self.elapsed_secs <= 0.0 {
            return 0.0;
        }
        self.bytes_transferred as f64 / self.elapsed_secs
    }

    /// Estimated seconds remaining (None if rate is 0).
    pub fn eta_secs(&self) -> Option<f64> {
        let remaining = self.total_bytes.saturating_sub(self.bytes_done);
        if remaining == 0 {
            return Some(0.0);
        }
        let rate = self.bytes_per_sec();
        if rate <= 0.0 {
            return None;
        }
        Some(remaining as f64 / rate)
    }

    /// Fraction complete in [0.0, 1.0].
    pub fn fraction(&self) -> f64 {
        if self.total_bytes == 0 {
            return 1.0;
        }
        (self.bytes_done as f64 / self.total_bytes as f64).min(1.0)
    }
}

/// Events emitted while a reference is pulled. `file` is always the
/// registry path.
#[derive(Debug, Clone, PartialEq)]
pub enum ProgressEvent {
    Resolved {
        reference: String,
        files: usize,
        total_bytes: u64,
    },
    /// Earlier progress for a file was thrown away.
    ResumeDiscarded { file: String, reason: String },
    FileStarted {
        file: String,
        total_bytes: u64,
        resumed_bytes: u64,
    },
    /// Durable coverage of `file` is now `bytes_written` of `total_bytes`.
    ChunkWritten {
        file: String,
        bytes_written: u64,
        total_bytes: u64,
    },
    ChunkRetry {
        file: String,
        range: ByteRange,
        attempt: u32,
        delay: Duration,
        reason: String,
    },
    /// Server ignored range requests; the file is fetched in one stream.
    StreamFallback { file: String },
    Verifying { file: String },
    FileCompleted { file: String, path: PathBuf },
    FileFailed {
        file: String,
        error: String,
        retryable: bool,
    },
    Stats(ProgressStats),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rate_and_eta() {
        let s = ProgressStats {
            bytes_done: 600,
            bytes_transferred: 400,
            total_bytes: 1000,
            elapsed_secs: 2.0,
            files_done: 0,
            file_count: 1,
            chunks_recovered: 0,
        };
        assert_eq!(s.bytes_per_sec(), 200.0);
        assert_eq!(s.eta_secs(), Some(2.0));
        assert!((s.fraction() - 0.6).abs() < 1e-9);
    }

    #[test]
    fn empty_run_is_done() {
        let s = ProgressStats::default();
        assert_eq!(s.fraction(), 1.0);
        assert_eq!(s.eta_secs(), Some(0.0));
        assert_eq!(s.bytes_per_sec(), 0.0);
    }
}
