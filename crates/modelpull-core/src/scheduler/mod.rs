//! Chunk scheduler.
//!
//! Runs a [`TransferPlan`](crate::planner::TransferPlan) on a pool of worker
//! threads: chunks of all files share one queue, admission is bounded per
//! file and per host, and the coordinator handles retries, single-stream
//! fallback, verification and promotion.

mod budget;
mod host;
mod outcome;
mod progress;
mod queue;
mod run;
mod task;
mod worker;

pub use budget::{ConnectionBudget, SlotGuard};
pub use host::{HostBudgets, HostKey};
pub use outcome::{FileOutcome, FileReport, RunReport};
pub use progress::{ProgressEvent, ProgressStats};
pub use run::run;
pub use task::{ChunkTask, FailKind, TaskState};

use crate::config::ModelPullConfig;
use crate::downloader::CurlOptions;
use crate::retry::RetryPolicy;

/// Limits and transfer settings for one run.
#[derive(Debug, Clone)]
pub struct RunOptions {
    /// Worker threads, i.e. the global connection limit.
    pub max_concurrency: usize,
    pub max_per_file: usize,
    pub max_per_host: usize,
    pub chunk_size: u64,
    pub retry: RetryPolicy,
    pub curl: CurlOptions,
}

impl RunOptions {
    pub fn from_config(cfg: &ModelPullConfig, bearer_token: Option<String>) -> Self {
        Self {
            max_concurrency: cfg.max_total_connections.max(1),
            max_per_file: cfg.max_connections_per_file.max(1),
            max_per_host: cfg.max_connections_per_host.max(1),
            chunk_size: cfg.chunk_size_bytes.max(1),
            retry: cfg.retry_policy(),
            curl: CurlOptions::from_config(cfg, bearer_token),
        }
    }
}

impl Default for RunOptions {
    fn default() -> Self {
        Self::from_config(&ModelPullConfig::default(), None)
    }
}
