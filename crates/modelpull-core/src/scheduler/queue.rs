//! Shared work queue with per-file and per-host admission.

use std::collections::VecDeque;
use std::sync::{Arc, Condvar, Mutex, MutexGuard};
use std::time::{Duration, Instant};

use super::budget::{ConnectionBudget, SlotGuard};
use super::task::ChunkTask;
use crate::storage::DestinationWriter;

/// Longest a worker sleeps before rescanning the queue.
const IDLE_WAIT: Duration = Duration::from_millis(50);

/// Everything a worker needs to process jobs of one file.
pub(crate) struct FileContext {
    pub index: usize,
    /// Registry path.
    pub path: String,
    pub url: String,
    pub writer: DestinationWriter,
    pub file_budget: Arc<ConnectionBudget>,
    pub host_budget: Arc<ConnectionBudget>,
}

pub(crate) enum JobKind {
    Chunk(ChunkTask),
    /// Whole-file GET; needs the file to have nothing else in flight.
    Stream(ChunkTask),
    Verify,
}

pub(crate) struct Job {
    pub ctx: Arc<FileContext>,
    /// Writer generation the job was created for.
    pub generation: u64,
    pub kind: JobKind,
    pub not_before: Option<Instant>,
}

/// Connection slots held while a job runs.
pub(crate) struct Permit {
    _file: Option<SlotGuard>,
    _host: Option<SlotGuard>,
}

impl Job {
    fn admit(&self) -> Option<Permit> {
        let ctx = &self.ctx;
        let file = match self.kind {
            JobKind::Chunk(_) => ctx.file_budget.try_acquire()?,
            JobKind::Stream(_) => ctx.file_budget.try_acquire_exclusive()?,
            JobKind::Verify => {
                return Some(Permit {
                    _file: None,
                    _host: None,
                })
            }
        };
        let host = ctx.host_budget.try_acquire()?;
        Some(Permit {
            _file: Some(file),
            _host: Some(host),
        })
    }
}

struct QueueState {
    jobs: VecDeque<Job>,
    closed: bool,
}

pub(crate) struct WorkQueue {
    state: Mutex<QueueState>,
    ready: Condvar,
}

impl WorkQueue {
    pub fn new() -> Self {
        Self {
            state: Mutex::new(QueueState {
                jobs: VecDeque::new(),
                closed: false,
            }),
            ready: Condvar::new(),
        }
    }

    fn lock(&self) -> MutexGuard<'_, QueueState> {
        self.state.lock().unwrap_or_else(|p| p.into_inner())
    }

    pub fn push(&self, job: Job) {
        self.lock().jobs.push_back(job);
        self.ready.notify_one();
    }

    /// Wakes idle workers, e.g. after connection slots were released.
    pub fn notify(&self) {
        self.ready.notify_all();
    }

    /// Drops every queued job of `file`; returns how many were removed.
    pub fn drain_file(&self, file: usize) -> usize {
        let mut st = self.lock();
        let before = st.jobs.len();
        st.jobs.retain(|j| j.ctx.index != file);
        before - st.jobs.len()
    }

    /// Stops dispatch: queued jobs are dropped and `pop` returns None.
    pub fn close(&self) {
        let mut st = self.lock();
        st.closed = true;
        st.jobs.clear();
        drop(st);
        self.ready.notify_all();
    }

    /// Blocks until a job is due and admitted, or the queue is closed.
    /// Jobs are scanned in FIFO order; one that cannot be admitted is
    /// skipped so other files make progress.
    pub fn pop(&self) -> Option<(Job, Permit)> {
        let mut st = self.lock();
        loop {
            if st.closed {
                return None;
            }
            let now = Instant::now();
            let mut wait = IDLE_WAIT;
            let mut pick = None;
            for (i, job) in st.jobs.iter().enumerate() {
                if let Some(at) = job.not_before {
                    if at > now {
                        wait = wait.min(at - now);
                        continue;
                    }
                }
                if let Some(permit) = job.admit() {
                    pick = Some((i, permit));
                    break;
                }
            }
            if let Some((i, permit)) = pick {
                if let Some(job) = st.jobs.remove(i) {
                    return Some((job, permit));
                }
            }
            st = self
                .ready
                .wait_timeout(st, wait)
                .unwrap_or_else(|p| p.into_inner())
                .0;
        }
    }
}
