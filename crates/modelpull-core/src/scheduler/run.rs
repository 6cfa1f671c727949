//! Run coordinator.
//!
//! Owns all per-file bookkeeping on one thread. Workers only fetch and
//! write; every decision (retry, stream fallback, re-download after a bad
//! hash, promotion) is taken here from their reports, so no file state is
//! shared beyond the [`DestinationWriter`](crate::storage::DestinationWriter)
//! itself.

use std::path::PathBuf;
use std::sync::mpsc::{self, Receiver, RecvTimeoutError};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use tokio::sync::mpsc::UnboundedSender;

use super::budget::ConnectionBudget;
use super::host::HostBudgets;
use super::outcome::{FileOutcome, FileReport, RunReport};
use super::progress::{ProgressEvent, ProgressStats};
use super::queue::{FileContext, Job, JobKind, WorkQueue};
use super::task::{ChunkTask, FailKind, TaskState};
use super::worker::{worker_loop, Outcome, Report};
use super::RunOptions;
use crate::control::CancelToken;
use crate::error::{DownloadError, FileFailure};
use crate::planner::{FilePlan, FileStatus, TransferPlan};
use crate::retry::{classify, ChunkError, RetryPolicy};
use crate::segmenter::{split_into_chunks, ByteRange};
use crate::storage::DestinationWriter;

const POLL_INTERVAL: Duration = Duration::from_millis(100);
const STATS_INTERVAL: Duration = Duration::from_millis(250);
/// Full downloads of one file before a hash mismatch is final.
const MAX_VERIFY_ATTEMPTS: u32 = 2;

struct FileRun {
    file: String,
    target: PathBuf,
    size: u64,
    ctx: Option<Arc<FileContext>>,
    /// Chunk or stream jobs of the current generation queued or in flight.
    outstanding: usize,
    streaming: bool,
    hash_failures: u32,
    /// Durable bytes as last reported.
    covered: u64,
    outcome: Option<FileOutcome>,
}

struct Coordinator<'a> {
    files: Vec<FileRun>,
    queue: &'a WorkQueue,
    events: &'a UnboundedSender<ProgressEvent>,
    policy: RetryPolicy,
    chunk_size: u64,
    started: Instant,
    transferred: u64,
    recovered: usize,
}

/// Transfers every file of `plan` and returns one outcome per file, in
/// plan order. Blocks until all files finished or `cancel` fired and the
/// workers stopped.
pub fn run(
    plan: &TransferPlan,
    opts: &RunOptions,
    events: &UnboundedSender<ProgressEvent>,
    cancel: &CancelToken,
) -> RunReport {
    let queue = WorkQueue::new();
    let mut coord = Coordinator {
        files: Vec::with_capacity(plan.files.len()),
        queue: &queue,
        events,
        policy: opts.retry,
        chunk_size: opts.chunk_size,
        started: Instant::now(),
        transferred: 0,
        recovered: 0,
    };
    let mut hosts = HostBudgets::new(opts.max_per_host);
    for (index, fp) in plan.files.iter().enumerate() {
        coord.start_file(index, fp, opts.max_per_file, &mut hosts);
    }

    let workers = opts.max_concurrency.max(1);
    tracing::info!(
        reference = %plan.reference,
        files = plan.files.len(),
        remaining = plan.remaining_bytes(),
        workers,
        "transfer started"
    );

    let (tx, rx) = mpsc::channel::<Report>();
    thread::scope(|s| {
        for _ in 0..workers {
            let tx = tx.clone();
            let queue = &queue;
            let curl = &opts.curl;
            s.spawn(move || worker_loop(queue, &tx, curl, cancel));
        }
        drop(tx);
        coord.drive(&rx, cancel);
        queue.close();
        // In-flight reports after close are ignored; waiting for them lets
        // every worker return before the scope joins.
        for _ in rx.iter() {}
    });

    let cancelled = cancel.is_cancelled();
    for run in coord.files.iter_mut().filter(|f| f.outcome.is_none()) {
        let failure = FileFailure::Retryable(DownloadError::Cancelled);
        let _ = coord.events.send(ProgressEvent::FileFailed {
            file: run.file.clone(),
            error: failure.error().to_string(),
            retryable: true,
        });
        run.outcome = Some(FileOutcome::Failed(failure));
    }
    let stats = coord.stats();
    let _ = coord.events.send(ProgressEvent::Stats(stats.clone()));
    if cancelled {
        tracing::info!("transfer cancelled");
    }

    RunReport {
        files: coord
            .files
            .into_iter()
            .map(|f| FileReport {
                file: f.file,
                target: f.target,
                outcome: f.outcome.unwrap_or(FileOutcome::Failed(FileFailure::Retryable(
                    DownloadError::Cancelled,
                ))),
            })
            .collect(),
        stats,
        cancelled,
    }
}

impl<'a> Coordinator<'a> {
    fn emit(&self, event: ProgressEvent) {
        let _ = self.events.send(event);
    }

    fn start_file(&mut self, index: usize, fp: &FilePlan, per_file: usize, hosts: &mut HostBudgets) {
        let file = fp.file.path.clone();
        if let FileStatus::Restarted(reason) = &fp.status {
            tracing::warn!(file = %file, reason = %reason, "discarding earlier progress");
            self.emit(ProgressEvent::ResumeDiscarded {
                file: file.clone(),
                reason: reason.clone(),
            });
        }
        self.files.push(FileRun {
            file: file.clone(),
            target: fp.target.clone(),
            size: fp.file.size_bytes,
            ctx: None,
            outstanding: 0,
            streaming: false,
            hash_failures: 0,
            covered: 0,
            outcome: None,
        });

        if fp.status == FileStatus::AlreadyPresent {
            tracing::info!(file = %file, "already present");
            self.files[index].covered = fp.file.size_bytes;
            self.files[index].outcome = Some(FileOutcome::AlreadyPresent);
            self.emit(ProgressEvent::FileCompleted {
                file,
                path: fp.target.clone(),
            });
            return;
        }

        let writer = match DestinationWriter::open(fp) {
            Ok(w) => w,
            Err(e) => {
                self.fail_file(index, FileFailure::Fatal(e));
                return;
            }
        };
        let resumed = writer.covered_len();
        let ctx = Arc::new(FileContext {
            index,
            path: file.clone(),
            url: fp.file.source_url.clone(),
            writer,
            file_budget: ConnectionBudget::new(per_file),
            host_budget: hosts.for_url(&fp.file.source_url),
        });
        let run = &mut self.files[index];
        run.covered = resumed;
        run.ctx = Some(Arc::clone(&ctx));
        tracing::info!(
            file = %file,
            size = fp.file.size_bytes,
            resumed,
            "file started"
        );
        self.emit(ProgressEvent::FileStarted {
            file,
            total_bytes: fp.file.size_bytes,
            resumed_bytes: resumed,
        });
        self.schedule(index, &ctx, &fp.missing);
    }

    /// Queues chunk jobs for `ranges`, or verification when nothing is
    /// missing.
    fn schedule(&mut self, index: usize, ctx: &Arc<FileContext>, ranges: &[ByteRange]) {
        let generation = ctx.writer.generation();
        let chunks = split_into_chunks(ranges, self.chunk_size);
        if chunks.is_empty() {
            self.queue_verify(index, ctx);
            return;
        }
        self.files[index].outstanding = chunks.len();
        for range in chunks {
            self.queue.push(Job {
                ctx: Arc::clone(ctx),
                generation,
                kind: JobKind::Chunk(ChunkTask::new(index, range)),
                not_before: None,
            });
        }
    }

    fn queue_stream(&mut self, index: usize, ctx: &Arc<FileContext>, generation: u64) {
        self.files[index].outstanding = 1;
        let whole = ByteRange::new(0, ctx.writer.total_size());
        self.queue.push(Job {
            ctx: Arc::clone(ctx),
            generation,
            kind: JobKind::Stream(ChunkTask::new(index, whole)),
            not_before: None,
        });
    }

    fn queue_verify(&mut self, index: usize, ctx: &Arc<FileContext>) {
        self.emit(ProgressEvent::Verifying {
            file: self.files[index].file.clone(),
        });
        self.queue.push(Job {
            ctx: Arc::clone(ctx),
            generation: ctx.writer.generation(),
            kind: JobKind::Verify,
            not_before: None,
        });
    }

    fn all_finished(&self) -> bool {
        self.files.iter().all(|f| f.outcome.is_some())
    }

    fn drive(&mut self, rx: &Receiver<Report>, cancel: &CancelToken) {
        let mut last_stats = Instant::now();
        while !self.all_finished() {
            if cancel.is_cancelled() {
                return;
            }
            match rx.recv_timeout(POLL_INTERVAL) {
                Ok(report) => self.handle(report),
                Err(RecvTimeoutError::Timeout) => {}
                Err(RecvTimeoutError::Disconnected) => return,
            }
            if last_stats.elapsed() >= STATS_INTERVAL {
                self.emit(ProgressEvent::Stats(self.stats()));
                last_stats = Instant::now();
            }
        }
    }

    fn stats(&self) -> ProgressStats {
        ProgressStats {
            bytes_done: self.files.iter().map(|f| f.covered).sum(),
            bytes_transferred: self.transferred,
            total_bytes: self.files.iter().map(|f| f.size).sum(),
            elapsed_secs: self.started.elapsed().as_secs_f64(),
            files_done: self
                .files
                .iter()
                .filter(|f| {
                    matches!(
                        f.outcome,
                        Some(FileOutcome::Completed) | Some(FileOutcome::AlreadyPresent)
                    )
                })
                .count(),
            file_count: self.files.len(),
            chunks_recovered: self.recovered,
        }
    }

    fn record_covered(&mut self, index: usize, covered: u64) {
        let run = &mut self.files[index];
        self.transferred += covered.saturating_sub(run.covered);
        run.covered = covered;
        let event = ProgressEvent::ChunkWritten {
            file: run.file.clone(),
            bytes_written: covered,
            total_bytes: run.size,
        };
        self.emit(event);
    }

    fn handle(&mut self, report: Report) {
        let Report {
            file: index,
            generation,
            kind,
            outcome,
        } = report;
        let run = &self.files[index];
        if run.outcome.is_some() {
            return;
        }
        let Some(ctx) = run.ctx.clone() else {
            return;
        };
        if generation != ctx.writer.generation() {
            return;
        }
        match outcome {
            Outcome::Stale => {}
            Outcome::StreamProgress { covered } => self.record_covered(index, covered),
            Outcome::Written { covered, complete } => {
                if let JobKind::Chunk(mut task) | JobKind::Stream(mut task) = kind {
                    task.succeed();
                    if task.attempt > 1 {
                        self.recovered += 1;
                        tracing::info!(
                            file = %ctx.path,
                            range = %task.range.curl_range(),
                            attempts = task.attempt,
                            "chunk recovered after retry"
                        );
                    }
                }
                self.record_covered(index, covered);
                let run = &mut self.files[index];
                run.outstanding = run.outstanding.saturating_sub(1);
                if run.outstanding > 0 {
                    return;
                }
                if complete {
                    self.queue_verify(index, &ctx);
                } else {
                    let gaps = ctx.writer.gaps();
                    tracing::debug!(file = %ctx.path, gaps = gaps.len(), "rescheduling uncovered ranges");
                    self.schedule(index, &ctx, &gaps);
                }
            }
            Outcome::Transfer(err) => self.on_transfer_error(index, &ctx, generation, kind, err),
            Outcome::Disk(e) => self.fail_file(index, FileFailure::Fatal(e)),
            Outcome::Verified => match ctx.writer.finalize() {
                Ok(()) => {
                    let target = ctx.writer.target().to_path_buf();
                    self.files[index].outcome = Some(FileOutcome::Completed);
                    self.emit(ProgressEvent::FileCompleted {
                        file: ctx.path.clone(),
                        path: target,
                    });
                }
                Err(e) => self.fail_file(index, FileFailure::Fatal(e)),
            },
            Outcome::VerifyFailed(e) => self.on_verify_failed(index, &ctx, e),
        }
    }

    fn on_transfer_error(
        &mut self,
        index: usize,
        ctx: &Arc<FileContext>,
        generation: u64,
        kind: JobKind,
        err: ChunkError,
    ) {
        if matches!(err, ChunkError::Cancelled) {
            return;
        }
        if matches!(err, ChunkError::RangeIgnored) && matches!(kind, JobKind::Chunk(_)) {
            self.fall_back_to_stream(index, ctx);
            return;
        }
        let (mut task, stream) = match kind {
            JobKind::Chunk(t) => (t, false),
            JobKind::Stream(t) => (t, true),
            JobKind::Verify => return,
        };
        match task.fail(classify(&err), &self.policy) {
            TaskState::Retrying { attempt, delay } => {
                tracing::warn!(
                    file = %ctx.path,
                    range = %task.range.curl_range(),
                    attempt,
                    ?delay,
                    error = %err,
                    "chunk failed, retrying"
                );
                self.emit(ProgressEvent::ChunkRetry {
                    file: ctx.path.clone(),
                    range: task.range,
                    attempt,
                    delay,
                    reason: err.to_string(),
                });
                let mut generation = generation;
                if stream {
                    // A stream restarts from offset 0.
                    match ctx.writer.begin_stream() {
                        Ok(g) => generation = g,
                        Err(e) => return self.fail_file(index, FileFailure::Fatal(e)),
                    }
                    self.files[index].covered = 0;
                }
                let kind = if stream {
                    JobKind::Stream(task)
                } else {
                    JobKind::Chunk(task)
                };
                self.queue.push(Job {
                    ctx: Arc::clone(ctx),
                    generation,
                    kind,
                    not_before: Some(Instant::now() + delay),
                });
            }
            TaskState::Failed(fail) => {
                let failure = failure_for(ctx, &task, err, fail);
                self.fail_file(index, failure);
            }
            TaskState::Pending | TaskState::Dispatched | TaskState::Succeeded => {}
        }
    }

    fn fall_back_to_stream(&mut self, index: usize, ctx: &Arc<FileContext>) {
        let generation = match ctx.writer.begin_stream() {
            Ok(g) => g,
            Err(e) => return self.fail_file(index, FileFailure::Fatal(e)),
        };
        let dropped = self.queue.drain_file(index);
        tracing::warn!(
            file = %ctx.path,
            dropped,
            "server ignored range request; falling back to a single stream"
        );
        let run = &mut self.files[index];
        run.streaming = true;
        run.covered = 0;
        self.emit(ProgressEvent::StreamFallback {
            file: ctx.path.clone(),
        });
        self.queue_stream(index, ctx, generation);
    }

    fn on_verify_failed(&mut self, index: usize, ctx: &Arc<FileContext>, err: DownloadError) {
        if !matches!(err, DownloadError::HashMismatch { .. }) {
            return self.fail_file(index, FileFailure::Fatal(err));
        }
        let run = &mut self.files[index];
        run.hash_failures += 1;
        if run.hash_failures >= MAX_VERIFY_ATTEMPTS {
            if let Err(e) = ctx.writer.discard() {
                tracing::warn!(file = %ctx.path, error = %e, "could not remove corrupt temp file");
            }
            return self.fail_file(index, FileFailure::Fatal(err));
        }
        tracing::warn!(file = %ctx.path, error = %err, "verification failed; downloading again");
        self.emit(ProgressEvent::ResumeDiscarded {
            file: ctx.path.clone(),
            reason: err.to_string(),
        });
        let generation = match ctx.writer.reset() {
            Ok(g) => g,
            Err(e) => return self.fail_file(index, FileFailure::Fatal(e)),
        };
        let run = &mut self.files[index];
        run.covered = 0;
        if run.streaming {
            self.queue_stream(index, ctx, generation);
        } else {
            let whole = [ByteRange::new(0, ctx.writer.total_size())];
            self.schedule(index, ctx, &whole);
        }
    }

    fn fail_file(&mut self, index: usize, failure: FileFailure) {
        self.queue.drain_file(index);
        let run = &mut self.files[index];
        tracing::error!(file = %run.file, error = %failure, "file failed");
        let event = ProgressEvent::FileFailed {
            file: run.file.clone(),
            error: failure.error().to_string(),
            retryable: failure.is_retryable(),
        };
        run.outcome = Some(FileOutcome::Failed(failure));
        self.emit(event);
    }
}

/// Terminal failure for a task that will not be retried.
fn failure_for(ctx: &FileContext, task: &ChunkTask, err: ChunkError, fail: FailKind) -> FileFailure {
    let path = ctx.path.clone();
    match (err, fail) {
        (ChunkError::Storage(source), _) => {
            FileFailure::Fatal(DownloadError::disk_io(ctx.writer.temp_path(), source))
        }
        (ChunkError::Http(status), FailKind::NotRetryable) => {
            FileFailure::Fatal(DownloadError::Http { path, status })
        }
        (ChunkError::RangeIgnored, _) => FileFailure::Fatal(DownloadError::RangeUnsupported { path }),
        (ChunkError::Cancelled, _) => FileFailure::Retryable(DownloadError::Cancelled),
        (err, _) => FileFailure::Retryable(DownloadError::NetworkTransient {
            path,
            attempts: task.attempt,
            reason: err.to_string(),
        }),
    }
}
