//! Worker threads: take a job, perform it, report to the coordinator.

use std::sync::mpsc::Sender;

use super::queue::{FileContext, Job, JobKind, WorkQueue};
use super::task::ChunkTask;
use crate::checksum;
use crate::control::CancelToken;
use crate::downloader::{fetch_range, fetch_stream, CurlOptions};
use crate::error::DownloadError;
use crate::retry::ChunkError;
use crate::storage::WriteAck;

/// Streamed bytes between durable checkpoints (and progress messages).
const STREAM_CHECKPOINT_BYTES: u64 = 8 * 1024 * 1024;

pub(crate) enum Outcome {
    Written { covered: u64, complete: bool },
    StreamProgress { covered: u64 },
    /// The file moved to a newer generation while the job ran.
    Stale,
    Transfer(ChunkError),
    Disk(DownloadError),
    Verified,
    VerifyFailed(DownloadError),
}

pub(crate) struct Report {
    pub file: usize,
    pub generation: u64,
    pub kind: JobKind,
    pub outcome: Outcome,
}

pub(crate) fn worker_loop(queue: &WorkQueue, tx: &Sender<Report>, curl: &CurlOptions, cancel: &CancelToken) {
    while let Some((job, permit)) = queue.pop() {
        let Job {
            ctx,
            generation,
            kind,
            ..
        } = job;
        let (kind, outcome) = match kind {
            JobKind::Chunk(mut task) => {
                task.dispatch();
                let outcome = run_chunk(&ctx, generation, &task, curl, cancel);
                (JobKind::Chunk(task), outcome)
            }
            JobKind::Stream(mut task) => {
                task.dispatch();
                let outcome = run_stream(&ctx, generation, &task, tx, curl, cancel);
                (JobKind::Stream(task), outcome)
            }
            JobKind::Verify => (JobKind::Verify, run_verify(&ctx)),
        };
        drop(permit);
        queue.notify();
        let report = Report {
            file: ctx.index,
            generation,
            kind,
            outcome,
        };
        if tx.send(report).is_err() {
            break;
        }
    }
}

fn run_chunk(
    ctx: &FileContext,
    generation: u64,
    task: &ChunkTask,
    curl: &CurlOptions,
    cancel: &CancelToken,
) -> Outcome {
    if ctx.writer.generation() != generation {
        return Outcome::Stale;
    }
    let bytes = match fetch_range(&ctx.url, task.range, curl, cancel) {
        Ok(b) => b,
        Err(e) => return Outcome::Transfer(e),
    };
    match ctx.writer.write(generation, task.range.start, &bytes) {
        Ok(WriteAck::Recorded { covered, complete }) => Outcome::Written { covered, complete },
        Ok(WriteAck::Stale) => Outcome::Stale,
        Err(e) => Outcome::Disk(e),
    }
}

fn superseded() -> std::io::Error {
    std::io::Error::new(std::io::ErrorKind::Other, "stream superseded")
}

fn run_stream(
    ctx: &FileContext,
    generation: u64,
    task: &ChunkTask,
    tx: &Sender<Report>,
    curl: &CurlOptions,
    cancel: &CancelToken,
) -> Outcome {
    let total = ctx.writer.total_size();
    let mut checkpoint = 0u64;
    let streamed = fetch_stream(&ctx.url, total, curl, cancel, |offset, data| {
        if !ctx.writer.stream_write(generation, offset, data)? {
            return Err(superseded());
        }
        let end = offset + data.len() as u64;
        if end - checkpoint < STREAM_CHECKPOINT_BYTES {
            return Ok(());
        }
        match ctx.writer.stream_checkpoint(generation, end) {
            Ok(WriteAck::Recorded { covered, .. }) => {
                checkpoint = end;
                let _ = tx.send(Report {
                    file: ctx.index,
                    generation,
                    kind: JobKind::Stream(task.clone()),
                    outcome: Outcome::StreamProgress { covered },
                });
                Ok(())
            }
            Ok(WriteAck::Stale) => Err(superseded()),
            Err(e) => Err(std::io::Error::new(std::io::ErrorKind::Other, e.to_string())),
        }
    });
    if let Err(e) = streamed {
        return Outcome::Transfer(e);
    }
    match ctx.writer.stream_checkpoint(generation, total) {
        Ok(WriteAck::Recorded { covered, complete }) => Outcome::Written { covered, complete },
        Ok(WriteAck::Stale) => Outcome::Stale,
        Err(e) => Outcome::Disk(e),
    }
}

fn run_verify(ctx: &FileContext) -> Outcome {
    let w = &ctx.writer;
    match checksum::verify_file(w.temp_path(), &ctx.path, w.content_hash(), w.total_size()) {
        Ok(()) => Outcome::Verified,
        Err(e) => Outcome::VerifyFailed(e),
    }
}
