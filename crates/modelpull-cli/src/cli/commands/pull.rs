//! `modelpull pull` – download a model with progress output.

use anyhow::{Context, Result};
use modelpull_core::config::ModelPullConfig;
use modelpull_core::{pull, CancelToken, ProgressEvent, PullOptions};
use std::path::Path;
use std::time::{Duration, Instant};
use tokio::sync::mpsc::{unbounded_channel, UnboundedReceiver};

use super::format_bytes;

const PROGRESS_INTERVAL: Duration = Duration::from_millis(500);

pub async fn run_pull(cfg: &ModelPullConfig, reference: &str, dest: &Path) -> Result<()> {
    let opts = PullOptions::from_config(cfg)?;
    let cancel = CancelToken::new();
    {
        let cancel = cancel.clone();
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                eprintln!("\ncancelling; progress is kept for the next run");
                cancel.cancel();
            }
        });
    }

    let (tx, rx) = unbounded_channel();
    let printer = tokio::spawn(print_progress(rx));
    let result = pull::pull(reference, dest, &opts, tx, cancel).await;
    let _ = printer.await;

    let paths = result.with_context(|| format!("pulling {}", reference))?;
    for p in paths {
        println!("{}", p.display());
    }
    Ok(())
}

async fn print_progress(mut rx: UnboundedReceiver<ProgressEvent>) {
    let mut last_print: Option<Instant> = None;
    while let Some(event) = rx.recv().await {
        match event {
            ProgressEvent::Resolved {
                reference,
                files,
                total_bytes,
            } => println!("{}: {} file(s), {}", reference, files, format_bytes(total_bytes)),
            ProgressEvent::ResumeDiscarded { file, reason } => {
                eprintln!("  {}: starting over ({})", file, reason)
            }
            ProgressEvent::FileStarted {
                file,
                resumed_bytes,
                total_bytes,
            } if resumed_bytes > 0 => println!(
                "  {}: resuming at {} of {}",
                file,
                format_bytes(resumed_bytes),
                format_bytes(total_bytes)
            ),
            ProgressEvent::StreamFallback { file } => {
                eprintln!("  {}: server ignores ranges, downloading in one stream", file)
            }
            ProgressEvent::FileFailed { file, error, .. } => eprintln!("  {}: failed: {}", file, error),
            ProgressEvent::Stats(stats) => {
                let due = last_print.map_or(true, |t| t.elapsed() >= PROGRESS_INTERVAL);
                if due {
                    let eta = stats
                        .eta_secs()
                        .map(|s| format!("{:.0}s", s))
                        .unwrap_or_else(|| "?".to_string());
                    println!(
                        "  {} / {} ({:.1}%)  {}/s  ETA {}  [{}/{} files]",
                        format_bytes(stats.bytes_done),
                        format_bytes(stats.total_bytes),
                        stats.fraction() * 100.0,
                        format_bytes(stats.bytes_per_sec() as u64),
                        eta,
                        stats.files_done,
                        stats.file_count
                    );
                    last_print = Some(Instant::now());
                }
            }
            ProgressEvent::FileStarted { .. }
            | ProgressEvent::ChunkWritten { .. }
            | ProgressEvent::ChunkRetry { .. }
            | ProgressEvent::Verifying { .. }
            | ProgressEvent::FileCompleted { .. } => {}
        }
    }
}
