//! One-call pull: parse → resolve → scan → plan → space check → transfer
//! → save the manifest.
//!
//! The core is blocking (curl easy handles on worker threads); this module
//! is the async edge that runs it under `spawn_blocking`.

use std::path::{Path, PathBuf};

use tokio::sync::mpsc::UnboundedSender;

use crate::config::{self, ModelPullConfig};
use crate::control::CancelToken;
use crate::error::DownloadError;
use crate::manifest::RemoteManifest;
use crate::planner::{self, TransferPlan};
use crate::reference::ModelReference;
use crate::registry::RegistryClient;
use crate::resume::scan_local;
use crate::scheduler::{self, ProgressEvent, RunOptions, RunReport};
use crate::space;

/// Registry client and transfer limits for a pull.
#[derive(Debug, Clone)]
pub struct PullOptions {
    pub registry: RegistryClient,
    pub run: RunOptions,
}

impl PullOptions {
    /// Options from config and environment (endpoint overrides, `HF_TOKEN`).
    pub fn from_config(cfg: &ModelPullConfig) -> Result<Self, DownloadError> {
        Ok(Self {
            registry: RegistryClient::from_config(cfg)?,
            run: RunOptions::from_config(cfg, config::token_from_env()),
        })
    }
}

async fn blocking<T, F>(f: F) -> Result<T, DownloadError>
where
    T: Send + 'static,
    F: FnOnce() -> T + Send + 'static,
{
    match tokio::task::spawn_blocking(f).await {
        Ok(v) => Ok(v),
        Err(e) if e.is_panic() => std::panic::resume_unwind(e.into_panic()),
        // Runtime shutting down.
        Err(_) => Err(DownloadError::Cancelled),
    }
}

/// Resolves `reference` without downloading any file body.
pub async fn resolve(reference: &str, registry: &RegistryClient) -> Result<RemoteManifest, DownloadError> {
    let reference = ModelReference::parse(reference)?;
    let registry = registry.clone();
    blocking(move || registry.resolve(&reference)).await?
}

/// Plans `manifest` into `dest_dir` against what is already on disk.
pub fn plan_into(manifest: &RemoteManifest, dest_dir: &Path) -> Result<TransferPlan, DownloadError> {
    let local = scan_local(manifest, dest_dir)?;
    let plan = planner::plan(manifest, dest_dir, &local)?;
    space::check_free_space(&plan)?;
    Ok(plan)
}

/// Pulls `reference` into `dest_dir` and returns the per-file report.
///
/// Resolution and pre-flight errors are returned directly; transfer-time
/// failures are per file inside the report. When every file is in place the
/// resolved manifest is saved into `dest_dir`.
pub async fn pull_report(
    reference: &str,
    dest_dir: &Path,
    opts: &PullOptions,
    events: UnboundedSender<ProgressEvent>,
    cancel: CancelToken,
) -> Result<RunReport, DownloadError> {
    let manifest = resolve(reference, &opts.registry).await?;
    let _ = events.send(ProgressEvent::Resolved {
        reference: manifest.reference.to_string(),
        files: manifest.files.len(),
        total_bytes: manifest.total_bytes(),
    });
    if cancel.is_cancelled() {
        return Err(DownloadError::Cancelled);
    }

    let dest = dest_dir.to_path_buf();
    let resolved = manifest.clone();
    let plan = blocking(move || plan_into(&resolved, &dest)).await??;
    tracing::info!(
        reference = %plan.reference,
        total = plan.total_bytes(),
        remaining = plan.remaining_bytes(),
        "plan ready"
    );

    let run = opts.run.clone();
    let report = blocking(move || scheduler::run(&plan, &run, &events, &cancel)).await?;
    if report.is_success() {
        let dest = dest_dir.to_path_buf();
        blocking(move || manifest.save(&dest)).await??;
    }
    Ok(report)
}

/// Pulls `reference` into `dest_dir`; on success returns the final paths in
/// manifest order.
pub async fn pull(
    reference: &str,
    dest_dir: &Path,
    opts: &PullOptions,
    events: UnboundedSender<ProgressEvent>,
    cancel: CancelToken,
) -> Result<Vec<PathBuf>, DownloadError> {
    pull_report(reference, dest_dir, opts, events, cancel)
        .await?
        .into_result()
}
