//! `modelpull resolve` – show what a reference resolves to.

use anyhow::{Context, Result};
use modelpull_core::config::ModelPullConfig;
use modelpull_core::pull;
use modelpull_core::RegistryClient;

use super::format_bytes;

pub async fn run_resolve(cfg: &ModelPullConfig, reference: &str) -> Result<()> {
    let registry = RegistryClient::from_config(cfg)?;
    let manifest = pull::resolve(reference, &registry)
        .await
        .with_context(|| format!("resolving {}", reference))?;
    for f in &manifest.files {
        println!("{:>10}  {}  {}", format_bytes(f.size_bytes), f.content_hash, f.path);
    }
    println!(
        "{} file(s), {} total",
        manifest.files.len(),
        format_bytes(manifest.total_bytes())
    );
    Ok(())
}
