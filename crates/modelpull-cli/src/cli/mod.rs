//! CLI for modelpull.

mod commands;

use anyhow::Result;
use clap::{Parser, Subcommand};
use modelpull_core::config::{self, ModelPullConfig};
use std::path::PathBuf;

use commands::{run_checksum, run_pull, run_resolve, run_version};

/// Top-level CLI.
#[derive(Debug, Parser)]
#[command(name = "modelpull")]
#[command(about = "Resumable, parallel downloads of model files from a Hugging Face compatible registry", long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: CliCommand,
}

#[derive(Debug, Subcommand)]
pub enum CliCommand {
    /// Download a model: owner/name[:QUANT].
    Pull {
        /// Model reference, e.g. unsloth/GLM-4.7-Flash-GGUF:Q4_K_M.
        reference: String,
        /// Destination directory (default: $LLAMA_CACHE, the configured
        /// download_dir, or the llama.cpp cache directory).
        #[arg(long, value_name = "DIR")]
        dest: Option<PathBuf>,
        /// Total concurrent connections.
        #[arg(long, value_name = "N")]
        jobs: Option<usize>,
        /// Concurrent connections per file.
        #[arg(long, value_name = "N")]
        per_file: Option<usize>,
        /// Chunk size in MiB.
        #[arg(long, value_name = "N")]
        chunk_mib: Option<u64>,
    },

    /// Print the files a reference resolves to, without downloading.
    Resolve {
        reference: String,
    },

    /// Compute SHA-256 of a file (e.g. after download).
    Checksum {
        /// Path to the file.
        path: PathBuf,
    },

    /// Print the version.
    Version,
}

/// Applies command-line overrides on top of the loaded config.
pub(crate) fn apply_overrides(
    cfg: &mut ModelPullConfig,
    jobs: Option<usize>,
    per_file: Option<usize>,
    chunk_mib: Option<u64>,
) {
    if let Some(n) = jobs {
        cfg.max_total_connections = n.max(1);
        cfg.max_connections_per_host = cfg.max_connections_per_host.max(cfg.max_total_connections);
    }
    if let Some(n) = per_file {
        cfg.max_connections_per_file = n.max(1);
    }
    if let Some(mib) = chunk_mib {
        cfg.chunk_size_bytes = mib.max(1) * 1024 * 1024;
    }
}

impl CliCommand {
    pub async fn run_from_args() -> Result<()> {
        let cli = Cli::parse();

        match cli.command {
            CliCommand::Pull {
                reference,
                dest,
                jobs,
                per_file,
                chunk_mib,
            } => {
                let mut cfg = config::load_or_init()?;
                tracing::debug!("loaded config: {:?}", cfg);
                apply_overrides(&mut cfg, jobs, per_file, chunk_mib);
                let dest = match dest {
                    Some(d) => d,
                    None => cfg.resolve_download_dir()?,
                };
                run_pull(&cfg, &reference, &dest).await?;
            }
            CliCommand::Resolve { reference } => {
                let cfg = config::load_or_init()?;
                run_resolve(&cfg, &reference).await?;
            }
            CliCommand::Checksum { path } => run_checksum(&path).await?,
            CliCommand::Version => run_version(),
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests;
