//! Tests for the pull subcommand and its config overrides.

use super::parse;
use crate::cli::{apply_overrides, Cli, CliCommand};
use clap::Parser;
use modelpull_core::config::ModelPullConfig;

#[test]
fn cli_parse_pull_defaults() {
    match parse(&["modelpull", "pull", "unsloth/GLM-4.7-Flash-GGUF:Q4_K_M"]) {
        CliCommand::Pull {
            reference,
            dest,
            jobs,
            per_file,
            chunk_mib,
        } => {
            assert_eq!(reference, "unsloth/GLM-4.7-Flash-GGUF:Q4_K_M");
            assert!(dest.is_none());
            assert!(jobs.is_none());
            assert!(per_file.is_none());
            assert!(chunk_mib.is_none());
        }
        _ => panic!("expected Pull"),
    }
}

#[test]
fn cli_parse_pull_options() {
    match parse(&[
        "modelpull",
        "pull",
        "acme/model:BF16",
        "--dest",
        "/tmp/models",
        "--jobs",
        "16",
        "--per-file",
        "6",
        "--chunk-mib",
        "8",
    ]) {
        CliCommand::Pull {
            dest,
            jobs,
            per_file,
            chunk_mib,
            ..
        } => {
            assert_eq!(dest.as_deref(), Some(std::path::Path::new("/tmp/models")));
            assert_eq!(jobs, Some(16));
            assert_eq!(per_file, Some(6));
            assert_eq!(chunk_mib, Some(8));
        }
        _ => panic!("expected Pull with options"),
    }
}

#[test]
fn cli_parse_pull_requires_reference() {
    assert!(Cli::try_parse_from(["modelpull", "pull"]).is_err());
}

#[test]
fn overrides_replace_config_values() {
    let mut cfg = ModelPullConfig::default();
    apply_overrides(&mut cfg, Some(16), Some(6), Some(8));
    assert_eq!(cfg.max_total_connections, 16);
    assert_eq!(cfg.max_connections_per_host, 16);
    assert_eq!(cfg.max_connections_per_file, 6);
    assert_eq!(cfg.chunk_size_bytes, 8 * 1024 * 1024);
}

#[test]
fn no_overrides_keep_config() {
    let mut cfg = ModelPullConfig::default();
    apply_overrides(&mut cfg, None, None, None);
    let defaults = ModelPullConfig::default();
    assert_eq!(cfg.max_total_connections, defaults.max_total_connections);
    assert_eq!(cfg.max_connections_per_file, defaults.max_connections_per_file);
    assert_eq!(cfg.chunk_size_bytes, defaults.chunk_size_bytes);
}
