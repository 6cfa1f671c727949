use anyhow::Result;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

use crate::retry::RetryPolicy;

/// Endpoint used when neither config nor environment names one.
pub const DEFAULT_ENDPOINT: &str = "https://huggingface.co";

/// Environment variables consulted (in order) for the registry endpoint.
pub const ENDPOINT_ENV_VARS: [&str; 2] = ["MODEL_ENDPOINT", "HF_ENDPOINT"];

/// Environment variable holding a registry bearer token.
pub const TOKEN_ENV_VAR: &str = "HF_TOKEN";

/// Environment variable naming the llama.cpp model cache.
pub const CACHE_ENV_VAR: &str = "LLAMA_CACHE";

/// Subdirectory of the user cache directory where llama.cpp keeps models.
pub const CACHE_SUBDIR: &str = "llama.cpp";

/// Retry policy parameters (optional section in config.toml).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetryConfig {
    /// Maximum number of attempts per chunk (including the first).
    pub max_attempts: u32,
    /// Base delay in seconds for exponential backoff (e.g. 0.25 = 250ms).
    pub base_delay_secs: f64,
    /// Maximum backoff delay in seconds.
    pub max_delay_secs: u64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: 5,
            base_delay_secs: 0.25,
            max_delay_secs: 30,
        }
    }
}

/// Global configuration loaded from `~/.config/modelpull/config.toml`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ModelPullConfig {
    /// Registry base URL. Environment variables take precedence.
    pub endpoint: Option<String>,
    /// Where models go when `--dest` is not given. `LLAMA_CACHE` takes
    /// precedence; unset means the llama.cpp cache directory.
    pub download_dir: Option<PathBuf>,
    /// Registry revision (branch, tag or commit) to resolve against.
    pub revision: String,
    /// Maximum concurrent HTTP connections across all files.
    pub max_total_connections: usize,
    /// Maximum concurrent chunk fetches for one file.
    pub max_connections_per_file: usize,
    /// Maximum concurrent HTTP connections per host.
    pub max_connections_per_host: usize,
    /// Size of one ranged request.
    pub chunk_size_bytes: u64,
    /// Wall-clock limit for a single chunk fetch.
    pub chunk_timeout_secs: u64,
    pub connect_timeout_secs: u64,
    /// Optional bandwidth cap in bytes per second, split across connections.
    pub max_bytes_per_sec: Option<u64>,
    /// Optional retry policy; if missing, built-in defaults are used.
    pub retry: Option<RetryConfig>,
}

impl Default for ModelPullConfig {
    fn default() -> Self {
        Self {
            endpoint: None,
            download_dir: None,
            revision: "main".to_string(),
            max_total_connections: 8,
            max_connections_per_file: 4,
            max_connections_per_host: 8,
            chunk_size_bytes: 32 * 1024 * 1024,
            chunk_timeout_secs: 300,
            connect_timeout_secs: 30,
            max_bytes_per_sec: None,
            retry: None,
        }
    }
}

impl ModelPullConfig {
    /// Registry endpoint: `MODEL_ENDPOINT`, then `HF_ENDPOINT`, then the
    /// config value, then the public default.
    pub fn resolve_endpoint(&self) -> String {
        let env: Vec<Option<String>> = ENDPOINT_ENV_VARS
            .iter()
            .map(|k| std::env::var(k).ok())
            .collect();
        pick_endpoint(&env, self.endpoint.as_deref())
    }

    /// Default destination: `LLAMA_CACHE`, then `download_dir`, then
    /// `$XDG_CACHE_HOME/llama.cpp`.
    pub fn resolve_download_dir(&self) -> Result<PathBuf> {
        let env = std::env::var_os(CACHE_ENV_VAR).map(PathBuf::from);
        if let Some(dir) = pick_download_dir(env, self.download_dir.as_deref()) {
            return Ok(dir);
        }
        let xdg_dirs = xdg::BaseDirectories::with_prefix(CACHE_SUBDIR)?;
        Ok(xdg_dirs.get_cache_home())
    }

    /// Retry policy from the `[retry]` section, or defaults.
    pub fn retry_policy(&self) -> RetryPolicy {
        self.retry
            .as_ref()
            .map(RetryPolicy::from)
            .unwrap_or_default()
    }
}

/// First non-blank candidate among `env` (in order) and `configured`, with
/// trailing slashes removed.
pub fn pick_endpoint(env: &[Option<String>], configured: Option<&str>) -> String {
    env.iter()
        .flatten()
        .map(String::as_str)
        .chain(configured)
        .map(str::trim)
        .find(|v| !v.is_empty())
        .unwrap_or(DEFAULT_ENDPOINT)
        .trim_end_matches('/')
        .to_string()
}

/// Explicit download directory from `env` or `configured`, ignoring empty
/// values. None means the platform cache default applies.
pub fn pick_download_dir(env: Option<PathBuf>, configured: Option<&Path>) -> Option<PathBuf> {
    env.into_iter()
        .chain(configured.map(Path::to_path_buf))
        .find(|p| !p.as_os_str().is_empty())
}

/// Bearer token from the environment, if set and non-empty.
pub fn token_from_env() -> Option<String> {
    std::env::var(TOKEN_ENV_VAR)
        .ok()
        .map(|t| t.trim().to_string())
        .filter(|t| !t.is_empty())
}

pub fn config_path() -> Result<PathBuf> {
    let xdg_dirs = xdg::BaseDirectories::with_prefix("modelpull")?;
    Ok(xdg_dirs.place_config_file("config.toml")?)
}

/// Load configuration from disk, creating a default file if none exists.
pub fn load_or_init() -> Result<ModelPullConfig> {
    let path = config_path()?;
    if !path.exists() {
        let default_cfg = ModelPullConfig::default();
        let toml = toml::to_string_pretty(&default_cfg)?;
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        fs::write(&path, toml)?;
        tracing::info!("created default config at {}", path.display());
        return Ok(default_cfg);
    }

    let data = fs::read_to_string(&path)?;
    let cfg: ModelPullConfig = toml::from_str(&data)?;
    Ok(cfg)
}
