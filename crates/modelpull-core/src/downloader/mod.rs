//! HTTP transfers over libcurl easy handles.
//!
//! `fetch_range` performs one ranged GET into memory for the chunk workers;
//! `fetch_stream` performs a plain GET for servers that ignore ranges;
//! `get_bytes` serves small metadata requests. All of them block the calling
//! thread and abort promptly when the run's [`CancelToken`] fires.

mod chunk;
mod headers;
mod stream;

pub use chunk::fetch_range;
pub use stream::fetch_stream;

use std::cell::Cell;
use std::time::Duration;

use crate::config::ModelPullConfig;
use crate::control::CancelToken;
use crate::retry::ChunkError;

/// User agent sent with every request.
pub const USER_AGENT: &str = concat!("modelpull/", env!("CARGO_PKG_VERSION"));

/// Options applied to every easy handle.
#[derive(Debug, Clone)]
pub struct CurlOptions {
    pub connect_timeout: Duration,
    /// Wall-clock limit for one ranged or metadata request (not streams).
    pub request_timeout: Duration,
    /// Abort when slower than `low_speed_limit` bytes/s for `low_speed_time`.
    pub low_speed_limit: u32,
    pub low_speed_time: Duration,
    /// Per-handle receive cap in bytes per second.
    pub max_recv_speed: Option<u64>,
    pub bearer_token: Option<String>,
}

impl Default for CurlOptions {
    fn default() -> Self {
        Self {
            connect_timeout: Duration::from_secs(30),
            request_timeout: Duration::from_secs(300),
            low_speed_limit: 1024,
            low_speed_time: Duration::from_secs(60),
            max_recv_speed: None,
            bearer_token: None,
        }
    }
}

impl CurlOptions {
    /// Options from config; the global bandwidth cap is split evenly across
    /// `max_total_connections` handles.
    pub fn from_config(cfg: &ModelPullConfig, bearer_token: Option<String>) -> Self {
        let handles = cfg.max_total_connections.max(1) as u64;
        Self {
            connect_timeout: Duration::from_secs(cfg.connect_timeout_secs),
            request_timeout: Duration::from_secs(cfg.chunk_timeout_secs),
            max_recv_speed: cfg.max_bytes_per_sec.map(|b| (b / handles).max(1)),
            bearer_token,
            ..Self::default()
        }
    }

    /// New easy handle for `url` with these options applied.
    pub(crate) fn easy(&self, url: &str) -> Result<curl::easy::Easy, curl::Error> {
        let mut easy = curl::easy::Easy::new();
        easy.url(url)?;
        easy.useragent(USER_AGENT)?;
        easy.follow_location(true)?;
        easy.max_redirections(10)?;
        easy.connect_timeout(self.connect_timeout)?;
        easy.low_speed_limit(self.low_speed_limit)?;
        easy.low_speed_time(self.low_speed_time)?;
        if let Some(speed) = self.max_recv_speed {
            easy.max_recv_speed(speed)?;
        }
        if let Some(token) = &self.bearer_token {
            let mut list = curl::easy::List::new();
            list.append(&format!("Authorization: Bearer {}", token.trim()))?;
            easy.http_headers(list)?;
        }
        Ok(easy)
    }
}

/// Small GET fully buffered in memory (registry JSON). Non-2xx is
/// `ChunkError::Http`.
pub fn get_bytes(url: &str, opts: &CurlOptions) -> Result<Vec<u8>, ChunkError> {
    let mut body = Vec::new();
    let mut easy = opts.easy(url).map_err(ChunkError::Curl)?;
    easy.timeout(opts.request_timeout).map_err(ChunkError::Curl)?;
    {
        let mut transfer = easy.transfer();
        transfer
            .write_function(|data| {
                body.extend_from_slice(data);
                Ok(data.len())
            })
            .map_err(ChunkError::Curl)?;
        transfer.perform().map_err(ChunkError::Curl)?;
    }
    let code = easy.response_code().map_err(ChunkError::Curl)?;
    if !(200..300).contains(&code) {
        return Err(ChunkError::Http(code));
    }
    Ok(body)
}

/// Why a write callback stopped the transfer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Abort {
    RangeIgnored,
    Overflow,
    Storage,
}

/// Maps a failed `perform` to the most specific chunk error.
fn perform_error(e: curl::Error, abort: &Cell<Option<Abort>>, cancel: &CancelToken) -> ChunkError {
    if e.is_aborted_by_callback() && cancel.is_cancelled() {
        return ChunkError::Cancelled;
    }
    if e.is_write_error() {
        match abort.get() {
            Some(Abort::RangeIgnored) => return ChunkError::RangeIgnored,
            Some(Abort::Overflow) | Some(Abort::Storage) | None => {}
        }
    }
    ChunkError::Curl(e)
}
