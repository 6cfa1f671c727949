//! Registry metadata requests with retry.

use serde::de::DeserializeOwned;

use crate::downloader::{get_bytes, CurlOptions};
use crate::error::DownloadError;
use crate::retry::{classify, run_with_retry, ChunkError, RetryPolicy};

/// GETs `url` and decodes the JSON body. A 404 is `Ok(None)`; other
/// failures are retried per `policy`, then reported as `Registry`.
pub fn fetch_json<T: DeserializeOwned>(
    url: &str,
    opts: &CurlOptions,
    policy: &RetryPolicy,
) -> Result<Option<T>, DownloadError> {
    tracing::debug!(%url, "registry request");
    let body = match run_with_retry(policy, classify, || get_bytes(url, opts)) {
        Ok(body) => body,
        Err(ChunkError::Http(404)) => return Ok(None),
        Err(e) => {
            return Err(DownloadError::Registry {
                url: url.to_string(),
                reason: e.to_string(),
            })
        }
    };
    serde_json::from_slice(&body)
        .map(Some)
        .map_err(|e| DownloadError::Registry {
            url: url.to_string(),
            reason: format!("invalid JSON: {e}"),
        })
}
