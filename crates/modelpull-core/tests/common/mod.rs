#![allow(dead_code)]

pub mod registry_server;

use modelpull_core::downloader::CurlOptions;
use modelpull_core::retry::RetryPolicy;
use modelpull_core::{PullOptions, RegistryClient, RunOptions};
use std::time::Duration;

/// Deterministic, non-repeating-looking test body.
pub fn body(len: usize, seed: u8) -> Vec<u8> {
    (0..len)
        .map(|i| ((i as u32).wrapping_mul(31).wrapping_add(seed as u32) % 251) as u8)
        .collect()
}

/// Options pointed at `endpoint` with small chunks and fast retries.
pub fn options(endpoint: &str, chunk_size: u64) -> PullOptions {
    let retry = RetryPolicy {
        max_attempts: 3,
        base_delay: Duration::from_millis(10),
        max_delay: Duration::from_millis(50),
    };
    let curl = CurlOptions {
        connect_timeout: Duration::from_secs(5),
        request_timeout: Duration::from_secs(20),
        ..CurlOptions::default()
    };
    PullOptions {
        registry: RegistryClient::new(endpoint, "main", curl.clone(), retry).unwrap(),
        run: RunOptions {
            max_concurrency: 4,
            max_per_file: 2,
            max_per_host: 4,
            chunk_size,
            retry,
            curl,
        },
    }
}
