//! Chunk transfer error type for retry classification.

use std::fmt;

use crate::segmenter::ByteRange;

/// Error returned by a single ranged fetch or stream transfer.
/// Classified into an `ErrorKind` before the scheduler decides what to do.
#[derive(Debug)]
pub enum ChunkError {
    /// Curl reported an error (timeout, connection, etc.).
    Curl(curl::Error),
    /// HTTP response had a non-2xx status.
    Http(u32),
    /// A range was requested but the server answered `200 OK` with the whole body.
    RangeIgnored,
    /// Body length differs from the requested range (server closed early or
    /// sent too much). Retried instead of silently corrupting the file.
    PartialTransfer { expected: u64, received: u64 },
    /// `206` whose `Content-Range` names other bytes than were asked for.
    RangeMismatch {
        requested: ByteRange,
        first: u64,
        last: u64,
    },
    /// Disk/storage write failed (e.g. disk full, permission denied). Not retried.
    Storage(std::io::Error),
    /// The run was cancelled while the transfer was in flight.
    Cancelled,
}

impl fmt::Display for ChunkError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ChunkError::Curl(e) => write!(f, "{}", e),
            ChunkError::Http(code) => write!(f, "HTTP {}", code),
            ChunkError::RangeIgnored => write!(f, "server ignored Range header"),
            ChunkError::PartialTransfer { expected, received } => {
                write!(f, "partial transfer: expected {} bytes, got {}", expected, received)
            }
            ChunkError::RangeMismatch {
                requested,
                first,
                last,
            } => write!(
                f,
                "server sent bytes {}-{} for requested range {}",
                first,
                last,
                requested.curl_range()
            ),
            ChunkError::Storage(e) => write!(f, "storage: {}", e),
            ChunkError::Cancelled => write!(f, "cancelled"),
        }
    }
}

impl std::error::Error for ChunkError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            ChunkError::Curl(e) => Some(e),
            ChunkError::Storage(e) => Some(e),
            ChunkError::Http(_)
            | ChunkError::RangeIgnored
            | ChunkError::PartialTransfer { .. }
            | ChunkError::RangeMismatch { .. }
            | ChunkError::Cancelled => None,
        }
    }
}
