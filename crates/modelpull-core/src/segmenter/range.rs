//! Byte range type and chunk planning.

use serde::{Deserialize, Serialize};

/// A byte range `[start, end)` (half-open).
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct ByteRange {
    /// Start offset (inclusive).
    pub start: u64,
    /// End offset (exclusive).
    pub end: u64,
}

impl ByteRange {
    pub fn new(start: u64, end: u64) -> Self {
        debug_assert!(start <= end, "inverted range {start}..{end}");
        Self { start, end }
    }

    /// Length of this range in bytes.
    pub fn len(&self) -> u64 {
        self.end.saturating_sub(self.start)
    }

    pub fn is_empty(&self) -> bool {
        self.start >= self.end
    }

    /// Value for curl's `CURLOPT_RANGE` (inclusive end, no `bytes=` prefix).
    pub fn curl_range(&self) -> String {
        format!("{}-{}", self.start, self.end.saturating_sub(1))
    }

    /// HTTP Range header value (inclusive end): `bytes=start-(end-1)`.
    pub fn range_header_value(&self) -> String {
        format!("bytes={}", self.curl_range())
    }

    pub fn overlaps(&self, other: &ByteRange) -> bool {
        self.start < other.end && other.start < self.end
    }
}

/// Splits `ranges` into pieces of at most `chunk_size` bytes, preserving order.
/// Empty ranges are dropped; a `chunk_size` of 0 is treated as 1.
pub fn split_into_chunks(ranges: &[ByteRange], chunk_size: u64) -> Vec<ByteRange> {
    let chunk_size = chunk_size.max(1);
    let mut out = Vec::new();
    for r in ranges {
        let mut offset = r.start;
        while offset < r.end {
            let end = offset.saturating_add(chunk_size).min(r.end);
            out.push(ByteRange::new(offset, end));
            offset = end;
        }
    }
    out
}
