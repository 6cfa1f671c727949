//! Set of completed byte ranges, kept sorted and merged.

use serde::{Deserialize, Serialize};

use super::range::ByteRange;

/// Disjoint, sorted, non-adjacent ranges. Adjacent or overlapping inserts are
/// merged, so two sets covering the same bytes compare equal.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "Vec<ByteRange>", into = "Vec<ByteRange>")]
pub struct RangeSet {
    ranges: Vec<ByteRange>,
}

impl RangeSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds `range`, merging with any overlapping or touching neighbours.
    pub fn insert(&mut self, range: ByteRange) {
        if range.is_empty() {
            return;
        }
        // First range that could merge (its end reaches range.start).
        let lo = self.ranges.partition_point(|r| r.end < range.start);
        // One past the last range that could merge (its start is within range.end).
        let hi = self.ranges.partition_point(|r| r.start <= range.end);
        if lo == hi {
            self.ranges.insert(lo, range);
            return;
        }
        let start = self.ranges[lo].start.min(range.start);
        let end = self.ranges[hi - 1].end.max(range.end);
        self.ranges.splice(lo..hi, std::iter::once(ByteRange::new(start, end)));
    }

    pub fn ranges(&self) -> &[ByteRange] {
        &self.ranges
    }

    pub fn is_empty(&self) -> bool {
        self.ranges.is_empty()
    }

    /// Total number of bytes covered.
    pub fn covered_len(&self) -> u64 {
        self.ranges.iter().map(|r| r.len()).sum()
    }

    /// True if `range` lies entirely inside one recorded range.
    pub fn contains(&self, range: &ByteRange) -> bool {
        let idx = self.ranges.partition_point(|r| r.end < range.end);
        self.ranges
            .get(idx)
            .map(|r| r.start <= range.start && range.end <= r.end)
            .unwrap_or(false)
    }

    /// True if the set is exactly one contiguous range `[0, total)`
    /// (or empty when `total` is 0).
    pub fn is_complete(&self, total: u64) -> bool {
        if total == 0 {
            return true;
        }
        matches!(self.ranges.as_slice(), [only] if only.start == 0 && only.end == total)
    }

    /// Ranges of `[0, total)` not covered by this set, in order.
    pub fn gaps(&self, total: u64) -> Vec<ByteRange> {
        let mut out = Vec::new();
        let mut cursor = 0u64;
        for r in &self.ranges {
            if r.start >= total {
                break;
            }
            if r.start > cursor {
                out.push(ByteRange::new(cursor, r.start));
            }
            cursor = cursor.max(r.end);
        }
        if cursor < total {
            out.push(ByteRange::new(cursor, total));
        }
        out
    }

    /// True if any recorded range extends beyond `total`.
    pub fn exceeds(&self, total: u64) -> bool {
        self.ranges.last().map(|r| r.end > total).unwrap_or(false)
    }
}

impl From<Vec<ByteRange>> for RangeSet {
    fn from(ranges: Vec<ByteRange>) -> Self {
        let mut set = RangeSet::new();
        for r in ranges {
            set.insert(r);
        }
        set
    }
}

impl From<RangeSet> for Vec<ByteRange> {
    fn from(set: RangeSet) -> Self {
        set.ranges
    }
}
