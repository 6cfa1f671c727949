//! Range math for chunked transfers.
//!
//! `ByteRange` is the unit of work and of resume bookkeeping; `RangeSet`
//! records which ranges of a file are durably written and yields the gaps
//! still to fetch.

mod range;
mod set;

pub use range::{split_into_chunks, ByteRange};
pub use set::RangeSet;
