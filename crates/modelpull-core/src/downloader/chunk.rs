//! Single ranged GET into memory.

use std::cell::Cell;

use super::headers::{content_range_value, parse_content_range, parse_status_line};
use super::{perform_error, Abort, CurlOptions};
use crate::control::CancelToken;
use crate::retry::ChunkError;
use crate::segmenter::ByteRange;

/// Fetches `range` of `url` and returns exactly `range.len()` bytes.
///
/// A `200 OK` answer aborts the transfer at the first body byte and yields
/// `ChunkError::RangeIgnored`; a body of any other length is
/// `ChunkError::PartialTransfer`. A `Content-Range` that names other bytes
/// than the requested ones is `ChunkError::RangeMismatch`.
pub fn fetch_range(
    url: &str,
    range: ByteRange,
    opts: &CurlOptions,
    cancel: &CancelToken,
) -> Result<Vec<u8>, ChunkError> {
    if cancel.is_cancelled() {
        return Err(ChunkError::Cancelled);
    }
    let expected = range.len();
    let mut body: Vec<u8> = Vec::with_capacity(expected as usize);
    let status = Cell::new(0u32);
    let served = Cell::new(None);
    let seen = Cell::new(0u64);
    let abort = Cell::new(None);

    let mut easy = opts.easy(url).map_err(ChunkError::Curl)?;
    easy.timeout(opts.request_timeout).map_err(ChunkError::Curl)?;
    easy.range(&range.curl_range()).map_err(ChunkError::Curl)?;
    easy.progress(true).map_err(ChunkError::Curl)?;

    let performed = {
        let mut transfer = easy.transfer();
        transfer
            .header_function(|line| {
                let Ok(line) = std::str::from_utf8(line) else {
                    return true;
                };
                if let Some(code) = parse_status_line(line) {
                    // New response (redirect or retry); forget earlier headers.
                    status.set(code);
                    served.set(None);
                } else if let Some(value) = content_range_value(line) {
                    served.set(parse_content_range(value).map(|(first, last, _)| (first, last)));
                }
                true
            })
            .map_err(ChunkError::Curl)?;
        transfer
            .write_function(|data| {
                let code = status.get();
                if code == 200 {
                    abort.set(Some(Abort::RangeIgnored));
                    return Ok(0);
                }
                if !(200..300).contains(&code) {
                    // Error page; status is reported after perform.
                    return Ok(data.len());
                }
                seen.set(seen.get() + data.len() as u64);
                if seen.get() > expected {
                    abort.set(Some(Abort::Overflow));
                    return Ok(0);
                }
                body.extend_from_slice(data);
                Ok(data.len())
            })
            .map_err(ChunkError::Curl)?;
        transfer
            .progress_function(|_, _, _, _| !cancel.is_cancelled())
            .map_err(ChunkError::Curl)?;
        transfer.perform()
    };

    if let Err(e) = performed {
        if abort.get() == Some(Abort::Overflow) {
            return Err(ChunkError::PartialTransfer {
                expected,
                received: seen.get(),
            });
        }
        return Err(perform_error(e, &abort, cancel));
    }

    let code = easy.response_code().map_err(ChunkError::Curl)?;
    if code == 200 {
        return Err(ChunkError::RangeIgnored);
    }
    if !(200..300).contains(&code) {
        return Err(ChunkError::Http(code));
    }
    if let Some((first, last)) = served.get() {
        if (first, last) != (range.start, range.end.saturating_sub(1)) {
            return Err(ChunkError::RangeMismatch {
                requested: range,
                first,
                last,
            });
        }
    }
    let received = body.len() as u64;
    if received != expected {
        return Err(ChunkError::PartialTransfer { expected, received });
    }
    Ok(body)
}
