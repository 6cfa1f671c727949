//! Single-stream HTTP GET (no Range) for servers without partial content.
//!
//! Hands the body sequentially to a sink starting at offset 0.

use std::cell::{Cell, RefCell};

use super::headers::parse_status_line;
use super::{perform_error, Abort, CurlOptions};
use crate::control::CancelToken;
use crate::retry::ChunkError;

/// Downloads `url` with a single GET, calling `sink(offset, data)` for each
/// received block. Returns the number of bytes delivered, which must equal
/// `expected_len`.
///
/// No wall-clock timeout applies; a stalled stream is caught by the
/// low-speed limit.
pub fn fetch_stream<F>(
    url: &str,
    expected_len: u64,
    opts: &CurlOptions,
    cancel: &CancelToken,
    mut sink: F,
) -> Result<u64, ChunkError>
where
    F: FnMut(u64, &[u8]) -> std::io::Result<()>,
{
    if cancel.is_cancelled() {
        return Err(ChunkError::Cancelled);
    }
    let status = Cell::new(0u32);
    let offset = Cell::new(0u64);
    let abort = Cell::new(None);
    let storage_error: RefCell<Option<std::io::Error>> = RefCell::new(None);

    let mut easy = opts.easy(url).map_err(ChunkError::Curl)?;
    easy.progress(true).map_err(ChunkError::Curl)?;

    let performed = {
        let mut transfer = easy.transfer();
        transfer
            .header_function(|line| {
                if let Some(code) = std::str::from_utf8(line).ok().and_then(parse_status_line) {
                    status.set(code);
                }
                true
            })
            .map_err(ChunkError::Curl)?;
        transfer
            .write_function(|data| {
                if !(200..300).contains(&status.get()) {
                    return Ok(data.len());
                }
                let off = offset.get();
                if off + data.len() as u64 > expected_len {
                    abort.set(Some(Abort::Overflow));
                    offset.set(off + data.len() as u64);
                    return Ok(0);
                }
                match sink(off, data) {
                    Ok(()) => {
                        offset.set(off + data.len() as u64);
                        Ok(data.len())
                    }
                    Err(e) => {
                        tracing::warn!("stream write failed: {}", e);
                        storage_error.replace(Some(e));
                        abort.set(Some(Abort::Storage));
                        Ok(0)
                    }
                }
            })
            .map_err(ChunkError::Curl)?;
        transfer
            .progress_function(|_, _, _, _| !cancel.is_cancelled())
            .map_err(ChunkError::Curl)?;
        transfer.perform()
    };

    let written = offset.get();
    if let Err(e) = performed {
        match abort.get() {
            Some(Abort::Storage) => {
                if let Some(io_err) = storage_error.take() {
                    return Err(ChunkError::Storage(io_err));
                }
            }
            Some(Abort::Overflow) => {
                return Err(ChunkError::PartialTransfer {
                    expected: expected_len,
                    received: written,
                })
            }
            _ => {}
        }
        return Err(perform_error(e, &abort, cancel));
    }

    let code = easy.response_code().map_err(ChunkError::Curl)?;
    if !(200..300).contains(&code) {
        return Err(ChunkError::Http(code));
    }
    if written != expected_len {
        return Err(ChunkError::PartialTransfer {
            expected: expected_len,
            received: written,
        });
    }
    Ok(written)
}
