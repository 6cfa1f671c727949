//! Response header parsing.

/// Status code from an HTTP status line (`HTTP/1.1 206 Partial Content`,
/// `HTTP/2 200`). Returns None for other header lines.
pub(super) fn parse_status_line(line: &str) -> Option<u32> {
    let line = line.trim();
    let rest = line.strip_prefix("HTTP/")?;
    let mut parts = rest.split_whitespace();
    let _version = parts.next()?;
    parts.next()?.parse().ok()
}

/// Value of a `Content-Range` header line, if `line` is one.
pub(super) fn content_range_value(line: &str) -> Option<&str> {
    let (name, value) = line.split_once(':')?;
    name.trim()
        .eq_ignore_ascii_case("content-range")
        .then(|| value.trim())
}

/// Parses `bytes <first>-<last>/<total>` into an inclusive span and the
/// total length (`None` for `*`). An unsatisfied range (`bytes */1000`)
/// or malformed value gives None.
pub(super) fn parse_content_range(value: &str) -> Option<(u64, u64, Option<u64>)> {
    let rest = value.trim().strip_prefix("bytes")?.trim_start();
    let (span, total) = rest.split_once('/')?;
    let (first, last) = span.split_once('-')?;
    let first: u64 = first.trim().parse().ok()?;
    let last: u64 = last.trim().parse().ok()?;
    if last < first {
        return None;
    }
    let total = match total.trim() {
        "*" => None,
        n => Some(n.parse().ok()?),
    };
    Some((first, last, total))
}
