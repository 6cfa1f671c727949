//! Minimal HTTP/1.1 registry for integration tests.
//!
//! Serves one repository `acme/model`: the recursive tree listing, the
//! `manifests/latest` default variant and file bodies under
//! `resolve/main/...` with Range support. Every body request is logged with
//! its range so tests can check what was (re)fetched.

use sha2::{Digest, Sha256};
use std::collections::HashMap;
use std::io::{Read, Write};
use std::net::{TcpListener, TcpStream};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::thread;
use std::time::Duration;

pub const OWNER: &str = "acme";
pub const NAME: &str = "model";

#[derive(Debug, Clone)]
pub struct RepoFile {
    pub path: String,
    pub body: Vec<u8>,
    /// Publish an LFS SHA-256 (otherwise only the size is known).
    pub lfs: bool,
}

impl RepoFile {
    pub fn new(path: &str, body: Vec<u8>) -> Self {
        Self {
            path: path.to_string(),
            body,
            lfs: true,
        }
    }

    pub fn sha256(&self) -> String {
        hex::encode(Sha256::digest(&self.body))
    }
}

#[derive(Debug, Clone, Default)]
pub struct ServerOptions {
    /// If false, GET ignores Range and always returns 200 with the full body.
    pub ignore_ranges: bool,
    /// `rfilename` reported by `manifests/latest`; 404 when None.
    pub default_file: Option<String>,
    /// Sleep before sending each body response.
    pub delay: Option<Duration>,
    /// Body served for these paths differs from the published hash.
    pub corrupt: Vec<String>,
    /// Like `corrupt`, but only the first body response is damaged.
    pub corrupt_once: Vec<String>,
    /// Listed in the tree, but body requests get 404.
    pub unavailable: Vec<String>,
    /// The first `n` body requests for `path` get `503 Service Unavailable`.
    pub fail_first: Vec<(String, usize)>,
    /// Ranged requests for these paths are answered with the same number of
    /// bytes taken from offset 0, labelled as such in `Content-Range`.
    pub misplaced_ranges: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BodyRequest {
    pub path: String,
    /// Inclusive `(start, end)` from the Range header.
    pub range: Option<(u64, u64)>,
}

struct Shared {
    files: Vec<RepoFile>,
    opts: ServerOptions,
    log: Mutex<Vec<BodyRequest>>,
    damaged_once: Mutex<HashMap<String, bool>>,
    failed: Mutex<HashMap<String, usize>>,
    metadata_requests: Mutex<Vec<String>>,
    delay_enabled: AtomicBool,
}

pub struct RegistryServer {
    pub endpoint: String,
    shared: Arc<Shared>,
}

impl RegistryServer {
    pub fn start(files: Vec<RepoFile>, opts: ServerOptions) -> Self {
        let listener = TcpListener::bind("127.0.0.1:0").expect("bind");
        let port = listener.local_addr().unwrap().port();
        let shared = Arc::new(Shared {
            files,
            opts,
            log: Mutex::new(Vec::new()),
            damaged_once: Mutex::new(HashMap::new()),
            failed: Mutex::new(HashMap::new()),
            metadata_requests: Mutex::new(Vec::new()),
            delay_enabled: AtomicBool::new(true),
        });
        let accept = Arc::clone(&shared);
        thread::spawn(move || {
            for stream in listener.incoming().flatten() {
                let shared = Arc::clone(&accept);
                thread::spawn(move || handle(stream, &shared));
            }
        });
        Self {
            endpoint: format!("http://127.0.0.1:{}", port),
            shared,
        }
    }

    pub fn reference(&self, tag: Option<&str>) -> String {
        match tag {
            Some(t) => format!("{OWNER}/{NAME}:{t}"),
            None => format!("{OWNER}/{NAME}"),
        }
    }

    /// Body requests received so far.
    pub fn body_requests(&self) -> Vec<BodyRequest> {
        self.shared.log.lock().unwrap().clone()
    }

    /// Bytes served in body responses so far.
    pub fn bytes_requested(&self) -> u64 {
        let files = &self.shared.files;
        self.body_requests()
            .iter()
            .map(|r| {
                let len = files
                    .iter()
                    .find(|f| f.path == r.path)
                    .map(|f| f.body.len() as u64)
                    .unwrap_or(0);
                match r.range {
                    Some((s, e)) => e.min(len.saturating_sub(1)) + 1 - s.min(len),
                    None => len,
                }
            })
            .sum()
    }

    pub fn clear_log(&self) {
        self.shared.log.lock().unwrap().clear();
        self.shared.metadata_requests.lock().unwrap().clear();
    }

    pub fn metadata_requests(&self) -> Vec<String> {
        self.shared.metadata_requests.lock().unwrap().clone()
    }

    pub fn set_delay_enabled(&self, on: bool) {
        self.shared.delay_enabled.store(on, Ordering::SeqCst);
    }
}

fn handle(mut stream: TcpStream, shared: &Shared) {
    let _ = stream.set_read_timeout(Some(Duration::from_secs(5)));
    let _ = stream.set_write_timeout(Some(Duration::from_secs(5)));
    let mut buf = Vec::new();
    let mut chunk = [0u8; 4096];
    while !buf.windows(4).any(|w| w == b"\r\n\r\n") {
        match stream.read(&mut chunk) {
            Ok(0) | Err(_) => return,
            Ok(n) => buf.extend_from_slice(&chunk[..n]),
        }
    }
    let request = String::from_utf8_lossy(&buf).to_string();
    let (target, range) = parse_request(&request);
    let path = target.split('?').next().unwrap_or("");

    let tree = format!("/api/models/{OWNER}/{NAME}/tree/main");
    let latest = format!("/v2/{OWNER}/{NAME}/manifests/latest");
    let resolve = format!("/{OWNER}/{NAME}/resolve/main/");

    if path == tree {
        shared.metadata_requests.lock().unwrap().push(path.to_string());
        let listing: Vec<serde_json::Value> = shared.files.iter().map(tree_entry).collect();
        return send(&mut stream, "200 OK", "application/json", &[], &serde_json::to_vec(&listing).unwrap());
    }
    if path == latest {
        shared.metadata_requests.lock().unwrap().push(path.to_string());
        let Some(name) = &shared.opts.default_file else {
            return send(&mut stream, "404 Not Found", "text/plain", &[], b"no default");
        };
        let size = shared.files.iter().find(|f| &f.path == name).map(|f| f.body.len());
        let doc = serde_json::json!({ "ggufFile": { "rfilename": name, "size": size } });
        return send(&mut stream, "200 OK", "application/json", &[], &serde_json::to_vec(&doc).unwrap());
    }
    if let Some(file_path) = path.strip_prefix(resolve.as_str()) {
        let Some(file) = shared.files.iter().find(|f| f.path == file_path) else {
            return send(&mut stream, "404 Not Found", "text/plain", &[], b"missing");
        };
        shared.log.lock().unwrap().push(BodyRequest {
            path: file.path.clone(),
            range,
        });
        if shared.opts.unavailable.contains(&file.path) {
            return send(&mut stream, "404 Not Found", "text/plain", &[], b"gone");
        }
        if fail_now(shared, &file.path) {
            return send(&mut stream, "503 Service Unavailable", "text/plain", &[], b"busy");
        }
        if let Some(d) = shared.opts.delay {
            if shared.delay_enabled.load(Ordering::SeqCst) {
                thread::sleep(d);
            }
        }
        let mut body = file.body.clone();
        if shared.opts.corrupt.contains(&file.path) || damage_once(shared, &file.path) {
            for b in body.iter_mut() {
                *b ^= 0x5a;
            }
        }
        let range = match range {
            Some((start, end)) if shared.opts.misplaced_ranges.contains(&file.path) => {
                Some((0, end.saturating_sub(start)))
            }
            other => other,
        };
        return send_body(&mut stream, &body, range, shared.opts.ignore_ranges);
    }
    send(&mut stream, "404 Not Found", "text/plain", &[], b"not found")
}

fn damage_once(shared: &Shared, path: &str) -> bool {
    if !shared.opts.corrupt_once.iter().any(|p| p == path) {
        return false;
    }
    let mut seen = shared.damaged_once.lock().unwrap();
    let done = seen.entry(path.to_string()).or_insert(false);
    !std::mem::replace(done, true)
}

fn fail_now(shared: &Shared, path: &str) -> bool {
    let Some((_, limit)) = shared.opts.fail_first.iter().find(|(p, _)| p == path) else {
        return false;
    };
    let mut failed = shared.failed.lock().unwrap();
    let count = failed.entry(path.to_string()).or_insert(0);
    if *count >= *limit {
        return false;
    }
    *count += 1;
    true
}

fn tree_entry(f: &RepoFile) -> serde_json::Value {
    let mut entry = serde_json::json!({
        "type": "file",
        "path": f.path,
        "size": if f.lfs { 134 } else { f.body.len() },
        "oid": "0000000000000000000000000000000000000000",
    });
    if f.lfs {
        entry["lfs"] = serde_json::json!({ "oid": f.sha256(), "size": f.body.len() });
    }
    entry
}

fn send_body(stream: &mut TcpStream, body: &[u8], range: Option<(u64, u64)>, ignore_ranges: bool) {
    let total = body.len() as u64;
    let Some((start, end_incl)) = range.filter(|_| !ignore_ranges) else {
        return send(stream, "200 OK", "application/octet-stream", &[], body);
    };
    let end_incl = end_incl.min(total.saturating_sub(1));
    if start > end_incl || start >= total {
        let cr = format!("Content-Range: bytes */{}", total);
        return send(stream, "416 Range Not Satisfiable", "text/plain", &[cr], b"");
    }
    let slice = &body[start as usize..=end_incl as usize];
    let cr = format!("Content-Range: bytes {}-{}/{}", start, end_incl, total);
    send(stream, "206 Partial Content", "application/octet-stream", &[cr], slice)
}

fn send(stream: &mut TcpStream, status: &str, content_type: &str, extra: &[String], body: &[u8]) {
    let mut head = format!(
        "HTTP/1.1 {}\r\nContent-Type: {}\r\nContent-Length: {}\r\nAccept-Ranges: bytes\r\nConnection: close\r\n",
        status,
        content_type,
        body.len()
    );
    for h in extra {
        head.push_str(h);
        head.push_str("\r\n");
    }
    head.push_str("\r\n");
    let _ = stream.write_all(head.as_bytes());
    let _ = stream.write_all(body);
    let _ = stream.flush();
}

/// Returns (request target, optional inclusive range from `Range: bytes=X-Y`).
fn parse_request(request: &str) -> (String, Option<(u64, u64)>) {
    let mut lines = request.lines();
    let target = lines
        .next()
        .and_then(|l| l.split_whitespace().nth(1))
        .unwrap_or("")
        .to_string();
    let mut range = None;
    for line in lines {
        let line = line.trim();
        if line.is_empty() {
            break;
        }
        if let Some((name, value)) = line.split_once(':') {
            if name.trim().eq_ignore_ascii_case("range") {
                let spec = value.trim().trim_start_matches("bytes=");
                if let Some((a, b)) = spec.split_once('-') {
                    let start = a.trim().parse::<u64>().unwrap_or(0);
                    let end = b.trim().parse::<u64>().unwrap_or(u64::MAX);
                    range = Some((start, end));
                }
            }
        }
    }
    (target, range)
}
