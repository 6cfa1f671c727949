//! Registry JSON payloads.

use serde::{Deserialize, Serialize};

use crate::manifest::{ContentHash, RemoteFile};

/// One entry of `GET /api/models/{repo}/tree/{revision}?recursive=true`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TreeEntry {
    #[serde(rename = "type", default = "file_kind")]
    pub kind: String,
    pub path: String,
    #[serde(default)]
    pub size: u64,
    #[serde(default)]
    pub oid: Option<String>,
    #[serde(default)]
    pub lfs: Option<LfsInfo>,
}

fn file_kind() -> String {
    "file".to_string()
}

/// Git LFS pointer metadata; `oid` is the SHA-256 of the content.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LfsInfo {
    pub oid: String,
    pub size: u64,
}

/// `GET /v2/{repo}/manifests/latest`.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct LatestManifest {
    #[serde(rename = "ggufFile", default)]
    pub gguf_file: Option<DefaultFile>,
}

/// Default variant named by the registry.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct DefaultFile {
    pub rfilename: String,
    #[serde(default)]
    pub size: Option<u64>,
}

impl TreeEntry {
    pub fn is_file(&self) -> bool {
        self.kind == "file"
    }

    /// Size of the content: the LFS size when present, else the blob size.
    pub fn content_size(&self) -> u64 {
        self.lfs.as_ref().map(|l| l.size).unwrap_or(self.size)
    }

    /// SHA-256 from LFS metadata. Git blob ids are SHA-1 of a header plus
    /// content and are not usable as a content hash.
    pub fn content_hash(&self) -> ContentHash {
        self.lfs
            .as_ref()
            .and_then(|l| normalize_sha256(&l.oid))
            .map(ContentHash::Sha256)
            .unwrap_or(ContentHash::SizeOnly)
    }

    pub fn into_remote(self, source_url: String) -> RemoteFile {
        RemoteFile {
            size_bytes: self.content_size(),
            content_hash: self.content_hash(),
            path: self.path,
            source_url,
        }
    }
}

fn normalize_sha256(oid: &str) -> Option<String> {
    let hex = oid.strip_prefix("sha256:").unwrap_or(oid);
    (hex.len() == 64 && hex.chars().all(|c| c.is_ascii_hexdigit())).then(|| hex.to_ascii_lowercase())
}
