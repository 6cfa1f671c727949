//! Resolved remote files for one model reference.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::{Path, PathBuf};

use crate::error::DownloadError;
use crate::reference::ModelReference;
use crate::storage::write_atomic;

/// Tag used in the saved manifest name when the reference has none.
const DEFAULT_TAG: &str = "latest";

/// Content hash reported by the registry for a file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "value", rename_all = "snake_case")]
pub enum ContentHash {
    /// Lowercase hex SHA-256 of the full file (LFS object id).
    Sha256(String),
    /// Registry gave no content hash; only the size can be checked.
    SizeOnly,
}

impl fmt::Display for ContentHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ContentHash::Sha256(hex) => write!(f, "sha256:{}", hex),
            ContentHash::SizeOnly => write!(f, "size-only"),
        }
    }
}

/// One file on the registry belonging to a resolved reference.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RemoteFile {
    /// Repository-relative path (e.g. `BF16/model-BF16-00001-of-00002.gguf`).
    pub path: String,
    pub size_bytes: u64,
    pub content_hash: ContentHash,
    pub source_url: String,
}

/// Ordered, non-empty list of files for one resolution.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RemoteManifest {
    pub reference: ModelReference,
    pub files: Vec<RemoteFile>,
}

impl RemoteManifest {
    pub fn total_bytes(&self) -> u64 {
        self.files.iter().map(|f| f.size_bytes).sum()
    }
}

/// Resolution record written next to the downloaded files.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SavedManifest {
    pub reference: String,
    pub files: Vec<RemoteFile>,
}

/// `manifest={owner}={name}={tag}.json`.
pub fn manifest_filename(reference: &ModelReference) -> String {
    format!(
        "manifest={}={}={}.json",
        reference.owner,
        reference.name,
        reference.quant_tag.as_deref().unwrap_or(DEFAULT_TAG)
    )
}

impl RemoteManifest {
    /// Writes the manifest as JSON into `dest_dir`, replacing an earlier
    /// one for the same reference.
    pub fn save(&self, dest_dir: &Path) -> Result<PathBuf, DownloadError> {
        let path = dest_dir.join(manifest_filename(&self.reference));
        let saved = SavedManifest {
            reference: self.reference.to_string(),
            files: self.files.clone(),
        };
        let json = serde_json::to_vec_pretty(&saved).map_err(|e| DownloadError::disk_io(&path, e.into()))?;
        write_atomic(&path, &json).map_err(|e| DownloadError::disk_io(&path, e))?;
        tracing::debug!(path = %path.display(), "manifest saved");
        Ok(path)
    }
}
