//! Remote manifest resolution against a Hugging Face–compatible registry.
//!
//! HTTP lives in [`fetch`]; everything that decides *which* files belong to
//! a reference is pure and lives in [`select`], [`quant`] and [`shard`].

mod fetch;
pub mod quant;
pub mod select;
pub mod shard;
pub mod types;

pub use types::{DefaultFile, LatestManifest, TreeEntry};

use crate::config::{self, ModelPullConfig};
use crate::downloader::CurlOptions;
use crate::error::DownloadError;
use crate::manifest::RemoteManifest;
use crate::reference::ModelReference;
use crate::retry::RetryPolicy;

/// Read-only client for one registry endpoint and revision.
#[derive(Debug, Clone)]
pub struct RegistryClient {
    endpoint: url::Url,
    revision: String,
    curl: CurlOptions,
    retry: RetryPolicy,
}

impl RegistryClient {
    pub fn new(
        endpoint: &str,
        revision: &str,
        curl: CurlOptions,
        retry: RetryPolicy,
    ) -> Result<Self, DownloadError> {
        let endpoint = url::Url::parse(endpoint.trim_end_matches('/')).map_err(|e| {
            DownloadError::Registry {
                url: endpoint.to_string(),
                reason: format!("invalid endpoint: {e}"),
            }
        })?;
        Ok(Self {
            endpoint,
            revision: revision.to_string(),
            curl,
            retry,
        })
    }

    /// Client from config plus environment (`MODEL_ENDPOINT`, `HF_ENDPOINT`, `HF_TOKEN`).
    pub fn from_config(cfg: &ModelPullConfig) -> Result<Self, DownloadError> {
        Self::new(
            &cfg.resolve_endpoint(),
            &cfg.revision,
            CurlOptions::from_config(cfg, config::token_from_env()),
            cfg.retry_policy(),
        )
    }

    pub fn endpoint(&self) -> &str {
        self.endpoint.as_str()
    }

    fn url_with<'a>(&self, segments: impl IntoIterator<Item = &'a str>) -> url::Url {
        let mut u = self.endpoint.clone();
        if let Ok(mut path) = u.path_segments_mut() {
            path.pop_if_empty().extend(segments);
        }
        u
    }

    /// `{endpoint}/api/models/{owner}/{name}/tree/{revision}?recursive=true`
    pub fn tree_url(&self, r: &ModelReference) -> String {
        let mut u = self.url_with([
            "api",
            "models",
            r.owner.as_str(),
            r.name.as_str(),
            "tree",
            self.revision.as_str(),
        ]);
        u.query_pairs_mut().append_pair("recursive", "true");
        u.into()
    }

    /// `{endpoint}/v2/{owner}/{name}/manifests/latest`
    pub fn latest_url(&self, r: &ModelReference) -> String {
        self.url_with(["v2", r.owner.as_str(), r.name.as_str(), "manifests", "latest"]).into()
    }

    /// `{endpoint}/{owner}/{name}/resolve/{revision}/{path}`
    pub fn content_url(&self, r: &ModelReference, path: &str) -> String {
        let head = [r.owner.as_str(), r.name.as_str(), "resolve", self.revision.as_str()];
        self.url_with(head.into_iter().chain(path.split('/'))).into()
    }

    /// Full recursive file listing. A missing repository is `Registry`.
    pub fn list_files(&self, r: &ModelReference) -> Result<Vec<TreeEntry>, DownloadError> {
        let url = self.tree_url(r);
        fetch::fetch_json(&url, &self.curl, &self.retry)?.ok_or_else(|| DownloadError::Registry {
            url,
            reason: "repository or revision not found".to_string(),
        })
    }

    /// The registry's default variant, if it marks one.
    pub fn default_file(&self, r: &ModelReference) -> Result<Option<DefaultFile>, DownloadError> {
        let latest: Option<LatestManifest> = fetch::fetch_json(&self.latest_url(r), &self.curl, &self.retry)?;
        Ok(latest.and_then(|m| m.gguf_file))
    }

    /// Resolves `r` into an ordered manifest without downloading any file body.
    pub fn resolve(&self, r: &ModelReference) -> Result<RemoteManifest, DownloadError> {
        let default = match r.quant_tag {
            Some(_) => None,
            None => Some(self.default_file(r)?.ok_or_else(|| DownloadError::QuantRequired {
                repo: r.repo(),
            })?),
        };
        let entries = self.list_files(r)?;
        let selected = select::select(r, &entries, default.as_ref())?;
        let files = selected
            .into_iter()
            .map(|e| {
                let url = self.content_url(r, &e.path);
                e.into_remote(url)
            })
            .collect::<Vec<_>>();
        tracing::info!(
            reference = %r,
            files = files.len(),
            "resolved manifest"
        );
        Ok(RemoteManifest {
            reference: r.clone(),
            files,
        })
    }
}
