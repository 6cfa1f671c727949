pub mod config;
pub mod logging;

pub mod checksum;
pub mod control;
pub mod downloader;
pub mod error;
pub mod manifest;
pub mod planner;
pub mod pull;
pub mod reference;
pub mod registry;
pub mod resume;
pub mod retry;
pub mod scheduler;
pub mod segmenter;
pub mod space;
pub mod storage;

pub use control::CancelToken;
pub use error::{DownloadError, FileFailure};
pub use manifest::{ContentHash, RemoteFile, RemoteManifest};
pub use planner::{FilePlan, FileStatus, TransferPlan};
pub use pull::{pull, PullOptions};
pub use reference::ModelReference;
pub use registry::RegistryClient;
pub use scheduler::{ProgressEvent, ProgressStats, RunOptions, RunReport};
