//! Resume state: the per-file sidecar recording durable byte ranges, the
//! check that it still matches the remote file, and the scan that collects
//! it from a destination directory.

mod scan;
mod state;
mod validate;

pub use scan::{scan_local, LocalFile, LocalSnapshot};
pub use state::{ResumeState, RESUME_FORMAT_VERSION};
pub use validate::{validate_for_resume, StaleReason};
