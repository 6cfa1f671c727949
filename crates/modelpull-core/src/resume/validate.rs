//! Decides whether a loaded resume state still describes the remote file.

use std::fmt;

use super::state::{ResumeState, RESUME_FORMAT_VERSION};
use crate::manifest::RemoteFile;

/// Why recorded progress cannot be reused.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StaleReason {
    FormatVersion { found: u32 },
    SizeChanged { recorded: u64, remote: u64 },
    HashChanged,
    /// Recorded ranges reach past the end of the file.
    RangesOutOfBounds,
}

impl fmt::Display for StaleReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StaleReason::FormatVersion { found } => {
                write!(f, "resume format version {found} is not supported")
            }
            StaleReason::SizeChanged { recorded, remote } => {
                write!(f, "remote size changed ({recorded} -> {remote} bytes)")
            }
            StaleReason::HashChanged => write!(f, "remote content hash changed"),
            StaleReason::RangesOutOfBounds => write!(f, "recorded ranges exceed file size"),
        }
    }
}

/// Returns Ok(()) if `state` may be resumed against `remote`.
///
/// Both size and content hash must match exactly; anything else means the
/// bytes on disk may belong to a different revision.
pub fn validate_for_resume(state: &ResumeState, remote: &RemoteFile) -> Result<(), StaleReason> {
    if state.version != RESUME_FORMAT_VERSION {
        return Err(StaleReason::FormatVersion {
            found: state.version,
        });
    }
    if state.total_size != remote.size_bytes {
        return Err(StaleReason::SizeChanged {
            recorded: state.total_size,
            remote: remote.size_bytes,
        });
    }
    if state.content_hash != remote.content_hash {
        return Err(StaleReason::HashChanged);
    }
    if state.ranges.exceeds(remote.size_bytes) {
        return Err(StaleReason::RangesOutOfBounds);
    }
    Ok(())
}
