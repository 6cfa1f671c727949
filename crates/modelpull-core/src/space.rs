//! Pre-flight free-space check for the destination filesystem.

use std::path::Path;

use crate::error::DownloadError;
use crate::planner::TransferPlan;

/// Bytes the run will newly allocate: full size of every file that gets a
/// fresh temp file. Resumed temp files are already preallocated.
pub fn required_bytes(plan: &TransferPlan) -> u64 {
    plan.files
        .iter()
        .filter(|f| f.needs_new_temp())
        .map(|f| f.file.size_bytes)
        .sum()
}

/// Fails with `InsufficientSpace` when the filesystem holding `plan.dest_dir`
/// obviously cannot fit the run. Where free space cannot be determined the
/// check passes.
pub fn check_free_space(plan: &TransferPlan) -> Result<(), DownloadError> {
    let required = required_bytes(plan);
    if required == 0 {
        return Ok(());
    }
    let dir = existing_ancestor(&plan.dest_dir);
    let Some(available) = available_bytes(dir)? else {
        return Ok(());
    };
    if available < required {
        return Err(DownloadError::InsufficientSpace {
            dir: plan.dest_dir.clone(),
            required,
            available,
        });
    }
    tracing::debug!(required, available, dir = %dir.display(), "free space ok");
    Ok(())
}

/// The destination may not exist yet; measure the nearest existing parent.
fn existing_ancestor(dir: &Path) -> &Path {
    dir.ancestors()
        .find(|p| p.exists())
        .unwrap_or_else(|| Path::new("."))
}

#[cfg(unix)]
fn available_bytes(dir: &Path) -> Result<Option<u64>, DownloadError> {
    use std::ffi::CString;
    use std::os::unix::ffi::OsStrExt;

    let measured = if dir.as_os_str().is_empty() {
        Path::new(".")
    } else {
        dir
    };
    let c_path = CString::new(measured.as_os_str().as_bytes()).map_err(|e| {
        DownloadError::disk_io(measured, std::io::Error::new(std::io::ErrorKind::InvalidInput, e))
    })?;
    let mut st: libc::statvfs = unsafe { std::mem::zeroed() };
    let r = unsafe { libc::statvfs(c_path.as_ptr(), &mut st) };
    if r != 0 {
        return Err(DownloadError::disk_io(measured, std::io::Error::last_os_error()));
    }
    Ok(Some((st.f_bavail as u64).saturating_mul(st.f_frsize as u64)))
}

#[cfg(not(unix))]
fn available_bytes(_dir: &Path) -> Result<Option<u64>, DownloadError> {
    Ok(None)
}
