//! Concurrent offset writer for temp download files.

use std::fs::File;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::Arc;
#[cfg(unix)]
use std::os::unix::fs::FileExt;

/// Writer for a temp download file. Safe to clone and use from multiple
/// threads; each `write_at` is independent (pwrite-style).
#[derive(Clone)]
pub struct StorageWriter {
    file: Arc<File>,
    temp_path: PathBuf,
}

impl StorageWriter {
    pub(crate) fn from_file_and_path(file: File, temp_path: PathBuf) -> Self {
        Self {
            file: Arc::new(file),
            temp_path,
        }
    }

    /// Write all of `data` at `offset`. Does not move the file cursor; safe for concurrent use.
    #[cfg(unix)]
    pub fn write_at(&self, offset: u64, data: &[u8]) -> io::Result<()> {
        self.file.write_all_at(data, offset)
    }

    /// Non-Unix fallback: seek + write. Not safe for concurrent use.
    #[cfg(not(unix))]
    pub fn write_at(&self, offset: u64, data: &[u8]) -> io::Result<()> {
        use std::io::{Seek, SeekFrom, Write};
        let mut f = (*self.file).try_clone()?;
        f.seek(SeekFrom::Start(offset))?;
        f.write_all(data)
    }

    /// Flush file contents (not metadata) to disk.
    pub fn sync_data(&self) -> io::Result<()> {
        self.file.sync_data()
    }

    /// Flush contents and metadata. Call before `finalize` for durability.
    pub fn sync(&self) -> io::Result<()> {
        self.file.sync_all()
    }

    /// Drop all content and preallocate `size` zeroed bytes again.
    pub fn reset(&self, size: u64) -> io::Result<()> {
        self.file.set_len(0)?;
        super::builder::preallocate(&self.file, size)
    }

    /// Current on-disk length.
    pub fn len(&self) -> io::Result<u64> {
        Ok(self.file.metadata()?.len())
    }

    pub fn temp_path(&self) -> &Path {
        &self.temp_path
    }

    /// Rename the temp file to `final_path` and fsync the parent directory so
    /// the rename survives a crash. Fails if `final_path` is on another filesystem.
    pub fn finalize(&self, final_path: &Path) -> io::Result<()> {
        std::fs::rename(&self.temp_path, final_path)?;
        sync_parent_dir(final_path)
    }
}

#[cfg(unix)]
fn sync_parent_dir(path: &Path) -> io::Result<()> {
    match path.parent() {
        Some(dir) if !dir.as_os_str().is_empty() => File::open(dir)?.sync_all(),
        _ => Ok(()),
    }
}

#[cfg(not(unix))]
fn sync_parent_dir(_path: &Path) -> io::Result<()> {
    Ok(())
}
