//! Builder for creating and preallocating temp download files.

use std::fs::File;
use std::io;
use std::path::{Path, PathBuf};

use super::writer::StorageWriter;
#[cfg(unix)]
use std::os::unix::io::AsRawFd;

/// Builder for a temp download file. Call `preallocate` then `build` to get
/// a `StorageWriter` that supports concurrent `write_at` from multiple workers.
pub struct StorageWriterBuilder {
    file: File,
    temp_path: PathBuf,
}

impl StorageWriterBuilder {
    /// Create a new temp file at `temp_path` (e.g. `model.gguf.part`).
    /// Truncates if the path already exists.
    pub fn create(temp_path: &Path) -> io::Result<Self> {
        let file = File::options()
            .read(true)
            .write(true)
            .create(true)
            .truncate(true)
            .open(temp_path)?;
        Ok(StorageWriterBuilder {
            file,
            temp_path: temp_path.to_path_buf(),
        })
    }

    /// Open an existing temp file for resume (read+write, no truncation).
    /// The file must already exist and have been preallocated.
    pub fn open_existing(temp_path: &Path) -> io::Result<Self> {
        let file = File::options().read(true).write(true).open(temp_path)?;
        Ok(StorageWriterBuilder {
            file,
            temp_path: temp_path.to_path_buf(),
        })
    }

    pub fn preallocate(&mut self, size: u64) -> io::Result<()> {
        preallocate(&self.file, size)
    }

    /// Finish building and return a writer that can be shared for concurrent writes.
    pub fn build(self) -> StorageWriter {
        StorageWriter::from_file_and_path(self.file, self.temp_path)
    }
}

/// Reserve `size` bytes. On Unix tries `posix_fallocate` for real block
/// allocation; falls back to `set_len` on failure or non-Unix.
pub(super) fn preallocate(file: &File, size: u64) -> io::Result<()> {
    #[cfg(unix)]
    {
        if size > 0 {
            let fd = file.as_raw_fd();
            let r = unsafe { libc::posix_fallocate(fd, 0, size as libc::off_t) };
            if r == 0 {
                return Ok(());
            }
            tracing::debug!(errno = r, "posix_fallocate failed, falling back to set_len");
        }
    }
    file.set_len(size)
}
