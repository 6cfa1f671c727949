//! Per-file destination: temp file, resume sidecar and final promotion.

use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard};

use super::{verified_path, write_atomic, StorageWriter, StorageWriterBuilder};
use crate::error::DownloadError;
use crate::manifest::ContentHash;
use crate::planner::{FilePlan, FileStatus};
use crate::resume::ResumeState;
use crate::segmenter::ByteRange;

fn disk_err(path: &Path) -> impl FnOnce(std::io::Error) -> DownloadError {
    let path = path.to_path_buf();
    move |e| DownloadError::disk_io(path, e)
}

/// Outcome of handing bytes to a [`DestinationWriter`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WriteAck {
    /// Bytes are durable and recorded.
    Recorded {
        /// Bytes of the file now covered.
        covered: u64,
        /// Coverage is exactly `[0, size)`.
        complete: bool,
    },
    /// Data belongs to an earlier generation and was dropped.
    Stale,
}

struct Inner {
    resume: ResumeState,
    generation: u64,
    /// Single-stream mode: no sidecar, progress kept in memory only.
    stream: bool,
}

/// Owns one file's `.part` temp file and `.resume` sidecar.
///
/// Chunk writes follow a fixed order: positional write, `fdatasync`, record
/// the range and persist the sidecar under the lock, then acknowledge. A
/// crash therefore loses at most the chunks that were not yet acknowledged.
///
/// The generation counter changes on [`reset`](Self::reset) and
/// [`begin_stream`](Self::begin_stream); writes tagged with an older
/// generation are dropped.
pub struct DestinationWriter {
    path: String,
    target: PathBuf,
    sidecar: PathBuf,
    total_size: u64,
    content_hash: ContentHash,
    storage: StorageWriter,
    inner: Mutex<Inner>,
}

impl DestinationWriter {
    /// Opens the temp file for `plan`: reuses it when resuming, otherwise
    /// creates and preallocates it and drops any stale sidecar.
    pub fn open(plan: &FilePlan) -> Result<Self, DownloadError> {
        let temp = &plan.temp_path;
        if let Some(dir) = temp.parent() {
            std::fs::create_dir_all(dir).map_err(|e| DownloadError::disk_io(dir, e))?;
        }
        let builder = match plan.status {
            FileStatus::Resuming => {
                StorageWriterBuilder::open_existing(temp).map_err(|e| DownloadError::disk_io(temp, e))?
            }
            _ => {
                ResumeState::remove(&plan.sidecar_path)
                    .map_err(|e| DownloadError::disk_io(&plan.sidecar_path, e))?;
                let mut b =
                    StorageWriterBuilder::create(temp).map_err(|e| DownloadError::disk_io(temp, e))?;
                b.preallocate(plan.file.size_bytes)
                    .map_err(|e| DownloadError::disk_io(temp, e))?;
                b
            }
        };
        Ok(Self {
            path: plan.file.path.clone(),
            target: plan.target.clone(),
            sidecar: plan.sidecar_path.clone(),
            total_size: plan.file.size_bytes,
            content_hash: plan.file.content_hash.clone(),
            storage: builder.build(),
            inner: Mutex::new(Inner {
                resume: plan.resume.clone(),
                generation: 0,
                stream: false,
            }),
        })
    }

    fn lock(&self) -> MutexGuard<'_, Inner> {
        self.inner.lock().unwrap_or_else(|p| p.into_inner())
    }

    pub fn path(&self) -> &str {
        &self.path
    }

    pub fn temp_path(&self) -> &Path {
        self.storage.temp_path()
    }

    pub fn target(&self) -> &Path {
        &self.target
    }

    pub fn total_size(&self) -> u64 {
        self.total_size
    }

    pub fn content_hash(&self) -> &ContentHash {
        &self.content_hash
    }

    pub fn generation(&self) -> u64 {
        self.lock().generation
    }

    pub fn covered_len(&self) -> u64 {
        self.lock().resume.ranges.covered_len()
    }

    pub fn is_complete(&self) -> bool {
        self.lock().resume.ranges.is_complete(self.total_size)
    }

    /// Ranges of the file not yet recorded.
    pub fn gaps(&self) -> Vec<ByteRange> {
        self.lock().resume.ranges.gaps(self.total_size)
    }

    /// Writes a fetched chunk at `offset` and records it durably.
    pub fn write(&self, generation: u64, offset: u64, data: &[u8]) -> Result<WriteAck, DownloadError> {
        if self.lock().generation != generation {
            return Ok(WriteAck::Stale);
        }
        let temp = self.temp_path().to_path_buf();
        self.storage
            .write_at(offset, data)
            .map_err(disk_err(&temp))?;
        self.storage.sync_data().map_err(disk_err(&temp))?;

        let mut inner = self.lock();
        if inner.generation != generation {
            return Ok(WriteAck::Stale);
        }
        inner
            .resume
            .ranges
            .insert(ByteRange::new(offset, offset + data.len() as u64));
        if !inner.stream {
            inner
                .resume
                .persist(&self.sidecar)
                .map_err(disk_err(&self.sidecar))?;
        }
        Ok(self.ack(&inner))
    }

    fn ack(&self, inner: &Inner) -> WriteAck {
        WriteAck::Recorded {
            covered: inner.resume.ranges.covered_len(),
            complete: inner.resume.ranges.is_complete(self.total_size),
        }
    }

    /// Switches to single-stream mode: clears recorded ranges, removes the
    /// sidecar and returns the new generation. The temp file keeps its size;
    /// the stream overwrites it from offset 0.
    pub fn begin_stream(&self) -> Result<u64, DownloadError> {
        let mut inner = self.lock();
        inner.generation += 1;
        inner.stream = true;
        inner.resume.ranges = Default::default();
        ResumeState::remove(&self.sidecar).map_err(disk_err(&self.sidecar))?;
        Ok(inner.generation)
    }

    /// Streaming write without sync or bookkeeping. Returns false when the
    /// generation is stale and the data was dropped.
    pub fn stream_write(&self, generation: u64, offset: u64, data: &[u8]) -> std::io::Result<bool> {
        if self.lock().generation != generation {
            return Ok(false);
        }
        self.storage.write_at(offset, data)?;
        Ok(true)
    }

    /// Makes streamed bytes `[0, upto)` durable and records them in memory.
    pub fn stream_checkpoint(&self, generation: u64, upto: u64) -> Result<WriteAck, DownloadError> {
        let temp = self.temp_path().to_path_buf();
        self.storage.sync_data().map_err(disk_err(&temp))?;
        let mut inner = self.lock();
        if inner.generation != generation {
            return Ok(WriteAck::Stale);
        }
        inner.resume.ranges.insert(ByteRange::new(0, upto));
        Ok(self.ack(&inner))
    }

    /// Discards all progress for a fresh attempt after failed verification:
    /// truncates and re-preallocates the temp file, removes the sidecar and
    /// returns the new generation. Stream mode is kept.
    pub fn reset(&self) -> Result<u64, DownloadError> {
        let mut inner = self.lock();
        inner.generation += 1;
        inner.resume.ranges = Default::default();
        ResumeState::remove(&self.sidecar).map_err(disk_err(&self.sidecar))?;
        let temp = self.temp_path().to_path_buf();
        self.storage
            .reset(self.total_size)
            .map_err(disk_err(&temp))?;
        Ok(inner.generation)
    }

    /// Promotes a verified temp file: fsync, rename to the final path,
    /// fsync the directory, delete the sidecar, then record the hash in the
    /// verified marker.
    pub fn finalize(&self) -> Result<(), DownloadError> {
        let inner = self.lock();
        debug_assert!(inner.resume.ranges.is_complete(self.total_size));
        let temp = self.temp_path().to_path_buf();
        self.storage.sync().map_err(disk_err(&temp))?;
        self.storage
            .finalize(&self.target)
            .map_err(disk_err(&self.target))?;
        ResumeState::remove(&self.sidecar).map_err(disk_err(&self.sidecar))?;
        let marker = verified_path(&self.target);
        write_atomic(&marker, self.content_hash.to_string().as_bytes()).map_err(disk_err(&marker))?;
        tracing::info!(path = %self.path, target = %self.target.display(), "file promoted");
        Ok(())
    }

    /// Removes the temp file and sidecar after a fatal failure.
    pub fn discard(&self) -> Result<(), DownloadError> {
        let mut inner = self.lock();
        inner.generation += 1;
        let temp = self.temp_path().to_path_buf();
        match std::fs::remove_file(&temp) {
            Err(e) if e.kind() != std::io::ErrorKind::NotFound => {
                return Err(DownloadError::disk_io(temp, e))
            }
            _ => {}
        }
        ResumeState::remove(&self.sidecar).map_err(disk_err(&self.sidecar))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::manifest::RemoteFile;
    use crate::storage::{sidecar_path, temp_path};
    use std::io::Read;

    fn plan_in(dir: &Path, name: &str, size: u64) -> FilePlan {
        let file = RemoteFile {
            path: name.to_string(),
            size_bytes: size,
            content_hash: ContentHash::SizeOnly,
            source_url: String::new(),
        };
        let target = dir.join(name);
        FilePlan {
            resume: ResumeState::new(&file),
            missing: vec![ByteRange::new(0, size)],
            temp_path: temp_path(&target),
            sidecar_path: sidecar_path(&target),
            target,
            file,
            status: FileStatus::Fresh,
        }
    }

    fn read_all(p: &Path) -> Vec<u8> {
        let mut buf = Vec::new();
        std::fs::File::open(p).unwrap().read_to_end(&mut buf).unwrap();
        buf
    }

    #[test]
    fn out_of_order_writes_then_finalize() {
        let dir = tempfile::tempdir().unwrap();
        let plan = plan_in(dir.path(), "m.gguf", 12);
        let w = DestinationWriter::open(&plan).unwrap();
        assert_eq!(std::fs::metadata(&plan.temp_path).unwrap().len(), 12);

        let g = w.generation();
        assert_eq!(
            w.write(g, 8, b"cccc").unwrap(),
            WriteAck::Recorded {
                covered: 4,
                complete: false
            }
        );
        assert!(plan.sidecar_path.exists());
        w.write(g, 0, b"aaaa").unwrap();
        let ack = w.write(g, 4, b"bbbb").unwrap();
        assert_eq!(
            ack,
            WriteAck::Recorded {
                covered: 12,
                complete: true
            }
        );

        let on_disk = ResumeState::load(&plan.sidecar_path).unwrap().unwrap();
        assert!(on_disk.ranges.is_complete(12));

        w.finalize().unwrap();
        assert_eq!(read_all(&plan.target), b"aaaabbbbcccc");
        assert!(!plan.temp_path.exists());
        assert!(!plan.sidecar_path.exists());
        assert_eq!(
            crate::storage::read_verified(&plan.target).unwrap().as_deref(),
            Some("size-only")
        );
    }

    #[test]
    fn stale_generation_is_dropped() {
        let dir = tempfile::tempdir().unwrap();
        let plan = plan_in(dir.path(), "m.gguf", 8);
        let w = DestinationWriter::open(&plan).unwrap();
        let old = w.generation();
        w.write(old, 0, b"xxxx").unwrap();
        let new = w.reset().unwrap();
        assert_ne!(old, new);
        assert_eq!(w.write(old, 4, b"yyyy").unwrap(), WriteAck::Stale);
        assert_eq!(w.covered_len(), 0);
        assert!(!plan.sidecar_path.exists());
        assert_eq!(read_all(&plan.temp_path), vec![0u8; 8]);
    }

    #[test]
    fn stream_mode_keeps_no_sidecar() {
        let dir = tempfile::tempdir().unwrap();
        let plan = plan_in(dir.path(), "m.gguf", 6);
        let w = DestinationWriter::open(&plan).unwrap();
        w.write(w.generation(), 0, b"zz").unwrap();
        assert!(plan.sidecar_path.exists());

        let g = w.begin_stream().unwrap();
        assert!(!plan.sidecar_path.exists());
        assert!(w.stream_write(g, 0, b"abc").unwrap());
        assert!(w.stream_write(g, 3, b"def").unwrap());
        assert_eq!(
            w.stream_checkpoint(g, 6).unwrap(),
            WriteAck::Recorded {
                covered: 6,
                complete: true
            }
        );
        assert!(!plan.sidecar_path.exists());
        w.finalize().unwrap();
        assert_eq!(read_all(&plan.target), b"abcdef");
    }

    #[test]
    fn resume_reopens_without_truncating() {
        let dir = tempfile::tempdir().unwrap();
        let mut plan = plan_in(dir.path(), "m.gguf", 8);
        {
            let w = DestinationWriter::open(&plan).unwrap();
            w.write(w.generation(), 0, b"abcd").unwrap();
        }
        plan.resume = ResumeState::load(&plan.sidecar_path).unwrap().unwrap();
        plan.missing = vec![ByteRange::new(4, 8)];
        plan.status = FileStatus::Resuming;
        let w = DestinationWriter::open(&plan).unwrap();
        assert_eq!(w.covered_len(), 4);
        w.write(w.generation(), 4, b"efgh").unwrap();
        assert!(w.is_complete());
        assert_eq!(read_all(&plan.temp_path), b"abcdefgh");
    }

    #[test]
    fn discard_removes_temp_and_sidecar() {
        let dir = tempfile::tempdir().unwrap();
        let plan = plan_in(dir.path(), "sub/m.gguf", 4);
        let w = DestinationWriter::open(&plan).unwrap();
        w.write(w.generation(), 0, b"ab").unwrap();
        w.discard().unwrap();
        assert!(!plan.temp_path.exists());
        assert!(!plan.sidecar_path.exists());
    }
}
