//! Disk I/O and file lifecycle.
//!
//! Preallocates temp files (fallocate on Linux when available, else set_len),
//! supports concurrent offset writes (pwrite), keeps the resume sidecar in
//! step with durable data, and promotes verified files with an atomic rename.

mod builder;
mod destination;
mod writer;

pub use builder::StorageWriterBuilder;
pub use destination::{DestinationWriter, WriteAck};
pub use writer::StorageWriter;

use std::fs::{self, File};
use std::io::{self, Write};
use std::path::{Path, PathBuf};

/// Temporary file suffix used before atomic rename.
pub const TEMP_SUFFIX: &str = ".part";

/// Resume sidecar suffix.
pub const SIDECAR_SUFFIX: &str = ".resume";

/// Marker next to a promoted file holding the content hash it was
/// verified against.
pub const VERIFIED_SUFFIX: &str = ".verified";

fn with_suffix(final_path: &Path, suffix: &str) -> PathBuf {
    let mut o = final_path.as_os_str().to_owned();
    o.push(suffix);
    PathBuf::from(o)
}

/// Path for the temp file: `model.gguf` → `model.gguf.part`.
pub fn temp_path(final_path: &Path) -> PathBuf {
    with_suffix(final_path, TEMP_SUFFIX)
}

/// Path for the resume sidecar: `model.gguf` → `model.gguf.resume`.
pub fn sidecar_path(final_path: &Path) -> PathBuf {
    with_suffix(final_path, SIDECAR_SUFFIX)
}

/// Path for the verified marker: `model.gguf` → `model.gguf.verified`.
pub fn verified_path(final_path: &Path) -> PathBuf {
    with_suffix(final_path, VERIFIED_SUFFIX)
}

/// Hash recorded when `final_path` was promoted, if any.
pub fn read_verified(final_path: &Path) -> io::Result<Option<String>> {
    match fs::read_to_string(verified_path(final_path)) {
        Ok(s) => Ok(Some(s.trim().to_string())),
        Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(None),
        Err(e) => Err(e),
    }
}

/// Replaces `path` with `data`: write `<path>.tmp`, fsync, rename.
pub(crate) fn write_atomic(path: &Path, data: &[u8]) -> io::Result<()> {
    let tmp = with_suffix(path, ".tmp");
    {
        let mut f = File::create(&tmp)?;
        f.write_all(data)?;
        f.sync_all()?;
    }
    fs::rename(&tmp, path)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Read;

    #[test]
    fn suffix_paths() {
        assert_eq!(
            temp_path(Path::new("/tmp/m.gguf")).to_string_lossy(),
            "/tmp/m.gguf.part"
        );
        assert_eq!(
            sidecar_path(Path::new("BF16/m.gguf")).to_string_lossy(),
            "BF16/m.gguf.resume"
        );
        assert_eq!(
            verified_path(Path::new("m.gguf")).to_string_lossy(),
            "m.gguf.verified"
        );
    }

    #[test]
    fn verified_marker_roundtrip() {
        let dir = tempfile::tempdir().unwrap();
        let target = dir.path().join("m.gguf");
        assert_eq!(read_verified(&target).unwrap(), None);
        write_atomic(&verified_path(&target), b"sha256:ab\n").unwrap();
        assert_eq!(read_verified(&target).unwrap().as_deref(), Some("sha256:ab"));
        assert!(!dir.path().join("m.gguf.verified.tmp").exists());
    }

    #[test]
    fn write_at_from_clones() {
        let dir = tempfile::tempdir().unwrap();
        let tp = dir.path().join("out.part");
        let mut builder = StorageWriterBuilder::create(&tp).unwrap();
        builder.preallocate(20).unwrap();
        let writer = builder.build();
        let w2 = writer.clone();
        writer.write_at(0, b"aaaa").unwrap();
        w2.write_at(10, b"bbbb").unwrap();
        writer.write_at(4, b"cccc").unwrap();
        writer.sync().unwrap();
        assert_eq!(writer.len().unwrap(), 20);
        let final_p = dir.path().join("out.bin");
        writer.finalize(&final_p).unwrap();
        let mut buf = vec![0u8; 20];
        std::fs::File::open(&final_p)
            .unwrap()
            .read_exact(&mut buf)
            .unwrap();
        assert_eq!(&buf[0..4], b"aaaa");
        assert_eq!(&buf[4..8], b"cccc");
        assert_eq!(&buf[10..14], b"bbbb");
    }
}
