use std::io::{Read, Seek, SeekFrom};
use std::path::{Path, PathBuf};

use crate::TransferError;

/// Random-access byte source with a known total size.
///
/// Implementations must be safe to slice from several threads at once; the
/// parallel hasher hands the same source to every worker.
pub trait ByteSource: Send + Sync {
    /// Display name sent as the `filename` field of every chunk.
    fn name(&self) -> &str;

    /// Total size in bytes.
    fn size(&self) -> u64;

    /// Reads the half-open range `[start, end)`.
    fn slice(&self, start: u64, end: u64) -> Result<Vec<u8>, TransferError>;
}

fn check_range(start: u64, end: u64, size: u64) -> Result<(), TransferError> {
    if start > end || end > size {
        return Err(TransferError::InvalidRange { start, end, size });
    }
    Ok(())
}

/// In-memory source, mostly useful for small payloads and tests.
#[derive(Debug, Clone)]
pub struct MemorySource {
    name: String,
    data: Vec<u8>,
}

impl MemorySource {
    pub fn new(name: impl Into<String>, data: Vec<u8>) -> Self {
        Self {
            name: name.into(),
            data,
        }
    }
}

impl ByteSource for MemorySource {
    fn name(&self) -> &str {
        &self.name
    }

    fn size(&self) -> u64 {
        self.data.len() as u64
    }

    fn slice(&self, start: u64, end: u64) -> Result<Vec<u8>, TransferError> {
        check_range(start, end, self.size())?;
        Ok(self.data[start as usize..end as usize].to_vec())
    }
}

/// File-backed source.
///
/// Every slice opens its own handle, so concurrent readers never contend on
/// a shared cursor.
#[derive(Debug, Clone)]
pub struct FileSource {
    path: PathBuf,
    name: String,
    size: u64,
}

impl FileSource {
    /// Opens `path` and records its current size.
    ///
    /// The display name is the final path component.
    pub fn open(path: &Path) -> Result<Self, TransferError> {
        let size = std::fs::metadata(path)?.len();
        let name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| path.to_string_lossy().into_owned());
        Ok(Self {
            path: path.to_path_buf(),
            name,
            size,
        })
    }

    /// Overrides the display name.
    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl ByteSource for FileSource {
    fn name(&self) -> &str {
        &self.name
    }

    fn size(&self) -> u64 {
        self.size
    }

    fn slice(&self, start: u64, end: u64) -> Result<Vec<u8>, TransferError> {
        check_range(start, end, self.size)?;
        let mut file = std::fs::File::open(&self.path)?;
        file.seek(SeekFrom::Start(start))?;
        let mut buf = vec![0u8; (end - start) as usize];
        file.read_exact(&mut buf)?;
        Ok(buf)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::TempDir;

    #[test]
    fn memory_source_slices() {
        let src = MemorySource::new("a.bin", b"0123456789".to_vec());
        assert_eq!(src.size(), 10);
        assert_eq!(src.name(), "a.bin");
        assert_eq!(src.slice(2, 5).unwrap(), b"234");
        assert!(src.slice(0, 0).unwrap().is_empty());
    }

    #[test]
    fn memory_source_rejects_out_of_bounds() {
        let src = MemorySource::new("a.bin", b"0123".to_vec());
        assert!(matches!(
            src.slice(2, 9),
            Err(TransferError::InvalidRange { end: 9, size: 4, .. })
        ));
        assert!(src.slice(3, 2).is_err());
    }

    #[test]
    fn file_source_reads_ranges() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("movie.mp4");
        let mut f = std::fs::File::create(&path).unwrap();
        f.write_all(b"The quick brown fox").unwrap();
        drop(f);

        let src = FileSource::open(&path).unwrap();
        assert_eq!(src.name(), "movie.mp4");
        assert_eq!(src.size(), 19);
        assert_eq!(src.slice(4, 9).unwrap(), b"quick");
        assert_eq!(src.slice(16, 19).unwrap(), b"fox");
        assert!(src.slice(16, 20).is_err());
    }

    #[test]
    fn file_source_custom_name() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("tmp123");
        std::fs::write(&path, b"x").unwrap();
        let src = FileSource::open(&path).unwrap().with_name("report.pdf");
        assert_eq!(src.name(), "report.pdf");
    }

    #[test]
    fn file_source_missing_file() {
        let dir = TempDir::new().unwrap();
        let result = FileSource::open(&dir.path().join("nope"));
        assert!(matches!(result, Err(TransferError::Io(_))));
    }
}
