//! File inputs.
//!
//! The engine only needs a name, a MIME type, a byte length and the ability
//! to read a byte range. [`MemoryFile`] and [`LocalFile`] cover in-memory
//! buffers and files on the local filesystem.

use std::fmt;
use std::io::SeekFrom;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use bytes::Bytes;
use tokio::io::{AsyncReadExt, AsyncSeekExt};

use crate::error::{UploadError, UploadResult};

/// A file that can be uploaded in parts.
#[async_trait]
pub trait UploadFile: Send + Sync + fmt::Debug {
    /// File name, used as the last segment of the object key.
    fn name(&self) -> &str;

    /// MIME type sent as the object's `Content-Type`.
    fn content_type(&self) -> &str;

    /// Total size in bytes.
    fn size(&self) -> u64;

    /// Read bytes `start..end`.
    async fn read_range(&self, start: u64, end: u64) -> UploadResult<Bytes>;
}

fn check_range(start: u64, end: u64, size: u64) -> UploadResult<()> {
    if start > end || end > size {
        return Err(UploadError::InvalidFile(format!(
            "range {start}..{end} outside file of {size} bytes"
        )));
    }
    Ok(())
}

/// A file held entirely in memory.
///
/// # Examples
///
/// ```
/// use evaporust_core::file::{MemoryFile, UploadFile};
///
/// let file = MemoryFile::new("notes.txt", "text/plain", "hello world");
/// assert_eq!(file.size(), 11);
/// # tokio_test::block_on(async {
/// let bytes = file.read_range(6, 11).await.unwrap();
/// assert_eq!(&bytes[..], b"world");
/// # });
/// ```
#[derive(Debug, Clone)]
pub struct MemoryFile {
    name: String,
    content_type: String,
    data: Bytes,
}

impl MemoryFile {
    /// An in-memory file named `name` holding `data`.
    pub fn new(
        name: impl Into<String>,
        content_type: impl Into<String>,
        data: impl Into<Bytes>,
    ) -> Self {
        Self {
            name: name.into(),
            content_type: content_type.into(),
            data: data.into(),
        }
    }
}

#[async_trait]
impl UploadFile for MemoryFile {
    fn name(&self) -> &str {
        &self.name
    }

    fn content_type(&self) -> &str {
        &self.content_type
    }

    fn size(&self) -> u64 {
        self.data.len() as u64
    }

    async fn read_range(&self, start: u64, end: u64) -> UploadResult<Bytes> {
        check_range(start, end, self.size())?;
        let (Ok(start), Ok(end)) = (usize::try_from(start), usize::try_from(end)) else {
            return Err(UploadError::InvalidFile(format!("range {start}..{end} too large")));
        };
        Ok(self.data.slice(start..end))
    }
}

/// A file on the local filesystem, read range by range.
///
/// The MIME type is guessed from the file extension.
#[derive(Debug, Clone)]
pub struct LocalFile {
    path: PathBuf,
    name: String,
    content_type: String,
    size: u64,
}

impl LocalFile {
    /// Open `path`, recording its size and guessing its MIME type.
    ///
    /// # Errors
    ///
    /// Returns [`UploadError::Io`] if the file metadata cannot be read, or
    /// [`UploadError::InvalidFile`] if the path is not a regular file.
    pub async fn open(path: impl AsRef<Path>) -> UploadResult<Self> {
        let path = path.as_ref().to_path_buf();
        let metadata = tokio::fs::metadata(&path).await?;
        if !metadata.is_file() {
            return Err(UploadError::InvalidFile(format!(
                "{} is not a regular file",
                path.display()
            )));
        }

        let name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();
        let content_type = mime_guess::from_path(&path)
            .first_or_octet_stream()
            .essence_str()
            .to_owned();

        Ok(Self {
            path,
            name,
            content_type,
            size: metadata.len(),
        })
    }

    /// Override the guessed MIME type.
    #[must_use]
    pub fn with_content_type(mut self, content_type: &mime::Mime) -> Self {
        self.content_type = content_type.essence_str().to_owned();
        self
    }

    /// Path of the file on disk.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }
}

#[async_trait]
impl UploadFile for LocalFile {
    fn name(&self) -> &str {
        &self.name
    }

    fn content_type(&self) -> &str {
        &self.content_type
    }

    fn size(&self) -> u64 {
        self.size
    }

    async fn read_range(&self, start: u64, end: u64) -> UploadResult<Bytes> {
        check_range(start, end, self.size)?;
        let mut file = tokio::fs::File::open(&self.path).await?;
        file.seek(SeekFrom::Start(start)).await?;

        let len = usize::try_from(end - start)
            .map_err(|_| UploadError::InvalidFile(format!("range {start}..{end} too large")))?;
        let mut buf = vec![0u8; len];
        file.read_exact(&mut buf).await?;
        Ok(Bytes::from(buf))
    }
}

#[cfg(test)]
mod tests {
    use std::io::Write;

    use super::*;

    #[tokio::test]
    async fn test_should_read_memory_file_ranges() {
        let file = MemoryFile::new("a.bin", "application/octet-stream", vec![1u8, 2, 3, 4, 5]);
        assert_eq!(&file.read_range(0, 2).await.unwrap()[..], &[1, 2]);
        assert_eq!(&file.read_range(4, 5).await.unwrap()[..], &[5]);
        assert!(file.read_range(5, 5).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_should_reject_out_of_bounds_range() {
        let file = MemoryFile::new("a.bin", "application/octet-stream", vec![0u8; 4]);
        assert!(matches!(
            file.read_range(2, 5).await,
            Err(UploadError::InvalidFile(_))
        ));
        assert!(matches!(
            file.read_range(3, 2).await,
            Err(UploadError::InvalidFile(_))
        ));
    }

    #[tokio::test]
    async fn test_should_open_local_file_and_guess_mime() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("report.json");
        std::fs::File::create(&path)
            .unwrap()
            .write_all(b"{\"ok\":true}")
            .unwrap();

        let file = LocalFile::open(&path).await.unwrap();
        assert_eq!(file.name(), "report.json");
        assert_eq!(file.content_type(), "application/json");
        assert_eq!(file.size(), 11);
        assert_eq!(&file.read_range(1, 5).await.unwrap()[..], b"\"ok\"");
    }

    #[tokio::test]
    async fn test_should_default_unknown_extension_to_octet_stream() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("blob.unknownext");
        std::fs::write(&path, b"x").unwrap();

        let file = LocalFile::open(&path).await.unwrap();
        assert_eq!(file.content_type(), "application/octet-stream");

        let file = file.with_content_type(&mime::TEXT_PLAIN);
        assert_eq!(file.content_type(), "text/plain");
    }

    #[tokio::test]
    async fn test_should_reject_directory() {
        let dir = tempfile::tempdir().unwrap();
        assert!(matches!(
            LocalFile::open(dir.path()).await,
            Err(UploadError::InvalidFile(_))
        ));
    }
}
