//! Splitting files into parts and checksumming them.
//!
//! A file of `S` bytes with part size `P` is split into `ceil(S / P)` ranges
//! `[0, P), [P, 2P), ...`, the last one truncated to the file end. An empty
//! file still yields a single empty part so the multipart upload can be
//! completed.

use base64::Engine;
use bytes::Bytes;
use md5::{Digest, Md5};

use crate::error::{UploadError, UploadResult};
use crate::file::UploadFile;

/// Largest number of parts S3 accepts in one multipart upload.
pub const MAX_PARTS: u64 = 10_000;

/// One contiguous byte range of a file.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PartRange {
    /// 1-based part number.
    pub part_number: i32,
    /// Inclusive start offset.
    pub start: u64,
    /// Exclusive end offset.
    pub end: u64,
}

impl PartRange {
    /// Number of bytes in the range.
    #[must_use]
    pub fn len(&self) -> u64 {
        self.end - self.start
    }

    /// Whether the range covers no bytes (only for an empty file).
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.start == self.end
    }
}

/// Plan the ordered part ranges of a file.
///
/// # Errors
///
/// Returns [`UploadError::Config`] when the file would need more than
/// [`MAX_PARTS`] parts at this part size.
///
/// # Examples
///
/// ```
/// use evaporust_core::chunker::plan_parts;
///
/// let mib = 1024 * 1024;
/// let parts = plan_parts(12 * mib, 5 * mib).unwrap();
/// let sizes: Vec<u64> = parts.iter().map(|p| p.len()).collect();
/// assert_eq!(sizes, [5 * mib, 5 * mib, 2 * mib]);
/// ```
pub fn plan_parts(file_size: u64, part_size: u64) -> UploadResult<Vec<PartRange>> {
    let part_size = part_size.max(1);
    if file_size == 0 {
        return Ok(vec![PartRange {
            part_number: 1,
            start: 0,
            end: 0,
        }]);
    }

    let count = file_size.div_ceil(part_size);
    if count > MAX_PARTS {
        return Err(UploadError::Config(format!(
            "a {file_size} byte file needs {count} parts of {part_size} bytes, \
             more than the {MAX_PARTS} allowed; raise 'partSize'"
        )));
    }

    (1..=count)
        .map(|n| {
            let part_number = i32::try_from(n)
                .map_err(|_| UploadError::Config(format!("part number {n} out of range")))?;
            let start = (n - 1) * part_size;
            Ok(PartRange {
                part_number,
                start,
                end: (start + part_size).min(file_size),
            })
        })
        .collect()
}

/// MD5 digest of one part in the two forms S3 uses.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PartChecksum {
    /// Base64 digest, sent as `Content-MD5`.
    pub base64: String,
    /// Hex digest, the body of the part's ETag.
    pub hex: String,
}

impl PartChecksum {
    /// Compute the checksum of `data`.
    ///
    /// # Examples
    ///
    /// ```
    /// use evaporust_core::chunker::PartChecksum;
    ///
    /// let checksum = PartChecksum::compute(b"hello");
    /// assert_eq!(checksum.hex, "5d41402abc4b2a76b9719d911017c592");
    /// assert_eq!(checksum.base64, "XUFAKrxLKna5cZ2REBfFkg==");
    /// assert_eq!(checksum.etag(), "\"5d41402abc4b2a76b9719d911017c592\"");
    /// ```
    #[must_use]
    pub fn compute(data: &[u8]) -> Self {
        let digest = Md5::digest(data);
        Self {
            base64: base64::engine::general_purpose::STANDARD.encode(digest),
            hex: hex::encode(digest),
        }
    }

    /// The ETag S3 derives for a part with this content (quoted hex MD5).
    #[must_use]
    pub fn etag(&self) -> String {
        format!("\"{}\"", self.hex)
    }
}

/// Upload status of a single part.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PartStatus {
    /// Read and queued, not yet dispatched.
    Pending,
    /// An upload attempt is running.
    Uploading,
    /// Uploaded; the task carries the ETag.
    Completed,
    /// Every attempt failed.
    Failed,
}

/// A part ready to be uploaded.
#[derive(Debug, Clone)]
pub struct PartTask {
    /// 1-based part number, equal to `range.part_number`.
    pub part_number: i32,
    /// Byte range of the file this part covers.
    pub range: PartRange,
    /// Part content. Released once the part has finished.
    pub data: Bytes,
    /// MD5 of `data`.
    pub checksum: PartChecksum,
    /// Where the part is in its upload.
    pub status: PartStatus,
    /// ETag returned by the object store once uploaded.
    pub e_tag: Option<String>,
}

impl PartTask {
    /// Build a pending task for `range` holding `data`.
    #[must_use]
    pub fn new(range: PartRange, data: Bytes) -> Self {
        let checksum = PartChecksum::compute(&data);
        Self {
            part_number: range.part_number,
            range,
            data,
            checksum,
            status: PartStatus::Pending,
            e_tag: None,
        }
    }

    /// Number of bytes in the part.
    #[must_use]
    pub fn len(&self) -> u64 {
        self.range.len()
    }

    /// Whether the part holds no bytes.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.range.is_empty()
    }

    /// Record the outcome of the upload and release the part bytes.
    pub fn finish(&mut self, status: PartStatus, e_tag: Option<String>) {
        self.status = status;
        self.e_tag = e_tag;
        self.data = Bytes::new();
    }
}

/// Read `range` from `file` and checksum it.
///
/// # Errors
///
/// Propagates the file's read error.
pub async fn read_part(file: &dyn UploadFile, range: PartRange) -> UploadResult<PartTask> {
    let data = file.read_range(range.start, range.end).await?;
    Ok(PartTask::new(range, data))
}
