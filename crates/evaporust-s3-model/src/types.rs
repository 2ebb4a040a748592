//! Shared S3 shapes used by the multipart upload operations.

use serde::{Deserialize, Serialize};

/// A part reference in the `CompleteMultipartUpload` manifest.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CompletedPart {
    /// 1-based part number.
    pub part_number: i32,
    /// ETag returned by `UploadPart`, quotes included.
    pub e_tag: String,
}

impl CompletedPart {
    /// A part reference for `part_number` with its ETag.
    pub fn new(part_number: i32, e_tag: impl Into<String>) -> Self {
        Self {
            part_number,
            e_tag: e_tag.into(),
        }
    }
}

/// The `CompleteMultipartUpload` request body.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CompletedMultipartUpload {
    /// Uploaded parts, ascending by part number.
    pub parts: Vec<CompletedPart>,
}

impl CompletedMultipartUpload {
    /// Build a manifest with parts sorted ascending by part number.
    #[must_use]
    pub fn sorted(mut parts: Vec<CompletedPart>) -> Self {
        parts.sort_by_key(|p| p.part_number);
        Self { parts }
    }
}

/// An in-progress multipart upload as reported by `ListMultipartUploads`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MultipartUpload {
    /// Object key the upload writes to.
    pub key: String,
    /// Upload id to complete or abort with.
    pub upload_id: String,
    /// When the upload was created.
    pub initiated: Option<chrono::DateTime<chrono::Utc>>,
    /// Storage class requested at creation.
    pub storage_class: Option<String>,
}

/// An S3 `<Error>` document.
///
/// S3 may return one with HTTP 200 from `CompleteMultipartUpload`, so callers
/// must inspect the body even on success.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct S3ErrorBody {
    /// S3 error code, such as `NoSuchUpload`.
    pub code: String,
    /// Human-readable description.
    pub message: Option<String>,
    /// Object key the error refers to.
    pub key: Option<String>,
    /// Request id, for support cases.
    pub request_id: Option<String>,
}
