//! Results of the multipart upload operations.

use crate::types::MultipartUpload;

/// S3 `InitiateMultipartUploadResult`.
#[derive(Debug, Clone, Default)]
pub struct CreateMultipartUploadOutput {
    /// Bucket of the new upload.
    pub bucket: Option<String>,
    /// Object key of the new upload.
    pub key: Option<String>,
    /// Id addressing the upload in every later call.
    pub upload_id: Option<String>,
}

/// S3 `CompleteMultipartUploadResult`.
#[derive(Debug, Clone, Default)]
pub struct CompleteMultipartUploadOutput {
    /// URL of the assembled object.
    pub location: Option<String>,
    /// Bucket holding the object.
    pub bucket: Option<String>,
    /// Key of the object.
    pub key: Option<String>,
    /// ETag of the assembled object.
    pub e_tag: Option<String>,
}

/// S3 `ListMultipartUploadsResult`, one page.
#[derive(Debug, Clone, Default)]
pub struct ListMultipartUploadsOutput {
    /// Listed bucket.
    pub bucket: Option<String>,
    /// Key marker this page started after.
    pub key_marker: Option<String>,
    /// Upload id marker this page started after.
    pub upload_id_marker: Option<String>,
    /// Key marker for the next page.
    pub next_key_marker: Option<String>,
    /// Upload id marker for the next page.
    pub next_upload_id_marker: Option<String>,
    /// Page size limit.
    pub max_uploads: Option<i32>,
    /// Whether more pages follow.
    pub is_truncated: bool,
    /// Uploads on this page.
    pub uploads: Vec<MultipartUpload>,
}
