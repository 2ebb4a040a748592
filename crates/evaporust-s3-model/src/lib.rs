//! S3 multipart upload model types for Evaporust.
//!
//! Only the shapes exchanged by the multipart upload client are modelled:
//! the completion manifest sent to `CompleteMultipartUpload`, and the
//! results of create, complete and list calls.

pub mod output;
pub mod types;

pub use output::{
    CompleteMultipartUploadOutput, CreateMultipartUploadOutput, ListMultipartUploadsOutput,
};
pub use types::{CompletedMultipartUpload, CompletedPart, MultipartUpload, S3ErrorBody};
