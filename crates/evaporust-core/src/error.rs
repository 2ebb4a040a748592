//! Upload error types.
//!
//! [`UploadError`] covers every failure the engine reports to callers. The
//! authorization and network variants stay distinct all the way up from the
//! signer so a denied signature is never mistaken for a connectivity problem.

use evaporust_auth::SigningError;
use evaporust_s3_xml::XmlError;

/// Errors produced by the upload engine.
#[derive(Debug, thiserror::Error)]
pub enum UploadError {
    /// The configuration is invalid.
    #[error("configuration error: {0}")]
    Config(String),

    /// A network call failed before a response was received.
    #[error("network error: {0}")]
    Network(#[from] reqwest::Error),

    /// The authorization endpoint refused to sign a request (401/403).
    #[error("authorization denied by signing endpoint (status {0})")]
    Auth(u16),

    /// The authorization endpoint failed for another reason.
    #[error("signature fetch failed: {0}")]
    SignatureFetch(String),

    /// A part still failed after every retry attempt.
    #[error("part {part_number} failed after {attempts} attempts: {reason}")]
    PartUpload {
        /// The failed part.
        part_number: i32,
        /// Attempts made before giving up.
        attempts: u32,
        /// Last error message.
        reason: String,
    },

    /// Completing or aborting the multipart upload failed.
    #[error("failed to finalize upload: {0}")]
    Finalize(String),

    /// No session is registered under this upload id.
    #[error("upload not found: {0}")]
    NotFound(String),

    /// The object store answered with an error status.
    #[error("object store returned {status} {code}")]
    ObjectStore {
        /// HTTP status code.
        status: u16,
        /// S3 error code (e.g. `NoSuchUpload`).
        code: String,
        /// S3 error message, if any.
        message: Option<String>,
    },

    /// The object store answered successfully with an unusable body.
    #[error("invalid object store response: {0}")]
    InvalidResponse(String),

    /// The file to upload is unusable (missing name, unreadable range).
    #[error("invalid file: {0}")]
    InvalidFile(String),

    /// The operation is not valid in the session's current state.
    #[error("invalid session state: {0}")]
    InvalidState(String),

    /// XML serialization or parsing failed.
    #[error(transparent)]
    Xml(#[from] XmlError),

    /// Local I/O failed.
    #[error(transparent)]
    Io(#[from] std::io::Error),
}

impl UploadError {
    /// Whether the error is an authorization refusal from the signing endpoint.
    #[must_use]
    pub fn is_auth(&self) -> bool {
        matches!(self, Self::Auth(_))
    }

    /// Whether the error is a transport failure.
    #[must_use]
    pub fn is_network(&self) -> bool {
        matches!(self, Self::Network(_))
    }
}

impl From<SigningError> for UploadError {
    fn from(err: SigningError) -> Self {
        match err {
            SigningError::Transport(e) => Self::Network(e),
            SigningError::PermissionDenied(status) => Self::Auth(status),
            SigningError::SignatureFetch(status) => {
                Self::SignatureFetch(format!("authorization endpoint returned status {status}"))
            }
            SigningError::InvalidSignature => {
                Self::SignatureFetch("authorization endpoint returned an invalid signature".into())
            }
            SigningError::InvalidRequest(msg) => Self::Config(msg),
        }
    }
}

/// Convenience result type for upload operations.
pub type UploadResult<T> = Result<T, UploadError>;
