//! Error types for request signing.
//!
//! The variants keep transport failures, authorization refusals and other
//! signature endpoint failures apart so callers can tell a network problem
//! from a denied request.

/// Errors that can occur while signing a request.
#[derive(Debug, thiserror::Error)]
pub enum SigningError {
    /// The authorization endpoint could not be reached or the connection failed.
    #[error("Signature request failed: {0}")]
    Transport(#[from] reqwest::Error),

    /// The authorization endpoint refused to sign (HTTP 401 or 403).
    #[error("Permission denied by authorization endpoint (status {0})")]
    PermissionDenied(u16),

    /// The authorization endpoint answered with another non-success status.
    #[error("Signature fetch returned status {0}")]
    SignatureFetch(u16),

    /// The authorization endpoint returned a body that is not a hex signature.
    #[error("Authorization endpoint returned an invalid signature")]
    InvalidSignature,

    /// The request to be signed is malformed (for example a URL without a host).
    #[error("Invalid signing request: {0}")]
    InvalidRequest(String),
}

impl SigningError {
    /// Whether the error is an authorization refusal.
    #[must_use]
    pub fn is_permission_denied(&self) -> bool {
        matches!(self, Self::PermissionDenied(_))
    }
}

/// Convenient result alias for signing operations.
pub type SigningResult<T> = Result<T, SigningError>;
