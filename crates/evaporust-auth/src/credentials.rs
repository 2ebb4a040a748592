//! Public credential material carried by a signing client.
//!
//! The client never sees the secret access key. It only knows which access key
//! the authorization endpoint signs for, and optionally a temporary session
//! token that must travel with (and be covered by) every signature.

/// Access key identifier and optional session token.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AccessCredentials {
    access_key_id: String,
    session_token: Option<String>,
}

impl AccessCredentials {
    /// Credentials for a long-lived access key.
    pub fn new(access_key_id: impl Into<String>) -> Self {
        Self {
            access_key_id: access_key_id.into(),
            session_token: None,
        }
    }

    /// Attach a temporary session token (sent as `x-amz-security-token`).
    #[must_use]
    pub fn with_session_token(mut self, token: impl Into<String>) -> Self {
        self.session_token = Some(token.into());
        self
    }

    /// The access key identifier.
    #[must_use]
    pub fn access_key_id(&self) -> &str {
        &self.access_key_id
    }

    /// The session token, if any.
    #[must_use]
    pub fn session_token(&self) -> Option<&str> {
        self.session_token.as_deref()
    }
}
