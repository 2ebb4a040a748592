//! In-process signature provider holding the secret access key.

use async_trait::async_trait;
use parking_lot::Mutex;
use tracing::debug;

use crate::cache::SigningKeyCache;
use crate::error::SigningResult;
use crate::signer::{SignatureContext, SignatureProvider};
use crate::sigv4::{compute_signature, derive_signing_key, hmac_sha256};

/// Computes signatures locally from the secret access key.
///
/// Derived signing keys are cached per instance, keyed by scope date, region,
/// service and a fingerprint of the credentials.
pub struct LocalSignatureProvider {
    access_key_id: String,
    secret_access_key: String,
    session_token: Option<String>,
    cache: Mutex<SigningKeyCache>,
}

impl std::fmt::Debug for LocalSignatureProvider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LocalSignatureProvider")
            .field("access_key_id", &self.access_key_id)
            .field("secret_access_key", &"***")
            .finish_non_exhaustive()
    }
}

impl LocalSignatureProvider {
    /// A provider signing with `secret_access_key`, with an empty key cache.
    pub fn new(access_key_id: impl Into<String>, secret_access_key: impl Into<String>) -> Self {
        Self {
            access_key_id: access_key_id.into(),
            secret_access_key: secret_access_key.into(),
            session_token: None,
            cache: Mutex::new(SigningKeyCache::new()),
        }
    }

    /// Include a session token in the cache fingerprint.
    #[must_use]
    pub fn with_session_token(mut self, token: impl Into<String>) -> Self {
        self.session_token = Some(token.into());
        self
    }

    /// The access key id the secret belongs to.
    #[must_use]
    pub fn access_key_id(&self) -> &str {
        &self.access_key_id
    }

    /// Sign `string_to_sign` for the given scope components.
    #[must_use]
    pub fn sign_string(
        &self,
        date: &str,
        region: &str,
        service: &str,
        string_to_sign: &str,
    ) -> String {
        let cache_key = self.cache_key(date, region, service);
        let signing_key = self.cache.lock().get_or_insert_with(&cache_key, || {
            debug!(date, region, service, "Deriving signing key");
            derive_signing_key(&self.secret_access_key, date, region, service)
        });
        compute_signature(&signing_key, string_to_sign)
    }

    /// Number of signing keys currently cached.
    #[must_use]
    pub fn cached_keys(&self) -> usize {
        self.cache.lock().len()
    }

    fn cache_key(&self, date: &str, region: &str, service: &str) -> String {
        let fingerprint = hex::encode(hmac_sha256(
            self.secret_access_key.as_bytes(),
            self.access_key_id.as_bytes(),
        ));
        match &self.session_token {
            Some(token) => format!("{date}:{region}:{service}:{fingerprint}:{token}"),
            None => format!("{date}:{region}:{service}:{fingerprint}"),
        }
    }
}

#[async_trait]
impl SignatureProvider for LocalSignatureProvider {
    async fn signature(&self, context: &SignatureContext) -> SigningResult<String> {
        Ok(self.sign_string(
            &context.date,
            &context.region,
            &context.service,
            &context.string_to_sign,
        ))
    }
}
