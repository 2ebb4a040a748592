//! Request signing.
//!
//! [`RequestSigner`] turns a [`SigningRequest`] into a [`SignedRequest`]:
//!
//! 1. Add `host`, `x-amz-date`, `x-amz-content-sha256` and, when a session
//!    token is present, `x-amz-security-token`.
//! 2. Build the canonical request over every header of the request.
//! 3. Build the string to sign for the credential scope of the signing date.
//! 4. Ask the [`SignatureProvider`] for the hex signature.
//! 5. Attach the assembled `Authorization` header.

use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, TimeDelta, Utc};
use http::header::{AUTHORIZATION, HOST};
use http::{HeaderMap, HeaderValue, Method};
use reqwest::Url;
use tracing::debug;

use crate::canonical::{build_canonical_headers, build_canonical_request};
use crate::credentials::AccessCredentials;
use crate::error::{SigningError, SigningResult};
use crate::sigv4::{
    build_authorization_header, build_string_to_sign, credential_scope, format_amz_date,
    format_scope_date, hash_payload,
};

/// Header carrying the signing timestamp.
pub const X_AMZ_DATE: &str = "x-amz-date";
/// Header carrying the payload hash.
pub const X_AMZ_CONTENT_SHA256: &str = "x-amz-content-sha256";
/// Header carrying a temporary session token.
pub const X_AMZ_SECURITY_TOKEN: &str = "x-amz-security-token";

/// Everything a signature provider needs to produce a signature.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SignatureContext {
    /// Scope date (`YYYYMMDD`).
    pub date: String,
    /// Signing region.
    pub region: String,
    /// Signing service name.
    pub service: String,
    /// Credential scope (`date/region/service/aws4_request`).
    pub scope: String,
    /// The string to sign.
    pub string_to_sign: String,
}

/// Turns a string to sign into a hex-encoded signature.
#[async_trait]
pub trait SignatureProvider: Send + Sync + fmt::Debug {
    /// Compute (or fetch) the signature for `context`.
    async fn signature(&self, context: &SignatureContext) -> SigningResult<String>;
}

/// An outbound request before signing.
#[derive(Debug, Clone)]
pub struct SigningRequest {
    /// HTTP method.
    pub method: Method,
    /// Full request URL, query included.
    pub url: Url,
    /// Extra headers to send and sign.
    pub headers: HeaderMap,
    /// Hex SHA-256 of the body.
    pub payload_hash: String,
}

impl SigningRequest {
    /// A request with no body and no extra headers.
    #[must_use]
    pub fn new(method: Method, url: Url) -> Self {
        Self {
            method,
            url,
            headers: HeaderMap::new(),
            payload_hash: hash_payload(b""),
        }
    }

    /// Set the payload hash from the body that will be sent.
    #[must_use]
    pub fn with_payload(mut self, body: &[u8]) -> Self {
        self.payload_hash = hash_payload(body);
        self
    }

    /// Add a header that will be sent and signed.
    #[must_use]
    pub fn with_header(mut self, name: &'static str, value: HeaderValue) -> Self {
        self.headers.insert(name, value);
        self
    }
}

/// A request ready to be sent, with its signing artifacts.
#[derive(Debug, Clone)]
pub struct SignedRequest {
    /// HTTP method.
    pub method: Method,
    /// Full request URL, query included.
    pub url: Url,
    /// All headers to send, `Authorization` included.
    pub headers: HeaderMap,
    /// Canonical request the signature covers.
    pub canonical_request: String,
    /// String handed to the signature provider.
    pub string_to_sign: String,
    /// `date/region/service/aws4_request`.
    pub credential_scope: String,
    /// The `Authorization` header value.
    pub authorization: String,
}

/// Signs requests for one access key, region and service.
#[derive(Clone)]
pub struct RequestSigner {
    credentials: AccessCredentials,
    region: String,
    service: String,
    time_offset: TimeDelta,
    provider: Arc<dyn SignatureProvider>,
}

impl fmt::Debug for RequestSigner {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RequestSigner")
            .field("access_key_id", &self.credentials.access_key_id())
            .field("region", &self.region)
            .field("service", &self.service)
            .field("time_offset", &self.time_offset)
            .field("provider", &self.provider)
            .finish_non_exhaustive()
    }
}

impl RequestSigner {
    /// Create a signer.
    pub fn new(
        credentials: AccessCredentials,
        region: impl Into<String>,
        service: impl Into<String>,
        provider: Arc<dyn SignatureProvider>,
    ) -> Self {
        Self {
            credentials,
            region: region.into(),
            service: service.into(),
            time_offset: TimeDelta::zero(),
            provider,
        }
    }

    /// Shift every signing timestamp by `offset_ms` milliseconds to correct
    /// for local clock skew.
    #[must_use]
    pub fn with_time_offset_ms(mut self, offset_ms: i64) -> Self {
        self.time_offset = TimeDelta::milliseconds(offset_ms);
        self
    }

    /// Region in the credential scope.
    #[must_use]
    pub fn region(&self) -> &str {
        &self.region
    }

    /// Service in the credential scope.
    #[must_use]
    pub fn service(&self) -> &str {
        &self.service
    }

    /// The access key id and session token requests are signed for.
    #[must_use]
    pub fn credentials(&self) -> &AccessCredentials {
        &self.credentials
    }

    /// The timestamp a request signed now would carry.
    #[must_use]
    pub fn signing_time(&self) -> DateTime<Utc> {
        Utc::now() + self.time_offset
    }

    /// Sign `request` at the current (offset-corrected) time.
    ///
    /// # Errors
    ///
    /// Returns a [`SigningError`] if the request is malformed or the provider
    /// fails to produce a signature.
    pub async fn sign(&self, request: SigningRequest) -> SigningResult<SignedRequest> {
        self.sign_at(request, self.signing_time()).await
    }

    /// Sign `request` as if at `at`. The time offset is not applied.
    ///
    /// # Errors
    ///
    /// Returns a [`SigningError`] if the request is malformed or the provider
    /// fails to produce a signature.
    pub async fn sign_at(
        &self,
        request: SigningRequest,
        at: DateTime<Utc>,
    ) -> SigningResult<SignedRequest> {
        let SigningRequest {
            method,
            url,
            mut headers,
            payload_hash,
        } = request;

        let amz_date = format_amz_date(&at);
        let date = format_scope_date(&at);

        headers.insert(HOST, header_value(&host_header(&url)?)?);
        headers.insert(X_AMZ_DATE, header_value(&amz_date)?);
        headers.insert(X_AMZ_CONTENT_SHA256, header_value(&payload_hash)?);
        if let Some(token) = self.credentials.session_token() {
            headers.insert(X_AMZ_SECURITY_TOKEN, header_value(token)?);
        }
        headers.remove(AUTHORIZATION);

        let canonical_headers = build_canonical_headers(&headers);
        let canonical_request = build_canonical_request(
            method.as_str(),
            url.path(),
            url.query().unwrap_or(""),
            &canonical_headers.canonical,
            &canonical_headers.signed,
            &payload_hash,
        );
        debug!(canonical_request = %canonical_request, "Built canonical request");

        let scope = credential_scope(&date, &self.region, &self.service);
        let string_to_sign =
            build_string_to_sign(&amz_date, &scope, &hash_payload(canonical_request.as_bytes()));
        debug!(string_to_sign = %string_to_sign, "Built string to sign");

        let context = SignatureContext {
            date,
            region: self.region.clone(),
            service: self.service.clone(),
            scope: scope.clone(),
            string_to_sign: string_to_sign.clone(),
        };
        let signature = self.provider.signature(&context).await?;

        let authorization = build_authorization_header(
            self.credentials.access_key_id(),
            &scope,
            &canonical_headers.signed,
            &signature,
        );
        headers.insert(AUTHORIZATION, header_value(&authorization)?);

        Ok(SignedRequest {
            method,
            url,
            headers,
            canonical_request,
            string_to_sign,
            credential_scope: scope,
            authorization,
        })
    }
}

fn host_header(url: &Url) -> SigningResult<String> {
    let host = url
        .host_str()
        .ok_or_else(|| SigningError::InvalidRequest(format!("URL has no host: {url}")))?;
    Ok(match url.port() {
        Some(port) => format!("{host}:{port}"),
        None => host.to_owned(),
    })
}

fn header_value(value: &str) -> SigningResult<HeaderValue> {
    HeaderValue::from_str(value).map_err(|e| SigningError::InvalidRequest(e.to_string()))
}
