//! The S3 multipart upload API.
//!
//! [`ObjectStore`] is the seam between upload sessions and the network:
//! sessions only ever talk to a `dyn ObjectStore`, and [`S3ObjectStore`] is
//! the implementation that sends signed requests to an S3-compatible
//! endpoint.

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use evaporust_auth::canonical::{encode_object_key, encode_query};
use evaporust_auth::{AccessCredentials, RemoteSignatureProvider, RequestSigner, SigningRequest};
use evaporust_s3_model::{
    CompleteMultipartUploadOutput, CompletedMultipartUpload, CompletedPart,
    CreateMultipartUploadOutput, ListMultipartUploadsOutput, MultipartUpload, S3ErrorBody,
};
use evaporust_s3_xml::{from_xml, from_xml_response, to_xml};
use http::{HeaderValue, Method};
use reqwest::Url;
use tracing::{debug, warn};

use crate::config::EvaporateConfig;
use crate::error::{UploadError, UploadResult};

/// Multipart upload operations against one bucket.
#[async_trait]
pub trait ObjectStore: Send + Sync + fmt::Debug {
    /// Start a multipart upload and return its upload id.
    async fn create_multipart_upload(&self, key: &str, content_type: &str) -> UploadResult<String>;

    /// Upload one part. Returns the ETag from the response, if the store sent one.
    async fn upload_part(
        &self,
        key: &str,
        upload_id: &str,
        part_number: i32,
        body: Bytes,
        content_md5: &str,
    ) -> UploadResult<Option<String>>;

    /// Assemble the uploaded parts into the final object.
    async fn complete_multipart_upload(
        &self,
        key: &str,
        upload_id: &str,
        parts: &[CompletedPart],
    ) -> UploadResult<CompleteMultipartUploadOutput>;

    /// Discard a multipart upload and its parts.
    async fn abort_multipart_upload(&self, key: &str, upload_id: &str) -> UploadResult<()>;

    /// List one page of in-progress multipart uploads.
    async fn list_multipart_uploads(
        &self,
        key_marker: Option<&str>,
        upload_id_marker: Option<&str>,
    ) -> UploadResult<ListMultipartUploadsOutput>;
}

/// Follow `list_multipart_uploads` pagination to the end.
///
/// # Errors
///
/// Propagates the first failing page.
pub async fn list_all_multipart_uploads(
    store: &dyn ObjectStore,
) -> UploadResult<Vec<MultipartUpload>> {
    let mut uploads = Vec::new();
    let mut key_marker: Option<String> = None;
    let mut upload_id_marker: Option<String> = None;
    loop {
        let page = store
            .list_multipart_uploads(key_marker.as_deref(), upload_id_marker.as_deref())
            .await?;
        uploads.extend(page.uploads);
        if !page.is_truncated || page.next_key_marker.is_none() {
            return Ok(uploads);
        }
        key_marker = page.next_key_marker;
        upload_id_marker = page.next_upload_id_marker;
    }
}

/// [`ObjectStore`] speaking the S3 REST API with SigV4-signed requests.
#[derive(Debug, Clone)]
pub struct S3ObjectStore {
    client: reqwest::Client,
    signer: RequestSigner,
    bucket: String,
    endpoint: Url,
    force_path_style: bool,
}

impl S3ObjectStore {
    /// Build a store whose signatures come from the configured
    /// authorization endpoint.
    ///
    /// # Errors
    ///
    /// Returns [`UploadError::Config`] if the configuration is invalid, or
    /// [`UploadError::Network`] if the HTTP client cannot be built.
    pub fn from_config(config: &EvaporateConfig) -> UploadResult<Self> {
        let auth_server_url = Url::parse(&config.auth_server_url).map_err(|e| {
            UploadError::Config(format!("invalid 'authServerUrl' {:?}: {e}", config.auth_server_url))
        })?;
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.request_timeout_secs))
            .build()?;

        let provider = RemoteSignatureProvider::with_client(client.clone(), auth_server_url);
        let mut credentials = AccessCredentials::new(&config.access_key_id);
        if let Some(token) = &config.session_token {
            credentials = credentials.with_session_token(token);
        }
        let signer = RequestSigner::new(
            credentials,
            &config.region,
            &config.service,
            Arc::new(provider),
        )
        .with_time_offset_ms(config.time_offset_ms);

        Ok(Self::new(
            client,
            signer,
            &config.bucket,
            config.endpoint_url()?,
            config.force_path_style,
        ))
    }

    /// Build a store from its parts.
    pub fn new(
        client: reqwest::Client,
        signer: RequestSigner,
        bucket: impl Into<String>,
        endpoint: Url,
        force_path_style: bool,
    ) -> Self {
        Self {
            client,
            signer,
            bucket: bucket.into(),
            endpoint,
            force_path_style,
        }
    }

    /// The bucket every request targets.
    #[must_use]
    pub fn bucket(&self) -> &str {
        &self.bucket
    }

    /// URL of `key` (or of the bucket when `key` is `None`) with `query`.
    fn url(&self, key: Option<&str>, query: &[(&str, &str)]) -> UploadResult<Url> {
        let mut url = self.endpoint.clone();
        let encoded_key = key.map(encode_object_key).unwrap_or_default();

        if self.force_path_style {
            url.set_path(&format!("/{}/{encoded_key}", self.bucket));
        } else {
            let host = url
                .host_str()
                .ok_or_else(|| UploadError::Config(format!("endpoint {} has no host", self.endpoint)))?;
            let host = format!("{}.{host}", self.bucket);
            url.set_host(Some(&host))
                .map_err(|e| UploadError::Config(format!("invalid bucket host {host:?}: {e}")))?;
            url.set_path(&format!("/{encoded_key}"));
        }

        if query.is_empty() {
            url.set_query(None);
        } else {
            url.set_query(Some(&encode_query(query)));
        }
        Ok(url)
    }

    /// Sign and send `request` with `body`, mapping error statuses to
    /// [`UploadError::ObjectStore`].
    async fn send(&self, request: SigningRequest, body: Bytes) -> UploadResult<reqwest::Response> {
        let signed = self.signer.sign(request.with_payload(&body)).await?;
        debug!(method = %signed.method, url = %signed.url, "Sending S3 request");

        let response = self
            .client
            .request(signed.method, signed.url)
            .headers(signed.headers)
            .body(body)
            .send()
            .await?;

        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }

        let body = response.bytes().await?;
        let error = from_xml::<S3ErrorBody>(&body).unwrap_or_else(|_| S3ErrorBody {
            code: status.canonical_reason().unwrap_or("Unknown").to_owned(),
            ..S3ErrorBody::default()
        });
        warn!(status = status.as_u16(), code = %error.code, "S3 request failed");
        Err(store_error(status.as_u16(), error))
    }
}

fn store_error(status: u16, error: S3ErrorBody) -> UploadError {
    UploadError::ObjectStore {
        status,
        code: error.code,
        message: error.message,
    }
}

fn header_value(value: &str) -> UploadResult<HeaderValue> {
    HeaderValue::from_str(value)
        .map_err(|e| UploadError::InvalidFile(format!("invalid header value {value:?}: {e}")))
}

#[async_trait]
impl ObjectStore for S3ObjectStore {
    async fn create_multipart_upload(&self, key: &str, content_type: &str) -> UploadResult<String> {
        let url = self.url(Some(key), &[("uploads", "")])?;
        let request = SigningRequest::new(Method::POST, url)
            .with_header("content-type", header_value(content_type)?);

        let body = self.send(request, Bytes::new()).await?.bytes().await?;
        let output: CreateMultipartUploadOutput = from_xml(&body)?;
        output.upload_id.ok_or_else(|| {
            UploadError::InvalidResponse("InitiateMultipartUploadResult has no UploadId".into())
        })
    }

    async fn upload_part(
        &self,
        key: &str,
        upload_id: &str,
        part_number: i32,
        body: Bytes,
        content_md5: &str,
    ) -> UploadResult<Option<String>> {
        let part = part_number.to_string();
        let url = self.url(Some(key), &[("partNumber", &part), ("uploadId", upload_id)])?;
        let request = SigningRequest::new(Method::PUT, url)
            .with_header("content-md5", header_value(content_md5)?);

        let response = self.send(request, body).await?;
        Ok(response
            .headers()
            .get(http::header::ETAG)
            .and_then(|v| v.to_str().ok())
            .filter(|v| !v.is_empty())
            .map(ToOwned::to_owned))
    }

    async fn complete_multipart_upload(
        &self,
        key: &str,
        upload_id: &str,
        parts: &[CompletedPart],
    ) -> UploadResult<CompleteMultipartUploadOutput> {
        let url = self.url(Some(key), &[("uploadId", upload_id)])?;
        let manifest = CompletedMultipartUpload::sorted(parts.to_vec());
        let body = Bytes::from(to_xml("CompleteMultipartUpload", &manifest)?);
        let request = SigningRequest::new(Method::POST, url)
            .with_header("content-type", HeaderValue::from_static("application/xml"));

        let response = self.send(request, body).await?;
        let status = response.status().as_u16();
        let body = response.bytes().await?;
        // S3 reports some completion failures as 200 with an <Error> body.
        from_xml_response::<CompleteMultipartUploadOutput>(&body)?
            .map_err(|error| store_error(status, error))
    }

    async fn abort_multipart_upload(&self, key: &str, upload_id: &str) -> UploadResult<()> {
        let url = self.url(Some(key), &[("uploadId", upload_id)])?;
        self.send(SigningRequest::new(Method::DELETE, url), Bytes::new())
            .await?;
        Ok(())
    }

    async fn list_multipart_uploads(
        &self,
        key_marker: Option<&str>,
        upload_id_marker: Option<&str>,
    ) -> UploadResult<ListMultipartUploadsOutput> {
        let mut query = vec![("uploads", "")];
        if let Some(marker) = key_marker {
            query.push(("key-marker", marker));
        }
        if let Some(marker) = upload_id_marker {
            query.push(("upload-id-marker", marker));
        }
        let url = self.url(None, &query)?;

        let body = self
            .send(SigningRequest::new(Method::GET, url), Bytes::new())
            .await?
            .bytes()
            .await?;
        Ok(from_xml(&body)?)
    }
}
