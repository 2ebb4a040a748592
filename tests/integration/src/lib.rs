//! End-to-end tests for Evaporust uploads.
//!
//! These tests require a running S3-compatible server at `localhost:4566`
//! accepting the `test`/`test` credentials, and for the remote-signing tests
//! an `evaporust-sign-server` at `localhost:8080` configured with the same
//! keys. They are marked `#[ignore]` so they don't run during normal
//! `cargo test`.
//!
//! Run them with:
//! ```text
//! cargo test -p evaporust-integration -- --ignored
//! ```

use std::sync::{Arc, Once};

use aws_sdk_s3::config::{BehaviorVersion, Credentials, Region};
use evaporust_auth::{AccessCredentials, LocalSignatureProvider, RequestSigner};
use evaporust_core::config::MIN_PART_SIZE;
use evaporust_core::{EvaporateConfig, S3ObjectStore, UploadCoordinator};

static INIT: Once = Once::new();

const ACCESS_KEY: &str = "test";
const SECRET_KEY: &str = "test";
const REGION: &str = "us-east-1";

/// Initialize tracing (once).
fn init_tracing() {
    INIT.call_once(|| {
        tracing_subscriber::fmt()
            .with_env_filter(
                tracing_subscriber::EnvFilter::try_from_default_env()
                    .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("warn")),
            )
            .with_test_writer()
            .init();
    });
}

/// Endpoint URL for the S3 server.
fn endpoint_url() -> String {
    std::env::var("S3_ENDPOINT_URL").unwrap_or_else(|_| "http://localhost:4566".to_owned())
}

/// URL of the signing endpoint.
fn sign_server_url() -> String {
    std::env::var("EVAPORATE_AUTH_SERVER_URL")
        .unwrap_or_else(|_| "http://localhost:8080/sign_auth".to_owned())
}

fn config(bucket: &str) -> EvaporateConfig {
    EvaporateConfig::builder()
        .bucket(bucket)
        .access_key_id(ACCESS_KEY)
        .region(REGION)
        .auth_server_url(sign_server_url())
        .endpoint(endpoint_url())
        .force_path_style(true)
        .part_size(MIN_PART_SIZE)
        .max_concurrent_parts(3)
        .build()
}

/// Create a configured S3 client pointing at the local server, used to
/// verify what the uploader wrote.
#[must_use]
pub fn s3_client() -> aws_sdk_s3::Client {
    init_tracing();

    let creds = Credentials::new(ACCESS_KEY, SECRET_KEY, None, None, "integration-test");

    let config = aws_sdk_s3::config::Builder::new()
        .behavior_version(BehaviorVersion::latest())
        .region(Region::new(REGION))
        .credentials_provider(creds)
        .endpoint_url(endpoint_url())
        .force_path_style(true)
        .build();

    aws_sdk_s3::Client::from_conf(config)
}

/// A coordinator signing in-process with the test secret.
#[must_use]
pub fn local_coordinator(bucket: &str) -> UploadCoordinator {
    init_tracing();

    let config = config(bucket)
        .validate()
        .unwrap_or_else(|e| panic!("invalid test config: {e}"));
    let signer = RequestSigner::new(
        AccessCredentials::new(ACCESS_KEY),
        REGION,
        "s3",
        Arc::new(LocalSignatureProvider::new(ACCESS_KEY, SECRET_KEY)),
    );
    let endpoint = config
        .endpoint_url()
        .unwrap_or_else(|e| panic!("invalid endpoint: {e}"));
    let store = S3ObjectStore::new(reqwest::Client::new(), signer, bucket, endpoint, true);
    UploadCoordinator::with_store(config, Arc::new(store))
}

/// A coordinator fetching signatures from the signing server.
#[must_use]
pub fn remote_coordinator(bucket: &str) -> UploadCoordinator {
    init_tracing();
    UploadCoordinator::new(config(bucket)).unwrap_or_else(|e| panic!("invalid test config: {e}"))
}

/// Deterministic, non-repeating-per-part test content.
#[must_use]
pub fn test_data(len: usize) -> Vec<u8> {
    (0..len)
        .map(|i| u8::try_from(i % 251).unwrap_or_default())
        .collect()
}

/// Generate a unique bucket name for a test.
#[must_use]
pub fn test_bucket_name(prefix: &str) -> String {
    let id = uuid::Uuid::new_v4().to_string()[..8].to_owned();
    format!("test-{prefix}-{id}")
}

/// Create a bucket and return its name. Caller is responsible for cleanup.
pub async fn create_test_bucket(client: &aws_sdk_s3::Client, prefix: &str) -> String {
    let name = test_bucket_name(prefix);
    client
        .create_bucket()
        .bucket(&name)
        .send()
        .await
        .unwrap_or_else(|e| panic!("failed to create bucket {name}: {e}"));
    name
}

/// Delete all objects and multipart uploads in a bucket, then the bucket.
pub async fn cleanup_bucket(client: &aws_sdk_s3::Client, bucket: &str) {
    if let Ok(resp) = client.list_objects_v2().bucket(bucket).send().await {
        for obj in resp.contents() {
            if let Some(key) = obj.key() {
                let _ = client.delete_object().bucket(bucket).key(key).send().await;
            }
        }
    }

    if let Ok(uploads) = client.list_multipart_uploads().bucket(bucket).send().await {
        for upload in uploads.uploads() {
            if let (Some(key), Some(id)) = (upload.key(), upload.upload_id()) {
                let _ = client
                    .abort_multipart_upload()
                    .bucket(bucket)
                    .key(key)
                    .upload_id(id)
                    .send()
                    .await;
            }
        }
    }

    let _ = client.delete_bucket().bucket(bucket).send().await;
}

mod test_dangling;
mod test_upload;
