//! Signature provider delegating to a remote authorization endpoint.
//!
//! The endpoint receives the scope components and the string to sign as query
//! parameters:
//!
//! ```text
//! GET <auth_server_url>?region=..&date=..&scope=..&tosign=..&service=..
//! ```
//!
//! and answers with the hex signature as the response body.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::{StatusCode, Url};
use tracing::{debug, warn};

use crate::error::{SigningError, SigningResult};
use crate::signer::{SignatureContext, SignatureProvider};
use crate::sigv4::is_hex_signature;

/// Default timeout for one signature round trip.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(60);

/// Fetches signatures from an authorization endpoint that holds the secret.
#[derive(Debug, Clone)]
pub struct RemoteSignatureProvider {
    client: reqwest::Client,
    auth_server_url: Url,
}

impl RemoteSignatureProvider {
    /// Create a provider with its own HTTP client and the given timeout.
    ///
    /// # Errors
    ///
    /// Returns [`SigningError::Transport`] if the HTTP client cannot be built.
    pub fn new(auth_server_url: Url, timeout: Duration) -> SigningResult<Self> {
        let client = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self::with_client(client, auth_server_url))
    }

    /// Create a provider sharing an existing HTTP client.
    #[must_use]
    pub fn with_client(client: reqwest::Client, auth_server_url: Url) -> Self {
        Self {
            client,
            auth_server_url,
        }
    }

    /// The authorization endpoint.
    #[must_use]
    pub fn auth_server_url(&self) -> &Url {
        &self.auth_server_url
    }

    fn signature_url(&self, context: &SignatureContext) -> Url {
        let mut url = self.auth_server_url.clone();
        url.query_pairs_mut()
            .append_pair("region", &context.region)
            .append_pair("date", &context.date)
            .append_pair("scope", &context.scope)
            .append_pair("tosign", &context.string_to_sign)
            .append_pair("service", &context.service);
        url
    }
}

#[async_trait]
impl SignatureProvider for RemoteSignatureProvider {
    async fn signature(&self, context: &SignatureContext) -> SigningResult<String> {
        let url = self.signature_url(context);
        debug!(scope = %context.scope, "Fetching signature from authorization endpoint");

        let response = self.client.get(url).send().await?;
        let status = response.status();
        match status {
            s if s.is_success() => {}
            StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => {
                warn!(status = status.as_u16(), "Authorization endpoint denied signature");
                return Err(SigningError::PermissionDenied(status.as_u16()));
            }
            _ => {
                warn!(status = status.as_u16(), "Signature fetch failed");
                return Err(SigningError::SignatureFetch(status.as_u16()));
            }
        }

        let body = response.text().await?;
        let signature = body.trim();
        if !is_hex_signature(signature) {
            return Err(SigningError::InvalidSignature);
        }
        Ok(signature.to_ascii_lowercase())
    }
}

#[cfg(test)]
mod tests {
    use std::convert::Infallible;
    use std::net::SocketAddr;
    use std::sync::Arc;

    use bytes::Bytes;
    use http_body_util::Full;
    use hyper::server::conn::http1;
    use hyper::service::service_fn;
    use hyper::{Request, Response};
    use hyper_util::rt::TokioIo;
    use tokio::net::TcpListener;
    use tokio::sync::Mutex;

    use super::*;

    const SIGNATURE: &str = "f0e8bdb87c964420e857bd35b5d6ed310bd44f0170aba48dd91039c6036bdb41";

    /// Spawn an authorization endpoint answering every request with `status`
    /// and `body`, recording the query strings it receives.
    async fn spawn_endpoint(
        status: u16,
        body: &'static str,
    ) -> (SocketAddr, Arc<Mutex<Vec<String>>>) {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let seen = Arc::new(Mutex::new(Vec::new()));
        let recorded = Arc::clone(&seen);

        tokio::spawn(async move {
            loop {
                let Ok((stream, _)) = listener.accept().await else {
                    return;
                };
                let recorded = Arc::clone(&recorded);
                tokio::spawn(async move {
                    let service = service_fn(move |req: Request<hyper::body::Incoming>| {
                        let recorded = Arc::clone(&recorded);
                        async move {
                            recorded
                                .lock()
                                .await
                                .push(req.uri().query().unwrap_or("").to_owned());
                            let mut resp = Response::new(Full::new(Bytes::from_static(
                                body.as_bytes(),
                            )));
                            *resp.status_mut() = hyper::StatusCode::from_u16(status).unwrap();
                            Ok::<_, Infallible>(resp)
                        }
                    });
                    let _ = http1::Builder::new()
                        .serve_connection(TokioIo::new(stream), service)
                        .await;
                });
            }
        });

        (addr, seen)
    }

    fn context() -> SignatureContext {
        SignatureContext {
            date: "20130524".to_owned(),
            region: "us-east-1".to_owned(),
            service: "s3".to_owned(),
            scope: "20130524/us-east-1/s3/aws4_request".to_owned(),
            string_to_sign: "AWS4-HMAC-SHA256\n20130524T000000Z\nscope\nhash".to_owned(),
        }
    }

    fn provider(addr: SocketAddr) -> RemoteSignatureProvider {
        let url = Url::parse(&format!("http://{addr}/sign_auth")).unwrap();
        RemoteSignatureProvider::new(url, Duration::from_secs(5)).unwrap()
    }

    #[tokio::test]
    async fn test_should_return_signature_from_endpoint() {
        let (addr, seen) = spawn_endpoint(200, "f0e8bdb87c964420e857bd35b5d6ed310bd44f0170aba48dd91039c6036bdb41\n").await;

        let sig = provider(addr).signature(&context()).await.unwrap();
        assert_eq!(sig, SIGNATURE);

        let queries = seen.lock().await;
        assert_eq!(queries.len(), 1);
        let pairs: Vec<(String, String)> = Url::parse(&format!("http://x/?{}", queries[0]))
            .unwrap()
            .query_pairs()
            .into_owned()
            .collect();
        let names: Vec<&str> = pairs.iter().map(|(k, _)| k.as_str()).collect();
        assert_eq!(names, ["region", "date", "scope", "tosign", "service"]);
        assert_eq!(pairs[3].1, context().string_to_sign);
    }

    #[tokio::test]
    async fn test_should_map_forbidden_to_permission_denied() {
        let (addr, _) = spawn_endpoint(403, "denied").await;
        let err = provider(addr).signature(&context()).await.unwrap_err();
        assert!(matches!(err, SigningError::PermissionDenied(403)));
        assert!(err.is_permission_denied());
    }

    #[tokio::test]
    async fn test_should_map_unauthorized_to_permission_denied() {
        let (addr, _) = spawn_endpoint(401, "").await;
        let err = provider(addr).signature(&context()).await.unwrap_err();
        assert!(matches!(err, SigningError::PermissionDenied(401)));
    }

    #[tokio::test]
    async fn test_should_map_server_error_to_signature_fetch() {
        let (addr, _) = spawn_endpoint(500, "boom").await;
        let err = provider(addr).signature(&context()).await.unwrap_err();
        assert!(matches!(err, SigningError::SignatureFetch(500)));
    }

    #[tokio::test]
    async fn test_should_reject_non_hex_body() {
        let (addr, _) = spawn_endpoint(200, "<html>oops</html>").await;
        let err = provider(addr).signature(&context()).await.unwrap_err();
        assert!(matches!(err, SigningError::InvalidSignature));
    }

    #[tokio::test]
    async fn test_should_map_connection_failure_to_transport() {
        // Bind then drop to get a port with nothing listening.
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        drop(listener);

        let err = provider(addr).signature(&context()).await.unwrap_err();
        assert!(matches!(err, SigningError::Transport(_)));
        assert!(!err.is_permission_denied());
    }
}
