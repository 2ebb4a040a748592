//! Canonical request construction for AWS Signature Version 4.
//!
//! The canonical request is the newline-separated form:
//!
//! ```text
//! HTTPRequestMethod\n
//! CanonicalURI\n
//! CanonicalQueryString\n
//! CanonicalHeaders\n\n
//! SignedHeaders\n
//! HashedPayload
//! ```
//!
//! The signing client owns the wire encoding of both the path and the query
//! string, so the helpers here are used twice: once to encode what goes on the
//! wire ([`encode_object_key`], [`encode_query`]) and once to canonicalize it.

use std::collections::BTreeMap;

use http::HeaderMap;
use percent_encoding::{AsciiSet, NON_ALPHANUMERIC, percent_decode_str, utf8_percent_encode};

/// Characters that are percent-encoded in path segments and query components.
///
/// Everything except the RFC 3986 unreserved set (`A-Z a-z 0-9 - _ . ~`).
/// This is also the S3 object key encoding: `encodeURIComponent` plus
/// `! ' ( ) *`.
const URI_ENCODE_SET: &AsciiSet = &NON_ALPHANUMERIC
    .remove(b'-')
    .remove(b'_')
    .remove(b'.')
    .remove(b'~');

/// Canonical headers plus the matching signed-header list.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CanonicalHeaders {
    /// `name:value` lines joined by `\n`, sorted by lowercase name.
    pub canonical: String,
    /// Semicolon-separated sorted lowercase header names.
    pub signed: String,
}

/// Build the full canonical request string from its components.
///
/// # Examples
///
/// ```
/// use evaporust_auth::canonical::build_canonical_request;
///
/// let canonical = build_canonical_request(
///     "get",
///     "/test.txt",
///     "",
///     "host:examplebucket.s3.amazonaws.com",
///     "host",
///     "e3b0c44298fc1c149afbf4c8996fb92427ae41e4649b934ca495991b7852b855",
/// );
/// assert!(canonical.starts_with("GET\n/test.txt\n"));
/// ```
#[must_use]
pub fn build_canonical_request(
    method: &str,
    path: &str,
    query: &str,
    canonical_headers: &str,
    signed_headers: &str,
    payload_hash: &str,
) -> String {
    let method = method.to_ascii_uppercase();
    let canonical_uri = build_canonical_uri(path);
    let canonical_query = build_canonical_query_string(query);

    format!(
        "{method}\n{canonical_uri}\n{canonical_query}\n{canonical_headers}\n\n{signed_headers}\n{payload_hash}"
    )
}

/// Build the canonical URI by URI-encoding each path segment individually.
///
/// Forward slashes are preserved and empty paths normalize to `/`. Segments
/// are decoded before encoding so an already-encoded path is not encoded twice.
///
/// # Examples
///
/// ```
/// use evaporust_auth::canonical::build_canonical_uri;
///
/// assert_eq!(build_canonical_uri(""), "/");
/// assert_eq!(build_canonical_uri("/photos/my cat.jpg"), "/photos/my%20cat.jpg");
/// assert_eq!(build_canonical_uri("/photos/my%20cat.jpg"), "/photos/my%20cat.jpg");
/// ```
#[must_use]
pub fn build_canonical_uri(path: &str) -> String {
    if path.is_empty() || path == "/" {
        return "/".to_owned();
    }

    path.split('/')
        .map(|segment| uri_encode(&percent_decode_str(segment).decode_utf8_lossy()))
        .collect::<Vec<_>>()
        .join("/")
}

/// Build the canonical query string by sorting the already-encoded parameters.
///
/// Parameters are sorted by key, then by value. A parameter without `=` gets an
/// empty value (`uploads` becomes `uploads=`).
///
/// # Examples
///
/// ```
/// use evaporust_auth::canonical::build_canonical_query_string;
///
/// assert_eq!(build_canonical_query_string("uploadId=abc&partNumber=2"), "partNumber=2&uploadId=abc");
/// assert_eq!(build_canonical_query_string("uploads"), "uploads=");
/// ```
#[must_use]
pub fn build_canonical_query_string(query: &str) -> String {
    if query.is_empty() {
        return String::new();
    }

    let mut params: Vec<(&str, &str)> = query
        .split('&')
        .filter(|s| !s.is_empty())
        .map(|param| param.split_once('=').unwrap_or((param, "")))
        .collect();

    params.sort_unstable();

    params
        .iter()
        .map(|(k, v)| format!("{k}={v}"))
        .collect::<Vec<_>>()
        .join("&")
}

/// Encode query parameters for the wire using the SigV4 encoding rules.
///
/// The output is already in canonical order, so the same string can be placed
/// on the request URL and fed to [`build_canonical_query_string`].
///
/// # Examples
///
/// ```
/// use evaporust_auth::canonical::encode_query;
///
/// assert_eq!(encode_query(&[("uploadId", "a b"), ("partNumber", "1")]), "partNumber=1&uploadId=a%20b");
/// assert_eq!(encode_query(&[("uploads", "")]), "uploads=");
/// ```
#[must_use]
pub fn encode_query(params: &[(&str, &str)]) -> String {
    let mut encoded: Vec<(String, String)> = params
        .iter()
        .map(|(k, v)| (uri_encode(k), uri_encode(v)))
        .collect();
    encoded.sort_unstable();

    encoded
        .iter()
        .map(|(k, v)| format!("{k}={v}"))
        .collect::<Vec<_>>()
        .join("&")
}

/// Encode an object key per S3 key rules, segment by segment.
///
/// # Examples
///
/// ```
/// use evaporust_auth::canonical::encode_object_key;
///
/// assert_eq!(encode_object_key("docs/it's (1).pdf"), "docs/it%27s%20%281%29.pdf");
/// ```
#[must_use]
pub fn encode_object_key(key: &str) -> String {
    key.split('/').map(uri_encode).collect::<Vec<_>>().join("/")
}

/// Build canonical headers and the signed-header list from every header in
/// `headers`.
///
/// Values are trimmed and inner whitespace runs are collapsed. Repeated headers
/// are joined with commas in insertion order. Non-UTF-8 values are skipped.
#[must_use]
pub fn build_canonical_headers(headers: &HeaderMap) -> CanonicalHeaders {
    let mut header_map: BTreeMap<String, String> = BTreeMap::new();
    for (name, value) in headers {
        let Ok(value) = value.to_str() else {
            continue;
        };
        let trimmed = collapse_whitespace(value.trim());
        header_map
            .entry(name.as_str().to_ascii_lowercase())
            .and_modify(|existing| {
                existing.push(',');
                existing.push_str(&trimmed);
            })
            .or_insert(trimmed);
    }

    let canonical = header_map
        .iter()
        .map(|(name, value)| format!("{name}:{value}"))
        .collect::<Vec<_>>()
        .join("\n");
    let signed = header_map.keys().map(String::as_str).collect::<Vec<_>>().join(";");

    CanonicalHeaders { canonical, signed }
}

fn uri_encode(input: &str) -> String {
    utf8_percent_encode(input, URI_ENCODE_SET).to_string()
}

fn collapse_whitespace(s: &str) -> String {
    let mut result = String::with_capacity(s.len());
    let mut prev_was_space = false;
    for ch in s.chars() {
        if ch.is_whitespace() {
            if !prev_was_space {
                result.push(' ');
                prev_was_space = true;
            }
        } else {
            result.push(ch);
            prev_was_space = false;
        }
    }
    result
}
