//! Object key helpers.

use evaporust_auth::canonical::encode_object_key;
use percent_encoding::percent_decode_str;

use crate::error::{UploadError, UploadResult};

/// Encode a file name per S3 object key rules.
///
/// Every `/`-separated segment is percent-encoded, leaving only
/// `A-Z a-z 0-9 - _ . ~` unescaped.
///
/// # Examples
///
/// ```
/// use evaporust_core::utils::encode_object_name;
///
/// assert_eq!(encode_object_name("my photo (1).jpg"), "my%20photo%20%281%29.jpg");
/// ```
#[must_use]
pub fn encode_object_name(name: &str) -> String {
    encode_object_key(name)
}

/// Strip leading and trailing `/` from an optional key prefix.
///
/// Returns `None` for a missing or empty prefix.
///
/// # Errors
///
/// Returns [`UploadError::InvalidFile`] if the prefix contains a backslash.
pub fn normalize_path(path: Option<&str>) -> UploadResult<Option<String>> {
    let Some(path) = path else {
        return Ok(None);
    };
    if path.contains('\\') {
        return Err(UploadError::InvalidFile(format!(
            "path {path:?} must use '/' separators"
        )));
    }
    let trimmed = path.trim_matches('/');
    Ok((!trimmed.is_empty()).then(|| trimmed.to_owned()))
}

/// Build the object key for an encoded file name under an optional prefix.
///
/// The key is the URL-decoded `prefix/name`; the object store re-encodes it
/// on the wire.
///
/// # Errors
///
/// Returns [`UploadError::InvalidFile`] if the prefix is invalid or the
/// decoded key is not UTF-8.
///
/// # Examples
///
/// ```
/// use evaporust_core::utils::{encode_object_name, object_key};
///
/// let encoded = encode_object_name("report 2024.pdf");
/// assert_eq!(object_key(Some("/docs/q1/"), &encoded).unwrap(), "docs/q1/report 2024.pdf");
/// assert_eq!(object_key(None, &encoded).unwrap(), "report 2024.pdf");
/// ```
pub fn object_key(path: Option<&str>, encoded_name: &str) -> UploadResult<String> {
    let joined = match normalize_path(path)? {
        Some(prefix) => format!("{prefix}/{encoded_name}"),
        None => encoded_name.to_owned(),
    };
    percent_decode_str(&joined)
        .decode_utf8()
        .map(std::borrow::Cow::into_owned)
        .map_err(|e| UploadError::InvalidFile(format!("object key is not valid UTF-8: {e}")))
}
