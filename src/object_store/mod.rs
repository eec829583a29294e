mod local;
mod s3;
pub mod sigv4;

pub use local::LocalStore;
pub use s3::S3Store;

use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use thiserror::Error;

/// Longest validity accepted for a signed download URL (seven days).
pub const MAX_SIGNED_URL_EXPIRY: Duration = Duration::from_secs(604_800);

#[derive(Debug, Error)]
pub enum ObjectStoreError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("Object not found: {0}")]
    NotFound(String),
    #[error("Bucket not found: {0}")]
    BucketNotFound(String),
    #[error("Access denied: {0}")]
    Forbidden(String),
    #[error("Object storage unreachable: {0}")]
    Unreachable(String),
    #[error("Backend error: {0}")]
    Backend(String),
    #[error("Invalid or expired signature")]
    InvalidSignature,
    #[error("Operation not supported by this backend: {0}")]
    Unsupported(&'static str),
}

/// Abstraction over object storage backends.
///
/// Keys are generated object names (see `evidence::naming`); `put` returns the
/// stable URL recorded against findings and file metadata.
#[async_trait]
pub trait ObjectStore: Send + Sync {
    async fn put(
        &self,
        key: &str,
        data: Bytes,
        content_type: &str,
        owner: &str,
    ) -> Result<String, ObjectStoreError>;

    async fn get(&self, key: &str) -> Result<Bytes, ObjectStoreError>;

    /// Deleting a missing object is not an error.
    async fn delete(&self, key: &str) -> Result<(), ObjectStoreError>;

    /// Probe that the backend is reachable and usable.
    async fn check(&self) -> Result<(), ObjectStoreError>;

    /// Time-limited download URL that forces an attachment download.
    fn signed_url(
        &self,
        key: &str,
        expires_in: Duration,
        download_name: Option<&str>,
    ) -> Result<String, ObjectStoreError>;

    /// Verify a signed URL issued by `signed_url`, for backends that serve
    /// their own downloads.
    fn verify_signed_url(
        &self,
        _key: &str,
        _expires: i64,
        _download_name: Option<&str>,
        _signature: &str,
    ) -> Result<(), ObjectStoreError> {
        Err(ObjectStoreError::Unsupported("signed URL verification"))
    }

    fn backend_name(&self) -> &'static str;
}

/// Map a stored object URL back to its key: the last path segment,
/// percent-decoded.
pub fn key_from_url(url: &str) -> Option<String> {
    let without_query = url.split(['?', '#']).next().unwrap_or(url);
    let segment = without_query.rsplit('/').next()?;
    if segment.is_empty() {
        return None;
    }
    Some(percent_decode(segment))
}

/// RFC 3986 encoding as required by SigV4: unreserved characters pass
/// through, everything else becomes `%XX`. `/` is kept when `encode_slash`
/// is false.
pub fn uri_encode(input: &str, encode_slash: bool) -> String {
    let mut out = String::with_capacity(input.len());
    for byte in input.bytes() {
        match byte {
            b'A'..=b'Z' | b'a'..=b'z' | b'0'..=b'9' | b'-' | b'_' | b'.' | b'~' => {
                out.push(byte as char)
            }
            b'/' if !encode_slash => out.push('/'),
            _ => out.push_str(&format!("%{byte:02X}")),
        }
    }
    out
}

/// Decode `%XX` sequences. Malformed escapes are kept as-is.
pub fn percent_decode(input: &str) -> String {
    let bytes = input.as_bytes();
    let mut out = Vec::with_capacity(bytes.len());
    let mut i = 0;
    while i < bytes.len() {
        if bytes[i] == b'%' && i + 2 < bytes.len() {
            if let (Some(hi), Some(lo)) = (hex_value(bytes[i + 1]), hex_value(bytes[i + 2])) {
                out.push(hi << 4 | lo);
                i += 3;
                continue;
            }
        }
        out.push(bytes[i]);
        i += 1;
    }
    String::from_utf8_lossy(&out).into_owned()
}

fn hex_value(byte: u8) -> Option<u8> {
    match byte {
        b'0'..=b'9' => Some(byte - b'0'),
        b'a'..=b'f' => Some(byte - b'a' + 10),
        b'A'..=b'F' => Some(byte - b'A' + 10),
        _ => None,
    }
}
