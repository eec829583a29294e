use std::path::{Path, PathBuf};
use std::time::Duration;

use async_trait::async_trait;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use bytes::Bytes;
use ring::{digest, hmac};

use super::{uri_encode, ObjectStore, ObjectStoreError};

/// Local filesystem object store for development and testing.
///
/// Objects are served back by the application itself under
/// `/api/objects/{key}`; signed download URLs carry an HMAC over the key,
/// expiry and download name.
pub struct LocalStore {
    base_path: PathBuf,
    public_base_url: String,
    signing_key: hmac::Key,
}

impl LocalStore {
    pub fn new<P: AsRef<Path>>(
        base_path: P,
        public_base_url: &str,
        secret: &[u8],
    ) -> Result<Self, std::io::Error> {
        let base_path = base_path.as_ref().to_path_buf();
        std::fs::create_dir_all(&base_path)?;
        Ok(Self {
            base_path,
            public_base_url: public_base_url.trim_end_matches('/').to_string(),
            signing_key: hmac::Key::new(hmac::HMAC_SHA256, secret),
        })
    }

    // On-disk name is the SHA-256 of the key: fixed length whatever the
    // upload name, and `/` or `..` in a key can never escape the base directory.
    fn object_path(&self, key: &str) -> PathBuf {
        let hash = digest::digest(&digest::SHA256, key.as_bytes());
        self.base_path.join(hex::encode(hash.as_ref()))
    }

    fn object_url(&self, key: &str) -> String {
        format!("{}/api/objects/{}", self.public_base_url, uri_encode(key, true))
    }

    fn string_to_sign(key: &str, expires: i64, download_name: Option<&str>) -> String {
        format!("{key}\n{expires}\n{}", download_name.unwrap_or_default())
    }
}

#[async_trait]
impl ObjectStore for LocalStore {
    async fn put(
        &self,
        key: &str,
        data: Bytes,
        _content_type: &str,
        _owner: &str,
    ) -> Result<String, ObjectStoreError> {
        let path = self.object_path(key);
        tokio::fs::write(&path, &data).await?;
        Ok(self.object_url(key))
    }

    async fn get(&self, key: &str) -> Result<Bytes, ObjectStoreError> {
        let path = self.object_path(key);
        match tokio::fs::read(&path).await {
            Ok(data) => Ok(Bytes::from(data)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                Err(ObjectStoreError::NotFound(key.to_string()))
            }
            Err(e) => Err(e.into()),
        }
    }

    async fn delete(&self, key: &str) -> Result<(), ObjectStoreError> {
        match tokio::fs::remove_file(self.object_path(key)).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }

    async fn check(&self) -> Result<(), ObjectStoreError> {
        let metadata = tokio::fs::metadata(&self.base_path).await.map_err(|e| {
            ObjectStoreError::Unreachable(format!("{}: {e}", self.base_path.display()))
        })?;
        if !metadata.is_dir() {
            return Err(ObjectStoreError::Unreachable(format!(
                "{} is not a directory",
                self.base_path.display()
            )));
        }
        Ok(())
    }

    fn signed_url(
        &self,
        key: &str,
        expires_in: Duration,
        download_name: Option<&str>,
    ) -> Result<String, ObjectStoreError> {
        let expires = chrono::Utc::now().timestamp() + expires_in.as_secs() as i64;
        let tag = hmac::sign(
            &self.signing_key,
            Self::string_to_sign(key, expires, download_name).as_bytes(),
        );
        let signature = URL_SAFE_NO_PAD.encode(tag.as_ref());

        let mut url = format!("{}?expires={expires}", self.object_url(key));
        if let Some(name) = download_name {
            url.push_str("&filename=");
            url.push_str(&uri_encode(name, true));
        }
        url.push_str("&signature=");
        url.push_str(&signature);
        Ok(url)
    }

    fn verify_signed_url(
        &self,
        key: &str,
        expires: i64,
        download_name: Option<&str>,
        signature: &str,
    ) -> Result<(), ObjectStoreError> {
        if expires < chrono::Utc::now().timestamp() {
            return Err(ObjectStoreError::InvalidSignature);
        }

        let tag = URL_SAFE_NO_PAD
            .decode(signature)
            .map_err(|_| ObjectStoreError::InvalidSignature)?;

        hmac::verify(
            &self.signing_key,
            Self::string_to_sign(key, expires, download_name).as_bytes(),
            &tag,
        )
        .map_err(|_| ObjectStoreError::InvalidSignature)
    }

    fn backend_name(&self) -> &'static str {
        "local"
    }
}
