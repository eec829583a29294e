use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use reqwest::{Client, Method, Response, StatusCode, Url};

use super::sigv4::{sha256_hex, Credentials, Signer};
use super::{uri_encode, ObjectStore, ObjectStoreError};
use crate::config::S3Config;

/// Amazon S3 (or S3-compatible) object store backend, path-style addressing.
pub struct S3Store {
    bucket: String,
    client: Client,
    credentials: Credentials,
    endpoint: Url,
    region: String,
}

impl S3Store {
    pub fn new(config: &S3Config) -> Result<Self, ObjectStoreError> {
        let endpoint = Url::parse(&config.endpoint)
            .map_err(|e| ObjectStoreError::Backend(format!("Invalid S3 endpoint: {e}")))?;
        if endpoint.host_str().is_none() {
            return Err(ObjectStoreError::Backend(format!(
                "S3 endpoint has no host: {}",
                config.endpoint
            )));
        }

        let client = Client::builder()
            .build()
            .map_err(|e| ObjectStoreError::Backend(e.to_string()))?;

        Ok(Self {
            bucket: config.bucket.clone(),
            client,
            credentials: Credentials {
                access_key_id: config.access_key_id.clone(),
                secret_access_key: config.secret_access_key.clone(),
                session_token: config.session_token.clone(),
            },
            endpoint,
            region: config.region.clone(),
        })
    }

    /// `host[:port]` as sent in the Host header.
    fn host(&self) -> String {
        let host = self.endpoint.host_str().unwrap_or_default();
        match self.endpoint.port() {
            Some(port) => format!("{host}:{port}"),
            None => host.to_string(),
        }
    }

    fn bucket_path(&self) -> String {
        format!("/{}", uri_encode(&self.bucket, true))
    }

    // `/` is encoded too, so the object URL has a single key segment that
    // `key_from_url` maps back to the full key.
    fn object_path(&self, key: &str) -> String {
        format!("{}/{}", self.bucket_path(), uri_encode(key, true))
    }

    fn url_for(&self, path: &str) -> String {
        format!("{}://{}{}", self.endpoint.scheme(), self.host(), path)
    }

    async fn send(
        &self,
        method: Method,
        path: &str,
        body: Option<Bytes>,
        extra_headers: Vec<(String, String)>,
    ) -> Result<Response, ObjectStoreError> {
        let payload_hash = match body {
            Some(ref data) => sha256_hex(data),
            None => sha256_hex(b""),
        };

        let mut headers = vec![("host".to_string(), self.host())];
        headers.extend(extra_headers);

        let signer = Signer::new(&self.credentials, &self.region, "s3", chrono::Utc::now());
        let auth_headers = signer.sign_request(method.as_str(), path, &[], &headers, &payload_hash);

        let mut request = self.client.request(method, self.url_for(path));
        for (name, value) in headers.iter().chain(auth_headers.iter()) {
            if name != "host" {
                request = request.header(name.as_str(), value.as_str());
            }
        }
        if let Some(data) = body {
            request = request.body(data);
        }

        request.send().await.map_err(|e| {
            if e.is_connect() || e.is_timeout() {
                ObjectStoreError::Unreachable(e.to_string())
            } else {
                ObjectStoreError::Backend(e.to_string())
            }
        })
    }

    async fn failure(&self, operation: &str, key: &str, resp: Response) -> ObjectStoreError {
        let status = resp.status();
        let body = resp.text().await.unwrap_or_default();
        match status {
            StatusCode::FORBIDDEN => ObjectStoreError::Forbidden(format!(
                "S3 {operation} forbidden for bucket '{}': {body}",
                self.bucket
            )),
            StatusCode::NOT_FOUND if body.contains("NoSuchBucket") || key.is_empty() => {
                ObjectStoreError::BucketNotFound(self.bucket.clone())
            }
            StatusCode::NOT_FOUND => ObjectStoreError::NotFound(key.to_string()),
            _ => ObjectStoreError::Backend(format!("S3 {operation} failed ({status}): {body}")),
        }
    }
}

#[async_trait]
impl ObjectStore for S3Store {
    async fn put(
        &self,
        key: &str,
        data: Bytes,
        content_type: &str,
        owner: &str,
    ) -> Result<String, ObjectStoreError> {
        let path = self.object_path(key);
        let headers = vec![
            ("content-type".to_string(), content_type.to_string()),
            ("x-amz-meta-user-id".to_string(), owner.to_string()),
        ];

        let resp = self.send(Method::PUT, &path, Some(data), headers).await?;
        if !resp.status().is_success() {
            let err = self.failure("upload", key, resp).await;
            // A 404 on PUT can only mean the bucket is missing.
            return Err(match err {
                ObjectStoreError::NotFound(_) => ObjectStoreError::BucketNotFound(self.bucket.clone()),
                other => other,
            });
        }

        Ok(self.url_for(&path))
    }

    async fn get(&self, key: &str) -> Result<Bytes, ObjectStoreError> {
        let resp = self
            .send(Method::GET, &self.object_path(key), None, Vec::new())
            .await?;

        if !resp.status().is_success() {
            return Err(self.failure("download", key, resp).await);
        }

        resp.bytes()
            .await
            .map_err(|e| ObjectStoreError::Backend(e.to_string()))
    }

    async fn delete(&self, key: &str) -> Result<(), ObjectStoreError> {
        let resp = self
            .send(Method::DELETE, &self.object_path(key), None, Vec::new())
            .await?;

        // 404 is fine -- object already gone
        if !resp.status().is_success() && resp.status() != StatusCode::NOT_FOUND {
            return Err(self.failure("delete", key, resp).await);
        }

        Ok(())
    }

    async fn check(&self) -> Result<(), ObjectStoreError> {
        let resp = self
            .send(Method::HEAD, &self.bucket_path(), None, Vec::new())
            .await?;

        if !resp.status().is_success() {
            return Err(self.failure("head bucket", "", resp).await);
        }

        Ok(())
    }

    fn signed_url(
        &self,
        key: &str,
        expires_in: Duration,
        download_name: Option<&str>,
    ) -> Result<String, ObjectStoreError> {
        let path = self.object_path(key);
        let extra_query: Vec<(String, String)> = download_name
            .map(|name| {
                vec![(
                    "response-content-disposition".to_string(),
                    format!("attachment; filename=\"{name}\""),
                )]
            })
            .unwrap_or_default();

        let signer = Signer::new(&self.credentials, &self.region, "s3", chrono::Utc::now());
        let query = signer.presign(
            "GET",
            &self.host(),
            &path,
            &extra_query,
            expires_in.as_secs(),
        );

        Ok(format!("{}?{query}", self.url_for(&path)))
    }

    fn backend_name(&self) -> &'static str {
        "s3"
    }
}
