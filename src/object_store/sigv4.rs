//! AWS Signature Version 4 for S3 requests and presigned URLs.

use std::fmt;

use chrono::{DateTime, Utc};
use ring::{digest, hmac};

use super::uri_encode;

pub const ALGORITHM: &str = "AWS4-HMAC-SHA256";
pub const UNSIGNED_PAYLOAD: &str = "UNSIGNED-PAYLOAD";

#[derive(Clone)]
pub struct Credentials {
    pub access_key_id: String,
    pub secret_access_key: String,
    pub session_token: Option<String>,
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credentials")
            .field("access_key_id", &self.access_key_id)
            .field("secret_access_key", &"<redacted>")
            .field("session_token", &self.session_token.as_ref().map(|_| "<redacted>"))
            .finish()
    }
}

/// Signs one request (or presigned URL) at a fixed instant.
pub struct Signer<'a> {
    credentials: &'a Credentials,
    region: &'a str,
    service: &'a str,
    time: DateTime<Utc>,
}

impl<'a> Signer<'a> {
    pub fn new(
        credentials: &'a Credentials,
        region: &'a str,
        service: &'a str,
        time: DateTime<Utc>,
    ) -> Self {
        Self {
            credentials,
            region,
            service,
            time,
        }
    }

    fn amz_date(&self) -> String {
        self.time.format("%Y%m%dT%H%M%SZ").to_string()
    }

    fn scope(&self) -> String {
        format!(
            "{}/{}/{}/aws4_request",
            self.time.format("%Y%m%d"),
            self.region,
            self.service
        )
    }

    /// Sign a request sent with an `Authorization` header.
    ///
    /// `headers` must contain `host`. Returns the headers to add to the
    /// request: `authorization`, `x-amz-content-sha256`, `x-amz-date` and, with
    /// temporary credentials, `x-amz-security-token`.
    pub fn sign_request(
        &self,
        method: &str,
        canonical_uri: &str,
        query: &[(String, String)],
        headers: &[(String, String)],
        payload_hash: &str,
    ) -> Vec<(String, String)> {
        let amz_date = self.amz_date();

        let mut added = vec![
            ("x-amz-content-sha256".to_string(), payload_hash.to_string()),
            ("x-amz-date".to_string(), amz_date.clone()),
        ];
        if let Some(ref token) = self.credentials.session_token {
            added.push(("x-amz-security-token".to_string(), token.clone()));
        }

        let mut canonical_headers: Vec<(String, String)> = headers
            .iter()
            .map(|(k, v)| (k.to_lowercase(), v.trim().to_string()))
            .chain(added.iter().cloned())
            .collect();
        canonical_headers.sort();

        let signed_headers = canonical_headers
            .iter()
            .map(|(k, _)| k.as_str())
            .collect::<Vec<_>>()
            .join(";");

        let canonical_request = canonical_request(
            method,
            canonical_uri,
            query,
            &canonical_headers,
            &signed_headers,
            payload_hash,
        );
        let signature = self.signature(&canonical_request, &amz_date);

        added.push((
            "authorization".to_string(),
            format!(
                "{ALGORITHM} Credential={}/{}, SignedHeaders={signed_headers}, Signature={signature}",
                self.credentials.access_key_id,
                self.scope()
            ),
        ));
        added
    }

    /// Build the query string of a presigned URL, signature included.
    pub fn presign(
        &self,
        method: &str,
        host: &str,
        canonical_uri: &str,
        extra_query: &[(String, String)],
        expires_in_secs: u64,
    ) -> String {
        let amz_date = self.amz_date();

        let mut query = extra_query.to_vec();
        query.push(("X-Amz-Algorithm".to_string(), ALGORITHM.to_string()));
        query.push((
            "X-Amz-Credential".to_string(),
            format!("{}/{}", self.credentials.access_key_id, self.scope()),
        ));
        query.push(("X-Amz-Date".to_string(), amz_date.clone()));
        query.push(("X-Amz-Expires".to_string(), expires_in_secs.to_string()));
        if let Some(ref token) = self.credentials.session_token {
            query.push(("X-Amz-Security-Token".to_string(), token.clone()));
        }
        query.push(("X-Amz-SignedHeaders".to_string(), "host".to_string()));

        let headers = [("host".to_string(), host.to_string())];
        let canonical_request = canonical_request(
            method,
            canonical_uri,
            &query,
            &headers,
            "host",
            UNSIGNED_PAYLOAD,
        );
        let signature = self.signature(&canonical_request, &amz_date);

        format!("{}&X-Amz-Signature={signature}", canonical_query(&query))
    }

    fn signature(&self, canonical_request: &str, amz_date: &str) -> String {
        let string_to_sign = format!(
            "{ALGORITHM}\n{amz_date}\n{}\n{}",
            self.scope(),
            sha256_hex(canonical_request.as_bytes())
        );

        let secret = format!("AWS4{}", self.credentials.secret_access_key);
        let date = self.time.format("%Y%m%d").to_string();
        let k_date = hmac_sha256(secret.as_bytes(), date.as_bytes());
        let k_region = hmac_sha256(&k_date, self.region.as_bytes());
        let k_service = hmac_sha256(&k_region, self.service.as_bytes());
        let k_signing = hmac_sha256(&k_service, b"aws4_request");

        hex::encode(hmac_sha256(&k_signing, string_to_sign.as_bytes()))
    }
}

fn canonical_request(
    method: &str,
    canonical_uri: &str,
    query: &[(String, String)],
    headers: &[(String, String)],
    signed_headers: &str,
    payload_hash: &str,
) -> String {
    let canonical_headers: String = headers.iter().map(|(k, v)| format!("{k}:{v}\n")).collect();

    format!(
        "{method}\n{canonical_uri}\n{}\n{canonical_headers}\n{signed_headers}\n{payload_hash}",
        canonical_query(query)
    )
}

fn canonical_query(query: &[(String, String)]) -> String {
    let mut encoded: Vec<(String, String)> = query
        .iter()
        .map(|(k, v)| (uri_encode(k, true), uri_encode(v, true)))
        .collect();
    encoded.sort();
    encoded
        .iter()
        .map(|(k, v)| format!("{k}={v}"))
        .collect::<Vec<_>>()
        .join("&")
}

pub fn sha256_hex(data: &[u8]) -> String {
    hex::encode(digest::digest(&digest::SHA256, data))
}

fn hmac_sha256(key: &[u8], data: &[u8]) -> Vec<u8> {
    let key = hmac::Key::new(hmac::HMAC_SHA256, key);
    hmac::sign(&key, data).as_ref().to_vec()
}
