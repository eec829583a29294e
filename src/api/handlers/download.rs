use std::sync::Arc;
use std::time::Duration;

use axum::extract::{Path, State};
use axum::response::{IntoResponse, Redirect, Response};
use serde::{Deserialize, Serialize};

use super::files::find_file;
use super::object_store;
use crate::api::response::{ApiError, AppQuery, Envelope};
use crate::object_store::{key_from_url, MAX_SIGNED_URL_EXPIRY};
use crate::AppState;

const DEFAULT_EXPIRES_IN: u64 = 3600;

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DownloadParams {
    #[serde(default)]
    pub expires_in: Option<u64>,
    #[serde(default)]
    pub redirect: Option<bool>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DownloadResponse {
    pub download_url: String,
    pub file_name: String,
    pub s3_key: String,
    pub expires_in: u64,
}

/// Time-limited download link for a generic file, or a redirect to it.
pub async fn download(
    State(state): State<Arc<AppState>>,
    Path(file_id): Path<String>,
    AppQuery(params): AppQuery<DownloadParams>,
) -> Result<Response, ApiError> {
    let expires_in = params.expires_in.unwrap_or(DEFAULT_EXPIRES_IN);
    if expires_in == 0 || expires_in > MAX_SIGNED_URL_EXPIRY.as_secs() {
        return Err(ApiError::bad_request(format!(
            "expiresIn must be between 1 and {} seconds",
            MAX_SIGNED_URL_EXPIRY.as_secs()
        )));
    }

    let file = find_file(&state, &file_id).await?;
    let store = object_store(&state)?;
    let key = key_from_url(&file.url)
        .ok_or_else(|| ApiError::internal(format!("Cannot derive object key from {}", file.url)))?;

    let download_url = store
        .signed_url(&key, Duration::from_secs(expires_in), Some(&file.file_name))
        .map_err(|e| ApiError::internal(format!("Failed to generate download URL: {e}")))?;

    tracing::debug!(file_id = file.id, key = %key, expires_in, "Issued download URL");

    if params.redirect.unwrap_or(false) {
        return Ok(Redirect::temporary(&download_url).into_response());
    }

    Ok(Envelope::success(DownloadResponse {
        download_url,
        file_name: file.file_name,
        s3_key: key,
        expires_in,
    })
    .into_response())
}
