use axum::extract::{Path, State};
use axum::http::{header, HeaderValue, StatusCode};
use axum::response::{IntoResponse, Response};
use serde::Deserialize;
use std::sync::Arc;

use super::object_store;
use crate::api::response::{ApiError, AppQuery};
use crate::evidence::content_type::{content_type_for, file_extension};
use crate::object_store::ObjectStoreError;
use crate::AppState;

#[derive(Debug, Deserialize)]
pub struct SignedParams {
    pub expires: i64,
    #[serde(default)]
    pub filename: Option<String>,
    pub signature: String,
}

/// Serve an object from a backend that issues its own signed URLs.
/// Route: GET /api/objects/:key
pub async fn serve_object(
    State(state): State<Arc<AppState>>,
    Path(key): Path<String>,
    AppQuery(params): AppQuery<SignedParams>,
) -> Result<Response, ApiError> {
    let store = object_store(&state)?;

    store
        .verify_signed_url(
            &key,
            params.expires,
            params.filename.as_deref(),
            &params.signature,
        )
        .map_err(|e| match e {
            ObjectStoreError::Unsupported(_) => ApiError::not_found("Object not found"),
            _ => ApiError::forbidden("Invalid or expired download link"),
        })?;

    let data = store.get(&key).await.map_err(|e| match e {
        ObjectStoreError::NotFound(_) => ApiError::not_found("Object not found"),
        _ => ApiError::internal(format!("Failed to retrieve object: {e}")),
    })?;

    let name = params.filename.as_deref().unwrap_or(&key);
    let content_type = content_type_for(&file_extension(name));

    let mut response = (StatusCode::OK, data).into_response();
    let headers = response.headers_mut();

    headers.insert(header::CONTENT_TYPE, HeaderValue::from_static(content_type));

    if let Some(ref filename) = params.filename {
        let disposition = format!("attachment; filename=\"{}\"", filename.replace('"', "'"));
        if let Ok(value) = HeaderValue::from_str(&disposition) {
            headers.insert(header::CONTENT_DISPOSITION, value);
        }
    }

    headers.insert(
        header::CACHE_CONTROL,
        HeaderValue::from_static("private, no-store"),
    );

    Ok(response)
}
