use std::collections::HashMap;
use std::sync::Arc;

use axum::extract::{Path, State};
use axum::Json;
use serde::Serialize;

use super::{object_store, record_store};
use crate::api::response::{ApiError, AppQuery, Envelope};
use crate::object_store::key_from_url;
use crate::evidence::classification::Classification;
use crate::storage::StoredFile;
use crate::AppState;

// ============================================================================
// Types
// ============================================================================

/// Client view of a generic file row.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FileView {
    pub id: i64,
    pub url: String,
    pub file_type: String,
    pub file_name: String,
    pub uploaded_at: String,
    pub metadata: Classification,
}

impl From<StoredFile> for FileView {
    fn from(file: StoredFile) -> Self {
        Self {
            id: file.id,
            url: file.url,
            file_type: file.file_type,
            file_name: file.file_name,
            uploaded_at: file
                .uploaded_at
                .to_rfc3339_opts(chrono::SecondsFormat::Millis, true),
            metadata: file.metadata,
        }
    }
}

#[derive(Debug, Serialize)]
pub struct FileListResponse {
    pub files: Vec<FileView>,
}

#[derive(Debug, Serialize)]
pub struct FileResponse {
    pub file: FileView,
}

#[derive(Debug, Serialize)]
pub struct DeleteResponse {
    pub message: String,
}

// ============================================================================
// Handlers
// ============================================================================

/// Generic files owned by a user. Every query pair `key=needle` must match a
/// metadata entry whose value contains `needle`.
pub async fn list_files(
    State(state): State<Arc<AppState>>,
    Path(user_id): Path<String>,
    AppQuery(filters): AppQuery<HashMap<String, String>>,
) -> Result<Json<Envelope<FileListResponse>>, ApiError> {
    let records = record_store(&state)?;

    let files = records
        .list_files(&user_id)
        .await
        .map_err(|e| ApiError::internal(e.to_string()))?
        .into_iter()
        .filter(|file| {
            file.metadata
                .matches_filters(filters.iter().map(|(k, v)| (k.as_str(), v.as_str())))
        })
        .map(FileView::from)
        .collect();

    Ok(Envelope::success(FileListResponse { files }))
}

pub async fn get_file(
    State(state): State<Arc<AppState>>,
    Path(file_id): Path<String>,
) -> Result<Json<Envelope<FileResponse>>, ApiError> {
    let file = find_file(&state, &file_id).await?;
    Ok(Envelope::success(FileResponse { file: file.into() }))
}

/// Remove the stored object, then its metadata row.
pub async fn delete_file(
    State(state): State<Arc<AppState>>,
    Path(file_id): Path<String>,
) -> Result<Json<Envelope<DeleteResponse>>, ApiError> {
    let file = find_file(&state, &file_id).await?;
    let store = object_store(&state)?;

    let key = key_from_url(&file.url)
        .ok_or_else(|| ApiError::internal(format!("Cannot derive object key from {}", file.url)))?;
    store
        .delete(&key)
        .await
        .map_err(|e| ApiError::internal(format!("Failed to delete stored object: {e}")))?;

    record_store(&state)?
        .delete_file(file.id)
        .await
        .map_err(|e| ApiError::internal(e.to_string()))?;

    tracing::info!(file_id = file.id, key = %key, "Deleted file");
    Ok(Envelope::success(DeleteResponse {
        message: "File deleted successfully".to_string(),
    }))
}

// ============================================================================
// Helpers
// ============================================================================

/// Look up a generic file by id. Ids that are not integers cannot exist.
pub(super) async fn find_file(state: &AppState, file_id: &str) -> Result<StoredFile, ApiError> {
    let records = record_store(state)?;
    let id: i64 = file_id
        .trim()
        .parse()
        .map_err(|_| ApiError::not_found("File not found"))?;

    records
        .get_file(id)
        .await
        .map_err(|e| ApiError::internal(e.to_string()))?
        .ok_or_else(|| ApiError::not_found("File not found"))
}
