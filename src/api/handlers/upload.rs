use axum::extract::{Multipart, State};
use axum::Json;
use serde::Serialize;
use std::sync::Arc;

use crate::api::response::{ApiError, Envelope};
use crate::evidence::classification::Classification;
use crate::evidence::{
    Reconciliation, UploadOutcome, UploadRequest, UploadedFile, ValidationError,
};
use crate::AppState;

// ============================================================================
// Types
// ============================================================================

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct UploadedFileResponse {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub id: Option<i64>,
    pub url: String,
    pub file_type: String,
    pub file_name: String,
    pub uploaded_at: String,
    pub metadata: Classification,
    #[serde(rename = "s3_location")]
    pub s3_location: String,
    #[serde(rename = "file_id")]
    pub file_id: String,
    pub s3_key: String,
}

#[derive(Debug, Serialize)]
pub struct UploadResponse {
    pub file: UploadedFileResponse,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub warning: Option<String>,
    pub database_updated: bool,
}

// ============================================================================
// Handlers
// ============================================================================

/// Multipart upload. `file` carries the bytes, `userId` and `fileName` are
/// consumed here, every other text field becomes a classification parameter
/// in the order it was sent.
pub async fn upload(
    State(state): State<Arc<AppState>>,
    mut multipart: Multipart,
) -> Result<Json<Envelope<UploadResponse>>, ApiError> {
    let mut file: Option<UploadedFile> = None;
    let mut file_name: Option<String> = None;
    let mut user_id: Option<String> = None;
    let mut classification = Classification::new();

    while let Some(field) = multipart.next_field().await.map_err(|e| {
        ApiError::new(e.status(), format!("Invalid multipart data: {}", e.body_text()))
    })? {
        let field_name = field.name().unwrap_or("").to_string();

        if field_name == "file" {
            let original_name = field.file_name().unwrap_or_default().to_string();
            let data = field.bytes().await.map_err(|e| {
                ApiError::new(e.status(), format!("Failed to read file: {}", e.body_text()))
            })?;
            file = Some(UploadedFile {
                data,
                original_name,
            });
            continue;
        }

        let value = field
            .text()
            .await
            .map_err(|e| ApiError::bad_request(format!("Invalid field '{field_name}': {e}")))?;

        match field_name.as_str() {
            "userId" => user_id = Some(value).filter(|v| !v.trim().is_empty()),
            "fileName" => file_name = Some(value),
            "" => {}
            _ => classification.insert(field_name, value),
        }
    }

    let request = UploadRequest {
        file,
        file_name,
        user_id: user_id.unwrap_or_else(|| state.config.default_user_id.clone()),
        classification,
    };

    let outcome = state
        .coordinator
        .upload(request)
        .await
        .map_err(validation_error)?;

    if let Some(ref warning) = outcome.warning() {
        tracing::warn!(url = %outcome.url, warning = %warning, "Upload completed with warnings");
    }

    Ok(Envelope::success(upload_response(outcome)))
}

// ============================================================================
// Helpers
// ============================================================================

fn validation_error(e: ValidationError) -> ApiError {
    match e {
        ValidationError::TooLarge { .. } => ApiError::payload_too_large(e.to_string()),
        _ => ApiError::bad_request(e.to_string()),
    }
}

fn upload_response(outcome: UploadOutcome) -> UploadResponse {
    let warning = outcome.warning();
    let database_updated = outcome.database_updated();
    let file_id = outcome.file_id();
    let id = match outcome.reconciliation {
        Reconciliation::Registered(ref stored) => Some(stored.id),
        _ => None,
    };

    UploadResponse {
        file: UploadedFileResponse {
            id,
            s3_location: outcome.url.clone(),
            url: outcome.url,
            file_type: outcome.file_type,
            file_name: outcome.file_name,
            uploaded_at: outcome
                .uploaded_at
                .to_rfc3339_opts(chrono::SecondsFormat::Millis, true),
            metadata: outcome.classification,
            file_id,
            s3_key: outcome.object_name,
        },
        warning,
        database_updated,
    }
}
