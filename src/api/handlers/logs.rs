use axum::Json;
use serde::Serialize;

use crate::api::response::{ApiError, AppJson, Envelope};
use crate::audit_log::{self, LogEntry};

#[derive(Debug, Serialize)]
pub struct LogResponse {
    pub message: &'static str,
}

pub async fn record_log(
    AppJson(entry): AppJson<LogEntry>,
) -> Result<Json<Envelope<LogResponse>>, ApiError> {
    entry
        .validate()
        .map_err(|e| ApiError::bad_request(e.to_string()))?;

    audit_log::record(&entry);

    Ok(Envelope::success(LogResponse {
        message: "Log recorded successfully",
    }))
}
