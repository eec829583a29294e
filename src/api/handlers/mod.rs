mod download;
mod files;
mod health;
mod logs;
mod objects;
mod upload;

use std::sync::Arc;

use crate::api::response::ApiError;
use crate::object_store::ObjectStore;
use crate::storage::RecordStore;
use crate::AppState;

pub use download::download;
pub use files::{delete_file, get_file, list_files};
pub use health::health;
pub use logs::record_log;
pub use objects::serve_object;
pub use upload::upload;

/// The configured object store, or 503.
fn object_store(state: &AppState) -> Result<&Arc<dyn ObjectStore>, ApiError> {
    state
        .object_store
        .as_ref()
        .ok_or_else(|| ApiError::unavailable("Object storage is not configured"))
}

/// The configured record store, or 503.
fn record_store(state: &AppState) -> Result<&Arc<dyn RecordStore>, ApiError> {
    state
        .records
        .as_ref()
        .ok_or_else(|| ApiError::unavailable("Database connection not available"))
}
