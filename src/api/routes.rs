use axum::{
    extract::DefaultBodyLimit,
    http::{HeaderValue, Method},
    routing::{get, post},
    Router,
};
use std::sync::Arc;
use tower_http::cors::{AllowOrigin, Any, CorsLayer};
use tower_http::trace::TraceLayer;

use super::handlers;
use crate::AppState;

/// Allowance for multipart framing and text fields on top of the file itself.
const MULTIPART_OVERHEAD: usize = 1024 * 1024;

pub fn create_router(state: Arc<AppState>) -> Router {
    let upload_limit = state.config.max_upload_size as usize + MULTIPART_OVERHEAD;
    let cors = cors_layer(&state.config.server.cors_allowed_origins);

    Router::new()
        // Uploads
        .route(
            "/api/upload",
            post(handlers::upload).layer(DefaultBodyLimit::max(upload_limit)),
        )
        // Generic file metadata
        .route("/api/files/:user_id", get(handlers::list_files))
        .route(
            "/api/file/:file_id",
            get(handlers::get_file).delete(handlers::delete_file),
        )
        .route("/api/download/:file_id", get(handlers::download))
        .route("/api/objects/:key", get(handlers::serve_object))
        // Audit trail
        .route("/api/logs", post(handlers::record_log))
        // Health
        .route("/api/ping", get(handlers::health))
        .route("/api/health", get(handlers::health))
        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

fn cors_layer(origins: &[String]) -> CorsLayer {
    let layer = CorsLayer::new()
        .allow_methods([Method::GET, Method::POST, Method::DELETE, Method::OPTIONS])
        .allow_headers(Any);

    if origins.iter().any(|o| o == "*") {
        return layer.allow_origin(Any);
    }

    let allowed: Vec<HeaderValue> = origins
        .iter()
        .filter_map(|origin| match HeaderValue::from_str(origin) {
            Ok(value) => Some(value),
            Err(_) => {
                tracing::warn!(origin = %origin, "Ignoring invalid CORS origin");
                None
            }
        })
        .collect();

    layer.allow_origin(AllowOrigin::list(allowed))
}
