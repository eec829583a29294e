use axum::extract::State;
use axum::http::StatusCode;
use axum::Json;
use std::sync::Arc;

use crate::api::response::Envelope;
use crate::health::{self, HealthReport, HealthStatus};
use crate::AppState;

/// Composite health: object store and record store reachability.
/// `ok` and `degraded` answer 200, `error` answers 503.
pub async fn health(
    State(state): State<Arc<AppState>>,
) -> (StatusCode, Json<Envelope<HealthReport>>) {
    let report = health::check(state.object_store.as_ref(), state.records.as_ref()).await;

    let (code, success) = match report.status {
        HealthStatus::Error => (StatusCode::SERVICE_UNAVAILABLE, false),
        HealthStatus::Ok | HealthStatus::Degraded => (StatusCode::OK, true),
    };

    (
        code,
        Json(Envelope {
            success,
            body: report,
        }),
    )
}
