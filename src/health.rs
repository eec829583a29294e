//! Dependency probing for the health endpoints and startup logging.

use std::sync::Arc;

use serde::Serialize;

use crate::object_store::{ObjectStore, ObjectStoreError};
use crate::storage::RecordStore;

/// State of one dependency.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Availability {
    Available,
    /// Reachable but not fully usable (e.g. credentials lack bucket access).
    Degraded(String),
    Unavailable(String),
    NotConfigured,
}

impl Availability {
    pub fn is_available(&self) -> bool {
        matches!(self, Availability::Available)
    }

    /// Connection label reported by the health endpoints.
    pub fn label(&self) -> &'static str {
        match self {
            Availability::Available => "connected",
            Availability::Degraded(_) => "degraded",
            Availability::Unavailable(_) => "disconnected",
            Availability::NotConfigured => "not_configured",
        }
    }

    pub fn detail(&self) -> Option<&str> {
        match self {
            Availability::Degraded(detail) | Availability::Unavailable(detail) => Some(detail.as_str()),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum HealthStatus {
    Ok,
    Degraded,
    Error,
}

#[derive(Debug, Clone, Serialize)]
pub struct DependencyHealth {
    pub status: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub backend: Option<&'static str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct HealthReport {
    pub status: HealthStatus,
    pub storage: DependencyHealth,
    pub database: DependencyHealth,
    pub timestamp: chrono::DateTime<chrono::Utc>,
}

impl HealthReport {
    /// `ok` when both dependencies are available, `error` when neither is,
    /// `degraded` otherwise.
    pub fn from_checks(
        storage: &Availability,
        storage_backend: Option<&'static str>,
        database: &Availability,
        database_backend: Option<&'static str>,
    ) -> Self {
        let status = match (storage.is_available(), database.is_available()) {
            (true, true) => HealthStatus::Ok,
            (false, false) => HealthStatus::Error,
            _ => HealthStatus::Degraded,
        };

        Self {
            status,
            storage: DependencyHealth {
                status: storage.label(),
                backend: storage_backend,
                error: storage.detail().map(str::to_string),
            },
            database: DependencyHealth {
                status: database.label(),
                backend: database_backend,
                error: database.detail().map(str::to_string),
            },
            timestamp: chrono::Utc::now(),
        }
    }
}

pub async fn check_object_store(store: Option<&dyn ObjectStore>) -> Availability {
    let Some(store) = store else {
        return Availability::NotConfigured;
    };

    match store.check().await {
        Ok(()) => Availability::Available,
        Err(e @ ObjectStoreError::Forbidden(_)) => Availability::Degraded(e.to_string()),
        Err(e) => Availability::Unavailable(e.to_string()),
    }
}

pub async fn check_record_store(records: Option<&dyn RecordStore>) -> Availability {
    let Some(records) = records else {
        return Availability::NotConfigured;
    };

    match records.ping().await {
        Ok(()) => Availability::Available,
        Err(e) => Availability::Unavailable(e.to_string()),
    }
}

/// Probe both dependencies concurrently.
pub async fn check(
    object_store: Option<&Arc<dyn ObjectStore>>,
    records: Option<&Arc<dyn RecordStore>>,
) -> HealthReport {
    let (storage, database) = tokio::join!(
        check_object_store(object_store.map(|s| &**s)),
        check_record_store(records.map(|r| &**r)),
    );

    HealthReport::from_checks(
        &storage,
        object_store.map(|s| s.backend_name()),
        &database,
        records.map(|r| r.backend_name()),
    )
}
