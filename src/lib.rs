//! grc-evidence - evidence upload service for the GRC application
//!
//! Uploads evidence files to object storage and reconciles the resulting URLs
//! into the comma-joined evidence field of compliance findings and audits:
//! - Swappable object storage backends (local filesystem, S3)
//! - Record storage in redb (embedded) or the application's MySQL schema
//! - Degraded operation when either dependency is unavailable
//! - REST API with multipart upload, file metadata, signed downloads and an
//!   audit-trail receiver

pub mod api;
pub mod audit_log;
pub mod config;
pub mod evidence;
pub mod health;
pub mod object_store;
pub mod storage;
#[cfg(test)]
pub mod testutil;

use std::sync::Arc;

use config::Config;
use evidence::EvidenceUploadCoordinator;
use object_store::ObjectStore;
use storage::RecordStore;

/// Shared application state
pub struct AppState {
    pub config: Config,
    pub coordinator: EvidenceUploadCoordinator,
    pub object_store: Option<Arc<dyn ObjectStore>>,
    pub records: Option<Arc<dyn RecordStore>>,
}

impl AppState {
    pub fn new(
        config: Config,
        object_store: Option<Arc<dyn ObjectStore>>,
        records: Option<Arc<dyn RecordStore>>,
    ) -> Self {
        let coordinator = EvidenceUploadCoordinator::new(
            object_store.clone(),
            records.clone(),
            config.max_upload_size,
        );
        Self {
            config,
            coordinator,
            object_store,
            records,
        }
    }
}
