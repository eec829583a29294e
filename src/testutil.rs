//! Shared test helpers for handler tests.

use std::sync::Arc;

use crate::config::{
    Config, DatabaseBackend, DatabaseConfig, ServerConfig, StorageBackend, StorageConfig,
};
use crate::object_store::{LocalStore, ObjectStore};
use crate::storage::{Database, RecordStore};
use crate::AppState;

pub const TEST_SIGNING_SECRET: &str = "test-signing-secret";

pub fn test_config(temp_dir: &tempfile::TempDir) -> Config {
    let data_dir = temp_dir.path().join("data");
    let files_dir = temp_dir.path().join("files");

    Config {
        server: ServerConfig {
            bind_address: "127.0.0.1:0".to_string(),
            ..ServerConfig::default()
        },
        storage: StorageConfig {
            backend: StorageBackend::Local,
            local_storage_path: files_dir.to_string_lossy().to_string(),
            local_signing_secret: Some(TEST_SIGNING_SECRET.to_string()),
            s3: None,
        },
        database: DatabaseConfig {
            backend: DatabaseBackend::Redb,
            data_dir: data_dir.to_string_lossy().to_string(),
            mysql: None,
        },
        max_upload_size: 10 * 1024 * 1024, // 10MB for tests
        default_user_id: "default-user".to_string(),
        audit_log_dir: None,
    }
}

/// Test AppState backed by a temporary redb database and local object store.
pub fn test_state(temp_dir: &tempfile::TempDir) -> Arc<AppState> {
    let config = test_config(temp_dir);

    let db = Database::open(&config.database.data_dir).expect("Failed to open test database");
    let object_store = LocalStore::new(
        &config.storage.local_storage_path,
        &config.server.public_base_url,
        TEST_SIGNING_SECRET.as_bytes(),
    )
    .expect("Failed to create test object store");

    let object_store: Arc<dyn ObjectStore> = Arc::new(object_store);
    let records: Arc<dyn RecordStore> = Arc::new(db);
    Arc::new(AppState::new(config, Some(object_store), Some(records)))
}

/// Test AppState with neither dependency configured.
pub fn degraded_state(temp_dir: &tempfile::TempDir) -> Arc<AppState> {
    Arc::new(AppState::new(test_config(temp_dir), None, None))
}
