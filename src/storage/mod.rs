pub mod db;
mod files;
mod findings;
pub mod models;
mod mysql;
mod tables;

pub use db::{Database, DatabaseError};
pub use models::*;
pub use mysql::MySqlRecordStore;

use async_trait::async_trait;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum RecordStoreError {
    #[error(transparent)]
    Database(#[from] DatabaseError),
    #[error("MySQL error: {0}")]
    MySql(#[from] sqlx::Error),
    #[error("Invalid file metadata: {0}")]
    Metadata(#[from] serde_json::Error),
}

/// Relational storage for findings, audits and generic file metadata.
///
/// Evidence updates are compare-and-swap: `replace_*_evidence` writes only if
/// the stored value still equals `expected` and reports whether it did.
#[async_trait]
pub trait RecordStore: Send + Sync {
    async fn find_finding(&self, key: &FindingKey) -> Result<Option<FindingRecord>, RecordStoreError>;

    async fn insert_finding(&self, finding: &NewFinding) -> Result<i64, RecordStoreError>;

    async fn replace_finding_evidence(
        &self,
        finding_id: i64,
        expected: &str,
        evidence: &str,
    ) -> Result<bool, RecordStoreError>;

    async fn find_audit(&self, audit_id: i64) -> Result<Option<AuditRecord>, RecordStoreError>;

    async fn replace_audit_evidence(
        &self,
        audit_id: i64,
        expected: &str,
        evidence: &str,
    ) -> Result<bool, RecordStoreError>;

    async fn insert_file(&self, file: &NewStoredFile) -> Result<StoredFile, RecordStoreError>;

    async fn get_file(&self, file_id: i64) -> Result<Option<StoredFile>, RecordStoreError>;

    /// Files owned by `user_id`, newest first.
    async fn list_files(&self, user_id: &str) -> Result<Vec<StoredFile>, RecordStoreError>;

    async fn delete_file(&self, file_id: i64) -> Result<bool, RecordStoreError>;

    async fn ping(&self) -> Result<(), RecordStoreError>;

    /// Release pooled connections at shutdown.
    async fn close(&self) {}

    fn backend_name(&self) -> &'static str;
}
