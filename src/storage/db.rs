use async_trait::async_trait;
use redb::{Database as RedbDatabase, ReadTransaction, ReadableTable, WriteTransaction};
use serde::de::DeserializeOwned;
use std::path::Path;
use std::sync::Arc;
use thiserror::Error;

use super::models::*;
use super::tables::*;
use super::{RecordStore, RecordStoreError};

#[derive(Debug, Error)]
pub enum DatabaseError {
    #[error("Commit error: {0}")]
    Commit(Box<redb::CommitError>),
    #[error("Database error: {0}")]
    Redb(Box<redb::Error>),
    #[error("Database error: {0}")]
    RedbDatabase(Box<redb::DatabaseError>),
    #[error("Deserialization error: {0}")]
    Deserialization(#[from] rmp_serde::decode::Error),
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("Serialization error: {0}")]
    Serialization(#[from] rmp_serde::encode::Error),
    #[error("Storage error: {0}")]
    Storage(Box<redb::StorageError>),
    #[error("Table error: {0}")]
    Table(Box<redb::TableError>),
    #[error("Transaction error: {0}")]
    Transaction(Box<redb::TransactionError>),
}

impl From<redb::CommitError> for DatabaseError {
    fn from(e: redb::CommitError) -> Self {
        DatabaseError::Commit(Box::new(e))
    }
}

impl From<redb::DatabaseError> for DatabaseError {
    fn from(e: redb::DatabaseError) -> Self {
        DatabaseError::RedbDatabase(Box::new(e))
    }
}

impl From<redb::Error> for DatabaseError {
    fn from(e: redb::Error) -> Self {
        DatabaseError::Redb(Box::new(e))
    }
}

impl From<redb::StorageError> for DatabaseError {
    fn from(e: redb::StorageError) -> Self {
        DatabaseError::Storage(Box::new(e))
    }
}

impl From<redb::TableError> for DatabaseError {
    fn from(e: redb::TableError) -> Self {
        DatabaseError::Table(Box::new(e))
    }
}

impl From<redb::TransactionError> for DatabaseError {
    fn from(e: redb::TransactionError) -> Self {
        DatabaseError::Transaction(Box::new(e))
    }
}

/// Embedded record store: findings, audits and generic file metadata in a
/// single redb file.
pub struct Database {
    db: Arc<RedbDatabase>,
}

impl Clone for Database {
    fn clone(&self) -> Self {
        Self {
            db: Arc::clone(&self.db),
        }
    }
}

impl Database {
    /// Open or create a database at the given path
    pub fn open<P: AsRef<Path>>(data_dir: P) -> Result<Self, DatabaseError> {
        std::fs::create_dir_all(data_dir.as_ref())?;
        let db_path = data_dir.as_ref().join("grc-evidence.redb");
        let db = Arc::new(RedbDatabase::create(db_path)?);

        let write_txn = db.begin_write()?;
        {
            let _ = write_txn.open_table(FINDINGS)?;
            let _ = write_txn.open_table(COMPLIANCE_FINDINGS)?;
            let _ = write_txn.open_table(AUDITS)?;
            let _ = write_txn.open_table(FILES)?;
            let _ = write_txn.open_table(USER_FILES)?;
            let _ = write_txn.open_table(SEQUENCES)?;
        }
        write_txn.commit()?;

        Ok(Self { db })
    }

    pub fn begin_read(&self) -> Result<ReadTransaction, DatabaseError> {
        Ok(self.db.begin_read()?)
    }

    pub fn begin_write(&self) -> Result<WriteTransaction, DatabaseError> {
        Ok(self.db.begin_write()?)
    }

    /// Round-trip a read transaction; used as the health check.
    pub fn ping(&self) -> Result<(), DatabaseError> {
        let read_txn = self.begin_read()?;
        let table = read_txn.open_table(SEQUENCES)?;
        let _ = table.get("findings")?;
        Ok(())
    }

    // ========================================================================
    // Audit operations
    // ========================================================================

    /// Create or overwrite an audit row. Audits are owned by the wider GRC
    /// application; this exists for administration and seeding.
    pub fn put_audit(&self, audit: &AuditRecord) -> Result<(), DatabaseError> {
        let write_txn = self.begin_write()?;
        {
            let mut table = write_txn.open_table(AUDITS)?;
            let data = rmp_serde::to_vec_named(audit)?;
            table.insert(audit.id, data.as_slice())?;
        }
        write_txn.commit()?;
        Ok(())
    }

    pub fn get_audit(&self, audit_id: i64) -> Result<Option<AuditRecord>, DatabaseError> {
        let read_txn = self.begin_read()?;
        let table = read_txn.open_table(AUDITS)?;

        match table.get(audit_id)? {
            Some(data) => Ok(Some(decode(data.value())?)),
            None => Ok(None),
        }
    }

    /// Replace the audit's evidence only if it still equals `expected`.
    pub fn swap_audit_evidence(
        &self,
        audit_id: i64,
        expected: &str,
        evidence: &str,
    ) -> Result<bool, DatabaseError> {
        let write_txn = self.begin_write()?;
        let swapped = {
            let mut table = write_txn.open_table(AUDITS)?;
            let current: Option<AuditRecord> = match table.get(audit_id)? {
                Some(data) => Some(decode(data.value())?),
                None => None,
            };

            match current {
                Some(mut audit) if audit.evidence == expected => {
                    audit.evidence = evidence.to_string();
                    let data = rmp_serde::to_vec_named(&audit)?;
                    table.insert(audit_id, data.as_slice())?;
                    true
                }
                _ => false,
            }
        };
        write_txn.commit()?;
        Ok(swapped)
    }
}

/// Issue the next id of a named sequence inside `txn`. Ids start at 1.
pub(super) fn next_id(txn: &WriteTransaction, sequence: &str) -> Result<i64, DatabaseError> {
    let mut table = txn.open_table(SEQUENCES)?;
    let next = table.get(sequence)?.map(|v| v.value()).unwrap_or(0) + 1;
    table.insert(sequence, next)?;
    Ok(next as i64)
}

pub(super) fn decode<T: DeserializeOwned>(bytes: &[u8]) -> Result<T, DatabaseError> {
    Ok(rmp_serde::from_slice(bytes)?)
}

#[async_trait]
impl RecordStore for Database {
    async fn find_finding(&self, key: &FindingKey) -> Result<Option<FindingRecord>, RecordStoreError> {
        Ok(self.first_finding(key)?)
    }

    async fn insert_finding(&self, finding: &NewFinding) -> Result<i64, RecordStoreError> {
        Ok(self.create_finding(finding)?)
    }

    async fn replace_finding_evidence(
        &self,
        finding_id: i64,
        expected: &str,
        evidence: &str,
    ) -> Result<bool, RecordStoreError> {
        Ok(self.swap_finding_evidence(finding_id, expected, evidence)?)
    }

    async fn find_audit(&self, audit_id: i64) -> Result<Option<AuditRecord>, RecordStoreError> {
        Ok(self.get_audit(audit_id)?)
    }

    async fn replace_audit_evidence(
        &self,
        audit_id: i64,
        expected: &str,
        evidence: &str,
    ) -> Result<bool, RecordStoreError> {
        Ok(self.swap_audit_evidence(audit_id, expected, evidence)?)
    }

    async fn insert_file(&self, file: &NewStoredFile) -> Result<StoredFile, RecordStoreError> {
        Ok(self.put_file(file)?)
    }

    async fn get_file(&self, file_id: i64) -> Result<Option<StoredFile>, RecordStoreError> {
        Ok(Database::get_file(self, file_id)?)
    }

    async fn list_files(&self, user_id: &str) -> Result<Vec<StoredFile>, RecordStoreError> {
        Ok(self.get_files_by_owner(user_id)?)
    }

    async fn delete_file(&self, file_id: i64) -> Result<bool, RecordStoreError> {
        Ok(Database::delete_file(self, file_id)?)
    }

    async fn ping(&self) -> Result<(), RecordStoreError> {
        Ok(Database::ping(self)?)
    }

    fn backend_name(&self) -> &'static str {
        "redb"
    }
}
