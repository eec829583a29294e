//! MySQL record store against the GRC application's own schema.

use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::mysql::{MySqlConnectOptions, MySqlPoolOptions, MySqlRow};
use sqlx::{MySql, Pool, Row};

use super::models::*;
use super::{RecordStore, RecordStoreError};
use crate::config::MySqlConfig;
use crate::evidence::classification::Classification;

const CREATE_FILES_TABLE: &str = r#"
    CREATE TABLE IF NOT EXISTS s3_files (
        id INT AUTO_INCREMENT PRIMARY KEY,
        url VARCHAR(255) NOT NULL,
        file_type VARCHAR(50) NOT NULL,
        file_name VARCHAR(255) NOT NULL,
        user_id VARCHAR(100) NOT NULL,
        metadata JSON,
        uploaded_at TIMESTAMP DEFAULT CURRENT_TIMESTAMP
    )
"#;

const FINDING_COLUMNS: &str = r#"
    CAST(AuditFindingsId AS SIGNED) AS id,
    CAST(ComplianceId AS SIGNED) AS compliance_id,
    CAST(AuditId AS SIGNED) AS audit_id,
    COALESCE(Evidence, '') AS evidence,
    COALESCE(CAST(UserId AS CHAR), '') AS owner_user_id,
    COALESCE(CAST(`Check` AS CHAR), '') AS status_code
"#;

const FILE_COLUMNS: &str = r#"
    CAST(id AS SIGNED) AS id,
    url,
    file_type,
    file_name,
    user_id,
    CAST(metadata AS CHAR) AS metadata,
    uploaded_at
"#;

/// Connection pool over the `audit_findings`, `audit` and `s3_files` tables.
///
/// The pool connects lazily so the service starts (degraded) while the
/// database is down. Connections go back to the pool when the borrowing
/// query finishes, on success and error alike.
pub struct MySqlRecordStore {
    pool: Pool<MySql>,
}

impl MySqlRecordStore {
    pub fn new(config: &MySqlConfig) -> Self {
        let opts = MySqlConnectOptions::new()
            .host(&config.host)
            .port(config.port)
            .username(&config.user)
            .password(&config.password)
            .database(&config.database);

        tracing::info!(
            host = %config.host,
            port = config.port,
            database = %config.database,
            user = %config.user,
            pool_size = config.pool_size,
            "Configuring MySQL record store"
        );

        let pool = MySqlPoolOptions::new()
            .max_connections(config.pool_size)
            .acquire_timeout(Duration::from_secs(10))
            .connect_lazy_with(opts);

        Self { pool }
    }

    /// Create the file-metadata table if missing. Findings and audits are
    /// owned by the GRC application and never created here.
    pub async fn migrate(&self) -> Result<(), RecordStoreError> {
        sqlx::query(CREATE_FILES_TABLE).execute(&self.pool).await?;
        Ok(())
    }

    async fn fetch_file(&self, file_id: i64) -> Result<Option<StoredFile>, RecordStoreError> {
        let sql = format!("SELECT {FILE_COLUMNS} FROM s3_files WHERE id = ?");
        let row = sqlx::query(&sql)
            .bind(file_id)
            .fetch_optional(&self.pool)
            .await?;
        row.map(|row| file_from_row(&row)).transpose()
    }
}

fn finding_from_row(row: &MySqlRow) -> Result<FindingRecord, sqlx::Error> {
    Ok(FindingRecord {
        id: row.try_get("id")?,
        compliance_id: row.try_get("compliance_id")?,
        audit_id: row.try_get("audit_id")?,
        evidence: row.try_get("evidence")?,
        owner_user_id: row.try_get("owner_user_id")?,
        status_code: row.try_get("status_code")?,
    })
}

fn file_from_row(row: &MySqlRow) -> Result<StoredFile, RecordStoreError> {
    let metadata: Option<String> = row.try_get("metadata")?;
    let metadata = match metadata {
        Some(json) if !json.trim().is_empty() => serde_json::from_str::<Classification>(&json)?,
        _ => Classification::new(),
    };
    let uploaded_at: DateTime<Utc> = row.try_get("uploaded_at")?;

    Ok(StoredFile {
        id: row.try_get("id")?,
        url: row.try_get("url")?,
        file_type: row.try_get("file_type")?,
        file_name: row.try_get("file_name")?,
        owner_user_id: row.try_get("user_id")?,
        metadata,
        uploaded_at,
    })
}

#[async_trait]
impl RecordStore for MySqlRecordStore {
    async fn find_finding(&self, key: &FindingKey) -> Result<Option<FindingRecord>, RecordStoreError> {
        let row = match key.audit_id {
            Some(audit_id) => {
                let sql = format!(
                    "SELECT {FINDING_COLUMNS} FROM audit_findings \
                     WHERE AuditId = ? AND ComplianceId = ? \
                     ORDER BY AuditFindingsId LIMIT 1"
                );
                sqlx::query(&sql)
                    .bind(audit_id)
                    .bind(key.compliance_id)
                    .fetch_optional(&self.pool)
                    .await?
            }
            None => {
                let sql = format!(
                    "SELECT {FINDING_COLUMNS} FROM audit_findings \
                     WHERE ComplianceId = ? \
                     ORDER BY AuditFindingsId LIMIT 1"
                );
                sqlx::query(&sql)
                    .bind(key.compliance_id)
                    .fetch_optional(&self.pool)
                    .await?
            }
        };

        Ok(row.map(|row| finding_from_row(&row)).transpose()?)
    }

    async fn insert_finding(&self, finding: &NewFinding) -> Result<i64, RecordStoreError> {
        let result = sqlx::query(
            "INSERT INTO audit_findings (AuditId, ComplianceId, Evidence, UserId, `Check`) \
             VALUES (?, ?, ?, ?, ?)",
        )
        .bind(finding.audit_id)
        .bind(finding.compliance_id)
        .bind(&finding.evidence)
        .bind(&finding.owner_user_id)
        .bind(&finding.status_code)
        .execute(&self.pool)
        .await?;

        Ok(result.last_insert_id() as i64)
    }

    async fn replace_finding_evidence(
        &self,
        finding_id: i64,
        expected: &str,
        evidence: &str,
    ) -> Result<bool, RecordStoreError> {
        let result = sqlx::query(
            "UPDATE audit_findings SET Evidence = ? \
             WHERE AuditFindingsId = ? AND COALESCE(Evidence, '') = ?",
        )
        .bind(evidence)
        .bind(finding_id)
        .bind(expected)
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected() == 1)
    }

    async fn find_audit(&self, audit_id: i64) -> Result<Option<AuditRecord>, RecordStoreError> {
        let row = sqlx::query(
            "SELECT CAST(AuditId AS SIGNED) AS id, COALESCE(Evidence, '') AS evidence \
             FROM audit WHERE AuditId = ?",
        )
        .bind(audit_id)
        .fetch_optional(&self.pool)
        .await?;

        match row {
            Some(row) => Ok(Some(AuditRecord {
                id: row.try_get("id")?,
                evidence: row.try_get("evidence")?,
            })),
            None => Ok(None),
        }
    }

    async fn replace_audit_evidence(
        &self,
        audit_id: i64,
        expected: &str,
        evidence: &str,
    ) -> Result<bool, RecordStoreError> {
        let result = sqlx::query(
            "UPDATE audit SET Evidence = ? WHERE AuditId = ? AND COALESCE(Evidence, '') = ?",
        )
        .bind(evidence)
        .bind(audit_id)
        .bind(expected)
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected() == 1)
    }

    async fn insert_file(&self, file: &NewStoredFile) -> Result<StoredFile, RecordStoreError> {
        let metadata = serde_json::to_string(&file.metadata)?;
        let result = sqlx::query(
            "INSERT INTO s3_files (url, file_type, file_name, user_id, metadata) \
             VALUES (?, ?, ?, ?, ?)",
        )
        .bind(&file.url)
        .bind(&file.file_type)
        .bind(&file.file_name)
        .bind(&file.owner_user_id)
        .bind(metadata)
        .execute(&self.pool)
        .await?;

        let file_id = result.last_insert_id() as i64;
        match self.fetch_file(file_id).await? {
            Some(stored) => Ok(stored),
            // Row vanished between insert and read-back; report what was written.
            None => Ok(StoredFile {
                id: file_id,
                url: file.url.clone(),
                file_type: file.file_type.clone(),
                file_name: file.file_name.clone(),
                owner_user_id: file.owner_user_id.clone(),
                metadata: file.metadata.clone(),
                uploaded_at: Utc::now(),
            }),
        }
    }

    async fn get_file(&self, file_id: i64) -> Result<Option<StoredFile>, RecordStoreError> {
        self.fetch_file(file_id).await
    }

    async fn list_files(&self, user_id: &str) -> Result<Vec<StoredFile>, RecordStoreError> {
        let sql = format!(
            "SELECT {FILE_COLUMNS} FROM s3_files WHERE user_id = ? \
             ORDER BY uploaded_at DESC, id DESC"
        );
        let rows = sqlx::query(&sql)
            .bind(user_id)
            .fetch_all(&self.pool)
            .await?;

        rows.iter().map(file_from_row).collect()
    }

    async fn delete_file(&self, file_id: i64) -> Result<bool, RecordStoreError> {
        let result = sqlx::query("DELETE FROM s3_files WHERE id = ?")
            .bind(file_id)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }

    async fn ping(&self) -> Result<(), RecordStoreError> {
        sqlx::query("SELECT 1").execute(&self.pool).await?;
        Ok(())
    }

    async fn close(&self) {
        self.pool.close().await;
    }

    fn backend_name(&self) -> &'static str {
        "mysql"
    }
}
