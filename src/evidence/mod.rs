//! Evidence upload: store the bytes, then reconcile the resulting URL into
//! the finding or audit it documents.

pub mod classification;
pub mod content_type;
pub mod merge;
pub mod naming;

use std::sync::Arc;

use bytes::Bytes;
use chrono::{DateTime, Utc};
use thiserror::Error;

use crate::object_store::ObjectStore;
use crate::storage::{
    FindingKey, NewFinding, NewStoredFile, RecordStore, RecordStoreError, StoredFile,
    IN_REVIEW_STATUS,
};
use classification::{Classification, DocumentKind, AUDIT_ID, COMPLIANCE_ID};
use merge::{append_evidence, EvidenceList};

/// Attempts at the compare-and-swap evidence write before giving up.
pub const MAX_APPEND_ATTEMPTS: u32 = 3;

/// Client input that is rejected before any side effect.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    #[error("No file uploaded")]
    MissingFile,
    #[error("File name must not be empty")]
    EmptyFileName,
    #[error("File exceeds the maximum upload size of {limit} bytes")]
    TooLarge { limit: u64 },
    #[error("Compliance evidence uploads require a compliance_id parameter")]
    MissingComplianceId,
    #[error("Audit evidence uploads require an audit_id parameter")]
    MissingAuditId,
    #[error("{field} must be an integer (got '{value}')")]
    InvalidIdentifier { field: &'static str, value: String },
}

/// Failure to record the URL after the object was stored. Reported as a
/// warning, never as a failed upload.
#[derive(Debug, Error)]
pub enum ReconciliationError {
    #[error("database connection was not available")]
    Unavailable,
    #[error(transparent)]
    Store(#[from] RecordStoreError),
    #[error("evidence was modified concurrently {attempts} times in a row")]
    Conflict { attempts: u32 },
}

#[derive(Debug, Clone)]
pub struct UploadedFile {
    pub data: Bytes,
    pub original_name: String,
}

#[derive(Debug, Clone)]
pub struct UploadRequest {
    pub file: Option<UploadedFile>,
    /// Overrides the original file name when set.
    pub file_name: Option<String>,
    pub user_id: String,
    pub classification: Classification,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StorageOutcome {
    Stored { key: String },
    /// Object storage was missing or failed; the URL is a placeholder.
    Fallback { reason: String },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EvidenceTarget {
    Finding(i64),
    Audit(i64),
}

#[derive(Debug)]
pub enum Reconciliation {
    /// URL appended to an existing evidence field.
    Appended {
        target: EvidenceTarget,
        evidence: EvidenceList,
    },
    /// No finding matched; a new one was created with the URL as its evidence.
    Created { finding_id: i64 },
    /// Generic upload recorded in the file-metadata table.
    Registered(StoredFile),
    AuditNotFound { audit_id: i64 },
    /// Nothing to reconcile: the object was not stored.
    Skipped,
    Failed(ReconciliationError),
}

/// Result of an accepted upload, including the degraded cases.
#[derive(Debug)]
pub struct UploadOutcome {
    pub url: String,
    pub file_name: String,
    /// Lower-cased extension of the original file name.
    pub file_type: String,
    pub content_type: &'static str,
    pub uploaded_at: DateTime<Utc>,
    pub classification: Classification,
    pub object_name: String,
    pub storage: StorageOutcome,
    pub reconciliation: Reconciliation,
}

impl UploadOutcome {
    pub fn database_updated(&self) -> bool {
        matches!(
            self.reconciliation,
            Reconciliation::Appended { .. }
                | Reconciliation::Created { .. }
                | Reconciliation::Registered(_)
        )
    }

    /// Identifier handed back to the client: the metadata row id for generic
    /// uploads, otherwise the object name (or placeholder name).
    pub fn file_id(&self) -> String {
        match (&self.reconciliation, &self.storage) {
            (Reconciliation::Registered(file), _) => file.id.to_string(),
            (_, StorageOutcome::Stored { key }) => key.clone(),
            (_, StorageOutcome::Fallback { .. }) => {
                naming::fallback_file_id(self.uploaded_at.timestamp_millis(), &self.file_name)
            }
        }
    }

    /// Human-readable explanation of whatever did not complete.
    pub fn warning(&self) -> Option<String> {
        let mut warnings = Vec::new();

        if let StorageOutcome::Fallback { ref reason } = self.storage {
            warnings.push(format!(
                "File storage unavailable ({reason}); returned a placeholder URL and the file was not stored"
            ));
        }

        match self.reconciliation {
            Reconciliation::Failed(ref e) => {
                warnings.push(format!("File uploaded but database update failed: {e}"))
            }
            Reconciliation::AuditNotFound { audit_id } => warnings.push(format!(
                "File uploaded but audit {audit_id} was not found; evidence was not linked"
            )),
            _ => {}
        }

        if warnings.is_empty() {
            None
        } else {
            Some(warnings.join("; "))
        }
    }
}

/// Where a validated upload is reconciled.
#[derive(Debug, Clone, Copy)]
enum Target {
    Finding(FindingKey),
    Audit(i64),
    General,
}

/// Orchestrates one upload: validate, store the object (or fall back to a
/// placeholder URL), then append the URL to the target record.
///
/// Both dependencies are optional; a missing one is handled as degraded
/// mode, not as an error.
pub struct EvidenceUploadCoordinator {
    object_store: Option<Arc<dyn ObjectStore>>,
    records: Option<Arc<dyn RecordStore>>,
    max_upload_size: u64,
}

impl EvidenceUploadCoordinator {
    pub fn new(
        object_store: Option<Arc<dyn ObjectStore>>,
        records: Option<Arc<dyn RecordStore>>,
        max_upload_size: u64,
    ) -> Self {
        Self {
            object_store,
            records,
            max_upload_size,
        }
    }

    pub async fn upload(&self, request: UploadRequest) -> Result<UploadOutcome, ValidationError> {
        let UploadRequest {
            file,
            file_name,
            user_id,
            classification,
        } = request;

        let file = file.ok_or(ValidationError::MissingFile)?;
        if file.data.len() as u64 > self.max_upload_size {
            return Err(ValidationError::TooLarge {
                limit: self.max_upload_size,
            });
        }
        let file_name = file_name
            .filter(|name| !name.trim().is_empty())
            .unwrap_or_else(|| file.original_name.clone());
        if file_name.trim().is_empty() {
            return Err(ValidationError::EmptyFileName);
        }
        let target = resolve_target(&classification)?;

        let file_type = content_type::file_extension(&file.original_name);
        let content_type = content_type::content_type_for(&file_type);
        let uploaded_at = Utc::now();
        let millis = uploaded_at.timestamp_millis();
        let object_name = naming::object_name(millis, &file_name, &classification);

        if !matches!(target, Target::General) {
            tracing::info!(
                file_name = %file_name,
                file_type = %file_type,
                size = file.data.len(),
                user_id = %user_id,
                compliance_id = classification.get(COMPLIANCE_ID).unwrap_or("N/A"),
                audit_id = classification.get(AUDIT_ID).unwrap_or("N/A"),
                "Evidence upload received"
            );
        }

        let (url, storage) = match self
            .store_object(&object_name, file.data, content_type, &user_id)
            .await
        {
            Ok(url) => {
                tracing::info!(key = %object_name, url = %url, "Object stored");
                (url, StorageOutcome::Stored { key: object_name.clone() })
            }
            Err(reason) => {
                let url = naming::fallback_url(&naming::fallback_file_id(millis, &file_name));
                tracing::warn!(
                    key = %object_name,
                    fallback_url = %url,
                    reason = %reason,
                    "Object storage unavailable, using fallback URL"
                );
                (url, StorageOutcome::Fallback { reason })
            }
        };

        let reconciliation = match storage {
            StorageOutcome::Fallback { .. } => Reconciliation::Skipped,
            StorageOutcome::Stored { .. } => {
                let result = match target {
                    Target::Finding(key) => self.append_to_finding(key, &url, &user_id).await,
                    Target::Audit(audit_id) => self.append_to_audit(audit_id, &url).await,
                    Target::General => {
                        self.register_file(&url, &file_type, &file_name, &user_id, &classification)
                            .await
                    }
                };
                result.unwrap_or_else(|e| {
                    tracing::error!(url = %url, error = %e, "Database reconciliation failed");
                    Reconciliation::Failed(e)
                })
            }
        };

        Ok(UploadOutcome {
            url,
            file_name,
            file_type,
            content_type,
            uploaded_at,
            classification,
            object_name,
            storage,
            reconciliation,
        })
    }

    async fn store_object(
        &self,
        key: &str,
        data: Bytes,
        content_type: &str,
        owner: &str,
    ) -> Result<String, String> {
        let store = self
            .object_store
            .as_ref()
            .ok_or_else(|| "object storage is not configured".to_string())?;

        store
            .put(key, data, content_type, owner)
            .await
            .map_err(|e| e.to_string())
    }

    fn records(&self) -> Result<&dyn RecordStore, ReconciliationError> {
        self.records
            .as_deref()
            .ok_or(ReconciliationError::Unavailable)
    }

    async fn append_to_finding(
        &self,
        key: FindingKey,
        url: &str,
        owner: &str,
    ) -> Result<Reconciliation, ReconciliationError> {
        let records = self.records()?;

        for attempt in 1..=MAX_APPEND_ATTEMPTS {
            let Some(finding) = records.find_finding(&key).await? else {
                let finding_id = records
                    .insert_finding(&NewFinding {
                        compliance_id: key.compliance_id,
                        audit_id: key.audit_id,
                        evidence: url.to_string(),
                        owner_user_id: owner.to_string(),
                        status_code: IN_REVIEW_STATUS.to_string(),
                    })
                    .await?;
                tracing::info!(
                    finding_id,
                    compliance_id = key.compliance_id,
                    audit_id = ?key.audit_id,
                    "Created finding with evidence"
                );
                return Ok(Reconciliation::Created { finding_id });
            };

            let evidence = append_evidence(&finding.evidence, url);
            if records
                .replace_finding_evidence(finding.id, &finding.evidence, &evidence.to_string())
                .await?
            {
                tracing::info!(
                    finding_id = finding.id,
                    entries = evidence.len(),
                    "Appended evidence to finding"
                );
                return Ok(Reconciliation::Appended {
                    target: EvidenceTarget::Finding(finding.id),
                    evidence,
                });
            }

            tracing::warn!(finding_id = finding.id, attempt, "Finding evidence changed concurrently");
        }

        Err(ReconciliationError::Conflict {
            attempts: MAX_APPEND_ATTEMPTS,
        })
    }

    async fn append_to_audit(
        &self,
        audit_id: i64,
        url: &str,
    ) -> Result<Reconciliation, ReconciliationError> {
        let records = self.records()?;

        for attempt in 1..=MAX_APPEND_ATTEMPTS {
            let Some(audit) = records.find_audit(audit_id).await? else {
                tracing::warn!(audit_id, "Audit record not found");
                return Ok(Reconciliation::AuditNotFound { audit_id });
            };

            let evidence = append_evidence(&audit.evidence, url);
            if records
                .replace_audit_evidence(audit_id, &audit.evidence, &evidence.to_string())
                .await?
            {
                tracing::info!(audit_id, entries = evidence.len(), "Appended evidence to audit");
                return Ok(Reconciliation::Appended {
                    target: EvidenceTarget::Audit(audit_id),
                    evidence,
                });
            }

            tracing::warn!(audit_id, attempt, "Audit evidence changed concurrently");
        }

        Err(ReconciliationError::Conflict {
            attempts: MAX_APPEND_ATTEMPTS,
        })
    }

    async fn register_file(
        &self,
        url: &str,
        file_type: &str,
        file_name: &str,
        owner: &str,
        classification: &Classification,
    ) -> Result<Reconciliation, ReconciliationError> {
        let stored = self
            .records()?
            .insert_file(&NewStoredFile {
                url: url.to_string(),
                file_type: file_type.to_string(),
                file_name: file_name.to_string(),
                owner_user_id: owner.to_string(),
                metadata: classification.clone(),
            })
            .await?;
        tracing::debug!(file_id = stored.id, "Registered file metadata");
        Ok(Reconciliation::Registered(stored))
    }
}

fn resolve_target(classification: &Classification) -> Result<Target, ValidationError> {
    match classification.document_kind() {
        DocumentKind::ComplianceEvidence => {
            let compliance_id = classification
                .get_non_empty(COMPLIANCE_ID)
                .ok_or(ValidationError::MissingComplianceId)
                .and_then(|raw| parse_id(COMPLIANCE_ID, raw))?;
            let audit_id = classification
                .get_non_empty(AUDIT_ID)
                .map(|raw| parse_id(AUDIT_ID, raw))
                .transpose()?;
            Ok(Target::Finding(FindingKey {
                compliance_id,
                audit_id,
            }))
        }
        DocumentKind::AuditEvidence => {
            let audit_id = classification
                .get_non_empty(AUDIT_ID)
                .ok_or(ValidationError::MissingAuditId)
                .and_then(|raw| parse_id(AUDIT_ID, raw))?;
            Ok(Target::Audit(audit_id))
        }
        DocumentKind::General => Ok(Target::General),
    }
}

fn parse_id(field: &'static str, raw: &str) -> Result<i64, ValidationError> {
    raw.parse().map_err(|_| ValidationError::InvalidIdentifier {
        field,
        value: raw.to_string(),
    })
}
