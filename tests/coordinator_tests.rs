use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use grc_evidence::evidence::classification::Classification;
use grc_evidence::evidence::{
    EvidenceTarget, EvidenceUploadCoordinator, Reconciliation, ReconciliationError,
    StorageOutcome, UploadRequest, UploadedFile, ValidationError,
};
use grc_evidence::object_store::{key_from_url, LocalStore, ObjectStore, ObjectStoreError};
use grc_evidence::storage::{
    AuditRecord, Database, FindingKey, FindingRecord, NewFinding, NewStoredFile, RecordStore,
    RecordStoreError, StoredFile,
};

const MAX_UPLOAD: u64 = 1024 * 1024;

struct Harness {
    _dir: tempfile::TempDir,
    files_dir: std::path::PathBuf,
    db: Database,
    coordinator: EvidenceUploadCoordinator,
}

fn harness() -> Harness {
    let dir = tempfile::tempdir().unwrap();
    let files_dir = dir.path().join("files");
    let db = Database::open(dir.path().join("data")).unwrap();
    let store = LocalStore::new(&files_dir, "http://localhost:3001", b"secret").unwrap();

    let object_store: Arc<dyn ObjectStore> = Arc::new(store);
    let records: Arc<dyn RecordStore> = Arc::new(db.clone());
    let coordinator = EvidenceUploadCoordinator::new(Some(object_store), Some(records), MAX_UPLOAD);

    Harness {
        _dir: dir,
        files_dir,
        db,
        coordinator,
    }
}

fn request(name: &str, data: &str, params: &[(&str, &str)]) -> UploadRequest {
    UploadRequest {
        file: Some(UploadedFile {
            data: Bytes::from(data.to_string()),
            original_name: name.to_string(),
        }),
        file_name: None,
        user_id: "alice".to_string(),
        classification: params.iter().copied().collect::<Classification>(),
    }
}

fn evidence_request(name: &str, compliance_id: &str, audit_id: Option<&str>) -> UploadRequest {
    let mut params = vec![("documentType", "evidence"), ("compliance_id", compliance_id)];
    if let Some(audit_id) = audit_id {
        params.push(("audit_id", audit_id));
    }
    request(name, "evidence bytes", &params)
}

fn stored_objects(dir: &std::path::Path) -> usize {
    std::fs::read_dir(dir).map(|d| d.count()).unwrap_or(0)
}

fn finding_evidence(db: &Database, compliance_id: i64, audit_id: Option<i64>) -> Option<String> {
    db.first_finding(&FindingKey {
        compliance_id,
        audit_id,
    })
    .unwrap()
    .map(|f| f.evidence)
}

// ============================================================================
// Fakes
// ============================================================================

/// Object store whose every write fails as unreachable.
struct UnreachableStore;

#[async_trait]
impl ObjectStore for UnreachableStore {
    async fn put(&self, _: &str, _: Bytes, _: &str, _: &str) -> Result<String, ObjectStoreError> {
        Err(ObjectStoreError::Unreachable("connection refused".to_string()))
    }

    async fn get(&self, key: &str) -> Result<Bytes, ObjectStoreError> {
        Err(ObjectStoreError::NotFound(key.to_string()))
    }

    async fn delete(&self, _: &str) -> Result<(), ObjectStoreError> {
        Ok(())
    }

    async fn check(&self) -> Result<(), ObjectStoreError> {
        Err(ObjectStoreError::Unreachable("connection refused".to_string()))
    }

    fn signed_url(&self, _: &str, _: Duration, _: Option<&str>) -> Result<String, ObjectStoreError> {
        Err(ObjectStoreError::Unreachable("connection refused".to_string()))
    }

    fn backend_name(&self) -> &'static str {
        "unreachable"
    }
}

/// Record store that always finds a finding with evidence `urlA` and loses
/// the first `lost_swaps` compare-and-swaps, or fails every call outright.
struct ScriptedRecords {
    fail: bool,
    lost_swaps: u32,
    swaps: AtomicU32,
}

impl ScriptedRecords {
    fn losing_swaps(lost_swaps: u32) -> Self {
        Self {
            fail: false,
            lost_swaps,
            swaps: AtomicU32::new(0),
        }
    }

    fn losing_every_swap() -> Self {
        Self::losing_swaps(u32::MAX)
    }

    fn failing() -> Self {
        Self {
            fail: true,
            lost_swaps: 0,
            swaps: AtomicU32::new(0),
        }
    }

    fn check(&self) -> Result<(), RecordStoreError> {
        if self.fail {
            let e = serde_json::from_str::<u32>("not json").unwrap_err();
            return Err(RecordStoreError::Metadata(e));
        }
        Ok(())
    }
}

#[async_trait]
impl RecordStore for ScriptedRecords {
    async fn find_finding(&self, key: &FindingKey) -> Result<Option<FindingRecord>, RecordStoreError> {
        self.check()?;
        Ok(Some(FindingRecord {
            id: 1,
            compliance_id: key.compliance_id,
            audit_id: key.audit_id,
            evidence: "urlA".to_string(),
            owner_user_id: "bob".to_string(),
            status_code: "1".to_string(),
        }))
    }

    async fn insert_finding(&self, _: &NewFinding) -> Result<i64, RecordStoreError> {
        self.check()?;
        Ok(2)
    }

    async fn replace_finding_evidence(&self, _: i64, _: &str, _: &str) -> Result<bool, RecordStoreError> {
        self.check()?;
        let attempt = self.swaps.fetch_add(1, Ordering::SeqCst) + 1;
        Ok(attempt > self.lost_swaps)
    }

    async fn find_audit(&self, _: i64) -> Result<Option<AuditRecord>, RecordStoreError> {
        self.check()?;
        Ok(None)
    }

    async fn replace_audit_evidence(&self, _: i64, _: &str, _: &str) -> Result<bool, RecordStoreError> {
        self.check()?;
        Ok(false)
    }

    async fn insert_file(&self, _: &NewStoredFile) -> Result<StoredFile, RecordStoreError> {
        self.check()?;
        let e = serde_json::from_str::<u32>("unsupported").unwrap_err();
        Err(RecordStoreError::Metadata(e))
    }

    async fn get_file(&self, _: i64) -> Result<Option<StoredFile>, RecordStoreError> {
        self.check()?;
        Ok(None)
    }

    async fn list_files(&self, _: &str) -> Result<Vec<StoredFile>, RecordStoreError> {
        self.check()?;
        Ok(Vec::new())
    }

    async fn delete_file(&self, _: i64) -> Result<bool, RecordStoreError> {
        self.check()?;
        Ok(false)
    }

    async fn ping(&self) -> Result<(), RecordStoreError> {
        self.check()
    }

    fn backend_name(&self) -> &'static str {
        "scripted"
    }
}

fn coordinator_with_records(
    dir: &tempfile::TempDir,
    records: Arc<dyn RecordStore>,
) -> EvidenceUploadCoordinator {
    let store = LocalStore::new(dir.path().join("files"), "http://localhost:3001", b"s").unwrap();
    let object_store: Arc<dyn ObjectStore> = Arc::new(store);
    EvidenceUploadCoordinator::new(Some(object_store), Some(records), MAX_UPLOAD)
}

// ============================================================================
// Finding evidence
// ============================================================================

#[tokio::test]
async fn test_report_upload_creates_finding_with_url() {
    let h = harness();

    let outcome = h
        .coordinator
        .upload(evidence_request("report.pdf", "12", Some("33")))
        .await
        .unwrap();

    assert!(matches!(outcome.storage, StorageOutcome::Stored { .. }));
    assert!(outcome.object_name.contains("report.pdf"));
    assert!(outcome.object_name.contains("documentType-evidence"));
    assert!(outcome.object_name.contains("compliance_id-12"));
    assert!(outcome.object_name.contains("audit_id-33"));
    assert_eq!(outcome.file_type, "pdf");
    assert_eq!(outcome.content_type, "application/pdf");
    assert!(outcome.database_updated());
    assert!(outcome.warning().is_none());
    assert!(matches!(outcome.reconciliation, Reconciliation::Created { .. }));

    assert_eq!(key_from_url(&outcome.url).as_deref(), Some(outcome.object_name.as_str()));
    assert_eq!(finding_evidence(&h.db, 12, Some(33)), Some(outcome.url.clone()));
    assert_eq!(stored_objects(&h.files_dir), 1);
}

#[tokio::test]
async fn test_empty_evidence_becomes_url() {
    let h = harness();
    h.db
        .create_finding(&NewFinding {
            compliance_id: 12,
            audit_id: None,
            evidence: String::new(),
            owner_user_id: "bob".to_string(),
            status_code: "1".to_string(),
        })
        .unwrap();

    let outcome = h
        .coordinator
        .upload(evidence_request("a.pdf", "12", None))
        .await
        .unwrap();

    match outcome.reconciliation {
        Reconciliation::Appended {
            target: EvidenceTarget::Finding(_),
            ref evidence,
        } => assert_eq!(evidence.len(), 1),
        ref other => panic!("unexpected reconciliation: {other:?}"),
    }
    assert_eq!(finding_evidence(&h.db, 12, None), Some(outcome.url));
}

#[tokio::test]
async fn test_append_keeps_existing_entries_in_order() {
    let h = harness();
    h.db
        .create_finding(&NewFinding {
            compliance_id: 12,
            audit_id: None,
            evidence: "urlA".to_string(),
            owner_user_id: "bob".to_string(),
            status_code: "1".to_string(),
        })
        .unwrap();

    let outcome = h
        .coordinator
        .upload(evidence_request("b.pdf", "12", None))
        .await
        .unwrap();

    assert_eq!(
        finding_evidence(&h.db, 12, None),
        Some(format!("urlA,{}", outcome.url))
    );
}

#[tokio::test]
async fn test_second_upload_appends_to_created_finding() {
    let h = harness();

    let first = h
        .coordinator
        .upload(evidence_request("a.pdf", "12", Some("33")))
        .await
        .unwrap();
    let second = h
        .coordinator
        .upload(evidence_request("b.pdf", "12", Some("33")))
        .await
        .unwrap();

    assert!(matches!(second.reconciliation, Reconciliation::Appended { .. }));
    assert_eq!(
        finding_evidence(&h.db, 12, Some(33)),
        Some(format!("{},{}", first.url, second.url))
    );
    assert_eq!(h.db.get_findings_by_compliance(12).unwrap().len(), 1);
}

#[tokio::test]
async fn test_identical_uploads_both_append() {
    let h = harness();

    let first = h
        .coordinator
        .upload(evidence_request("report.pdf", "12", Some("33")))
        .await
        .unwrap();
    let second = h
        .coordinator
        .upload(evidence_request("report.pdf", "12", Some("33")))
        .await
        .unwrap();

    assert!(second.database_updated());
    let evidence = finding_evidence(&h.db, 12, Some(33)).unwrap();
    assert_eq!(evidence, format!("{},{}", first.url, second.url));
    assert_eq!(evidence.split(',').count(), 2);
}

#[tokio::test]
async fn test_long_non_ascii_name_is_stored() {
    let h = harness();
    let params = [
        ("documentType", "evidence"),
        ("compliance_id", "12"),
        ("audit_id", "33"),
        ("table_name", "audit_findings"),
        ("storage_column", "Evidence"),
    ];
    let name = "内部監査エビデンス資料_二〇二四年度_第三四半期_統制テスト結果.pdf";

    let outcome = h
        .coordinator
        .upload(request(name, "%PDF", &params))
        .await
        .unwrap();

    assert!(matches!(outcome.storage, StorageOutcome::Stored { .. }));
    assert!(outcome.database_updated());
    assert_eq!(finding_evidence(&h.db, 12, Some(33)), Some(outcome.url));
    assert_eq!(stored_objects(&h.files_dir), 1);
}

#[tokio::test]
async fn test_appends_to_lowest_id_match() {
    let h = harness();
    let finding = |evidence: &str| NewFinding {
        compliance_id: 12,
        audit_id: None,
        evidence: evidence.to_string(),
        owner_user_id: "bob".to_string(),
        status_code: "1".to_string(),
    };
    let first = h.db.create_finding(&finding("old")).unwrap();
    let second = h.db.create_finding(&finding("other")).unwrap();

    let outcome = h
        .coordinator
        .upload(evidence_request("c.pdf", "12", None))
        .await
        .unwrap();

    assert_eq!(
        h.db.get_finding(first).unwrap().unwrap().evidence,
        format!("old,{}", outcome.url)
    );
    assert_eq!(h.db.get_finding(second).unwrap().unwrap().evidence, "other");
}

#[tokio::test]
async fn test_missing_compliance_id_has_no_side_effects() {
    let h = harness();

    let err = h
        .coordinator
        .upload(request(
            "a.pdf",
            "data",
            &[("documentType", "evidence"), ("audit_id", "33")],
        ))
        .await
        .unwrap_err();

    assert_eq!(err, ValidationError::MissingComplianceId);
    assert_eq!(stored_objects(&h.files_dir), 0);
    assert!(h.db.get_findings_by_compliance(0).unwrap().is_empty());
    assert!(finding_evidence(&h.db, 33, None).is_none());
}

#[tokio::test]
async fn test_non_numeric_identifier_rejected() {
    let h = harness();

    let err = h
        .coordinator
        .upload(evidence_request("a.pdf", "twelve", None))
        .await
        .unwrap_err();

    assert!(matches!(
        err,
        ValidationError::InvalidIdentifier {
            field: "compliance_id",
            ..
        }
    ));
    assert_eq!(stored_objects(&h.files_dir), 0);
}

#[tokio::test]
async fn test_missing_file_and_too_large() {
    let h = harness();

    let mut no_file = evidence_request("a.pdf", "12", None);
    no_file.file = None;
    assert_eq!(
        h.coordinator.upload(no_file).await.unwrap_err(),
        ValidationError::MissingFile
    );

    let big = "x".repeat(MAX_UPLOAD as usize + 1);
    let err = h
        .coordinator
        .upload(request("big.bin", &big, &[]))
        .await
        .unwrap_err();
    assert_eq!(err, ValidationError::TooLarge { limit: MAX_UPLOAD });
    assert_eq!(stored_objects(&h.files_dir), 0);
}

#[tokio::test]
async fn test_file_name_override() {
    let h = harness();

    let mut req = request("scan.PDF", "data", &[("category", "policy")]);
    req.file_name = Some("Access Policy.pdf".to_string());
    let outcome = h.coordinator.upload(req).await.unwrap();

    assert_eq!(outcome.file_name, "Access Policy.pdf");
    assert_eq!(outcome.file_type, "pdf");
    assert!(outcome.object_name.contains("_Access Policy.pdf_category-policy"));
}

// ============================================================================
// Audit evidence
// ============================================================================

#[tokio::test]
async fn test_audit_evidence_appends() {
    let h = harness();
    h.db
        .put_audit(&AuditRecord {
            id: 7,
            evidence: String::new(),
        })
        .unwrap();
    let params = [("documentType", "audit_evidence"), ("audit_id", "7")];

    let first = h.coordinator.upload(request("a.pdf", "1", &params)).await.unwrap();
    let second = h.coordinator.upload(request("a.pdf", "1", &params)).await.unwrap();

    assert!(second.database_updated());
    assert_eq!(
        h.db.get_audit(7).unwrap().unwrap().evidence,
        format!("{},{}", first.url, second.url)
    );
}

#[tokio::test]
async fn test_audit_not_found_creates_nothing() {
    let h = harness();

    let outcome = h
        .coordinator
        .upload(request(
            "a.pdf",
            "data",
            &[("documentType", "audit_evidence"), ("audit_id", "7")],
        ))
        .await
        .unwrap();

    assert!(matches!(
        outcome.reconciliation,
        Reconciliation::AuditNotFound { audit_id: 7 }
    ));
    assert!(!outcome.database_updated());
    assert!(outcome.warning().unwrap().contains("audit 7 was not found"));
    assert!(h.db.get_audit(7).unwrap().is_none());
    // The object itself was still stored
    assert_eq!(stored_objects(&h.files_dir), 1);
}

// ============================================================================
// Generic uploads
// ============================================================================

#[tokio::test]
async fn test_generic_upload_registers_file() {
    let h = harness();

    let outcome = h
        .coordinator
        .upload(request("notes.txt", "hello", &[("category", "policy")]))
        .await
        .unwrap();

    let stored = match outcome.reconciliation {
        Reconciliation::Registered(ref stored) => stored.clone(),
        ref other => panic!("unexpected reconciliation: {other:?}"),
    };
    assert_eq!(outcome.file_id(), stored.id.to_string());
    assert_eq!(stored.url, outcome.url);
    assert_eq!(stored.file_type, "txt");
    assert_eq!(stored.metadata.get("category"), Some("policy"));

    let listed = h.db.get_files_by_owner("alice").unwrap();
    assert_eq!(listed.len(), 1);
    assert_eq!(listed[0].id, stored.id);
}

// ============================================================================
// Degraded modes
// ============================================================================

#[tokio::test]
async fn test_unreachable_storage_returns_fallback_url() {
    let dir = tempfile::tempdir().unwrap();
    let db = Database::open(dir.path().join("data")).unwrap();
    let object_store: Arc<dyn ObjectStore> = Arc::new(UnreachableStore);
    let records: Arc<dyn RecordStore> = Arc::new(db.clone());
    let coordinator = EvidenceUploadCoordinator::new(Some(object_store), Some(records), MAX_UPLOAD);

    let outcome = coordinator
        .upload(evidence_request("report.pdf", "12", None))
        .await
        .unwrap();

    assert!(outcome.url.starts_with("https://s3-fallback-storage/"));
    assert!(outcome.url.ends_with("_report.pdf"));
    assert_eq!(
        outcome.file_id(),
        outcome.url.trim_start_matches("https://s3-fallback-storage/")
    );
    assert!(matches!(outcome.storage, StorageOutcome::Fallback { .. }));
    assert!(matches!(outcome.reconciliation, Reconciliation::Skipped));
    assert!(!outcome.database_updated());
    assert!(outcome.warning().unwrap().contains("connection refused"));
    assert!(finding_evidence(&db, 12, None).is_none());
}

#[tokio::test]
async fn test_no_object_store_returns_fallback_url() {
    let coordinator = EvidenceUploadCoordinator::new(None, None, MAX_UPLOAD);

    let outcome = coordinator
        .upload(request("notes.txt", "hello", &[]))
        .await
        .unwrap();

    assert!(outcome.url.starts_with("https://s3-fallback-storage/"));
    assert!(outcome
        .warning()
        .unwrap()
        .contains("object storage is not configured"));
}

#[tokio::test]
async fn test_missing_database_is_a_warning() {
    let dir = tempfile::tempdir().unwrap();
    let store = LocalStore::new(dir.path(), "http://localhost:3001", b"s").unwrap();
    let object_store: Arc<dyn ObjectStore> = Arc::new(store);
    let coordinator = EvidenceUploadCoordinator::new(Some(object_store), None, MAX_UPLOAD);

    let outcome = coordinator
        .upload(evidence_request("a.pdf", "12", None))
        .await
        .unwrap();

    assert!(outcome.url.starts_with("http://localhost:3001/api/objects/"));
    assert!(matches!(
        outcome.reconciliation,
        Reconciliation::Failed(ReconciliationError::Unavailable)
    ));
    assert!(!outcome.database_updated());
    assert!(outcome
        .warning()
        .unwrap()
        .starts_with("File uploaded but database update failed"));
}

#[tokio::test]
async fn test_database_error_is_a_warning() {
    let dir = tempfile::tempdir().unwrap();
    let coordinator = coordinator_with_records(&dir, Arc::new(ScriptedRecords::failing()));

    let outcome = coordinator
        .upload(evidence_request("a.pdf", "12", None))
        .await
        .unwrap();

    assert!(matches!(
        outcome.reconciliation,
        Reconciliation::Failed(ReconciliationError::Store(_))
    ));
    assert!(!outcome.database_updated());
    assert!(outcome.warning().is_some());
}

#[tokio::test]
async fn test_lost_swap_is_retried() {
    let dir = tempfile::tempdir().unwrap();
    let records = Arc::new(ScriptedRecords::losing_swaps(1));
    let coordinator = coordinator_with_records(&dir, records.clone());

    let outcome = coordinator
        .upload(evidence_request("a.pdf", "12", None))
        .await
        .unwrap();

    match outcome.reconciliation {
        Reconciliation::Appended {
            target: EvidenceTarget::Finding(1),
            ref evidence,
        } => assert_eq!(evidence.to_string(), format!("urlA,{}", outcome.url)),
        ref other => panic!("unexpected reconciliation: {other:?}"),
    }
    assert_eq!(records.swaps.load(Ordering::SeqCst), 2);
    assert!(outcome.database_updated());
    assert!(outcome.warning().is_none());
}

#[tokio::test]
async fn test_repeated_swap_conflicts_give_up() {
    let dir = tempfile::tempdir().unwrap();
    let records = Arc::new(ScriptedRecords::losing_every_swap());
    let coordinator = coordinator_with_records(&dir, records.clone());

    let outcome = coordinator
        .upload(evidence_request("a.pdf", "12", None))
        .await
        .unwrap();

    assert!(matches!(
        outcome.reconciliation,
        Reconciliation::Failed(ReconciliationError::Conflict { attempts: 3 })
    ));
    assert_eq!(records.swaps.load(Ordering::SeqCst), 3);
    assert!(outcome.warning().unwrap().contains("modified concurrently"));
}
