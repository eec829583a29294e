use grc_evidence::evidence::classification::Classification;
use grc_evidence::storage::{
    AuditRecord, Database, FindingKey, NewFinding, NewStoredFile, RecordStore, IN_REVIEW_STATUS,
};

fn test_db() -> (tempfile::TempDir, Database) {
    let dir = tempfile::tempdir().unwrap();
    let db = Database::open(dir.path().join("data")).unwrap();
    (dir, db)
}

fn new_finding(compliance_id: i64, audit_id: Option<i64>, evidence: &str) -> NewFinding {
    NewFinding {
        compliance_id,
        audit_id,
        evidence: evidence.to_string(),
        owner_user_id: "alice".to_string(),
        status_code: IN_REVIEW_STATUS.to_string(),
    }
}

fn new_file(owner: &str, name: &str, metadata: &[(&str, &str)]) -> NewStoredFile {
    NewStoredFile {
        url: format!("http://localhost:3001/api/objects/{name}"),
        file_type: "pdf".to_string(),
        file_name: name.to_string(),
        owner_user_id: owner.to_string(),
        metadata: metadata.iter().copied().collect::<Classification>(),
    }
}

#[test]
fn test_create_and_get_finding() {
    let (_dir, db) = test_db();

    let id = db.create_finding(&new_finding(12, Some(33), "u1")).unwrap();
    let finding = db.get_finding(id).unwrap().expect("finding should exist");

    assert_eq!(finding.id, id);
    assert_eq!(finding.compliance_id, 12);
    assert_eq!(finding.audit_id, Some(33));
    assert_eq!(finding.evidence, "u1");
    assert_eq!(finding.owner_user_id, "alice");
    assert_eq!(finding.status_code, "1");
}

#[test]
fn test_finding_ids_are_sequential() {
    let (_dir, db) = test_db();

    let a = db.create_finding(&new_finding(1, None, "")).unwrap();
    let b = db.create_finding(&new_finding(2, None, "")).unwrap();
    assert_eq!(a, 1);
    assert_eq!(b, 2);
}

#[test]
fn test_first_finding_prefers_lowest_id() {
    let (_dir, db) = test_db();

    let first = db.create_finding(&new_finding(12, Some(33), "a")).unwrap();
    let second = db.create_finding(&new_finding(12, Some(34), "b")).unwrap();
    db.create_finding(&new_finding(13, Some(33), "c")).unwrap();

    let by_compliance = db
        .first_finding(&FindingKey {
            compliance_id: 12,
            audit_id: None,
        })
        .unwrap()
        .unwrap();
    assert_eq!(by_compliance.id, first);

    let by_both = db
        .first_finding(&FindingKey {
            compliance_id: 12,
            audit_id: Some(34),
        })
        .unwrap()
        .unwrap();
    assert_eq!(by_both.id, second);

    let none = db
        .first_finding(&FindingKey {
            compliance_id: 12,
            audit_id: Some(99),
        })
        .unwrap();
    assert!(none.is_none());
}

#[test]
fn test_swap_finding_evidence_is_compare_and_swap() {
    let (_dir, db) = test_db();
    let id = db.create_finding(&new_finding(12, None, "urlA")).unwrap();

    assert!(db.swap_finding_evidence(id, "urlA", "urlA,urlB").unwrap());
    // Stale expectation is rejected and leaves the row untouched
    assert!(!db.swap_finding_evidence(id, "urlA", "urlA,urlC").unwrap());
    assert_eq!(db.get_finding(id).unwrap().unwrap().evidence, "urlA,urlB");

    // Unknown finding
    assert!(!db.swap_finding_evidence(999, "", "x").unwrap());
}

#[test]
fn test_audit_evidence_swap() {
    let (_dir, db) = test_db();

    assert!(db.get_audit(7).unwrap().is_none());
    assert!(!db.swap_audit_evidence(7, "", "u1").unwrap());

    db.put_audit(&AuditRecord {
        id: 7,
        evidence: String::new(),
    })
    .unwrap();
    assert!(db.swap_audit_evidence(7, "", "u1").unwrap());
    assert!(!db.swap_audit_evidence(7, "", "u2").unwrap());
    assert_eq!(db.get_audit(7).unwrap().unwrap().evidence, "u1");
}

#[test]
fn test_put_and_get_file() {
    let (_dir, db) = test_db();

    let stored = db
        .put_file(&new_file("alice", "policy.pdf", &[("category", "policy")]))
        .unwrap();
    let retrieved = db.get_file(stored.id).unwrap().expect("file should exist");

    assert_eq!(retrieved, stored);
    assert_eq!(retrieved.file_name, "policy.pdf");
    assert_eq!(retrieved.metadata.get("category"), Some("policy"));
}

#[test]
fn test_files_by_owner_newest_first() {
    let (_dir, db) = test_db();

    let a = db.put_file(&new_file("alice", "a.pdf", &[])).unwrap();
    let b = db.put_file(&new_file("alice", "b.pdf", &[])).unwrap();
    db.put_file(&new_file("bob", "c.pdf", &[])).unwrap();

    let files = db.get_files_by_owner("alice").unwrap();
    let ids: Vec<i64> = files.iter().map(|f| f.id).collect();
    assert_eq!(ids, vec![b.id, a.id]);

    assert!(db.get_files_by_owner("nobody").unwrap().is_empty());
}

#[test]
fn test_delete_file_cleans_owner_index() {
    let (_dir, db) = test_db();

    let a = db.put_file(&new_file("alice", "a.pdf", &[])).unwrap();
    let b = db.put_file(&new_file("alice", "b.pdf", &[])).unwrap();

    assert!(db.delete_file(a.id).unwrap());
    assert!(!db.delete_file(a.id).unwrap());
    assert!(db.get_file(a.id).unwrap().is_none());

    let remaining: Vec<i64> = db
        .get_files_by_owner("alice")
        .unwrap()
        .iter()
        .map(|f| f.id)
        .collect();
    assert_eq!(remaining, vec![b.id]);

    assert!(db.delete_file(b.id).unwrap());
    assert!(db.get_files_by_owner("alice").unwrap().is_empty());
}

#[test]
fn test_metadata_order_survives_storage() {
    let (_dir, db) = test_db();

    let stored = db
        .put_file(&new_file("alice", "a.pdf", &[("zeta", "1"), ("alpha", "2")]))
        .unwrap();
    let retrieved = db.get_file(stored.id).unwrap().unwrap();

    let pairs: Vec<_> = retrieved.metadata.iter().collect();
    assert_eq!(pairs, vec![("zeta", "1"), ("alpha", "2")]);
}

#[test]
fn test_reopen_keeps_data() {
    let dir = tempfile::tempdir().unwrap();
    let data_dir = dir.path().join("data");

    let id = {
        let db = Database::open(&data_dir).unwrap();
        db.create_finding(&new_finding(5, None, "u")).unwrap()
    };

    let db = Database::open(&data_dir).unwrap();
    assert_eq!(db.get_finding(id).unwrap().unwrap().evidence, "u");
    // Sequence continues after reopen
    assert_eq!(db.create_finding(&new_finding(5, None, "")).unwrap(), id + 1);
}

#[tokio::test]
async fn test_record_store_trait_on_redb() {
    let (_dir, db) = test_db();
    let store: &dyn RecordStore = &db;

    store.ping().await.unwrap();
    assert_eq!(store.backend_name(), "redb");

    let id = store
        .insert_finding(&new_finding(12, Some(33), "u1"))
        .await
        .unwrap();
    let found = store
        .find_finding(&FindingKey {
            compliance_id: 12,
            audit_id: Some(33),
        })
        .await
        .unwrap()
        .unwrap();
    assert_eq!(found.id, id);

    assert!(store.replace_finding_evidence(id, "u1", "u1,u2").await.unwrap());

    let file = store
        .insert_file(&new_file("alice", "a.pdf", &[]))
        .await
        .unwrap();
    assert_eq!(store.list_files("alice").await.unwrap().len(), 1);
    assert!(store.delete_file(file.id).await.unwrap());
    assert!(store.get_file(file.id).await.unwrap().is_none());
}
