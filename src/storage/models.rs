use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::evidence::classification::Classification;

/// Status code given to findings created by an evidence upload ("in review").
pub const IN_REVIEW_STATUS: &str = "1";

/// Lookup key for a compliance finding.
///
/// Without an audit id every finding for the compliance id is a candidate;
/// the lowest id wins.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FindingKey {
    pub compliance_id: i64,
    pub audit_id: Option<i64>,
}

impl FindingKey {
    pub fn matches(&self, finding: &FindingRecord) -> bool {
        finding.compliance_id == self.compliance_id
            && self
                .audit_id
                .map_or(true, |audit_id| finding.audit_id == Some(audit_id))
    }
}

/// A compliance finding row (`audit_findings`).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FindingRecord {
    pub id: i64,
    pub compliance_id: i64,
    #[serde(default)]
    pub audit_id: Option<i64>,
    /// Comma-joined URL list.
    #[serde(default)]
    pub evidence: String,
    pub owner_user_id: String,
    pub status_code: String,
}

#[derive(Debug, Clone)]
pub struct NewFinding {
    pub compliance_id: i64,
    pub audit_id: Option<i64>,
    pub evidence: String,
    pub owner_user_id: String,
    pub status_code: String,
}

/// An audit row (`audit`). Only the evidence field is managed here.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuditRecord {
    pub id: i64,
    #[serde(default)]
    pub evidence: String,
}

/// Metadata row for a generic (non-evidence) upload (`s3_files`).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StoredFile {
    pub id: i64,
    pub url: String,
    pub file_type: String,
    pub file_name: String,
    #[serde(rename = "user_id")]
    pub owner_user_id: String,
    #[serde(default)]
    pub metadata: Classification,
    pub uploaded_at: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub struct NewStoredFile {
    pub url: String,
    pub file_type: String,
    pub file_name: String,
    pub owner_user_id: String,
    pub metadata: Classification,
}
