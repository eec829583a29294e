use redb::ReadableTable;

use super::db::{decode, next_id, Database, DatabaseError};
use super::models::{FindingKey, FindingRecord, NewFinding};
use super::tables::*;

impl Database {
    // ========================================================================
    // Finding operations
    // ========================================================================

    /// Insert a finding and add it to the compliance index. Returns the new id.
    pub fn create_finding(&self, finding: &NewFinding) -> Result<i64, DatabaseError> {
        let write_txn = self.begin_write()?;
        let id = next_id(&write_txn, "findings")?;
        {
            let record = FindingRecord {
                id,
                compliance_id: finding.compliance_id,
                audit_id: finding.audit_id,
                evidence: finding.evidence.clone(),
                owner_user_id: finding.owner_user_id.clone(),
                status_code: finding.status_code.clone(),
            };
            let mut table = write_txn.open_table(FINDINGS)?;
            let data = rmp_serde::to_vec_named(&record)?;
            table.insert(id, data.as_slice())?;

            let mut index = write_txn.open_table(COMPLIANCE_FINDINGS)?;
            let mut finding_ids: Vec<i64> = match index.get(finding.compliance_id)? {
                Some(v) => decode(v.value())?,
                None => Vec::new(),
            };
            finding_ids.push(id);
            let index_data = rmp_serde::to_vec_named(&finding_ids)?;
            index.insert(finding.compliance_id, index_data.as_slice())?;
        }
        write_txn.commit()?;
        Ok(id)
    }

    pub fn get_finding(&self, finding_id: i64) -> Result<Option<FindingRecord>, DatabaseError> {
        let read_txn = self.begin_read()?;
        let table = read_txn.open_table(FINDINGS)?;

        match table.get(finding_id)? {
            Some(data) => Ok(Some(decode(data.value())?)),
            None => Ok(None),
        }
    }

    /// All findings for a compliance id, ascending by id.
    pub fn get_findings_by_compliance(
        &self,
        compliance_id: i64,
    ) -> Result<Vec<FindingRecord>, DatabaseError> {
        let read_txn = self.begin_read()?;
        let index = read_txn.open_table(COMPLIANCE_FINDINGS)?;
        let table = read_txn.open_table(FINDINGS)?;

        let mut finding_ids: Vec<i64> = match index.get(compliance_id)? {
            Some(data) => decode(data.value())?,
            None => return Ok(Vec::new()),
        };
        finding_ids.sort_unstable();

        let mut findings = Vec::with_capacity(finding_ids.len());
        for finding_id in finding_ids {
            if let Some(data) = table.get(finding_id)? {
                findings.push(decode(data.value())?);
            }
        }
        Ok(findings)
    }

    /// The reconciliation target for `key`: the lowest-id matching finding.
    pub fn first_finding(&self, key: &FindingKey) -> Result<Option<FindingRecord>, DatabaseError> {
        Ok(self
            .get_findings_by_compliance(key.compliance_id)?
            .into_iter()
            .find(|finding| key.matches(finding)))
    }

    /// Replace a finding's evidence only if it still equals `expected`.
    pub fn swap_finding_evidence(
        &self,
        finding_id: i64,
        expected: &str,
        evidence: &str,
    ) -> Result<bool, DatabaseError> {
        let write_txn = self.begin_write()?;
        let swapped = {
            let mut table = write_txn.open_table(FINDINGS)?;
            let current: Option<FindingRecord> = match table.get(finding_id)? {
                Some(data) => Some(decode(data.value())?),
                None => None,
            };

            match current {
                Some(mut finding) if finding.evidence == expected => {
                    finding.evidence = evidence.to_string();
                    let data = rmp_serde::to_vec_named(&finding)?;
                    table.insert(finding_id, data.as_slice())?;
                    true
                }
                _ => false,
            }
        };
        write_txn.commit()?;
        Ok(swapped)
    }
}
