use redb::TableDefinition;

/// Findings: finding id -> FindingRecord (msgpack)
pub const FINDINGS: TableDefinition<i64, &[u8]> = TableDefinition::new("findings");

/// Compliance index: compliance id -> msgpack Vec of finding ids, ascending
pub const COMPLIANCE_FINDINGS: TableDefinition<i64, &[u8]> =
    TableDefinition::new("compliance_findings");

/// Audits: audit id -> AuditRecord (msgpack)
pub const AUDITS: TableDefinition<i64, &[u8]> = TableDefinition::new("audits");

/// Generic file metadata: file id -> StoredFile (msgpack)
pub const FILES: TableDefinition<i64, &[u8]> = TableDefinition::new("files");

/// Owner index: user id -> msgpack Vec of file ids
pub const USER_FILES: TableDefinition<&str, &[u8]> = TableDefinition::new("user_files");

/// Id sequences: table name -> last issued id
pub const SEQUENCES: TableDefinition<&str, u64> = TableDefinition::new("sequences");
