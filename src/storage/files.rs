use redb::{ReadableTable, WriteTransaction};

use super::db::{decode, next_id, Database, DatabaseError};
use super::models::{NewStoredFile, StoredFile};
use super::tables::*;

impl Database {
    // ========================================================================
    // File metadata operations
    // ========================================================================

    /// Store generic file metadata and update the owner index
    pub fn put_file(&self, file: &NewStoredFile) -> Result<StoredFile, DatabaseError> {
        let write_txn = self.begin_write()?;
        let id = next_id(&write_txn, "files")?;
        let record = StoredFile {
            id,
            url: file.url.clone(),
            file_type: file.file_type.clone(),
            file_name: file.file_name.clone(),
            owner_user_id: file.owner_user_id.clone(),
            metadata: file.metadata.clone(),
            uploaded_at: chrono::Utc::now(),
        };
        {
            let mut table = write_txn.open_table(FILES)?;
            let data = rmp_serde::to_vec_named(&record)?;
            table.insert(id, data.as_slice())?;

            let mut owner_table = write_txn.open_table(USER_FILES)?;
            let mut file_ids: Vec<i64> = match owner_table.get(record.owner_user_id.as_str())? {
                Some(v) => decode(v.value())?,
                None => Vec::new(),
            };
            file_ids.push(id);
            let index_data = rmp_serde::to_vec_named(&file_ids)?;
            owner_table.insert(record.owner_user_id.as_str(), index_data.as_slice())?;
        }
        write_txn.commit()?;
        Ok(record)
    }

    pub fn get_file(&self, id: i64) -> Result<Option<StoredFile>, DatabaseError> {
        let read_txn = self.begin_read()?;
        let table = read_txn.open_table(FILES)?;

        match table.get(id)? {
            Some(data) => Ok(Some(decode(data.value())?)),
            None => Ok(None),
        }
    }

    /// All files owned by `user_id`, newest first
    pub fn get_files_by_owner(&self, user_id: &str) -> Result<Vec<StoredFile>, DatabaseError> {
        let read_txn = self.begin_read()?;
        let owner_table = read_txn.open_table(USER_FILES)?;
        let files_table = read_txn.open_table(FILES)?;

        let file_ids: Vec<i64> = match owner_table.get(user_id)? {
            Some(data) => decode(data.value())?,
            None => return Ok(Vec::new()),
        };

        let mut files: Vec<StoredFile> = Vec::with_capacity(file_ids.len());
        for file_id in file_ids {
            if let Some(data) = files_table.get(file_id)? {
                files.push(decode(data.value())?);
            }
        }
        files.sort_by(|a, b| b.uploaded_at.cmp(&a.uploaded_at).then(b.id.cmp(&a.id)));

        Ok(files)
    }

    /// Delete file metadata and clean up the owner index
    pub fn delete_file(&self, id: i64) -> Result<bool, DatabaseError> {
        let write_txn = self.begin_write()?;

        let owner: Option<String> = {
            let table = write_txn.open_table(FILES)?;
            let result = match table.get(id)? {
                Some(data) => {
                    let file: StoredFile = decode(data.value())?;
                    Some(file.owner_user_id)
                }
                None => None,
            };
            result
        };

        let deleted = match owner {
            Some(owner) => {
                {
                    let mut table = write_txn.open_table(FILES)?;
                    table.remove(id)?;
                }
                remove_from_owner_index(&write_txn, &owner, id)?;
                true
            }
            None => false,
        };

        write_txn.commit()?;
        Ok(deleted)
    }
}

fn remove_from_owner_index(
    write_txn: &WriteTransaction,
    owner: &str,
    id: i64,
) -> Result<(), DatabaseError> {
    let file_ids: Option<Vec<i64>> = {
        let owner_table = write_txn.open_table(USER_FILES)?;
        let result = match owner_table.get(owner)? {
            Some(data) => Some(decode(data.value())?),
            None => None,
        };
        result
    };

    if let Some(mut ids) = file_ids {
        ids.retain(|fid| *fid != id);
        let mut owner_table = write_txn.open_table(USER_FILES)?;
        if ids.is_empty() {
            owner_table.remove(owner)?;
        } else {
            let data = rmp_serde::to_vec_named(&ids)?;
            owner_table.insert(owner, data.as_slice())?;
        }
    }
    Ok(())
}
