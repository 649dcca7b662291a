//! Module directory handles

use super::{dedupe, HandleStore};
use crate::capability::CapabilityHandle;
use crate::error::{Result, SyncError};
use crate::storage::libsql::from_millis;
use crate::storage::{BoundedStore, HandleTable};
use crate::types::ModuleType;
use chrono::{DateTime, Utc};
use libsql::params;
use serde::{Deserialize, Serialize};
use tracing::debug;

/// Module context stored alongside a directory handle
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DirectoryMeta {
    pub directory_name: String,
    pub module_name: String,
    pub portal_hostname: String,
    pub module_type: ModuleType,
}

/// Stored reference to one cloned module directory
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DirectoryHandleRecord {
    pub id: String,
    pub handle: CapabilityHandle,
    pub directory_name: String,
    pub module_name: String,
    pub portal_hostname: String,
    pub module_type: ModuleType,
    pub last_accessed: DateTime<Utc>,
}

const SELECT_DIRECTORY: &str = "SELECT id, handle, directory_name, module_name, portal_hostname, module_type, last_accessed FROM directory_handles";

impl HandleStore {
    /// Save a module directory handle, reusing the record of the same directory
    pub async fn save_directory(
        &self,
        id: &str,
        handle: &CapabilityHandle,
        meta: &DirectoryMeta,
    ) -> Result<String> {
        if !handle.is_directory() {
            return Err(SyncError::StorageFailure(format!(
                "'{}' is not a directory handle",
                handle.name
            )));
        }

        let canonical = dedupe::canonical_id(
            &self.store,
            self.host.as_ref(),
            HandleTable::Directories,
            id,
            handle,
        )
        .await?;

        let stamp = self.store.stamp();
        self.store
            .conn()
            .await
            .execute(
                r#"
                INSERT INTO directory_handles (
                    id, handle, directory_name, module_name, portal_hostname, module_type, last_accessed
                ) VALUES (?, ?, ?, ?, ?, ?, ?)
                ON CONFLICT(id) DO UPDATE SET
                    handle = excluded.handle,
                    directory_name = excluded.directory_name,
                    module_name = excluded.module_name,
                    portal_hostname = excluded.portal_hostname,
                    module_type = excluded.module_type,
                    last_accessed = excluded.last_accessed
                "#,
                params![
                    canonical.clone(),
                    serde_json::to_string(handle)?,
                    meta.directory_name.clone(),
                    meta.module_name.clone(),
                    meta.portal_hostname.clone(),
                    meta.module_type.as_str(),
                    stamp
                ],
            )
            .await?;

        debug!(
            "Saved directory handle {} for {}/{}",
            canonical, meta.portal_hostname, meta.module_name
        );
        Ok(canonical)
    }

    pub async fn get_directory(&self, id: &str) -> Result<Option<CapabilityHandle>> {
        Ok(self.get_directory_record(id).await?.map(|r| r.handle))
    }

    pub async fn get_directory_record(&self, id: &str) -> Result<Option<DirectoryHandleRecord>> {
        let sql = format!("{} WHERE id = ?", SELECT_DIRECTORY);
        let conn = self.store.conn().await;
        let mut rows = conn.query(&sql, params![id]).await?;
        match rows.next().await? {
            Some(row) => Ok(Some(row_to_directory(&row)?)),
            None => Ok(None),
        }
    }

    pub async fn touch_directory(&self, id: &str) -> Result<bool> {
        self.store.touch(HandleTable::Directories, id).await
    }

    /// Forget a module directory and the bindings of the scripts inside it
    pub async fn delete_directory(&self, id: &str) -> Result<bool> {
        let removed = self.store.delete(HandleTable::Directories, id).await?;
        if removed {
            self.store
                .conn()
                .await
                .execute(
                    "DELETE FROM module_bindings WHERE directory_id = ?",
                    params![id],
                )
                .await?;
        }
        Ok(removed)
    }

    /// Most recently accessed module directories first; schedules a sweep afterwards
    pub async fn list_directories_recent_descending(
        &self,
        limit: usize,
    ) -> Result<Vec<DirectoryHandleRecord>> {
        let sql = format!("{} ORDER BY last_accessed DESC", SELECT_DIRECTORY);
        let mut records = Vec::new();
        {
            let conn = self.store.conn().await;
            let mut rows = conn.query(&sql, params![]).await?;
            while let Some(row) = rows.next().await? {
                if records.len() < limit {
                    records.push(row_to_directory(&row)?);
                }
            }
        }

        self.retention.trigger(BoundedStore::DirectoryHandles).await;
        Ok(records)
    }
}

fn row_to_directory(row: &libsql::Row) -> Result<DirectoryHandleRecord> {
    let handle: String = row.get(1)?;
    let module_type: String = row.get(5)?;
    Ok(DirectoryHandleRecord {
        id: row.get(0)?,
        handle: serde_json::from_str(&handle)?,
        directory_name: row.get(2)?,
        module_name: row.get(3)?,
        portal_hostname: row.get(4)?,
        module_type: module_type
            .parse::<ModuleType>()
            .map_err(SyncError::StorageFailure)?,
        last_accessed: from_millis(row.get(6)?),
    })
}
