//! Persistent capability references to local files and directories
//!
//! [`HandleStore`] keeps one record per underlying entity. Saving a handle
//! that the host reports as the same entity as a stored one updates the
//! stored record in place instead of adding a second one.

pub(crate) mod dedupe;
mod directory;

use crate::capability::{CapabilityHandle, CapabilityHost};
use crate::error::Result;
use crate::retention::RetentionPolicy;
use crate::storage::libsql::from_millis;
use crate::storage::{BoundedStore, HandleTable, SyncStore};
use chrono::{DateTime, Utc};
use libsql::params;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::debug;

pub use directory::{DirectoryHandleRecord, DirectoryMeta};

/// Stored reference to one local file
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HandleRecord {
    pub id: String,
    pub handle: CapabilityHandle,
    pub display_name: String,
    pub last_accessed: DateTime<Utc>,
}

/// Store of file and module-directory handles
#[derive(Clone)]
pub struct HandleStore {
    store: Arc<SyncStore>,
    host: Arc<dyn CapabilityHost>,
    retention: RetentionPolicy,
}

impl HandleStore {
    pub fn new(
        store: Arc<SyncStore>,
        host: Arc<dyn CapabilityHost>,
        retention: RetentionPolicy,
    ) -> Self {
        Self {
            store,
            host,
            retention,
        }
    }

    /// Save a file handle, returning the id it is stored under
    ///
    /// If a stored handle refers to the same file, that record's id is returned
    /// and only its metadata is overwritten.
    pub async fn save(&self, id: &str, handle: &CapabilityHandle, display_name: &str) -> Result<String> {
        let canonical =
            dedupe::canonical_id(&self.store, self.host.as_ref(), HandleTable::Files, id, handle)
                .await?;

        let stamp = self.store.stamp();
        self.store
            .conn()
            .await
            .execute(
                r#"
                INSERT INTO file_handles (id, handle, display_name, last_accessed)
                VALUES (?, ?, ?, ?)
                ON CONFLICT(id) DO UPDATE SET
                    handle = excluded.handle,
                    display_name = excluded.display_name,
                    last_accessed = excluded.last_accessed
                "#,
                params![
                    canonical.clone(),
                    serde_json::to_string(handle)?,
                    display_name,
                    stamp
                ],
            )
            .await?;

        debug!("Saved file handle {} ({})", canonical, display_name);
        Ok(canonical)
    }

    /// Save under a fresh id unless the file is already tracked
    pub async fn save_new(&self, handle: &CapabilityHandle, display_name: &str) -> Result<String> {
        self.save(&crate::types::new_record_id(), handle, display_name)
            .await
    }

    pub async fn get(&self, id: &str) -> Result<Option<CapabilityHandle>> {
        Ok(self.get_record(id).await?.map(|record| record.handle))
    }

    pub async fn get_record(&self, id: &str) -> Result<Option<HandleRecord>> {
        let conn = self.store.conn().await;
        let mut rows = conn
            .query(
                "SELECT id, handle, display_name, last_accessed FROM file_handles WHERE id = ?",
                params![id],
            )
            .await?;

        match rows.next().await? {
            Some(row) => Ok(Some(row_to_record(&row)?)),
            None => Ok(None),
        }
    }

    /// Mark a file as just accessed
    pub async fn touch(&self, id: &str) -> Result<bool> {
        self.store.touch(HandleTable::Files, id).await
    }

    pub async fn delete(&self, id: &str) -> Result<bool> {
        let removed = self.store.delete(HandleTable::Files, id).await?;
        if removed {
            self.store
                .conn()
                .await
                .execute("DELETE FROM module_bindings WHERE file_id = ?", params![id])
                .await?;
        }
        Ok(removed)
    }

    /// Most recently accessed file handles first
    ///
    /// Once the walk over the table is exhausted a retention sweep is
    /// scheduled; its outcome never affects this call.
    pub async fn list_recent_descending(&self, limit: usize) -> Result<Vec<HandleRecord>> {
        let mut records = Vec::new();
        {
            let conn = self.store.conn().await;
            let mut rows = conn
                .query(
                    "SELECT id, handle, display_name, last_accessed FROM file_handles ORDER BY last_accessed DESC",
                    params![],
                )
                .await?;
            while let Some(row) = rows.next().await? {
                if records.len() < limit {
                    records.push(row_to_record(&row)?);
                }
            }
        }

        self.retention.trigger(BoundedStore::FileHandles).await;
        Ok(records)
    }

    pub(crate) fn host(&self) -> &Arc<dyn CapabilityHost> {
        &self.host
    }
}

fn row_to_record(row: &libsql::Row) -> Result<HandleRecord> {
    let handle: String = row.get(1)?;
    Ok(HandleRecord {
        id: row.get(0)?,
        handle: serde_json::from_str(&handle)?,
        display_name: row.get(2)?,
        last_accessed: from_millis(row.get(3)?),
    })
}
