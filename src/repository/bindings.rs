//! File → module bindings
//!
//! A binding ties one stored file handle to the module directory it was
//! cloned into, so reopening the file restores its module context.

use crate::error::{Result, SyncError};
use crate::storage::libsql::{finish_transaction, from_millis};
use crate::storage::SyncStore;
use crate::types::ScriptType;
use chrono::{DateTime, Utc};
use libsql::params;
use serde::{Deserialize, Serialize};

/// Stored binding of one script file to its module directory
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ModuleBinding {
    pub file_id: String,
    pub directory_id: String,
    pub repository_id: String,
    pub script_type: ScriptType,
    /// Repository-relative module path, e.g. `host/datasources/My DS/`
    pub module_path: String,
    pub created_at: DateTime<Utc>,
}

const SELECT_BINDING: &str =
    "SELECT file_id, directory_id, repository_id, script_type, module_path, created_at FROM module_bindings";

/// Record all bindings of one clone atomically
///
/// A directory holds at most one file per script type, so any binding the new
/// set displaces (same directory and script type, different file) is dropped.
pub(crate) async fn record(store: &SyncStore, bindings: &[ModuleBinding]) -> Result<()> {
    if bindings.is_empty() {
        return Ok(());
    }

    let conn = store.conn().await;
    let tx = conn.transaction().await?;
    let result = write_bindings(&tx, bindings).await;
    finish_transaction(tx, result, "record module bindings").await
}

async fn write_bindings(tx: &libsql::Transaction, bindings: &[ModuleBinding]) -> Result<()> {
    for binding in bindings {
        tx.execute(
            "DELETE FROM module_bindings WHERE directory_id = ? AND script_type = ? AND file_id != ?",
            params![
                binding.directory_id.clone(),
                binding.script_type.as_str(),
                binding.file_id.clone()
            ],
        )
        .await?;

        tx.execute(
            r#"
            INSERT INTO module_bindings (
                file_id, directory_id, repository_id, script_type, module_path, created_at
            ) VALUES (?, ?, ?, ?, ?, ?)
            ON CONFLICT(file_id) DO UPDATE SET
                directory_id = excluded.directory_id,
                repository_id = excluded.repository_id,
                script_type = excluded.script_type,
                module_path = excluded.module_path,
                created_at = excluded.created_at
            "#,
            params![
                binding.file_id.clone(),
                binding.directory_id.clone(),
                binding.repository_id.clone(),
                binding.script_type.as_str(),
                binding.module_path.clone(),
                binding.created_at.timestamp_millis()
            ],
        )
        .await?;
    }
    Ok(())
}

pub(crate) async fn get(store: &SyncStore, file_id: &str) -> Result<Option<ModuleBinding>> {
    let sql = format!("{} WHERE file_id = ?", SELECT_BINDING);
    let conn = store.conn().await;
    let mut rows = conn.query(&sql, params![file_id]).await?;
    match rows.next().await? {
        Some(row) => Ok(Some(row_to_binding(&row)?)),
        None => Ok(None),
    }
}

pub(crate) async fn for_directory(store: &SyncStore, directory_id: &str) -> Result<Vec<ModuleBinding>> {
    let sql = format!("{} WHERE directory_id = ? ORDER BY script_type", SELECT_BINDING);
    let conn = store.conn().await;
    let mut rows = conn.query(&sql, params![directory_id]).await?;

    let mut bindings = Vec::new();
    while let Some(row) = rows.next().await? {
        bindings.push(row_to_binding(&row)?);
    }
    Ok(bindings)
}

/// Drop the binding of one script type in a directory
pub(crate) async fn remove_script(
    store: &SyncStore,
    directory_id: &str,
    script: ScriptType,
) -> Result<bool> {
    let removed = store
        .conn()
        .await
        .execute(
            "DELETE FROM module_bindings WHERE directory_id = ? AND script_type = ?",
            params![directory_id, script.as_str()],
        )
        .await?;
    Ok(removed > 0)
}

pub(crate) async fn remove_repository(store: &SyncStore, repository_id: &str) -> Result<u64> {
    Ok(store
        .conn()
        .await
        .execute(
            "DELETE FROM module_bindings WHERE repository_id = ?",
            params![repository_id],
        )
        .await?)
}

fn row_to_binding(row: &libsql::Row) -> Result<ModuleBinding> {
    let script_type: String = row.get(3)?;
    Ok(ModuleBinding {
        file_id: row.get(0)?,
        directory_id: row.get(1)?,
        repository_id: row.get(2)?,
        script_type: script_type
            .parse::<ScriptType>()
            .map_err(SyncError::StorageFailure)?,
        module_path: row.get(4)?,
        created_at: from_millis(row.get(5)?),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::test_utils::create_test_store;

    fn binding(file_id: &str, directory_id: &str, script_type: ScriptType) -> ModuleBinding {
        ModuleBinding {
            file_id: file_id.to_string(),
            directory_id: directory_id.to_string(),
            repository_id: "repo-1".to_string(),
            script_type,
            module_path: "acme/datasources/CPU/".to_string(),
            created_at: Utc::now(),
        }
    }

    #[tokio::test]
    async fn test_record_and_get() {
        let store = create_test_store().await.unwrap();
        record(
            &store,
            &[
                binding("f-collection", "d-1", ScriptType::Collection),
                binding("f-ad", "d-1", ScriptType::Ad),
            ],
        )
        .await
        .unwrap();

        let found = get(&store, "f-ad").await.unwrap().unwrap();
        assert_eq!(found.script_type, ScriptType::Ad);
        assert_eq!(for_directory(&store, "d-1").await.unwrap().len(), 2);
        assert!(get(&store, "missing").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_new_file_displaces_old_binding_for_same_script() {
        let store = create_test_store().await.unwrap();
        record(&store, &[binding("f-old", "d-1", ScriptType::Collection)])
            .await
            .unwrap();
        record(&store, &[binding("f-new", "d-1", ScriptType::Collection)])
            .await
            .unwrap();

        assert!(get(&store, "f-old").await.unwrap().is_none());
        assert_eq!(store.count("module_bindings").await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_remove_script() {
        let store = create_test_store().await.unwrap();
        record(&store, &[binding("f-ad", "d-1", ScriptType::Ad)])
            .await
            .unwrap();

        assert!(remove_script(&store, "d-1", ScriptType::Ad).await.unwrap());
        assert!(!remove_script(&store, "d-1", ScriptType::Ad).await.unwrap());
    }
}
