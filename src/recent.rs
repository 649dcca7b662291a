//! Recently opened documents
//!
//! One entry per logical document across every plane. Reopening a document
//! replaces its entry rather than adding another, and each insert is followed
//! by a retention sweep of the index.

use crate::error::{Result, SyncError};
use crate::retention::RetentionPolicy;
use crate::storage::libsql::{finish_transaction, from_millis};
use crate::storage::{BoundedStore, SyncStore};
use crate::types::ScriptType;
use chrono::{DateTime, Utc};
use libsql::params;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::debug;

/// Document plane a recent entry reopens into
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RecentKind {
    Local,
    Portal,
    Scratch,
}

impl RecentKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            RecentKind::Local => "local",
            RecentKind::Portal => "portal",
            RecentKind::Scratch => "scratch",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RecentDocument {
    /// Handle id for local files, module id for portal scripts, tab id for scratch
    pub id: String,
    #[serde(rename = "type")]
    pub kind: RecentKind,
    pub display_name: String,
    pub last_accessed: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub file_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub portal_hostname: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub module_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub script_type: Option<ScriptType>,
    /// Filled in by [`RecentDocumentsIndex::add`]
    #[serde(default)]
    pub dedupe_key: String,
}

impl RecentDocument {
    fn base(id: &str, kind: RecentKind, display_name: &str) -> Self {
        Self {
            id: id.to_string(),
            kind,
            display_name: display_name.to_string(),
            last_accessed: Utc::now(),
            file_name: None,
            portal_hostname: None,
            module_name: None,
            script_type: None,
            dedupe_key: String::new(),
        }
    }

    /// A local file, keyed by its stored handle id
    pub fn local(handle_id: &str, file_name: &str) -> Self {
        let mut doc = Self::base(handle_id, RecentKind::Local, file_name);
        doc.file_name = Some(file_name.to_string());
        doc
    }

    /// A portal script, keyed by portal, module id and script type
    pub fn portal(
        module_id: &str,
        portal_hostname: &str,
        module_name: &str,
        script_type: ScriptType,
    ) -> Self {
        let display_name = format!("{} ({})", module_name, script_type);
        let mut doc = Self::base(module_id, RecentKind::Portal, &display_name);
        doc.portal_hostname = Some(portal_hostname.to_string());
        doc.module_name = Some(module_name.to_string());
        doc.script_type = Some(script_type);
        doc
    }

    pub fn scratch(tab_id: &str, display_name: &str) -> Self {
        Self::base(tab_id, RecentKind::Scratch, display_name)
    }

    /// Stable identity of the logical document
    pub fn compute_dedupe_key(&self) -> String {
        match self.kind {
            RecentKind::Local => format!("local:{}", self.id),
            // Module names repeat across module types; ids do not
            RecentKind::Portal => format!(
                "portal:{}:{}:{}",
                self.portal_hostname.as_deref().unwrap_or(""),
                self.id,
                self.script_type.map(|s| s.as_str()).unwrap_or("")
            ),
            RecentKind::Scratch => format!("scratch:{}", self.id),
        }
    }
}

/// Bounded, deduplicated history of opened documents
#[derive(Clone)]
pub struct RecentDocumentsIndex {
    store: Arc<SyncStore>,
    retention: RetentionPolicy,
}

impl RecentDocumentsIndex {
    pub fn new(store: Arc<SyncStore>, retention: RetentionPolicy) -> Self {
        Self { store, retention }
    }

    /// Record an open; replaces any entry for the same logical document
    pub async fn add(&self, mut doc: RecentDocument) -> Result<RecentDocument> {
        doc.dedupe_key = doc.compute_dedupe_key();
        let stamp = self.store.stamp();
        doc.last_accessed = from_millis(stamp);

        let document = serde_json::to_string(&doc)?;

        {
            let conn = self.store.conn().await;
            let tx = conn.transaction().await?;
            let result = async {
                tx.execute(
                    "DELETE FROM recent_documents WHERE dedupe_key = ?",
                    params![doc.dedupe_key.clone()],
                )
                .await?;
                tx.execute(
                    "INSERT INTO recent_documents (dedupe_key, id, kind, document, last_accessed) VALUES (?, ?, ?, ?, ?)",
                    params![
                        doc.dedupe_key.clone(),
                        doc.id.clone(),
                        doc.kind.as_str(),
                        document,
                        stamp
                    ],
                )
                .await?;
                Ok::<(), SyncError>(())
            }
            .await;
            finish_transaction(tx, result, "record recent document").await?;
        }

        debug!("Recorded recent document {}", doc.dedupe_key);
        self.retention.trigger(BoundedStore::RecentDocuments).await;
        Ok(doc)
    }

    /// Most recently opened first
    pub async fn list(&self, limit: usize) -> Result<Vec<RecentDocument>> {
        let conn = self.store.conn().await;
        let mut rows = conn
            .query(
                "SELECT document, last_accessed FROM recent_documents ORDER BY last_accessed DESC LIMIT ?",
                params![limit as i64],
            )
            .await?;

        let mut docs = Vec::new();
        while let Some(row) = rows.next().await? {
            let raw: String = row.get(0)?;
            let mut doc: RecentDocument = serde_json::from_str(&raw)?;
            doc.last_accessed = from_millis(row.get(1)?);
            docs.push(doc);
        }
        Ok(docs)
    }

    pub async fn remove(&self, dedupe_key: &str) -> Result<bool> {
        let removed = self
            .store
            .conn()
            .await
            .execute(
                "DELETE FROM recent_documents WHERE dedupe_key = ?",
                params![dedupe_key],
            )
            .await?;
        Ok(removed > 0)
    }

    pub async fn clear(&self) -> Result<u64> {
        Ok(self
            .store
            .conn()
            .await
            .execute("DELETE FROM recent_documents", params![])
            .await?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_dedupe_keys() {
        assert_eq!(RecentDocument::local("f-1", "a.groovy").compute_dedupe_key(), "local:f-1");
        assert_eq!(
            RecentDocument::portal("42", "acme.example.com", "CPU", ScriptType::Ad)
                .compute_dedupe_key(),
            "portal:acme.example.com:42:ad"
        );
        assert_eq!(RecentDocument::scratch("t-3", "Untitled").compute_dedupe_key(), "scratch:t-3");
    }

    #[test]
    fn test_portal_scripts_of_one_module_are_distinct() {
        let collection = RecentDocument::portal("42", "acme", "CPU", ScriptType::Collection);
        let ad = RecentDocument::portal("42", "acme", "CPU", ScriptType::Ad);
        assert_ne!(collection.compute_dedupe_key(), ad.compute_dedupe_key());
    }

    #[test]
    fn test_same_named_modules_are_distinct() {
        let datasource = RecentDocument::portal("1201", "acme", "CPU", ScriptType::Collection);
        let propertysource = RecentDocument::portal("88", "acme", "CPU", ScriptType::Collection);
        assert_ne!(datasource.compute_dedupe_key(), propertysource.compute_dedupe_key());
    }

    #[test]
    fn test_serialized_shape() {
        let json = serde_json::to_value(RecentDocument::local("f-1", "a.groovy")).unwrap();
        assert_eq!(json["type"], "local");
        assert_eq!(json["fileName"], "a.groovy");
        assert!(json.get("portalHostname").is_none());
    }
}
