//! Crash-recovery snapshot of the open tabs
//!
//! A single slot, overwritten on every save. `load` distinguishes "never
//! saved" (`None`) from "saved with no tabs" (`Some` with an empty list).

use crate::error::{Result, SyncError};
use crate::storage::libsql::from_millis;
use crate::storage::SyncStore;
use crate::sync_state::{DirtyState, DocumentPlane};
use crate::types::ScriptLanguage;
use chrono::{DateTime, Utc};
use libsql::params;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{debug, warn};

const SLOT: &str = "open_tabs";

/// One open editing tab
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TabDraft {
    pub id: String,
    pub display_name: String,
    pub content: String,
    pub plane: DocumentPlane,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub language: Option<ScriptLanguage>,
}

impl TabDraft {
    pub fn dirty_state(&self) -> DirtyState {
        DirtyState::resolve(&self.content, &self.plane)
    }
}

/// Every open tab at one point in time
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DraftSnapshot {
    pub saved_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub active_tab_id: Option<String>,
    pub tabs: Vec<TabDraft>,
}

impl DraftSnapshot {
    pub fn new(tabs: Vec<TabDraft>, active_tab_id: Option<String>) -> Self {
        Self {
            saved_at: Utc::now(),
            active_tab_id,
            tabs,
        }
    }

    /// Tabs holding edits that exist in no baseline
    pub fn dirty_tabs(&self) -> impl Iterator<Item = &TabDraft> {
        self.tabs.iter().filter(|tab| tab.dirty_state().is_dirty())
    }
}

pub struct TabDraftPersistence {
    store: Arc<SyncStore>,
}

impl TabDraftPersistence {
    pub fn new(store: Arc<SyncStore>) -> Self {
        Self { store }
    }

    /// Replace the stored snapshot
    pub async fn save(&self, snapshot: &DraftSnapshot) -> Result<()> {
        let stamp = self.store.stamp();
        let mut stored = snapshot.clone();
        stored.saved_at = from_millis(stamp);

        self.store
            .conn()
            .await
            .execute(
                r#"
                INSERT INTO tab_drafts (slot, snapshot, saved_at) VALUES (?, ?, ?)
                ON CONFLICT(slot) DO UPDATE SET
                    snapshot = excluded.snapshot,
                    saved_at = excluded.saved_at
                "#,
                params![SLOT, serde_json::to_string(&stored)?, stamp],
            )
            .await?;

        debug!("Saved draft snapshot with {} tabs", stored.tabs.len());
        Ok(())
    }

    /// The stored snapshot, or `None` if nothing was ever saved
    pub async fn load(&self) -> Result<Option<DraftSnapshot>> {
        let conn = self.store.conn().await;
        let mut rows = conn
            .query(
                "SELECT snapshot FROM tab_drafts WHERE slot = ?",
                params![SLOT],
            )
            .await?;

        let Some(row) = rows.next().await? else {
            return Ok(None);
        };
        let raw: String = row.get(0)?;
        serde_json::from_str(&raw).map(Some).map_err(|e| {
            warn!("Stored draft snapshot is unreadable: {}", e);
            SyncError::StorageFailure(format!("Unreadable draft snapshot: {}", e))
        })
    }

    /// Forget the stored snapshot; returns whether one existed
    pub async fn clear(&self) -> Result<bool> {
        let removed = self
            .store
            .conn()
            .await
            .execute("DELETE FROM tab_drafts WHERE slot = ?", params![SLOT])
            .await?;
        Ok(removed > 0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::test_utils::create_test_store;
    use crate::sync_state::LocalBaseline;

    fn tab(id: &str, content: &str, saved: &str) -> TabDraft {
        TabDraft {
            id: id.into(),
            display_name: format!("{}.groovy", id),
            content: content.into(),
            plane: DocumentPlane::Local(LocalBaseline {
                handle_id: format!("h-{}", id),
                last_saved_content: saved.into(),
            }),
            language: Some(ScriptLanguage::Groovy),
        }
    }

    #[tokio::test]
    async fn test_never_saved_is_distinct_from_empty() {
        let drafts = TabDraftPersistence::new(create_test_store().await.unwrap());
        assert!(drafts.load().await.unwrap().is_none());

        drafts.save(&DraftSnapshot::new(vec![], None)).await.unwrap();
        let loaded = drafts.load().await.unwrap().unwrap();
        assert!(loaded.tabs.is_empty());
    }

    #[tokio::test]
    async fn test_save_overwrites_single_slot() {
        let store = create_test_store().await.unwrap();
        let drafts = TabDraftPersistence::new(store.clone());

        drafts
            .save(&DraftSnapshot::new(vec![tab("a", "1", "1")], None))
            .await
            .unwrap();
        drafts
            .save(&DraftSnapshot::new(
                vec![tab("b", "2", "1"), tab("c", "3", "3")],
                Some("b".into()),
            ))
            .await
            .unwrap();

        assert_eq!(store.count("tab_drafts").await.unwrap(), 1);
        let loaded = drafts.load().await.unwrap().unwrap();
        assert_eq!(loaded.tabs.len(), 2);
        assert_eq!(loaded.active_tab_id.as_deref(), Some("b"));
        assert_eq!(loaded.dirty_tabs().map(|t| t.id.as_str()).collect::<Vec<_>>(), vec!["b"]);
    }

    #[tokio::test]
    async fn test_clear() {
        let drafts = TabDraftPersistence::new(create_test_store().await.unwrap());
        assert!(!drafts.clear().await.unwrap());

        drafts.save(&DraftSnapshot::new(vec![], None)).await.unwrap();
        assert!(drafts.clear().await.unwrap());
        assert!(drafts.load().await.unwrap().is_none());
    }
}
