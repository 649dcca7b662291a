//! Document session: the components wired together around one store
//!
//! Opening or saving a document through the session keeps the handle store,
//! the recent-documents index and the document plane in step.

use crate::capability::{ensure_permission, AccessMode, CapabilityHost};
use crate::config::SyncConfig;
use crate::drafts::TabDraftPersistence;
use crate::error::{Result, SyncError};
use crate::handles::HandleStore;
use crate::recent::{RecentDocument, RecentDocumentsIndex};
use crate::repository::{
    CloneOptions, CloneReport, ModuleRepository, ModuleScripts, ModuleSnapshot,
};
use crate::retention::{RetentionPolicy, SweepReport};
use crate::storage::{ConnectionMode, SyncStore};
use crate::sync_state::{close_prompt_for, ClosePrompt, DocumentPlane, LocalBaseline, PortalBaseline};
use crate::types::{PortalRef, ScriptLanguage};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{debug, info};

/// A document ready to be shown in a tab
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OpenedDocument {
    /// Stored file handle id
    pub handle_id: String,
    pub display_name: String,
    pub content: String,
    pub plane: DocumentPlane,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub language: Option<ScriptLanguage>,
}

pub struct DocumentSession {
    store: Arc<SyncStore>,
    host: Arc<dyn CapabilityHost>,
    handles: HandleStore,
    repository: ModuleRepository,
    recent: RecentDocumentsIndex,
    drafts: TabDraftPersistence,
    retention: RetentionPolicy,
}

impl DocumentSession {
    pub fn new(store: Arc<SyncStore>, host: Arc<dyn CapabilityHost>, config: &SyncConfig) -> Self {
        let retention = RetentionPolicy::new(store.clone(), config.retention.clone());
        let handles = HandleStore::new(store.clone(), host.clone(), retention.clone());
        let repository = ModuleRepository::new(
            store.clone(),
            handles.clone(),
            config.fallback_module_name.clone(),
        );
        Self {
            recent: RecentDocumentsIndex::new(store.clone(), retention.clone()),
            drafts: TabDraftPersistence::new(store.clone()),
            store,
            host,
            handles,
            repository,
            retention,
        }
    }

    /// Open the configured database and build a session on it
    pub async fn open(config: &SyncConfig, host: Arc<dyn CapabilityHost>) -> Result<Self> {
        let path = config.resolve_database_path();
        info!("Using database at {}", path.display());
        let store = SyncStore::open(ConnectionMode::Local(path)).await?;
        Ok(Self::new(Arc::new(store), host, config))
    }

    pub fn store(&self) -> &Arc<SyncStore> {
        &self.store
    }

    pub fn handles(&self) -> &HandleStore {
        &self.handles
    }

    pub fn repository(&self) -> &ModuleRepository {
        &self.repository
    }

    pub fn recent(&self) -> &RecentDocumentsIndex {
        &self.recent
    }

    pub fn drafts(&self) -> &TabDraftPersistence {
        &self.drafts
    }

    pub fn retention(&self) -> &RetentionPolicy {
        &self.retention
    }

    /// Pick a local file and open it
    pub async fn open_local_file(&self) -> Result<OpenedDocument> {
        let handle = self.host.pick_file().await?;
        let handle_id = self.handles.save_new(&handle, &handle.name).await?;
        let content = self
            .host
            .read_text(&handle)
            .await
            .map_err(|e| e.context(&handle.name))?;

        self.recent
            .add(RecentDocument::local(&handle_id, &handle.name))
            .await?;

        Ok(OpenedDocument {
            plane: DocumentPlane::Local(LocalBaseline {
                handle_id: handle_id.clone(),
                last_saved_content: content.clone(),
            }),
            language: language_of(&handle.name),
            display_name: handle.name,
            handle_id,
            content,
        })
    }

    /// Reopen a stored file, asking for permission again if it lapsed
    pub async fn reopen_local_file(&self, handle_id: &str) -> Result<OpenedDocument> {
        let record = self
            .handles
            .get_record(handle_id)
            .await?
            .ok_or_else(|| SyncError::NotFound(format!("file handle {}", handle_id)))?;

        ensure_permission(self.host.as_ref(), &record.handle, AccessMode::Read)
            .await
            .map_err(|e| e.context(&record.display_name))?;
        let content = self
            .host
            .read_text(&record.handle)
            .await
            .map_err(|e| e.context(&record.display_name))?;

        self.handles.touch(handle_id).await?;
        self.recent
            .add(RecentDocument::local(handle_id, &record.display_name))
            .await?;

        Ok(OpenedDocument {
            handle_id: record.id,
            language: language_of(&record.handle.name),
            display_name: record.display_name,
            plane: DocumentPlane::Local(LocalBaseline {
                handle_id: handle_id.to_string(),
                last_saved_content: content.clone(),
            }),
            content,
        })
    }

    /// Write a buffer to its stored file; returns the plane with the new local baseline
    pub async fn save_local_file(
        &self,
        handle_id: &str,
        content: &str,
        plane: DocumentPlane,
    ) -> Result<DocumentPlane> {
        let record = self
            .handles
            .get_record(handle_id)
            .await?
            .ok_or_else(|| SyncError::NotFound(format!("file handle {}", handle_id)))?;

        ensure_permission(self.host.as_ref(), &record.handle, AccessMode::ReadWrite)
            .await
            .map_err(|e| e.context(&record.display_name))?;
        self.host
            .write_text(&record.handle, content)
            .await
            .map_err(|e| e.context(&record.display_name))?;

        self.handles.touch(handle_id).await?;
        self.recent
            .add(RecentDocument::local(handle_id, &record.display_name))
            .await?;

        debug!("Saved {} ({} bytes)", record.display_name, content.len());
        Ok(plane.with_local_save(handle_id, content))
    }

    /// Reopen a cloned script with its module context
    ///
    /// Returns `None` when no module context can be restored without prompting;
    /// the caller may fall back to [`Self::reopen_local_file`]. The portal
    /// baseline starts at the file content until the caller fetches the remote
    /// script and applies it with [`DocumentPlane::with_portal_sync`].
    pub async fn open_module_script(&self, file_id: &str) -> Result<Option<OpenedDocument>> {
        let Some(restored) = self.repository.restore_module_binding(file_id).await? else {
            return Ok(None);
        };

        let content = self
            .host
            .read_text(&restored.file)
            .await
            .map_err(|e| e.context(&restored.file.name))?;

        let manifest = &restored.manifest;
        let plane = DocumentPlane::LocalAndPortal {
            local: LocalBaseline {
                handle_id: file_id.to_string(),
                last_saved_content: content.clone(),
            },
            portal: PortalBaseline {
                portal_id: manifest.portal.id.clone(),
                module_id: manifest.module.id,
                module_type: manifest.module.module_type,
                script_type: restored.binding.script_type,
                last_known_content: content.clone(),
            },
        };

        let display_name = format!("{}/{}", manifest.title(), restored.file.name);
        self.handles.touch(file_id).await?;
        self.recent
            .add(RecentDocument::local(file_id, &display_name))
            .await?;

        Ok(Some(OpenedDocument {
            handle_id: file_id.to_string(),
            display_name,
            language: restored
                .script_entry()
                .map(|entry| entry.language)
                .or_else(|| language_of(&restored.file.name)),
            plane,
            content,
        }))
    }

    /// Clone a module and report the outcome in the editing-surface shape
    pub async fn clone_module(
        &self,
        repository_id: &str,
        portal: &PortalRef,
        module: &ModuleSnapshot,
        scripts: &ModuleScripts,
        options: CloneOptions,
    ) -> CloneReport {
        self.repository
            .clone_module_to_repository(repository_id, portal, module, scripts, options)
            .await
            .into()
    }

    pub fn close_prompt(&self, content: &str, plane: &DocumentPlane) -> ClosePrompt {
        close_prompt_for(content, plane)
    }

    /// Sweep every bounded store now
    pub async fn sweep_all(&self) -> Result<Vec<SweepReport>> {
        self.retention.sweep_all().await
    }
}

fn language_of(file_name: &str) -> Option<ScriptLanguage> {
    std::path::Path::new(file_name)
        .extension()
        .and_then(|ext| ext.to_str())
        .and_then(ScriptLanguage::from_extension)
}
