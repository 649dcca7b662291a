//! Module repositories: local directory trees holding cloned portal modules
//!
//! Layout under a repository root:
//!
//! ```text
//! <portal hostname>/<module type plural>/<sanitized module name>/
//!     module.json
//!     collection.<ext>
//!     ad.<ext>
//! ```
//!
//! Cloning writes every script before the manifest and records bindings only
//! after all files are on disk, so a binding never points at an unwritten file.

pub mod bindings;
pub mod manifest;
pub mod naming;

use crate::capability::{ensure_permission, AccessMode, CapabilityHandle, CapabilityHost, PermissionState};
use crate::error::{ErrorReport, Result, SyncError};
use crate::handles::{dedupe, DirectoryHandleRecord, DirectoryMeta, HandleStore};
use crate::storage::libsql::from_millis;
use crate::storage::{HandleTable, SyncStore};
use crate::types::{new_record_id, ModuleType, PortalRef, ScriptLanguage, ScriptType};
use chrono::{DateTime, Utc};
use libsql::params;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{debug, info, warn};

pub use bindings::ModuleBinding;
pub use manifest::{
    ManifestScripts, ModuleIdentity, ModuleManifest, ModuleMetadata, ScriptEntry, SyncTimestamps,
};
pub use naming::{sanitize_module_name, DEFAULT_FALLBACK_NAME, MANIFEST_FILE};

/// A repository root picked by the user
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RepositoryRecord {
    pub id: String,
    pub handle: CapabilityHandle,
    pub display_name: String,
    /// Portal hostnames that have modules in this repository
    pub portals: Vec<String>,
    pub last_accessed: DateTime<Utc>,
}

/// Module definition as fetched from the portal
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ModuleSnapshot {
    pub id: u64,
    #[serde(rename = "type")]
    pub module_type: ModuleType,
    pub name: String,
    #[serde(default)]
    pub display_name: Option<String>,
    #[serde(default)]
    pub lineage_id: Option<String>,
    #[serde(default)]
    pub metadata: ModuleMetadata,
    /// Portal-side version used as the pull baseline
    #[serde(default)]
    pub version: Option<u64>,
}

impl ModuleSnapshot {
    fn identity(&self) -> ModuleIdentity {
        ModuleIdentity {
            id: self.id,
            module_type: self.module_type,
            name: self.name.clone(),
            display_name: self.display_name.clone(),
            lineage_id: self.lineage_id.clone(),
        }
    }
}

/// Script text plus the language that decides its extension
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScriptSource {
    pub language: ScriptLanguage,
    pub content: String,
}

/// Up to one script per script type
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ModuleScripts {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub collection: Option<ScriptSource>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ad: Option<ScriptSource>,
}

impl ModuleScripts {
    pub fn get(&self, script: ScriptType) -> Option<&ScriptSource> {
        match script {
            ScriptType::Collection => self.collection.as_ref(),
            ScriptType::Ad => self.ad.as_ref(),
        }
    }

    pub fn set(&mut self, script: ScriptType, source: Option<ScriptSource>) {
        match script {
            ScriptType::Collection => self.collection = source,
            ScriptType::Ad => self.ad = source,
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CloneOptions {
    pub overwrite: bool,
}

/// Stored file id per cloned script
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PerScriptIds {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub collection: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ad: Option<String>,
}

impl PerScriptIds {
    pub fn get(&self, script: ScriptType) -> Option<&str> {
        match script {
            ScriptType::Collection => self.collection.as_deref(),
            ScriptType::Ad => self.ad.as_deref(),
        }
    }

    fn set(&mut self, script: ScriptType, id: String) {
        match script {
            ScriptType::Collection => self.collection = Some(id),
            ScriptType::Ad => self.ad = Some(id),
        }
    }
}

/// Successful clone
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CloneOutcome {
    pub module_path: String,
    pub directory_id: String,
    pub file_ids: PerScriptIds,
    pub manifest: ModuleManifest,
}

/// Clone result as handed to the editing surface
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CloneReport {
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub path: Option<String>,
    pub per_script_ids: PerScriptIds,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<ErrorReport>,
}

impl From<Result<CloneOutcome>> for CloneReport {
    fn from(result: Result<CloneOutcome>) -> Self {
        match result {
            Ok(outcome) => CloneReport {
                success: true,
                path: Some(outcome.module_path),
                per_script_ids: outcome.file_ids,
                error: None,
            },
            Err(e) => CloneReport {
                success: false,
                path: None,
                per_script_ids: PerScriptIds::default(),
                error: Some(e.report()),
            },
        }
    }
}

/// Module read back from its directory
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LoadedModule {
    pub manifest: ModuleManifest,
    pub scripts: ModuleScripts,
    /// Scripts the manifest lists but that could not be found on disk
    pub missing: Vec<ScriptType>,
}

/// Module context restored for a previously cloned script file
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RestoredBinding {
    pub binding: ModuleBinding,
    pub file: CapabilityHandle,
    pub directory: DirectoryHandleRecord,
    pub manifest: ModuleManifest,
}

impl RestoredBinding {
    /// Manifest entry of the bound script, if the manifest still lists it
    pub fn script_entry(&self) -> Option<&ScriptEntry> {
        self.manifest.scripts.get(self.binding.script_type)
    }
}

const SELECT_REPOSITORY: &str =
    "SELECT id, handle, display_name, portals, last_accessed FROM repositories";

/// Clones, reads and updates module directories inside repositories
#[derive(Clone)]
pub struct ModuleRepository {
    store: Arc<SyncStore>,
    handles: HandleStore,
    host: Arc<dyn CapabilityHost>,
    fallback_name: String,
}

impl ModuleRepository {
    pub fn new(store: Arc<SyncStore>, handles: HandleStore, fallback_name: impl Into<String>) -> Self {
        let host = handles.host().clone();
        Self {
            store,
            handles,
            host,
            fallback_name: fallback_name.into(),
        }
    }

    /// Sanitize with this repository's fallback name
    pub fn sanitize_module_name(&self, name: &str) -> String {
        naming::sanitize_with_fallback(name, &self.fallback_name)
    }

    // ---- repositories ----

    /// Let the user pick a repository root, reusing a tracked one for the same directory
    pub async fn pick_or_create_repository(&self) -> Result<RepositoryRecord> {
        let handle = self.host.pick_directory().await?;
        self.register_repository(&handle).await
    }

    /// Track a directory as a repository root, or touch the record already tracking it
    pub async fn register_repository(&self, handle: &CapabilityHandle) -> Result<RepositoryRecord> {
        if !handle.is_directory() {
            return Err(SyncError::StorageFailure(format!(
                "'{}' is not a directory and cannot be a repository",
                handle.name
            )));
        }

        let proposed = new_record_id();
        let id = dedupe::canonical_id(
            &self.store,
            self.host.as_ref(),
            HandleTable::Repositories,
            &proposed,
            handle,
        )
        .await?;

        if id != proposed {
            self.store.touch(HandleTable::Repositories, &id).await?;
            debug!("Reusing repository {} for '{}'", id, handle.name);
        } else {
            let stamp = self.store.stamp();
            self.store
                .conn()
                .await
                .execute(
                    "INSERT INTO repositories (id, handle, display_name, portals, last_accessed) VALUES (?, ?, ?, '[]', ?)",
                    params![id.clone(), serde_json::to_string(handle)?, handle.name.clone(), stamp],
                )
                .await?;
            info!("Registered repository '{}' ({})", handle.name, id);
        }

        self.get_repository(&id)
            .await?
            .ok_or_else(|| SyncError::NotFound(format!("repository {}", id)))
    }

    /// Tracked repositories, most recently used first
    pub async fn list_repositories(&self) -> Result<Vec<RepositoryRecord>> {
        let sql = format!("{} ORDER BY last_accessed DESC", SELECT_REPOSITORY);
        let conn = self.store.conn().await;
        let mut rows = conn.query(&sql, params![]).await?;

        let mut repositories = Vec::new();
        while let Some(row) = rows.next().await? {
            repositories.push(row_to_repository(&row)?);
        }
        Ok(repositories)
    }

    pub async fn get_repository(&self, id: &str) -> Result<Option<RepositoryRecord>> {
        let sql = format!("{} WHERE id = ?", SELECT_REPOSITORY);
        let conn = self.store.conn().await;
        let mut rows = conn.query(&sql, params![id]).await?;
        match rows.next().await? {
            Some(row) => Ok(Some(row_to_repository(&row)?)),
            None => Ok(None),
        }
    }

    /// Stop tracking a repository; files on disk are left alone
    pub async fn forget_repository(&self, id: &str) -> Result<bool> {
        let removed = self.store.delete(HandleTable::Repositories, id).await?;
        if removed {
            let dropped = bindings::remove_repository(&self.store, id).await?;
            debug!("Forgot repository {} ({} bindings dropped)", id, dropped);
        }
        Ok(removed)
    }

    async fn add_portal(&self, repository: &RepositoryRecord, hostname: &str) -> Result<()> {
        if repository.portals.iter().any(|p| p == hostname) {
            return Ok(());
        }
        let mut portals = repository.portals.clone();
        portals.push(hostname.to_string());
        self.store
            .conn()
            .await
            .execute(
                "UPDATE repositories SET portals = ? WHERE id = ?",
                params![serde_json::to_string(&portals)?, repository.id.clone()],
            )
            .await?;
        Ok(())
    }

    // ---- clone ----

    /// Write a module into `<host>/<type plural>/<name>/` of a repository
    ///
    /// Without `overwrite`, an existing module directory fails the clone with
    /// `AlreadyExists` before anything is written.
    pub async fn clone_module_to_repository(
        &self,
        repository_id: &str,
        portal: &PortalRef,
        module: &ModuleSnapshot,
        scripts: &ModuleScripts,
        options: CloneOptions,
    ) -> Result<CloneOutcome> {
        let repository = self
            .get_repository(repository_id)
            .await?
            .ok_or_else(|| SyncError::NotFound(format!("repository {}", repository_id)))?;

        ensure_permission(self.host.as_ref(), &repository.handle, AccessMode::ReadWrite)
            .await
            .map_err(|e| e.context(&repository.display_name))?;

        let segments = naming::module_path_segments(
            &portal.hostname,
            module.module_type,
            &module.name,
            &self.fallback_name,
        );
        let module_path = naming::join_segments(&segments);

        let existing = self.resolve_existing(&repository.handle, &segments).await?;
        if existing.is_some() && !options.overwrite {
            return Err(SyncError::AlreadyExists(format!(
                "module directory '{}' already exists in '{}'",
                module_path, repository.display_name
            )));
        }

        let mut parent = repository.handle.clone();
        let mut directory = repository.handle.clone();
        for segment in &segments {
            let next = self
                .host
                .get_directory(&directory, segment, true)
                .await
                .map_err(|e| e.context(&module_path))?;
            parent = std::mem::replace(&mut directory, next);
        }

        let mut manifest_scripts = ManifestScripts::default();
        let mut script_files = Vec::new();
        let mut writes = Vec::new();
        for script in ScriptType::ALL {
            let Some(source) = scripts.get(script) else {
                continue;
            };
            let filename = naming::script_file_name(script, source.language);
            manifest_scripts.set(
                script,
                Some(ScriptEntry {
                    filename: filename.clone(),
                    language: source.language,
                }),
            );
            writes.push((filename.clone(), source.content.clone()));
            script_files.push((script, filename));
        }

        let manifest = ModuleManifest {
            manifest_version: manifest::MANIFEST_VERSION,
            portal: portal.clone(),
            module: module.identity(),
            metadata: module.metadata.clone(),
            scripts: manifest_scripts,
            sync: SyncTimestamps::cloned(self.store.now(), module.version),
        };
        // Manifest last, so it never describes scripts that were not written
        writes.push((MANIFEST_FILE.to_string(), manifest.to_json()?));

        let files = match self.write_all(&directory, &writes).await {
            Ok(files) => files,
            Err(e) => {
                if existing.is_none() {
                    self.discard_directory(&parent, &directory).await;
                }
                return Err(e.context(&module_path));
            }
        };
        let written: Vec<_> = script_files
            .into_iter()
            .zip(files)
            .map(|((script, filename), file)| (script, filename, file))
            .collect();

        if existing.is_some() {
            self.remove_stale_scripts(&directory, &manifest.scripts).await;
        }

        let directory_id = self
            .handles
            .save_directory(
                &new_record_id(),
                &directory,
                &DirectoryMeta {
                    directory_name: directory.name.clone(),
                    module_name: module.name.clone(),
                    portal_hostname: portal.hostname.clone(),
                    module_type: module.module_type,
                },
            )
            .await?;

        let mut file_ids = PerScriptIds::default();
        let mut new_bindings = Vec::with_capacity(written.len());
        let created_at = self.store.now();
        for (script, filename, file) in &written {
            let display_name = format!("{}/{}", directory.name, filename);
            let file_id = self
                .handles
                .save(&new_record_id(), file, &display_name)
                .await?;
            new_bindings.push(ModuleBinding {
                file_id: file_id.clone(),
                directory_id: directory_id.clone(),
                repository_id: repository.id.clone(),
                script_type: *script,
                module_path: module_path.clone(),
                created_at,
            });
            file_ids.set(*script, file_id);
        }
        bindings::record(&self.store, &new_bindings).await?;

        for script in ScriptType::ALL {
            if manifest.scripts.get(script).is_none() {
                bindings::remove_script(&self.store, &directory_id, script).await?;
            }
        }

        self.add_portal(&repository, &portal.hostname).await?;
        self.store
            .touch(HandleTable::Repositories, &repository.id)
            .await?;

        info!(
            "Cloned {} '{}' to {}/{} ({} scripts)",
            module.module_type,
            module.name,
            repository.display_name,
            module_path,
            written.len()
        );

        Ok(CloneOutcome {
            module_path,
            directory_id,
            file_ids,
            manifest,
        })
    }

    /// Walk `segments` below `root` without creating anything
    async fn resolve_existing(
        &self,
        root: &CapabilityHandle,
        segments: &[String],
    ) -> Result<Option<CapabilityHandle>> {
        let mut current = root.clone();
        for segment in segments {
            match self.host.get_directory(&current, segment, false).await {
                Ok(next) => current = next,
                Err(SyncError::NotFound(_)) => return Ok(None),
                Err(e) => return Err(e),
            }
        }
        Ok(Some(current))
    }

    /// Write every file or none of them
    ///
    /// All targets are checked before the first write. If a write fails, files
    /// written so far get their previous content back and new ones are removed.
    async fn write_all(
        &self,
        directory: &CapabilityHandle,
        writes: &[(String, String)],
    ) -> Result<Vec<CapabilityHandle>> {
        let mut previous = Vec::with_capacity(writes.len());
        for (name, _) in writes {
            previous.push(self.read_previous(directory, name).await?);
        }

        let mut files = Vec::with_capacity(writes.len());
        for (i, (name, contents)) in writes.iter().enumerate() {
            match self.write_file(directory, name, contents).await {
                Ok(file) => files.push(file),
                Err(e) => {
                    self.restore_previous(directory, &writes[..=i], &previous[..=i])
                        .await;
                    return Err(e);
                }
            }
        }
        Ok(files)
    }

    async fn read_previous(&self, directory: &CapabilityHandle, name: &str) -> Result<Option<String>> {
        match self.host.get_file(directory, name, false).await {
            Ok(file) => Ok(Some(
                self.host.read_text(&file).await.map_err(|e| e.context(name))?,
            )),
            Err(SyncError::NotFound(_)) => Ok(None),
            Err(e) => Err(e.context(name)),
        }
    }

    async fn restore_previous(
        &self,
        directory: &CapabilityHandle,
        writes: &[(String, String)],
        previous: &[Option<String>],
    ) {
        for ((name, _), before) in writes.iter().zip(previous) {
            let restored = match before {
                Some(contents) => self.write_file(directory, name, contents).await.map(|_| ()),
                None => match self.host.remove_entry(directory, name).await {
                    Err(SyncError::NotFound(_)) => Ok(()),
                    other => other,
                },
            };
            if let Err(e) = restored {
                warn!("Could not roll back {}/{}: {}", directory.name, name, e);
            }
        }
    }

    /// Remove a module directory this clone created
    async fn discard_directory(&self, parent: &CapabilityHandle, directory: &CapabilityHandle) {
        match self.host.remove_entry(parent, &directory.name).await {
            Ok(()) | Err(SyncError::NotFound(_)) => {}
            Err(e) => warn!("Could not remove partial clone {}: {}", directory.locator, e),
        }
    }

    async fn write_file(
        &self,
        directory: &CapabilityHandle,
        name: &str,
        contents: &str,
    ) -> Result<CapabilityHandle> {
        let file = self
            .host
            .get_file(directory, name, true)
            .await
            .map_err(|e| e.context(name))?;
        self.host
            .write_text(&file, contents)
            .await
            .map_err(|e| e.context(name))?;
        Ok(file)
    }

    /// Remove script files a fresh clone no longer references
    async fn remove_stale_scripts(&self, directory: &CapabilityHandle, keep: &ManifestScripts) {
        for script in ScriptType::ALL {
            for language in ScriptLanguage::ALL {
                let filename = naming::script_file_name(script, language);
                if keep.entries().any(|(_, entry)| entry.filename == filename) {
                    continue;
                }
                match self.host.remove_entry(directory, &filename).await {
                    Ok(()) => debug!("Removed stale script {}/{}", directory.name, filename),
                    Err(SyncError::NotFound(_)) => {}
                    Err(e) => warn!(
                        "Could not remove stale script {}/{}: {}",
                        directory.name, filename, e
                    ),
                }
            }
        }
    }

    // ---- read ----

    /// Read the manifest and, best effort, every script it lists
    pub async fn read_module_from_directory(&self, directory: &CapabilityHandle) -> Result<LoadedModule> {
        let manifest = self.read_manifest(directory).await?;

        let mut scripts = ModuleScripts::default();
        let mut missing = Vec::new();
        for (script, entry) in manifest.scripts.entries() {
            match self.read_script(directory, &entry.filename).await {
                Ok(content) => scripts.set(
                    script,
                    Some(ScriptSource {
                        language: entry.language,
                        content,
                    }),
                ),
                Err(SyncError::NotFound(msg)) => {
                    warn!(
                        "Script {} listed in {}/{} is missing: {}",
                        entry.filename, directory.name, MANIFEST_FILE, msg
                    );
                    missing.push(script);
                }
                Err(e) => return Err(e.context(&entry.filename)),
            }
        }

        Ok(LoadedModule {
            manifest,
            scripts,
            missing,
        })
    }

    async fn read_manifest(&self, directory: &CapabilityHandle) -> Result<ModuleManifest> {
        let file = self
            .host
            .get_file(directory, MANIFEST_FILE, false)
            .await
            .map_err(|e| e.context(format!("{}/{}", directory.name, MANIFEST_FILE)))?;
        let raw = self.host.read_text(&file).await?;
        ModuleManifest::from_json(&raw).map_err(|e| e.context(&directory.name))
    }

    async fn read_script(&self, directory: &CapabilityHandle, filename: &str) -> Result<String> {
        let file = self.host.get_file(directory, filename, false).await?;
        self.host.read_text(&file).await
    }

    /// Restore module context for a stored script file
    ///
    /// Only queries permission; never prompts. Returns `None` when the file is
    /// not bound to a module, a record is gone, permission is currently absent,
    /// or the manifest has disappeared. The manifest is always read from disk.
    pub async fn restore_module_binding(&self, file_id: &str) -> Result<Option<RestoredBinding>> {
        let Some(binding) = bindings::get(&self.store, file_id).await? else {
            return Ok(None);
        };
        let Some(directory) = self.handles.get_directory_record(&binding.directory_id).await? else {
            debug!("Binding of {} points at a forgotten directory", file_id);
            return Ok(None);
        };
        let Some(file) = self.handles.get(file_id).await? else {
            return Ok(None);
        };

        match self
            .host
            .query_permission(&directory.handle, AccessMode::Read)
            .await
        {
            Ok(PermissionState::Granted) => {}
            Ok(state) => {
                debug!(
                    "No current access to module directory {} ({:?})",
                    directory.directory_name, state
                );
                return Ok(None);
            }
            Err(SyncError::NotFound(_)) => return Ok(None),
            Err(e) => return Err(e),
        }

        let manifest = match self.read_manifest(&directory.handle).await {
            Ok(manifest) => manifest,
            Err(SyncError::NotFound(msg)) => {
                warn!("Manifest for bound file {} is gone: {}", file_id, msg);
                return Ok(None);
            }
            Err(e) => return Err(e),
        };

        self.handles.touch_directory(&directory.id).await?;
        Ok(Some(RestoredBinding {
            binding,
            file,
            directory,
            manifest,
        }))
    }

    /// Recently used module directories
    pub async fn list_module_directories(&self, limit: usize) -> Result<Vec<DirectoryHandleRecord>> {
        self.handles.list_directories_recent_descending(limit).await
    }

    // ---- sync bookkeeping ----

    /// Record a pull: bump `lastPulledAt` and, if newer, `lastPulledVersion`
    pub async fn update_manifest_after_pull(
        &self,
        directory_id: &str,
        version: Option<u64>,
    ) -> Result<ModuleManifest> {
        self.update_manifest(directory_id, |sync, now| sync.record_pull(now, version))
            .await
    }

    pub async fn update_manifest_after_push(&self, directory_id: &str) -> Result<ModuleManifest> {
        self.update_manifest(directory_id, |sync, now| sync.record_push(now))
            .await
    }

    pub async fn update_manifest_after_commit(&self, directory_id: &str) -> Result<ModuleManifest> {
        self.update_manifest(directory_id, |sync, now| sync.record_commit(now))
            .await
    }

    /// Overwrite the scripts the manifest lists with pulled content, then record the pull
    ///
    /// Pulled scripts the manifest does not list are ignored.
    pub async fn write_pulled_scripts(
        &self,
        directory_id: &str,
        scripts: &ModuleScripts,
        version: Option<u64>,
    ) -> Result<ModuleManifest> {
        let directory = self.writable_directory(directory_id).await?;
        let manifest = self.read_manifest(&directory.handle).await?;

        for (script, entry) in manifest.scripts.entries() {
            match scripts.get(script) {
                Some(source) => {
                    self.write_file(&directory.handle, &entry.filename, &source.content)
                        .await?;
                }
                None => debug!("Pull carried no {} script for {}", script, directory.module_name),
            }
        }
        for script in ScriptType::ALL {
            if scripts.get(script).is_some() && manifest.scripts.get(script).is_none() {
                warn!(
                    "Ignoring pulled {} script for {}: not part of the cloned module",
                    script, directory.module_name
                );
            }
        }

        self.update_manifest_after_pull(directory_id, version).await
    }

    async fn writable_directory(&self, directory_id: &str) -> Result<DirectoryHandleRecord> {
        let directory = self
            .handles
            .get_directory_record(directory_id)
            .await?
            .ok_or_else(|| SyncError::NotFound(format!("module directory {}", directory_id)))?;
        ensure_permission(self.host.as_ref(), &directory.handle, AccessMode::ReadWrite)
            .await
            .map_err(|e| e.context(&directory.directory_name))?;
        Ok(directory)
    }

    async fn update_manifest<F>(&self, directory_id: &str, apply: F) -> Result<ModuleManifest>
    where
        F: FnOnce(&mut SyncTimestamps, DateTime<Utc>),
    {
        let directory = self.writable_directory(directory_id).await?;
        let mut manifest = self.read_manifest(&directory.handle).await?;

        apply(&mut manifest.sync, self.store.now());
        self.write_file(&directory.handle, MANIFEST_FILE, &manifest.to_json()?)
            .await?;
        self.handles.touch_directory(directory_id).await?;

        debug!("Updated sync timestamps of {}", directory.module_name);
        Ok(manifest)
    }
}

fn row_to_repository(row: &libsql::Row) -> Result<RepositoryRecord> {
    let handle: String = row.get(1)?;
    let portals: String = row.get(3)?;
    Ok(RepositoryRecord {
        id: row.get(0)?,
        handle: serde_json::from_str(&handle)?,
        display_name: row.get(2)?,
        portals: serde_json::from_str(&portals)?,
        last_accessed: from_millis(row.get(4)?),
    })
}
