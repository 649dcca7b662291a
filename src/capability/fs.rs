//! Local filesystem capability host
//!
//! Handles carry an absolute path as their locator. Entity identity is the
//! canonical path (plus device and inode on unix), so two handles obtained
//! through different routes to the same file compare equal.

use super::{AccessMode, CapabilityHandle, CapabilityHost, HandleKind, PermissionState};
use crate::error::{Result, SyncError};
use async_trait::async_trait;
use std::collections::{HashMap, VecDeque};
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use tokio::fs;
use tracing::{debug, warn};

/// How the host answers permission requests
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PermissionPolicy {
    /// Every existing path is accessible (CLI use)
    AutoGrant,
    /// Only explicitly granted paths are accessible; requests get the scripted answer
    Explicit(PromptAnswer),
}

/// Scripted user answer to a permission prompt
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PromptAnswer {
    Allow,
    Deny,
}

/// Filesystem-backed [`CapabilityHost`]
pub struct FsHost {
    policy: Mutex<PermissionPolicy>,
    grants: Mutex<HashMap<PathBuf, AccessMode>>,
    directory_picks: Mutex<VecDeque<PathBuf>>,
    file_picks: Mutex<VecDeque<PathBuf>>,
}

impl FsHost {
    pub fn new(policy: PermissionPolicy) -> Self {
        Self {
            policy: Mutex::new(policy),
            grants: Mutex::new(HashMap::new()),
            directory_picks: Mutex::new(VecDeque::new()),
            file_picks: Mutex::new(VecDeque::new()),
        }
    }

    /// Host that grants every existing path
    pub fn auto_grant() -> Self {
        Self::new(PermissionPolicy::AutoGrant)
    }

    /// Change how later permission requests are answered
    pub fn set_policy(&self, policy: PermissionPolicy) {
        *lock(&self.policy) = policy;
    }

    /// Queue the answer for the next directory picker; none queued means dismissal
    pub fn queue_directory_pick(&self, path: impl Into<PathBuf>) {
        lock(&self.directory_picks).push_back(path.into());
    }

    /// Queue the answer for the next file picker
    pub fn queue_file_pick(&self, path: impl Into<PathBuf>) {
        lock(&self.file_picks).push_back(path.into());
    }

    /// Grant access to a path and everything below it
    ///
    /// Blocking; meant for setting up a host before it is used. Grants made
    /// while serving requests go through [`Self::grant_resolved`].
    pub fn grant(&self, path: impl AsRef<Path>, mode: AccessMode) {
        self.insert_grant(normalize(path.as_ref()), mode);
    }

    async fn grant_resolved(&self, locator: &str, mode: AccessMode) {
        let key = fs::canonicalize(locator)
            .await
            .unwrap_or_else(|_| PathBuf::from(locator));
        self.insert_grant(key, mode);
    }

    fn insert_grant(&self, key: PathBuf, mode: AccessMode) {
        let mut grants = lock(&self.grants);
        let merged = match grants.get(&key) {
            Some(AccessMode::ReadWrite) => AccessMode::ReadWrite,
            _ => mode,
        };
        grants.insert(key, merged);
    }

    /// Drop any grant on exactly this path
    pub fn revoke(&self, path: impl AsRef<Path>) {
        lock(&self.grants).remove(&normalize(path.as_ref()));
    }

    /// Build a handle for an existing path without any permission side effects
    pub async fn handle_for(&self, path: impl AsRef<Path>) -> Result<CapabilityHandle> {
        let path = path.as_ref();
        let metadata = fs::metadata(path)
            .await
            .map_err(|e| SyncError::from(e).context(path.display()))?;
        let canonical = fs::canonicalize(path).await?;
        let kind = if metadata.is_dir() {
            HandleKind::Directory
        } else {
            HandleKind::File
        };
        Ok(handle_at(&canonical, kind))
    }

    fn granted_mode(&self, path: &Path) -> Option<AccessMode> {
        let grants = lock(&self.grants);
        let mut best: Option<AccessMode> = None;
        for ancestor in path.ancestors() {
            match grants.get(ancestor) {
                Some(AccessMode::ReadWrite) => return Some(AccessMode::ReadWrite),
                Some(AccessMode::Read) => best = Some(AccessMode::Read),
                None => {}
            }
        }
        best
    }

    async fn check_access(&self, handle: &CapabilityHandle, mode: AccessMode) -> Result<()> {
        match self.query_permission(handle, mode).await? {
            PermissionState::Granted => Ok(()),
            _ => Err(SyncError::PermissionDenied(format!(
                "no {} access to {}",
                mode_label(mode),
                handle.locator
            ))),
        }
    }
}

impl Default for FsHost {
    fn default() -> Self {
        Self::auto_grant()
    }
}

#[async_trait]
impl CapabilityHost for FsHost {
    async fn is_same_entry(&self, a: &CapabilityHandle, b: &CapabilityHandle) -> Result<bool> {
        if a.kind != b.kind {
            return Ok(false);
        }

        let left = fs::canonicalize(&a.locator).await?;
        let right = fs::canonicalize(&b.locator).await?;
        if left == right {
            return Ok(true);
        }

        same_inode(&left, &right).await
    }

    async fn query_permission(
        &self,
        handle: &CapabilityHandle,
        mode: AccessMode,
    ) -> Result<PermissionState> {
        let path = PathBuf::from(&handle.locator);
        let metadata = match fs::metadata(&path).await {
            Ok(metadata) => metadata,
            // Stale handle: the entry is gone, nothing to grant
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Ok(PermissionState::Denied)
            }
            Err(e) => return Err(e.into()),
        };

        if mode == AccessMode::ReadWrite && metadata.permissions().readonly() {
            return Ok(PermissionState::Denied);
        }

        let policy = *lock(&self.policy);
        let state = match policy {
            PermissionPolicy::AutoGrant => PermissionState::Granted,
            PermissionPolicy::Explicit(_) => match (self.granted_mode(&path), mode) {
                (Some(AccessMode::ReadWrite), _) => PermissionState::Granted,
                (Some(AccessMode::Read), AccessMode::Read) => PermissionState::Granted,
                _ => PermissionState::Prompt,
            },
        };
        Ok(state)
    }

    async fn request_permission(
        &self,
        handle: &CapabilityHandle,
        mode: AccessMode,
    ) -> Result<PermissionState> {
        let current = self.query_permission(handle, mode).await?;
        if current != PermissionState::Prompt {
            return Ok(current);
        }

        let policy = *lock(&self.policy);
        match policy {
            PermissionPolicy::AutoGrant | PermissionPolicy::Explicit(PromptAnswer::Allow) => {
                debug!("Granting {} access to {}", mode_label(mode), handle.locator);
                self.grant_resolved(&handle.locator, mode).await;
                Ok(PermissionState::Granted)
            }
            PermissionPolicy::Explicit(PromptAnswer::Deny) => Ok(PermissionState::Denied),
        }
    }

    async fn pick_directory(&self) -> Result<CapabilityHandle> {
        let picked = lock(&self.directory_picks).pop_front();
        let Some(path) = picked else {
            return Err(SyncError::UserCancelled);
        };

        fs::create_dir_all(&path).await?;
        let handle = self.handle_for(&path).await?;
        if !handle.is_directory() {
            return Err(SyncError::NotFound(format!(
                "{} is not a directory",
                path.display()
            )));
        }
        // Picking through the dialog implies consent for the picked tree
        self.grant_resolved(&handle.locator, AccessMode::ReadWrite)
            .await;
        Ok(handle)
    }

    async fn pick_file(&self) -> Result<CapabilityHandle> {
        let picked = lock(&self.file_picks).pop_front();
        let Some(path) = picked else {
            return Err(SyncError::UserCancelled);
        };

        let handle = self.handle_for(&path).await?;
        if handle.is_directory() {
            return Err(SyncError::NotFound(format!("{} is a directory", path.display())));
        }
        self.grant_resolved(&handle.locator, AccessMode::ReadWrite)
            .await;
        Ok(handle)
    }

    async fn get_directory(
        &self,
        parent: &CapabilityHandle,
        name: &str,
        create: bool,
    ) -> Result<CapabilityHandle> {
        let path = child_path(parent, name)?;
        if create {
            self.check_access(parent, AccessMode::ReadWrite).await?;
            fs::create_dir_all(&path)
                .await
                .map_err(|e| SyncError::from(e).context(path.display()))?;
        } else {
            self.check_access(parent, AccessMode::Read).await?;
        }

        match fs::metadata(&path).await {
            Ok(metadata) if metadata.is_dir() => Ok(handle_at(&path, HandleKind::Directory)),
            Ok(_) => Err(SyncError::StorageFailure(format!(
                "{} exists and is not a directory",
                path.display()
            ))),
            Err(e) => Err(SyncError::from(e).context(path.display())),
        }
    }

    async fn get_file(
        &self,
        parent: &CapabilityHandle,
        name: &str,
        create: bool,
    ) -> Result<CapabilityHandle> {
        let path = child_path(parent, name)?;
        match fs::metadata(&path).await {
            Ok(metadata) if metadata.is_file() => {
                self.check_access(parent, AccessMode::Read).await?;
                Ok(handle_at(&path, HandleKind::File))
            }
            Ok(_) => Err(SyncError::StorageFailure(format!(
                "{} exists and is not a file",
                path.display()
            ))),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound && create => {
                self.check_access(parent, AccessMode::ReadWrite).await?;
                fs::write(&path, "")
                    .await
                    .map_err(|e| SyncError::from(e).context(path.display()))?;
                Ok(handle_at(&path, HandleKind::File))
            }
            Err(e) => Err(SyncError::from(e).context(path.display())),
        }
    }

    async fn read_text(&self, file: &CapabilityHandle) -> Result<String> {
        self.check_access(file, AccessMode::Read).await?;
        fs::read_to_string(&file.locator)
            .await
            .map_err(|e| SyncError::from(e).context(&file.locator))
    }

    async fn write_text(&self, file: &CapabilityHandle, contents: &str) -> Result<()> {
        self.check_access(file, AccessMode::ReadWrite).await?;
        fs::write(&file.locator, contents)
            .await
            .map_err(|e| SyncError::from(e).context(&file.locator))
    }

    async fn remove_entry(&self, parent: &CapabilityHandle, name: &str) -> Result<()> {
        self.check_access(parent, AccessMode::ReadWrite).await?;
        let path = child_path(parent, name)?;
        let metadata = fs::metadata(&path)
            .await
            .map_err(|e| SyncError::from(e).context(path.display()))?;
        if metadata.is_dir() {
            fs::remove_dir_all(&path).await?;
        } else {
            fs::remove_file(&path).await?;
        }
        Ok(())
    }
}

fn lock<T>(mutex: &Mutex<T>) -> std::sync::MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| {
        warn!("Capability host lock poisoned; continuing with inner state");
        poisoned.into_inner()
    })
}

fn handle_at(path: &Path, kind: HandleKind) -> CapabilityHandle {
    CapabilityHandle {
        kind,
        name: path
            .file_name()
            .map(|n| n.to_string_lossy().to_string())
            .unwrap_or_else(|| path.display().to_string()),
        locator: path.to_string_lossy().to_string(),
    }
}

fn child_path(parent: &CapabilityHandle, name: &str) -> Result<PathBuf> {
    if !parent.is_directory() {
        return Err(SyncError::NotFound(format!(
            "{} is not a directory",
            parent.locator
        )));
    }
    if name.is_empty() || name == "." || name == ".." || name.contains(['/', '\\']) {
        return Err(SyncError::NotFound(format!("invalid entry name '{}'", name)));
    }
    Ok(Path::new(&parent.locator).join(name))
}

fn normalize(path: &Path) -> PathBuf {
    std::fs::canonicalize(path).unwrap_or_else(|_| path.to_path_buf())
}

fn mode_label(mode: AccessMode) -> &'static str {
    match mode {
        AccessMode::Read => "read",
        AccessMode::ReadWrite => "write",
    }
}

#[cfg(unix)]
async fn same_inode(a: &Path, b: &Path) -> Result<bool> {
    use std::os::unix::fs::MetadataExt;

    let left = fs::metadata(a).await?;
    let right = fs::metadata(b).await?;
    Ok(left.dev() == right.dev() && left.ino() == right.ino())
}

#[cfg(not(unix))]
async fn same_inode(_a: &Path, _b: &Path) -> Result<bool> {
    Ok(false)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[tokio::test]
    async fn test_same_entry_through_different_routes() {
        let dir = TempDir::new().unwrap();
        std::fs::create_dir(dir.path().join("sub")).unwrap();
        std::fs::write(dir.path().join("sub/a.groovy"), "x").unwrap();

        let host = FsHost::auto_grant();
        let direct = host.handle_for(dir.path().join("sub/a.groovy")).await.unwrap();
        let roundabout = CapabilityHandle {
            kind: HandleKind::File,
            name: "a.groovy".into(),
            locator: dir.path().join("sub/../sub/a.groovy").display().to_string(),
        };

        assert!(host.is_same_entry(&direct, &roundabout).await.unwrap());
    }

    #[tokio::test]
    async fn test_different_kinds_are_never_same() {
        let dir = TempDir::new().unwrap();
        let host = FsHost::auto_grant();
        let as_dir = host.handle_for(dir.path()).await.unwrap();
        let mut as_file = as_dir.clone();
        as_file.kind = HandleKind::File;

        assert!(!host.is_same_entry(&as_dir, &as_file).await.unwrap());
    }

    #[tokio::test]
    async fn test_explicit_policy_requires_grant() {
        let dir = TempDir::new().unwrap();
        let host = FsHost::new(PermissionPolicy::Explicit(PromptAnswer::Deny));
        let handle = host.handle_for(dir.path()).await.unwrap();

        assert_eq!(
            host.query_permission(&handle, AccessMode::Read).await.unwrap(),
            PermissionState::Prompt
        );
        assert_eq!(
            host.request_permission(&handle, AccessMode::Read).await.unwrap(),
            PermissionState::Denied
        );

        host.set_policy(PermissionPolicy::Explicit(PromptAnswer::Allow));
        assert_eq!(
            host.request_permission(&handle, AccessMode::ReadWrite).await.unwrap(),
            PermissionState::Granted
        );

        let child = host.get_directory(&handle, "nested", true).await.unwrap();
        assert_eq!(
            host.query_permission(&child, AccessMode::ReadWrite).await.unwrap(),
            PermissionState::Granted
        );

        host.revoke(dir.path());
        assert_eq!(
            host.query_permission(&child, AccessMode::Read).await.unwrap(),
            PermissionState::Prompt
        );
    }

    #[tokio::test]
    async fn test_empty_picker_queue_is_cancellation() {
        let host = FsHost::auto_grant();
        let err = host.pick_directory().await.unwrap_err();
        assert!(err.is_cancelled());
    }

    #[tokio::test]
    async fn test_missing_child_without_create_is_not_found() {
        let dir = TempDir::new().unwrap();
        let host = FsHost::auto_grant();
        let root = host.handle_for(dir.path()).await.unwrap();

        let err = host.get_directory(&root, "absent", false).await.unwrap_err();
        assert_eq!(err.kind(), crate::error::ErrorKind::NotFound);

        let err = host.get_file(&root, "absent.groovy", false).await.unwrap_err();
        assert_eq!(err.kind(), crate::error::ErrorKind::NotFound);
    }

    #[tokio::test]
    async fn test_kind_conflict_is_storage_failure() {
        let dir = TempDir::new().unwrap();
        std::fs::create_dir(dir.path().join("ad.groovy")).unwrap();
        std::fs::write(dir.path().join("datasources"), "not a directory").unwrap();
        let host = FsHost::auto_grant();
        let root = host.handle_for(dir.path()).await.unwrap();

        let err = host.get_file(&root, "ad.groovy", true).await.unwrap_err();
        assert_eq!(err.kind(), crate::error::ErrorKind::StorageFailure);
        assert!(err.to_string().contains("ad.groovy"));

        let err = host.get_directory(&root, "datasources", true).await.unwrap_err();
        assert_eq!(err.kind(), crate::error::ErrorKind::StorageFailure);
    }

    #[tokio::test]
    async fn test_write_then_read_text() {
        let dir = TempDir::new().unwrap();
        let host = FsHost::auto_grant();
        let root = host.handle_for(dir.path()).await.unwrap();

        let file = host.get_file(&root, "collection.groovy", true).await.unwrap();
        host.write_text(&file, "println 'hi'").await.unwrap();
        assert_eq!(host.read_text(&file).await.unwrap(), "println 'hi'");

        host.remove_entry(&root, "collection.groovy").await.unwrap();
        assert!(host.read_text(&file).await.is_err());
    }
}
