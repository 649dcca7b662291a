//! Capability handles and the host layer that interprets them
//!
//! A [`CapabilityHandle`] is an opaque, revocable reference to one file or
//! directory. Only a [`CapabilityHost`] knows how to resolve it, compare two
//! handles for entity identity, check or request access, and perform I/O.
//! Stores persist handles verbatim and never look inside `locator`.

pub mod fs;

use crate::error::Result;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

pub use fs::{FsHost, PermissionPolicy, PromptAnswer};

/// File or directory
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum HandleKind {
    File,
    Directory,
}

/// Opaque reference granted by the host to a single file or directory
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CapabilityHandle {
    pub kind: HandleKind,

    /// Entry name as the host reports it (file or directory name)
    pub name: String,

    /// Host-specific locator; meaningless outside the host that issued it
    pub locator: String,
}

impl CapabilityHandle {
    pub fn is_directory(&self) -> bool {
        self.kind == HandleKind::Directory
    }
}

/// Access level asked of the host
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AccessMode {
    Read,
    ReadWrite,
}

/// Host answer to a permission query or request
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PermissionState {
    Granted,
    /// Not granted, but a request from a user gesture may succeed
    Prompt,
    Denied,
}

/// Host environment capabilities
///
/// Every method may suspend; pickers and permission requests may require a live
/// user gesture. A dismissed picker is reported as `SyncError::UserCancelled`.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait CapabilityHost: Send + Sync {
    /// Whether both handles refer to the same underlying entity
    async fn is_same_entry(&self, a: &CapabilityHandle, b: &CapabilityHandle) -> Result<bool>;

    /// Current permission, never prompting
    async fn query_permission(
        &self,
        handle: &CapabilityHandle,
        mode: AccessMode,
    ) -> Result<PermissionState>;

    /// Ask the user for permission (requires a user gesture on interactive hosts)
    async fn request_permission(
        &self,
        handle: &CapabilityHandle,
        mode: AccessMode,
    ) -> Result<PermissionState>;

    /// Show the directory picker
    async fn pick_directory(&self) -> Result<CapabilityHandle>;

    /// Show the file picker
    async fn pick_file(&self) -> Result<CapabilityHandle>;

    /// Resolve a child directory, creating it when `create` is set
    async fn get_directory(
        &self,
        parent: &CapabilityHandle,
        name: &str,
        create: bool,
    ) -> Result<CapabilityHandle>;

    /// Resolve a child file, creating an empty one when `create` is set
    async fn get_file(
        &self,
        parent: &CapabilityHandle,
        name: &str,
        create: bool,
    ) -> Result<CapabilityHandle>;

    async fn read_text(&self, file: &CapabilityHandle) -> Result<String>;

    async fn write_text(&self, file: &CapabilityHandle, contents: &str) -> Result<()>;

    /// Remove a child entry of a directory
    async fn remove_entry(&self, parent: &CapabilityHandle, name: &str) -> Result<()>;
}

/// Query permission and, if it is not already granted, request it
///
/// Only call this from a flow started by a user action.
pub async fn ensure_permission(
    host: &dyn CapabilityHost,
    handle: &CapabilityHandle,
    mode: AccessMode,
) -> Result<()> {
    if host.query_permission(handle, mode).await? == PermissionState::Granted {
        return Ok(());
    }

    match host.request_permission(handle, mode).await? {
        PermissionState::Granted => Ok(()),
        _ => Err(crate::error::SyncError::PermissionDenied(format!(
            "access to '{}' was not granted",
            handle.name
        ))),
    }
}
