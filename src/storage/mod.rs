//! Storage layer for the synchronization layer
//!
//! Provides the owned [`SyncStore`] plus the table vocabulary shared by the
//! components that keep records in it.

pub mod clock;
pub mod libsql;
pub mod test_utils;

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

pub use self::clock::{Clock, ManualClock, SystemClock};
pub use self::libsql::{SyncStore, SCHEMA_VERSION};

/// Database connection mode
#[derive(Debug, Clone)]
pub enum ConnectionMode {
    /// Local file-based database
    Local(PathBuf),
    /// In-memory database (for testing)
    InMemory,
}

/// Tables holding capability handles
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HandleTable {
    Files,
    Directories,
    Repositories,
}

impl HandleTable {
    pub fn table(&self) -> &'static str {
        match self {
            HandleTable::Files => "file_handles",
            HandleTable::Directories => "directory_handles",
            HandleTable::Repositories => "repositories",
        }
    }
}

/// Stores subject to retention limits
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BoundedStore {
    FileHandles,
    DirectoryHandles,
    RecentDocuments,
}

impl BoundedStore {
    pub const ALL: [BoundedStore; 3] = [
        BoundedStore::FileHandles,
        BoundedStore::DirectoryHandles,
        BoundedStore::RecentDocuments,
    ];

    pub fn table(&self) -> &'static str {
        match self {
            BoundedStore::FileHandles => "file_handles",
            BoundedStore::DirectoryHandles => "directory_handles",
            BoundedStore::RecentDocuments => "recent_documents",
        }
    }

    /// Primary key column of the table
    pub fn key_column(&self) -> &'static str {
        match self {
            BoundedStore::FileHandles | BoundedStore::DirectoryHandles => "id",
            BoundedStore::RecentDocuments => "dedupe_key",
        }
    }
}

impl std::fmt::Display for BoundedStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.table())
    }
}

pub(crate) const KNOWN_TABLES: &[&str] = &[
    "file_handles",
    "directory_handles",
    "repositories",
    "module_bindings",
    "recent_documents",
    "tab_drafts",
];
