//! modsync - Document & Module Synchronization Layer
//!
//! Keeps track of where open documents came from and whether they have
//! unsaved changes:
//! - Persistent, deduplicated capability handles to local files and directories
//! - Module repositories: clone portal modules into a git-friendly tree with manifests
//! - Dirty-state resolution against local and portal baselines
//! - Recent-documents history and crash-recovery tab drafts
//! - Retention sweeps bounding every history store
//!
//! # Architecture
//!
//! - **Capability**: opaque handles plus the host that resolves them (`FsHost`)
//! - **Storage**: one owned libSQL store, migrated once at open
//! - **Components**: `HandleStore`, `ModuleRepository`, `RecentDocumentsIndex`,
//!   `RetentionPolicy`, `TabDraftPersistence`, wired together by `DocumentSession`
//!
//! # Example
//!
//! ```ignore
//! use modsync_core::{DocumentSession, FsHost, SyncConfig};
//! use std::sync::Arc;
//!
//! #[tokio::main]
//! async fn main() -> modsync_core::Result<()> {
//!     let config = SyncConfig::default();
//!     let session = DocumentSession::open(&config, Arc::new(FsHost::auto_grant())).await?;
//!
//!     let repo = session.repository().pick_or_create_repository().await?;
//!     for doc in session.recent().list(10).await? {
//!         println!("{} ({:?})", doc.display_name, doc.kind);
//!     }
//!     Ok(())
//! }
//! ```

pub mod capability;
pub mod config;
pub mod drafts;
pub mod error;
pub mod handles;
pub mod recent;
pub mod repository;
pub mod retention;
pub mod session;
pub mod storage;
pub mod sync_state;
pub mod types;

// Re-export commonly used types
pub use capability::{
    AccessMode, CapabilityHandle, CapabilityHost, FsHost, HandleKind, PermissionPolicy,
    PermissionState, PromptAnswer,
};
pub use config::{ConfigError, RetentionConfig, RetentionLimits, SyncConfig};
pub use drafts::{DraftSnapshot, TabDraft, TabDraftPersistence};
pub use error::{ErrorKind, ErrorReport, Result, SyncError};
pub use handles::{DirectoryHandleRecord, DirectoryMeta, HandleRecord, HandleStore};
pub use recent::{RecentDocument, RecentDocumentsIndex, RecentKind};
pub use repository::{
    CloneOptions, CloneOutcome, CloneReport, LoadedModule, ModuleBinding, ModuleManifest,
    ModuleMetadata, ModuleRepository, ModuleScripts, ModuleSnapshot, PerScriptIds,
    RepositoryRecord, RestoredBinding, ScriptSource,
};
pub use retention::{RetentionPolicy, SweepReport};
pub use session::{DocumentSession, OpenedDocument};
pub use storage::{BoundedStore, Clock, ConnectionMode, ManualClock, SyncStore, SystemClock};
pub use sync_state::{
    ClosePrompt, CloseAction, DirtyState, DocumentPlane, LocalBaseline, PortalBaseline,
};
pub use types::{ModuleType, PortalRef, ScriptLanguage, ScriptType};
