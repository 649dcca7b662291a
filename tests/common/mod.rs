//! Common test utilities and helpers
#![allow(dead_code)]

use modsync_core::storage::test_utils::create_test_store_with_clock;
use modsync_core::{
    DocumentSession, FsHost, ManualClock, ModuleMetadata, ModuleScripts, ModuleSnapshot,
    ModuleType, PortalRef, ScriptLanguage, ScriptSource, SyncConfig, SyncStore,
};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tempfile::TempDir;

pub const PORTAL_HOST: &str = "acme.logicmonitor.com";

/// Filesystem sandbox, host, store and session wired together
pub struct TestEnv {
    // Removed on drop
    pub dir: TempDir,
    pub host: Arc<FsHost>,
    pub store: Arc<SyncStore>,
    pub clock: Arc<ManualClock>,
    pub session: DocumentSession,
}

impl TestEnv {
    pub fn root(&self) -> &Path {
        self.dir.path()
    }

    /// Create a file (and its parent directories) below the sandbox root
    pub fn write_file(&self, relative: &str, contents: &str) -> PathBuf {
        let path = self.root().join(relative);
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).expect("Failed to create parent dir");
        }
        std::fs::write(&path, contents).expect("Failed to write test file");
        path
    }

    /// Create a directory below the sandbox root
    pub fn mkdir(&self, relative: &str) -> PathBuf {
        let path = self.root().join(relative);
        std::fs::create_dir_all(&path).expect("Failed to create test dir");
        path
    }
}

/// Test environment with default limits and inline sweeps
pub async fn test_env() -> TestEnv {
    test_env_with(SyncConfig::default()).await
}

pub async fn test_env_with(mut config: SyncConfig) -> TestEnv {
    config.retention = config.retention.inline();
    let dir = TempDir::new().expect("Failed to create temp dir");
    let (store, clock) = create_test_store_with_clock()
        .await
        .expect("Failed to create test store");
    let host = Arc::new(FsHost::auto_grant());
    let session = DocumentSession::new(store.clone(), host.clone(), &config);

    TestEnv {
        dir,
        host,
        store,
        clock,
        session,
    }
}

pub fn portal() -> PortalRef {
    PortalRef::new("portal-1", PORTAL_HOST)
}

pub fn datasource(name: &str) -> ModuleSnapshot {
    ModuleSnapshot {
        id: 1201,
        module_type: ModuleType::DataSource,
        name: name.to_string(),
        display_name: None,
        lineage_id: None,
        metadata: ModuleMetadata {
            applies_to: Some("isLinux()".to_string()),
            collect_interval: Some(300),
            ..Default::default()
        },
        version: Some(3),
    }
}

pub fn groovy(content: &str) -> ScriptSource {
    ScriptSource {
        language: ScriptLanguage::Groovy,
        content: content.to_string(),
    }
}

pub fn collection_only(content: &str) -> ModuleScripts {
    ModuleScripts {
        collection: Some(groovy(content)),
        ad: None,
    }
}

pub fn both_scripts(collection: &str, ad: &str) -> ModuleScripts {
    ModuleScripts {
        collection: Some(groovy(collection)),
        ad: Some(groovy(ad)),
    }
}
