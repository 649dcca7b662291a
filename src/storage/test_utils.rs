//! Test utilities for storage initialization

use crate::error::Result;
use crate::storage::clock::ManualClock;
use crate::storage::libsql::SyncStore;
use crate::storage::ConnectionMode;
use chrono::{DateTime, TimeZone, Utc};
use std::path::Path;
use std::sync::Arc;

/// Fixed starting instant for manual clocks in tests
pub fn test_epoch() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 3, 1, 12, 0, 0)
        .single()
        .unwrap_or_else(Utc::now)
}

/// In-memory store with migrations applied
pub async fn create_test_store() -> Result<Arc<SyncStore>> {
    Ok(Arc::new(SyncStore::in_memory().await?))
}

/// In-memory store driven by a manual clock starting at [`test_epoch`]
pub async fn create_test_store_with_clock() -> Result<(Arc<SyncStore>, Arc<ManualClock>)> {
    let clock = Arc::new(ManualClock::new(test_epoch()));
    let store = SyncStore::open_with_clock(ConnectionMode::InMemory, clock.clone()).await?;
    Ok((Arc::new(store), clock))
}

/// Superseded combined schema, used to exercise the legacy import migration
pub const LEGACY_SCHEMA: &str = r#"
CREATE TABLE repositories_v0 (
    id TEXT PRIMARY KEY NOT NULL,
    handle TEXT NOT NULL,
    name TEXT NOT NULL,
    portals TEXT,
    last_accessed INTEGER NOT NULL
);
CREATE TABLE module_files_v0 (
    file_id TEXT PRIMARY KEY NOT NULL,
    handle TEXT NOT NULL,
    file_name TEXT NOT NULL,
    repository_id TEXT NOT NULL,
    module_path TEXT NOT NULL,
    last_accessed INTEGER NOT NULL
);
"#;

/// Create a database file holding only the legacy schema with one row per table
pub async fn seed_legacy_database(path: &Path) -> Result<()> {
    let db = ::libsql::Builder::new_local(path).build().await?;
    let conn = db.connect()?;
    conn.execute_batch(LEGACY_SCHEMA).await?;

    let repo_handle = r#"{"kind":"directory","name":"modules","locator":"/tmp/modules"}"#;
    let file_handle =
        r#"{"kind":"file","name":"collection.groovy","locator":"/tmp/modules/collection.groovy"}"#;
    conn.execute(
        "INSERT INTO repositories_v0 (id, handle, name, portals, last_accessed) VALUES (?, ?, ?, ?, ?)",
        ::libsql::params!["repo-legacy", repo_handle, "modules", r#"["acme.example.com"]"#, 1_i64],
    )
    .await?;
    conn.execute(
        "INSERT INTO module_files_v0 (file_id, handle, file_name, repository_id, module_path, last_accessed) VALUES (?, ?, ?, ?, ?, ?)",
        ::libsql::params![
            "file-legacy",
            file_handle,
            "collection.groovy",
            "repo-legacy",
            "acme.example.com/datasources/CPU/",
            2_i64
        ],
    )
    .await?;
    Ok(())
}
