//! LibSQL-backed store shared by every component
//!
//! One [`SyncStore`] is constructed explicitly at startup and handed to each
//! component. Opening it validates the database, runs a health check and
//! applies pending migrations exactly once.
//!
//! The store owns a single connection behind an async mutex. Every statement
//! and every transaction runs while holding it, so concurrent callers are
//! serialized and a transaction never picks up another caller's statements.

use super::clock::{Clock, SystemClock};
use super::{ConnectionMode, HandleTable};
use crate::capability::CapabilityHandle;
use crate::error::{Result, SyncError};
use chrono::{DateTime, TimeZone, Utc};
use libsql::{params, Builder, Connection, Database};
use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::Arc;
use tokio::sync::{Mutex, MutexGuard};
use tracing::{debug, info, warn};

/// Schema version written by the newest migration
pub const SCHEMA_VERSION: i64 = 2;

enum Migration {
    Sql(&'static str),
    LegacyImport,
}

const MIGRATIONS: &[(&str, Migration)] = &[
    (
        "001_initial_schema.sql",
        Migration::Sql(include_str!("../../migrations/libsql/001_initial_schema.sql")),
    ),
    ("002_legacy_import", Migration::LegacyImport),
];

/// Parse SQL file into individual statements, handling multi-line constructs like triggers
fn parse_sql_statements(sql: &str) -> Vec<String> {
    let mut statements = Vec::new();
    let mut current = String::new();
    let mut depth: i32 = 0;

    for line in sql.lines() {
        let trimmed = line.trim();

        if current.is_empty() && (trimmed.is_empty() || trimmed.starts_with("--")) {
            continue;
        }

        if !current.is_empty() {
            current.push('\n');
        }
        current.push_str(line);

        let upper = trimmed.to_uppercase();
        if upper.starts_with("BEGIN") || upper.contains(" BEGIN") {
            depth += 1;
        }
        if upper.starts_with("END") {
            depth = depth.saturating_sub(1);
        }

        if trimmed.ends_with(';') && depth == 0 {
            statements.push(current.clone());
            current.clear();
        }
    }

    if !current.trim().is_empty() {
        statements.push(current);
    }

    statements
}

/// Persistent store for handles, bindings, recent documents and drafts
pub struct SyncStore {
    // Kept alive for the lifetime of the connection
    _db: Database,
    conn: Mutex<Connection>,
    clock: Arc<dyn Clock>,
    last_stamp: AtomicI64,
}

impl SyncStore {
    /// Open (creating if missing) a store with the wall clock
    pub async fn open(mode: ConnectionMode) -> Result<Self> {
        Self::open_with_clock(mode, Arc::new(SystemClock)).await
    }

    /// Open an in-memory store
    pub async fn in_memory() -> Result<Self> {
        Self::open(ConnectionMode::InMemory).await
    }

    /// Open a store with an explicit time source
    pub async fn open_with_clock(mode: ConnectionMode, clock: Arc<dyn Clock>) -> Result<Self> {
        info!("Opening sync store: {:?}", mode);

        let db = match &mode {
            ConnectionMode::Local(path) => {
                Self::validate_database_file(path)?;
                if let Some(parent) = path.parent() {
                    if !parent.as_os_str().is_empty() {
                        std::fs::create_dir_all(parent).map_err(|e| {
                            SyncError::StorageFailure(format!(
                                "Failed to create database directory {}: {}",
                                parent.display(),
                                e
                            ))
                        })?;
                    }
                }
                Builder::new_local(path).build().await.map_err(|e| {
                    SyncError::StorageFailure(format!("Failed to open local database: {}", e))
                })?
            }
            // libSQL gives each connection to :memory: its own database, so the
            // store holds exactly one connection for its whole lifetime
            ConnectionMode::InMemory => Builder::new_local(":memory:").build().await.map_err(|e| {
                SyncError::StorageFailure(format!("Failed to create in-memory database: {}", e))
            })?,
        };

        let conn = db
            .connect()
            .map_err(|e| SyncError::StorageFailure(format!("Failed to get connection: {}", e)))?;

        let store = Self {
            _db: db,
            conn: Mutex::new(conn),
            clock,
            last_stamp: AtomicI64::new(0),
        };

        store.verify_database_health().await?;
        store.run_migrations().await?;

        Ok(store)
    }

    /// Reject files that exist but are not SQLite databases
    fn validate_database_file(path: &std::path::Path) -> Result<()> {
        use std::io::Read;

        if !path.exists() {
            return Ok(());
        }

        let mut header = [0u8; 16];
        let read = std::fs::File::open(path)
            .and_then(|mut f| f.read(&mut header))
            .map_err(|e| {
                SyncError::StorageFailure(format!(
                    "Cannot read database file at '{}': {}",
                    path.display(),
                    e
                ))
            })?;

        // Zero-length files are left behind by interrupted first opens
        if read == 0 {
            return Ok(());
        }

        if read < 16 || &header != b"SQLite format 3\0" {
            return Err(SyncError::StorageFailure(format!(
                "Database file at '{}' is corrupted or not a valid SQLite database",
                path.display()
            )));
        }

        debug!("Database file validation passed: {}", path.display());
        Ok(())
    }

    async fn verify_database_health(&self) -> Result<()> {
        let conn = self.conn.lock().await;
        conn.query("SELECT 1", params![]).await.map_err(|e| {
            SyncError::StorageFailure(format!(
                "Database corruption detected or invalid database file: {}",
                e
            ))
        })?;

        let write_test = r#"
            CREATE TABLE IF NOT EXISTS _health_check (id INTEGER PRIMARY KEY);
            DROP TABLE IF EXISTS _health_check;
        "#;
        if let Err(e) = conn.execute_batch(write_test).await {
            let msg = e.to_string().to_lowercase();
            if msg.contains("readonly") || msg.contains("read-only") || msg.contains("permission") {
                return Err(SyncError::PermissionDenied(format!(
                    "Database is read-only or lacks write permissions: {}",
                    e
                )));
            }
            return Err(SyncError::StorageFailure(format!(
                "Database write test failed: {}",
                e
            )));
        }

        debug!("Database health check passed");
        Ok(())
    }

    /// Apply pending migrations, recording each one in `_migrations_applied`
    pub async fn run_migrations(&self) -> Result<()> {
        let conn = self.conn.lock().await;

        conn.execute(
            "CREATE TABLE IF NOT EXISTS _migrations_applied (
                migration_name TEXT PRIMARY KEY,
                applied_at INTEGER NOT NULL
            )",
            params![],
        )
        .await
        .map_err(|e| {
            SyncError::StorageFailure(format!("Failed to create migrations table: {}", e))
        })?;

        for (name, migration) in MIGRATIONS {
            let mut rows = conn
                .query(
                    "SELECT COUNT(*) FROM _migrations_applied WHERE migration_name = ?",
                    params![*name],
                )
                .await?;
            let applied = match rows.next().await? {
                Some(row) => row.get::<i64>(0)?,
                None => 0,
            };
            if applied > 0 {
                debug!("Skipping already applied migration: {}", name);
                continue;
            }

            match migration {
                Migration::Sql(sql) => {
                    let statements = parse_sql_statements(sql);
                    debug!("Parsed {} statements from {}", statements.len(), name);
                    for (i, statement) in statements.iter().enumerate() {
                        conn.execute(statement.trim(), params![]).await.map_err(|e| {
                            SyncError::StorageFailure(format!(
                                "Failed to execute statement #{} in {}: {}",
                                i + 1,
                                name,
                                e
                            ))
                        })?;
                    }
                }
                Migration::LegacyImport => import_legacy_schema(&conn).await?,
            }

            conn.execute(
                "INSERT INTO _migrations_applied (migration_name, applied_at) VALUES (?, ?)",
                params![*name, Utc::now().timestamp()],
            )
            .await?;

            info!("Executed migration: {}", name);
        }

        conn.execute(
            "UPDATE metadata SET value = ? WHERE key = 'schema_version'",
            params![SCHEMA_VERSION.to_string()],
        )
        .await?;

        Ok(())
    }

    /// Schema version recorded in the metadata table
    pub async fn schema_version(&self) -> Result<i64> {
        let conn = self.conn.lock().await;
        let mut rows = conn
            .query(
                "SELECT value FROM metadata WHERE key = 'schema_version'",
                params![],
            )
            .await?;
        let row = rows
            .next()
            .await?
            .ok_or_else(|| SyncError::NotFound("schema_version".to_string()))?;
        let value: String = row.get(0)?;
        value
            .parse()
            .map_err(|_| SyncError::StorageFailure(format!("Invalid schema version: {}", value)))
    }

    /// Exclusive access to the connection until the guard is dropped
    ///
    /// Callers must not call back into other locking store methods while
    /// holding the guard.
    pub(crate) async fn conn(&self) -> MutexGuard<'_, Connection> {
        self.conn.lock().await
    }

    /// Current time from the store's clock
    pub fn now(&self) -> DateTime<Utc> {
        self.clock.now()
    }

    /// Strictly increasing millisecond timestamp for recency columns
    pub fn stamp(&self) -> i64 {
        let now = self.clock.now().timestamp_millis();
        let mut prev = self.last_stamp.load(Ordering::SeqCst);
        loop {
            let next = now.max(prev + 1);
            match self
                .last_stamp
                .compare_exchange(prev, next, Ordering::SeqCst, Ordering::SeqCst)
            {
                Ok(_) => return next,
                Err(actual) => prev = actual,
            }
        }
    }

    /// All handles in a table, most recently accessed first
    pub(crate) async fn load_handles(
        &self,
        table: HandleTable,
    ) -> Result<Vec<(String, CapabilityHandle)>> {
        let sql = format!(
            "SELECT id, handle FROM {} ORDER BY last_accessed DESC",
            table.table()
        );
        let conn = self.conn.lock().await;
        let mut rows = conn.query(&sql, params![]).await?;

        let mut handles = Vec::new();
        while let Some(row) = rows.next().await? {
            let id: String = row.get(0)?;
            let raw: String = row.get(1)?;
            match serde_json::from_str::<CapabilityHandle>(&raw) {
                Ok(handle) => handles.push((id, handle)),
                Err(e) => warn!("Skipping unreadable handle {} in {}: {}", id, table.table(), e),
            }
        }
        Ok(handles)
    }

    /// Refresh a record's recency; returns whether it existed
    pub(crate) async fn touch(&self, table: HandleTable, id: &str) -> Result<bool> {
        let sql = format!("UPDATE {} SET last_accessed = ? WHERE id = ?", table.table());
        let stamp = self.stamp();
        let changed = self.conn.lock().await.execute(&sql, params![stamp, id]).await?;
        Ok(changed > 0)
    }

    /// Delete a record by id; returns whether it existed
    pub(crate) async fn delete(&self, table: HandleTable, id: &str) -> Result<bool> {
        let sql = format!("DELETE FROM {} WHERE id = ?", table.table());
        let changed = self.conn.lock().await.execute(&sql, params![id]).await?;
        Ok(changed > 0)
    }

    /// Number of rows in a table
    pub async fn count(&self, table: &str) -> Result<usize> {
        if !super::KNOWN_TABLES.contains(&table) {
            return Err(SyncError::NotFound(format!("unknown table '{}'", table)));
        }
        let sql = format!("SELECT COUNT(*) FROM {}", table);
        let conn = self.conn.lock().await;
        let mut rows = conn.query(&sql, params![]).await?;
        Ok(match rows.next().await? {
            Some(row) => row.get::<i64>(0)? as usize,
            None => 0,
        })
    }
}

/// Fold the superseded combined schema (repositories + module files) into
/// the separate stores
///
/// Legacy rows carry no module directory handle, so per-file module context
/// cannot be rebuilt; those files come back as plain local files until the
/// module is cloned again.
async fn import_legacy_schema(conn: &Connection) -> Result<()> {
    if table_exists(conn, "repositories_v0").await? {
        let moved = conn
            .execute(
                r#"
                INSERT OR IGNORE INTO repositories (id, handle, display_name, portals, last_accessed)
                SELECT id, handle, name, COALESCE(portals, '[]'), last_accessed FROM repositories_v0
                "#,
                params![],
            )
            .await?;
        conn.execute("DROP TABLE repositories_v0", params![]).await?;
        info!("Imported {} legacy repositories", moved);
    }

    if table_exists(conn, "module_files_v0").await? {
        let moved = conn
            .execute(
                r#"
                INSERT OR IGNORE INTO file_handles (id, handle, display_name, last_accessed)
                SELECT file_id, handle, file_name, last_accessed FROM module_files_v0
                "#,
                params![],
            )
            .await?;
        conn.execute("DROP TABLE module_files_v0", params![]).await?;
        warn!(
            "Imported {} legacy module files without module bindings; re-clone to restore module context",
            moved
        );
    }

    Ok(())
}

async fn table_exists(conn: &Connection, name: &str) -> Result<bool> {
    let mut rows = conn
        .query(
            "SELECT COUNT(*) FROM sqlite_master WHERE type = 'table' AND name = ?",
            params![name],
        )
        .await?;
    Ok(match rows.next().await? {
        Some(row) => row.get::<i64>(0)? > 0,
        None => false,
    })
}

/// Convert a stored millisecond stamp back to a timestamp
pub(crate) fn from_millis(millis: i64) -> DateTime<Utc> {
    Utc.timestamp_millis_opt(millis).single().unwrap_or_else(|| {
        warn!("Stored timestamp {} is out of range; reading it as the epoch", millis);
        DateTime::<Utc>::UNIX_EPOCH
    })
}

/// Commit `tx` if `result` is Ok, roll it back otherwise
pub(crate) async fn finish_transaction<T>(
    tx: libsql::Transaction,
    result: Result<T>,
    what: &str,
) -> Result<T> {
    match result {
        Ok(value) => {
            tx.commit().await.map_err(|e| {
                SyncError::StorageFailure(format!("Failed to {}: {}", what, e))
            })?;
            Ok(value)
        }
        Err(e) => {
            if let Err(rollback) = tx.rollback().await {
                warn!("Rollback after failing to {} also failed: {}", what, rollback);
            }
            Err(e)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::clock::ManualClock;

    #[test]
    fn test_parse_sql_statements_skips_comments() {
        let sql = "-- header\nCREATE TABLE a (id TEXT);\n\n-- note\nCREATE INDEX i ON a(id);\n";
        let statements = parse_sql_statements(sql);
        assert_eq!(statements.len(), 2);
        assert!(statements[1].starts_with("CREATE INDEX"));
    }

    #[test]
    fn test_from_millis_out_of_range_reads_as_epoch() {
        assert_eq!(from_millis(1_700_000_000_000).timestamp_millis(), 1_700_000_000_000);
        assert_eq!(from_millis(i64::MAX), DateTime::<Utc>::UNIX_EPOCH);
    }

    #[tokio::test]
    async fn test_open_runs_migrations_once() {
        let store = SyncStore::in_memory().await.unwrap();
        assert_eq!(store.schema_version().await.unwrap(), SCHEMA_VERSION);

        // Re-running is a no-op
        store.run_migrations().await.unwrap();
        assert_eq!(store.count("file_handles").await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_stamp_is_strictly_increasing_under_frozen_clock() {
        let clock = Arc::new(ManualClock::new(Utc::now()));
        let store = SyncStore::open_with_clock(ConnectionMode::InMemory, clock)
            .await
            .unwrap();

        let a = store.stamp();
        let b = store.stamp();
        let c = store.stamp();
        assert!(a < b && b < c);
    }

    #[tokio::test]
    async fn test_count_rejects_unknown_table() {
        let store = SyncStore::in_memory().await.unwrap();
        let err = store.count("sqlite_master; DROP TABLE x").await.unwrap_err();
        assert_eq!(err.kind(), crate::error::ErrorKind::NotFound);
    }

    #[tokio::test]
    async fn test_rejects_non_sqlite_file() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join("modsync.db");
        std::fs::write(&path, "definitely not a database file").unwrap();

        let err = SyncStore::open(ConnectionMode::Local(path)).await.err().unwrap();
        assert!(err.to_string().contains("not a valid SQLite database"));
    }
}
