// Retention sweeps
//
// One rule for every bounded store: a record is evicted when its recency rank
// is beyond the store's max_count, or when it was last accessed longer ago
// than max_age. Sweeps are never needed for read correctness; they only keep
// the stores from growing without bound.

use crate::config::{RetentionConfig, RetentionLimits};
use crate::error::{Result, SyncError};
use crate::storage::libsql::finish_transaction;
use crate::storage::{BoundedStore, SyncStore};
use libsql::{params, Connection};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::{Duration, Instant};

/// Outcome of sweeping one store
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SweepReport {
    pub store: BoundedStore,
    pub removed_by_age: usize,
    pub removed_by_count: usize,
    pub remaining: usize,
    #[serde(with = "serde_duration_millis")]
    pub duration: Duration,
}

impl SweepReport {
    pub fn removed(&self) -> usize {
        self.removed_by_age + self.removed_by_count
    }
}

// Custom serde module for Duration (serialize/deserialize as milliseconds)
mod serde_duration_millis {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_u64(duration.as_millis() as u64)
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Duration, D::Error>
    where
        D: Deserializer<'de>,
    {
        let millis = u64::deserialize(deserializer)?;
        Ok(Duration::from_millis(millis))
    }
}

impl RetentionLimits {
    /// Whether a record at 0-based recency `rank` with the given age is evicted
    pub fn should_evict(&self, rank: usize, age: Duration) -> bool {
        rank >= self.max_count || age > self.max_age
    }

    /// Eviction reason for logging
    pub fn eviction_reason(&self, rank: usize, age: Duration) -> String {
        if age > self.max_age {
            format!(
                "Not accessed for {} days (limit {})",
                age.as_secs() / 86400,
                self.max_age.as_secs() / 86400
            )
        } else if rank >= self.max_count {
            format!("Recency rank {} beyond limit {}", rank + 1, self.max_count)
        } else {
            "Within limits".to_string()
        }
    }
}

/// Applies retention limits to the bounded stores
#[derive(Clone)]
pub struct RetentionPolicy {
    store: Arc<SyncStore>,
    config: RetentionConfig,
}

impl RetentionPolicy {
    pub fn new(store: Arc<SyncStore>, config: RetentionConfig) -> Self {
        Self { store, config }
    }

    pub fn config(&self) -> &RetentionConfig {
        &self.config
    }

    /// Sweep one store now
    pub async fn sweep(&self, target: BoundedStore) -> Result<SweepReport> {
        let start = Instant::now();
        let limits = self.config.limits(target);
        let table = target.table();
        let key = target.key_column();

        tracing::debug!(
            "Sweeping {} (max_count: {}, max_age: {:?})",
            table,
            limits.max_count,
            limits.max_age
        );

        let max_age_ms = i64::try_from(limits.max_age.as_millis()).unwrap_or(i64::MAX);
        let cutoff = self.store.now().timestamp_millis().saturating_sub(max_age_ms);

        let (removed_by_age, removed_by_count) = {
            let conn = self.store.conn().await;
            let tx = conn.transaction().await?;
            let result = async {
                let by_age = tx
                    .execute(
                        &format!("DELETE FROM {} WHERE last_accessed < ?", table),
                        params![cutoff],
                    )
                    .await? as usize;

                let by_count = tx
                    .execute(
                        &format!(
                            "DELETE FROM {table} WHERE {key} NOT IN (
                                SELECT {key} FROM {table} ORDER BY last_accessed DESC LIMIT ?
                            )",
                            table = table,
                            key = key
                        ),
                        params![limits.max_count as i64],
                    )
                    .await? as usize;

                if by_age + by_count > 0 {
                    drop_orphaned_bindings(&tx, target).await?;
                }
                Ok::<_, SyncError>((by_age, by_count))
            }
            .await;
            finish_transaction(tx, result, "sweep retention limits").await?
        };

        let report = SweepReport {
            store: target,
            removed_by_age,
            removed_by_count,
            remaining: self.store.count(table).await?,
            duration: start.elapsed(),
        };

        if report.removed() > 0 {
            tracing::info!(
                "Swept {}: {} expired, {} over limit, {} remaining",
                table,
                report.removed_by_age,
                report.removed_by_count,
                report.remaining
            );
        }

        Ok(report)
    }

    /// Sweep every bounded store
    pub async fn sweep_all(&self) -> Result<Vec<SweepReport>> {
        let mut reports = Vec::with_capacity(BoundedStore::ALL.len());
        for target in BoundedStore::ALL {
            reports.push(self.sweep(target).await?);
        }
        Ok(reports)
    }

    /// Fire-and-forget sweep after a write
    ///
    /// Runs on a detached task when configured for background sweeps and a
    /// runtime is available, otherwise inline. Failures are logged, never returned.
    pub async fn trigger(&self, target: BoundedStore) {
        if self.config.background {
            if let Ok(runtime) = tokio::runtime::Handle::try_current() {
                let policy = self.clone();
                runtime.spawn(async move {
                    if let Err(e) = policy.sweep(target).await {
                        tracing::warn!("Background retention sweep of {} failed: {}", target, e);
                    }
                });
                return;
            }
        }

        if let Err(e) = self.sweep(target).await {
            tracing::warn!("Retention sweep of {} failed: {}", target, e);
        }
    }
}

async fn drop_orphaned_bindings(conn: &Connection, target: BoundedStore) -> Result<()> {
    let sql = match target {
        BoundedStore::FileHandles => {
            "DELETE FROM module_bindings WHERE file_id NOT IN (SELECT id FROM file_handles)"
        }
        BoundedStore::DirectoryHandles => {
            "DELETE FROM module_bindings WHERE directory_id NOT IN (SELECT id FROM directory_handles)"
        }
        BoundedStore::RecentDocuments => return Ok(()),
    };
    let dropped = conn.execute(sql, params![]).await?;
    if dropped > 0 {
        tracing::debug!("Dropped {} module bindings left without a handle", dropped);
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    const DAY: u64 = 86400;

    fn limits() -> RetentionLimits {
        RetentionLimits::new(3, Duration::from_secs(30 * DAY))
    }

    #[test]
    fn test_should_evict_by_rank() {
        let limits = limits();
        assert!(!limits.should_evict(0, Duration::ZERO));
        assert!(!limits.should_evict(2, Duration::ZERO));
        assert!(limits.should_evict(3, Duration::ZERO));
    }

    #[test]
    fn test_should_evict_by_age() {
        let limits = limits();
        assert!(!limits.should_evict(0, Duration::from_secs(30 * DAY)));
        assert!(limits.should_evict(0, Duration::from_secs(30 * DAY + 1)));
    }

    #[test]
    fn test_eviction_reason() {
        let limits = limits();
        assert!(limits
            .eviction_reason(0, Duration::from_secs(45 * DAY))
            .contains("45 days"));
        assert!(limits
            .eviction_reason(5, Duration::ZERO)
            .contains("rank 6 beyond limit 3"));
        assert_eq!(limits.eviction_reason(0, Duration::ZERO), "Within limits");
    }

    #[tokio::test]
    async fn test_sweep_empty_store_is_noop() {
        let store = crate::storage::test_utils::create_test_store().await.unwrap();
        let policy = RetentionPolicy::new(store, RetentionConfig::default().inline());

        let reports = policy.sweep_all().await.unwrap();
        assert_eq!(reports.len(), 3);
        assert!(reports.iter().all(|r| r.removed() == 0 && r.remaining == 0));
    }
}
