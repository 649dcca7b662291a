//! Entity-identity scan shared by every handle table
//!
//! Before a handle is stored, existing handles in the same table are compared
//! against it through the host. A match means the user re-granted something
//! already tracked, so the existing record id is reused.

use crate::capability::{CapabilityHandle, CapabilityHost};
use crate::error::Result;
use crate::storage::{HandleTable, SyncStore};
use tracing::debug;

/// First candidate referring to the same entity as `incoming`
///
/// Comparison failures (stale or revoked handles) count as "not the same".
pub(crate) async fn find_same_entity(
    host: &dyn CapabilityHost,
    candidates: &[(String, CapabilityHandle)],
    incoming: &CapabilityHandle,
) -> Option<String> {
    for (id, existing) in candidates {
        if existing.kind != incoming.kind {
            continue;
        }
        match host.is_same_entry(existing, incoming).await {
            Ok(true) => return Some(id.clone()),
            Ok(false) => {}
            Err(e) => debug!("Treating handle {} as distinct after comparison failure: {}", id, e),
        }
    }
    None
}

/// Id under which `incoming` must be stored in `table`
///
/// Returns the id of an existing record for the same entity, or `proposed`.
pub(crate) async fn canonical_id(
    store: &SyncStore,
    host: &dyn CapabilityHost,
    table: HandleTable,
    proposed: &str,
    incoming: &CapabilityHandle,
) -> Result<String> {
    let candidates = store.load_handles(table).await?;
    match find_same_entity(host, &candidates, incoming).await {
        Some(existing) => {
            if existing != proposed {
                debug!(
                    "Reusing {} record {} for re-granted '{}'",
                    table.table(),
                    existing,
                    incoming.name
                );
            }
            Ok(existing)
        }
        None => Ok(proposed.to_string()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::capability::{HandleKind, MockCapabilityHost};
    use crate::error::SyncError;

    fn file(locator: &str) -> CapabilityHandle {
        CapabilityHandle {
            kind: HandleKind::File,
            name: locator.rsplit('/').next().unwrap_or(locator).to_string(),
            locator: locator.to_string(),
        }
    }

    #[tokio::test]
    async fn test_comparison_failure_is_not_a_match() {
        let mut host = MockCapabilityHost::new();
        host.expect_is_same_entry()
            .returning(|existing, _| {
                if existing.locator == "/revoked/a.groovy" {
                    Err(SyncError::PermissionDenied("revoked".into()))
                } else {
                    Ok(existing.locator == "/live/a.groovy")
                }
            });

        let candidates = vec![
            ("stale".to_string(), file("/revoked/a.groovy")),
            ("live".to_string(), file("/live/a.groovy")),
        ];

        let found = find_same_entity(&host, &candidates, &file("/live/./a.groovy")).await;
        assert_eq!(found.as_deref(), Some("live"));
    }

    #[tokio::test]
    async fn test_kind_mismatch_skips_host_comparison() {
        let mut host = MockCapabilityHost::new();
        host.expect_is_same_entry().times(0);

        let mut dir = file("/live");
        dir.kind = HandleKind::Directory;
        let candidates = vec![("dir".to_string(), dir)];

        assert!(find_same_entity(&host, &candidates, &file("/live")).await.is_none());
    }
}
