//! RecentDocumentsIndex integration tests

mod common;

use chrono::Duration;
use common::{test_env, test_env_with};
use modsync_core::storage::test_utils::test_epoch;
use modsync_core::{
    BoundedStore, ConnectionMode, RecentDocument, RecentDocumentsIndex, RecentKind,
    RetentionConfig, RetentionLimits, RetentionPolicy, ScriptType, SyncConfig, SyncStore,
};
use std::sync::Arc;
use tempfile::TempDir;

#[tokio::test]
async fn test_readding_same_document_keeps_one_entry() {
    let env = test_env().await;
    let recent = env.session.recent();

    let first = recent
        .add(RecentDocument::local("f-1", "cpu.groovy"))
        .await
        .unwrap();
    recent
        .add(RecentDocument::scratch("t-1", "Untitled"))
        .await
        .unwrap();

    env.clock.advance(Duration::minutes(10));
    let second = recent
        .add(RecentDocument::local("f-1", "cpu.groovy"))
        .await
        .unwrap();

    assert_eq!(first.dedupe_key, second.dedupe_key);
    assert!(second.last_accessed > first.last_accessed);
    assert_eq!(second.last_accessed, test_epoch() + Duration::minutes(10));

    let listed = recent.list(10).await.unwrap();
    assert_eq!(listed.len(), 2);
    assert_eq!(listed[0].dedupe_key, "local:f-1");
    assert_eq!(listed[0].last_accessed, second.last_accessed);
    assert_eq!(listed[1].kind, RecentKind::Scratch);
}

#[tokio::test]
async fn test_portal_documents_dedupe_per_script() {
    let env = test_env().await;
    let recent = env.session.recent();

    for script in [ScriptType::Collection, ScriptType::Ad, ScriptType::Collection] {
        recent
            .add(RecentDocument::portal("1201", "acme", "CPU", script))
            .await
            .unwrap();
    }

    let listed = recent.list(10).await.unwrap();
    let keys: Vec<_> = listed.iter().map(|d| d.dedupe_key.as_str()).collect();
    assert_eq!(keys, vec!["portal:acme:1201:collection", "portal:acme:1201:ad"]);
    assert_eq!(listed[0].portal_hostname.as_deref(), Some("acme"));
    assert_eq!(listed[0].script_type, Some(ScriptType::Collection));
}

#[tokio::test]
async fn test_insert_sweeps_beyond_limit() {
    let mut config = SyncConfig::default();
    config.retention.recent_documents =
        RetentionLimits::new(3, std::time::Duration::from_secs(30 * 86400));
    let env = test_env_with(config).await;
    let recent = env.session.recent();

    for i in 0..5 {
        recent
            .add(RecentDocument::scratch(&format!("t-{}", i), "Untitled"))
            .await
            .unwrap();
    }

    let ids: Vec<_> = recent
        .list(10)
        .await
        .unwrap()
        .into_iter()
        .map(|d| d.id)
        .collect();
    assert_eq!(ids, vec!["t-4", "t-3", "t-2"]);
}

#[tokio::test]
async fn test_remove_and_clear() {
    let env = test_env().await;
    let recent = env.session.recent();
    recent
        .add(RecentDocument::local("f-1", "a.groovy"))
        .await
        .unwrap();
    recent
        .add(RecentDocument::local("f-2", "b.groovy"))
        .await
        .unwrap();

    assert!(recent.remove("local:f-1").await.unwrap());
    assert!(!recent.remove("local:f-1").await.unwrap());
    assert_eq!(recent.list(10).await.unwrap().len(), 1);

    assert_eq!(recent.clear().await.unwrap(), 1);
    assert!(recent.list(10).await.unwrap().is_empty());
}

#[tokio::test]
async fn test_same_named_modules_keep_separate_entries() {
    let env = test_env().await;
    let recent = env.session.recent();

    recent
        .add(RecentDocument::portal("1201", "acme", "CPU", ScriptType::Collection))
        .await
        .unwrap();
    recent
        .add(RecentDocument::portal("88", "acme", "CPU", ScriptType::Collection))
        .await
        .unwrap();

    let ids: Vec<_> = recent
        .list(10)
        .await
        .unwrap()
        .into_iter()
        .map(|d| d.id)
        .collect();
    assert_eq!(ids, vec!["88", "1201"]);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_adds_on_database_file() {
    let dir = TempDir::new().unwrap();
    let store = Arc::new(
        SyncStore::open(ConnectionMode::Local(dir.path().join("modsync.db")))
            .await
            .unwrap(),
    );
    // Background sweeps race the inserts on purpose
    let retention = RetentionPolicy::new(store.clone(), RetentionConfig::default());
    let recent = RecentDocumentsIndex::new(store.clone(), retention.clone());

    let mut tasks = Vec::new();
    for i in 0..200 {
        let recent = recent.clone();
        tasks.push(tokio::spawn(async move {
            recent
                .add(RecentDocument::scratch(&format!("t-{}", i), "Untitled"))
                .await
        }));
    }

    let mut failures = Vec::new();
    for task in tasks {
        if let Err(e) = task.await.unwrap() {
            failures.push(e.to_string());
        }
    }
    assert!(failures.is_empty(), "failed adds: {:?}", failures);

    retention.sweep(BoundedStore::RecentDocuments).await.unwrap();
    let limit = retention.config().recent_documents.max_count;
    assert_eq!(store.count("recent_documents").await.unwrap(), limit);
    assert_eq!(recent.list(500).await.unwrap().len(), limit);
}
