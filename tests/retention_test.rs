//! Retention sweeps over every bounded store

mod common;

use chrono::Duration;
use common::test_env_with;
use modsync_core::{BoundedStore, RecentDocument, RetentionLimits, SyncConfig};
use std::time::Duration as StdDuration;

const DAY: u64 = 86400;

fn config(max_count: usize, max_age_days: u64) -> SyncConfig {
    let limits = RetentionLimits::new(max_count, StdDuration::from_secs(max_age_days * DAY));
    let mut config = SyncConfig::default();
    config.retention.file_handles = limits;
    config.retention.directory_handles = limits;
    config.retention.recent_documents = limits;
    config
}

#[tokio::test]
async fn test_sweep_keeps_exactly_the_most_recent() {
    let limit = 4;
    let env = test_env_with(config(limit, 365)).await;
    let handles = env.session.handles();

    let mut ids = Vec::new();
    for i in 0..limit + 3 {
        let path = env.write_file(&format!("f{}.groovy", i), "x");
        let handle = env.host.handle_for(&path).await.unwrap();
        ids.push(handles.save_new(&handle, &format!("f{}", i)).await.unwrap());
        env.clock.advance(Duration::seconds(1));
    }
    // Older files touched again move back into the kept window
    handles.touch(&ids[0]).await.unwrap();

    let report = env
        .session
        .retention()
        .sweep(BoundedStore::FileHandles)
        .await
        .unwrap();
    assert_eq!(report.removed_by_count, 3);
    assert_eq!(report.remaining, limit);

    let kept: Vec<_> = handles
        .list_recent_descending(100)
        .await
        .unwrap()
        .into_iter()
        .map(|r| r.id)
        .collect();
    let expected = vec![
        ids[0].clone(),
        ids[6].clone(),
        ids[5].clone(),
        ids[4].clone(),
    ];
    assert_eq!(kept, expected);
}

#[tokio::test]
async fn test_directory_sweep_keeps_most_recent_modules() {
    let mut config = config(100, 365);
    config.retention.directory_handles = RetentionLimits::new(2, StdDuration::from_secs(365 * DAY));
    let env = test_env_with(config).await;
    let root = env.mkdir("repo");
    let handle = env.host.handle_for(&root).await.unwrap();
    let repository = env.session.repository();
    let repo = repository.register_repository(&handle).await.unwrap();

    for name in ["CPU", "Memory", "Disk"] {
        repository
            .clone_module_to_repository(
                &repo.id,
                &common::portal(),
                &common::datasource(name),
                &common::both_scripts("c", "a"),
                Default::default(),
            )
            .await
            .unwrap();
        env.clock.advance(Duration::seconds(1));
    }
    assert_eq!(env.store.count("directory_handles").await.unwrap(), 3);
    assert_eq!(env.store.count("module_bindings").await.unwrap(), 6);

    let report = env
        .session
        .retention()
        .sweep(BoundedStore::DirectoryHandles)
        .await
        .unwrap();
    assert_eq!(report.removed_by_count, 1);
    assert_eq!(report.remaining, 2);

    let kept: Vec<_> = env
        .session
        .handles()
        .list_directories_recent_descending(10)
        .await
        .unwrap()
        .into_iter()
        .map(|r| r.module_name)
        .collect();
    assert_eq!(kept, vec!["Disk", "Memory"]);
    // Bindings of the evicted directory go with it
    assert_eq!(env.store.count("module_bindings").await.unwrap(), 4);
}

#[tokio::test]
async fn test_sweep_removes_entries_past_max_age() {
    let env = test_env_with(config(100, 30)).await;
    let recent = env.session.recent();

    recent
        .add(RecentDocument::scratch("old", "Old"))
        .await
        .unwrap();
    env.clock.advance(Duration::days(20));
    recent
        .add(RecentDocument::scratch("mid", "Mid"))
        .await
        .unwrap();
    env.clock.advance(Duration::days(15));

    let reports = env.session.sweep_all().await.unwrap();
    let recent_report = reports
        .iter()
        .find(|r| r.store == BoundedStore::RecentDocuments)
        .unwrap();
    assert_eq!(recent_report.removed_by_age, 1);

    let ids: Vec<_> = recent
        .list(10)
        .await
        .unwrap()
        .into_iter()
        .map(|d| d.id)
        .collect();
    assert_eq!(ids, vec!["mid"]);
}

#[tokio::test]
async fn test_sweep_drops_bindings_of_evicted_files() {
    let env = test_env_with(config(1, 365)).await;
    let root = env.mkdir("repo");
    let handle = env.host.handle_for(&root).await.unwrap();
    let repo = env
        .session
        .repository()
        .register_repository(&handle)
        .await
        .unwrap();

    env.session
        .repository()
        .clone_module_to_repository(
            &repo.id,
            &common::portal(),
            &common::datasource("CPU"),
            &common::both_scripts("c", "a"),
            Default::default(),
        )
        .await
        .unwrap();
    assert_eq!(env.store.count("module_bindings").await.unwrap(), 2);

    env.session
        .retention()
        .sweep(BoundedStore::FileHandles)
        .await
        .unwrap();
    assert_eq!(env.store.count("file_handles").await.unwrap(), 1);
    assert_eq!(env.store.count("module_bindings").await.unwrap(), 1);
}
