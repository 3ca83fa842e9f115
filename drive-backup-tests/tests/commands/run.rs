//! Tests for a backup run
//!
//! A run produces every enabled archive, uploads them, applies retention and
//! sweeps the temp directory. The remote store and dump tool are mocked.

use chrono::Utc;
use drive_backup::config::GroupingMode;
use std::sync::Arc;
use std::time::Duration;
use test_utils::{
    dated_folders, dir_is_empty, remote_file, ConfigBuilder, DatabaseSource, MockExecutor,
    MockProducer, MockRemoteStore, MockResponse, ResultAssertions, RunError, RunOverrides,
    RunPhase, SourceKind, SourceProducer, StoreCall, TestContext, WebsiteSource,
};

fn both_sources() -> ConfigBuilder {
    ConfigBuilder::new().with_website().with_database("shop")
}

#[tokio::test]
async fn test_run_without_sources_aborts_before_any_remote_call() {
    let ctx = TestContext::from_builder(ConfigBuilder::new());
    let manager = ctx.manager(vec![
        MockProducer::new(SourceKind::Website).boxed(),
        MockProducer::new(SourceKind::Database).boxed(),
    ]);

    let err = manager.run(&RunOverrides::default()).await.unwrap_err();

    assert!(matches!(err, RunError::NoSourcesEnabled));
    assert_eq!(err.terminal_phase(), RunPhase::Aborted);
    assert!(ctx.store.get_calls().is_empty());
    assert!(!ctx.work_dir().exists());
}

#[tokio::test]
async fn test_uploads_wait_for_every_producer() {
    let ctx = TestContext::from_builder(both_sources());
    let manager = ctx.manager(vec![
        MockProducer::new(SourceKind::Website)
            .with_delay(Duration::from_millis(150))
            .with_event_log(ctx.events.clone())
            .boxed(),
        MockProducer::new(SourceKind::Database)
            .with_event_log(ctx.events.clone())
            .boxed(),
    ]);

    manager.run(&RunOverrides::default()).await.assert_ok();

    let events = ctx.events();
    let last_produced = events
        .iter()
        .rposition(|e| e.starts_with("produced:"))
        .expect("no archive produced");
    let first_upload = events
        .iter()
        .position(|e| e.starts_with("upload:"))
        .expect("no upload");

    assert!(
        last_produced < first_upload,
        "upload started before every archive existed: {:?}",
        events
    );
    assert_eq!(events.iter().filter(|e| e.starts_with("upload:")).count(), 2);
}

#[tokio::test]
async fn test_retention_runs_after_every_upload() {
    let now = Utc::now();
    let store = MockRemoteStore::new().with_entry("root-folder", remote_file("stale", 30, now));
    let ctx = TestContext::with_store(both_sources(), store);
    let manager = ctx.manager(vec![
        MockProducer::new(SourceKind::Website).boxed(),
        MockProducer::new(SourceKind::Database).boxed(),
    ]);

    manager.run(&RunOverrides::default()).await.assert_ok();

    let events = ctx.events();
    let last_upload = events.iter().rposition(|e| e.starts_with("upload:")).unwrap();
    let first_delete = events.iter().position(|e| e == "delete:stale").unwrap();
    assert!(last_upload < first_delete, "{:?}", events);
}

#[tokio::test]
async fn test_dated_folder_run_keeps_newest_folders() {
    let now = Utc::now();
    let mut store = MockRemoteStore::new();
    for folder in dated_folders(5, now) {
        store = store.with_entry("root-folder", folder);
    }

    let builder = both_sources()
        .grouping(GroupingMode::DatedFolder)
        .max_count(3);
    let ctx = TestContext::with_store(builder, store);
    let manager = ctx.manager(vec![
        MockProducer::new(SourceKind::Website).boxed(),
        MockProducer::new(SourceKind::Database).boxed(),
    ]);

    let report = manager.run(&RunOverrides::default()).await.assert_ok();

    // Five seeded plus this run's folder; the three oldest go
    assert_eq!(report.deleted, 3);
    let mut deleted = ctx.store.deleted_ids();
    deleted.sort();
    assert_eq!(deleted, vec!["folder-00", "folder-01", "folder-02"]);

    let remaining = ctx.store.entries_in("root-folder");
    assert_eq!(remaining.len(), 3);
    assert!(remaining.iter().any(|e| e.id == report.destination_id));

    // Archives live inside the dated folder, not beside it
    assert_eq!(ctx.store.entries_in(&report.destination_id).len(), 2);
}

#[tokio::test]
async fn test_flat_run_deletes_files_past_max_age() {
    let now = Utc::now();
    let store = MockRemoteStore::new()
        .with_entry("root-folder", remote_file("ten", 10, now))
        .with_entry("root-folder", remote_file("eight", 8, now))
        .with_entry("root-folder", remote_file("three", 3, now));

    let builder = ConfigBuilder::new().with_website().max_age(7);
    let ctx = TestContext::with_store(builder, store);
    let manager = ctx.manager(vec![MockProducer::new(SourceKind::Website).boxed()]);

    let report = manager.run(&RunOverrides::default()).await.assert_ok();

    let mut deleted = ctx.store.deleted_ids();
    deleted.sort();
    assert_eq!(deleted, vec!["eight", "ten"]);
    assert_eq!(report.deleted, 2);

    let remaining: Vec<_> = ctx
        .store
        .entries_in("root-folder")
        .into_iter()
        .map(|e| e.name)
        .collect();
    assert_eq!(remaining.len(), 2);
    assert!(remaining.contains(&"three.zip".to_string()));
}

#[tokio::test]
async fn test_work_dir_is_empty_after_success() {
    let ctx = TestContext::from_builder(both_sources());
    std::fs::create_dir_all(ctx.work_dir().join("run-crashed-earlier")).unwrap();
    std::fs::write(ctx.work_dir().join("leftover.zip"), "stale").unwrap();

    let manager = ctx.manager(vec![
        MockProducer::new(SourceKind::Website).boxed(),
        MockProducer::new(SourceKind::Database).boxed(),
    ]);
    manager.run(&RunOverrides::default()).await.assert_ok();

    assert!(dir_is_empty(ctx.work_dir()));
}

#[tokio::test]
async fn test_work_dir_is_empty_after_producer_failure() {
    let ctx = TestContext::from_builder(both_sources());
    let manager = ctx.manager(vec![
        MockProducer::new(SourceKind::Website).boxed(),
        MockProducer::new(SourceKind::Database)
            .failing("dump tool missing")
            .boxed(),
    ]);

    let err = manager.run(&RunOverrides::default()).await.unwrap_err();

    assert_eq!(err.terminal_phase(), RunPhase::Failed);
    assert!(dir_is_empty(ctx.work_dir()));
}

#[tokio::test]
async fn test_same_plan_twice_reuses_dated_folder() {
    let builder = ConfigBuilder::new()
        .with_website()
        .grouping(GroupingMode::DatedFolder);
    let ctx = TestContext::from_builder(builder);
    let manager = ctx.manager(vec![MockProducer::new(SourceKind::Website).boxed()]);

    let plan = ctx.plan(&RunOverrides::default());
    let first = manager.execute(plan.clone()).await.assert_ok();
    let second = manager.execute(plan).await.assert_ok();

    assert_eq!(ctx.store.create_folder_count(), 1);
    assert_eq!(first.destination_id, second.destination_id);
    assert_eq!(ctx.store.entries_in("root-folder").len(), 1);
}

#[tokio::test]
async fn test_database_failure_blocks_every_upload() {
    let builder = both_sources();
    let site = builder.temp_dir().join("site");
    let ctx = TestContext::from_builder(builder);

    let executor = MockExecutor::new().expect(
        "mysqldump",
        MockResponse::Failure {
            stderr: "Can't connect to MySQL server".to_string(),
            exit_code: 2,
        },
    );
    let producers: Vec<Arc<dyn SourceProducer>> = vec![
        Arc::new(WebsiteSource::new(site)),
        Arc::new(DatabaseSource::new(ctx.config().database.clone(), Arc::new(executor))),
    ];
    let manager = ctx.manager(producers);

    let err = manager.run(&RunOverrides::default()).await.unwrap_err();

    match err {
        RunError::Producer { ref failed, .. } => assert_eq!(failed, &vec![SourceKind::Database]),
        ref other => panic!("unexpected error: {}", other),
    }
    assert!(err.to_string().contains("Can't connect"));
    assert_eq!(ctx.store.upload_count(), 0);
    assert!(ctx.store.deleted_ids().is_empty());
    assert!(dir_is_empty(ctx.work_dir()));
}

#[tokio::test]
async fn test_only_override_runs_single_source() {
    let ctx = TestContext::from_builder(ConfigBuilder::new().with_database("shop"));
    let website = MockProducer::new(SourceKind::Website);
    let database = MockProducer::new(SourceKind::Database);
    let manager = ctx.manager(vec![website.clone().boxed(), database.clone().boxed()]);

    let report = manager
        .run(&RunOverrides {
            only: Some(SourceKind::Website),
        })
        .await
        .assert_ok();

    assert_eq!(report.uploaded.len(), 1);
    assert_eq!(website.produce_count(), 1);
    assert_eq!(database.produce_count(), 0);
    assert!(!ctx.config().website.enabled);
}

#[tokio::test]
async fn test_transient_upload_failures_are_retried() {
    let ctx = TestContext::with_store(
        ConfigBuilder::new().with_website(),
        MockRemoteStore::new().with_transient_upload_failures(2),
    );
    let manager = ctx.manager(vec![MockProducer::new(SourceKind::Website).boxed()]);

    let report = manager.run(&RunOverrides::default()).await.assert_ok();

    assert_eq!(report.uploaded.len(), 1);
    assert_eq!(ctx.store.upload_count(), 3);
}

#[tokio::test]
async fn test_permanent_upload_failure_is_not_retried() {
    let builder = ConfigBuilder::new().with_website();
    let ctx = TestContext::from_builder(builder);
    let plan = ctx.plan(&RunOverrides::default());
    let name = format!("website_backup_{}.zip", drive_backup::sources::file_timestamp(plan.timestamp));

    let store = ctx.store.clone().with_failing_upload(&name);
    let manager = drive_backup::BackupManager::with_producers(
        ctx.config().clone(),
        Arc::new(store),
        vec![MockProducer::new(SourceKind::Website).boxed()],
    );

    let err = manager.execute(plan).await.unwrap_err();

    assert!(matches!(err, RunError::Upload { .. }));
    assert_eq!(ctx.store.upload_count(), 1);
    assert!(dir_is_empty(ctx.work_dir()));
}

#[tokio::test]
async fn test_credential_failure_fails_before_archiving() {
    let ctx = TestContext::with_store(
        ConfigBuilder::new().with_website(),
        MockRemoteStore::new().with_failing_authorize(),
    );
    let website = MockProducer::new(SourceKind::Website);
    let manager = ctx.manager(vec![website.clone().boxed()]);

    let err = manager.run(&RunOverrides::default()).await.unwrap_err();

    assert!(matches!(err, RunError::Credential(_)));
    assert_eq!(website.produce_count(), 0);
    assert_eq!(ctx.store.get_calls(), vec![StoreCall::Authorize]);
}
