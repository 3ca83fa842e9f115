//! Tests for the scheduled mode

use drive_backup::managers::scheduler::build_scheduler;
use std::sync::Arc;
use std::time::Duration;
use test_utils::{ConfigBuilder, MockProducer, SourceKind, TestContext};

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_tick_triggers_a_run() {
    let ctx = TestContext::from_builder(ConfigBuilder::new().with_website());
    let website = MockProducer::new(SourceKind::Website);
    let manager = Arc::new(ctx.manager(vec![website.clone().boxed()]));

    let mut scheduler = build_scheduler(manager, "* * * * * *").await.unwrap();
    scheduler.start().await.unwrap();

    let mut waited = Duration::ZERO;
    while website.produce_count() == 0 && waited < Duration::from_secs(5) {
        tokio::time::sleep(Duration::from_millis(100)).await;
        waited += Duration::from_millis(100);
    }
    scheduler.shutdown().await.unwrap();

    assert!(website.produce_count() >= 1, "no run within {:?}", waited);
    assert!(ctx.store.upload_count() >= 1);
}

#[tokio::test]
async fn test_failed_tick_does_not_break_scheduler() {
    // A run without sources aborts; the job itself must still be accepted
    let ctx = TestContext::from_builder(ConfigBuilder::new());
    let manager = Arc::new(ctx.manager(Vec::new()));

    assert!(build_scheduler(manager, "0 3 * * *").await.is_ok());
}

#[tokio::test]
async fn test_six_field_schedule_is_accepted() {
    let ctx = TestContext::from_builder(ConfigBuilder::new().with_website());
    let manager = Arc::new(ctx.manager(Vec::new()));

    assert!(build_scheduler(manager, "30 0 3 * * 1-5").await.is_ok());
}
