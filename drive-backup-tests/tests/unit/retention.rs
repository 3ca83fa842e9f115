//! Retention selection and reconciliation against the in-memory store

use chrono::{Duration, Utc};
use drive_backup::managers::retention::{age_cutoff, select_expired, RetentionReconciler};
use rstest::rstest;
use test_utils::{
    dated_folders, remote_file, remote_folder, EntryKind, MockRemoteStore, RetentionPolicy,
    RetryConfig,
};

fn fast_retry() -> RetryConfig {
    RetryConfig {
        max_attempts: 2,
        initial_delay_ms: 1,
        max_delay_ms: 2,
    }
}

fn ids(entries: &[test_utils::RemoteEntry]) -> Vec<&str> {
    entries.iter().map(|e| e.id.as_str()).collect()
}

#[test]
fn test_age_cutoff() {
    let now = Utc::now();
    assert_eq!(age_cutoff(7, now), now - Duration::days(7));
}

#[test]
fn test_max_age_keeps_entries_on_the_boundary() {
    let now = Utc::now();
    let boundary = test_utils::RemoteEntry {
        created_at: age_cutoff(7, now),
        ..remote_file("boundary", 0, now)
    };

    let expired = select_expired(
        vec![boundary, remote_file("old", 8, now)],
        RetentionPolicy::MaxAge { days: 7 },
        now,
    );

    assert_eq!(ids(&expired), vec!["old"]);
}

#[rstest]
#[case(5, 3, vec!["folder-00", "folder-01"])]
#[case(5, 5, vec![])]
#[case(2, 7, vec![])]
#[case(4, 1, vec!["folder-00", "folder-01", "folder-02"])]
fn test_max_count_removes_oldest(
    #[case] existing: usize,
    #[case] keep: u32,
    #[case] expected: Vec<&str>,
) {
    let now = Utc::now();
    let mut folders = dated_folders(existing, now);
    folders.reverse();

    let expired = select_expired(folders, RetentionPolicy::MaxCount { keep }, now);
    assert_eq!(ids(&expired), expected);
}

#[test]
fn test_max_count_breaks_ties_by_id() {
    let now = Utc::now();
    let same_time = |id: &str| remote_folder(id, 3, now);

    let expired = select_expired(
        vec![same_time("c"), same_time("a"), same_time("b")],
        RetentionPolicy::MaxCount { keep: 1 },
        now,
    );

    assert_eq!(ids(&expired), vec!["a", "b"]);
}

#[tokio::test]
async fn test_reconcile_only_touches_requested_kind() {
    let now = Utc::now();
    let store = MockRemoteStore::new()
        .with_entry("parent", remote_file("stale-file", 30, now))
        .with_entry("parent", remote_folder("stale-folder", 30, now))
        .with_entry("elsewhere", remote_file("other-parent", 30, now));
    let retry = fast_retry();

    let deleted = RetentionReconciler::new(&store, &retry)
        .reconcile(RetentionPolicy::MaxAge { days: 7 }, "parent", EntryKind::File, now)
        .await;

    assert_eq!(deleted, 1);
    assert_eq!(store.deleted_ids(), vec!["stale-file"]);
}

#[tokio::test]
async fn test_reconcile_continues_past_delete_failures() {
    let now = Utc::now();
    let store = MockRemoteStore::new()
        .with_entry("parent", remote_file("ten", 10, now))
        .with_entry("parent", remote_file("nine", 9, now))
        .with_entry("parent", remote_file("eight", 8, now))
        .with_failing_delete("nine");
    let retry = fast_retry();

    let deleted = RetentionReconciler::new(&store, &retry)
        .reconcile(RetentionPolicy::MaxAge { days: 7 }, "parent", EntryKind::File, now)
        .await;

    assert_eq!(deleted, 2);
    assert_eq!(store.deleted_ids().len(), 3);
    assert_eq!(ids(&store.entries_in("parent")), vec!["nine"]);
}

#[tokio::test]
async fn test_reconcile_survives_list_failure() {
    let now = Utc::now();
    let store = MockRemoteStore::new()
        .with_entry("parent", remote_file("old", 30, now))
        .with_failing_list();
    let retry = fast_retry();

    let deleted = RetentionReconciler::new(&store, &retry)
        .reconcile(RetentionPolicy::MaxAge { days: 7 }, "parent", EntryKind::File, now)
        .await;

    assert_eq!(deleted, 0);
    assert!(store.deleted_ids().is_empty());
}
