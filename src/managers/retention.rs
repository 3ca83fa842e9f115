//! Retention reconciler
//!
//! Compares what is already stored under the destination folder with the
//! run's retention policy and deletes what falls outside it. Nothing here
//! fails the run: listing and deletion errors are logged and skipped.

use crate::config::{RetentionPolicy, RetryConfig};
use crate::utils::drive_ops::{DriveError, EntryFilter, EntryKind, RemoteEntry, RemoteStore};
use crate::utils::retry::with_retry;
use chrono::{DateTime, Duration, Utc};
use tracing::{info, warn};

/// Oldest instant that survives a `MaxAge` policy evaluated at `now`
pub fn age_cutoff(days: u32, now: DateTime<Utc>) -> DateTime<Utc> {
    now - Duration::days(i64::from(days))
}

/// Pick the entries a policy removes.
///
/// `MaxCount` sorts ascending by creation time, with the id as tie-break, and
/// returns the oldest `len - keep` entries.
pub fn select_expired(
    mut entries: Vec<RemoteEntry>,
    policy: RetentionPolicy,
    now: DateTime<Utc>,
) -> Vec<RemoteEntry> {
    match policy {
        RetentionPolicy::MaxAge { days } => {
            let cutoff = age_cutoff(days, now);
            entries.retain(|e| e.created_at < cutoff);
            entries
        }
        RetentionPolicy::MaxCount { keep } => {
            let keep = keep as usize;
            if entries.len() <= keep {
                return Vec::new();
            }
            entries.sort_by(|a, b| a.created_at.cmp(&b.created_at).then_with(|| a.id.cmp(&b.id)));
            let excess = entries.len() - keep;
            entries.truncate(excess);
            entries
        }
    }
}

/// Applies one retention policy to the entries of one kind under a folder
pub struct RetentionReconciler<'a> {
    store: &'a dyn RemoteStore,
    retry: &'a RetryConfig,
}

impl<'a> RetentionReconciler<'a> {
    pub fn new(store: &'a dyn RemoteStore, retry: &'a RetryConfig) -> Self {
        Self { store, retry }
    }

    /// Delete expired entries and return how many were removed
    pub async fn reconcile(
        &self,
        policy: RetentionPolicy,
        parent_id: &str,
        kind: EntryKind,
        now: DateTime<Utc>,
    ) -> usize {
        let filter = match policy {
            RetentionPolicy::MaxAge { days } => EntryFilter::new()
                .kind(kind)
                .created_before(age_cutoff(days, now)),
            RetentionPolicy::MaxCount { .. } => EntryFilter::new().kind(kind),
        };

        let store = self.store;
        let filter = &filter;
        let entries = match with_retry(self.retry, "List existing backups", move || {
            store.list_entries(parent_id, filter)
        })
        .await
        {
            Ok(entries) => entries,
            Err(e) => {
                warn!("Skipping retention, failed to list existing backups: {}", e);
                return 0;
            }
        };

        let expired = select_expired(entries, policy, now);
        if expired.is_empty() {
            info!("Retention: nothing to delete ({:?})", policy);
            return 0;
        }

        info!("Retention: {} backup(s) to delete ({:?})", expired.len(), policy);

        let mut deleted = 0;
        for entry in expired {
            match self.store.delete_entry(&entry.id).await {
                Ok(()) => {
                    info!("Deleted old backup: {} ({})", entry.name, entry.id);
                    deleted += 1;
                }
                Err(DriveError::NotFound(_)) => {
                    warn!("Old backup already gone: {} ({})", entry.name, entry.id);
                }
                Err(e) => {
                    warn!("Failed to delete old backup {} ({}): {}", entry.name, entry.id, e);
                }
            }
        }

        deleted
    }
}
