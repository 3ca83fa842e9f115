//! Remote store abstraction for testability
//!
//! This module provides a trait-based abstraction over the remote object
//! store, enabling dependency injection and mocking for tests. The trait is
//! deliberately thin: every call is one request against the store and none
//! of them retry.

use super::auth::AuthError;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::path::Path;

/// Whether a remote entry is a plain file or a folder
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EntryKind {
    File,
    Folder,
}

/// A file or folder already present in the remote store
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RemoteEntry {
    pub id: String,
    pub name: String,
    pub kind: EntryKind,
    pub created_at: DateTime<Utc>,
}

/// Restricts a listing of the items under one parent
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct EntryFilter {
    pub kind: Option<EntryKind>,
    pub name: Option<String>,
    pub created_before: Option<DateTime<Utc>>,
    pub created_after: Option<DateTime<Utc>>,
}

impl EntryFilter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn kind(mut self, kind: EntryKind) -> Self {
        self.kind = Some(kind);
        self
    }

    pub fn named(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    pub fn created_before(mut self, instant: DateTime<Utc>) -> Self {
        self.created_before = Some(instant);
        self
    }

    pub fn created_after(mut self, instant: DateTime<Utc>) -> Self {
        self.created_after = Some(instant);
        self
    }

    /// Check an entry against every constraint of the filter
    pub fn matches(&self, entry: &RemoteEntry) -> bool {
        self.kind.map_or(true, |k| k == entry.kind)
            && self.name.as_ref().map_or(true, |n| *n == entry.name)
            && self.created_before.map_or(true, |t| entry.created_at < t)
            && self.created_after.map_or(true, |t| entry.created_at > t)
    }
}

/// Errors returned by the remote store
#[derive(Debug, thiserror::Error)]
pub enum DriveError {
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Drive API returned {status}: {message}")]
    Api { status: u16, message: String },

    #[error("Remote entry not found: {0}")]
    NotFound(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Unexpected response from Drive API: {0}")]
    InvalidResponse(String),

    #[error("Credential error: {0}")]
    Credential(#[from] AuthError),
}

impl DriveError {
    /// Whether repeating the same request might succeed
    pub fn is_retryable(&self) -> bool {
        match self {
            DriveError::Http(e) => e.is_timeout() || e.is_connect() || e.is_request(),
            DriveError::Api { status, .. } => *status == 429 || *status >= 500,
            _ => false,
        }
    }
}

pub type Result<T> = std::result::Result<T, DriveError>;

/// Abstraction for remote store operations, enabling mocking in tests
#[async_trait]
pub trait RemoteStore: Send + Sync {
    /// Obtain credentials without touching any stored data
    async fn authorize(&self) -> Result<()>;

    /// List items under `parent_id` matching `filter`, in no particular order
    async fn list_entries(&self, parent_id: &str, filter: &EntryFilter) -> Result<Vec<RemoteEntry>>;

    /// Create a folder and return its id
    async fn create_folder(&self, name: &str, parent_id: &str) -> Result<String>;

    /// Stream a local file to the store and return the new file's id
    async fn upload_file(&self, local_path: &Path, name: &str, parent_id: &str) -> Result<String>;

    /// Delete a file or folder (folders lose their contents too)
    async fn delete_entry(&self, id: &str) -> Result<()>;

    /// Find a folder by exact name; the oldest match wins if there are several
    async fn find_folder(&self, name: &str, parent_id: &str) -> Result<Option<String>> {
        let filter = EntryFilter::new().kind(EntryKind::Folder).named(name);
        let mut folders = self.list_entries(parent_id, &filter).await?;
        folders.sort_by(|a, b| a.created_at.cmp(&b.created_at).then_with(|| a.id.cmp(&b.id)));
        Ok(folders.into_iter().next().map(|f| f.id))
    }
}

/// Reuse a folder with this name under `parent_id`, creating it if missing
pub async fn find_or_create_folder(store: &dyn RemoteStore, name: &str, parent_id: &str) -> Result<String> {
    if let Some(id) = store.find_folder(name, parent_id).await? {
        tracing::info!("Reusing existing folder \"{}\" ({})", name, id);
        return Ok(id);
    }

    let id = store.create_folder(name, parent_id).await?;
    tracing::info!("Created folder \"{}\" ({})", name, id);
    Ok(id)
}

/// Mock implementation for testing
/// Available for use in external test crates
pub mod mock {
    use super::*;
    use std::collections::HashSet;
    use std::sync::{Arc, Mutex};

    /// Recorded operation call
    #[derive(Clone, Debug, PartialEq, Eq)]
    pub enum StoreCall {
        Authorize,
        List { parent_id: String },
        CreateFolder { name: String, parent_id: String },
        Upload { name: String, parent_id: String },
        Delete { id: String },
    }

    #[derive(Clone, Debug)]
    struct StoredEntry {
        entry: RemoteEntry,
        parent_id: String,
    }

    /// In-memory remote store that records every call
    #[derive(Clone, Default)]
    pub struct MockRemoteStore {
        /// Recorded operation calls
        pub calls: Arc<Mutex<Vec<StoreCall>>>,
        entries: Arc<Mutex<Vec<StoredEntry>>>,
        next_id: Arc<Mutex<u64>>,
        /// Shared event log, used to check ordering against other components
        events: Option<Arc<Mutex<Vec<String>>>>,
        should_fail_authorize: Arc<Mutex<bool>>,
        should_fail_list: Arc<Mutex<bool>>,
        failing_uploads: Arc<Mutex<HashSet<String>>>,
        transient_upload_failures: Arc<Mutex<u32>>,
        failing_deletes: Arc<Mutex<HashSet<String>>>,
    }

    impl MockRemoteStore {
        pub fn new() -> Self {
            Self::default()
        }

        /// Seed an existing entry under `parent_id`
        pub fn with_entry(self, parent_id: &str, entry: RemoteEntry) -> Self {
            self.entries.lock().unwrap().push(StoredEntry {
                entry,
                parent_id: parent_id.to_string(),
            });
            self
        }

        /// Append `upload:<name>` and `delete:<id>` events to a shared log
        pub fn with_event_log(mut self, events: Arc<Mutex<Vec<String>>>) -> Self {
            self.events = Some(events);
            self
        }

        /// Configure authorization to fail
        pub fn with_failing_authorize(self) -> Self {
            *self.should_fail_authorize.lock().unwrap() = true;
            self
        }

        /// Configure listing to fail
        pub fn with_failing_list(self) -> Self {
            *self.should_fail_list.lock().unwrap() = true;
            self
        }

        /// Configure uploads of a given file name to fail permanently
        pub fn with_failing_upload(self, name: &str) -> Self {
            self.failing_uploads.lock().unwrap().insert(name.to_string());
            self
        }

        /// Fail the next `count` uploads with a retryable error
        pub fn with_transient_upload_failures(self, count: u32) -> Self {
            *self.transient_upload_failures.lock().unwrap() = count;
            self
        }

        /// Configure deletion of an id to fail
        pub fn with_failing_delete(self, id: &str) -> Self {
            self.failing_deletes.lock().unwrap().insert(id.to_string());
            self
        }

        /// Get all recorded calls
        pub fn get_calls(&self) -> Vec<StoreCall> {
            self.calls.lock().unwrap().clone()
        }

        /// Number of upload attempts, successful or not
        pub fn upload_count(&self) -> usize {
            self.calls
                .lock()
                .unwrap()
                .iter()
                .filter(|c| matches!(c, StoreCall::Upload { .. }))
                .count()
        }

        /// Number of folders created
        pub fn create_folder_count(&self) -> usize {
            self.calls
                .lock()
                .unwrap()
                .iter()
                .filter(|c| matches!(c, StoreCall::CreateFolder { .. }))
                .count()
        }

        /// Ids passed to delete, in call order
        pub fn deleted_ids(&self) -> Vec<String> {
            self.calls
                .lock()
                .unwrap()
                .iter()
                .filter_map(|c| match c {
                    StoreCall::Delete { id } => Some(id.clone()),
                    _ => None,
                })
                .collect()
        }

        /// Entries currently stored directly under `parent_id`
        pub fn entries_in(&self, parent_id: &str) -> Vec<RemoteEntry> {
            self.entries
                .lock()
                .unwrap()
                .iter()
                .filter(|s| s.parent_id == parent_id)
                .map(|s| s.entry.clone())
                .collect()
        }

        fn record(&self, call: StoreCall) {
            self.calls.lock().unwrap().push(call);
        }

        fn event(&self, event: String) {
            if let Some(ref events) = self.events {
                events.lock().unwrap().push(event);
            }
        }

        fn insert(&self, name: &str, parent_id: &str, kind: EntryKind) -> String {
            let id = {
                let mut next = self.next_id.lock().unwrap();
                *next += 1;
                format!("mock-{}", *next)
            };

            self.entries.lock().unwrap().push(StoredEntry {
                entry: RemoteEntry {
                    id: id.clone(),
                    name: name.to_string(),
                    kind,
                    created_at: Utc::now(),
                },
                parent_id: parent_id.to_string(),
            });
            id
        }
    }

    #[async_trait]
    impl RemoteStore for MockRemoteStore {
        async fn authorize(&self) -> Result<()> {
            self.record(StoreCall::Authorize);
            if *self.should_fail_authorize.lock().unwrap() {
                return Err(DriveError::Credential(AuthError::InvalidKey(
                    "mock credential failure".to_string(),
                )));
            }
            Ok(())
        }

        async fn list_entries(&self, parent_id: &str, filter: &EntryFilter) -> Result<Vec<RemoteEntry>> {
            self.record(StoreCall::List {
                parent_id: parent_id.to_string(),
            });
            if *self.should_fail_list.lock().unwrap() {
                return Err(DriveError::Api {
                    status: 403,
                    message: "mock list failure".to_string(),
                });
            }

            Ok(self
                .entries_in(parent_id)
                .into_iter()
                .filter(|e| filter.matches(e))
                .collect())
        }

        async fn create_folder(&self, name: &str, parent_id: &str) -> Result<String> {
            self.record(StoreCall::CreateFolder {
                name: name.to_string(),
                parent_id: parent_id.to_string(),
            });
            Ok(self.insert(name, parent_id, EntryKind::Folder))
        }

        async fn upload_file(&self, local_path: &Path, name: &str, parent_id: &str) -> Result<String> {
            self.record(StoreCall::Upload {
                name: name.to_string(),
                parent_id: parent_id.to_string(),
            });
            self.event(format!("upload:{}", name));

            {
                let mut transient = self.transient_upload_failures.lock().unwrap();
                if *transient > 0 {
                    *transient -= 1;
                    return Err(DriveError::Api {
                        status: 503,
                        message: "mock backend unavailable".to_string(),
                    });
                }
            }

            if self.failing_uploads.lock().unwrap().contains(name) {
                return Err(DriveError::Api {
                    status: 400,
                    message: format!("mock upload failure for {}", name),
                });
            }

            if !local_path.is_file() {
                return Err(DriveError::Io(std::io::Error::new(
                    std::io::ErrorKind::NotFound,
                    format!("{} does not exist", local_path.display()),
                )));
            }

            Ok(self.insert(name, parent_id, EntryKind::File))
        }

        async fn delete_entry(&self, id: &str) -> Result<()> {
            self.record(StoreCall::Delete { id: id.to_string() });
            self.event(format!("delete:{}", id));

            if self.failing_deletes.lock().unwrap().contains(id) {
                return Err(DriveError::Api {
                    status: 500,
                    message: format!("mock delete failure for {}", id),
                });
            }

            let mut entries = self.entries.lock().unwrap();
            if !entries.iter().any(|s| s.entry.id == id) {
                return Err(DriveError::NotFound(id.to_string()));
            }

            // Remove the entry and everything beneath it
            let mut doomed = vec![id.to_string()];
            let mut index = 0;
            while index < doomed.len() {
                let parent = doomed[index].clone();
                doomed.extend(
                    entries
                        .iter()
                        .filter(|s| s.parent_id == parent)
                        .map(|s| s.entry.id.clone()),
                );
                index += 1;
            }
            entries.retain(|s| !doomed.contains(&s.entry.id));
            Ok(())
        }
    }
}
