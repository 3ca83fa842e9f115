//! Test context and harness for run tests
//!
//! Bundles a configuration, the in-memory remote store and a shared event
//! log, and builds backup managers wired to them.

use crate::config_builder::ConfigBuilder;
use crate::EventLog;
use anyhow::Result;
use drive_backup::config::Config;
use drive_backup::managers::backup::{BackupManager, RunOverrides, RunPlan};
use drive_backup::sources::SourceProducer;
use drive_backup::utils::drive_ops::mock::MockRemoteStore;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tempfile::TempDir;

/// Test context that manages test resources and provides common utilities
pub struct TestContext {
    /// Temporary directory for test files
    temp_dir: TempDir,
    /// The test configuration
    config: Config,
    /// Remote store shared with every manager built from this context
    pub store: MockRemoteStore,
    /// Ordered events from the store and any producers given this log
    pub events: EventLog,
}

impl TestContext {
    /// Create a test context from a ConfigBuilder
    pub fn from_builder(builder: ConfigBuilder) -> Self {
        Self::with_store(builder, MockRemoteStore::new())
    }

    /// Create a test context around a pre-seeded store
    pub fn with_store(builder: ConfigBuilder, store: MockRemoteStore) -> Self {
        let (config, temp_dir) = builder.persist();
        let events = EventLog::default();

        Self {
            temp_dir,
            config,
            store: store.with_event_log(events.clone()),
            events,
        }
    }

    /// Get the temporary directory path
    pub fn temp_dir(&self) -> &Path {
        self.temp_dir.path()
    }

    /// Get the configuration
    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Directory runs stage their archives in
    pub fn work_dir(&self) -> &Path {
        &self.config.general.temp_directory
    }

    /// Plan a run starting now
    pub fn plan(&self, overrides: &RunOverrides) -> RunPlan {
        RunPlan::new(&self.config, overrides, chrono::Utc::now())
    }

    /// Build a manager over the shared store with the given producers
    pub fn manager(&self, producers: Vec<Arc<dyn SourceProducer>>) -> BackupManager {
        BackupManager::with_producers(self.config.clone(), Arc::new(self.store.clone()), producers)
    }

    /// Snapshot of the event log
    pub fn events(&self) -> Vec<String> {
        self.events.lock().unwrap().clone()
    }

    /// Create a file in the temp dir
    pub fn create_file(&self, name: &str, content: &str) -> PathBuf {
        let path = self.temp_dir.path().join(name);
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).expect("Failed to create parent directory");
        }
        std::fs::write(&path, content).expect("Failed to write file");
        path
    }

    /// Read a file from the temp directory
    pub fn read_file(&self, name: &str) -> Result<String> {
        let path = self.temp_dir.path().join(name);
        Ok(std::fs::read_to_string(path)?)
    }
}

/// Extension trait for assertion helpers
pub trait ResultAssertions<T> {
    /// Assert that the result is Ok and return the value
    fn assert_ok(self) -> T;

    /// Assert that the result is Ok with a custom message
    fn assert_ok_msg(self, msg: &str) -> T;

    /// Assert that the result is Err
    fn assert_err(self);

    /// Assert that the result is Err and the error message contains the given string
    fn assert_err_contains(self, needle: &str);
}

impl<T: std::fmt::Debug, E: std::fmt::Debug> ResultAssertions<T> for Result<T, E> {
    fn assert_ok(self) -> T {
        match self {
            Ok(v) => v,
            Err(e) => panic!("Expected Ok, got Err: {:?}", e),
        }
    }

    fn assert_ok_msg(self, msg: &str) -> T {
        match self {
            Ok(v) => v,
            Err(e) => panic!("{}: {:?}", msg, e),
        }
    }

    fn assert_err(self) {
        if let Ok(v) = self {
            panic!("Expected Err, got Ok: {:?}", v);
        }
    }

    fn assert_err_contains(self, needle: &str) {
        match self {
            Ok(v) => panic!("Expected Err containing '{}', got Ok: {:?}", needle, v),
            Err(e) => {
                let err_msg = format!("{:?}", e);
                assert!(
                    err_msg.contains(needle),
                    "Error '{}' does not contain '{}'",
                    err_msg,
                    needle
                );
            }
        }
    }
}

/// Extension trait for Option assertions
pub trait OptionAssertions<T> {
    /// Assert that the option is Some and return the value
    fn assert_some(self) -> T;

    /// Assert that the option is None
    fn assert_none(self);
}

impl<T: std::fmt::Debug> OptionAssertions<T> for Option<T> {
    fn assert_some(self) -> T {
        match self {
            Some(v) => v,
            None => panic!("Expected Some, got None"),
        }
    }

    fn assert_none(self) {
        if let Some(v) = self {
            panic!("Expected None, got Some: {:?}", v);
        }
    }
}
