//! Test utilities for drive-backup
//!
//! This crate provides shared test utilities, mock implementations,
//! and helper functions for testing the drive-backup application.
//!
//! # Quick Start
//!
//! ```rust,ignore
//! use test_utils::{ConfigBuilder, MockProducer, MockRemoteStore, SourceKind};
//!
//! #[tokio::test]
//! async fn my_test() {
//!     let builder = ConfigBuilder::new().with_website();
//!     let store = MockRemoteStore::new();
//!     let producers = vec![MockProducer::new(SourceKind::Website).boxed()];
//!     // ... test code
//! }
//! ```

pub mod config_builder;
pub mod fixtures;
pub mod mock_producer;
pub mod test_context;

// Re-export commonly used items
pub use config_builder::ConfigBuilder;
pub use fixtures::*;
pub use mock_producer::MockProducer;
pub use test_context::{OptionAssertions, ResultAssertions, TestContext};

// Re-export types from the main crate for convenience
pub use drive_backup::config::{
    AuthConfig, BackupSettings, Config, DatabaseConfig, DriveConfig, GeneralConfig, GroupingMode,
    RetentionConfig, RetentionKind, RetentionPolicy, RetryConfig, WebsiteConfig,
};
pub use drive_backup::managers::backup::{
    BackupManager, RunError, RunOverrides, RunPhase, RunPlan, RunReport,
};
pub use drive_backup::sources::{
    ArchiveArtifact, DatabaseSource, ProduceRequest, SourceKind, SourceProducer, WebsiteSource,
};
pub use drive_backup::utils::drive_ops::{EntryFilter, EntryKind, RemoteEntry, RemoteStore};

// Re-export mock implementations from the main crate
pub use drive_backup::utils::drive_ops::mock::{MockRemoteStore, StoreCall};
pub use drive_backup::utils::executor::mock::{MockExecutor, MockResponse};
pub use drive_backup::utils::executor::CommandExecutor;

/// Shared, ordered event log written by mocks
pub type EventLog = std::sync::Arc<std::sync::Mutex<Vec<String>>>;

/// Common test result type
pub type TestResult<T = ()> = anyhow::Result<T>;
