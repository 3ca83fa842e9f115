//! Drive Backup Library
//!
//! Scheduled website and database backups uploaded to Google Drive, with
//! retention enforced on every run.

pub mod config;
pub mod managers;
pub mod sources;
pub mod utils;

// Re-export commonly used types
pub use config::{load_config, Config};
pub use managers::backup::{BackupManager, RunError, RunOverrides, RunPhase, RunPlan, RunReport};
pub use managers::logging::{init_console_logging, init_logging, LogGuard, LoggingConfig};
pub use sources::{ArchiveArtifact, SourceKind, SourceProducer};
