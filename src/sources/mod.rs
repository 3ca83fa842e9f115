//! Source producers
//!
//! A producer turns one backup source into a single compressed archive on
//! local disk. Producers never retry; the backup manager decides what a
//! failure means for the run.

pub mod database;
pub mod website;

pub use database::DatabaseSource;
pub use website::WebsiteSource;

use anyhow::Result;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::fmt;
use std::path::{Path, PathBuf};

/// Kind of backup source
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum SourceKind {
    Website,
    Database,
}

impl fmt::Display for SourceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SourceKind::Website => write!(f, "website"),
            SourceKind::Database => write!(f, "database"),
        }
    }
}

/// Inputs shared by every producer in a run
#[derive(Debug, Clone)]
pub struct ProduceRequest {
    /// Directory the archive is written into
    pub output_dir: PathBuf,
    /// Run timestamp, encoded into the archive name
    pub timestamp: DateTime<Utc>,
    /// Archive passphrase; `None` produces an unprotected archive
    pub passphrase: Option<String>,
}

impl ProduceRequest {
    /// File-name-safe form of the run timestamp
    pub fn file_timestamp(&self) -> String {
        file_timestamp(self.timestamp)
    }
}

/// A compressed archive produced for one source.
///
/// The file is complete and closed by the time a producer returns it.
#[derive(Debug, Clone)]
pub struct ArchiveArtifact {
    pub source_kind: SourceKind,
    pub local_path: PathBuf,
    pub created_at: DateTime<Utc>,
}

impl ArchiveArtifact {
    pub fn new(source_kind: SourceKind, local_path: PathBuf) -> Self {
        Self {
            source_kind,
            local_path,
            created_at: Utc::now(),
        }
    }

    /// Name used for the remote copy
    pub fn file_name(&self) -> String {
        self.local_path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| self.local_path.display().to_string())
    }

    pub fn path(&self) -> &Path {
        &self.local_path
    }
}

/// Trait for backup source producers
#[async_trait]
pub trait SourceProducer: Send + Sync {
    /// Source this producer archives
    fn kind(&self) -> SourceKind;

    /// Produce the archive for this source
    async fn produce(&self, request: &ProduceRequest) -> Result<ArchiveArtifact>;
}

/// Sortable timestamp with colons replaced, e.g. `2025-03-01T04-05-06`
pub fn file_timestamp(timestamp: DateTime<Utc>) -> String {
    timestamp.format("%Y-%m-%dT%H-%M-%S").to_string()
}
