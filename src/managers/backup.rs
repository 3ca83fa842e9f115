//! Backup manager - orchestrates backup execution
//!
//! One run moves through these phases:
//!
//! ```text
//! Init -> ProducingArchives -> Uploading -> Reconciling -> CleaningUp -> Done
//! ```
//!
//! `Aborted` is reachable from `Init` only, when no source is enabled.
//! `Failed` ends a run whose credentials, producers or uploads failed; the
//! temp directory is still swept before the failure is reported.

use crate::config::{Config, GroupingMode, RetentionPolicy, RetryConfig};
use crate::managers::retention::RetentionReconciler;
use crate::sources::{
    file_timestamp, ArchiveArtifact, DatabaseSource, ProduceRequest, SourceKind, SourceProducer,
    WebsiteSource,
};
use crate::utils::drive_ops::{find_or_create_folder, DriveError, EntryKind, RemoteStore};
use crate::utils::executor::RealExecutor;
use crate::utils::locker::RunLock;
use crate::utils::retry::with_retry;
use chrono::{DateTime, Utc};
use futures::future::join_all;
use std::collections::HashMap;
use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Instant;
use tracing::{error, info, warn};

/// Lifecycle of a single run
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunPhase {
    Init,
    ProducingArchives,
    Uploading,
    Reconciling,
    CleaningUp,
    Done,
    Aborted,
    Failed,
}

impl fmt::Display for RunPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            RunPhase::Init => "init",
            RunPhase::ProducingArchives => "producing archives",
            RunPhase::Uploading => "uploading",
            RunPhase::Reconciling => "reconciling",
            RunPhase::CleaningUp => "cleaning up",
            RunPhase::Done => "done",
            RunPhase::Aborted => "aborted",
            RunPhase::Failed => "failed",
        };
        f.write_str(name)
    }
}

/// Why a run did not reach `Done`
#[derive(Debug, thiserror::Error)]
pub enum RunError {
    #[error("No backup sources are enabled")]
    NoSourcesEnabled,

    #[error("{} producer(s) failed: {message}", .failed.len())]
    Producer { failed: Vec<SourceKind>, message: String },

    #[error("Upload failed: {message}")]
    Upload { failed: Vec<String>, message: String },

    #[error("Could not authorize with the remote store: {0}")]
    Credential(#[source] DriveError),

    #[error("Could not take the run lock: {0:#}")]
    Lock(anyhow::Error),

    #[error("Local I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl RunError {
    /// Terminal phase a run ends in for this error
    pub fn terminal_phase(&self) -> RunPhase {
        match self {
            RunError::NoSourcesEnabled => RunPhase::Aborted,
            _ => RunPhase::Failed,
        }
    }
}

/// Command-line adjustments for a single run
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RunOverrides {
    /// Back up only this source, whatever the configuration enables
    pub only: Option<SourceKind>,
}

/// Everything one run needs, fixed when the run starts.
///
/// Built from the loaded configuration and the command-line overrides;
/// neither is modified.
#[derive(Debug, Clone)]
pub struct RunPlan {
    pub timestamp: DateTime<Utc>,
    pub sources: Vec<SourceKind>,
    pub passphrase: Option<String>,
    pub grouping: GroupingMode,
    pub retention: RetentionPolicy,
    pub parent_folder_id: String,
    pub temp_root: PathBuf,
    pub retry: RetryConfig,
}

impl RunPlan {
    pub fn new(config: &Config, overrides: &RunOverrides, timestamp: DateTime<Utc>) -> Self {
        let sources = match overrides.only {
            Some(kind) => vec![kind],
            None => {
                let mut enabled = Vec::new();
                if config.website.enabled {
                    enabled.push(SourceKind::Website);
                }
                if config.database.enabled {
                    enabled.push(SourceKind::Database);
                }
                enabled
            }
        };

        let passphrase = Some(config.backup.archive_password.clone()).filter(|p| !p.is_empty());
        let grouping = config.backup.grouping;

        Self {
            timestamp,
            sources,
            passphrase,
            grouping,
            retention: config.backup.retention.resolve(grouping),
            parent_folder_id: config.drive.folder_id.clone(),
            temp_root: crate::config::expand_tilde(&config.general.temp_directory),
            retry: config.backup.retry.clone(),
        }
    }

    /// Directory holding this run's archives
    pub fn run_dir(&self) -> PathBuf {
        self.temp_root.join(format!("run-{}", file_timestamp(self.timestamp)))
    }

    /// Name of the per-run folder in `DatedFolder` mode
    pub fn folder_name(&self) -> String {
        format!("Backup_{}", file_timestamp(self.timestamp))
    }

    /// Kind of remote entry the retention policy applies to
    pub fn retention_scope(&self) -> EntryKind {
        match self.grouping {
            GroupingMode::Flat => EntryKind::File,
            GroupingMode::DatedFolder => EntryKind::Folder,
        }
    }
}

/// An archive that reached the remote store
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UploadedArtifact {
    pub name: String,
    pub remote_id: String,
}

/// Result of a completed run
#[derive(Debug, Clone)]
pub struct RunReport {
    pub timestamp: DateTime<Utc>,
    pub destination_id: String,
    pub uploaded: Vec<UploadedArtifact>,
    pub deleted: usize,
}

pub struct BackupManager {
    config: Config,
    store: Arc<dyn RemoteStore>,
    producers: HashMap<SourceKind, Arc<dyn SourceProducer>>,
}

impl BackupManager {
    /// Create new backup manager with the producers the configuration describes
    pub fn new(config: Config, store: Arc<dyn RemoteStore>) -> Self {
        let mut producers: Vec<Arc<dyn SourceProducer>> = Vec::new();

        if let Some(ref path) = config.website.path {
            producers.push(Arc::new(WebsiteSource::new(crate::config::expand_tilde(path))));
        }
        producers.push(Arc::new(DatabaseSource::new(
            config.database.clone(),
            Arc::new(RealExecutor::new()),
        )));

        Self::with_producers(config, store, producers)
    }

    /// Create backup manager with specific producers
    pub fn with_producers(
        config: Config,
        store: Arc<dyn RemoteStore>,
        producers: Vec<Arc<dyn SourceProducer>>,
    ) -> Self {
        let producers = producers.into_iter().map(|p| (p.kind(), p)).collect();
        Self {
            config,
            store,
            producers,
        }
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Plan a run starting now
    pub fn plan(&self, overrides: &RunOverrides) -> RunPlan {
        RunPlan::new(&self.config, overrides, Utc::now())
    }

    /// Plan and execute one run
    pub async fn run(&self, overrides: &RunOverrides) -> Result<RunReport, RunError> {
        self.execute(self.plan(overrides)).await
    }

    /// Execute a planned run, logging its outcome
    pub async fn execute(&self, plan: RunPlan) -> Result<RunReport, RunError> {
        let start_time = Instant::now();
        info!("Starting backup run {}", plan.timestamp.to_rfc3339());

        let result = self.execute_phases(&plan).await;

        match result {
            Ok(ref report) => {
                enter(RunPhase::Done);
                info!(
                    "Backup run completed in {:.2}s: {} uploaded, {} old backup(s) deleted",
                    start_time.elapsed().as_secs_f64(),
                    report.uploaded.len(),
                    report.deleted
                );
            }
            Err(ref e) => {
                enter(e.terminal_phase());
                match e.terminal_phase() {
                    RunPhase::Aborted => warn!("Backup run aborted: {}", e),
                    _ => error!(
                        "Backup run failed after {:.2}s: {}",
                        start_time.elapsed().as_secs_f64(),
                        e
                    ),
                }
            }
        }

        result
    }

    async fn execute_phases(&self, plan: &RunPlan) -> Result<RunReport, RunError> {
        enter(RunPhase::Init);
        if plan.sources.is_empty() {
            return Err(RunError::NoSourcesEnabled);
        }
        info!(
            "Enabled sources: {}",
            plan.sources.iter().map(|s| s.to_string()).collect::<Vec<_>>().join(", ")
        );

        let mut lock = RunLock::open(&RunLock::path_for(&plan.temp_root)).map_err(RunError::Lock)?;
        let _guard = lock.try_acquire().map_err(RunError::Lock)?;

        self.store.authorize().await.map_err(RunError::Credential)?;

        let run_dir = plan.run_dir();
        tokio::fs::create_dir_all(&run_dir).await?;

        let outcome = self.produce_and_upload(plan, &run_dir).await;

        let outcome = match outcome {
            Ok((destination_id, uploaded)) => {
                enter(RunPhase::Reconciling);
                let deleted = RetentionReconciler::new(self.store.as_ref(), &plan.retry)
                    .reconcile(
                        plan.retention,
                        &plan.parent_folder_id,
                        plan.retention_scope(),
                        plan.timestamp,
                    )
                    .await;

                Ok(RunReport {
                    timestamp: plan.timestamp,
                    destination_id,
                    uploaded,
                    deleted,
                })
            }
            Err(e) => Err(e),
        };

        enter(RunPhase::CleaningUp);
        cleanup(&plan.temp_root, &run_dir);

        outcome
    }

    async fn produce_and_upload(
        &self,
        plan: &RunPlan,
        run_dir: &Path,
    ) -> Result<(String, Vec<UploadedArtifact>), RunError> {
        enter(RunPhase::ProducingArchives);
        let artifacts = self.produce_all(plan, run_dir).await?;

        enter(RunPhase::Uploading);
        let destination_id = self.resolve_destination(plan).await?;
        let uploaded = self.upload_all(plan, &artifacts, &destination_id).await?;

        Ok((destination_id, uploaded))
    }

    /// Run every enabled producer concurrently; all must succeed
    async fn produce_all(&self, plan: &RunPlan, run_dir: &Path) -> Result<Vec<ArchiveArtifact>, RunError> {
        let request = ProduceRequest {
            output_dir: run_dir.to_path_buf(),
            timestamp: plan.timestamp,
            passphrase: plan.passphrase.clone(),
        };

        let tasks = plan.sources.iter().map(|&kind| {
            let producer = self.producers.get(&kind).cloned();
            let request = &request;
            async move {
                let result = match producer {
                    Some(producer) => producer.produce(request).await,
                    None => Err(anyhow::anyhow!("{} source is not configured", kind)),
                };
                (kind, result)
            }
        });

        let mut artifacts = Vec::new();
        let mut failed = Vec::new();
        let mut messages = Vec::new();

        for (kind, result) in join_all(tasks).await {
            match result {
                Ok(artifact) => {
                    info!("Produced {} archive: {}", kind, artifact.local_path.display());
                    artifacts.push(artifact);
                }
                Err(e) => {
                    error!("Failed to produce {} archive: {:#}", kind, e);
                    failed.push(kind);
                    messages.push(format!("{}: {:#}", kind, e));
                }
            }
        }

        if !failed.is_empty() {
            return Err(RunError::Producer {
                failed,
                message: messages.join("; "),
            });
        }

        Ok(artifacts)
    }

    /// Folder the archives of this run are uploaded into
    async fn resolve_destination(&self, plan: &RunPlan) -> Result<String, RunError> {
        match plan.grouping {
            GroupingMode::Flat => Ok(plan.parent_folder_id.clone()),
            GroupingMode::DatedFolder => {
                let store = self.store.as_ref();
                let name = plan.folder_name();
                let (name, parent) = (name.as_str(), plan.parent_folder_id.as_str());

                with_retry(&plan.retry, "Resolve backup folder", move || {
                    find_or_create_folder(store, name, parent)
                })
                .await
                .map_err(|e| RunError::Upload {
                    failed: Vec::new(),
                    message: format!("could not resolve folder {}: {}", name, e),
                })
            }
        }
    }

    /// Upload every artifact concurrently; all must succeed
    async fn upload_all(
        &self,
        plan: &RunPlan,
        artifacts: &[ArchiveArtifact],
        destination_id: &str,
    ) -> Result<Vec<UploadedArtifact>, RunError> {
        let store = self.store.as_ref();

        let tasks = artifacts.iter().map(|artifact| {
            let name = artifact.file_name();
            let retry = &plan.retry;
            async move {
                let what = format!("Upload of {}", name);
                let result = {
                    let (path, file_name) = (artifact.path(), name.as_str());
                    with_retry(retry, &what, move || store.upload_file(path, file_name, destination_id)).await
                };
                (name, result)
            }
        });

        let mut uploaded = Vec::new();
        let mut failed = Vec::new();
        let mut messages = Vec::new();

        for (name, result) in join_all(tasks).await {
            match result {
                Ok(remote_id) => {
                    info!("Uploaded {} ({})", name, remote_id);
                    uploaded.push(UploadedArtifact { name, remote_id });
                }
                Err(e) => {
                    error!("Failed to upload {}: {}", name, e);
                    messages.push(format!("{}: {}", name, e));
                    failed.push(name);
                }
            }
        }

        if !failed.is_empty() {
            return Err(RunError::Upload {
                failed,
                message: messages.join("; "),
            });
        }

        Ok(uploaded)
    }
}

fn enter(phase: RunPhase) {
    info!("Run phase: {}", phase);
}

/// Remove this run's directory, then anything else left in the temp root
fn cleanup(temp_root: &Path, run_dir: &Path) {
    if run_dir.exists() {
        if let Err(e) = fs::remove_dir_all(run_dir) {
            warn!("Failed to remove run directory {}: {}", run_dir.display(), e);
        }
    }

    let entries = match fs::read_dir(temp_root) {
        Ok(entries) => entries,
        Err(e) => {
            warn!("Failed to read temp directory {}: {}", temp_root.display(), e);
            return;
        }
    };

    for entry in entries.flatten() {
        let path = entry.path();
        let removed = match entry.file_type() {
            Ok(t) if t.is_dir() => fs::remove_dir_all(&path),
            _ => fs::remove_file(&path),
        };
        match removed {
            Ok(()) => info!("Removed stray temp entry {}", path.display()),
            Err(e) => warn!("Failed to remove temp entry {}: {}", path.display(), e),
        }
    }
}
