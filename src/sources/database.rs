//! Database source: dumps through an external tool, then compresses the dump

use super::{ArchiveArtifact, ProduceRequest, SourceKind, SourceProducer};
use crate::config::DatabaseConfig;
use crate::utils::archive;
use crate::utils::executor::CommandExecutor;
use anyhow::{Context, Result};
use async_trait::async_trait;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{info, warn};

pub struct DatabaseSource {
    config: DatabaseConfig,
    executor: Arc<dyn CommandExecutor>,
}

impl DatabaseSource {
    pub fn new(config: DatabaseConfig, executor: Arc<dyn CommandExecutor>) -> Self {
        Self { config, executor }
    }

    /// Dump tool arguments. The password travels in the environment instead.
    pub fn dump_args(&self) -> Vec<String> {
        let mut args = vec!["-h".to_string(), self.config.host.clone()];

        if let Some(port) = self.config.port {
            args.push("-P".to_string());
            args.push(port.to_string());
        }

        args.push("-u".to_string());
        args.push(self.config.user.clone());
        args.extend(self.config.extra_args.iter().cloned());
        args.push(self.config.name.clone());
        args
    }

    fn dump_envs(&self) -> Vec<(String, String)> {
        if self.config.password.is_empty() {
            Vec::new()
        } else {
            vec![("MYSQL_PWD".to_string(), self.config.password.clone())]
        }
    }
}

#[async_trait]
impl SourceProducer for DatabaseSource {
    fn kind(&self) -> SourceKind {
        SourceKind::Database
    }

    async fn produce(&self, request: &ProduceRequest) -> Result<ArchiveArtifact> {
        tokio::fs::create_dir_all(&request.output_dir).await.with_context(|| {
            format!("Failed to create output directory: {}", request.output_dir.display())
        })?;

        let dump_path = request
            .output_dir
            .join(format!("db_backup_{}.sql", request.file_timestamp()));
        let zip_path = PathBuf::from(format!("{}.zip", dump_path.display()));

        info!(
            "Dumping database '{}' on {} with {}...",
            self.config.name, self.config.host, self.config.dump_program
        );

        self.executor
            .run_to_file(
                &self.config.dump_program,
                &self.dump_args(),
                &self.dump_envs(),
                &dump_path,
                None,
            )
            .await
            .with_context(|| format!("Database dump of '{}' failed", self.config.name))?;

        if request.passphrase.is_some() {
            info!("Creating passphrase-protected database archive...");
        } else {
            info!("Creating database archive without passphrase...");
        }

        let passphrase = request.passphrase.clone();
        let (source, target) = (dump_path.clone(), zip_path.clone());
        tokio::task::spawn_blocking(move || {
            archive::archive_file(&source, &target, passphrase.as_deref())
        })
        .await
        .context("Database archive task panicked")?
        .context("Failed to compress database dump")?;

        // Only the compressed copy is kept once it is complete
        if let Err(e) = tokio::fs::remove_file(&dump_path).await {
            warn!("Failed to remove uncompressed dump {}: {}", dump_path.display(), e);
        }

        info!("Database backup created: {}", zip_path.display());
        Ok(ArchiveArtifact::new(SourceKind::Database, zip_path))
    }
}
