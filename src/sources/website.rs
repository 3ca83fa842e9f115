//! Website source: archives a directory tree

use super::{ArchiveArtifact, ProduceRequest, SourceKind, SourceProducer};
use crate::utils::archive;
use anyhow::{Context, Result};
use async_trait::async_trait;
use std::path::PathBuf;
use tracing::info;

pub struct WebsiteSource {
    root: PathBuf,
}

impl WebsiteSource {
    pub fn new(root: PathBuf) -> Self {
        Self { root }
    }
}

#[async_trait]
impl SourceProducer for WebsiteSource {
    fn kind(&self) -> SourceKind {
        SourceKind::Website
    }

    async fn produce(&self, request: &ProduceRequest) -> Result<ArchiveArtifact> {
        let dest = request
            .output_dir
            .join(format!("website_backup_{}.zip", request.file_timestamp()));

        if request.passphrase.is_some() {
            info!("Creating passphrase-protected website archive...");
        } else {
            info!("Creating website archive without passphrase...");
        }

        let root = self.root.clone();
        let passphrase = request.passphrase.clone();
        let target = dest.clone();
        tokio::task::spawn_blocking(move || {
            archive::archive_directory(&root, &target, passphrase.as_deref())
        })
        .await
        .context("Website archive task panicked")?
        .with_context(|| format!("Failed to archive website at {}", self.root.display()))?;

        info!("Website backup created: {}", dest.display());
        Ok(ArchiveArtifact::new(SourceKind::Website, dest))
    }
}
