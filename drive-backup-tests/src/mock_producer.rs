//! Configurable source producer for run tests

use crate::EventLog;
use anyhow::{bail, Result};
use async_trait::async_trait;
use drive_backup::sources::{ArchiveArtifact, ProduceRequest, SourceKind, SourceProducer};
use parking_lot::Mutex;
use std::sync::Arc;
use std::time::Duration;

/// Producer that writes a placeholder archive, optionally slowly or not at all
#[derive(Clone)]
pub struct MockProducer {
    kind: SourceKind,
    delay: Duration,
    failure: Option<String>,
    events: Option<EventLog>,
    produced: Arc<Mutex<u32>>,
}

impl MockProducer {
    pub fn new(kind: SourceKind) -> Self {
        Self {
            kind,
            delay: Duration::ZERO,
            failure: None,
            events: None,
            produced: Arc::new(Mutex::new(0)),
        }
    }

    /// Sleep before finishing the archive
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    /// Leave a partial file behind and fail with `message`
    pub fn failing(mut self, message: &str) -> Self {
        self.failure = Some(message.to_string());
        self
    }

    /// Append `produced:<kind>` or `failed:<kind>` to a shared log
    pub fn with_event_log(mut self, events: EventLog) -> Self {
        self.events = Some(events);
        self
    }

    /// Number of archives this producer finished
    pub fn produce_count(&self) -> u32 {
        *self.produced.lock()
    }

    pub fn boxed(self) -> Arc<dyn SourceProducer> {
        Arc::new(self)
    }

    fn event(&self, event: String) {
        if let Some(ref events) = self.events {
            events.lock().unwrap().push(event);
        }
    }
}

#[async_trait]
impl SourceProducer for MockProducer {
    fn kind(&self) -> SourceKind {
        self.kind
    }

    async fn produce(&self, request: &ProduceRequest) -> Result<ArchiveArtifact> {
        tokio::fs::create_dir_all(&request.output_dir).await?;
        let path = request
            .output_dir
            .join(format!("{}_backup_{}.zip", self.kind, request.file_timestamp()));

        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }

        if let Some(ref message) = self.failure {
            tokio::fs::write(&path, b"partial").await?;
            self.event(format!("failed:{}", self.kind));
            bail!("{}", message);
        }

        tokio::fs::write(&path, format!("{} archive", self.kind)).await?;
        *self.produced.lock() += 1;
        self.event(format!("produced:{}", self.kind));
        Ok(ArchiveArtifact::new(self.kind, path))
    }
}
