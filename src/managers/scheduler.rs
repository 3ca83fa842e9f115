//! Cron trigger for unattended runs
//!
//! Each tick starts one backup run. A failed run is logged and the scheduler
//! keeps waiting for the next tick; overlapping ticks are turned away by the
//! run lock.

use crate::managers::backup::{BackupManager, RunOverrides};
use crate::utils::cron::normalize_schedule;
use anyhow::{Context, Result};
use std::sync::Arc;
use tokio_cron_scheduler::{Job, JobScheduler};
use tracing::{info, warn};

/// Build a scheduler with one job that runs a backup on `schedule`
pub async fn build_scheduler(manager: Arc<BackupManager>, schedule: &str) -> Result<JobScheduler> {
    let scheduler = JobScheduler::new()
        .await
        .context("Failed to create scheduler")?;

    let cron = normalize_schedule(schedule);
    let job = Job::new_async(cron.as_str(), move |_uuid, _l| {
        let manager = manager.clone();
        Box::pin(async move {
            info!("Scheduled backup triggered");
            if let Err(e) = manager.run(&RunOverrides::default()).await {
                warn!("Scheduled run ended without completing: {}", e);
            }
        })
    })
    .with_context(|| format!("Invalid schedule: {}", schedule))?;

    scheduler
        .add(job)
        .await
        .context("Failed to register backup job")?;

    Ok(scheduler)
}

/// Serve the schedule until SIGINT or SIGTERM
pub async fn run_scheduler_forever(manager: Arc<BackupManager>) -> Result<()> {
    let schedule = manager.config().general.schedule.clone();
    let mut scheduler = build_scheduler(manager, &schedule).await?;

    scheduler.start().await.context("Failed to start scheduler")?;
    info!("Backup scheduled: {}", schedule);

    wait_for_shutdown_signal().await?;
    info!("Shutdown signal received, stopping scheduler");

    if let Err(e) = scheduler.shutdown().await {
        warn!("Scheduler did not shut down cleanly: {}", e);
    }
    Ok(())
}

async fn wait_for_shutdown_signal() -> Result<()> {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{signal, SignalKind};
        let mut sigterm = signal(SignalKind::terminate()).context("Failed to register SIGTERM handler")?;
        let mut sigint = signal(SignalKind::interrupt()).context("Failed to register SIGINT handler")?;
        tokio::select! {
            _ = sigterm.recv() => {},
            _ = sigint.recv() => {},
        }
    }

    #[cfg(not(unix))]
    {
        tokio::signal::ctrl_c()
            .await
            .context("Failed to listen for Ctrl-C")?;
    }

    Ok(())
}
