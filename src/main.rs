use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use drive_backup::config::{self, AuthConfig, Config, GroupingMode, RetentionPolicy};
use drive_backup::managers::backup::{BackupManager, RunOverrides, RunPhase};
use drive_backup::managers::logging::{self, LoggingConfig};
use drive_backup::managers::scheduler;
use drive_backup::sources::SourceKind;
use drive_backup::utils::authorize;
use drive_backup::utils::drive::DriveClient;
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::sync::Arc;

#[derive(Parser)]
#[command(name = "drive-backup")]
#[command(about = "Scheduled website and database backups to Google Drive", long_about = None)]
#[command(version)]
struct Cli {
    /// Path to configuration file
    #[arg(short, long, default_value = "drive-backup.toml", global = true)]
    config: PathBuf,

    /// Run one backup immediately and exit
    #[arg(long)]
    run_now: bool,

    /// Run one backup of the website only and exit
    #[arg(long, conflicts_with = "database_only")]
    website_only: bool,

    /// Run one backup of the database only and exit
    #[arg(long)]
    database_only: bool,

    #[command(subcommand)]
    command: Option<Commands>,
}

impl Cli {
    /// Overrides for a one-shot run, or `None` to serve the schedule
    fn one_shot(&self) -> Option<RunOverrides> {
        let only = if self.website_only {
            Some(SourceKind::Website)
        } else if self.database_only {
            Some(SourceKind::Database)
        } else {
            None
        };

        (self.run_now || only.is_some()).then_some(RunOverrides { only })
    }
}

#[derive(Subcommand)]
enum Commands {
    /// Obtain a refresh token through the browser consent flow
    Authorize,

    /// Validate configuration file
    Validate,
}

#[tokio::main]
async fn main() -> ExitCode {
    // A missing .env file is fine
    dotenv::dotenv().ok();

    let cli = Cli::parse();

    match run(cli).await {
        Ok(code) => code,
        Err(e) => {
            eprintln!("Error: {:#}", e);
            ExitCode::FAILURE
        }
    }
}

async fn run(cli: Cli) -> Result<ExitCode> {
    // Commands that don't need a fully valid config use console logging only
    match cli.command {
        Some(Commands::Authorize) => {
            logging::init_console_logging();
            return handle_authorize(&cli.config).await;
        }
        Some(Commands::Validate) => {
            logging::init_console_logging();
            return handle_validate(&cli.config);
        }
        None => {}
    }

    let config = config::load_config(&cli.config)
        .with_context(|| format!("Failed to load {}", cli.config.display()))?;

    // Setup logging with file rotation (must keep guard alive)
    let _log_guard = logging::init_logging(&LoggingConfig::from_config(&config.general))?;

    let client = DriveClient::from_config(&config.drive).context("Failed to create Drive client")?;
    let manager = Arc::new(BackupManager::new(config, Arc::new(client)));

    match cli.one_shot() {
        Some(overrides) => match manager.run(&overrides).await {
            Ok(report) => {
                println!(
                    "✓ Backup completed: {} archive(s) uploaded, {} old backup(s) removed",
                    report.uploaded.len(),
                    report.deleted
                );
                Ok(ExitCode::SUCCESS)
            }
            Err(e) if e.terminal_phase() == RunPhase::Aborted => {
                println!("Nothing to back up: {}", e);
                Ok(ExitCode::SUCCESS)
            }
            Err(e) => {
                eprintln!("✗ Backup failed: {}", e);
                Ok(ExitCode::FAILURE)
            }
        },
        None => {
            scheduler::run_scheduler_forever(manager).await?;
            Ok(ExitCode::SUCCESS)
        }
    }
}

/// Handle authorize command: config is parsed but not validated, since
/// the refresh token is usually what is still missing
async fn handle_authorize(path: &Path) -> Result<ExitCode> {
    let contents = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read {}", path.display()))?;
    let mut config = config::parse_config(&contents)?;
    config::apply_env_overrides(&mut config, |name| std::env::var(name).ok())?;

    let refresh_token = authorize::run_authorize(&config.drive.auth).await?;

    println!("\nAuthorization successful. Add this to your .env file:\n");
    println!("GOOGLE_REFRESH_TOKEN={}", refresh_token);
    Ok(ExitCode::SUCCESS)
}

/// Handle validate command
fn handle_validate(path: &Path) -> Result<ExitCode> {
    let config = config::load_config(path)
        .with_context(|| format!("Failed to load {}", path.display()))?;

    println!("Configuration is valid!");
    print_summary(&config);
    Ok(ExitCode::SUCCESS)
}

fn print_summary(config: &Config) {
    let on_off = |enabled: bool| if enabled { "enabled" } else { "disabled" };

    println!("Website backup: {}", on_off(config.website.enabled));
    println!("Database backup: {}", on_off(config.database.enabled));
    println!("Schedule: {}", config.general.schedule);
    println!("Drive folder: {}", config.drive.folder_id);
    println!(
        "Credentials: {}",
        match config.drive.auth {
            AuthConfig::OAuth { .. } => "oauth refresh token",
            AuthConfig::ServiceAccount { .. } => "service account",
        }
    );
    println!(
        "Grouping: {}",
        match config.backup.grouping {
            GroupingMode::Flat => "flat",
            GroupingMode::DatedFolder => "dated folder",
        }
    );
    match config.backup.retention.resolve(config.backup.grouping) {
        RetentionPolicy::MaxAge { days } => println!("Retention: delete after {} day(s)", days),
        RetentionPolicy::MaxCount { keep } => println!("Retention: keep newest {}", keep),
    }
    println!(
        "Archive passphrase: {}",
        if config.backup.archive_password.is_empty() { "none" } else { "set" }
    );
}
