use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Root configuration structure
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct Config {
    #[serde(default)]
    pub general: GeneralConfig,
    #[serde(default)]
    pub website: WebsiteConfig,
    #[serde(default)]
    pub database: DatabaseConfig,
    pub drive: DriveConfig,
    #[serde(default)]
    pub backup: BackupSettings,
}

/// Process-wide settings
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct GeneralConfig {
    /// Directory holding archives while a run is in flight
    #[serde(default = "default_temp_directory")]
    pub temp_directory: PathBuf,

    /// Cron expression for automatic runs (5 or 6 fields)
    #[serde(default = "default_schedule")]
    pub schedule: String,

    /// Logging configuration
    #[serde(default = "default_log_directory")]
    pub log_directory: PathBuf,
    #[serde(default = "default_log_level")]
    pub log_level: String,
    #[serde(default = "default_log_max_files")]
    pub log_max_files: u32,
}

impl Default for GeneralConfig {
    fn default() -> Self {
        Self {
            temp_directory: default_temp_directory(),
            schedule: default_schedule(),
            log_directory: default_log_directory(),
            log_level: default_log_level(),
            log_max_files: default_log_max_files(),
        }
    }
}

/// Website (filesystem tree) source
#[derive(Debug, Clone, Deserialize, Serialize, Default)]
pub struct WebsiteConfig {
    #[serde(default)]
    pub enabled: bool,

    /// Root directory archived for the website source
    #[serde(default)]
    pub path: Option<PathBuf>,
}

/// Database source, dumped through an external tool
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct DatabaseConfig {
    #[serde(default)]
    pub enabled: bool,
    #[serde(default)]
    pub host: String,
    #[serde(default)]
    pub port: Option<u16>,
    #[serde(default)]
    pub user: String,
    #[serde(default)]
    pub password: String,
    #[serde(default)]
    pub name: String,

    /// Dump program, resolved through PATH when not absolute
    #[serde(default = "default_dump_program")]
    pub dump_program: String,

    /// Extra arguments placed before the database name
    #[serde(default)]
    pub extra_args: Vec<String>,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            host: String::new(),
            port: None,
            user: String::new(),
            password: String::new(),
            name: String::new(),
            dump_program: default_dump_program(),
            extra_args: Vec::new(),
        }
    }
}

/// Remote store (Google Drive) settings
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct DriveConfig {
    /// Parent folder for uploads and retention scans
    pub folder_id: String,

    #[serde(default = "default_api_base")]
    pub api_base: String,
    #[serde(default = "default_upload_base")]
    pub upload_base: String,

    pub auth: AuthConfig,
}

/// Credential material consumed by the token providers
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq, Eq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum AuthConfig {
    /// Interactive consent flow, long-lived refresh token
    #[serde(rename = "oauth")]
    OAuth {
        client_id: String,
        client_secret: String,
        #[serde(default = "default_redirect_uri")]
        redirect_uri: String,
        #[serde(default)]
        refresh_token: String,
        #[serde(default = "default_token_uri")]
        token_uri: String,
    },
    /// Non-interactive service identity
    ServiceAccount { key_file: PathBuf },
}

/// How uploads are laid out in the destination folder
#[derive(Debug, Clone, Copy, Deserialize, Serialize, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum GroupingMode {
    /// Each archive lands directly in the destination folder
    #[default]
    Flat,
    /// Archives land in a per-run folder named after the run timestamp
    DatedFolder,
}

/// Backup behaviour shared by every run
#[derive(Debug, Clone, Deserialize, Serialize, Default)]
pub struct BackupSettings {
    #[serde(default)]
    pub grouping: GroupingMode,

    /// Optional archive passphrase; empty means unprotected
    #[serde(default)]
    pub archive_password: String,

    #[serde(default)]
    pub retention: RetentionConfig,

    #[serde(default)]
    pub retry: RetryConfig,
}

#[derive(Debug, Clone, Copy, Deserialize, Serialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum RetentionKind {
    MaxAge,
    MaxCount,
}

/// Retention settings as written in the config file
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct RetentionConfig {
    /// Explicit policy; follows the grouping mode when omitted
    #[serde(default)]
    pub policy: Option<RetentionKind>,
    #[serde(default = "default_retention_days")]
    pub days: u32,
    #[serde(default = "default_retention_keep")]
    pub keep: u32,
}

/// Resolved retention policy, exactly one per run
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RetentionPolicy {
    /// Delete entries created more than `days` days ago
    MaxAge { days: u32 },
    /// Keep only the newest `keep` entries
    MaxCount { keep: u32 },
}

impl Default for RetentionConfig {
    fn default() -> Self {
        Self {
            policy: None,
            days: default_retention_days(),
            keep: default_retention_keep(),
        }
    }
}

impl RetentionConfig {
    /// Pick the policy for a run, falling back to the one paired with `grouping`
    pub fn resolve(&self, grouping: GroupingMode) -> RetentionPolicy {
        let kind = self.policy.unwrap_or(match grouping {
            GroupingMode::Flat => RetentionKind::MaxAge,
            GroupingMode::DatedFolder => RetentionKind::MaxCount,
        });

        match kind {
            RetentionKind::MaxAge => RetentionPolicy::MaxAge { days: self.days },
            RetentionKind::MaxCount => RetentionPolicy::MaxCount { keep: self.keep },
        }
    }
}

/// Backoff applied around remote calls
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct RetryConfig {
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,
    #[serde(default = "default_initial_delay_ms")]
    pub initial_delay_ms: u64,
    #[serde(default = "default_max_delay_ms")]
    pub max_delay_ms: u64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: default_max_attempts(),
            initial_delay_ms: default_initial_delay_ms(),
            max_delay_ms: default_max_delay_ms(),
        }
    }
}

// Default value functions

fn default_temp_directory() -> PathBuf {
    std::env::temp_dir().join("drive-backup")
}
fn default_schedule() -> String { "0 3 * * *".to_string() }
fn default_log_directory() -> PathBuf { PathBuf::from("~/logs") }
fn default_log_level() -> String { "info".to_string() }
fn default_log_max_files() -> u32 { 10 }
fn default_dump_program() -> String { "mysqldump".to_string() }
fn default_api_base() -> String { "https://www.googleapis.com/drive/v3".to_string() }
fn default_upload_base() -> String { "https://www.googleapis.com/upload/drive/v3".to_string() }
fn default_redirect_uri() -> String { "http://localhost:3000/oauth2callback".to_string() }
fn default_token_uri() -> String { "https://oauth2.googleapis.com/token".to_string() }
fn default_retention_days() -> u32 { 7 }
fn default_retention_keep() -> u32 { 7 }
fn default_max_attempts() -> u32 { 3 }
fn default_initial_delay_ms() -> u64 { 500 }
fn default_max_delay_ms() -> u64 { 8000 }
