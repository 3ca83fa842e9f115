//! Fluent API for building test configurations
//!
//! Provides a builder pattern for creating test configurations with sensible defaults.
//! Every path points inside a temp directory owned by the builder.

use crate::fixtures::create_sample_site;
use drive_backup::config::{
    AuthConfig, BackupSettings, Config, DatabaseConfig, DriveConfig, GeneralConfig, GroupingMode,
    RetentionConfig, RetentionKind, RetryConfig, WebsiteConfig,
};
use std::fs;
use std::path::{Path, PathBuf};
use tempfile::TempDir;

/// Parent folder id used by every built configuration
pub const TEST_FOLDER_ID: &str = "root-folder";

/// Builder for creating test configurations
pub struct ConfigBuilder {
    temp_dir: TempDir,
    config: Config,
}

impl ConfigBuilder {
    /// Create a new ConfigBuilder with no sources enabled
    pub fn new() -> Self {
        let temp_dir = TempDir::new().expect("Failed to create temp dir");

        // Service account key; only its path is checked before a run
        let key_file = temp_dir.path().join("key.json");
        fs::write(&key_file, "{}").expect("Failed to write key file");

        let log_directory = temp_dir.path().join("logs");
        fs::create_dir_all(&log_directory).expect("Failed to create log_directory");

        let general = GeneralConfig {
            temp_directory: temp_dir.path().join("work"),
            schedule: "0 3 * * *".to_string(),
            log_directory,
            log_level: "info".to_string(),
            log_max_files: 5,
        };

        let drive = DriveConfig {
            folder_id: TEST_FOLDER_ID.to_string(),
            // Unroutable; tests talk to MockRemoteStore instead
            api_base: "http://127.0.0.1:9/drive/v3".to_string(),
            upload_base: "http://127.0.0.1:9/upload/drive/v3".to_string(),
            auth: AuthConfig::ServiceAccount { key_file },
        };

        let backup = BackupSettings {
            retry: RetryConfig {
                max_attempts: 3,
                initial_delay_ms: 1,
                max_delay_ms: 5,
            },
            ..Default::default()
        };

        Self {
            temp_dir,
            config: Config {
                general,
                website: WebsiteConfig::default(),
                database: DatabaseConfig::default(),
                drive,
                backup,
            },
        }
    }

    /// Enable the website source over a generated sample site
    pub fn with_website(self) -> Self {
        let site = create_sample_site(&self.temp_dir.path().join("site"));
        self.with_website_path(&site)
    }

    /// Enable the website source over an existing directory
    pub fn with_website_path(mut self, path: &Path) -> Self {
        self.config.website = WebsiteConfig {
            enabled: true,
            path: Some(path.to_path_buf()),
        };
        self
    }

    /// Enable the database source for the given database name
    pub fn with_database(mut self, name: &str) -> Self {
        self.config.database = DatabaseConfig {
            enabled: true,
            host: "db.test".to_string(),
            user: "backup".to_string(),
            password: "secret".to_string(),
            name: name.to_string(),
            ..Default::default()
        };
        self
    }

    /// Set the upload layout
    pub fn grouping(mut self, grouping: GroupingMode) -> Self {
        self.config.backup.grouping = grouping;
        self
    }

    /// Delete backups older than `days`
    pub fn max_age(mut self, days: u32) -> Self {
        self.config.backup.retention = RetentionConfig {
            policy: Some(RetentionKind::MaxAge),
            days,
            ..self.config.backup.retention
        };
        self
    }

    /// Keep only the newest `keep` backups
    pub fn max_count(mut self, keep: u32) -> Self {
        self.config.backup.retention = RetentionConfig {
            policy: Some(RetentionKind::MaxCount),
            keep,
            ..self.config.backup.retention
        };
        self
    }

    /// Set the archive passphrase
    pub fn with_passphrase(mut self, passphrase: &str) -> Self {
        self.config.backup.archive_password = passphrase.to_string();
        self
    }

    /// Set the retry settings
    pub fn with_retry(mut self, retry: RetryConfig) -> Self {
        self.config.backup.retry = retry;
        self
    }

    /// Set the cron schedule
    pub fn with_schedule(mut self, schedule: &str) -> Self {
        self.config.general.schedule = schedule.to_string();
        self
    }

    /// Switch to OAuth credentials
    pub fn with_oauth(mut self, client_id: &str, client_secret: &str, refresh_token: &str) -> Self {
        self.config.drive.auth = AuthConfig::OAuth {
            client_id: client_id.to_string(),
            client_secret: client_secret.to_string(),
            redirect_uri: "http://localhost:3000/oauth2callback".to_string(),
            refresh_token: refresh_token.to_string(),
            token_uri: "http://127.0.0.1:9/token".to_string(),
        };
        self
    }

    /// Get the temp directory path
    pub fn temp_dir(&self) -> &Path {
        self.temp_dir.path()
    }

    /// Directory runs stage their archives in
    pub fn work_dir(&self) -> PathBuf {
        self.config.general.temp_directory.clone()
    }

    /// Build the Config
    pub fn build(self) -> Config {
        self.config
    }

    /// Keep the temp directory (don't delete on drop)
    pub fn persist(self) -> (Config, TempDir) {
        (self.config, self.temp_dir)
    }

    /// Write the configuration as TOML and return its path
    pub fn write_to(&self, file_name: &str) -> PathBuf {
        let path = self.temp_dir.path().join(file_name);
        let contents = toml::to_string(&self.config).expect("Failed to serialize config");
        fs::write(&path, contents).expect("Failed to write config file");
        path
    }
}

impl Default for ConfigBuilder {
    fn default() -> Self {
        Self::new()
    }
}
