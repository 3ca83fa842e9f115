use super::types::*;
use crate::utils::cron;
use std::fs;
use std::path::Path;

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    ReadError(#[from] std::io::Error),

    #[error("Failed to parse config file: {0}")]
    ParseError(#[from] toml::de::Error),

    #[error("Validation error: {0}")]
    ValidationError(String),

    #[error("Invalid value for {name}: {value}")]
    InvalidEnvValue { name: String, value: String },
}

pub type Result<T> = std::result::Result<T, ConfigError>;

/// Load configuration from a TOML file, apply environment overrides and validate
pub fn load_config<P: AsRef<Path>>(path: P) -> Result<Config> {
    let contents = fs::read_to_string(path)?;
    let mut config = parse_config(&contents)?;
    apply_env_overrides(&mut config, |name| std::env::var(name).ok())?;
    validate_config(&config)?;
    Ok(config)
}

/// Parse configuration without touching the environment or validating
pub fn parse_config(contents: &str) -> Result<Config> {
    Ok(toml::from_str(contents)?)
}

/// Override file values with environment variables.
///
/// `lookup` returns the value of a variable, if set.
pub fn apply_env_overrides<F>(config: &mut Config, lookup: F) -> Result<()>
where
    F: Fn(&str) -> Option<String>,
{
    if let Some(v) = lookup("BACKUP_WEBSITE") {
        config.website.enabled = parse_bool("BACKUP_WEBSITE", &v)?;
    }
    if let Some(v) = lookup("BACKUP_DATABASE") {
        config.database.enabled = parse_bool("BACKUP_DATABASE", &v)?;
    }
    if let Some(v) = lookup("WEBSITE_PATH") {
        config.website.path = Some(v.into());
    }
    if let Some(v) = lookup("DB_HOST") {
        config.database.host = v;
    }
    if let Some(v) = lookup("DB_PORT") {
        let port = v.parse().map_err(|_| ConfigError::InvalidEnvValue {
            name: "DB_PORT".to_string(),
            value: v.clone(),
        })?;
        config.database.port = Some(port);
    }
    if let Some(v) = lookup("DB_USER") {
        config.database.user = v;
    }
    if let Some(v) = lookup("DB_PASSWORD") {
        config.database.password = v;
    }
    if let Some(v) = lookup("DB_NAME") {
        config.database.name = v;
    }
    if let Some(v) = lookup("GOOGLE_DRIVE_FOLDER_ID") {
        config.drive.folder_id = v;
    }
    if let Some(v) = lookup("BACKUP_SCHEDULE") {
        config.general.schedule = v;
    }
    if let Some(v) = lookup("ARCHIVE_PASSWORD") {
        config.backup.archive_password = v;
    }
    if let Some(v) = lookup("MAX_BACKUPS") {
        config.backup.retention.keep = parse_u32("MAX_BACKUPS", &v)?;
    }
    if let Some(v) = lookup("RETENTION_DAYS") {
        config.backup.retention.days = parse_u32("RETENTION_DAYS", &v)?;
    }

    match &mut config.drive.auth {
        AuthConfig::OAuth {
            client_id,
            client_secret,
            redirect_uri,
            refresh_token,
            ..
        } => {
            if let Some(v) = lookup("GOOGLE_CLIENT_ID") {
                *client_id = v;
            }
            if let Some(v) = lookup("GOOGLE_CLIENT_SECRET") {
                *client_secret = v;
            }
            if let Some(v) = lookup("GOOGLE_REDIRECT_URI") {
                *redirect_uri = v;
            }
            if let Some(v) = lookup("GOOGLE_REFRESH_TOKEN") {
                *refresh_token = v;
            }
        }
        AuthConfig::ServiceAccount { key_file } => {
            if let Some(v) = lookup("GOOGLE_SERVICE_ACCOUNT_KEY") {
                *key_file = v.into();
            }
        }
    }

    Ok(())
}

fn parse_bool(name: &str, value: &str) -> Result<bool> {
    match value.trim().to_lowercase().as_str() {
        "true" | "1" | "yes" => Ok(true),
        "false" | "0" | "no" | "" => Ok(false),
        _ => Err(ConfigError::InvalidEnvValue {
            name: name.to_string(),
            value: value.to_string(),
        }),
    }
}

fn parse_u32(name: &str, value: &str) -> Result<u32> {
    value.trim().parse().map_err(|_| ConfigError::InvalidEnvValue {
        name: name.to_string(),
        value: value.to_string(),
    })
}

/// Validate the configuration
pub fn validate_config(config: &Config) -> Result<()> {
    if !cron::validate_cron_schedule(&config.general.schedule) {
        return Err(ConfigError::ValidationError(format!(
            "Invalid cron schedule format (expected 5 or 6 fields): {}",
            config.general.schedule
        )));
    }

    if config.drive.folder_id.trim().is_empty() {
        return Err(ConfigError::ValidationError(
            "drive.folder_id must not be empty".to_string(),
        ));
    }

    if config.website.enabled && config.website.path.is_none() {
        return Err(ConfigError::ValidationError(
            "Website backup is enabled but website.path is not set".to_string(),
        ));
    }

    if config.database.enabled {
        validate_database(&config.database)?;
    }

    let retention = &config.backup.retention;
    if retention.days == 0 || retention.keep == 0 {
        return Err(ConfigError::ValidationError(
            "Retention days and keep must be at least 1".to_string(),
        ));
    }

    if config.backup.retry.max_attempts == 0 {
        return Err(ConfigError::ValidationError(
            "retry.max_attempts must be at least 1".to_string(),
        ));
    }

    match &config.drive.auth {
        AuthConfig::OAuth {
            client_id,
            client_secret,
            ..
        } => {
            if client_id.is_empty() || client_secret.is_empty() {
                return Err(ConfigError::ValidationError(
                    "OAuth auth requires client_id and client_secret".to_string(),
                ));
            }
        }
        AuthConfig::ServiceAccount { key_file } => {
            if key_file.as_os_str().is_empty() {
                return Err(ConfigError::ValidationError(
                    "Service account auth requires key_file".to_string(),
                ));
            }
        }
    }

    Ok(())
}

fn validate_database(database: &DatabaseConfig) -> Result<()> {
    let missing: Vec<&str> = [
        ("host", &database.host),
        ("user", &database.user),
        ("name", &database.name),
    ]
    .iter()
    .filter(|(_, value)| value.trim().is_empty())
    .map(|(field, _)| *field)
    .collect();

    if !missing.is_empty() {
        return Err(ConfigError::ValidationError(format!(
            "Database backup is enabled but database.{} is not set",
            missing.join(", database.")
        )));
    }

    Ok(())
}
