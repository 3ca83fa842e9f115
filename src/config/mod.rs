//! Configuration module for drive-backup
//!
//! This module handles loading, validating, and overriding configuration.
//!
//! ## Sources of configuration
//!
//! Settings are applied in this order (later overrides earlier):
//! 1. Built-in defaults
//! 2. The TOML configuration file
//! 3. Environment variables (including a `.env` file read at startup)
//!
//! Command-line flags never modify the loaded [`Config`]; they are combined
//! with it into a per-run value by the backup manager.
//!
//! ## Example Usage
//!
//! ```no_run
//! use drive_backup::config;
//!
//! let config = config::load_config("drive-backup.toml")?;
//! println!("Uploading into folder {}", config.drive.folder_id);
//! # Ok::<(), config::ConfigError>(())
//! ```

mod loader;
mod types;

pub use loader::{
    apply_env_overrides, load_config, parse_config, validate_config, ConfigError, Result,
};
pub use types::*;

/// Expand tilde (~) in path
pub fn expand_tilde(path: &std::path::Path) -> std::path::PathBuf {
    if let Ok(stripped) = path.strip_prefix("~") {
        if let Some(home) = dirs::home_dir() {
            return home.join(stripped);
        }
    }
    path.to_path_buf()
}
