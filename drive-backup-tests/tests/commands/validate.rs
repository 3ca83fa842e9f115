//! Tests for configuration validation as the validate command performs it
//!
//! Configs are written to disk and loaded back the same way the binary does.

use drive_backup::config::{load_config, ConfigError};
use std::fs;
use test_utils::{invalid_config_toml, ConfigBuilder, ResultAssertions, RunOverrides, RunPlan};

#[test]
fn test_validate_written_config() {
    let builder = ConfigBuilder::new().with_website().with_database("shop");
    let path = builder.write_to("drive-backup.toml");

    let config = load_config(&path).assert_ok();

    assert!(config.website.enabled);
    assert!(config.database.enabled);
}

#[test]
fn test_validate_missing_file() {
    let builder = ConfigBuilder::new();
    let result = load_config(builder.temp_dir().join("absent.toml"));

    assert!(matches!(result, Err(ConfigError::ReadError(_))));
}

#[test]
fn test_validate_rejects_invalid_config() {
    let builder = ConfigBuilder::new();
    let path = builder.temp_dir().join("drive-backup.toml");
    fs::write(&path, invalid_config_toml()).unwrap();

    load_config(&path).assert_err_contains("website.path");
}

#[test]
fn test_validate_rejects_malformed_toml() {
    let builder = ConfigBuilder::new();
    let path = builder.temp_dir().join("drive-backup.toml");
    fs::write(&path, "[drive\nfolder_id = ").unwrap();

    assert!(matches!(load_config(&path), Err(ConfigError::ParseError(_))));
}

#[test]
fn test_loaded_config_plans_enabled_sources() {
    let builder = ConfigBuilder::new().with_database("shop").with_passphrase("pw");
    let path = builder.write_to("drive-backup.toml");
    let config = load_config(&path).assert_ok();

    let plan = RunPlan::new(&config, &RunOverrides::default(), chrono::Utc::now());

    assert_eq!(plan.sources, vec![test_utils::SourceKind::Database]);
    assert_eq!(plan.passphrase.as_deref(), Some("pw"));
    assert_eq!(plan.parent_folder_id, "root-folder");
}
