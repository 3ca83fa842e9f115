//! Configuration parsing, environment overrides and validation

use drive_backup::config::{
    apply_env_overrides, load_config, parse_config, validate_config, AuthConfig, ConfigError,
    GroupingMode, RetentionPolicy,
};
use rstest::rstest;
use std::collections::HashMap;
use test_utils::{dated_folder_config_toml, invalid_config_toml, minimal_config_toml, ConfigBuilder};

fn env(pairs: &[(&str, &str)]) -> HashMap<String, String> {
    pairs
        .iter()
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .collect()
}

#[test]
fn test_dated_folder_config_parses() {
    let config = parse_config(dated_folder_config_toml()).unwrap();
    validate_config(&config).unwrap();

    assert_eq!(config.backup.grouping, GroupingMode::DatedFolder);
    assert_eq!(
        config.backup.retention.resolve(config.backup.grouping),
        RetentionPolicy::MaxCount { keep: 5 }
    );
    assert!(matches!(config.drive.auth, AuthConfig::OAuth { .. }));
    assert_eq!(config.database.dump_program, "mysqldump");
}

#[test]
fn test_minimal_config_loads_from_disk() {
    let builder = ConfigBuilder::new();
    let site = test_utils::create_sample_site(&builder.temp_dir().join("site"));
    let key_file = builder.temp_dir().join("key.json");
    let contents = minimal_config_toml(&site, &key_file, &builder.work_dir());
    let path = builder.temp_dir().join("drive-backup.toml");
    std::fs::write(&path, contents).unwrap();

    let config = load_config(&path).unwrap();

    assert!(config.website.enabled);
    assert!(!config.database.enabled);
    assert_eq!(config.backup.grouping, GroupingMode::Flat);
    assert_eq!(
        config.backup.retention.resolve(config.backup.grouping),
        RetentionPolicy::MaxAge { days: 7 }
    );
}

#[test]
fn test_invalid_config_is_rejected() {
    let config = parse_config(invalid_config_toml()).unwrap();
    let err = validate_config(&config).unwrap_err();

    assert!(matches!(err, ConfigError::ValidationError(_)));
    assert!(err.to_string().contains("website.path"));
}

#[test]
fn test_missing_drive_section_fails_to_parse() {
    let result = parse_config("[website]\nenabled = false\n");
    assert!(matches!(result, Err(ConfigError::ParseError(_))));
}

#[test]
fn test_env_overrides_file_values() {
    let mut config = parse_config(dated_folder_config_toml()).unwrap();
    let vars = env(&[
        ("BACKUP_DATABASE", "no"),
        ("GOOGLE_DRIVE_FOLDER_ID", "from-env"),
        ("GOOGLE_REFRESH_TOKEN", "1//refresh"),
        ("MAX_BACKUPS", "12"),
    ]);

    apply_env_overrides(&mut config, |name| vars.get(name).cloned()).unwrap();

    assert!(!config.database.enabled);
    assert_eq!(config.drive.folder_id, "from-env");
    assert_eq!(config.backup.retention.keep, 12);
    match config.drive.auth {
        AuthConfig::OAuth { refresh_token, .. } => assert_eq!(refresh_token, "1//refresh"),
        other => panic!("unexpected auth {:?}", other),
    }
}

#[rstest]
#[case("true", true)]
#[case("1", true)]
#[case("YES", true)]
#[case("false", false)]
#[case("0", false)]
#[case("", false)]
fn test_source_toggle_values(#[case] value: &str, #[case] expected: bool) {
    let mut config = ConfigBuilder::new().build();
    let vars = env(&[("BACKUP_WEBSITE", value)]);

    apply_env_overrides(&mut config, |name| vars.get(name).cloned()).unwrap();
    assert_eq!(config.website.enabled, expected);
}

#[rstest]
#[case("BACKUP_WEBSITE", "sometimes")]
#[case("DB_PORT", "not-a-port")]
#[case("RETENTION_DAYS", "-3")]
fn test_unparsable_env_values(#[case] name: &str, #[case] value: &str) {
    let mut config = ConfigBuilder::new().build();
    let vars = env(&[(name, value)]);

    let result = apply_env_overrides(&mut config, |n| vars.get(n).cloned());
    assert!(matches!(result, Err(ConfigError::InvalidEnvValue { .. })));
}

#[test]
fn test_enabled_database_needs_connection_details() {
    let mut config = ConfigBuilder::new().with_database("shop").build();
    config.database.host.clear();
    config.database.user.clear();

    let err = validate_config(&config).unwrap_err().to_string();
    assert!(err.contains("database.host"));
    assert!(err.contains("database.user"));
}

#[test]
fn test_zero_retention_is_rejected() {
    let config = ConfigBuilder::new().with_website().max_count(0).build();
    assert!(validate_config(&config).is_err());
}

#[test]
fn test_bad_schedule_is_rejected() {
    let config = ConfigBuilder::new().with_schedule("every night").build();
    assert!(validate_config(&config).is_err());
}

#[test]
fn test_oauth_needs_client_credentials() {
    let config = ConfigBuilder::new().with_oauth("", "", "").build();
    let err = validate_config(&config).unwrap_err().to_string();
    assert!(err.contains("client_id"));

    let config = ConfigBuilder::new().with_oauth("id", "secret", "").build();
    assert!(validate_config(&config).is_ok());
}

#[test]
fn test_no_sources_is_still_a_valid_config() {
    // The run aborts instead; validation only checks what is enabled
    let config = ConfigBuilder::new().build();
    assert!(validate_config(&config).is_ok());
}
