//! Test fixtures and sample data
//!
//! Provides pre-built test data and templates for testing.

use chrono::{DateTime, Duration, Utc};
use drive_backup::utils::drive_ops::{EntryKind, RemoteEntry};
use std::fs;
use std::path::{Path, PathBuf};

/// Write a small website tree under `root` and return `root`
pub fn create_sample_site(root: &Path) -> PathBuf {
    let files: [(&str, &[u8]); 4] = [
        ("index.html", b"<html><body>Hello</body></html>"),
        ("css/style.css", b"body { margin: 0; }"),
        ("uploads/2025/01/logo.png", &[0x89, 0x50, 0x4e, 0x47, 0x0d, 0x0a, 0x1a, 0x0a]),
        ("wp-config.php", b"<?php define('DB_NAME', 'shop');"),
    ];

    for (relative, contents) in files {
        let path = root.join(relative);
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).expect("Failed to create site directory");
        }
        fs::write(&path, contents).expect("Failed to write site file");
    }

    fs::create_dir_all(root.join("cache")).expect("Failed to create empty directory");
    root.to_path_buf()
}

/// Relative paths of the files [`create_sample_site`] writes
pub fn sample_site_files() -> Vec<&'static str> {
    vec![
        "css/style.css",
        "index.html",
        "uploads/2025/01/logo.png",
        "wp-config.php",
    ]
}

/// A remote file created `age_days` days before `now`
pub fn remote_file(id: &str, age_days: i64, now: DateTime<Utc>) -> RemoteEntry {
    RemoteEntry {
        id: id.to_string(),
        name: format!("{}.zip", id),
        kind: EntryKind::File,
        created_at: now - Duration::days(age_days),
    }
}

/// A remote folder created `age_days` days before `now`
pub fn remote_folder(id: &str, age_days: i64, now: DateTime<Utc>) -> RemoteEntry {
    RemoteEntry {
        id: id.to_string(),
        name: format!("Backup_{}", id),
        kind: EntryKind::Folder,
        created_at: now - Duration::days(age_days),
    }
}

/// `count` dated folders, one per day, oldest first (`folder-00` is the oldest)
pub fn dated_folders(count: usize, now: DateTime<Utc>) -> Vec<RemoteEntry> {
    (0..count)
        .map(|i| remote_folder(&format!("folder-{:02}", i), (count - i) as i64, now))
        .collect()
}

/// Whether `dir` exists and holds no entries
pub fn dir_is_empty(dir: &Path) -> bool {
    fs::read_dir(dir)
        .map(|mut entries| entries.next().is_none())
        .unwrap_or(false)
}

/// Minimal valid config TOML with one website source and service account credentials
pub fn minimal_config_toml(site: &Path, key_file: &Path, temp_dir: &Path) -> String {
    format!(
        r#"
[general]
temp_directory = "{temp}"
schedule = "0 3 * * *"

[website]
enabled = true
path = "{site}"

[drive]
folder_id = "root-folder"

[drive.auth]
type = "service_account"
key_file = "{key}"
"#,
        temp = temp_dir.display(),
        site = site.display(),
        key = key_file.display(),
    )
}

/// Config TOML with dated folders, count retention and OAuth credentials
pub fn dated_folder_config_toml() -> &'static str {
    r#"
[general]
schedule = "30 2 * * *"

[website]
enabled = true
path = "/var/www/html"

[database]
enabled = true
host = "localhost"
user = "wordpress"
name = "wordpress"

[drive]
folder_id = "1AbCdEfGh"

[drive.auth]
type = "oauth"
client_id = "client.apps.googleusercontent.com"
client_secret = "secret"

[backup]
grouping = "dated_folder"
archive_password = "correct horse"

[backup.retention]
keep = 5
"#
}

/// Config TOML that fails validation (website enabled without a path)
pub fn invalid_config_toml() -> &'static str {
    r#"
[website]
enabled = true

[drive]
folder_id = "root-folder"

[drive.auth]
type = "service_account"
key_file = "/etc/drive-backup/key.json"
"#
}
