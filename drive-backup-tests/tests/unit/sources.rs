//! Archive producers against real directories and a mocked dump tool

use chrono::{TimeZone, Utc};
use drive_backup::utils::archive::extract_archive;
use std::fs;
use std::io::Read;
use std::path::Path;
use std::sync::Arc;
use tempfile::TempDir;
use test_utils::{
    create_sample_site, sample_site_files, DatabaseSource, MockExecutor, MockResponse,
    ProduceRequest, SourceKind, SourceProducer, WebsiteSource,
};

fn request(output_dir: &Path, passphrase: Option<&str>) -> ProduceRequest {
    ProduceRequest {
        output_dir: output_dir.to_path_buf(),
        timestamp: Utc.with_ymd_and_hms(2025, 6, 1, 3, 0, 0).unwrap(),
        passphrase: passphrase.map(str::to_string),
    }
}

fn database_config() -> drive_backup::config::DatabaseConfig {
    drive_backup::config::DatabaseConfig {
        enabled: true,
        host: "db.test".to_string(),
        user: "backup".to_string(),
        password: "secret".to_string(),
        name: "shop".to_string(),
        ..Default::default()
    }
}

fn entry_names(archive: &Path) -> Vec<String> {
    let file = fs::File::open(archive).unwrap();
    let mut zip = zip::ZipArchive::new(file).unwrap();
    let mut names: Vec<String> = (0..zip.len())
        .map(|i| zip.by_index_raw(i).unwrap().name().to_string())
        .collect();
    names.sort();
    names
}

#[tokio::test]
async fn test_website_archive_contains_site_tree() {
    let temp = TempDir::new().unwrap();
    let site = create_sample_site(&temp.path().join("site"));
    let out = temp.path().join("out");

    let artifact = WebsiteSource::new(site)
        .produce(&request(&out, None))
        .await
        .unwrap();

    assert_eq!(artifact.source_kind, SourceKind::Website);
    assert_eq!(artifact.file_name(), "website_backup_2025-06-01T03-00-00.zip");

    let names = entry_names(artifact.path());
    for file in sample_site_files() {
        assert!(names.iter().any(|n| n == file), "{} missing from {:?}", file, names);
    }
}

#[tokio::test]
async fn test_protected_archive_round_trips_with_passphrase() {
    let temp = TempDir::new().unwrap();
    let site = create_sample_site(&temp.path().join("site"));
    let out = temp.path().join("out");

    let artifact = WebsiteSource::new(site.clone())
        .produce(&request(&out, Some("correct horse")))
        .await
        .unwrap();

    // Wrong or missing passphrase must not yield the contents
    assert!(extract_archive(artifact.path(), &temp.path().join("none"), None).is_err());
    assert!(extract_archive(artifact.path(), &temp.path().join("bad"), Some("battery staple")).is_err());

    let restored = temp.path().join("restored");
    extract_archive(artifact.path(), &restored, Some("correct horse")).unwrap();

    for file in sample_site_files() {
        assert_eq!(
            fs::read(restored.join(file)).unwrap(),
            fs::read(site.join(file)).unwrap(),
            "{} differs after extraction",
            file
        );
    }
}

#[tokio::test]
async fn test_missing_site_fails() {
    let temp = TempDir::new().unwrap();
    let result = WebsiteSource::new(temp.path().join("nowhere"))
        .produce(&request(&temp.path().join("out"), None))
        .await;

    assert!(result.is_err());
}

#[tokio::test]
async fn test_database_dump_is_compressed_and_removed() {
    let temp = TempDir::new().unwrap();
    let executor = MockExecutor::new().expect(
        "mysqldump",
        MockResponse::Success {
            stdout: "CREATE TABLE orders (id INT);\n".to_string(),
        },
    );
    let source = DatabaseSource::new(database_config(), Arc::new(executor.clone()));

    let artifact = source.produce(&request(temp.path(), None)).await.unwrap();

    assert_eq!(artifact.file_name(), "db_backup_2025-06-01T03-00-00.sql.zip");
    assert!(!temp.path().join("db_backup_2025-06-01T03-00-00.sql").exists());
    assert_eq!(entry_names(artifact.path()), vec!["db_backup_2025-06-01T03-00-00.sql"]);

    let file = fs::File::open(artifact.path()).unwrap();
    let mut zip = zip::ZipArchive::new(file).unwrap();
    let mut dump = String::new();
    zip.by_index(0).unwrap().read_to_string(&mut dump).unwrap();
    assert!(dump.contains("CREATE TABLE orders"));

    let calls = executor.get_calls();
    assert_eq!(calls.len(), 1);
    assert_eq!(calls[0].args.last().map(String::as_str), Some("shop"));
    assert!(!calls[0].args.iter().any(|a| a.contains("secret")));
    assert!(calls[0].envs.iter().any(|(k, v)| k == "MYSQL_PWD" && v == "secret"));
}

#[tokio::test]
async fn test_failed_dump_produces_no_archive() {
    let temp = TempDir::new().unwrap();
    let executor = MockExecutor::new().expect(
        "mysqldump",
        MockResponse::Failure {
            stderr: "Access denied for user 'backup'".to_string(),
            exit_code: 2,
        },
    );
    let source = DatabaseSource::new(database_config(), Arc::new(executor));

    let err = source.produce(&request(temp.path(), None)).await.unwrap_err();

    assert!(format!("{:#}", err).contains("Access denied"));
    assert!(!temp.path().join("db_backup_2025-06-01T03-00-00.sql.zip").exists());
}
