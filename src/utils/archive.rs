//! Zip archive creation and extraction
//!
//! Archives are deflate-compressed at the highest level. When a passphrase is
//! given every file entry is AES-256 encrypted, so the archive cannot be
//! extracted without the same passphrase.

use anyhow::{bail, Context, Result};
use std::fs::{self, File};
use std::io;
use std::path::{Component, Path, PathBuf};
use tracing::{debug, info, warn};
use walkdir::WalkDir;
use zip::write::{FileOptions, SimpleFileOptions};
use zip::{AesMode, CompressionMethod, ZipArchive, ZipWriter};

const COMPRESSION_LEVEL: i64 = 9;

fn file_options<'a>(passphrase: Option<&'a str>, size: u64) -> FileOptions<'a, ()> {
    let options: FileOptions<'a, ()> = SimpleFileOptions::default()
        .compression_method(CompressionMethod::Deflated)
        .compression_level(Some(COMPRESSION_LEVEL))
        .large_file(size >= u32::MAX as u64);

    match passphrase {
        Some(p) if !p.is_empty() => options.with_aes_encryption(AesMode::Aes256, p),
        _ => options,
    }
}

/// Archive entry name for `path` relative to `root`, always `/`-separated
fn entry_name(root: &Path, path: &Path) -> Result<String> {
    let relative = path
        .strip_prefix(root)
        .with_context(|| format!("Failed to strip prefix {} from {}", root.display(), path.display()))?;

    let mut parts = Vec::new();
    for component in relative.components() {
        match component {
            Component::Normal(part) => parts.push(part.to_string_lossy().into_owned()),
            other => bail!("Unexpected path component {:?} in {}", other, path.display()),
        }
    }

    Ok(parts.join("/"))
}

fn create_writer(dest: &Path) -> Result<ZipWriter<File>> {
    if let Some(parent) = dest.parent() {
        fs::create_dir_all(parent).with_context(|| {
            format!("Failed to create parent directory for archive: {}", parent.display())
        })?;
    }

    let file = File::create(dest)
        .with_context(|| format!("Failed to create archive file: {}", dest.display()))?;
    Ok(ZipWriter::new(file))
}

fn finish_writer(writer: ZipWriter<File>, dest: &Path) -> Result<()> {
    let file = writer
        .finish()
        .with_context(|| format!("Failed to finalize archive: {}", dest.display()))?;
    file.sync_all()
        .with_context(|| format!("Failed to flush archive: {}", dest.display()))?;
    Ok(())
}

/// Recursively archive `source_dir` into a zip file at `dest`.
///
/// Entry names are relative to `source_dir`. Symlinks are skipped.
pub fn archive_directory(source_dir: &Path, dest: &Path, passphrase: Option<&str>) -> Result<PathBuf> {
    if !source_dir.is_dir() {
        bail!("Source for archival is not a directory: {}", source_dir.display());
    }

    info!("Archiving {} to {}", source_dir.display(), dest.display());

    let mut writer = create_writer(dest)?;
    let mut file_count = 0usize;

    for entry in WalkDir::new(source_dir).follow_links(false).sort_by_file_name() {
        let entry = entry
            .with_context(|| format!("Failed to walk directory: {}", source_dir.display()))?;
        let path = entry.path();
        let name = entry_name(source_dir, path)?;

        if name.is_empty() {
            continue;
        }

        let file_type = entry.file_type();
        if file_type.is_symlink() {
            warn!("Skipping symlink: {}", path.display());
        } else if file_type.is_dir() {
            writer
                .add_directory(format!("{}/", name), SimpleFileOptions::default())
                .with_context(|| format!("Failed to add directory {} to archive", name))?;
        } else if file_type.is_file() {
            let size = entry.metadata().map(|m| m.len()).unwrap_or(0);
            writer
                .start_file(name.as_str(), file_options(passphrase, size))
                .with_context(|| format!("Failed to start archive entry {}", name))?;
            let mut input = File::open(path)
                .with_context(|| format!("Failed to open {}", path.display()))?;
            io::copy(&mut input, &mut writer)
                .with_context(|| format!("Failed to compress {}", path.display()))?;
            file_count += 1;
        }
    }

    finish_writer(writer, dest)?;

    debug!("Archived {} files into {}", file_count, dest.display());
    Ok(dest.to_path_buf())
}

/// Archive a single file into a zip file at `dest`, stored under its file name
pub fn archive_file(source: &Path, dest: &Path, passphrase: Option<&str>) -> Result<PathBuf> {
    if !source.is_file() {
        bail!("Source for archival is not a file: {}", source.display());
    }

    let name = source
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .context("Source file has no name")?;
    let size = fs::metadata(source)?.len();

    info!("Compressing {} to {}", source.display(), dest.display());

    let mut writer = create_writer(dest)?;
    writer
        .start_file(name.as_str(), file_options(passphrase, size))
        .with_context(|| format!("Failed to start archive entry {}", name))?;
    let mut input =
        File::open(source).with_context(|| format!("Failed to open {}", source.display()))?;
    io::copy(&mut input, &mut writer)
        .with_context(|| format!("Failed to compress {}", source.display()))?;

    finish_writer(writer, dest)?;
    Ok(dest.to_path_buf())
}

/// Extract a zip archive into `dest_dir`, returning the extracted file paths.
///
/// Fails when an entry is encrypted and the passphrase is missing or wrong.
pub fn extract_archive(archive_path: &Path, dest_dir: &Path, passphrase: Option<&str>) -> Result<Vec<PathBuf>> {
    let file = File::open(archive_path)
        .with_context(|| format!("Failed to open archive file: {}", archive_path.display()))?;
    let mut archive = ZipArchive::new(file)
        .with_context(|| format!("Failed to read archive: {}", archive_path.display()))?;

    fs::create_dir_all(dest_dir)
        .with_context(|| format!("Failed to create extraction directory: {}", dest_dir.display()))?;

    let mut extracted = Vec::new();

    for index in 0..archive.len() {
        let mut entry = match passphrase {
            Some(p) => archive.by_index_decrypt(index, p.as_bytes()),
            None => archive.by_index(index),
        }
        .with_context(|| format!("Failed to open entry {} of {}", index, archive_path.display()))?;

        let relative = entry
            .enclosed_name()
            .with_context(|| format!("Archive entry escapes target directory: {}", entry.name()))?;
        let out_path = dest_dir.join(relative);

        if entry.is_dir() {
            fs::create_dir_all(&out_path)?;
            continue;
        }

        if let Some(parent) = out_path.parent() {
            fs::create_dir_all(parent)?;
        }
        let mut output = File::create(&out_path)
            .with_context(|| format!("Failed to create {}", out_path.display()))?;
        io::copy(&mut entry, &mut output)
            .with_context(|| format!("Failed to extract {}", out_path.display()))?;
        extracted.push(out_path);
    }

    Ok(extracted)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn sample_tree(root: &Path) {
        fs::create_dir_all(root.join("css/themes")).unwrap();
        fs::write(root.join("index.html"), "<h1>hello</h1>").unwrap();
        fs::write(root.join("css/site.css"), "body { margin: 0 }").unwrap();
        fs::write(root.join("css/themes/dark.css"), "body { color: #fff }").unwrap();
    }

    fn entry_names(archive: &Path) -> Vec<String> {
        let mut zip = ZipArchive::new(File::open(archive).unwrap()).unwrap();
        (0..zip.len())
            .map(|i| zip.by_index_raw(i).unwrap().name().to_string())
            .collect()
    }

    #[test]
    fn test_directory_entries_are_relative() {
        let temp = TempDir::new().unwrap();
        let site = temp.path().join("site");
        sample_tree(&site);
        let dest = temp.path().join("out/site.zip");

        archive_directory(&site, &dest, None).unwrap();

        let names = entry_names(&dest);
        assert!(names.contains(&"index.html".to_string()));
        assert!(names.contains(&"css/".to_string()));
        assert!(names.contains(&"css/themes/dark.css".to_string()));
        assert!(names.iter().all(|n| !n.starts_with('/') && !n.contains("..")));
        assert!(names.iter().all(|n| !n.contains("site/")));
    }

    #[test]
    fn test_unprotected_round_trip() {
        let temp = TempDir::new().unwrap();
        let site = temp.path().join("site");
        sample_tree(&site);
        let dest = temp.path().join("site.zip");
        archive_directory(&site, &dest, None).unwrap();

        let out = temp.path().join("restored");
        let files = extract_archive(&dest, &out, None).unwrap();

        assert_eq!(files.len(), 3);
        assert_eq!(
            fs::read_to_string(out.join("css/site.css")).unwrap(),
            "body { margin: 0 }"
        );
    }

    #[test]
    fn test_passphrase_required_to_extract() {
        let temp = TempDir::new().unwrap();
        let dump = temp.path().join("db_backup.sql");
        fs::write(&dump, "CREATE TABLE t (id INT);").unwrap();
        let dest = temp.path().join("db_backup.sql.zip");

        archive_file(&dump, &dest, Some("secret")).unwrap();

        assert!(extract_archive(&dest, &temp.path().join("none"), None).is_err());
        assert!(extract_archive(&dest, &temp.path().join("wrong"), Some("not-it")).is_err());

        let out = temp.path().join("ok");
        extract_archive(&dest, &out, Some("secret")).unwrap();
        assert_eq!(
            fs::read_to_string(out.join("db_backup.sql")).unwrap(),
            "CREATE TABLE t (id INT);"
        );
    }

    #[test]
    fn test_empty_passphrase_means_unprotected() {
        let temp = TempDir::new().unwrap();
        let dump = temp.path().join("dump.sql");
        fs::write(&dump, "SELECT 1;").unwrap();
        let dest = temp.path().join("dump.sql.zip");

        archive_file(&dump, &dest, Some("")).unwrap();
        assert!(extract_archive(&dest, &temp.path().join("out"), None).is_ok());
    }

    #[test]
    fn test_missing_source_directory() {
        let temp = TempDir::new().unwrap();
        let result = archive_directory(&temp.path().join("absent"), &temp.path().join("x.zip"), None);
        assert!(result.is_err());
    }
}
