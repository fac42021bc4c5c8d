//! Export archive discovery and loading
//!
//! An export arrives as a zip holding `conversations.json`. It is read
//! straight out of the archive; nothing is extracted to disk. A bare
//! `.json` file is accepted too.

use std::fs::File;
use std::io::{BufReader, Read};
use std::path::{Path, PathBuf};
use std::time::SystemTime;

use serde_json::Value;

use crate::error::RecapError;
use crate::normalizer::load_conversations;

const CONVERSATIONS_FILE: &str = "conversations.json";

/// Newest `*.zip` (by modification time) directly inside `dir`.
pub fn find_latest_archive(dir: &Path) -> Result<PathBuf, RecapError> {
    let entries = std::fs::read_dir(dir).map_err(|_| RecapError::ArchiveNotFound(dir.to_path_buf()))?;

    let mut newest: Option<(SystemTime, PathBuf)> = None;
    for entry in entries.flatten() {
        let path = entry.path();
        let is_zip = path
            .extension()
            .and_then(|e| e.to_str())
            .is_some_and(|e| e.eq_ignore_ascii_case("zip"));
        if !is_zip || !path.is_file() {
            continue;
        }
        let modified = entry
            .metadata()
            .and_then(|m| m.modified())
            .unwrap_or(SystemTime::UNIX_EPOCH);
        if newest.as_ref().map_or(true, |(t, _)| modified > *t) {
            newest = Some((modified, path));
        }
    }

    match newest {
        Some((_, path)) => {
            log::info!("Latest export archive: {}", path.display());
            Ok(path)
        }
        None => Err(RecapError::ArchiveNotFound(dir.to_path_buf())),
    }
}

/// Read an export (zip or json) and return its conversation records.
pub fn read_export(path: &Path) -> Result<Vec<Value>, RecapError> {
    if !path.is_file() {
        return Err(RecapError::ArchiveNotFound(path.to_path_buf()));
    }
    let is_json = path
        .extension()
        .and_then(|e| e.to_str())
        .is_some_and(|e| e.eq_ignore_ascii_case("json"));

    let data: Value = if is_json {
        serde_json::from_reader(BufReader::new(File::open(path)?))
            .map_err(|e| RecapError::MalformedExport(format!("{}: {}", path.display(), e)))?
    } else {
        read_from_zip(path)?
    };

    let conversations = load_conversations(data)?;
    log::info!(
        "Loaded {} conversation(s) from {}",
        conversations.len(),
        path.display()
    );
    Ok(conversations)
}

fn read_from_zip(path: &Path) -> Result<Value, RecapError> {
    let mut archive = zip::ZipArchive::new(BufReader::new(File::open(path)?))?;

    // Exports usually keep it at the root, but accept a nested copy.
    let name = archive
        .file_names()
        .filter(|n| *n == CONVERSATIONS_FILE || n.ends_with("/conversations.json"))
        .min_by_key(|n| n.len())
        .map(str::to_string)
        .ok_or_else(|| {
            RecapError::MalformedExport(format!(
                "{} not found in {}",
                CONVERSATIONS_FILE,
                path.display()
            ))
        })?;

    let mut content = String::new();
    archive.by_name(&name)?.read_to_string(&mut content)?;
    serde_json::from_str(&content)
        .map_err(|e| RecapError::MalformedExport(format!("{}: {}", name, e)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn write_zip(path: &Path, entries: &[(&str, &str)]) {
        let mut writer = zip::ZipWriter::new(File::create(path).unwrap());
        for (name, body) in entries {
            writer
                .start_file(*name, zip::write::SimpleFileOptions::default())
                .unwrap();
            writer.write_all(body.as_bytes()).unwrap();
        }
        writer.finish().unwrap();
    }

    #[test]
    fn test_read_zip_export() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("export.zip");
        write_zip(
            &path,
            &[
                ("chat.html", "<html></html>"),
                (CONVERSATIONS_FILE, r#"[{"id": "a"}, {"id": "b"}]"#),
            ],
        );
        assert_eq!(read_export(&path).unwrap().len(), 2);
    }

    #[test]
    fn test_read_nested_zip_export() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("export.zip");
        write_zip(&path, &[("export-2025/conversations.json", r#"{"conversations": [{"id": "a"}]}"#)]);
        assert_eq!(read_export(&path).unwrap().len(), 1);
    }

    #[test]
    fn test_zip_without_conversations_is_malformed() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("export.zip");
        write_zip(&path, &[("user.json", "{}")]);
        assert!(matches!(read_export(&path), Err(RecapError::MalformedExport(_))));
    }

    #[test]
    fn test_read_plain_json_export() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("conversations.json");
        std::fs::write(&path, r#"[{"id": "a"}]"#).unwrap();
        assert_eq!(read_export(&path).unwrap().len(), 1);
    }

    #[test]
    fn test_missing_export() {
        let dir = tempfile::tempdir().unwrap();
        assert!(matches!(
            read_export(&dir.path().join("nope.zip")),
            Err(RecapError::ArchiveNotFound(_))
        ));
        assert!(matches!(
            find_latest_archive(dir.path()),
            Err(RecapError::ArchiveNotFound(_))
        ));
    }

    #[test]
    fn test_find_latest_archive_picks_newest() {
        let dir = tempfile::tempdir().unwrap();
        let old = dir.path().join("old.zip");
        let new = dir.path().join("new.zip");
        write_zip(&old, &[(CONVERSATIONS_FILE, "[]")]);
        write_zip(&new, &[(CONVERSATIONS_FILE, "[]")]);
        std::fs::write(dir.path().join("notes.txt"), "x").unwrap();

        let earlier = SystemTime::now() - std::time::Duration::from_secs(3_600);
        File::options()
            .write(true)
            .open(&old)
            .unwrap()
            .set_modified(earlier)
            .unwrap();

        assert_eq!(find_latest_archive(dir.path()).unwrap(), new);
    }
}
