//! Atomic JSON file writes.
//!
//! Documents are written to a temp file in the destination directory,
//! fsynced, then renamed over the target, so readers only ever see the old
//! or the new content.

use std::fs;
use std::io::{self, Write};
use std::path::{Path, PathBuf};

use chrono::Utc;
use serde::Serialize;
use tempfile::NamedTempFile;

/// A fully written temp file that has not replaced its target yet.
///
/// Dropping it without [`commit`](Self::commit) deletes the temp file and
/// leaves the target untouched.
pub struct StagedWrite {
    file: NamedTempFile,
    target: PathBuf,
}

impl StagedWrite {
    /// Rename the staged file over the target.
    pub fn commit(self) -> io::Result<()> {
        self.file.persist(&self.target)?;
        Ok(())
    }

    pub fn temp_path(&self) -> &Path {
        self.file.path()
    }
}

fn parent_dir(path: &Path) -> &Path {
    match path.parent() {
        Some(dir) if !dir.as_os_str().is_empty() => dir,
        _ => Path::new("."),
    }
}

/// Serialize `value` as pretty JSON into a temp file next to `path`.
pub fn stage_json<T: Serialize + ?Sized>(path: &Path, value: &T) -> io::Result<StagedWrite> {
    let dir = parent_dir(path);
    fs::create_dir_all(dir)?;

    let mut file = NamedTempFile::new_in(dir)?;
    serde_json::to_writer_pretty(&mut file, value)?;
    file.write_all(b"\n")?;
    file.as_file().sync_all()?;

    Ok(StagedWrite {
        file,
        target: path.to_path_buf(),
    })
}

/// Write `value` as pretty JSON, atomically replacing `path`.
pub fn write_json_atomic<T: Serialize + ?Sized>(path: &Path, value: &T) -> io::Result<()> {
    stage_json(path, value)?.commit()
}

/// Move an unreadable file aside as `<file>.corrupt-<UTC timestamp>`.
///
/// Never overwrites an earlier backup; a `-N` suffix is added on collision.
pub fn backup_corrupt(path: &Path) -> io::Result<PathBuf> {
    let base = format!(
        "{}.corrupt-{}",
        path.display(),
        Utc::now().format("%Y%m%dT%H%M%S%.3fZ")
    );

    let mut backup = PathBuf::from(&base);
    let mut n = 1;
    while backup.exists() {
        backup = PathBuf::from(format!("{}-{}", base, n));
        n += 1;
    }
    fs::rename(path, &backup)?;
    Ok(backup)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_write_replaces_content() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("state.json");

        write_json_atomic(&path, &json!({"v": 1})).unwrap();
        write_json_atomic(&path, &json!({"v": 2})).unwrap();

        let raw = fs::read_to_string(&path).unwrap();
        let value: serde_json::Value = serde_json::from_str(&raw).unwrap();
        assert_eq!(value["v"], 2);
        assert!(raw.ends_with('\n'));
    }

    #[test]
    fn test_dropped_stage_leaves_previous_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("state.json");
        write_json_atomic(&path, &json!({"v": "old"})).unwrap();

        let staged = stage_json(&path, &json!({"v": "new"})).unwrap();
        let temp = staged.temp_path().to_path_buf();
        assert!(temp.exists());
        // Simulated crash between write and rename
        drop(staged);

        assert!(!temp.exists());
        let value: serde_json::Value =
            serde_json::from_str(&fs::read_to_string(&path).unwrap()).unwrap();
        assert_eq!(value["v"], "old");
        assert_eq!(fs::read_dir(dir.path()).unwrap().count(), 1);
    }

    #[test]
    fn test_creates_missing_directory() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested/data/state.json");
        write_json_atomic(&path, &json!([])).unwrap();
        assert!(path.exists());
    }

    #[test]
    fn test_backup_corrupt_renames() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("state.json");
        fs::write(&path, "{not json").unwrap();

        let backup = backup_corrupt(&path).unwrap();
        assert!(!path.exists());
        assert!(backup.to_string_lossy().contains("state.json.corrupt-"));
        assert_eq!(fs::read_to_string(backup).unwrap(), "{not json");
    }

    #[test]
    fn test_backup_corrupt_keeps_earlier_backups() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("state.json");

        fs::write(&path, "first").unwrap();
        let first = backup_corrupt(&path).unwrap();
        fs::write(&path, "second").unwrap();
        let second = backup_corrupt(&path).unwrap();

        assert_ne!(first, second);
        assert_eq!(fs::read_to_string(first).unwrap(), "first");
        assert_eq!(fs::read_to_string(second).unwrap(), "second");
    }
}
