use std::fs;
use std::path::{Path, PathBuf};

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use tracing::{debug, info};

use crate::atomic;
use crate::error::{Error, Result};

const BACKUP_MARKER: &str = "_db_backup_";

/// Keeps at most one rolling snapshot of a record store next to it.
///
/// Snapshots are best-effort: they bound how much a corrupted store can lose,
/// they are not a transaction log.
pub struct BackupGuard<R = StdRng> {
    rng: R,
}

impl BackupGuard<StdRng> {
    pub fn new() -> Self {
        Self {
            rng: StdRng::from_os_rng(),
        }
    }
}

impl Default for BackupGuard<StdRng> {
    fn default() -> Self {
        Self::new()
    }
}

impl<R: Rng> BackupGuard<R> {
    pub fn with_rng(rng: R) -> Self {
        Self { rng }
    }

    /// Take a snapshot with the given probability. `0.0` never snapshots,
    /// `1.0` always does. Returns the new backup path when one was written.
    pub fn maybe_snapshot(&mut self, store_path: &Path, probability: f64) -> Result<Option<PathBuf>> {
        let p = if probability.is_nan() {
            0.0
        } else {
            probability.clamp(0.0, 1.0)
        };
        if !self.rng.random_bool(p) {
            return Ok(None);
        }
        snapshot(store_path).map(Some)
    }
}

/// Prefix shared by every backup of `store_path`.
fn backup_prefix(store_path: &Path) -> String {
    let stem = store_path
        .file_stem()
        .map(|s| s.to_string_lossy().to_string())
        .unwrap_or_default();
    format!("{stem}{BACKUP_MARKER}")
}

fn backup_dir(store_path: &Path) -> PathBuf {
    match store_path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent.to_path_buf(),
        _ => PathBuf::from("."),
    }
}

/// Name of a backup created at `timestamp`:
/// `<stem>_db_backup_<YYYYmmdd-HHMMSS>.csv`.
pub fn backup_path_for(store_path: &Path, timestamp: chrono::DateTime<chrono::Local>) -> PathBuf {
    backup_dir(store_path).join(format!(
        "{}{}.csv",
        backup_prefix(store_path),
        timestamp.format("%Y%m%d-%H%M%S")
    ))
}

/// Every backup file of `store_path` currently on disk, oldest first.
fn list_backups(store_path: &Path) -> Result<Vec<PathBuf>> {
    let dir = backup_dir(store_path);
    if !dir.is_dir() {
        return Ok(Vec::new());
    }
    let prefix = backup_prefix(store_path);

    let mut backups: Vec<PathBuf> = fs::read_dir(&dir)?
        .filter_map(|entry| entry.ok())
        .filter(|entry| entry.file_type().map(|t| t.is_file()).unwrap_or(false))
        .filter(|entry| {
            let name = entry.file_name().to_string_lossy().to_string();
            name.starts_with(&prefix) && name.ends_with(".csv")
        })
        .map(|entry| entry.path())
        .collect();
    backups.sort();
    Ok(backups)
}

/// The live backup of `store_path`, if any. Should more than one exist, the
/// newest wins.
pub fn find_backup(store_path: &Path) -> Result<Option<PathBuf>> {
    Ok(list_backups(store_path)?.pop())
}

/// Replace any previous backup with a fresh copy of the store file.
pub fn snapshot(store_path: &Path) -> Result<PathBuf> {
    for old in list_backups(store_path)? {
        debug!(path = %old.display(), "removing previous backup");
        fs::remove_file(&old)?;
    }

    let target = backup_path_for(store_path, chrono::Local::now());
    atomic::copy_atomic(store_path, &target)?;
    info!(path = %target.display(), "created record store backup");
    Ok(target)
}

/// Copy the live backup back over the store file. The backup is kept.
pub fn restore(store_path: &Path) -> Result<PathBuf> {
    let backup =
        find_backup(store_path)?.ok_or_else(|| Error::NoBackupAvailable(store_path.to_path_buf()))?;
    atomic::copy_atomic(&backup, store_path)?;
    info!(
        backup = %backup.display(),
        store = %store_path.display(),
        "restored record store from backup"
    );
    Ok(backup)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn setup() -> (tempfile::TempDir, PathBuf) {
        let tmp = tempfile::tempdir().unwrap();
        let store = tmp.path().join("corpus.csv");
        fs::write(&store, "id,label,predicted_label,updated_at\na,0.5,0.5,1\n").unwrap();
        (tmp, store)
    }

    fn seeded() -> BackupGuard<StdRng> {
        BackupGuard::with_rng(StdRng::seed_from_u64(7))
    }

    #[test]
    fn test_backup_path_format() {
        let ts = chrono::TimeZone::with_ymd_and_hms(&chrono::Local, 2024, 6, 15, 12, 30, 5).unwrap();
        let path = backup_path_for(Path::new("/data/corpus.csv"), ts);
        assert_eq!(path, PathBuf::from("/data/corpus_db_backup_20240615-123005.csv"));
    }

    #[test]
    fn test_probability_one_always_leaves_exactly_one_backup() {
        let (tmp, store) = setup();
        let mut guard = seeded();

        for _ in 0..5 {
            let created = guard.maybe_snapshot(&store, 1.0).unwrap();
            assert!(created.is_some());
            assert_eq!(list_backups(&store).unwrap().len(), 1);
        }
        assert!(tmp.path().join("corpus.csv").exists());
    }

    #[test]
    fn test_probability_zero_never_snapshots() {
        let (_tmp, store) = setup();
        let mut guard = seeded();

        for _ in 0..50 {
            assert!(guard.maybe_snapshot(&store, 0.0).unwrap().is_none());
        }
        assert!(find_backup(&store).unwrap().is_none());
    }

    #[test]
    fn test_out_of_range_probability_is_clamped() {
        let (_tmp, store) = setup();
        let mut guard = seeded();
        assert!(guard.maybe_snapshot(&store, 3.0).unwrap().is_some());
        assert!(guard.maybe_snapshot(&store, -1.0).unwrap().is_none());
        assert!(guard.maybe_snapshot(&store, f64::NAN).unwrap().is_none());
    }

    #[test]
    fn test_snapshot_replaces_stale_backup() {
        let (tmp, store) = setup();
        let stale = tmp.path().join("corpus_db_backup_20200101-000000.csv");
        fs::write(&stale, "old").unwrap();

        let created = snapshot(&store).unwrap();
        assert!(!stale.exists());
        assert_eq!(fs::read(&created).unwrap(), fs::read(&store).unwrap());
        assert_eq!(find_backup(&store).unwrap(), Some(created));
    }

    #[test]
    fn test_snapshot_leaves_other_stores_backups_alone() {
        let (tmp, store) = setup();
        let other = tmp.path().join("other_db_backup_20200101-000000.csv");
        fs::write(&other, "other").unwrap();

        snapshot(&store).unwrap();
        assert!(other.exists());
    }

    #[test]
    fn test_snapshot_of_missing_store_fails() {
        let tmp = tempfile::tempdir().unwrap();
        assert!(snapshot(&tmp.path().join("absent.csv")).is_err());
    }

    #[test]
    fn test_restore_copies_backup_over_store() {
        let (_tmp, store) = setup();
        let original = fs::read(&store).unwrap();
        let backup = snapshot(&store).unwrap();

        fs::write(&store, "garbage\x00\x00").unwrap();
        let used = restore(&store).unwrap();

        assert_eq!(used, backup);
        assert_eq!(fs::read(&store).unwrap(), original);
        assert!(backup.exists(), "backup is retained after restore");
    }

    #[test]
    fn test_restore_without_backup() {
        let (_tmp, store) = setup();
        let err = restore(&store).unwrap_err();
        assert!(matches!(err, Error::NoBackupAvailable(_)));
    }
}
