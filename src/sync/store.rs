//! Document Persistence
//!
//! Reads tolerate missing and corrupt files (both read as "absent"), writes
//! copy the previous file into a backup directory before replacing it.
//!
//! ## Layout
//!
//! ```text
//! <dir>/prompts-data.json
//! <dir>/backups/backup-2024-06-01T12-00-00.123456Z.json
//! <dir>/backups/backup-2024-06-01T12-05-31.000120Z.json
//! ```

use chrono::{DateTime, NaiveDateTime, SecondsFormat, Utc};
use serde::Serialize;
use serde_json::Value;
use std::fs;
use std::io::{ErrorKind, Write};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{debug, info, warn};

use super::models::SyncDocument;
use crate::error::{Result, SyncError};

const BACKUP_PREFIX: &str = "backup-";
const BACKUP_SUFFIX: &str = ".json";
const BACKUP_TIME_FORMAT: &str = "%Y-%m-%dT%H-%M-%S%.fZ";

/// Read a JSON file.
///
/// `Ok(None)` when the file does not exist or does not hold valid JSON.
/// Other IO failures (permissions, a directory in the way) are errors.
pub fn read_json(path: &Path) -> Result<Option<Value>> {
    let content = match fs::read_to_string(path) {
        Ok(content) => content,
        Err(e) if e.kind() == ErrorKind::NotFound => return Ok(None),
        Err(e) if e.kind() == ErrorKind::InvalidData => {
            warn!("{} is not UTF-8, treating as absent", path.display());
            return Ok(None);
        }
        Err(e) => return Err(SyncError::io(path, e)),
    };

    match serde_json::from_str(&content) {
        Ok(value) => Ok(Some(value)),
        Err(e) => {
            warn!("Malformed JSON in {}: {}", path.display(), e);
            Ok(None)
        }
    }
}

/// Read a sync document, `Ok(None)` if absent or not a document
pub fn read_document(path: &Path) -> Result<Option<SyncDocument>> {
    let Some(value) = read_json(path)? else {
        return Ok(None);
    };

    let doc = SyncDocument::from_value(value);
    if doc.is_none() {
        warn!("{} does not hold a sync document, treating as absent", path.display());
    }
    Ok(doc)
}

/// How many backups to keep around
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum RetentionPolicy {
    /// Never delete backups
    #[default]
    Unbounded,
    /// Keep only the newest N backups
    MaxCount(usize),
    /// Delete backups older than this
    MaxAge(Duration),
}

/// Backup file name for an instant, colons replaced for filesystem safety
pub fn backup_file_name(at: DateTime<Utc>) -> String {
    format!(
        "{}{}{}",
        BACKUP_PREFIX,
        at.to_rfc3339_opts(SecondsFormat::Micros, true).replace(':', "-"),
        BACKUP_SUFFIX
    )
}

/// Instant encoded in a backup file name
pub fn parse_backup_time(file_name: &str) -> Option<DateTime<Utc>> {
    let stamp = file_name
        .strip_prefix(BACKUP_PREFIX)?
        .strip_suffix(BACKUP_SUFFIX)?;
    NaiveDateTime::parse_from_str(stamp, BACKUP_TIME_FORMAT)
        .ok()
        .map(|naive| naive.and_utc())
}

/// Point-in-time copies of a document, taken before each overwrite
#[derive(Debug, Clone)]
pub struct BackupRotation {
    dir: PathBuf,
    retention: RetentionPolicy,
}

impl BackupRotation {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self {
            dir: dir.into(),
            retention: RetentionPolicy::default(),
        }
    }

    pub fn with_retention(mut self, retention: RetentionPolicy) -> Self {
        self.retention = retention;
        self
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn retention(&self) -> RetentionPolicy {
        self.retention
    }

    /// Copy `target` verbatim into the backup directory.
    ///
    /// Returns the backup path, or `None` if there was nothing to back up.
    pub fn backup(&self, target: &Path) -> Result<Option<PathBuf>> {
        if !target.exists() {
            return Ok(None);
        }

        fs::create_dir_all(&self.dir).map_err(|e| SyncError::io(&self.dir, e))?;

        let mut at = Utc::now();
        let mut backup_path = self.dir.join(backup_file_name(at));
        while backup_path.exists() {
            at += chrono::Duration::microseconds(1);
            backup_path = self.dir.join(backup_file_name(at));
        }

        fs::copy(target, &backup_path).map_err(|e| SyncError::io(target, e))?;
        debug!("Backed up {} to {}", target.display(), backup_path.display());
        Ok(Some(backup_path))
    }

    /// Backups currently on disk, oldest first
    pub fn list(&self) -> Result<Vec<PathBuf>> {
        let entries = match fs::read_dir(&self.dir) {
            Ok(entries) => entries,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(SyncError::io(&self.dir, e)),
        };

        let mut backups: Vec<PathBuf> = entries
            .flatten()
            .map(|entry| entry.path())
            .filter(|path| {
                path.file_name()
                    .and_then(|name| name.to_str())
                    .and_then(parse_backup_time)
                    .is_some()
            })
            .collect();
        backups.sort();
        Ok(backups)
    }

    /// Apply the retention policy, returning how many backups were removed
    pub fn prune(&self) -> Result<usize> {
        let backups = self.list()?;
        let doomed: Vec<&PathBuf> = match self.retention {
            RetentionPolicy::Unbounded => return Ok(0),
            RetentionPolicy::MaxCount(keep) => {
                let excess = backups.len().saturating_sub(keep);
                backups.iter().take(excess).collect()
            }
            RetentionPolicy::MaxAge(max_age) => {
                let Some(cutoff) = chrono::Duration::from_std(max_age)
                    .ok()
                    .and_then(|max_age| Utc::now().checked_sub_signed(max_age))
                else {
                    return Ok(0);
                };
                backups
                    .iter()
                    .filter(|path| {
                        path.file_name()
                            .and_then(|name| name.to_str())
                            .and_then(parse_backup_time)
                            .is_some_and(|at| at < cutoff)
                    })
                    .collect()
            }
        };

        let mut removed = 0;
        for path in doomed {
            match fs::remove_file(path) {
                Ok(()) => removed += 1,
                Err(e) => warn!("Failed to remove old backup {}: {}", path.display(), e),
            }
        }
        if removed > 0 {
            info!("Pruned {} old backup(s) from {}", removed, self.dir.display());
        }
        Ok(removed)
    }
}

/// A JSON document file plus its backup rotation
#[derive(Debug, Clone)]
pub struct DocumentStore {
    path: PathBuf,
    backups: BackupRotation,
}

impl DocumentStore {
    /// Store with backups in a `backups` directory next to the file
    pub fn new(path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        let backups = BackupRotation::new(default_backup_dir(&path));
        Self { path, backups }
    }

    pub fn with_backups(mut self, backups: BackupRotation) -> Self {
        self.backups = backups;
        self
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn backups(&self) -> &BackupRotation {
        &self.backups
    }

    pub fn read(&self) -> Result<Option<SyncDocument>> {
        read_document(&self.path)
    }

    pub fn read_raw(&self) -> Result<Option<Value>> {
        read_json(&self.path)
    }

    /// Replace the file with `value` as pretty-printed JSON.
    ///
    /// The previous content is backed up first; a failed backup is logged
    /// and does not stop the write. Parent directories are created as needed.
    pub fn write<T: Serialize + ?Sized>(&self, value: &T) -> Result<()> {
        let content = serde_json::to_string_pretty(value)?;

        if let Err(e) = self.backups.backup(&self.path) {
            warn!("Backup before write failed, continuing: {}", e);
        }

        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent).map_err(|e| SyncError::io(parent, e))?;
        }

        write_atomic(&self.path, content.as_bytes())?;
        debug!("Wrote {} bytes to {}", content.len(), self.path.display());

        if let Err(e) = self.backups.prune() {
            warn!("Backup pruning failed: {}", e);
        }
        Ok(())
    }
}

/// `backups/` next to the document file
pub fn default_backup_dir(path: &Path) -> PathBuf {
    path.parent()
        .filter(|p| !p.as_os_str().is_empty())
        .unwrap_or_else(|| Path::new("."))
        .join("backups")
}

/// Whole-file replace: write a sibling temp file, then rename over the target
fn write_atomic(path: &Path, bytes: &[u8]) -> Result<()> {
    let file_name = path
        .file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .unwrap_or_else(|| "document".to_string());
    let tmp_path = path.with_file_name(format!(".{}.tmp", file_name));

    let written = fs::File::create(&tmp_path).and_then(|mut file| {
        file.write_all(bytes)?;
        file.sync_all()
    });
    if let Err(e) = written {
        let _ = fs::remove_file(&tmp_path);
        return Err(SyncError::io(&tmp_path, e));
    }

    if let Err(e) = fs::rename(&tmp_path, path) {
        let _ = fs::remove_file(&tmp_path);
        return Err(SyncError::io(path, e));
    }
    Ok(())
}
