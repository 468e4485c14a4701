//! Sync Watcher Configuration
//!
//! Configuration is read from environment variables:
//! - `PM_WATCH_FILE` - externally written sync file (default `~/.prompt-manager/sync/prompts-sync.json`)
//! - `PM_APP_DATA_FILE` - local app-data document to merge into (required)
//! - `PM_BACKUP_DIR` - backup directory (default `backups/` next to the app-data file)
//! - `PM_MODE` - `full` (default) or `prompts`
//! - `PM_DEBOUNCE_MS` - debounce before merging (default 400)
//! - `PM_BACKUP_KEEP` - keep at most N backups (default: keep all)
//! - `PM_BACKUP_MAX_AGE_DAYS` - delete backups older than N days (default: never)

use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use super::store::{default_backup_dir, BackupRotation, DocumentStore, RetentionPolicy};
use crate::error::{Result, SyncError};

pub const ENV_WATCH_FILE: &str = "PM_WATCH_FILE";
pub const ENV_APP_DATA_FILE: &str = "PM_APP_DATA_FILE";
pub const ENV_BACKUP_DIR: &str = "PM_BACKUP_DIR";
pub const ENV_MODE: &str = "PM_MODE";
pub const ENV_DEBOUNCE_MS: &str = "PM_DEBOUNCE_MS";
pub const ENV_BACKUP_KEEP: &str = "PM_BACKUP_KEEP";
pub const ENV_BACKUP_MAX_AGE_DAYS: &str = "PM_BACKUP_MAX_AGE_DAYS";

const SECS_PER_DAY: u64 = 24 * 60 * 60;

/// What the daemon writes to the app-data file
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum WriteMode {
    /// The full merged document
    #[default]
    Full,
    /// Only the merged `prompts` array
    Prompts,
}

impl FromStr for WriteMode {
    type Err = SyncError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "full" | "" => Ok(WriteMode::Full),
            "prompts" => Ok(WriteMode::Prompts),
            other => Err(SyncError::Config(format!(
                "{} must be \"full\" or \"prompts\", got \"{}\"",
                ENV_MODE, other
            ))),
        }
    }
}

/// Sync watcher configuration
#[derive(Debug, Clone)]
pub struct SyncConfig {
    /// Sync file written by the extension or another device
    pub watch_file: PathBuf,

    /// Local document the sync file is merged into
    pub app_data_file: PathBuf,

    /// Where pre-write copies of the app-data file go
    pub backup_dir: PathBuf,

    /// Full document or prompts-only output
    pub mode: WriteMode,

    /// Debounce duration for file changes
    pub debounce_ms: u64,

    /// Backup pruning
    pub retention: RetentionPolicy,
}

impl SyncConfig {
    /// Config for the given files, everything else defaulted
    pub fn new(watch_file: impl Into<PathBuf>, app_data_file: impl Into<PathBuf>) -> Self {
        let app_data_file = app_data_file.into();
        Self {
            watch_file: watch_file.into(),
            backup_dir: default_backup_dir(&app_data_file),
            app_data_file,
            mode: WriteMode::default(),
            debounce_ms: 400,
            retention: RetentionPolicy::default(),
        }
    }

    pub fn with_mode(mut self, mode: WriteMode) -> Self {
        self.mode = mode;
        self
    }

    pub fn with_debounce(mut self, debounce: Duration) -> Self {
        self.debounce_ms = u64::try_from(debounce.as_millis()).unwrap_or(u64::MAX);
        self
    }

    /// Load from the process environment
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Load from any key lookup; empty values count as unset
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).filter(|value| !value.trim().is_empty());

        let app_data_file = get(ENV_APP_DATA_FILE).map(PathBuf::from).ok_or_else(|| {
            SyncError::Config(format!("{} is not set", ENV_APP_DATA_FILE))
        })?;
        let watch_file = get(ENV_WATCH_FILE)
            .map(PathBuf::from)
            .unwrap_or_else(default_watch_file);

        let mut config = Self::new(watch_file, app_data_file);

        if let Some(dir) = get(ENV_BACKUP_DIR) {
            config.backup_dir = PathBuf::from(dir);
        }
        if let Some(mode) = get(ENV_MODE) {
            config.mode = mode.parse()?;
        }
        if let Some(ms) = get(ENV_DEBOUNCE_MS) {
            config.debounce_ms = parse_number(ENV_DEBOUNCE_MS, &ms)?;
        }
        if let Some(keep) = get(ENV_BACKUP_KEEP) {
            config.retention = RetentionPolicy::MaxCount(parse_number(ENV_BACKUP_KEEP, &keep)?);
        }
        if let Some(days) = get(ENV_BACKUP_MAX_AGE_DAYS) {
            let secs = parse_number::<u64>(ENV_BACKUP_MAX_AGE_DAYS, &days)?
                .checked_mul(SECS_PER_DAY)
                .ok_or_else(|| {
                    SyncError::Config(format!("{} is too large: {}", ENV_BACKUP_MAX_AGE_DAYS, days))
                })?;
            config.retention = RetentionPolicy::MaxAge(Duration::from_secs(secs));
        }

        Ok(config)
    }

    /// Get debounce duration
    pub fn debounce_duration(&self) -> Duration {
        Duration::from_millis(self.debounce_ms)
    }

    /// Store for the app-data file with this config's backup settings
    pub fn app_data_store(&self) -> DocumentStore {
        DocumentStore::new(&self.app_data_file).with_backups(
            BackupRotation::new(&self.backup_dir).with_retention(self.retention),
        )
    }
}

/// `~/.prompt-manager/sync/prompts-sync.json`
pub fn default_watch_file() -> PathBuf {
    dirs::home_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(".prompt-manager")
        .join("sync")
        .join("prompts-sync.json")
}

fn parse_number<T: FromStr>(key: &str, value: &str) -> Result<T> {
    value
        .trim()
        .parse()
        .map_err(|_| SyncError::Config(format!("{} must be a number, got \"{}\"", key, value)))
}
