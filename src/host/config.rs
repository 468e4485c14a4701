//! Native host configuration
//!
//! The document lives under a data directory, taken from the `dataPath`
//! field of an optional JSON config file or the platform default:
//! - Linux: `~/.local/share/prompt-manager`
//! - macOS: `~/Library/Application Support/prompt-manager`
//! - Windows: `%APPDATA%\prompt-manager`

use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{debug, warn};

use crate::error::Result;
use crate::sync::store::{read_json, BackupRotation, DocumentStore};
use crate::sync::watcher::DEFAULT_DEBOUNCE;

/// Document file name inside the data directory
pub const DOCUMENT_FILE: &str = "sync-data.json";

const APP_DIR: &str = "prompt-manager";

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ConfigFile {
    #[serde(default)]
    data_path: Option<PathBuf>,
}

#[derive(Debug, Clone)]
pub struct HostConfig {
    /// Directory holding the sync document and its backups
    pub data_dir: PathBuf,
    /// Debounce for the document file watch
    pub debounce: Duration,
}

impl Default for HostConfig {
    fn default() -> Self {
        Self::new(Self::default_data_dir())
    }
}

impl HostConfig {
    pub fn new(data_dir: impl Into<PathBuf>) -> Self {
        Self {
            data_dir: data_dir.into(),
            debounce: DEFAULT_DEBOUNCE,
        }
    }

    /// Get default configuration file path
    pub fn default_config_path() -> PathBuf {
        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join(APP_DIR)
            .join("native-host.json")
    }

    /// Platform application-data directory
    pub fn default_data_dir() -> PathBuf {
        dirs::data_dir()
            .or_else(dirs::home_dir)
            .unwrap_or_else(|| PathBuf::from("."))
            .join(APP_DIR)
    }

    /// Load configuration from file, falling back to defaults.
    ///
    /// A missing or malformed config file is not an error.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let path = path.map(PathBuf::from).unwrap_or_else(Self::default_config_path);

        let file = match read_json(&path)? {
            Some(value) => serde_json::from_value::<ConfigFile>(value).unwrap_or_else(|e| {
                warn!("Ignoring invalid config {}: {}", path.display(), e);
                ConfigFile::default()
            }),
            None => ConfigFile::default(),
        };

        let config = match file.data_path {
            Some(data_path) => Self::new(data_path),
            None => Self::default(),
        };
        debug!("Sync document: {}", config.document_path().display());
        Ok(config)
    }

    /// Resolved absolute path of the sync document
    pub fn document_path(&self) -> PathBuf {
        self.data_dir.join(DOCUMENT_FILE)
    }

    pub fn backup_dir(&self) -> PathBuf {
        self.data_dir.join("backups")
    }

    pub fn store(&self) -> DocumentStore {
        DocumentStore::new(self.document_path()).with_backups(BackupRotation::new(self.backup_dir()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    #[test]
    fn test_missing_config_uses_default() {
        let dir = tempfile::tempdir().unwrap();
        let config = HostConfig::load(Some(&dir.path().join("none.json"))).unwrap();
        assert_eq!(config.data_dir, HostConfig::default_data_dir());
    }

    #[test]
    fn test_data_path_override() {
        let dir = tempfile::tempdir().unwrap();
        let config_path = dir.path().join("native-host.json");
        fs::write(&config_path, r#"{"dataPath": "/srv/prompts"}"#).unwrap();

        let config = HostConfig::load(Some(&config_path)).unwrap();
        assert_eq!(config.document_path(), PathBuf::from("/srv/prompts/sync-data.json"));
        assert_eq!(config.backup_dir(), PathBuf::from("/srv/prompts/backups"));
    }

    #[test]
    fn test_malformed_config_ignored() {
        let dir = tempfile::tempdir().unwrap();
        let config_path = dir.path().join("native-host.json");
        fs::write(&config_path, r#"{"dataPath": 12}"#).unwrap();

        let config = HostConfig::load(Some(&config_path)).unwrap();
        assert_eq!(config.data_dir, HostConfig::default_data_dir());
    }
}
