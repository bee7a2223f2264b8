//! User settings for Strongbox
//!
//! Manages the log level, backup defaults and automatic backup
//! configuration. Stored as JSON in `config.json`; missing fields take
//! their defaults so older files keep loading.

use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use super::paths::StrongboxPaths;
use crate::backup::{AutoBackupConfig, RetentionPolicy};
use crate::error::StrongboxError;
use crate::storage::{read_json, write_json_atomic};

/// Defaults applied by `strongbox backup` commands
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BackupDefaults {
    /// Logical name used when none is given
    #[serde(default = "default_backup_name")]
    pub default_name: String,

    /// Source directory used when none is given
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source_dir: Option<PathBuf>,

    /// Overrides `<home>/backups`
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub backup_dir: Option<PathBuf>,

    #[serde(default = "default_retention_days")]
    pub retention_days: u32,

    /// Newest backups of each name that retention never removes
    #[serde(default = "default_min_retained")]
    pub min_retained: usize,

    #[serde(default)]
    pub compress: bool,

    #[serde(default)]
    pub encrypt: bool,
}

fn default_backup_name() -> String {
    "backup".to_string()
}

fn default_retention_days() -> u32 {
    30
}

fn default_min_retained() -> usize {
    1
}

impl Default for BackupDefaults {
    fn default() -> Self {
        Self {
            default_name: default_backup_name(),
            source_dir: None,
            backup_dir: None,
            retention_days: default_retention_days(),
            min_retained: default_min_retained(),
            compress: false,
            encrypt: false,
        }
    }
}

impl BackupDefaults {
    pub fn retention_policy(&self) -> RetentionPolicy {
        RetentionPolicy {
            min_retained: self.min_retained,
            ..RetentionPolicy::new(self.retention_days)
        }
    }
}

/// User settings for Strongbox
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Settings {
    /// Schema version for migration support
    #[serde(default = "default_schema_version")]
    pub schema_version: u32,

    /// Default tracing filter; `RUST_LOG` overrides it
    #[serde(default = "default_log_level")]
    pub log_level: String,

    #[serde(default)]
    pub backup: BackupDefaults,

    #[serde(default)]
    pub auto_backup: AutoBackupConfig,
}

fn default_schema_version() -> u32 {
    1
}

fn default_log_level() -> String {
    "warn".to_string()
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            schema_version: default_schema_version(),
            log_level: default_log_level(),
            backup: BackupDefaults::default(),
            auto_backup: AutoBackupConfig::default(),
        }
    }
}

impl Settings {
    /// Load settings from disk, or default settings if the file doesn't exist
    ///
    /// Nothing is written; the caller decides when to persist.
    pub fn load_or_create(paths: &StrongboxPaths) -> Result<Self, StrongboxError> {
        read_json(paths.settings_file()).map_err(|e| match e {
            StrongboxError::Json(msg) => {
                StrongboxError::Config(format!("Failed to parse settings file: {}", msg))
            }
            other => other,
        })
    }

    /// Save settings to disk
    pub fn save(&self, paths: &StrongboxPaths) -> Result<(), StrongboxError> {
        paths.ensure_directories()?;
        write_json_atomic(paths.settings_file(), self)
    }

    /// Backup root, honoring the configured override
    pub fn backup_dir(&self, paths: &StrongboxPaths) -> PathBuf {
        self.backup
            .backup_dir
            .clone()
            .unwrap_or_else(|| paths.backup_dir())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backup::BackupSchedule;
    use tempfile::TempDir;

    #[test]
    fn test_default_settings() {
        let settings = Settings::default();
        assert_eq!(settings.log_level, "warn");
        assert_eq!(settings.backup.default_name, "backup");
        assert_eq!(settings.backup.retention_days, 30);
        assert_eq!(settings.backup.min_retained, 1);
        assert!(!settings.auto_backup.enabled);
    }

    #[test]
    fn test_save_and_load() {
        let temp_dir = TempDir::new().unwrap();
        let paths = StrongboxPaths::with_base_dir(temp_dir.path().to_path_buf());

        let mut settings = Settings::default();
        settings.backup.compress = true;
        settings.auto_backup.enabled = true;
        settings.auto_backup.schedule = Some(BackupSchedule::daily(3, 15));
        settings.save(&paths).unwrap();

        let loaded = Settings::load_or_create(&paths).unwrap();
        assert_eq!(loaded, settings);
    }

    #[test]
    fn test_missing_file_gives_defaults() {
        let temp_dir = TempDir::new().unwrap();
        let paths = StrongboxPaths::with_base_dir(temp_dir.path().to_path_buf());

        let loaded = Settings::load_or_create(&paths).unwrap();
        assert_eq!(loaded, Settings::default());
        assert!(!paths.settings_file().exists());
    }

    #[test]
    fn test_partial_file_fills_defaults() {
        let temp_dir = TempDir::new().unwrap();
        let paths = StrongboxPaths::with_base_dir(temp_dir.path().to_path_buf());
        std::fs::write(
            paths.settings_file(),
            r#"{"log_level": "debug", "backup": {"retention_days": 7}}"#,
        )
        .unwrap();

        let loaded = Settings::load_or_create(&paths).unwrap();
        assert_eq!(loaded.log_level, "debug");
        assert_eq!(loaded.backup.retention_days, 7);
        assert_eq!(loaded.backup.default_name, "backup");
        assert_eq!(loaded.backup.retention_policy().min_retained, 1);
    }

    #[test]
    fn test_invalid_file_is_config_error() {
        let temp_dir = TempDir::new().unwrap();
        let paths = StrongboxPaths::with_base_dir(temp_dir.path().to_path_buf());
        std::fs::write(paths.settings_file(), "not json").unwrap();

        let err = Settings::load_or_create(&paths).unwrap_err();
        assert!(matches!(err, StrongboxError::Config(_)));
    }
}
