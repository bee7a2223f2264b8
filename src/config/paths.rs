//! Path management for Strongbox
//!
//! ## Path Resolution Order
//!
//! 1. `STRONGBOX_HOME` environment variable (if set)
//! 2. The platform data directory from `directories::ProjectDirs`
//!    (`~/.local/share/strongbox` on Linux)

use std::path::PathBuf;

use directories::ProjectDirs;

use crate::error::StrongboxError;

/// Environment variable overriding the Strongbox home directory
pub const HOME_ENV_VAR: &str = "STRONGBOX_HOME";

/// Manages all paths used by Strongbox
#[derive(Debug, Clone)]
pub struct StrongboxPaths {
    base_dir: PathBuf,
}

impl StrongboxPaths {
    /// Resolve the home directory from the environment or the platform
    ///
    /// # Errors
    ///
    /// Returns an error if no home directory can be determined.
    pub fn new() -> Result<Self, StrongboxError> {
        let base_dir = match std::env::var_os(HOME_ENV_VAR) {
            Some(custom) if !custom.is_empty() => PathBuf::from(custom),
            _ => resolve_default_path()?,
        };

        Ok(Self { base_dir })
    }

    /// Create StrongboxPaths with a custom base directory (useful for testing)
    pub fn with_base_dir(base_dir: PathBuf) -> Self {
        Self { base_dir }
    }

    pub fn base_dir(&self) -> &PathBuf {
        &self.base_dir
    }

    /// Default location for files written with `strongbox file`
    pub fn data_dir(&self) -> PathBuf {
        self.base_dir.join("data")
    }

    /// Default backup root
    pub fn backup_dir(&self) -> PathBuf {
        self.base_dir.join("backups")
    }

    pub fn keys_dir(&self) -> PathBuf {
        self.base_dir.join("keys")
    }

    /// Path of the master key
    pub fn key_file(&self) -> PathBuf {
        self.keys_dir().join("master.key")
    }

    pub fn settings_file(&self) -> PathBuf {
        self.base_dir.join("config.json")
    }

    /// Ensure all required directories exist
    pub fn ensure_directories(&self) -> Result<(), StrongboxError> {
        for (label, dir) in [
            ("base", self.base_dir.clone()),
            ("data", self.data_dir()),
            ("backup", self.backup_dir()),
            ("keys", self.keys_dir()),
        ] {
            std::fs::create_dir_all(&dir).map_err(|e| {
                StrongboxError::Io(format!(
                    "Failed to create {} directory {}: {}",
                    label,
                    dir.display(),
                    e
                ))
            })?;
        }
        Ok(())
    }

    /// Check if Strongbox has been initialized (config file exists)
    pub fn is_initialized(&self) -> bool {
        self.settings_file().exists()
    }
}

fn resolve_default_path() -> Result<PathBuf, StrongboxError> {
    ProjectDirs::from("", "", "strongbox")
        .map(|dirs| dirs.data_dir().to_path_buf())
        .ok_or_else(|| {
            StrongboxError::Config(format!(
                "Could not determine a home directory; set {}",
                HOME_ENV_VAR
            ))
        })
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_custom_base_dir() {
        let temp_dir = TempDir::new().unwrap();
        let paths = StrongboxPaths::with_base_dir(temp_dir.path().to_path_buf());

        assert_eq!(paths.base_dir(), temp_dir.path());
        assert_eq!(paths.data_dir(), temp_dir.path().join("data"));
        assert_eq!(paths.backup_dir(), temp_dir.path().join("backups"));
        assert_eq!(
            paths.key_file(),
            temp_dir.path().join("keys").join("master.key")
        );
        assert_eq!(paths.settings_file(), temp_dir.path().join("config.json"));
    }

    #[test]
    fn test_ensure_directories() {
        let temp_dir = TempDir::new().unwrap();
        let paths = StrongboxPaths::with_base_dir(temp_dir.path().join("home"));

        assert!(!paths.is_initialized());
        paths.ensure_directories().unwrap();

        assert!(paths.data_dir().is_dir());
        assert!(paths.backup_dir().is_dir());
        assert!(paths.keys_dir().is_dir());
    }
}
