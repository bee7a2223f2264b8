//! Change detection for a single file

use std::io;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};

use super::checksum::checksum_file;

/// Remembers the size and digest of a file between checks
#[derive(Debug, Clone)]
pub struct FileMonitor {
    path: PathBuf,
    last_size: u64,
    last_checksum: String,
    last_check: DateTime<Utc>,
}

impl FileMonitor {
    /// Start monitoring `path`, which must exist
    pub fn new(path: impl Into<PathBuf>) -> io::Result<Self> {
        let path = path.into();
        let last_size = path.metadata()?.len();
        let last_checksum = checksum_file(&path)?;

        Ok(Self {
            path,
            last_size,
            last_checksum,
            last_check: Utc::now(),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn last_checksum(&self) -> &str {
        &self.last_checksum
    }

    pub fn last_check(&self) -> DateTime<Utc> {
        self.last_check
    }

    /// Whether the file changed since the previous check
    ///
    /// Updates the stored snapshot. Fails if the file has been removed.
    pub fn check(&mut self) -> io::Result<bool> {
        let size = self.path.metadata()?.len();
        let digest = checksum_file(&self.path)?;
        self.last_check = Utc::now();

        let changed = size != self.last_size || digest != self.last_checksum;
        self.last_size = size;
        self.last_checksum = digest;
        Ok(changed)
    }
}
