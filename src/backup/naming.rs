//! Backup catalog
//!
//! There is no persisted index. The set of backups for a logical name, and
//! their order, is reconstructed from directory names of the form
//! `<name>_<YYYYMMDD_HHMMSS>[_<N>]` and `<name>_inc_<YYYYMMDD_HHMMSS>[_<N>]`.

use std::cmp::Ordering;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::time::SystemTime;

use chrono::{DateTime, NaiveDateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::{BackupError, BackupPhase};

/// Format of the timestamp embedded in backup names (UTC)
pub const TIMESTAMP_FORMAT: &str = "%Y%m%d_%H%M%S";

/// Infix marking an incremental backup
const INCREMENTAL_INFIX: &str = "inc";

/// Upper bound on same-second collisions before giving up
const MAX_SEQUENCE: u32 = 10_000;

/// Kind of a backup directory
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum BackupKind {
    Full,
    Incremental,
}

impl BackupKind {
    /// Label used in manifests and listings
    pub fn label(self) -> &'static str {
        match self {
            Self::Full => "Full",
            Self::Incremental => "Incremental",
        }
    }

    pub fn from_label(label: &str) -> Option<Self> {
        match label.trim().to_lowercase().as_str() {
            "full" => Some(Self::Full),
            "incremental" => Some(Self::Incremental),
            _ => None,
        }
    }
}

impl std::fmt::Display for BackupKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.label())
    }
}

/// Parsed form of a backup directory name
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BackupId {
    pub name: String,
    pub kind: BackupKind,
    pub timestamp: NaiveDateTime,
    /// Collision sequence, zero when the name carries no `_<N>` suffix
    pub sequence: u32,
}

impl BackupId {
    /// Parse a directory name, returning `None` if it is not a backup
    pub fn parse(dir_name: &str) -> Option<Self> {
        let parts: Vec<&str> = dir_name.split('_').collect();

        let (prefix, timestamp, sequence) = match split_timestamp(&parts) {
            Some((prefix, timestamp)) => (prefix, timestamp, 0),
            None => {
                let (last, rest) = parts.split_last()?;
                let sequence = parse_sequence(last)?;
                let (prefix, timestamp) = split_timestamp(rest)?;
                (prefix, timestamp, sequence)
            }
        };

        let (kind, name_parts) = match prefix.split_last() {
            Some((&last, rest)) if last == INCREMENTAL_INFIX && !rest.is_empty() => {
                (BackupKind::Incremental, rest)
            }
            _ => (BackupKind::Full, prefix),
        };

        let name = name_parts.join("_");
        if name.is_empty() {
            return None;
        }

        Some(Self {
            name,
            kind,
            timestamp,
            sequence,
        })
    }

    /// Directory name for this id
    pub fn dir_name(&self) -> String {
        let mut dir_name = self.name.clone();
        if self.kind == BackupKind::Incremental {
            dir_name.push('_');
            dir_name.push_str(INCREMENTAL_INFIX);
        }
        dir_name.push('_');
        dir_name.push_str(&self.timestamp.format(TIMESTAMP_FORMAT).to_string());
        if self.sequence > 0 {
            dir_name.push_str(&format!("_{}", self.sequence));
        }
        dir_name
    }

    pub fn timestamp_utc(&self) -> DateTime<Utc> {
        DateTime::from_naive_utc_and_offset(self.timestamp, Utc)
    }
}

fn all_digits(s: &str, len: usize) -> bool {
    s.len() == len && s.bytes().all(|b| b.is_ascii_digit())
}

fn split_timestamp<'a>(parts: &'a [&'a str]) -> Option<(&'a [&'a str], NaiveDateTime)> {
    if parts.len() < 3 {
        return None;
    }
    let (prefix, stamp) = parts.split_at(parts.len() - 2);
    if !all_digits(stamp[0], 8) || !all_digits(stamp[1], 6) {
        return None;
    }

    let timestamp =
        NaiveDateTime::parse_from_str(&format!("{}_{}", stamp[0], stamp[1]), TIMESTAMP_FORMAT)
            .ok()?;
    Some((prefix, timestamp))
}

fn parse_sequence(part: &str) -> Option<u32> {
    if part.is_empty() || !part.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    part.parse().ok().filter(|&n| n > 0)
}

/// A backup directory found under a backup root
#[derive(Debug, Clone)]
pub struct CatalogEntry {
    pub id: BackupId,
    pub path: PathBuf,
    pub modified: SystemTime,
}

impl CatalogEntry {
    /// Order by timestamp, then collision sequence, then directory mtime
    pub fn chronological(a: &Self, b: &Self) -> Ordering {
        a.id.timestamp
            .cmp(&b.id.timestamp)
            .then(a.id.sequence.cmp(&b.id.sequence))
            .then(a.modified.cmp(&b.modified))
    }
}

/// Every backup directory directly under `backup_dir`, oldest first
///
/// A missing backup directory yields an empty catalog.
pub fn scan(backup_dir: &Path) -> io::Result<Vec<CatalogEntry>> {
    let read_dir = match fs::read_dir(backup_dir) {
        Ok(read_dir) => read_dir,
        Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(Vec::new()),
        Err(e) => return Err(e),
    };

    let mut entries = Vec::new();
    for entry in read_dir {
        let entry = entry?;
        let metadata = entry.metadata()?;
        if !metadata.is_dir() {
            continue;
        }
        let Some(id) = entry.file_name().to_str().and_then(BackupId::parse) else {
            continue;
        };
        entries.push(CatalogEntry {
            id,
            path: entry.path(),
            modified: metadata.modified()?,
        });
    }

    entries.sort_by(CatalogEntry::chronological);
    Ok(entries)
}

/// Backups of one logical name, oldest first
pub fn entries_for(backup_dir: &Path, name: &str) -> io::Result<Vec<CatalogEntry>> {
    Ok(scan(backup_dir)?
        .into_iter()
        .filter(|entry| entry.id.name == name)
        .collect())
}

/// Most recent backup of `name`, of any kind
pub fn find_latest(backup_dir: &Path, name: &str) -> io::Result<Option<CatalogEntry>> {
    Ok(entries_for(backup_dir, name)?.pop())
}

/// Check a logical backup name before any I/O
pub fn validate_name(name: &str) -> Result<(), BackupError> {
    if name.trim().is_empty() {
        return Err(BackupError::InvalidParameters(
            "backup name is empty".to_string(),
        ));
    }
    if name == "." || name == ".." {
        return Err(BackupError::InvalidParameters(format!(
            "invalid backup name '{}'",
            name
        )));
    }
    if name.contains(['/', '\\', '\0']) {
        return Err(BackupError::InvalidParameters(format!(
            "backup name '{}' contains a path separator",
            name
        )));
    }
    if name.ends_with("_inc") {
        return Err(BackupError::InvalidParameters(format!(
            "backup name '{}' must not end with '_inc'",
            name
        )));
    }
    Ok(())
}

/// Exclusively create a fresh backup directory
///
/// On a same-second collision a `_<N>` suffix is appended, so concurrent
/// runs never share a destination.
pub fn create_unique_dir(
    backup_dir: &Path,
    name: &str,
    kind: BackupKind,
    timestamp: NaiveDateTime,
) -> Result<(BackupId, PathBuf), BackupError> {
    for sequence in 0..MAX_SEQUENCE {
        let id = BackupId {
            name: name.to_string(),
            kind,
            timestamp,
            sequence,
        };
        let path = backup_dir.join(id.dir_name());

        // Full and incremental share the sequence so same-second backups stay ordered
        let other = BackupId {
            kind: match kind {
                BackupKind::Full => BackupKind::Incremental,
                BackupKind::Incremental => BackupKind::Full,
            },
            ..id.clone()
        };
        if backup_dir.join(other.dir_name()).exists() {
            continue;
        }

        match fs::create_dir(&path) {
            Ok(()) => return Ok((id, path)),
            Err(e) if e.kind() == io::ErrorKind::AlreadyExists => continue,
            Err(e) => return Err(BackupError::create_dir(BackupPhase::Prepare, &path, e)),
        }
    }

    Err(BackupError::CreateDir {
        phase: BackupPhase::Prepare,
        path: backup_dir.to_path_buf(),
        message: format!("too many backups named '{}' in one second", name),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;
    use tempfile::TempDir;

    fn ts(h: u32, m: u32, s: u32) -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2025, 3, 14)
            .unwrap()
            .and_hms_opt(h, m, s)
            .unwrap()
    }

    #[test]
    fn test_parse_full() {
        let id = BackupId::parse("proj_20250314_120501").unwrap();
        assert_eq!(id.name, "proj");
        assert_eq!(id.kind, BackupKind::Full);
        assert_eq!(id.timestamp, ts(12, 5, 1));
        assert_eq!(id.sequence, 0);
    }

    #[test]
    fn test_parse_incremental_with_sequence() {
        let id = BackupId::parse("my_proj_inc_20250314_120501_3").unwrap();
        assert_eq!(id.name, "my_proj");
        assert_eq!(id.kind, BackupKind::Incremental);
        assert_eq!(id.sequence, 3);
    }

    #[test]
    fn test_parse_rejects_non_backups() {
        assert!(BackupId::parse("proj").is_none());
        assert!(BackupId::parse("proj_2025").is_none());
        assert!(BackupId::parse("_20250314_120501").is_none());
        assert!(BackupId::parse("proj_20251399_120501").is_none());
        assert!(BackupId::parse("proj_20250314_120501_0").is_none());
        assert!(BackupId::parse("proj_20250314_120501_x").is_none());
    }

    #[test]
    fn test_dir_name_roundtrip() {
        for name in [
            "proj_20250314_120501",
            "proj_inc_20250314_120501",
            "a_b_20250314_120501_2",
        ] {
            assert_eq!(BackupId::parse(name).unwrap().dir_name(), name);
        }
    }

    #[test]
    fn test_find_latest_is_exact_and_ordered() {
        let temp_dir = TempDir::new().unwrap();
        let dir = temp_dir.path();
        for name in [
            "proj_20250314_120000",
            "proj_inc_20250314_130000",
            "proj_20250314_130000_1",
            "project_20250314_230000",
            "proj_notes",
        ] {
            fs::create_dir(dir.join(name)).unwrap();
        }
        fs::write(dir.join("proj_20250314_235959"), b"not a dir").unwrap();

        let latest = find_latest(dir, "proj").unwrap().unwrap();
        assert_eq!(latest.path, dir.join("proj_20250314_130000_1"));

        assert_eq!(entries_for(dir, "proj").unwrap().len(), 3);
        assert!(find_latest(dir, "other").unwrap().is_none());
    }

    #[test]
    fn test_scan_missing_dir_is_empty() {
        let temp_dir = TempDir::new().unwrap();
        assert!(scan(&temp_dir.path().join("missing")).unwrap().is_empty());
    }

    #[test]
    fn test_create_unique_dir_appends_sequence() {
        let temp_dir = TempDir::new().unwrap();
        let when = ts(9, 0, 0);

        let (first, p1) = create_unique_dir(temp_dir.path(), "proj", BackupKind::Full, when).unwrap();
        let (second, p2) =
            create_unique_dir(temp_dir.path(), "proj", BackupKind::Full, when).unwrap();

        assert_eq!(first.sequence, 0);
        assert_eq!(second.sequence, 1);
        assert!(p1.ends_with("proj_20250314_090000"));
        assert!(p2.ends_with("proj_20250314_090000_1"));
    }

    #[test]
    fn test_sequence_is_shared_across_kinds() {
        let temp_dir = TempDir::new().unwrap();
        let when = ts(9, 0, 0);

        create_unique_dir(temp_dir.path(), "proj", BackupKind::Full, when).unwrap();
        let (inc, _) =
            create_unique_dir(temp_dir.path(), "proj", BackupKind::Incremental, when).unwrap();
        assert_eq!(inc.sequence, 1);

        let latest = find_latest(temp_dir.path(), "proj").unwrap().unwrap();
        assert_eq!(latest.id, inc);
    }

    #[test]
    fn test_validate_name() {
        assert!(validate_name("proj").is_ok());
        assert!(validate_name("my proj").is_ok());
        assert!(validate_name("").is_err());
        assert!(validate_name("   ").is_err());
        assert!(validate_name("..").is_err());
        assert!(validate_name("a/b").is_err());
        assert!(validate_name("a\\b").is_err());
        assert!(validate_name("proj_inc").is_err());
    }
}
