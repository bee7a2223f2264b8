//! Backup retention and catalog listing
//!
//! Only directories whose names carry a catalog timestamp are ever
//! considered, so unrelated content under the backup root is never touched.

use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::{Duration, SystemTime};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::{BackupError, BackupPhase};

use super::manager::BackupEngine;
use super::manifest::BackupManifest;
use super::naming::{self, BackupKind, CatalogEntry};

const SECONDS_PER_DAY: u64 = 86_400;

/// Retention rules for [`cleanup_with_policy`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RetentionPolicy {
    /// Backups whose directory is older than this many days are removed
    pub days_to_keep: u32,
    /// Newest backups of each name that are kept regardless of age
    pub min_retained: usize,
    /// Report what would be removed without removing anything
    pub dry_run: bool,
}

impl RetentionPolicy {
    pub fn new(days_to_keep: u32) -> Self {
        Self {
            days_to_keep,
            min_retained: 0,
            dry_run: false,
        }
    }

    fn cutoff(&self, now: SystemTime) -> Option<SystemTime> {
        now.checked_sub(Duration::from_secs(
            u64::from(self.days_to_keep) * SECONDS_PER_DAY,
        ))
    }
}

/// Outcome of a retention pass
#[derive(Debug, Clone, Default)]
pub struct CleanupReport {
    /// Backups removed, or that would be removed on a dry run
    pub deleted: Vec<PathBuf>,
    /// Backups left in place
    pub kept: usize,
    pub dry_run: bool,
}

/// Catalog entry enriched with manifest data where available
#[derive(Debug, Clone, Serialize)]
pub struct BackupInfo {
    pub name: String,
    pub kind: BackupKind,
    pub path: PathBuf,
    pub created: DateTime<Utc>,
    pub size: Option<u64>,
    pub file_count: Option<u64>,
    pub checksum: Option<String>,
    pub compressed: bool,
    pub encrypted: bool,
}

impl BackupInfo {
    fn from_entry(entry: CatalogEntry) -> Self {
        match BackupManifest::load(&entry.path) {
            Ok(manifest) => Self {
                name: entry.id.name,
                kind: entry.id.kind,
                path: entry.path,
                created: manifest.created,
                size: Some(manifest.size),
                file_count: Some(manifest.file_count),
                checksum: Some(manifest.checksum),
                compressed: manifest.compressed,
                encrypted: manifest.encrypted,
            },
            Err(_) => Self {
                created: entry.id.timestamp_utc(),
                name: entry.id.name,
                kind: entry.id.kind,
                path: entry.path,
                size: None,
                file_count: None,
                checksum: None,
                compressed: false,
                encrypted: false,
            },
        }
    }

    pub fn dir_name(&self) -> String {
        self.path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default()
    }
}

/// Delete every backup directory older than `days_to_keep` days
///
/// `days_to_keep == 0` removes every backup. Returns the removed paths.
pub fn cleanup_old_backups(
    backup_dir: &Path,
    days_to_keep: u32,
) -> Result<Vec<PathBuf>, BackupError> {
    cleanup_with_policy(backup_dir, &RetentionPolicy::new(days_to_keep)).map(|r| r.deleted)
}

/// Apply `policy` to the backups under `backup_dir`
pub fn cleanup_with_policy(
    backup_dir: &Path,
    policy: &RetentionPolicy,
) -> Result<CleanupReport, BackupError> {
    let entries = scan(backup_dir)?;
    let mut report = CleanupReport {
        dry_run: policy.dry_run,
        ..CleanupReport::default()
    };

    let Some(cutoff) = policy.cutoff(SystemTime::now()) else {
        report.kept = entries.len();
        return Ok(report);
    };

    // Entries are oldest first; count how many newer ones each name still has
    let mut remaining: HashMap<String, usize> = HashMap::new();
    for entry in &entries {
        *remaining.entry(entry.id.name.clone()).or_default() += 1;
    }

    for entry in entries {
        let newer = remaining
            .get_mut(&entry.id.name)
            .map(|count| {
                *count -= 1;
                *count
            })
            .unwrap_or(0);

        let protected = newer < policy.min_retained;
        if entry.modified >= cutoff || protected {
            report.kept += 1;
            continue;
        }

        if !policy.dry_run {
            remove_backup(&entry.path)?;
        }
        report.deleted.push(entry.path);
    }

    tracing::info!(
        deleted = report.deleted.len(),
        kept = report.kept,
        dry_run = report.dry_run,
        "Retention pass complete"
    );
    Ok(report)
}

/// Delete every backup of `name`
pub fn delete_backup(backup_dir: &Path, name: &str) -> Result<Vec<PathBuf>, BackupError> {
    naming::validate_name(name)?;
    let entries = naming::entries_for(backup_dir, name)
        .map_err(|e| BackupError::copy(BackupPhase::Locate, backup_dir, e))?;
    if entries.is_empty() {
        return Err(BackupError::BackupNotFound {
            name: name.to_string(),
            dir: backup_dir.to_path_buf(),
        });
    }

    let mut deleted = Vec::with_capacity(entries.len());
    for entry in entries {
        remove_backup(&entry.path)?;
        deleted.push(entry.path);
    }
    Ok(deleted)
}

/// Keep only the `max_backups` newest backups of `name`
pub fn prune_to(
    backup_dir: &Path,
    name: &str,
    max_backups: usize,
) -> Result<Vec<PathBuf>, BackupError> {
    let entries = naming::entries_for(backup_dir, name)
        .map_err(|e| BackupError::copy(BackupPhase::Locate, backup_dir, e))?;
    let excess = entries.len().saturating_sub(max_backups);

    let mut deleted = Vec::with_capacity(excess);
    for entry in entries.into_iter().take(excess) {
        remove_backup(&entry.path)?;
        deleted.push(entry.path);
    }
    Ok(deleted)
}

/// List all backups, newest first
pub fn list_backups(backup_dir: &Path) -> Result<Vec<BackupInfo>, BackupError> {
    let mut backups: Vec<BackupInfo> = scan(backup_dir)?
        .into_iter()
        .map(BackupInfo::from_entry)
        .collect();
    backups.reverse();
    Ok(backups)
}

fn scan(backup_dir: &Path) -> Result<Vec<CatalogEntry>, BackupError> {
    naming::scan(backup_dir).map_err(|e| BackupError::copy(BackupPhase::Cleanup, backup_dir, e))
}

fn remove_backup(path: &Path) -> Result<(), BackupError> {
    fs::remove_dir_all(path).map_err(|e| BackupError::copy(BackupPhase::Cleanup, path, e))?;
    tracing::info!(path = %path.display(), "Deleted backup");
    Ok(())
}

impl BackupEngine {
    /// Delete backups older than `days_to_keep` days
    pub fn cleanup_old_backups(&self, days_to_keep: u32) -> Result<Vec<PathBuf>, BackupError> {
        cleanup_old_backups(self.backup_dir(), days_to_keep)
    }

    pub fn cleanup_with_policy(
        &self,
        policy: &RetentionPolicy,
    ) -> Result<CleanupReport, BackupError> {
        cleanup_with_policy(self.backup_dir(), policy)
    }

    pub fn delete_backup(&self, name: &str) -> Result<Vec<PathBuf>, BackupError> {
        delete_backup(self.backup_dir(), name)
    }

    /// List all available backups, newest first
    pub fn list_backups(&self) -> Result<Vec<BackupInfo>, BackupError> {
        list_backups(self.backup_dir())
    }

    /// Get the most recent backup of `name`
    pub fn get_latest_backup(&self, name: &str) -> Result<Option<BackupInfo>, BackupError> {
        let latest = naming::find_latest(self.backup_dir(), name)
            .map_err(|e| BackupError::copy(BackupPhase::Locate, self.backup_dir(), e))?;
        Ok(latest.map(BackupInfo::from_entry))
    }
}
