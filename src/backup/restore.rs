//! Backup restoration for Strongbox
//!
//! Restores whole backups, single files out of a backup, and single-file
//! backups. Integrity mismatches found after a restore are reported as
//! warnings; the restored content is kept.

use std::fs;
use std::io;
use std::path::{Component, Path, PathBuf};
use std::time::{Duration, Instant};

use crate::error::{BackupError, BackupPhase};
use crate::fs::DirectoryWalker;

use super::copy::{copy_streaming, load_detected, load_file, stored_digest, CopiedFile};
use super::manager::{meta_path_for, BackupEngine, CopyTotals};
use super::manifest::{self, parse_fields, BackupManifest, MANIFEST_FILE};
use super::naming::{self, CatalogEntry};

/// Result of a restore operation
#[derive(Debug, Clone)]
pub struct RestoreResult {
    /// Backup directory or file the content came from
    pub source: PathBuf,
    /// Where the content was written
    pub destination: PathBuf,
    pub file_count: u64,
    pub total_bytes: u64,
    /// Checksum of the restored content
    pub checksum: String,
    /// Checksum recorded when the backup was made, if readable
    pub expected_checksum: Option<String>,
    pub warnings: Vec<String>,
    pub duration: Duration,
}

impl RestoreResult {
    /// `Some(true)` if the restored content matches the recorded checksum,
    /// `None` if there was nothing to compare against
    pub fn checksum_verified(&self) -> Option<bool> {
        self.expected_checksum
            .as_ref()
            .map(|expected| *expected == self.checksum)
    }

    /// Get a summary of what was restored
    pub fn summary(&self) -> String {
        let integrity = match self.checksum_verified() {
            Some(true) => "checksum verified",
            Some(false) => "CHECKSUM MISMATCH",
            None => "checksum not available",
        };
        format!(
            "Restored {} file(s), {} bytes ({})",
            self.file_count, self.total_bytes, integrity
        )
    }
}

/// Result of validating a backup against its manifest
#[derive(Debug, Clone)]
pub struct ValidationResult {
    pub path: PathBuf,
    pub manifest: BackupManifest,
    pub file_count: u64,
    pub total_bytes: u64,
    pub checksum: String,
}

impl ValidationResult {
    pub fn is_valid(&self) -> bool {
        self.checksum == self.manifest.checksum
            && self.file_count == self.manifest.file_count
            && self.total_bytes == self.manifest.size
    }

    /// Get a summary of the verification
    pub fn summary(&self) -> String {
        if self.is_valid() {
            format!(
                "Backup is intact: {} file(s), {} bytes",
                self.file_count, self.total_bytes
            )
        } else {
            format!(
                "Backup is damaged: expected {} file(s) / {} bytes / checksum {}, found {} / {} / {}",
                self.manifest.file_count,
                self.manifest.size,
                self.manifest.checksum,
                self.file_count,
                self.total_bytes,
                self.checksum
            )
        }
    }
}

/// Warning attached to restores whose storage flags had to be detected
const FORMAT_DETECTED: &str = "metadata unavailable; storage format detected from file headers";

/// Storage flags of a backup, read from its manifest
#[derive(Debug, Clone, Copy)]
struct StoredFormat {
    compressed: bool,
    encrypted: bool,
}

impl StoredFormat {
    fn from_manifest(manifest: &BackupManifest) -> Self {
        Self {
            compressed: manifest.compressed,
            encrypted: manifest.encrypted,
        }
    }

    fn is_plain(self) -> bool {
        !self.compressed && !self.encrypted
    }
}

fn is_manifest(relative_path: &Path) -> bool {
    relative_path == Path::new(MANIFEST_FILE)
}

/// Most recent backup of `name`, or `BackupNotFound`
fn locate(backup_dir: &Path, name: &str) -> Result<CatalogEntry, BackupError> {
    naming::find_latest(backup_dir, name)
        .map_err(|e| BackupError::copy(BackupPhase::Locate, backup_dir, e))?
        .ok_or_else(|| BackupError::BackupNotFound {
            name: name.to_string(),
            dir: backup_dir.to_path_buf(),
        })
}

impl BackupEngine {
    /// Restore the most recent backup of `name` into `restore_dir`
    pub fn restore(&self, name: &str, restore_dir: &Path) -> Result<RestoreResult, BackupError> {
        naming::validate_name(name)?;
        validate_destination(restore_dir)?;
        self.require_backup_dir()?;

        let entry = locate(self.backup_dir(), name)?;
        self.restore_path(&entry.path, restore_dir)
    }

    /// Restore an explicit backup directory into `restore_dir`
    ///
    /// Existing files in `restore_dir` with the same relative paths are
    /// overwritten. The manifest is not restored.
    pub fn restore_path(
        &self,
        backup_path: &Path,
        restore_dir: &Path,
    ) -> Result<RestoreResult, BackupError> {
        validate_destination(restore_dir)?;
        if !backup_path.is_dir() {
            return Err(BackupError::SourceNotFound(backup_path.to_path_buf()));
        }
        let started_at = Instant::now();
        tracing::info!(
            backup = %backup_path.display(),
            destination = %restore_dir.display(),
            "Starting restore"
        );

        let manifest = match BackupManifest::load(backup_path) {
            Ok(manifest) => Some(manifest),
            Err(e) => {
                tracing::warn!(error = %e, "Backup manifest unavailable");
                None
            }
        };
        let expected_checksum = manifest
            .as_ref()
            .map(|m| m.checksum.clone())
            .or_else(|| manifest::read_checksum(backup_path));
        let format = manifest.as_ref().map(StoredFormat::from_manifest);

        fs::create_dir_all(restore_dir)
            .map_err(|e| BackupError::create_dir(BackupPhase::Restore, restore_dir, e))?;

        let mut totals = CopyTotals::default();
        for entry in DirectoryWalker::new(backup_path).exclude(is_manifest) {
            let entry =
                entry.map_err(|e| BackupError::copy(BackupPhase::Restore, backup_path, e))?;
            let target = restore_dir.join(&entry.relative_path);

            if entry.is_dir {
                fs::create_dir_all(&target)
                    .map_err(|e| BackupError::create_dir(BackupPhase::Restore, &target, e))?;
                continue;
            }

            let copied = self.restore_one(&entry.path, &target, format)?;
            totals.add(&entry.relative_path, copied);
        }

        let mut result = RestoreResult {
            source: backup_path.to_path_buf(),
            destination: restore_dir.to_path_buf(),
            file_count: totals.file_count,
            total_bytes: totals.total_bytes,
            checksum: totals.tree.finish(),
            expected_checksum,
            warnings: format_warnings(format),
            duration: started_at.elapsed(),
        };
        check_integrity(&mut result);

        tracing::info!(
            files = result.file_count,
            bytes = result.total_bytes,
            "Restore complete"
        );
        Ok(result)
    }

    /// Restore one file from the most recent backup of `name` that holds it
    ///
    /// `relative_file` is relative to the backup root and may not escape it.
    /// Parent directories of `restore_path` are created as needed.
    pub fn restore_file_from_backup(
        &self,
        name: &str,
        relative_file: &Path,
        restore_path: &Path,
    ) -> Result<RestoreResult, BackupError> {
        naming::validate_name(name)?;
        validate_relative(relative_file)?;
        validate_destination(restore_path)?;
        self.require_backup_dir()?;
        let started_at = Instant::now();

        let entries = naming::entries_for(self.backup_dir(), name)
            .map_err(|e| BackupError::copy(BackupPhase::Locate, self.backup_dir(), e))?;
        let latest = entries
            .last()
            .ok_or_else(|| BackupError::BackupNotFound {
                name: name.to_string(),
                dir: self.backup_dir().to_path_buf(),
            })?
            .path
            .join(relative_file);

        // Incrementals hold only changed files, so fall back to older backups
        let Some(entry) = entries
            .iter()
            .rev()
            .find(|entry| entry.path.join(relative_file).exists())
        else {
            return Err(BackupError::SourceNotFound(latest));
        };

        let stored = entry.path.join(relative_file);
        if stored.is_dir() {
            return Err(BackupError::InvalidParameters(format!(
                "{} is a directory",
                relative_file.display()
            )));
        }

        let format = BackupManifest::load(&entry.path)
            .ok()
            .map(|manifest| StoredFormat::from_manifest(&manifest));
        let copied = self.restore_one(&stored, restore_path, format)?;

        // The tree checksum covers the whole backup, so it cannot vouch for one file
        let result = RestoreResult {
            source: stored,
            destination: restore_path.to_path_buf(),
            file_count: 1,
            total_bytes: copied.bytes,
            checksum: copied.checksum,
            expected_checksum: None,
            warnings: format_warnings(format),
            duration: started_at.elapsed(),
        };
        tracing::info!(
            source = %result.source.display(),
            destination = %restore_path.display(),
            "File restored"
        );
        Ok(result)
    }

    /// Restore a single-file backup made by [`BackupEngine::backup_file`]
    pub fn restore_file(
        &self,
        backup_file: &Path,
        restore_path: &Path,
    ) -> Result<RestoreResult, BackupError> {
        if backup_file.as_os_str().is_empty() {
            return Err(BackupError::InvalidParameters(
                "backup file is empty".to_string(),
            ));
        }
        validate_destination(restore_path)?;
        match fs::metadata(backup_file) {
            Ok(metadata) if metadata.is_file() => {}
            Ok(_) => return Err(BackupError::InvalidPath(backup_file.to_path_buf())),
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                return Err(BackupError::SourceNotFound(backup_file.to_path_buf()))
            }
            Err(e) => return Err(BackupError::copy(BackupPhase::Locate, backup_file, e)),
        }
        let started_at = Instant::now();

        let meta = fs::read_to_string(meta_path_for(backup_file))
            .ok()
            .map(|text| parse_fields(&text));
        let format = meta.as_ref().map(|meta| {
            let flag = |key: &str| {
                meta.get(key)
                    .map(|v| v.eq_ignore_ascii_case("yes"))
                    .unwrap_or(false)
            };
            StoredFormat {
                compressed: flag("Compressed"),
                encrypted: flag("Encrypted"),
            }
        });

        let copied = self.restore_one(backup_file, restore_path, format)?;

        let mut result = RestoreResult {
            source: backup_file.to_path_buf(),
            destination: restore_path.to_path_buf(),
            file_count: 1,
            total_bytes: copied.bytes,
            checksum: copied.checksum,
            expected_checksum: meta.as_ref().and_then(|meta| meta.get("Checksum").cloned()),
            warnings: format_warnings(format),
            duration: started_at.elapsed(),
        };
        check_integrity(&mut result);
        Ok(result)
    }

    /// Recompute a backup's checksum and compare it with its manifest
    pub fn verify_backup(&self, backup_path: &Path) -> Result<ValidationResult, BackupError> {
        if !backup_path.is_dir() {
            return Err(BackupError::SourceNotFound(backup_path.to_path_buf()));
        }
        let manifest = BackupManifest::load(backup_path).map_err(|e| BackupError::CopyFile {
            phase: BackupPhase::Verify,
            path: backup_path.join(MANIFEST_FILE),
            message: e.to_string(),
        })?;
        let format = StoredFormat::from_manifest(&manifest);

        let mut totals = CopyTotals::default();
        for entry in DirectoryWalker::new(backup_path).exclude(is_manifest) {
            let entry =
                entry.map_err(|e| BackupError::copy(BackupPhase::Verify, backup_path, e))?;
            if entry.is_dir {
                continue;
            }
            let digest =
                stored_digest(&entry.path, format.compressed, format.encrypted, self.key())?;
            totals.add(&entry.relative_path, digest);
        }

        let result = ValidationResult {
            path: backup_path.to_path_buf(),
            manifest,
            file_count: totals.file_count,
            total_bytes: totals.total_bytes,
            checksum: totals.tree.finish(),
        };
        if !result.is_valid() {
            tracing::warn!(path = %backup_path.display(), "Backup failed verification");
        }
        Ok(result)
    }

    /// Copy one stored file out, detecting its format when `format` is unknown
    fn restore_one(
        &self,
        stored: &Path,
        target: &Path,
        format: Option<StoredFormat>,
    ) -> Result<CopiedFile, BackupError> {
        match format {
            None => load_detected(stored, target, self.key(), BackupPhase::Restore),
            Some(format) if format.is_plain() => {
                copy_streaming(stored, target, BackupPhase::Restore)
            }
            Some(format) => load_file(
                stored,
                target,
                format.compressed,
                format.encrypted,
                self.key(),
                BackupPhase::Restore,
            ),
        }
    }

    fn require_backup_dir(&self) -> Result<(), BackupError> {
        if self.backup_dir().as_os_str().is_empty() {
            return Err(BackupError::InvalidParameters(
                "backup directory is empty".to_string(),
            ));
        }
        if !self.backup_dir().is_dir() {
            return Err(BackupError::SourceNotFound(self.backup_dir().to_path_buf()));
        }
        Ok(())
    }
}

fn format_warnings(format: Option<StoredFormat>) -> Vec<String> {
    match format {
        Some(_) => Vec::new(),
        None => vec![FORMAT_DETECTED.to_string()],
    }
}

fn check_integrity(result: &mut RestoreResult) {
    if result.checksum_verified() == Some(false) {
        let expected = result.expected_checksum.clone().unwrap_or_default();
        tracing::warn!(
            source = %result.source.display(),
            expected = %expected,
            actual = %result.checksum,
            "Checksum mismatch after restore"
        );
        result.warnings.push(format!(
            "checksum mismatch: expected {}, restored content has {}",
            expected, result.checksum
        ));
    }
}

fn validate_destination(path: &Path) -> Result<(), BackupError> {
    if path.as_os_str().is_empty() {
        return Err(BackupError::InvalidParameters(
            "restore destination is empty".to_string(),
        ));
    }
    Ok(())
}

fn validate_relative(path: &Path) -> Result<(), BackupError> {
    if path.as_os_str().is_empty() {
        return Err(BackupError::InvalidParameters(
            "file path is empty".to_string(),
        ));
    }
    let escapes = path.components().any(|c| {
        matches!(
            c,
            Component::ParentDir | Component::RootDir | Component::Prefix(_)
        )
    });
    if escapes {
        return Err(BackupError::InvalidParameters(format!(
            "{} must be relative to the backup root",
            path.display()
        )));
    }
    if is_manifest(path) {
        return Err(BackupError::InvalidParameters(format!(
            "{} is backup metadata, not backup content",
            MANIFEST_FILE
        )));
    }
    Ok(())
}
