//! Backup engine for Strongbox
//!
//! Creates full and incremental point-in-time copies of a source tree and
//! single-file backups. Restore, verification and retention live in the
//! sibling modules as further `impl BackupEngine` blocks or free functions.
//!
//! The source tree is read without coordinating with its writers. A file
//! modified while a backup runs may be captured in a torn state; callers
//! that need a consistent snapshot must quiesce writers themselves.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant, SystemTime};

use chrono::{DateTime, Timelike, Utc};

use crate::crypto::MasterKey;
use crate::error::{BackupError, BackupPhase};
use crate::fs::DirectoryWalker;
use crate::integrity::TreeChecksum;
use crate::storage::atomic::write_atomic;

use super::copy::{store_file, BackupOptions, CopiedFile};
use super::manifest::{BackupManifest, MANIFEST_FILE};
use super::naming::{self, BackupId, BackupKind, TIMESTAMP_FORMAT};

/// Suffix of the metadata sidecar written next to a single-file backup
pub const FILE_META_SUFFIX: &str = ".meta";

/// Outcome of a successful tree backup
#[derive(Debug, Clone)]
pub struct BackupSummary {
    pub id: BackupId,
    pub path: PathBuf,
    pub created: DateTime<Utc>,
    pub file_count: u64,
    pub total_bytes: u64,
    pub checksum: String,
    /// Baseline creation time, for incrementals that found one
    pub based_on: Option<DateTime<Utc>>,
    pub duration: Duration,
}

impl BackupSummary {
    pub fn kind(&self) -> BackupKind {
        self.id.kind
    }
}

/// Outcome of [`BackupEngine::backup_file`]
#[derive(Debug, Clone)]
pub struct FileBackupSummary {
    pub path: PathBuf,
    pub meta_path: PathBuf,
    pub created: DateTime<Utc>,
    pub bytes: u64,
    pub checksum: String,
}

/// Removes a partially written backup directory unless committed
pub(crate) struct PartialBackupGuard {
    path: PathBuf,
    armed: bool,
}

impl PartialBackupGuard {
    pub(crate) fn new(path: &Path) -> Self {
        Self {
            path: path.to_path_buf(),
            armed: true,
        }
    }

    pub(crate) fn commit(mut self) {
        self.armed = false;
    }
}

impl Drop for PartialBackupGuard {
    fn drop(&mut self) {
        if self.armed {
            match fs::remove_dir_all(&self.path) {
                Ok(()) => {
                    tracing::warn!(path = %self.path.display(), "Removed partial backup")
                }
                Err(e) => tracing::error!(
                    path = %self.path.display(),
                    error = %e,
                    "Failed to remove partial backup"
                ),
            }
        }
    }
}

/// Running totals of a tree copy
#[derive(Default)]
pub(crate) struct CopyTotals {
    pub file_count: u64,
    pub total_bytes: u64,
    pub tree: TreeChecksum,
}

impl CopyTotals {
    pub(crate) fn add(&mut self, relative_path: &Path, copied: CopiedFile) {
        self.file_count += 1;
        self.total_bytes += copied.bytes;
        self.tree.add(relative_path, copied.checksum);
    }
}

/// The backup an incremental is compared against
struct Baseline {
    path: PathBuf,
    created: DateTime<Utc>,
    cutoff: SystemTime,
}

impl Baseline {
    fn locate(backup_dir: &Path, name: &str) -> Result<Option<Self>, BackupError> {
        let latest = naming::find_latest(backup_dir, name)
            .map_err(|e| BackupError::copy(BackupPhase::Locate, backup_dir, e))?;
        let Some(entry) = latest else {
            return Ok(None);
        };

        let created = match BackupManifest::load(&entry.path) {
            Ok(manifest) => manifest.created,
            Err(e) => {
                tracing::warn!(
                    path = %entry.path.display(),
                    error = %e,
                    "Baseline manifest unreadable, using directory modification time"
                );
                DateTime::<Utc>::from(entry.modified)
            }
        };

        // Filesystems with whole-second mtimes round down into the baseline's second
        let cutoff = SystemTime::from(created.with_nanosecond(0).unwrap_or(created));
        Ok(Some(Self {
            path: entry.path,
            created,
            cutoff,
        }))
    }

    /// Whether a source file must go into the incremental
    fn needs_copy(&self, relative_path: &Path, modified: SystemTime) -> bool {
        modified >= self.cutoff || !self.path.join(relative_path).exists()
    }
}

/// Orchestrates backups under one backup root
#[derive(Debug, Clone)]
pub struct BackupEngine {
    backup_dir: PathBuf,
    options: BackupOptions,
}

impl BackupEngine {
    /// Create an engine storing plain backups under `backup_dir`
    pub fn new(backup_dir: impl Into<PathBuf>) -> Self {
        Self {
            backup_dir: backup_dir.into(),
            options: BackupOptions::default(),
        }
    }

    pub fn with_options(mut self, options: BackupOptions) -> Self {
        self.options = options;
        self
    }

    /// Get backup directory path
    pub fn backup_dir(&self) -> &Path {
        &self.backup_dir
    }

    pub fn options(&self) -> &BackupOptions {
        &self.options
    }

    /// Key used to read encrypted backups
    pub fn key(&self) -> Option<&MasterKey> {
        self.options.encrypt.as_ref()
    }

    /// Copy `source_dir` into a new `<name>_<timestamp>` directory
    pub fn full_backup(&self, name: &str, source_dir: &Path) -> Result<BackupSummary, BackupError> {
        self.run_tree_backup(name, source_dir, BackupKind::Full)
    }

    /// Copy the files of `source_dir` changed since the latest backup of `name`
    ///
    /// A file is included if it was modified in or after the second the
    /// baseline was created, or is absent from the baseline. All directories are created regardless.
    /// Without a baseline every file is included.
    pub fn incremental_backup(
        &self,
        name: &str,
        source_dir: &Path,
    ) -> Result<BackupSummary, BackupError> {
        self.run_tree_backup(name, source_dir, BackupKind::Incremental)
    }

    fn run_tree_backup(
        &self,
        name: &str,
        source_dir: &Path,
        kind: BackupKind,
    ) -> Result<BackupSummary, BackupError> {
        self.validate_tree_backup(name, source_dir)?;
        let started_at = Instant::now();
        let created = Utc::now();

        tracing::info!(name = %name, source = %source_dir.display(), kind = %kind, "Starting backup");

        fs::create_dir_all(&self.backup_dir)
            .map_err(|e| BackupError::create_dir(BackupPhase::Prepare, &self.backup_dir, e))?;

        let baseline = match kind {
            BackupKind::Full => None,
            BackupKind::Incremental => Baseline::locate(&self.backup_dir, name)?,
        };
        if kind == BackupKind::Incremental && baseline.is_none() {
            tracing::info!(name = %name, "No previous backup found, copying every file");
        }

        let stamp = created.naive_utc().with_nanosecond(0).unwrap_or(created.naive_utc());
        let (id, dest) = naming::create_unique_dir(&self.backup_dir, name, kind, stamp)?;
        let guard = PartialBackupGuard::new(&dest);

        let totals = self.copy_tree(source_dir, &dest, baseline.as_ref())?;
        let checksum = totals.tree.finish();

        let manifest = BackupManifest {
            name: name.to_string(),
            kind,
            path: dest.clone(),
            created,
            size: totals.total_bytes,
            file_count: totals.file_count,
            checksum: checksum.clone(),
            compressed: self.options.compress,
            encrypted: self.options.is_encrypted(),
            based_on: baseline.as_ref().map(|b| b.created),
        };
        manifest
            .write(&dest)
            .map_err(|e| BackupError::copy(BackupPhase::Manifest, &dest, e))?;

        guard.commit();

        let summary = BackupSummary {
            id,
            path: dest,
            created,
            file_count: totals.file_count,
            total_bytes: totals.total_bytes,
            checksum,
            based_on: manifest.based_on,
            duration: started_at.elapsed(),
        };
        tracing::info!(
            path = %summary.path.display(),
            files = summary.file_count,
            bytes = summary.total_bytes,
            "Backup complete"
        );
        Ok(summary)
    }

    fn validate_tree_backup(&self, name: &str, source_dir: &Path) -> Result<(), BackupError> {
        naming::validate_name(name)?;
        if source_dir.as_os_str().is_empty() {
            return Err(BackupError::InvalidParameters(
                "source directory is empty".to_string(),
            ));
        }
        if self.backup_dir.as_os_str().is_empty() {
            return Err(BackupError::InvalidParameters(
                "backup directory is empty".to_string(),
            ));
        }

        match fs::metadata(source_dir) {
            Ok(metadata) if metadata.is_dir() => {}
            Ok(_) => return Err(BackupError::InvalidPath(source_dir.to_path_buf())),
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                return Err(BackupError::SourceNotFound(source_dir.to_path_buf()))
            }
            Err(e) => return Err(BackupError::copy(BackupPhase::Prepare, source_dir, e)),
        }

        // A backup root inside the source would be copied into itself
        if resolve(&self.backup_dir).starts_with(resolve(source_dir)) {
            return Err(BackupError::InvalidPath(self.backup_dir.clone()));
        }

        // The manifest would overwrite a source file of the same name
        let reserved = source_dir.join(MANIFEST_FILE);
        if fs::symlink_metadata(&reserved).is_ok_and(|m| m.is_file()) {
            return Err(BackupError::InvalidPath(reserved));
        }
        Ok(())
    }

    fn copy_tree(
        &self,
        source_dir: &Path,
        dest: &Path,
        baseline: Option<&Baseline>,
    ) -> Result<CopyTotals, BackupError> {
        let mut totals = CopyTotals::default();

        for entry in DirectoryWalker::new(source_dir) {
            let entry = entry.map_err(|e| BackupError::copy(BackupPhase::Copy, source_dir, e))?;
            let target = dest.join(&entry.relative_path);

            if entry.is_dir {
                fs::create_dir_all(&target)
                    .map_err(|e| BackupError::create_dir(BackupPhase::Copy, &target, e))?;
                continue;
            }

            if let Some(baseline) = baseline {
                if !baseline.needs_copy(&entry.relative_path, entry.modified) {
                    continue;
                }
            }

            let copied = store_file(&entry.path, &target, &self.options)?;
            tracing::debug!(file = %entry.relative_path.display(), bytes = copied.bytes, "Copied");
            totals.add(&entry.relative_path, copied);
        }

        Ok(totals)
    }

    /// Back up one file as `<name>_<basename>_<timestamp>` with a `.meta` sidecar
    pub fn backup_file(
        &self,
        source_file: &Path,
        name: &str,
    ) -> Result<FileBackupSummary, BackupError> {
        naming::validate_name(name)?;
        match fs::metadata(source_file) {
            Ok(metadata) if metadata.is_file() => {}
            Ok(_) => return Err(BackupError::InvalidPath(source_file.to_path_buf())),
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                return Err(BackupError::SourceNotFound(source_file.to_path_buf()))
            }
            Err(e) => return Err(BackupError::copy(BackupPhase::Prepare, source_file, e)),
        }
        let basename = source_file
            .file_name()
            .ok_or_else(|| BackupError::InvalidPath(source_file.to_path_buf()))?
            .to_string_lossy()
            .into_owned();

        fs::create_dir_all(&self.backup_dir)
            .map_err(|e| BackupError::create_dir(BackupPhase::Prepare, &self.backup_dir, e))?;

        let created = Utc::now();
        let stem = format!("{}_{}_{}", name, basename, created.format(TIMESTAMP_FORMAT));
        let dest = unused_file_path(&self.backup_dir, &stem);
        let meta_path = meta_path_for(&dest);

        let copied = store_file(source_file, &dest, &self.options)?;

        let meta = format!(
            "Backup Name: {}\nSource File: {}\nBackup File: {}\nCreated: {}\nSize: {} bytes\nChecksum: {}\nCompressed: {}\nEncrypted: {}\n",
            name,
            source_file.display(),
            dest.display(),
            created.to_rfc3339_opts(chrono::SecondsFormat::Nanos, true),
            copied.bytes,
            copied.checksum,
            if self.options.compress { "Yes" } else { "No" },
            if self.options.is_encrypted() { "Yes" } else { "No" },
        );
        if let Err(e) = write_atomic(&meta_path, meta.as_bytes()) {
            let _ = fs::remove_file(&dest);
            return Err(BackupError::copy(BackupPhase::Manifest, &meta_path, e));
        }

        tracing::info!(path = %dest.display(), bytes = copied.bytes, "File backup complete");
        Ok(FileBackupSummary {
            path: dest,
            meta_path,
            created,
            bytes: copied.bytes,
            checksum: copied.checksum,
        })
    }
}

/// Path of the metadata sidecar for a single-file backup
pub fn meta_path_for(backup_file: &Path) -> PathBuf {
    let mut name = backup_file.as_os_str().to_os_string();
    name.push(FILE_META_SUFFIX);
    PathBuf::from(name)
}

fn unused_file_path(dir: &Path, stem: &str) -> PathBuf {
    let mut candidate = dir.join(stem);
    let mut sequence = 1;
    while candidate.exists() || meta_path_for(&candidate).exists() {
        candidate = dir.join(format!("{}_{}", stem, sequence));
        sequence += 1;
    }
    candidate
}

/// Canonical form of `path`, resolving through its deepest existing ancestor
fn resolve(path: &Path) -> PathBuf {
    let absolute = std::path::absolute(path).unwrap_or_else(|_| path.to_path_buf());
    let mut existing = absolute.as_path();
    let mut missing = Vec::new();

    loop {
        if let Ok(canonical) = existing.canonicalize() {
            return missing
                .iter()
                .rev()
                .fold(canonical, |acc: PathBuf, part| acc.join(part));
        }
        match (existing.parent(), existing.file_name()) {
            (Some(parent), Some(name)) => {
                missing.push(name.to_os_string());
                existing = parent;
            }
            _ => return absolute.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crypto::KEY_SIZE;
    use crate::error::BackupStatus;
    use std::fs::File;
    use tempfile::TempDir;

    fn create_source(temp: &TempDir) -> PathBuf {
        let source = temp.path().join("source");
        fs::create_dir_all(source.join("sub")).unwrap();
        fs::create_dir_all(source.join("empty")).unwrap();
        fs::write(source.join("a.txt"), b"hello").unwrap();
        fs::write(source.join("sub").join("b.txt"), b"world").unwrap();
        source
    }

    fn set_mtime(path: &Path, time: SystemTime) {
        File::options()
            .write(true)
            .open(path)
            .unwrap()
            .set_modified(time)
            .unwrap();
    }

    fn create_test_engine() -> (BackupEngine, TempDir) {
        let temp_dir = TempDir::new().unwrap();
        let engine = BackupEngine::new(temp_dir.path().join("backups"));
        (engine, temp_dir)
    }

    #[test]
    fn test_full_backup() {
        let (engine, temp) = create_test_engine();
        let source = create_source(&temp);

        let summary = engine.full_backup("proj", &source).unwrap();

        assert_eq!(summary.file_count, 2);
        assert_eq!(summary.total_bytes, 10);
        assert_eq!(summary.kind(), BackupKind::Full);
        assert_eq!(fs::read(summary.path.join("a.txt")).unwrap(), b"hello");
        assert_eq!(fs::read(summary.path.join("sub/b.txt")).unwrap(), b"world");
        assert!(summary.path.join("empty").is_dir());

        let dir_name = summary.path.file_name().unwrap().to_string_lossy().to_string();
        assert!(dir_name.starts_with("proj_"));
        assert_eq!(BackupId::parse(&dir_name).unwrap().name, "proj");

        let manifest = BackupManifest::load(&summary.path).unwrap();
        assert_eq!(manifest.file_count, 2);
        assert_eq!(manifest.size, 10);
        assert_eq!(manifest.checksum, summary.checksum);
        assert!(!manifest.encrypted);
    }

    #[test]
    fn test_checksum_independent_of_destination() {
        let (engine, temp) = create_test_engine();
        let source = create_source(&temp);

        let first = engine.full_backup("proj", &source).unwrap();
        let second = engine.full_backup("proj", &source).unwrap();

        assert_ne!(first.path, second.path);
        assert_eq!(first.checksum, second.checksum);
    }

    #[test]
    fn test_invalid_parameters_have_no_side_effects() {
        let (engine, temp) = create_test_engine();
        let source = create_source(&temp);

        for name in ["", "a/b", ".."] {
            let err = engine.full_backup(name, &source).unwrap_err();
            assert_eq!(err.status(), BackupStatus::ErrorInvalidParameters);
        }
        let err = engine.full_backup("proj", Path::new("")).unwrap_err();
        assert_eq!(err.status(), BackupStatus::ErrorInvalidParameters);

        assert!(!engine.backup_dir().exists());
    }

    #[test]
    fn test_missing_source() {
        let (engine, temp) = create_test_engine();

        let err = engine
            .full_backup("proj", &temp.path().join("missing"))
            .unwrap_err();
        assert_eq!(err.status(), BackupStatus::ErrorSourceDirNotFound);
        assert!(!engine.backup_dir().exists());
    }

    #[test]
    fn test_backup_dir_inside_source_is_rejected() {
        let temp = TempDir::new().unwrap();
        let source = create_source(&temp);
        let engine = BackupEngine::new(source.join("backups"));

        let err = engine.full_backup("proj", &source).unwrap_err();
        assert_eq!(err.status(), BackupStatus::ErrorInvalidPath);
    }

    #[cfg(unix)]
    #[test]
    fn test_failed_copy_removes_partial_destination() {
        use std::os::unix::fs::PermissionsExt;

        let (engine, temp) = create_test_engine();
        let source = create_source(&temp);
        let locked = source.join("sub").join("b.txt");
        fs::set_permissions(&locked, fs::Permissions::from_mode(0o000)).unwrap();

        // Running as root ignores file modes
        if File::open(&locked).is_ok() {
            return;
        }

        let err = engine.full_backup("proj", &source).unwrap_err();
        assert_eq!(err.status(), BackupStatus::ErrorPermission);
        assert!(naming::scan(engine.backup_dir()).unwrap().is_empty());
    }

    #[test]
    fn test_incremental_copies_only_changed_and_new_files() {
        let (engine, temp) = create_test_engine();
        let source = create_source(&temp);
        let hour_ago = SystemTime::now() - Duration::from_secs(3600);
        set_mtime(&source.join("a.txt"), hour_ago);
        set_mtime(&source.join("sub").join("b.txt"), hour_ago);

        let baseline = engine.full_backup("proj", &source).unwrap();

        fs::write(source.join("a.txt"), b"hello again").unwrap();
        set_mtime(&source.join("a.txt"), SystemTime::now() + Duration::from_secs(60));
        fs::write(source.join("new.txt"), b"fresh").unwrap();
        set_mtime(&source.join("new.txt"), hour_ago);

        let inc = engine.incremental_backup("proj", &source).unwrap();

        assert_eq!(inc.kind(), BackupKind::Incremental);
        assert_eq!(inc.file_count, 2);
        assert_eq!(inc.based_on, Some(baseline.created));
        assert!(inc.path.join("a.txt").exists());
        assert!(inc.path.join("new.txt").exists());
        assert!(!inc.path.join("sub").join("b.txt").exists());
        assert!(inc.path.join("sub").is_dir());

        let dir_name = inc.path.file_name().unwrap().to_string_lossy().to_string();
        assert!(dir_name.starts_with("proj_inc_"));

        let manifest = fs::read_to_string(inc.path.join(MANIFEST_FILE)).unwrap();
        assert!(manifest.contains("Backup Type: Incremental"));
        assert!(manifest.contains("Based on backup from: "));
    }

    #[test]
    fn test_incremental_includes_file_from_baseline_second() {
        let (engine, temp) = create_test_engine();
        let source = create_source(&temp);
        let hour_ago = SystemTime::now() - Duration::from_secs(3600);
        set_mtime(&source.join("a.txt"), hour_ago);
        set_mtime(&source.join("sub").join("b.txt"), hour_ago);

        let baseline = engine.full_backup("proj", &source).unwrap();

        // Written just after the baseline started, recorded with a whole-second mtime
        let truncated = baseline.created.with_nanosecond(0).unwrap();
        fs::write(source.join("a.txt"), b"same second").unwrap();
        set_mtime(&source.join("a.txt"), SystemTime::from(truncated));

        let inc = engine.incremental_backup("proj", &source).unwrap();
        assert_eq!(inc.file_count, 1);
        assert_eq!(fs::read(inc.path.join("a.txt")).unwrap(), b"same second");
        assert!(!inc.path.join("sub").join("b.txt").exists());
    }

    #[test]
    fn test_source_with_manifest_name_is_rejected() {
        let (engine, temp) = create_test_engine();
        let source = create_source(&temp);
        fs::write(source.join(MANIFEST_FILE), b"user notes").unwrap();

        let err = engine.full_backup("proj", &source).unwrap_err();
        assert_eq!(err.status(), BackupStatus::ErrorInvalidPath);
        assert!(!engine.backup_dir().exists());

        // Only the top level collides with the manifest
        fs::remove_file(source.join(MANIFEST_FILE)).unwrap();
        fs::write(source.join("sub").join(MANIFEST_FILE), b"user notes").unwrap();
        let summary = engine.full_backup("proj", &source).unwrap();
        assert_eq!(summary.file_count, 3);
        assert!(engine.verify_backup(&summary.path).unwrap().is_valid());
    }

    #[test]
    fn test_incremental_without_baseline_copies_everything() {
        let (engine, temp) = create_test_engine();
        let source = create_source(&temp);

        let inc = engine.incremental_backup("proj", &source).unwrap();
        assert_eq!(inc.file_count, 2);
        assert!(inc.based_on.is_none());
    }

    #[test]
    fn test_incremental_chains_on_previous_incremental() {
        let (engine, temp) = create_test_engine();
        let source = create_source(&temp);
        let hour_ago = SystemTime::now() - Duration::from_secs(3600);
        set_mtime(&source.join("a.txt"), hour_ago);
        set_mtime(&source.join("sub").join("b.txt"), hour_ago);

        engine.full_backup("proj", &source).unwrap();
        let first = engine.incremental_backup("proj", &source).unwrap();
        assert_eq!(first.file_count, 0);

        // b.txt is absent from the empty incremental, so it is copied again
        let second = engine.incremental_backup("proj", &source).unwrap();
        assert_eq!(second.based_on, Some(first.created));
        assert_eq!(second.file_count, 2);
    }

    #[test]
    fn test_encrypted_compressed_backup() {
        let temp = TempDir::new().unwrap();
        let source = create_source(&temp);
        let key = MasterKey::from_bytes([4u8; KEY_SIZE]);
        let engine = BackupEngine::new(temp.path().join("backups"))
            .with_options(BackupOptions::plain().compressed(true).encrypted(key));

        let summary = engine.full_backup("proj", &source).unwrap();

        assert_eq!(summary.total_bytes, 10);
        let stored = fs::read(summary.path.join("a.txt")).unwrap();
        assert_ne!(stored, b"hello");
        let manifest = BackupManifest::load(&summary.path).unwrap();
        assert!(manifest.compressed);
        assert!(manifest.encrypted);
    }

    #[test]
    fn test_backup_file() {
        let (engine, temp) = create_test_engine();
        let source = create_source(&temp);

        let first = engine.backup_file(&source.join("a.txt"), "doc").unwrap();
        let second = engine.backup_file(&source.join("a.txt"), "doc").unwrap();

        assert_ne!(first.path, second.path);
        let name = first.path.file_name().unwrap().to_string_lossy().to_string();
        assert!(name.starts_with("doc_a.txt_"));
        assert_eq!(fs::read(&first.path).unwrap(), b"hello");

        let meta = fs::read_to_string(&first.meta_path).unwrap();
        assert!(meta.contains("Size: 5 bytes"));
        assert!(meta.contains(&format!("Checksum: {}", first.checksum)));
    }

    #[test]
    fn test_backup_file_rejects_directory() {
        let (engine, temp) = create_test_engine();
        let source = create_source(&temp);

        let err = engine.backup_file(&source, "doc").unwrap_err();
        assert_eq!(err.status(), BackupStatus::ErrorInvalidPath);
    }
}
