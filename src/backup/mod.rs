//! Backup system for Strongbox
//!
//! Creates full and incremental directory backups and single-file backups,
//! restores them with checksum verification, and applies retention.
//!
//! # Layout
//!
//! Every backup is a directory under the backup root named
//! `<name>_YYYYMMDD_HHMMSS` (full) or `<name>_inc_YYYYMMDD_HHMMSS`
//! (incremental), with an optional `_N` suffix when two backups of the
//! same name land in the same second. The names are the catalog: there is
//! no separate index. Each directory mirrors the source tree and carries a
//! `backup_info.txt` manifest at its root.
//!
//! Files may be zstd-compressed and then AES-256-GCM encrypted before
//! being written. Sizes and checksums always describe the plaintext.
//!
//! # Example
//!
//! ```rust,ignore
//! use strongbox::backup::BackupEngine;
//!
//! let engine = BackupEngine::new(paths.backup_dir());
//! let summary = engine.full_backup("documents", &source_dir)?;
//! engine.incremental_backup("documents", &source_dir)?;
//!
//! let result = engine.restore("documents", &restore_dir)?;
//! println!("{}", result.summary());
//! ```

mod copy;
mod manager;
pub mod manifest;
pub mod naming;
mod restore;
pub mod retention;
mod schedule;

pub use copy::{BackupOptions, COMPRESSION_LEVEL};
pub use manager::{meta_path_for, BackupEngine, BackupSummary, FileBackupSummary, FILE_META_SUFFIX};
pub use manifest::{BackupManifest, MANIFEST_FILE};
pub use naming::{BackupId, BackupKind, CatalogEntry};
pub use restore::{RestoreResult, ValidationResult};
pub use retention::{BackupInfo, CleanupReport, RetentionPolicy};
pub use schedule::{AutoBackup, AutoBackupConfig, BackupSchedule};
