//! Error types for Strongbox
//!
//! Each layer owns an error enum so that callers branch on outcomes rather
//! than on message text or raw OS error numbers:
//!
//! - `KeyError`: master key bootstrap, load and persist
//! - `StoreError`: atomic plain/encrypted file storage
//! - `ManifestError`: parsing of backup manifests
//! - `BackupError`: backup, restore and retention pipelines, each variant
//!   mapping to exactly one `BackupStatus` code
//!
//! `StrongboxError` wraps all of them for the command-line layer.

use std::fmt;
use std::io;
use std::path::{Path, PathBuf};

use thiserror::Error;

/// Errors raised while creating, loading or persisting the master key
///
/// Messages never contain key material.
#[derive(Error, Debug)]
pub enum KeyError {
    /// The operating system RNG could not produce bytes
    #[error("Secure random number generator unavailable: {0}")]
    RngUnavailable(String),

    /// No key file exists at the given path
    #[error("Master key not found: {}", .0.display())]
    KeyNotFound(PathBuf),

    /// The key file exists but has the wrong length
    #[error(
        "Master key at {} is corrupted: expected {expected} bytes, found {actual}",
        path.display()
    )]
    KeyCorrupted {
        path: PathBuf,
        expected: usize,
        actual: usize,
    },

    /// Reading or writing the key file failed
    #[error("I/O error on key file {}: {message}", path.display())]
    Io { path: PathBuf, message: String },
}

/// Errors returned by the file store
#[derive(Error, Debug)]
pub enum StoreError {
    #[error("File not found: {}", .0.display())]
    NotFound(PathBuf),

    #[error("Permission denied: {}", .0.display())]
    PermissionDenied(PathBuf),

    #[error("Disk full while writing {}", .0.display())]
    DiskFull(PathBuf),

    #[error("File corrupted: {}: {reason}", path.display())]
    Corrupted { path: PathBuf, reason: String },

    #[error("Encryption failed: {0}")]
    EncryptionFailed(String),

    /// Wrong key, truncated blob or failed authentication tag
    #[error("Decryption failed: {0}")]
    DecryptionFailed(String),

    #[error("Invalid format: {0}")]
    InvalidFormat(String),

    /// Residual I/O failures, including an interrupted in-place replace
    /// where the content survives only under a temporary name
    #[error("I/O error on {}: {message}", path.display())]
    Io { path: PathBuf, message: String },
}

impl StoreError {
    /// Classify an I/O error raised while operating on `path`
    pub fn from_io(path: &Path, err: io::Error) -> Self {
        match err.kind() {
            io::ErrorKind::NotFound => Self::NotFound(path.to_path_buf()),
            io::ErrorKind::PermissionDenied => Self::PermissionDenied(path.to_path_buf()),
            io::ErrorKind::StorageFull => Self::DiskFull(path.to_path_buf()),
            _ => Self::Io {
                path: path.to_path_buf(),
                message: err.to_string(),
            },
        }
    }

    /// Check if this is a "not found" error
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound(_))
    }
}

/// Errors reading a `backup_info.txt` manifest
#[derive(Error, Debug)]
pub enum ManifestError {
    #[error("Failed to read manifest {}: {message}", path.display())]
    Io { path: PathBuf, message: String },

    #[error("Manifest is missing '{0}'")]
    MissingField(&'static str),

    #[error("Manifest field '{key}' has invalid value '{value}'")]
    InvalidValue { key: &'static str, value: String },
}

/// Pipeline phase in which a backup operation failed
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BackupPhase {
    Prepare,
    Locate,
    Copy,
    Manifest,
    Restore,
    Verify,
    Cleanup,
}

impl fmt::Display for BackupPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Prepare => "prepare",
            Self::Locate => "locate",
            Self::Copy => "copy",
            Self::Manifest => "manifest",
            Self::Restore => "restore",
            Self::Verify => "verify",
            Self::Cleanup => "cleanup",
        };
        f.write_str(name)
    }
}

/// Closed set of outcomes reported to backup callers
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BackupStatus {
    Success,
    ErrorCreateDir,
    ErrorCopyFile,
    ErrorCompress,
    ErrorEncrypt,
    ErrorDiskFull,
    ErrorPermission,
    ErrorInvalidPath,
    ErrorInvalidParameters,
    ErrorSourceDirNotFound,
}

impl BackupStatus {
    /// Numeric code, zero for success and negative for failures
    pub fn code(self) -> i32 {
        match self {
            Self::Success => 0,
            Self::ErrorCreateDir => -1,
            Self::ErrorCopyFile => -2,
            Self::ErrorCompress => -3,
            Self::ErrorEncrypt => -4,
            Self::ErrorDiskFull => -5,
            Self::ErrorPermission => -6,
            Self::ErrorInvalidPath => -7,
            Self::ErrorInvalidParameters => -8,
            Self::ErrorSourceDirNotFound => -9,
        }
    }

    /// Process exit code for this status
    pub fn exit_code(self) -> i32 {
        -self.code()
    }
}

impl fmt::Display for BackupStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let text = match self {
            Self::Success => "Success",
            Self::ErrorCreateDir => "Failed to create directory",
            Self::ErrorCopyFile => "Failed to copy file",
            Self::ErrorCompress => "Compression failed",
            Self::ErrorEncrypt => "Encryption failed",
            Self::ErrorDiskFull => "Disk full",
            Self::ErrorPermission => "Permission denied",
            Self::ErrorInvalidPath => "Invalid path",
            Self::ErrorInvalidParameters => "Invalid parameters",
            Self::ErrorSourceDirNotFound => "Source not found",
        };
        f.write_str(text)
    }
}

/// Errors from the backup engine
///
/// Filesystem variants carry the phase and path that failed.
#[derive(Error, Debug)]
pub enum BackupError {
    #[error("Invalid parameters: {0}")]
    InvalidParameters(String),

    #[error("Source not found: {}", .0.display())]
    SourceNotFound(PathBuf),

    #[error("Backup '{name}' not found in {}", dir.display())]
    BackupNotFound { name: String, dir: PathBuf },

    #[error("Invalid path: {}", .0.display())]
    InvalidPath(PathBuf),

    #[error("{phase}: failed to create directory {}: {message}", path.display())]
    CreateDir {
        phase: BackupPhase,
        path: PathBuf,
        message: String,
    },

    #[error("{phase}: failed to copy {}: {message}", path.display())]
    CopyFile {
        phase: BackupPhase,
        path: PathBuf,
        message: String,
    },

    #[error("{phase}: disk full while writing {}", path.display())]
    DiskFull { phase: BackupPhase, path: PathBuf },

    #[error("{phase}: permission denied on {}", path.display())]
    Permission { phase: BackupPhase, path: PathBuf },

    #[error("Compression failed for {}: {message}", path.display())]
    Compress { path: PathBuf, message: String },

    #[error("Encryption error for {}: {message}", path.display())]
    Encrypt { path: PathBuf, message: String },
}

impl BackupError {
    /// Map an error raised while creating a directory
    pub fn create_dir(phase: BackupPhase, path: &Path, err: io::Error) -> Self {
        match err.kind() {
            io::ErrorKind::PermissionDenied => Self::Permission {
                phase,
                path: path.to_path_buf(),
            },
            io::ErrorKind::StorageFull => Self::DiskFull {
                phase,
                path: path.to_path_buf(),
            },
            _ => Self::CreateDir {
                phase,
                path: path.to_path_buf(),
                message: err.to_string(),
            },
        }
    }

    /// Map an error raised while reading, writing or removing a file
    pub fn copy(phase: BackupPhase, path: &Path, err: io::Error) -> Self {
        match err.kind() {
            io::ErrorKind::PermissionDenied => Self::Permission {
                phase,
                path: path.to_path_buf(),
            },
            io::ErrorKind::StorageFull => Self::DiskFull {
                phase,
                path: path.to_path_buf(),
            },
            _ => Self::CopyFile {
                phase,
                path: path.to_path_buf(),
                message: err.to_string(),
            },
        }
    }

    /// Map a file store error one-to-one
    pub fn from_store(phase: BackupPhase, path: &Path, err: StoreError) -> Self {
        match err {
            StoreError::PermissionDenied(p) => Self::Permission { phase, path: p },
            StoreError::DiskFull(p) => Self::DiskFull { phase, path: p },
            StoreError::EncryptionFailed(m)
            | StoreError::DecryptionFailed(m)
            | StoreError::InvalidFormat(m) => Self::Encrypt {
                path: path.to_path_buf(),
                message: m,
            },
            StoreError::NotFound(p) => Self::CopyFile {
                phase,
                path: p,
                message: "file disappeared".to_string(),
            },
            StoreError::Corrupted { path, reason } => Self::CopyFile {
                phase,
                path,
                message: reason,
            },
            StoreError::Io { path, message } => Self::CopyFile {
                phase,
                path,
                message,
            },
        }
    }

    /// The closed-set status code for this error
    pub fn status(&self) -> BackupStatus {
        match self {
            Self::InvalidParameters(_) => BackupStatus::ErrorInvalidParameters,
            Self::SourceNotFound(_) | Self::BackupNotFound { .. } => {
                BackupStatus::ErrorSourceDirNotFound
            }
            Self::InvalidPath(_) => BackupStatus::ErrorInvalidPath,
            Self::CreateDir { .. } => BackupStatus::ErrorCreateDir,
            Self::CopyFile { .. } => BackupStatus::ErrorCopyFile,
            Self::DiskFull { .. } => BackupStatus::ErrorDiskFull,
            Self::Permission { .. } => BackupStatus::ErrorPermission,
            Self::Compress { .. } => BackupStatus::ErrorCompress,
            Self::Encrypt { .. } => BackupStatus::ErrorEncrypt,
        }
    }
}

/// The main error type for Strongbox operations
#[derive(Error, Debug)]
pub enum StrongboxError {
    /// Configuration-related errors
    #[error("Configuration error: {0}")]
    Config(String),

    /// File I/O errors outside the store and backup layers
    #[error("I/O error: {0}")]
    Io(String),

    /// JSON serialization/deserialization errors
    #[error("JSON error: {0}")]
    Json(String),

    /// Content does not match its recorded checksum
    #[error("Integrity check failed: {0}")]
    Integrity(String),

    #[error(transparent)]
    Key(#[from] KeyError),

    #[error(transparent)]
    Store(#[from] StoreError),

    #[error(transparent)]
    Backup(#[from] BackupError),
}

impl StrongboxError {
    /// Backup status if this error came from a backup pipeline
    pub fn backup_status(&self) -> Option<BackupStatus> {
        match self {
            Self::Backup(e) => Some(e.status()),
            _ => None,
        }
    }
}

impl From<io::Error> for StrongboxError {
    fn from(err: io::Error) -> Self {
        Self::Io(err.to_string())
    }
}

impl From<serde_json::Error> for StrongboxError {
    fn from(err: serde_json::Error) -> Self {
        Self::Json(err.to_string())
    }
}

/// Result type alias for Strongbox operations
pub type StrongboxResult<T> = Result<T, StrongboxError>;
