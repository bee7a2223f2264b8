//! `.sha256` sidecar files
//!
//! A sidecar sits next to the file it describes and holds a single hex
//! digest line. It allows plain files to be checked independently of any
//! backup.

use std::ffi::OsString;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use crate::storage::atomic::write_atomic;

use super::checksum::checksum_file;

/// Result of checking a file against its sidecar
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum IntegrityStatus {
    Valid,
    Mismatch { expected: String, actual: String },
    MissingSidecar,
}

impl IntegrityStatus {
    pub fn is_valid(&self) -> bool {
        matches!(self, Self::Valid)
    }
}

/// Path of the sidecar for `path`
pub fn sidecar_path(path: &Path) -> PathBuf {
    let mut name = OsString::from(path.as_os_str());
    name.push(".sha256");
    PathBuf::from(name)
}

/// Hash `path` and write its sidecar, returning the digest
pub fn write_sidecar(path: &Path) -> io::Result<String> {
    let digest = checksum_file(path)?;
    write_atomic(&sidecar_path(path), format!("{}\n", digest).as_bytes())?;
    Ok(digest)
}

/// Digest recorded in the sidecar of `path`, if there is one
pub fn read_sidecar(path: &Path) -> io::Result<Option<String>> {
    match fs::read_to_string(sidecar_path(path)) {
        Ok(contents) => Ok(contents
            .lines()
            .next()
            .map(|line| line.trim().to_lowercase())
            .filter(|line| !line.is_empty())),
        Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(None),
        Err(e) => Err(e),
    }
}

/// Check `path` against its sidecar
pub fn verify_sidecar(path: &Path) -> io::Result<IntegrityStatus> {
    let Some(expected) = read_sidecar(path)? else {
        return Ok(IntegrityStatus::MissingSidecar);
    };

    let actual = checksum_file(path)?;
    if actual == expected {
        Ok(IntegrityStatus::Valid)
    } else {
        Ok(IntegrityStatus::Mismatch { expected, actual })
    }
}

/// Remove the sidecar of `path` if present
pub fn remove_sidecar(path: &Path) -> io::Result<()> {
    match fs::remove_file(sidecar_path(path)) {
        Err(e) if e.kind() != io::ErrorKind::NotFound => Err(e),
        _ => Ok(()),
    }
}
