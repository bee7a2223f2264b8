//! Atomic plain and encrypted file storage
//!
//! Every write goes through [`AtomicFile`], so a destination is either its
//! old content or its new content. Encrypted content is produced fully in
//! memory before anything touches the disk.

use std::ffi::OsString;
use std::fs;
use std::io::{self, Read, Write};
use std::path::{Path, PathBuf};

use crate::crypto::{self, encryption::BLOB_MAGIC, MasterKey};
use crate::error::StoreError;

use super::atomic::{AtomicFile, TEMP_EXTENSION};

/// Suffix of the temporary file used by [`encrypt_existing_file`]
pub const ENCRYPT_TEMP_SUFFIX: &str = ".enc_tmp";

/// Suffix of the temporary file used by [`decrypt_existing_file`]
pub const DECRYPT_TEMP_SUFFIX: &str = ".dec_tmp";

fn write_bytes(path: &Path, content: &[u8]) -> Result<(), StoreError> {
    let mut file = AtomicFile::create(path).map_err(|e| StoreError::from_io(path, e))?;
    file.write_all(content)
        .map_err(|e| StoreError::from_io(path, e))?;
    file.commit().map_err(|e| StoreError::from_io(path, e))
}

/// Encrypt `content` and atomically replace `path` with the blob
pub fn write_encrypted(path: &Path, content: &[u8], key: &MasterKey) -> Result<(), StoreError> {
    let blob = crypto::encrypt(content, key)?;
    write_bytes(path, &blob)?;
    tracing::debug!(path = %path.display(), bytes = content.len(), "Wrote encrypted file");
    Ok(())
}

/// Read and decrypt a file written by [`write_encrypted`]
pub fn read_encrypted(path: &Path, key: &MasterKey) -> Result<Vec<u8>, StoreError> {
    let blob = fs::read(path).map_err(|e| StoreError::from_io(path, e))?;
    crypto::decrypt(&blob, key)
}

/// Atomically replace `path` with `content`
pub fn write_plain(path: &Path, content: &[u8]) -> Result<(), StoreError> {
    write_bytes(path, content)?;
    tracing::debug!(path = %path.display(), bytes = content.len(), "Wrote file");
    Ok(())
}

pub fn read_plain(path: &Path) -> Result<Vec<u8>, StoreError> {
    fs::read(path).map_err(|e| StoreError::from_io(path, e))
}

/// Check whether the file at `path` starts with the encrypted blob header
pub fn is_encrypted_file(path: &Path) -> Result<bool, StoreError> {
    let mut file = fs::File::open(path).map_err(|e| StoreError::from_io(path, e))?;
    let mut header = [0u8; 4];
    let mut filled = 0;
    while filled < header.len() {
        match file.read(&mut header[filled..]) {
            Ok(0) => return Ok(false),
            Ok(n) => filled += n,
            Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
            Err(e) => return Err(StoreError::from_io(path, e)),
        }
    }
    Ok(&header == BLOB_MAGIC)
}

fn with_suffix(path: &Path, suffix: &str) -> PathBuf {
    let mut name = OsString::from(path.as_os_str());
    name.push(suffix);
    PathBuf::from(name)
}

/// Encrypt an existing plain file in place
pub fn encrypt_existing_file(path: &Path, key: &MasterKey) -> Result<(), StoreError> {
    let content = read_plain(path)?;
    if crypto::is_encrypted(&content) {
        return Err(StoreError::InvalidFormat(format!(
            "{} is already encrypted",
            path.display()
        )));
    }

    let blob = crypto::encrypt(&content, key)?;
    replace_via_temp(path, &blob, ENCRYPT_TEMP_SUFFIX)?;
    tracing::info!(path = %path.display(), "Encrypted file in place");
    Ok(())
}

/// Decrypt an existing encrypted file in place
pub fn decrypt_existing_file(path: &Path, key: &MasterKey) -> Result<(), StoreError> {
    let blob = read_plain(path)?;
    if !crypto::is_encrypted(&blob) {
        return Err(StoreError::InvalidFormat(format!(
            "{} is not encrypted",
            path.display()
        )));
    }

    let content = crypto::decrypt(&blob, key)?;
    replace_via_temp(path, &content, DECRYPT_TEMP_SUFFIX)?;
    tracing::info!(path = %path.display(), "Decrypted file in place");
    Ok(())
}

/// Write `content` to `<path><suffix>`, remove `path`, then rename the temp
///
/// The temp is only removed by the final rename. If that rename fails the
/// content survives under the temp name and the error names it.
fn replace_via_temp(path: &Path, content: &[u8], suffix: &str) -> Result<(), StoreError> {
    let temp = with_suffix(path, suffix);
    write_bytes(&temp, content)?;

    if let Err(e) = fs::remove_file(path) {
        let _ = fs::remove_file(&temp);
        return Err(StoreError::from_io(path, e));
    }

    fs::rename(&temp, path).map_err(|e| StoreError::Io {
        path: temp.clone(),
        message: format!(
            "original removed but rename failed, content preserved at {}: {}",
            temp.display(),
            e
        ),
    })
}

/// Outcome of [`recover_interrupted`]
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct RecoveryReport {
    /// Files restored from an in-place temp whose original was missing
    pub recovered: Vec<PathBuf>,

    /// Stale temporary files that were deleted
    pub removed: Vec<PathBuf>,
}

impl RecoveryReport {
    pub fn is_empty(&self) -> bool {
        self.recovered.is_empty() && self.removed.is_empty()
    }
}

/// Repair leftovers of interrupted writes in `dir` (not recursive)
///
/// Must not run while another writer is active in the same directory.
pub fn recover_interrupted(dir: &Path) -> Result<RecoveryReport, StoreError> {
    let mut report = RecoveryReport::default();

    let mut names: Vec<String> = fs::read_dir(dir)
        .map_err(|e| StoreError::from_io(dir, e))?
        .filter_map(|entry| entry.ok())
        .filter(|entry| entry.file_type().map(|t| t.is_file()).unwrap_or(false))
        .filter_map(|entry| entry.file_name().into_string().ok())
        .collect();
    names.sort();

    for name in names {
        let temp = dir.join(&name);

        let original = [ENCRYPT_TEMP_SUFFIX, DECRYPT_TEMP_SUFFIX]
            .iter()
            .find_map(|suffix| name.strip_suffix(suffix))
            .filter(|stem| !stem.is_empty())
            .map(|stem| dir.join(stem));

        if let Some(original) = original {
            if original.exists() {
                fs::remove_file(&temp).map_err(|e| StoreError::from_io(&temp, e))?;
                tracing::warn!(path = %temp.display(), "Removed stale temporary file");
                report.removed.push(temp);
            } else {
                fs::rename(&temp, &original).map_err(|e| StoreError::from_io(&temp, e))?;
                tracing::warn!(path = %original.display(), "Recovered file from interrupted replace");
                report.recovered.push(original);
            }
        } else if name.starts_with('.') && name.ends_with(&format!(".{}", TEMP_EXTENSION)) {
            fs::remove_file(&temp).map_err(|e| StoreError::from_io(&temp, e))?;
            tracing::warn!(path = %temp.display(), "Removed orphaned write");
            report.removed.push(temp);
        }
    }

    Ok(report)
}

/// File store with an explicitly chosen mode
///
/// There is no fallback between modes: a plain store never decrypts and an
/// encrypted store never returns raw bytes.
#[derive(Clone)]
pub struct FileStore {
    key: Option<MasterKey>,
}

impl FileStore {
    pub fn plain() -> Self {
        Self { key: None }
    }

    pub fn encrypted(key: MasterKey) -> Self {
        Self { key: Some(key) }
    }

    pub fn is_encrypted(&self) -> bool {
        self.key.is_some()
    }

    /// Atomically store `content` at `path`
    pub fn save(&self, path: &Path, content: &[u8]) -> Result<(), StoreError> {
        match &self.key {
            Some(key) => write_encrypted(path, content, key),
            None => write_plain(path, content),
        }
    }

    /// Load the content stored at `path`
    pub fn load(&self, path: &Path) -> Result<Vec<u8>, StoreError> {
        match &self.key {
            Some(key) => read_encrypted(path, key),
            None => read_plain(path),
        }
    }
}

impl std::fmt::Debug for FileStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FileStore")
            .field("encrypted", &self.is_encrypted())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn test_key(byte: u8) -> MasterKey {
        MasterKey::from_bytes([byte; crypto::KEY_SIZE])
    }

    #[test]
    fn test_encrypted_roundtrip() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("students.dat");
        let key = test_key(7);

        write_encrypted(&path, b"Alice,A\nBob,B", &key).unwrap();

        let raw = fs::read(&path).unwrap();
        assert!(!raw.windows(5).any(|w| w == b"Alice"));
        assert!(is_encrypted_file(&path).unwrap());

        assert_eq!(read_encrypted(&path, &key).unwrap(), b"Alice,A\nBob,B");
    }

    #[test]
    fn test_empty_content() {
        let temp_dir = TempDir::new().unwrap();
        let key = test_key(7);

        let enc = temp_dir.path().join("empty.enc");
        write_encrypted(&enc, b"", &key).unwrap();
        assert!(read_encrypted(&enc, &key).unwrap().is_empty());

        let plain = temp_dir.path().join("empty.txt");
        write_plain(&plain, b"").unwrap();
        assert!(read_plain(&plain).unwrap().is_empty());
    }

    #[test]
    fn test_wrong_key_fails() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("students.dat");

        write_encrypted(&path, b"secret", &test_key(1)).unwrap();

        let err = read_encrypted(&path, &test_key(2)).unwrap_err();
        assert!(matches!(err, StoreError::DecryptionFailed(_)));
    }

    #[test]
    fn test_truncated_file_fails() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("students.dat");
        let key = test_key(1);

        write_encrypted(&path, b"some records", &key).unwrap();
        let raw = fs::read(&path).unwrap();
        fs::write(&path, &raw[..raw.len() - 3]).unwrap();

        let err = read_encrypted(&path, &key).unwrap_err();
        assert!(matches!(err, StoreError::DecryptionFailed(_)));
    }

    #[test]
    fn test_plain_file_read_as_encrypted_is_invalid_format() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("plain.txt");
        fs::write(&path, b"this is plain text, long enough to look like a blob").unwrap();

        let err = read_encrypted(&path, &test_key(1)).unwrap_err();
        assert!(matches!(err, StoreError::InvalidFormat(_)));
    }

    #[test]
    fn test_missing_file_is_not_found() {
        let temp_dir = TempDir::new().unwrap();
        let err = read_plain(&temp_dir.path().join("missing")).unwrap_err();
        assert!(err.is_not_found());
    }

    #[test]
    fn test_failed_write_leaves_destination_unchanged() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("students.dat");
        let key = test_key(1);
        write_encrypted(&path, b"old", &key).unwrap();
        let before = fs::read(&path).unwrap();

        // Parent of the destination is a file, so the temp cannot be created
        let blocked = path.join("child");
        assert!(write_encrypted(&blocked, b"new", &key).is_err());

        assert_eq!(fs::read(&path).unwrap(), before);
    }

    #[cfg(unix)]
    #[test]
    fn test_failed_encrypted_overwrite_keeps_existing_file() {
        let temp_dir = TempDir::new().unwrap();
        // Fits the file name limit, but its temp sibling does not
        let path = temp_dir.path().join("r".repeat(250));
        let key = test_key(1);
        write_encrypted(&path, b"old records", &key).unwrap();
        let before = fs::read(&path).unwrap();

        assert!(write_encrypted(&path, b"new records", &key).is_err());

        assert_eq!(fs::read(&path).unwrap(), before);
        assert_eq!(read_encrypted(&path, &key).unwrap(), b"old records");
        assert_eq!(fs::read_dir(temp_dir.path()).unwrap().count(), 1);
    }

    #[test]
    fn test_encrypt_and_decrypt_existing_file() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("grades.dat");
        let key = test_key(3);
        fs::write(&path, b"Math: 95").unwrap();

        encrypt_existing_file(&path, &key).unwrap();
        assert!(is_encrypted_file(&path).unwrap());
        assert!(!with_suffix(&path, ENCRYPT_TEMP_SUFFIX).exists());

        decrypt_existing_file(&path, &key).unwrap();
        assert_eq!(fs::read(&path).unwrap(), b"Math: 95");
        assert!(!with_suffix(&path, DECRYPT_TEMP_SUFFIX).exists());
    }

    #[test]
    fn test_double_encrypt_is_rejected() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("grades.dat");
        let key = test_key(3);
        fs::write(&path, b"Math: 95").unwrap();

        encrypt_existing_file(&path, &key).unwrap();
        let err = encrypt_existing_file(&path, &key).unwrap_err();
        assert!(matches!(err, StoreError::InvalidFormat(_)));
    }

    #[test]
    fn test_decrypt_existing_with_wrong_key_keeps_file() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("grades.dat");
        fs::write(&path, b"Math: 95").unwrap();
        encrypt_existing_file(&path, &test_key(3)).unwrap();
        let before = fs::read(&path).unwrap();

        assert!(decrypt_existing_file(&path, &test_key(4)).is_err());
        assert_eq!(fs::read(&path).unwrap(), before);
    }

    #[test]
    fn test_recover_interrupted() {
        let temp_dir = TempDir::new().unwrap();
        let dir = temp_dir.path();

        // Original removed, rename never happened
        fs::write(dir.join("a.dat.enc_tmp"), b"recover me").unwrap();
        // Original still present, temp is stale
        fs::write(dir.join("b.dat"), b"keep").unwrap();
        fs::write(dir.join("b.dat.dec_tmp"), b"stale").unwrap();
        // Orphaned atomic write
        fs::write(dir.join(".c.dat.42-0.sbx-tmp"), b"partial").unwrap();
        fs::write(dir.join("d.dat"), b"untouched").unwrap();

        let report = recover_interrupted(dir).unwrap();

        assert_eq!(report.recovered, vec![dir.join("a.dat")]);
        assert_eq!(report.removed.len(), 2);
        assert_eq!(fs::read(dir.join("a.dat")).unwrap(), b"recover me");
        assert_eq!(fs::read(dir.join("b.dat")).unwrap(), b"keep");
        assert!(!dir.join("b.dat.dec_tmp").exists());
        assert!(!dir.join(".c.dat.42-0.sbx-tmp").exists());
        assert_eq!(fs::read(dir.join("d.dat")).unwrap(), b"untouched");

        assert!(recover_interrupted(dir).unwrap().is_empty());
    }

    #[test]
    fn test_file_store_modes() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("clubs.dat");

        let store = FileStore::encrypted(test_key(9));
        store.save(&path, b"Chess Club").unwrap();
        assert!(is_encrypted_file(&path).unwrap());
        assert_eq!(store.load(&path).unwrap(), b"Chess Club");

        let plain = FileStore::plain();
        assert!(!plain.is_encrypted());
        assert_ne!(plain.load(&path).unwrap(), b"Chess Club");
    }
}
