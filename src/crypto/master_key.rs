//! Master key bootstrap and persistence
//!
//! The master key is 32 random bytes stored raw (unversioned) at a fixed
//! path. It is generated once on first run and loaded for every crypto
//! operation afterward. Rotation is not supported.

use std::fmt;
use std::fs;
use std::io::{self, Write};
use std::path::{Path, PathBuf};

use aes_gcm::aead::rand_core::RngCore;
use aes_gcm::aead::OsRng;
use zeroize::{Zeroize, ZeroizeOnDrop, Zeroizing};

use crate::error::KeyError;
use crate::storage::atomic::AtomicFile;

/// Size of the master key in bytes (AES-256)
pub const KEY_SIZE: usize = 32;

/// The single symmetric key protecting all encrypted files
///
/// Zeroed on drop. `Debug` never prints the key bytes.
#[derive(Clone, Zeroize, ZeroizeOnDrop)]
pub struct MasterKey {
    bytes: [u8; KEY_SIZE],
}

impl MasterKey {
    /// Wrap existing key bytes
    pub fn from_bytes(bytes: [u8; KEY_SIZE]) -> Self {
        Self { bytes }
    }

    /// Get the key bytes
    pub fn as_bytes(&self) -> &[u8; KEY_SIZE] {
        &self.bytes
    }
}

impl fmt::Debug for MasterKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("MasterKey([REDACTED])")
    }
}

/// Loads, creates and stores the master key file
#[derive(Debug, Clone)]
pub struct KeyManager {
    path: PathBuf,
}

impl KeyManager {
    /// Create a manager for the key file at `path`
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// Path of the key file
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Whether a key file is present
    pub fn exists(&self) -> bool {
        self.path.is_file()
    }

    /// Generate a fresh key from the operating system RNG
    pub fn generate() -> Result<MasterKey, KeyError> {
        let mut bytes = Zeroizing::new([0u8; KEY_SIZE]);
        OsRng
            .try_fill_bytes(&mut bytes[..])
            .map_err(|e| KeyError::RngUnavailable(e.to_string()))?;

        if bytes.iter().all(|b| *b == 0) {
            return Err(KeyError::RngUnavailable(
                "random source returned only zero bytes".to_string(),
            ));
        }

        Ok(MasterKey::from_bytes(*bytes))
    }

    /// Read the key from disk
    pub fn load(&self) -> Result<MasterKey, KeyError> {
        let data = Zeroizing::new(fs::read(&self.path).map_err(|e| match e.kind() {
            io::ErrorKind::NotFound => KeyError::KeyNotFound(self.path.clone()),
            _ => KeyError::Io {
                path: self.path.clone(),
                message: e.to_string(),
            },
        })?);

        if data.len() != KEY_SIZE {
            return Err(KeyError::KeyCorrupted {
                path: self.path.clone(),
                expected: KEY_SIZE,
                actual: data.len(),
            });
        }

        let mut bytes = Zeroizing::new([0u8; KEY_SIZE]);
        bytes.copy_from_slice(&data);
        Ok(MasterKey::from_bytes(*bytes))
    }

    /// Write the key to disk, readable by the owner only
    pub fn persist(&self, key: &MasterKey) -> Result<(), KeyError> {
        let io_err = |e: io::Error| KeyError::Io {
            path: self.path.clone(),
            message: e.to_string(),
        };

        let mut file = AtomicFile::create_private(&self.path).map_err(io_err)?;
        file.write_all(key.as_bytes()).map_err(io_err)?;
        file.commit().map_err(io_err)?;

        restrict_permissions(&self.path).map_err(io_err)?;
        Ok(())
    }

    /// Load the key, generating and persisting one on first run
    ///
    /// A key file that exists but cannot be read is reported, never
    /// replaced.
    pub fn ensure(&self) -> Result<MasterKey, KeyError> {
        match self.load() {
            Ok(key) => Ok(key),
            Err(KeyError::KeyNotFound(_)) => {
                let key = Self::generate()?;
                self.persist(&key)?;
                tracing::info!(path = %self.path.display(), "generated new master key");
                Ok(key)
            }
            Err(e) => Err(e),
        }
    }
}

#[cfg(unix)]
fn restrict_permissions(path: &Path) -> io::Result<()> {
    use std::os::unix::fs::PermissionsExt;
    fs::set_permissions(path, fs::Permissions::from_mode(0o600))
}

#[cfg(not(unix))]
fn restrict_permissions(_path: &Path) -> io::Result<()> {
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_generate_key() {
        let key1 = KeyManager::generate().unwrap();
        let key2 = KeyManager::generate().unwrap();
        assert_eq!(key1.as_bytes().len(), KEY_SIZE);
        assert_ne!(key1.as_bytes(), key2.as_bytes());
    }

    #[test]
    fn test_persist_and_load() {
        let temp_dir = TempDir::new().unwrap();
        let manager = KeyManager::new(temp_dir.path().join("keys").join("master.key"));

        let key = KeyManager::generate().unwrap();
        manager.persist(&key).unwrap();

        let loaded = manager.load().unwrap();
        assert_eq!(loaded.as_bytes(), key.as_bytes());
        assert_eq!(fs::read(manager.path()).unwrap().len(), KEY_SIZE);
    }

    #[test]
    fn test_load_missing_key() {
        let temp_dir = TempDir::new().unwrap();
        let manager = KeyManager::new(temp_dir.path().join("master.key"));

        assert!(matches!(manager.load(), Err(KeyError::KeyNotFound(_))));
    }

    #[test]
    fn test_load_wrong_length() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("master.key");
        fs::write(&path, [1u8; 7]).unwrap();

        let result = KeyManager::new(&path).load();
        assert!(matches!(
            result,
            Err(KeyError::KeyCorrupted {
                expected: 32,
                actual: 7,
                ..
            })
        ));
    }

    #[test]
    fn test_ensure_is_idempotent() {
        let temp_dir = TempDir::new().unwrap();
        let manager = KeyManager::new(temp_dir.path().join("master.key"));

        let first = manager.ensure().unwrap();
        let second = manager.ensure().unwrap();
        assert_eq!(first.as_bytes(), second.as_bytes());
    }

    #[test]
    fn test_ensure_does_not_replace_corrupted_key() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("master.key");
        fs::write(&path, b"short").unwrap();

        let result = KeyManager::new(&path).ensure();
        assert!(matches!(result, Err(KeyError::KeyCorrupted { .. })));
        assert_eq!(fs::read(&path).unwrap(), b"short");
    }

    #[test]
    fn test_debug_is_redacted() {
        let key = MasterKey::from_bytes([0xAB; KEY_SIZE]);
        let debug = format!("{:?}", key);
        assert_eq!(debug, "MasterKey([REDACTED])");
        assert!(!debug.to_lowercase().contains("ab"));
    }

    #[cfg(unix)]
    #[test]
    fn test_key_file_is_private() {
        use std::os::unix::fs::PermissionsExt;

        let temp_dir = TempDir::new().unwrap();
        let manager = KeyManager::new(temp_dir.path().join("master.key"));
        manager.ensure().unwrap();

        let mode = fs::metadata(manager.path()).unwrap().permissions().mode();
        assert_eq!(mode & 0o777, 0o600);
    }
}
