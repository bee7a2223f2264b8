//! Per-file copy into and out of a backup
//!
//! Each file is written with the atomic-write discipline. Stored content may
//! be zstd-compressed and/or encrypted; the returned size and digest always
//! describe the original plaintext.

use std::fs::{self, File};
use std::io::{self, Read, Write};
use std::path::Path;

use crate::crypto::{self, MasterKey};
use crate::error::{BackupError, BackupPhase};
use crate::integrity::{checksum, checksum_reader, ContentHasher};
use crate::integrity::checksum::CHUNK_SIZE;
use crate::storage::atomic::{write_atomic, AtomicFile};

/// zstd level used for stored files
pub const COMPRESSION_LEVEL: i32 = 3;

/// First bytes of every zstd frame
const ZSTD_MAGIC: [u8; 4] = [0x28, 0xB5, 0x2F, 0xFD];

/// How file content is stored inside a backup
#[derive(Clone, Default)]
pub struct BackupOptions {
    /// Encrypt every stored file under this key
    pub encrypt: Option<MasterKey>,
    /// zstd-compress every stored file
    pub compress: bool,
}

impl BackupOptions {
    pub fn plain() -> Self {
        Self::default()
    }

    pub fn compressed(mut self, compress: bool) -> Self {
        self.compress = compress;
        self
    }

    pub fn encrypted(mut self, key: MasterKey) -> Self {
        self.encrypt = Some(key);
        self
    }

    pub fn is_encrypted(&self) -> bool {
        self.encrypt.is_some()
    }

    fn transforms(&self) -> bool {
        self.compress || self.encrypt.is_some()
    }
}

impl std::fmt::Debug for BackupOptions {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BackupOptions")
            .field("encrypt", &self.is_encrypted())
            .field("compress", &self.compress)
            .finish()
    }
}

/// Size and digest of one copied file's plaintext
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CopiedFile {
    pub bytes: u64,
    pub checksum: String,
}

/// Copy `source` into a backup at `dest`, applying the stored transforms
pub fn store_file(
    source: &Path,
    dest: &Path,
    options: &BackupOptions,
) -> Result<CopiedFile, BackupError> {
    if !options.transforms() {
        return copy_streaming(source, dest, BackupPhase::Copy);
    }

    let data = fs::read(source).map_err(|e| BackupError::copy(BackupPhase::Copy, source, e))?;
    let copied = CopiedFile {
        bytes: data.len() as u64,
        checksum: checksum(&data),
    };

    let mut stored = data;
    if options.compress {
        stored = zstd::encode_all(&stored[..], COMPRESSION_LEVEL).map_err(|e| {
            BackupError::Compress {
                path: source.to_path_buf(),
                message: e.to_string(),
            }
        })?;
    }
    if let Some(key) = &options.encrypt {
        stored = crypto::encrypt(&stored, key)
            .map_err(|e| BackupError::from_store(BackupPhase::Copy, source, e))?;
    }

    write_atomic(dest, &stored).map_err(|e| BackupError::copy(BackupPhase::Copy, dest, e))?;
    Ok(copied)
}

/// Copy a stored file out of a backup, reversing its transforms
///
/// An encrypted backup cannot be read without `key`.
pub fn load_file(
    stored: &Path,
    dest: &Path,
    compressed: bool,
    encrypted: bool,
    key: Option<&MasterKey>,
    phase: BackupPhase,
) -> Result<CopiedFile, BackupError> {
    let data = read_stored(stored, compressed, encrypted, key, phase)?;
    let copied = CopiedFile {
        bytes: data.len() as u64,
        checksum: checksum(&data),
    };
    write_atomic(dest, &data).map_err(|e| BackupError::copy(phase, dest, e))?;
    Ok(copied)
}

/// Plaintext size and checksum of a stored file
pub fn stored_digest(
    stored: &Path,
    compressed: bool,
    encrypted: bool,
    key: Option<&MasterKey>,
) -> Result<CopiedFile, BackupError> {
    if !compressed && !encrypted {
        let file =
            File::open(stored).map_err(|e| BackupError::copy(BackupPhase::Verify, stored, e))?;
        let (checksum, bytes) = checksum_reader(file)
            .map_err(|e| BackupError::copy(BackupPhase::Verify, stored, e))?;
        return Ok(CopiedFile { bytes, checksum });
    }

    let data = read_stored(stored, compressed, encrypted, key, BackupPhase::Verify)?;
    Ok(CopiedFile {
        bytes: data.len() as u64,
        checksum: checksum(&data),
    })
}

fn read_stored(
    stored: &Path,
    compressed: bool,
    encrypted: bool,
    key: Option<&MasterKey>,
    phase: BackupPhase,
) -> Result<Vec<u8>, BackupError> {
    let mut data = fs::read(stored).map_err(|e| BackupError::copy(phase, stored, e))?;

    if encrypted {
        data = decrypt_stored(stored, &data, key, phase)?;
    }
    if compressed {
        data = decompress_stored(stored, &data)?;
    }
    Ok(data)
}

/// Copy a stored file out of a backup whose storage flags are unknown
///
/// Encryption is recognised by the blob header and compression by the zstd
/// frame magic. Encrypted content without `key` is an error, never raw output.
pub fn load_detected(
    stored: &Path,
    dest: &Path,
    key: Option<&MasterKey>,
    phase: BackupPhase,
) -> Result<CopiedFile, BackupError> {
    let mut data = fs::read(stored).map_err(|e| BackupError::copy(phase, stored, e))?;

    if crypto::is_encrypted(&data) {
        data = decrypt_stored(stored, &data, key, phase)?;
    }
    if data.starts_with(&ZSTD_MAGIC) {
        data = decompress_stored(stored, &data)?;
    }

    let copied = CopiedFile {
        bytes: data.len() as u64,
        checksum: checksum(&data),
    };
    write_atomic(dest, &data).map_err(|e| BackupError::copy(phase, dest, e))?;
    Ok(copied)
}

fn decrypt_stored(
    stored: &Path,
    data: &[u8],
    key: Option<&MasterKey>,
    phase: BackupPhase,
) -> Result<Vec<u8>, BackupError> {
    let key = key.ok_or_else(|| BackupError::Encrypt {
        path: stored.to_path_buf(),
        message: "backup is encrypted and no key was provided".to_string(),
    })?;
    crypto::decrypt(data, key).map_err(|e| BackupError::from_store(phase, stored, e))
}

fn decompress_stored(stored: &Path, data: &[u8]) -> Result<Vec<u8>, BackupError> {
    zstd::decode_all(data).map_err(|e| BackupError::Compress {
        path: stored.to_path_buf(),
        message: e.to_string(),
    })
}

/// Copy a file unchanged, hashing it in the same pass
pub fn copy_streaming(
    source: &Path,
    dest: &Path,
    phase: BackupPhase,
) -> Result<CopiedFile, BackupError> {
    let mut reader = File::open(source).map_err(|e| BackupError::copy(phase, source, e))?;
    let mut writer = AtomicFile::create(dest).map_err(|e| BackupError::copy(phase, dest, e))?;
    let mut hasher = ContentHasher::new();
    let mut buffer = [0u8; CHUNK_SIZE];

    loop {
        let n = match reader.read(&mut buffer) {
            Ok(0) => break,
            Ok(n) => n,
            Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
            Err(e) => return Err(BackupError::copy(phase, source, e)),
        };
        hasher.update(&buffer[..n]);
        writer
            .write_all(&buffer[..n])
            .map_err(|e| BackupError::copy(phase, dest, e))?;
    }

    writer
        .commit()
        .map_err(|e| BackupError::copy(phase, dest, e))?;

    Ok(CopiedFile {
        bytes: hasher.bytes(),
        checksum: hasher.finish(),
    })
}
