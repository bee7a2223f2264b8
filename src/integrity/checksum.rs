//! SHA-256 content fingerprints
//!
//! All digests are lowercase hex. Readers are consumed in 4 KiB chunks so
//! memory use does not depend on input size.

use std::fs::File;
use std::io::{self, Read};
use std::path::Path;

use sha2::{Digest, Sha256};

/// Chunk size for streaming hashes
pub const CHUNK_SIZE: usize = 4096;

/// Hex digest of an in-memory buffer
pub fn checksum(bytes: &[u8]) -> String {
    let mut hasher = Sha256::new();
    for chunk in bytes.chunks(CHUNK_SIZE) {
        hasher.update(chunk);
    }
    hex::encode(hasher.finalize())
}

/// Hex digest and byte count of everything `reader` yields
pub fn checksum_reader<R: Read>(mut reader: R) -> io::Result<(String, u64)> {
    let mut hasher = Sha256::new();
    let mut buffer = [0u8; CHUNK_SIZE];
    let mut total = 0u64;

    loop {
        let n = match reader.read(&mut buffer) {
            Ok(0) => break,
            Ok(n) => n,
            Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
            Err(e) => return Err(e),
        };
        hasher.update(&buffer[..n]);
        total += n as u64;
    }

    Ok((hex::encode(hasher.finalize()), total))
}

/// Hex digest of a file's content
pub fn checksum_file(path: &Path) -> io::Result<String> {
    let file = File::open(path)?;
    checksum_reader(file).map(|(digest, _)| digest)
}

/// Compare two files by size, then by digest
pub fn files_identical(a: &Path, b: &Path) -> io::Result<bool> {
    if a.metadata()?.len() != b.metadata()?.len() {
        return Ok(false);
    }
    Ok(checksum_file(a)? == checksum_file(b)?)
}

/// Streaming hasher that also counts bytes
///
/// Used while copying so content is hashed in the same pass that writes it.
#[derive(Default)]
pub struct ContentHasher {
    hasher: Sha256,
    bytes: u64,
}

impl ContentHasher {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn update(&mut self, data: &[u8]) {
        self.hasher.update(data);
        self.bytes += data.len() as u64;
    }

    /// Number of bytes hashed so far
    pub fn bytes(&self) -> u64 {
        self.bytes
    }

    pub fn finish(self) -> String {
        hex::encode(self.hasher.finalize())
    }
}

/// Aggregate checksum over the files of a tree
///
/// Entries are sorted by relative path (with `/` separators) and hashed as
/// `"<path>\0<digest>\n"` lines, so the result depends only on the file
/// set and contents, not on traversal order or destination location.
#[derive(Debug, Default, Clone)]
pub struct TreeChecksum {
    entries: Vec<(String, String)>,
}

impl TreeChecksum {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record one file's digest
    pub fn add(&mut self, relative_path: &Path, digest: impl Into<String>) {
        self.entries
            .push((portable_path(relative_path), digest.into()));
    }

    /// Number of files recorded
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Aggregate hex digest
    pub fn finish(mut self) -> String {
        self.entries.sort();
        let mut hasher = Sha256::new();
        for (path, digest) in &self.entries {
            hasher.update(path.as_bytes());
            hasher.update([0u8]);
            hasher.update(digest.as_bytes());
            hasher.update(b"\n");
        }
        hex::encode(hasher.finalize())
    }
}

/// Relative path rendered with `/` separators on every platform
pub fn portable_path(path: &Path) -> String {
    path.components()
        .map(|c| c.as_os_str().to_string_lossy())
        .collect::<Vec<_>>()
        .join("/")
}
