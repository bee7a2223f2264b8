//! Content integrity
//!
//! SHA-256 fingerprints for buffers, files and whole trees, `.sha256`
//! sidecar files, and a simple change monitor.

pub mod checksum;
pub mod monitor;
pub mod sidecar;

pub use checksum::{
    checksum, checksum_file, checksum_reader, files_identical, ContentHasher, TreeChecksum,
};
pub use monitor::FileMonitor;
pub use sidecar::{verify_sidecar, write_sidecar, IntegrityStatus};
