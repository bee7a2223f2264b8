//! Storage layer for Strongbox
//!
//! Provides atomic plain and encrypted file writes, in-place encryption of
//! existing files, recovery of interrupted replacements and JSON helpers.

pub mod atomic;
pub mod file_io;
pub mod file_store;

pub use atomic::{write_atomic, AtomicFile};
pub use file_io::{read_json, write_json_atomic};
pub use file_store::{
    decrypt_existing_file, encrypt_existing_file, is_encrypted_file, read_encrypted, read_plain,
    recover_interrupted, write_encrypted, write_plain, FileStore, RecoveryReport,
};
