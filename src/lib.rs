//! Strongbox - encrypted persistence and point-in-time backups
//!
//! This library provides atomic plain and encrypted file storage under a
//! single local master key, content checksums, and full and incremental
//! directory backups with restore, verification and retention.
//!
//! # Architecture
//!
//! The crate is organized into the following modules:
//!
//! - `config`: Paths, settings and logging setup
//! - `error`: Custom error types
//! - `crypto`: Master key management and blob encryption
//! - `integrity`: Checksums, sidecar files and change monitoring
//! - `fs`: Deterministic directory traversal
//! - `storage`: Atomic and encrypted file store
//! - `backup`: Backup, restore, retention and scheduling
//! - `cli` / `display`: Command handlers and terminal formatting
//!
//! Everything runs synchronously on the calling thread.
//!
//! # Example
//!
//! ```rust,ignore
//! use strongbox::crypto::KeyManager;
//! use strongbox::storage::FileStore;
//!
//! let key = KeyManager::new(paths.key_file()).ensure()?;
//! let store = FileStore::encrypted(key);
//! store.save(&path, b"secret")?;
//! assert_eq!(store.load(&path)?, b"secret");
//! ```

pub mod backup;
pub mod cli;
pub mod config;
pub mod crypto;
pub mod display;
pub mod error;
pub mod fs;
pub mod integrity;
pub mod storage;

pub use error::{StrongboxError, StrongboxResult};
