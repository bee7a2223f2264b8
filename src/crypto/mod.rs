//! Cryptographic functions for Strongbox
//!
//! Provides AES-256-GCM blob encryption under a single random master key
//! stored on disk.

pub mod encryption;
pub mod master_key;

pub use encryption::{decrypt, encrypt, is_encrypted};
pub use master_key::{KeyManager, MasterKey, KEY_SIZE};
