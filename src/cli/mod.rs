//! CLI command handlers
//!
//! This module contains the implementation of CLI commands,
//! bridging the clap argument parsing with the store and backup layers.

pub mod backup;
pub mod file;
pub mod key;

pub use backup::{handle_auto_command, handle_backup_command, BackupCommands};
pub use file::{handle_file_command, FileCommands};
pub use key::{handle_key_command, KeyCommands};
