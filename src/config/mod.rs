//! Configuration module for Strongbox
//!
//! This module provides configuration management including:
//! - Home directory resolution
//! - User settings persistence
//! - Logging initialization

pub mod logging;
pub mod paths;
pub mod settings;

pub use paths::StrongboxPaths;
pub use settings::{BackupDefaults, Settings};
