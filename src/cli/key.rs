//! Master key CLI commands

use clap::Subcommand;

use crate::config::paths::StrongboxPaths;
use crate::crypto::{KeyManager, MasterKey};
use crate::error::{KeyError, StrongboxResult};

/// Master key commands
#[derive(Subcommand)]
pub enum KeyCommands {
    /// Generate the master key if it does not exist yet
    Init,

    /// Show where the master key lives and whether it is usable
    Status,
}

/// Handle a key command
pub fn handle_key_command(paths: &StrongboxPaths, cmd: KeyCommands) -> StrongboxResult<()> {
    let manager = KeyManager::new(paths.key_file());

    match cmd {
        KeyCommands::Init => {
            if manager.exists() {
                // A corrupted key is reported, never replaced
                manager.load()?;
                println!("Master key already exists: {}", manager.path().display());
                return Ok(());
            }
            manager.ensure()?;
            println!("Master key created: {}", manager.path().display());
            println!("Keep a copy of this file; encrypted data cannot be read without it.");
        }

        KeyCommands::Status => {
            println!("Key file: {}", manager.path().display());
            match manager.load() {
                Ok(_) => println!("Status:   present"),
                Err(KeyError::KeyNotFound(_)) => {
                    println!("Status:   missing");
                    println!("Create one with: strongbox key init");
                }
                Err(e) => {
                    println!("Status:   unusable");
                    return Err(e.into());
                }
            }
        }
    }

    Ok(())
}

/// Load the master key, failing if it has not been created
pub fn load_master_key(paths: &StrongboxPaths) -> StrongboxResult<MasterKey> {
    Ok(KeyManager::new(paths.key_file()).load()?)
}
