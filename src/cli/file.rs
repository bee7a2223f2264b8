//! File store CLI commands
//!
//! Atomic plain and encrypted writes, in-place encryption, checksums and
//! sidecar verification for individual files.

use std::io::{Read, Write};
use std::path::{Path, PathBuf};

use clap::Subcommand;

use super::key::load_master_key;
use crate::config::paths::StrongboxPaths;
use crate::error::{StoreError, StrongboxError, StrongboxResult};
use crate::fs::DirectoryWalker;
use crate::integrity::{self, IntegrityStatus, TreeChecksum};
use crate::storage::{self, FileStore};

/// File commands
#[derive(Subcommand)]
pub enum FileCommands {
    /// Atomically write content from a file or stdin
    Write {
        /// Destination file
        path: PathBuf,

        /// Read content from this file instead of stdin
        #[arg(short, long)]
        input: Option<PathBuf>,

        /// Encrypt with the master key
        #[arg(short, long)]
        encrypt: bool,

        /// Also write a `.sha256` sidecar of the stored bytes
        #[arg(long)]
        sidecar: bool,
    },

    /// Print a file, decrypting it with the master key when asked to
    Read {
        path: PathBuf,

        /// The file was written with `--encrypt`
        #[arg(short, long)]
        encrypted: bool,

        /// Write the content here instead of stdout
        #[arg(short, long)]
        output: Option<PathBuf>,
    },

    /// Encrypt an existing file in place
    Encrypt { path: PathBuf },

    /// Decrypt an existing file in place
    Decrypt { path: PathBuf },

    /// Print the SHA-256 of files, or the tree checksum of directories
    Checksum {
        #[arg(required = true)]
        paths: Vec<PathBuf>,

        /// Write a `.sha256` sidecar next to each file
        #[arg(short, long)]
        write: bool,
    },

    /// Verify files against their `.sha256` sidecars
    Verify {
        #[arg(required = true)]
        paths: Vec<PathBuf>,
    },

    /// Repair leftovers of interrupted writes in a directory
    Recover {
        /// Directory to scan (defaults to the data directory)
        dir: Option<PathBuf>,
    },
}

/// Handle a file command
pub fn handle_file_command(paths: &StrongboxPaths, cmd: FileCommands) -> StrongboxResult<()> {
    match cmd {
        FileCommands::Write {
            path,
            input,
            encrypt,
            sidecar,
        } => {
            let content = match input {
                Some(input) => std::fs::read(&input).map_err(|e| {
                    StrongboxError::Io(format!("Failed to read {}: {}", input.display(), e))
                })?,
                None => {
                    let mut buf = Vec::new();
                    std::io::stdin().read_to_end(&mut buf)?;
                    buf
                }
            };

            let store = if encrypt {
                FileStore::encrypted(load_master_key(paths)?)
            } else {
                FileStore::plain()
            };
            store.save(&path, &content)?;
            println!(
                "Wrote {} bytes to {}{}",
                content.len(),
                path.display(),
                if encrypt { " (encrypted)" } else { "" }
            );

            if sidecar {
                let digest = integrity::write_sidecar(&path)?;
                println!("Checksum: {}", digest);
            }
        }

        FileCommands::Read {
            path,
            encrypted,
            output,
        } => {
            let content = if encrypted {
                FileStore::encrypted(load_master_key(paths)?).load(&path)?
            } else if storage::is_encrypted_file(&path)? {
                return Err(StoreError::InvalidFormat(format!(
                    "{} is encrypted; read it with --encrypted",
                    path.display()
                ))
                .into());
            } else {
                FileStore::plain().load(&path)?
            };

            match output {
                Some(output) => {
                    storage::write_plain(&output, &content)?;
                    println!("Wrote {} bytes to {}", content.len(), output.display());
                }
                None => {
                    let mut stdout = std::io::stdout().lock();
                    stdout.write_all(&content)?;
                    stdout.flush()?;
                }
            }
        }

        FileCommands::Encrypt { path } => {
            let key = load_master_key(paths)?;
            storage::encrypt_existing_file(&path, &key)?;
            println!("Encrypted {}", path.display());
        }

        FileCommands::Decrypt { path } => {
            let key = load_master_key(paths)?;
            storage::decrypt_existing_file(&path, &key)?;
            println!("Decrypted {}", path.display());
        }

        FileCommands::Checksum { paths: targets, write } => {
            for target in &targets {
                let digest = if target.is_dir() {
                    tree_checksum(target)?
                } else if write {
                    integrity::write_sidecar(target)?
                } else {
                    integrity::checksum_file(target).map_err(|e| {
                        StrongboxError::Io(format!("Failed to read {}: {}", target.display(), e))
                    })?
                };
                println!("{}  {}", digest, target.display());
            }
        }

        FileCommands::Verify { paths: targets } => {
            let mut failures = 0;
            for target in &targets {
                match integrity::verify_sidecar(target)? {
                    IntegrityStatus::Valid => println!("OK        {}", target.display()),
                    IntegrityStatus::Mismatch { expected, actual } => {
                        failures += 1;
                        println!("MISMATCH  {}", target.display());
                        println!("  expected {}", expected);
                        println!("  actual   {}", actual);
                    }
                    IntegrityStatus::MissingSidecar => {
                        failures += 1;
                        println!("MISSING   {} (no .sha256 sidecar)", target.display());
                    }
                }
            }
            if failures > 0 {
                return Err(StrongboxError::Integrity(format!(
                    "{} of {} file(s) failed verification",
                    failures,
                    targets.len()
                )));
            }
        }

        FileCommands::Recover { dir } => {
            let dir = dir.unwrap_or_else(|| paths.data_dir());
            let report = storage::recover_interrupted(&dir)?;

            if report.is_empty() {
                println!("Nothing to recover in {}", dir.display());
                return Ok(());
            }
            for path in &report.recovered {
                println!("Recovered: {}", path.display());
            }
            for path in &report.removed {
                println!("Removed:   {}", path.display());
            }
        }
    }

    Ok(())
}

/// Aggregate checksum of a directory, as recorded in backup manifests
fn tree_checksum(root: &Path) -> StrongboxResult<String> {
    let mut tree = TreeChecksum::new();
    for entry in DirectoryWalker::new(root) {
        let entry = entry?;
        if entry.is_dir {
            continue;
        }
        let digest = integrity::checksum_file(&entry.path).map_err(|e| {
            StrongboxError::Io(format!("Failed to read {}: {}", entry.path.display(), e))
        })?;
        tree.add(&entry.relative_path, digest);
    }
    Ok(tree.finish())
}
