//! Backup CLI commands
//!
//! Implements CLI commands for creating, restoring, inspecting and pruning
//! backups.

use std::path::{Path, PathBuf};

use chrono::Utc;
use clap::{Args, Subcommand};

use super::key::load_master_key;
use crate::backup::{AutoBackup, BackupEngine, BackupOptions, BackupSummary, RestoreResult};
use crate::config::paths::StrongboxPaths;
use crate::config::settings::Settings;
use crate::crypto::KeyManager;
use crate::display::{format_backup_details, format_backup_list, format_elapsed, format_size};
use crate::error::{BackupError, StrongboxError, StrongboxResult};

/// Storage options shared by backup-creating commands
#[derive(Args, Debug, Clone, Copy, Default)]
pub struct StorageFlags {
    /// zstd-compress stored files
    #[arg(short, long)]
    pub compress: bool,

    /// Encrypt stored files with the master key
    #[arg(short, long)]
    pub encrypt: bool,
}

/// Backup subcommands
#[derive(Subcommand)]
pub enum BackupCommands {
    /// Create a full backup of a directory
    Full {
        /// Directory to back up (defaults to the configured source)
        source: Option<PathBuf>,

        /// Logical backup name
        #[arg(short, long)]
        name: Option<String>,

        #[command(flatten)]
        storage: StorageFlags,
    },

    /// Back up files changed since the latest backup of the same name
    #[command(alias = "inc")]
    Incremental {
        source: Option<PathBuf>,

        #[arg(short, long)]
        name: Option<String>,

        #[command(flatten)]
        storage: StorageFlags,
    },

    /// Restore a backup into a directory
    Restore {
        /// Destination directory
        destination: PathBuf,

        /// Backup directory name or path, a logical name, or 'latest'
        #[arg(short, long, default_value = "latest")]
        backup: String,

        /// Restore into a non-empty destination, overwriting files
        #[arg(short, long)]
        force: bool,
    },

    /// Restore one file from the latest backup of a name that contains it
    RestoreFile {
        /// Path of the file relative to the backed-up directory
        file: PathBuf,

        /// Where to write the file
        destination: PathBuf,

        #[arg(short, long)]
        name: Option<String>,
    },

    /// Back up a single file
    File {
        source: PathBuf,

        #[arg(short, long)]
        name: Option<String>,

        #[command(flatten)]
        storage: StorageFlags,
    },

    /// Restore a single-file backup
    RestoreSingle {
        /// Backup file path or file name under the backup directory
        backup_file: PathBuf,

        destination: PathBuf,
    },

    /// List available backups
    List {
        /// Only show backups of this name
        #[arg(short, long)]
        name: Option<String>,

        /// Print JSON instead of a table
        #[arg(long)]
        json: bool,
    },

    /// Show information about a backup
    Info {
        #[arg(default_value = "latest")]
        backup: String,
    },

    /// Recompute a backup's checksum and compare it to its manifest
    Verify {
        #[arg(default_value = "latest")]
        backup: String,
    },

    /// Delete backups older than the retention period
    Prune {
        /// Override the configured retention period
        #[arg(short, long)]
        days: Option<u32>,

        /// Override the configured minimum kept per name
        #[arg(short, long)]
        min_retained: Option<usize>,

        /// Delete instead of only reporting
        #[arg(short, long)]
        force: bool,
    },

    /// Delete every backup of a name
    Delete {
        name: String,

        #[arg(short, long)]
        force: bool,
    },
}

/// Handle a backup command
pub fn handle_backup_command(
    paths: &StrongboxPaths,
    settings: &Settings,
    cmd: BackupCommands,
) -> StrongboxResult<()> {
    let backup_dir = settings.backup_dir(paths);
    let default_name = settings.backup.default_name.as_str();

    match cmd {
        BackupCommands::Full {
            source,
            name,
            storage,
        } => {
            let engine = writing_engine(paths, settings, backup_dir, storage)?;
            let source = source_dir(settings, source)?;
            let name = name.as_deref().unwrap_or(default_name);

            println!("Creating full backup of {}...", source.display());
            let summary = engine.full_backup(name, &source)?;
            print_summary(&summary);
        }

        BackupCommands::Incremental {
            source,
            name,
            storage,
        } => {
            let engine = writing_engine(paths, settings, backup_dir, storage)?;
            let source = source_dir(settings, source)?;
            let name = name.as_deref().unwrap_or(default_name);

            println!("Creating incremental backup of {}...", source.display());
            let summary = engine.incremental_backup(name, &source)?;
            print_summary(&summary);
        }

        BackupCommands::Restore {
            destination,
            backup,
            force,
        } => {
            let engine = reading_engine(paths, backup_dir)?;
            let backup_path = resolve_backup(&engine, default_name, &backup)?;

            if !force && is_non_empty_dir(&destination) {
                println!("Backup: {}", backup_path.display());
                println!(
                    "WARNING: {} is not empty; files with the same names will be overwritten.",
                    destination.display()
                );
                println!("To proceed, run again with --force flag:");
                println!(
                    "  strongbox backup restore {} --backup {} --force",
                    destination.display(),
                    backup
                );
                return Ok(());
            }

            println!("Restoring from {}...", backup_path.display());
            let result = engine.restore_path(&backup_path, &destination)?;
            print_restore(&result);
        }

        BackupCommands::RestoreFile {
            file,
            destination,
            name,
        } => {
            let engine = reading_engine(paths, backup_dir)?;
            let name = name.as_deref().unwrap_or(default_name);

            let result = engine.restore_file_from_backup(name, &file, &destination)?;
            println!(
                "Restored {} from {}",
                destination.display(),
                result.source.display()
            );
            print_restore(&result);
        }

        BackupCommands::File {
            source,
            name,
            storage,
        } => {
            let engine = writing_engine(paths, settings, backup_dir, storage)?;
            let name = name.as_deref().unwrap_or(default_name);

            let summary = engine.backup_file(&source, name)?;
            println!("Backup created: {}", summary.path.display());
            println!("Metadata: {}", summary.meta_path.display());
            println!("Size: {}", format_size(summary.bytes));
            println!("Checksum: {}", summary.checksum);
        }

        BackupCommands::RestoreSingle {
            backup_file,
            destination,
        } => {
            let engine = reading_engine(paths, backup_dir)?;
            let backup_file = if backup_file.exists() {
                backup_file
            } else {
                engine.backup_dir().join(&backup_file)
            };

            let result = engine.restore_file(&backup_file, &destination)?;
            println!("Restored {}", destination.display());
            print_restore(&result);
        }

        BackupCommands::List { name, json } => {
            let engine = BackupEngine::new(backup_dir);
            let mut backups = engine.list_backups()?;
            if let Some(name) = &name {
                backups.retain(|b| &b.name == name);
            }

            if json {
                println!("{}", serde_json::to_string_pretty(&backups)?);
                return Ok(());
            }

            if backups.is_empty() {
                println!("No backups found.");
                println!("Create one with: strongbox backup full <SOURCE>");
                return Ok(());
            }

            println!("{}", format_backup_list(&backups, Utc::now()));
            println!();
            println!("Total: {} backup(s)", backups.len());
        }

        BackupCommands::Info { backup } => {
            let engine = BackupEngine::new(backup_dir);
            let backup_path = resolve_backup(&engine, default_name, &backup)?;

            let info = engine
                .list_backups()?
                .into_iter()
                .find(|b| b.path == backup_path)
                .ok_or_else(|| BackupError::BackupNotFound {
                    name: backup.clone(),
                    dir: engine.backup_dir().to_path_buf(),
                })?;
            println!("{}", format_backup_details(&info));
        }

        BackupCommands::Verify { backup } => {
            let engine = reading_engine(paths, backup_dir)?;
            let backup_path = resolve_backup(&engine, default_name, &backup)?;

            println!("Verifying {}...", backup_path.display());
            let validation = engine.verify_backup(&backup_path)?;
            println!("{}", validation.summary());
            if !validation.is_valid() {
                return Err(StrongboxError::Integrity(format!(
                    "backup {} does not match its manifest",
                    backup_path.display()
                )));
            }
        }

        BackupCommands::Prune {
            days,
            min_retained,
            force,
        } => {
            let engine = BackupEngine::new(backup_dir);
            let mut policy = settings.backup.retention_policy();
            if let Some(days) = days {
                policy.days_to_keep = days;
            }
            if let Some(min_retained) = min_retained {
                policy.min_retained = min_retained;
            }
            policy.dry_run = !force;

            let report = engine.cleanup_with_policy(&policy)?;
            println!(
                "Retention policy: {} day(s), keep at least {} per name",
                policy.days_to_keep, policy.min_retained
            );

            if report.deleted.is_empty() {
                println!("No backups to prune ({} kept).", report.kept);
                return Ok(());
            }

            let verb = if report.dry_run { "Would delete" } else { "Deleted" };
            for path in &report.deleted {
                println!("{}: {}", verb, path.display());
            }
            println!(
                "{} {} backup(s), kept {}.",
                verb,
                report.deleted.len(),
                report.kept
            );

            if report.dry_run {
                println!();
                println!("To delete these backups, run again with --force flag:");
                println!("  strongbox backup prune --force");
            }
        }

        BackupCommands::Delete { name, force } => {
            let engine = BackupEngine::new(backup_dir);

            if !force {
                let count = engine
                    .list_backups()?
                    .iter()
                    .filter(|b| b.name == name)
                    .count();
                println!("This will delete {} backup(s) named '{}'.", count, name);
                println!("To proceed, run again with --force flag:");
                println!("  strongbox backup delete {} --force", name);
                return Ok(());
            }

            let deleted = engine.delete_backup(&name)?;
            println!("Deleted {} backup(s).", deleted.len());
        }
    }

    Ok(())
}

/// Run the automatic backup loop until interrupted, or once
pub fn handle_auto_command(
    paths: &StrongboxPaths,
    settings: &Settings,
    once: bool,
    poll_seconds: u64,
) -> StrongboxResult<()> {
    let config = settings.auto_backup.clone();
    if !config.enabled {
        println!("Automatic backups are disabled.");
        println!("Enable them with \"auto_backup.enabled\" in {}", paths.settings_file().display());
        return Ok(());
    }
    if let Some(schedule) = &config.schedule {
        schedule.validate()?;
    }

    let storage = StorageFlags {
        compress: config.compress,
        encrypt: config.encrypt,
    };
    let engine = writing_engine(paths, settings, settings.backup_dir(paths), storage)?;
    let mut auto = AutoBackup::resume(config, engine.backup_dir())?;

    loop {
        match auto.run_if_due(Utc::now(), &engine)? {
            Some(summary) => print_summary(&summary),
            None if once => println!("No automatic backup due."),
            None => tracing::debug!("No automatic backup due"),
        }
        if once {
            return Ok(());
        }
        std::thread::sleep(std::time::Duration::from_secs(poll_seconds.max(1)));
    }
}

/// Engine that writes backups with the requested storage options
fn writing_engine(
    paths: &StrongboxPaths,
    settings: &Settings,
    backup_dir: PathBuf,
    storage: StorageFlags,
) -> StrongboxResult<BackupEngine> {
    let mut options =
        BackupOptions::plain().compressed(storage.compress || settings.backup.compress);
    if storage.encrypt || settings.backup.encrypt {
        options = options.encrypted(load_master_key(paths)?);
    }
    Ok(BackupEngine::new(backup_dir).with_options(options))
}

/// Engine able to read encrypted backups when a master key exists
fn reading_engine(paths: &StrongboxPaths, backup_dir: PathBuf) -> StrongboxResult<BackupEngine> {
    let keys = KeyManager::new(paths.key_file());
    let options = if keys.exists() {
        BackupOptions::plain().encrypted(keys.load()?)
    } else {
        BackupOptions::plain()
    };
    Ok(BackupEngine::new(backup_dir).with_options(options))
}

fn source_dir(settings: &Settings, source: Option<PathBuf>) -> StrongboxResult<PathBuf> {
    source
        .or_else(|| settings.backup.source_dir.clone())
        .ok_or_else(|| {
            BackupError::InvalidParameters(
                "no source directory given and none configured".to_string(),
            )
            .into()
        })
}

/// Resolve a backup identifier to a backup directory
///
/// Accepts 'latest' (latest backup of the default name), a logical name, a
/// directory name under the backup root, or a path. Bare words are always
/// looked up in the catalog; only values with a separator or an absolute
/// path are taken as filesystem paths.
fn resolve_backup(
    engine: &BackupEngine,
    default_name: &str,
    backup: &str,
) -> StrongboxResult<PathBuf> {
    let not_found = || BackupError::BackupNotFound {
        name: backup.to_string(),
        dir: engine.backup_dir().to_path_buf(),
    };

    if is_path_like(backup) {
        let path = PathBuf::from(backup);
        return if path.is_dir() {
            Ok(path)
        } else {
            Err(not_found().into())
        };
    }

    let logical = if backup.eq_ignore_ascii_case("latest") {
        default_name
    } else {
        backup
    };
    if let Some(info) = engine.get_latest_backup(logical)? {
        return Ok(info.path);
    }

    let in_root = engine.backup_dir().join(backup);
    if in_root.is_dir() {
        return Ok(in_root);
    }
    Err(not_found().into())
}

fn is_path_like(value: &str) -> bool {
    let path = Path::new(value);
    path.is_absolute() || path.components().count() > 1 || value.starts_with('.')
}

fn is_non_empty_dir(path: &Path) -> bool {
    std::fs::read_dir(path)
        .map(|mut entries| entries.next().is_some())
        .unwrap_or(false)
}

fn print_summary(summary: &BackupSummary) {
    println!("Backup created: {}", summary.path.display());
    println!("Type: {}", summary.kind());
    if let Some(based_on) = summary.based_on {
        println!("Based on backup from: {}", based_on.to_rfc3339());
    }
    println!("Files: {}", summary.file_count);
    println!(
        "Size: {} ({} bytes)",
        format_size(summary.total_bytes),
        summary.total_bytes
    );
    println!("Checksum: {}", summary.checksum);
    println!("Elapsed: {}", format_elapsed(summary.duration));
}

fn print_restore(result: &RestoreResult) {
    println!("{}", result.summary());
    for warning in &result.warnings {
        println!("Warning: {}", warning);
    }
}
