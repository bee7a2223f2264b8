use anyhow::Result;
use clap::{Parser, Subcommand};

use strongbox::cli::{
    handle_auto_command, handle_backup_command, handle_file_command, handle_key_command,
    BackupCommands, FileCommands, KeyCommands,
};
use strongbox::config::{logging, paths::StrongboxPaths, settings::Settings};
use strongbox::crypto::KeyManager;
use strongbox::error::StrongboxError;

#[derive(Parser)]
#[command(
    name = "strongbox",
    version,
    about = "Encrypted file storage with full and incremental backups",
    long_about = "Strongbox writes files atomically, optionally encrypted with a \
                  local master key, and keeps point-in-time backups of directories \
                  that can be verified, restored and pruned."
)]
struct Cli {
    /// Log filter (overrides the configured level; RUST_LOG overrides both)
    #[arg(long, global = true)]
    log_level: Option<String>,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Create the home directory, default settings and the master key
    Init,

    /// Show current configuration and paths
    Config,

    /// Master key commands
    #[command(subcommand)]
    Key(KeyCommands),

    /// Atomic and encrypted file commands
    #[command(subcommand)]
    File(FileCommands),

    /// Backup management commands
    #[command(subcommand)]
    Backup(BackupCommands),

    /// Run scheduled automatic backups
    Auto {
        /// Check once and exit instead of looping
        #[arg(long)]
        once: bool,

        /// Seconds between schedule checks
        #[arg(long, default_value_t = 60)]
        poll_seconds: u64,
    },
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    // Initialize paths and settings
    let paths = StrongboxPaths::new()?;
    let settings = Settings::load_or_create(&paths)?;

    let level = cli.log_level.as_deref().unwrap_or(settings.log_level.as_str());
    logging::init(level)?;

    if let Err(err) = run(cli.command, &paths, &settings) {
        eprintln!("Error: {}", err);
        let code = err.backup_status().map_or(1, |status| status.exit_code());
        std::process::exit(code);
    }

    Ok(())
}

fn run(
    command: Option<Commands>,
    paths: &StrongboxPaths,
    settings: &Settings,
) -> Result<(), StrongboxError> {
    match command {
        Some(Commands::Init) => {
            println!("Initializing Strongbox at: {}", paths.base_dir().display());
            paths.ensure_directories()?;
            if !paths.is_initialized() {
                settings.save(paths)?;
            }
            let keys = KeyManager::new(paths.key_file());
            let created = !keys.exists();
            keys.ensure()?;
            println!("Initialization complete!");
            println!();
            println!("Settings:   {}", paths.settings_file().display());
            println!(
                "Master key: {}{}",
                keys.path().display(),
                if created { " (created)" } else { "" }
            );
            println!();
            println!("Run 'strongbox backup full <DIR>' to create a first backup.");
        }
        Some(Commands::Config) => {
            println!("Strongbox Configuration");
            println!("=======================");
            println!("Home directory:   {}", paths.base_dir().display());
            println!("Data directory:   {}", paths.data_dir().display());
            println!("Backup directory: {}", settings.backup_dir(paths).display());
            println!("Key file:         {}", paths.key_file().display());
            println!("Settings file:    {}", paths.settings_file().display());
            println!();
            println!("Settings:");
            println!("{}", serde_json::to_string_pretty(settings)?);
        }
        Some(Commands::Key(cmd)) => handle_key_command(paths, cmd)?,
        Some(Commands::File(cmd)) => handle_file_command(paths, cmd)?,
        Some(Commands::Backup(cmd)) => handle_backup_command(paths, settings, cmd)?,
        Some(Commands::Auto { once, poll_seconds }) => {
            handle_auto_command(paths, settings, once, poll_seconds)?
        }
        None => {
            println!("Strongbox - encrypted storage and backups");
            println!();
            println!("Run 'strongbox --help' for usage information.");
        }
    }

    Ok(())
}
