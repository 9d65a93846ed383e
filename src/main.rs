//! warden - staged bring-up and recovery controller for embedded Linux.
//!
//! Brings a device to a verified, hardened state at boot, and provides the
//! fail-safe paths back: a mode-dispatched recovery state machine and a
//! firmware update pipeline with automatic rollback.

use anyhow::Result;
use clap::{Parser, Subcommand, ValueEnum};
use std::process::Command;

use warden::backup::BackupKind;
use warden::commands::{self, BootOutcome};
use warden::config::WardenConfig;
use warden::firmware::UpdateOutcome;
use warden::lock::InstanceLock;
use warden::logging;
use warden::recovery::RecoveryMode;

#[derive(Parser)]
#[command(name = "warden")]
#[command(about = "Boot-time integrity verification, hardening, and recovery")]
#[command(
    after_help = "TYPICAL USE:\n  warden baseline    Record the kernel reference digest once\n  warden boot        Run the staged bring-up at boot\n  warden verify      Integrity report, no changes applied\n  warden recover 2   Advanced repair from the recovery partition"
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the staged boot bring-up (integrity, hardening, network, services)
    Boot,

    /// Run a recovery mode: 1=basic repair, 2=advanced repair, 3=forensic analysis
    Recover {
        /// Mode selector (1, 2, or 3)
        mode: String,
    },

    /// Update platform firmware (backup, fetch, apply, verify, roll back on failure)
    FirmwareUpdate,

    /// Run the integrity checks standalone and report tool availability
    Verify,

    /// Record the current kernel digest as the integrity reference
    Baseline,

    /// Create or restore backup archives
    Backup {
        #[command(subcommand)]
        action: BackupAction,
    },

    /// Show information
    Show {
        #[command(subcommand)]
        what: ShowTarget,
    },
}

#[derive(Subcommand)]
enum BackupAction {
    /// Create a fresh archive, replacing the previous one
    Create { kind: BackupKindArg },
    /// Restore an archive over its original locations
    Restore { kind: BackupKindArg },
}

#[derive(Clone, Copy, ValueEnum)]
enum BackupKindArg {
    /// System configuration files
    Config,
    /// User home directories
    User,
}

impl From<BackupKindArg> for BackupKind {
    fn from(arg: BackupKindArg) -> Self {
        match arg {
            BackupKindArg::Config => BackupKind::Config,
            BackupKindArg::User => BackupKind::User,
        }
    }
}

#[derive(Subcommand)]
enum ShowTarget {
    /// Show current configuration
    Config,
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    logging::init();

    // System-wide env file first, then a local .env; variables already in the
    // environment take precedence over both.
    dotenvy::from_path("/etc/warden/warden.env").ok();
    dotenvy::dotenv().ok();
    let config = WardenConfig::load();

    match cli.command {
        Commands::Boot => {
            let lock = InstanceLock::acquire(&config)?;
            let outcome = commands::cmd_boot(&config)?;
            if let Some(err) = outcome.classify() {
                log::error!("{err}");
                if matches!(outcome, BootOutcome::IntegrityFailure { .. }) {
                    log::error!("system trustworthiness unknown; dropping to emergency shell");
                    drop(lock);
                    emergency_shell();
                }
                return Err(err.into());
            }
        }

        Commands::Recover { mode } => {
            // Validate before the lock or any other side effect: an unknown
            // selector is a usage error, never a default mode.
            let Some(mode) = RecoveryMode::from_selector(&mode) else {
                eprintln!("Usage: warden recover <1|2|3>");
                eprintln!("  1  basic repair (filesystem and package database)");
                eprintln!("  2  advanced repair (restore backups, rebuild boot files)");
                eprintln!("  3  forensic analysis (read-only capture)");
                std::process::exit(1);
            };
            let _lock = InstanceLock::acquire(&config)?;
            commands::cmd_recover(&config, mode)?;
        }

        Commands::FirmwareUpdate => {
            let _lock = InstanceLock::acquire(&config)?;
            match commands::cmd_firmware_update(&config)? {
                UpdateOutcome::Updated => println!("firmware update complete"),
                UpdateOutcome::RolledBack => {
                    println!("firmware update failed verification; previous firmware restored")
                }
            }
        }

        Commands::Verify => {
            if !commands::cmd_verify(&config)? {
                std::process::exit(1);
            }
        }

        Commands::Baseline => {
            commands::cmd_baseline(&config)?;
        }

        Commands::Backup { action } => match action {
            BackupAction::Create { kind } => commands::cmd_backup_create(&config, kind.into())?,
            BackupAction::Restore { kind } => commands::cmd_backup_restore(&config, kind.into())?,
        },

        Commands::Show { what } => match what {
            ShowTarget::Config => commands::cmd_show_config(&config),
        },
    }

    Ok(())
}

/// Drop to a minimal single-user shell and exit 1 when it ends. Used when
/// integrity verification fails and the system cannot be trusted to continue
/// booting normally.
fn emergency_shell() -> ! {
    let status = Command::new("/sbin/sulogin")
        .status()
        .or_else(|_| Command::new("/bin/sh").arg("-i").status());
    if let Err(err) = status {
        eprintln!("[ERROR] could not start an emergency shell: {err}");
    }
    std::process::exit(1);
}
