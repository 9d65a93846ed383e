//! Backup command - operator access to backup creation and restore.

use anyhow::Result;

use crate::backup::{BackupKind, BackupManager};
use crate::config::WardenConfig;

/// Create a fresh archive for `kind`, replacing any previous one.
pub fn cmd_backup_create(config: &WardenConfig, kind: BackupKind) -> Result<()> {
    let backup = BackupManager::new(config).create_backup(kind)?;
    println!(
        "{} backup written: {} ({} entries)",
        backup.kind.as_str(),
        backup.archive.display(),
        backup.entries
    );
    Ok(())
}

/// Restore the archive of `kind` over the system root. A missing archive
/// surfaces as a normal error and a non-zero exit.
pub fn cmd_backup_restore(config: &WardenConfig, kind: BackupKind) -> Result<()> {
    let restored = BackupManager::new(config).restore_backup(kind)?;
    println!("{} backup restored ({restored} files)", kind.as_str());
    Ok(())
}
