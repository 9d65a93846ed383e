//! Single-instance enforcement.
//!
//! Boot, recovery, and firmware update all mutate process-wide system state
//! (mounts, firewall, kernel parameters), so at most one of them may run at a
//! time. The lock is an exclusively flocked file under the state directory.
//! The file is never unlinked, by the holder or anyone else: unlinking would
//! let a contender that opened the old inode and a process that created a
//! fresh file both hold "the" lock. The flock alone arbitrates; a stale file
//! from a dead process carries no lock and is harmless.

use anyhow::{anyhow, Context, Result};
use fs2::FileExt;
use std::fs::{self, File, OpenOptions};

use crate::config::WardenConfig;

/// Held for the lifetime of a mutating command. Dropping releases the flock;
/// the lock file itself stays in place for the next acquisition.
#[derive(Debug)]
pub struct InstanceLock {
    file: File,
}

impl InstanceLock {
    pub fn acquire(config: &WardenConfig) -> Result<Self> {
        let path = config.lock_file();
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create {}", parent.display()))?;
        }

        let file = OpenOptions::new()
            .create(true)
            .read(true)
            .write(true)
            .truncate(false)
            .open(&path)
            .with_context(|| format!("Failed to open lock file {}", path.display()))?;

        file.try_lock_exclusive().map_err(|_| {
            anyhow!(
                "another warden instance is already running (lock held: {})",
                path.display()
            )
        })?;

        Ok(Self { file })
    }
}

impl Drop for InstanceLock {
    fn drop(&mut self) {
        let _ = FileExt::unlock(&self.file);
    }
}
