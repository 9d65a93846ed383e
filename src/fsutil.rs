//! Small filesystem helpers shared across the pipelines.

use anyhow::{Context, Result};
use std::fs;
use std::os::unix::fs::PermissionsExt;
use std::path::{Path, PathBuf};

/// Write a file, creating parent directories as needed.
pub fn write_with_dirs<P: AsRef<Path>, C: AsRef<[u8]>>(path: P, content: C) -> Result<()> {
    let path = path.as_ref();
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)
            .with_context(|| format!("Failed to create {}", parent.display()))?;
    }
    fs::write(path, content).with_context(|| format!("Failed to write {}", path.display()))?;
    Ok(())
}

/// Write a file with specific Unix permissions, creating parents as needed.
pub fn write_mode<P: AsRef<Path>, C: AsRef<[u8]>>(path: P, content: C, mode: u32) -> Result<()> {
    let path = path.as_ref();
    write_with_dirs(path, content)?;
    fs::set_permissions(path, fs::Permissions::from_mode(mode))
        .with_context(|| format!("Failed to set mode on {}", path.display()))?;
    Ok(())
}

/// Copy a file into place, creating the destination's parents as needed.
pub fn copy_with_dirs(src: &Path, dest: &Path) -> Result<u64> {
    if let Some(parent) = dest.parent() {
        fs::create_dir_all(parent)
            .with_context(|| format!("Failed to create {}", parent.display()))?;
    }
    fs::copy(src, dest)
        .with_context(|| format!("Failed to copy {} to {}", src.display(), dest.display()))
}

/// Create a fresh work directory, removing any leftover from a previous run.
pub fn prepare_work_dir(parent: &Path, name: &str) -> Result<PathBuf> {
    let work_dir = parent.join(name);
    if work_dir.exists() {
        fs::remove_dir_all(&work_dir)
            .with_context(|| format!("Failed to clear {}", work_dir.display()))?;
    }
    fs::create_dir_all(&work_dir)
        .with_context(|| format!("Failed to create {}", work_dir.display()))?;
    Ok(work_dir)
}

/// Remove a work directory. Idempotent; a missing directory is fine.
pub fn cleanup_work_dir(path: &Path) {
    let _ = fs::remove_dir_all(path);
}
