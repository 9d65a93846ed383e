//! AppArmor profile loading.

use anyhow::{Context, Result};
use std::fs;

use crate::config::WardenConfig;
use crate::process::Cmd;

/// Load (or replace) every profile in the configured profile directory.
///
/// An absent directory means the image ships no profiles for us to manage;
/// that is recorded and skipped, not an error. A profile that fails to load
/// is an error naming the profile file.
pub fn load_profiles(config: &WardenConfig) -> Result<usize> {
    let dir = &config.apparmor_dir;
    if !dir.exists() {
        log::info!("no AppArmor profile directory at {}, skipping", dir.display());
        return Ok(0);
    }

    let mut profiles: Vec<_> = fs::read_dir(dir)
        .with_context(|| format!("Failed to read {}", dir.display()))?
        .filter_map(|entry| entry.ok())
        .map(|entry| entry.path())
        .filter(|path| path.is_file())
        .collect();
    profiles.sort();

    for profile in &profiles {
        Cmd::new("apparmor_parser")
            .arg("-r")
            .arg_path(profile)
            .error_msg(format!("AppArmor profile load failed for {}", profile.display()))
            .run()?;
        log::debug!("loaded AppArmor profile {}", profile.display());
    }

    Ok(profiles.len())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_absent_profile_dir_is_skipped() {
        let tmp = TempDir::new().unwrap();
        let config = WardenConfig::for_root(tmp.path());
        assert_eq!(load_profiles(&config).unwrap(), 0);
    }

    #[test]
    fn test_empty_profile_dir_loads_nothing() {
        let tmp = TempDir::new().unwrap();
        let config = WardenConfig::for_root(tmp.path());
        fs::create_dir_all(&config.apparmor_dir).unwrap();
        assert_eq!(load_profiles(&config).unwrap(), 0);
    }
}
