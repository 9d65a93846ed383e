//! Firmware update pipeline with automatic rollback.
//!
//! Stage order is fixed: back up the installed firmware, fetch the bundle
//! into a work directory, copy it into place, then verify. A failed
//! verification restores the backup taken at the start; the work directory is
//! removed on every terminal path, success or not.
//!
//! Acceptance is presence-only: the update is verified when every critical
//! file exists in its installed location. Content attestation is the boot
//! pipeline's job, on the next boot.

use std::path::Path;
use std::time::Duration;

use anyhow::{anyhow, Result};

use crate::backup::{BackupKind, BackupManager};
use crate::config::WardenConfig;
use crate::errors::WardenError;
use crate::fsutil;
use crate::process::Cmd;

/// What an update installs: the source to fetch from, the files to place,
/// and the subset whose presence decides acceptance.
#[derive(Debug, Clone)]
pub struct FirmwareBundle {
    pub source: String,
    pub boot_files: Vec<String>,
    pub lib_files: Vec<String>,
    pub critical_files: Vec<String>,
}

impl FirmwareBundle {
    pub fn from_config(config: &WardenConfig) -> Self {
        Self {
            source: config.firmware_source.clone(),
            boot_files: config.firmware_boot_files.clone(),
            lib_files: config.firmware_lib_files.clone(),
            critical_files: config.firmware_critical_files.clone(),
        }
    }

    /// All files the bundle carries, boot files first.
    pub fn files(&self) -> impl Iterator<Item = &str> {
        self.boot_files
            .iter()
            .chain(self.lib_files.iter())
            .map(String::as_str)
    }

    pub fn file_count(&self) -> usize {
        self.boot_files.len() + self.lib_files.len()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UpdateOutcome {
    /// New firmware applied and verified.
    Updated,
    /// Verification failed; the previously installed firmware was restored.
    RolledBack,
}

pub struct FirmwareUpdater<'a> {
    config: &'a WardenConfig,
    bundle: FirmwareBundle,
}

impl<'a> FirmwareUpdater<'a> {
    pub fn new(config: &'a WardenConfig) -> Self {
        Self {
            config,
            bundle: FirmwareBundle::from_config(config),
        }
    }

    pub fn bundle(&self) -> &FirmwareBundle {
        &self.bundle
    }

    /// Run the full update pipeline.
    pub fn run(&self) -> Result<UpdateOutcome> {
        let work = fsutil::prepare_work_dir(&self.config.state_dir, "firmware-work")?;
        let result = self.run_stages(&work);
        fsutil::cleanup_work_dir(&work);
        result
    }

    fn run_stages(&self, work: &Path) -> Result<UpdateOutcome> {
        self.backup_installed()?;
        self.download(work)?;
        self.apply(work)?;

        let missing = self.missing_critical_files();
        if missing.is_empty() {
            log::info!(
                "firmware update verified: {} critical files present",
                self.bundle.critical_files.len()
            );
            return Ok(UpdateOutcome::Updated);
        }

        log::error!("{}", WardenError::Verification { missing });
        log::warn!("rolling back to previous firmware");
        self.rollback()?;
        Ok(UpdateOutcome::RolledBack)
    }

    /// Snapshot the installed firmware before anything is mutated. A system
    /// with no firmware yet has nothing to snapshot; the update proceeds, but
    /// without a rollback path.
    fn backup_installed(&self) -> Result<()> {
        let manager = BackupManager::new(self.config);
        if !manager
            .sources(BackupKind::Firmware)
            .iter()
            .any(|path| path.exists())
        {
            log::warn!("no installed firmware to back up; rollback will be unavailable");
            return Ok(());
        }
        manager.create_backup(BackupKind::Firmware)?;
        Ok(())
    }

    /// Sparse fetch: one request per file, never a full repository clone.
    /// A directory path as the source serves the files locally.
    fn download(&self, work: &Path) -> Result<()> {
        let source = self.bundle.source.as_str();
        let local = Path::new(source);

        if local.is_dir() {
            for name in self.bundle.files() {
                let from = local.join(name);
                if !from.exists() {
                    return Err(WardenError::Download(format!(
                        "{} not found in {}",
                        name,
                        local.display()
                    ))
                    .into());
                }
                fsutil::copy_with_dirs(&from, &work.join(name))?;
            }
            log::info!(
                "copied {} firmware files from {}",
                self.bundle.file_count(),
                local.display()
            );
            return Ok(());
        }

        for name in self.bundle.files() {
            let url = format!("{}/{}", source.trim_end_matches('/'), name);
            self.fetch(&url, &work.join(name))
                .map_err(|err| WardenError::Download(format!("{name}: {err:#}")))?;
        }
        log::info!(
            "downloaded {} firmware files from {}",
            self.bundle.file_count(),
            source
        );
        Ok(())
    }

    fn fetch(&self, url: &str, dest: &Path) -> Result<()> {
        let attempts = self.config.download_retries.max(1);
        let mut last_err = None;
        for attempt in 1..=attempts {
            let result = Cmd::new("curl")
                .args(["-fsSL", "-o"])
                .arg_path(dest)
                .arg(url)
                .timeout(Duration::from_secs(self.config.download_timeout_secs))
                .error_msg(format!("fetch failed for {url}"))
                .run();
            match result {
                Ok(_) => return Ok(()),
                Err(err) => {
                    if attempt < attempts {
                        log::warn!("download attempt {attempt}/{attempts} failed for {url}; retrying");
                    }
                    last_err = Some(err);
                }
            }
        }
        Err(last_err.unwrap_or_else(|| anyhow!("download failed for {url}")))
    }

    /// Copy fetched files into their live locations and refresh the linker
    /// cache when shared libraries were replaced.
    fn apply(&self, work: &Path) -> Result<()> {
        for name in &self.bundle.boot_files {
            fsutil::copy_with_dirs(&work.join(name), &self.config.boot_dir.join(name))?;
        }
        for name in &self.bundle.lib_files {
            fsutil::copy_with_dirs(&work.join(name), &self.config.firmware_lib_dir.join(name))?;
        }
        log::info!("applied {} firmware files", self.bundle.file_count());

        if !self.bundle.lib_files.is_empty() {
            self.refresh_linker_cache()?;
        }
        Ok(())
    }

    /// Critical files absent from their installed locations, in bundle order.
    fn missing_critical_files(&self) -> Vec<String> {
        self.bundle
            .critical_files
            .iter()
            .filter(|name| {
                let in_lib = self.bundle.lib_files.iter().any(|lib| lib == *name);
                let installed = if in_lib {
                    self.config.firmware_lib_dir.join(name)
                } else {
                    self.config.boot_dir.join(name)
                };
                !installed.exists()
            })
            .cloned()
            .collect()
    }

    fn rollback(&self) -> Result<()> {
        let manager = BackupManager::new(self.config);
        if !manager.is_valid(BackupKind::Firmware) {
            return Err(WardenError::Rollback(
                "no firmware backup archive to restore; manual intervention required".to_string(),
            )
            .into());
        }
        let restored = manager.restore_backup(BackupKind::Firmware)?;
        if !self.bundle.lib_files.is_empty() {
            self.refresh_linker_cache()?;
        }
        log::info!("rollback complete: {restored} files restored");
        Ok(())
    }

    fn refresh_linker_cache(&self) -> Result<()> {
        let mut cmd = Cmd::new("ldconfig");
        if self.config.system_root != Path::new("/") {
            cmd = cmd.arg("-r").arg_path(&self.config.system_root);
        }
        cmd.error_msg("linker cache refresh failed").run()?;
        Ok(())
    }
}
