//! Mode-dispatched recovery state machine.
//!
//! One mode per invocation: basic repair, advanced repair, or forensic
//! analysis. The controller first mounts the recovery area and redirects log
//! output under it, then runs the selected mode's stages, and always ends in
//! `Completed` or `Failed`. Selector validation happens before the controller
//! is even constructed; an unknown selector must cause no side effects.

use std::fmt;
use std::fs;
use std::path::PathBuf;

use anyhow::{bail, Context, Result};

use crate::backup::{BackupKind, BackupManager};
use crate::config::WardenConfig;
use crate::errors::WardenError;
use crate::forensic::ForensicCollector;
use crate::logging;
use crate::process::Cmd;
use crate::stage::{Pipeline, Stage, StageResult};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RecoveryMode {
    Basic,
    Advanced,
    Forensic,
}

impl RecoveryMode {
    /// Parse the operator's selector: `1`, `2`, or `3`. Anything else is a
    /// usage error for the caller to report; there is no default mode.
    pub fn from_selector(selector: &str) -> Option<Self> {
        match selector.trim() {
            "1" => Some(RecoveryMode::Basic),
            "2" => Some(RecoveryMode::Advanced),
            "3" => Some(RecoveryMode::Forensic),
            _ => None,
        }
    }

    pub fn describe(&self) -> &'static str {
        match self {
            RecoveryMode::Basic => "basic repair (filesystem and package database)",
            RecoveryMode::Advanced => "advanced repair (restore backups, rebuild boot files)",
            RecoveryMode::Forensic => "forensic analysis (read-only capture)",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RecoveryState {
    Uninitialized,
    Initialized,
    BasicRepair,
    AdvancedRepair,
    ForensicAnalysis,
    Completed,
    Failed,
}

impl fmt::Display for RecoveryState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            RecoveryState::Uninitialized => "uninitialized",
            RecoveryState::Initialized => "initialized",
            RecoveryState::BasicRepair => "basic-repair",
            RecoveryState::AdvancedRepair => "advanced-repair",
            RecoveryState::ForensicAnalysis => "forensic-analysis",
            RecoveryState::Completed => "completed",
            RecoveryState::Failed => "failed",
        };
        f.write_str(name)
    }
}

pub struct RecoveryController<'a> {
    config: &'a WardenConfig,
    state: RecoveryState,
}

impl<'a> RecoveryController<'a> {
    pub fn new(config: &'a WardenConfig) -> Self {
        Self {
            config,
            state: RecoveryState::Uninitialized,
        }
    }

    pub fn state(&self) -> RecoveryState {
        self.state
    }

    fn transition(&mut self, next: RecoveryState) {
        log::info!("recovery state: {} -> {}", self.state, next);
        self.state = next;
    }

    /// Run one recovery invocation. Ends in `Completed` or `Failed`; the log
    /// file sink attached during initialization is detached on every path.
    pub fn run(&mut self, mode: RecoveryMode) -> Result<()> {
        let result = self.execute(mode);
        match &result {
            Ok(()) => self.transition(RecoveryState::Completed),
            Err(err) => {
                log::error!("recovery failed: {err:#}");
                self.transition(RecoveryState::Failed);
            }
        }
        logging::detach_file();
        result
    }

    fn execute(&mut self, mode: RecoveryMode) -> Result<()> {
        self.initialize()?;
        log::info!("mode: {}", mode.describe());
        match mode {
            RecoveryMode::Basic => {
                self.transition(RecoveryState::BasicRepair);
                self.basic_repair()
            }
            RecoveryMode::Advanced => {
                self.transition(RecoveryState::AdvancedRepair);
                self.advanced_repair()
            }
            RecoveryMode::Forensic => {
                self.transition(RecoveryState::ForensicAnalysis);
                let out = self.forensic_analysis()?;
                log::info!("forensic log written: {}", out.display());
                Ok(())
            }
        }
    }

    /// Mount the recovery area and redirect log output under it. A mount
    /// failure is fatal; a log-file failure degrades to console-only. With no
    /// device configured the mount point serves as a plain directory.
    fn initialize(&mut self) -> Result<()> {
        let mount = &self.config.recovery_mount;
        fs::create_dir_all(mount)
            .with_context(|| format!("Failed to create {}", mount.display()))?;
        if let Some(device) = &self.config.recovery_device {
            Cmd::new("mount")
                .arg_path(device)
                .arg_path(mount)
                .error_msg(format!(
                    "could not mount recovery partition {}",
                    device.display()
                ))
                .run()?;
        }

        let log_file = mount
            .join("logs")
            .join(format!("recovery-{}.log", logging::file_stamp()));
        if let Some(parent) = log_file.parent() {
            let _ = fs::create_dir_all(parent);
        }
        match logging::attach_file(&log_file) {
            Ok(()) => log::info!("recovery log: {}", log_file.display()),
            Err(err) => {
                log::warn!("recovery log unavailable ({err:#}); continuing console-only")
            }
        }

        self.transition(RecoveryState::Initialized);
        Ok(())
    }

    fn basic_repair(&self) -> Result<()> {
        let config = self.config;
        let stages = vec![
            Stage::new("check boot filesystem", true, move || {
                fsck_stage(config.boot_device.as_deref(), "boot")
            }),
            Stage::new("check root filesystem", true, move || {
                fsck_stage(config.root_device.as_deref(), "root")
            }),
            Stage::new("verify package database", true, audit_packages),
            Stage::new("repair package database", true, || {
                Cmd::new("dpkg")
                    .args(["--configure", "-a"])
                    .error_msg("package repair failed")
                    .run()
                    .map(|_| ())
                    .into()
            }),
        ];
        self.run_pipeline("Basic Repair", stages)
    }

    fn advanced_repair(&self) -> Result<()> {
        let config = self.config;
        let stages = vec![
            Stage::new("restore configuration backup", false, move || {
                restore_stage(config, BackupKind::Config)
            }),
            Stage::new("restore user backup", false, move || {
                restore_stage(config, BackupKind::User)
            }),
            Stage::new("regenerate initramfs", true, || {
                Cmd::new("update-initramfs")
                    .arg("-u")
                    .error_msg("initramfs regeneration failed")
                    .run()
                    .map(|_| ())
                    .into()
            }),
            Stage::new("update bootloader configuration", true, || {
                Cmd::new("update-grub")
                    .error_msg("bootloader update failed")
                    .run()
                    .map(|_| ())
                    .into()
            }),
        ];
        self.run_pipeline("Advanced Repair", stages)
    }

    fn forensic_analysis(&self) -> Result<PathBuf> {
        let out = self
            .config
            .recovery_mount
            .join("logs")
            .join(format!("forensic-{}.log", logging::file_stamp()));
        ForensicCollector::new(self.config).collect(&out)?;
        Ok(out)
    }

    fn run_pipeline(&self, name: &str, stages: Vec<Stage>) -> Result<()> {
        let report = Pipeline::new(name, stages)?.run();
        if let Some(halt) = &report.halted {
            bail!("{} halted at '{}': {}", report.pipeline, halt.stage, halt.reason);
        }
        if report.warning_count() > 0 {
            log::warn!(
                "{} finished with {} non-fatal failures",
                report.pipeline,
                report.warning_count()
            );
        }
        Ok(())
    }
}

/// Consistency-check one partition. fsck exit 1 means errors were found and
/// corrected, which still counts as a successful repair.
fn fsck_stage(device: Option<&std::path::Path>, label: &str) -> StageResult {
    let Some(device) = device else {
        log::info!("no {label} device configured; skipping consistency check");
        return StageResult::Success;
    };
    match Cmd::new("fsck")
        .arg("-y")
        .arg_path(device)
        .allow_fail()
        .run()
    {
        Err(err) => StageResult::failure(format!("{err:#}")),
        Ok(result) if result.code() <= 1 => {
            if result.code() == 1 {
                log::info!("{label} filesystem: errors found and corrected");
            }
            StageResult::Success
        }
        Ok(result) => StageResult::failure(format!(
            "fsck on {} exited with code {}",
            device.display(),
            result.code()
        )),
    }
}

fn audit_packages() -> StageResult {
    match Cmd::new("dpkg").arg("--audit").allow_fail().run() {
        Err(err) => StageResult::failure(format!("{err:#}")),
        Ok(result) if !result.success() => StageResult::failure(format!(
            "dpkg --audit exited with code {}",
            result.code()
        )),
        Ok(result) => {
            if !result.stdout_trimmed().is_empty() {
                log::warn!("package database inconsistencies found; repair follows");
            }
            StageResult::Success
        }
    }
}

/// Best-effort restore: a kind with no recorded backup is a no-op, any other
/// failure is reported.
fn restore_stage(config: &WardenConfig, kind: BackupKind) -> StageResult {
    let manager = BackupManager::new(config);
    match manager.restore_backup(kind) {
        Ok(_) => StageResult::Success,
        Err(err) => match err.downcast_ref::<WardenError>() {
            Some(WardenError::BackupMissing(_)) => {
                log::info!("no {} backup recorded; nothing to restore", kind.as_str());
                StageResult::Success
            }
            _ => StageResult::failure(format!("{err:#}")),
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_selector_accepts_exactly_three_values() {
        assert_eq!(RecoveryMode::from_selector("1"), Some(RecoveryMode::Basic));
        assert_eq!(RecoveryMode::from_selector("2"), Some(RecoveryMode::Advanced));
        assert_eq!(RecoveryMode::from_selector("3"), Some(RecoveryMode::Forensic));
        assert_eq!(RecoveryMode::from_selector("9"), None);
        assert_eq!(RecoveryMode::from_selector("0"), None);
        assert_eq!(RecoveryMode::from_selector(""), None);
        assert_eq!(RecoveryMode::from_selector("basic"), None);
    }

    #[test]
    fn test_state_names() {
        assert_eq!(RecoveryState::Uninitialized.to_string(), "uninitialized");
        assert_eq!(RecoveryState::ForensicAnalysis.to_string(), "forensic-analysis");
    }

    #[test]
    fn test_forensic_run_completes_without_device() {
        let tmp = TempDir::new().unwrap();
        let config = WardenConfig::for_root(tmp.path());

        let mut controller = RecoveryController::new(&config);
        controller.run(RecoveryMode::Forensic).unwrap();
        assert_eq!(controller.state(), RecoveryState::Completed);

        let logs: Vec<_> = fs::read_dir(config.recovery_mount.join("logs"))
            .unwrap()
            .filter_map(Result::ok)
            .map(|e| e.file_name().to_string_lossy().into_owned())
            .collect();
        assert!(logs.iter().any(|name| name.starts_with("forensic-")));
        assert!(logs.iter().any(|name| name.starts_with("recovery-")));
    }

    #[test]
    fn test_unmountable_device_ends_failed() {
        let tmp = TempDir::new().unwrap();
        let mut config = WardenConfig::for_root(tmp.path());
        // A character device can never be mounted.
        config.recovery_device = Some(PathBuf::from("/dev/null"));

        let mut controller = RecoveryController::new(&config);
        let err = controller.run(RecoveryMode::Basic).unwrap_err();
        assert_eq!(controller.state(), RecoveryState::Failed);
        assert!(err.to_string().contains("recovery partition"));
    }

    #[test]
    fn test_restore_stage_without_backup_is_noop() {
        let tmp = TempDir::new().unwrap();
        let config = WardenConfig::for_root(tmp.path());
        assert_eq!(
            restore_stage(&config, BackupKind::Config),
            StageResult::Success
        );
    }

    #[test]
    fn test_restore_stage_surfaces_real_failures() {
        let tmp = TempDir::new().unwrap();
        let config = WardenConfig::for_root(tmp.path());
        // A non-empty file that is not a valid archive.
        fs::create_dir_all(&config.backup_dir).unwrap();
        fs::write(
            config.backup_dir.join(BackupKind::Config.archive_name()),
            b"not an archive",
        )
        .unwrap();

        match restore_stage(&config, BackupKind::Config) {
            StageResult::Failure(_) => {}
            StageResult::Success => panic!("corrupt archive must not restore cleanly"),
        }
    }

    #[test]
    fn test_fsck_stage_skips_without_device() {
        assert_eq!(fsck_stage(None, "boot"), StageResult::Success);
    }
}
