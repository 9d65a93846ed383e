//! System hardening: restrictive remounts, kernel parameters, SSH policy,
//! audit rules, AppArmor profiles.
//!
//! Every operation is independently idempotent and individually retryable.
//! Generated files are full replacements of their targets, and live
//! application never appends (audit rules reset first, sysctl writes are
//! absolute). There is no transactional rollback across operations: a failed
//! sub-step leaves earlier sub-steps applied.

pub mod apparmor;
pub mod audit;
pub mod ssh;
pub mod sysctl;

pub use audit::AuditRuleSet;
pub use sysctl::SysctlParameterSet;

use anyhow::Result;

use crate::config::WardenConfig;
use crate::process::Cmd;

/// Mount points forced to `noexec,nosuid,nodev` at boot.
pub const REMOUNT_POINTS: &[&str] = &["/tmp", "/var/tmp", "/dev/shm"];

const REMOUNT_FLAGS: &str = "remount,noexec,nosuid,nodev";

pub struct HardeningApplier<'a> {
    config: &'a WardenConfig,
}

impl<'a> HardeningApplier<'a> {
    pub fn new(config: &'a WardenConfig) -> Self {
        Self { config }
    }

    /// Remount one mount point with the restrictive flag set.
    pub fn remount(&self, mount_point: &str) -> Result<()> {
        Cmd::new("mount")
            .args(["-o", REMOUNT_FLAGS])
            .arg(mount_point)
            .error_msg(format!("remount of {} failed", mount_point))
            .run()?;
        Ok(())
    }

    /// Write the kernel parameter file and apply every key to the running
    /// kernel.
    pub fn apply_sysctl(&self) -> Result<()> {
        let set = SysctlParameterSet::standard();
        set.install(&self.config.sysctl_conf)?;
        set.apply_live()
    }

    /// Overwrite the SSH daemon configuration with the hardened policy.
    pub fn apply_ssh_policy(&self) -> Result<()> {
        ssh::install(self.config)
    }

    /// Write the audit rules file and load it into the audit subsystem.
    pub fn apply_audit_rules(&self) -> Result<()> {
        let rules = AuditRuleSet::standard();
        rules.install(&self.config.audit_rules)?;
        rules.load(&self.config.audit_rules)
    }

    /// Load AppArmor profiles from the configured directory.
    pub fn load_apparmor_profiles(&self) -> Result<()> {
        let loaded = apparmor::load_profiles(self.config)?;
        if loaded > 0 {
            log::info!("loaded {} AppArmor profile(s)", loaded);
        }
        Ok(())
    }
}
