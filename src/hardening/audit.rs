//! Audit rule set: watches on security-sensitive files, privileged syscall
//! monitoring, and execution tracking for account/module management tools.

use anyhow::Result;
use std::path::Path;

use crate::fsutil;
use crate::process::Cmd;

/// Fixed rule list, in load order. Starts with `-D` so loading the set twice
/// leaves the same rules active rather than doubling them.
pub const AUDIT_RULES: &[&str] = &[
    // Reset, buffer sizing, keep running on overload
    "-D",
    "-b 8192",
    "-f 1",
    // Credential stores and account files
    "-w /etc/shadow -p wa -k identity",
    "-w /etc/gshadow -p wa -k identity",
    "-w /etc/passwd -p wa -k identity",
    "-w /etc/group -p wa -k identity",
    "-w /etc/sudoers -p wa -k privilege",
    "-w /etc/sudoers.d -p wa -k privilege",
    // SSH policy and our own configuration
    "-w /etc/ssh/sshd_config -p wa -k sshd-policy",
    "-w /etc/warden -p wa -k warden-config",
    // Privileged execution and mount activity
    "-a always,exit -F arch=b64 -S execve -F euid=0 -k root-exec",
    "-a always,exit -F arch=b32 -S execve -F euid=0 -k root-exec",
    "-a always,exit -F arch=b64 -S mount,umount2 -k mounts",
    "-a always,exit -F arch=b32 -S mount,umount2 -k mounts",
    // Clock manipulation
    "-a always,exit -F arch=b64 -S adjtimex,settimeofday,clock_settime -k time-change",
    "-a always,exit -F arch=b32 -S adjtimex,settimeofday,clock_settime -k time-change",
    // Account and kernel-module management binaries
    "-w /usr/sbin/useradd -p x -k account-tools",
    "-w /usr/sbin/usermod -p x -k account-tools",
    "-w /usr/sbin/userdel -p x -k account-tools",
    "-w /usr/sbin/groupadd -p x -k account-tools",
    "-w /usr/sbin/groupmod -p x -k account-tools",
    "-w /usr/sbin/groupdel -p x -k account-tools",
    "-w /sbin/insmod -p x -k modules",
    "-w /sbin/rmmod -p x -k modules",
    "-w /sbin/modprobe -p x -k modules",
];

pub struct AuditRuleSet {
    rules: Vec<String>,
}

impl AuditRuleSet {
    pub fn standard() -> Self {
        Self {
            rules: AUDIT_RULES.iter().map(|r| r.to_string()).collect(),
        }
    }

    pub fn rules(&self) -> &[String] {
        &self.rules
    }

    /// Render the rules file. Deterministic: no timestamps, fixed order.
    pub fn render(&self) -> String {
        let mut out = String::from(
            "# Audit rules.\n\
             # Rewritten on every hardening run; local edits are discarded.\n\n",
        );
        for rule in &self.rules {
            out.push_str(rule);
            out.push('\n');
        }
        out
    }

    /// Write the rules file, replacing whatever is there.
    pub fn install(&self, path: &Path) -> Result<()> {
        fsutil::write_with_dirs(path, self.render())
    }

    /// Load the rules file into the running audit subsystem.
    pub fn load(&self, path: &Path) -> Result<()> {
        Cmd::new("auditctl")
            .arg("-R")
            .arg_path(path)
            .error_msg(format!("audit rule load failed for {}", path.display()))
            .run()?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_render_is_deterministic() {
        let a = AuditRuleSet::standard().render();
        let b = AuditRuleSet::standard().render();
        assert_eq!(a, b);
    }

    #[test]
    fn test_rules_start_with_reset() {
        let set = AuditRuleSet::standard();
        assert_eq!(set.rules()[0], "-D");
    }

    #[test]
    fn test_watches_cover_credential_stores() {
        let text = AuditRuleSet::standard().render();
        assert!(text.contains("-w /etc/shadow -p wa"));
        assert!(text.contains("-w /etc/gshadow -p wa"));
        assert!(text.contains("-w /etc/sudoers -p wa"));
        assert!(text.contains("-w /etc/warden -p wa"));
    }

    #[test]
    fn test_syscall_rules_cover_both_arches() {
        let text = AuditRuleSet::standard().render();
        for arch in ["b64", "b32"] {
            assert!(text.contains(&format!("arch={arch} -S execve -F euid=0")));
            assert!(text.contains(&format!("arch={arch} -S mount,umount2")));
        }
    }
}
