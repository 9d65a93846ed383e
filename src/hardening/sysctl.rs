//! Kernel parameter hardening set.

use anyhow::{bail, Result};
use std::path::Path;

use crate::fsutil;
use crate::process::Cmd;

/// Fixed parameter set, in file order. ASLR, kernel pointer and dmesg
/// exposure, ptrace scope, core-dump suppression, link protections, and the
/// IPv4 anti-spoofing block.
pub const SYSCTL_PARAMS: &[(&str, &str)] = &[
    ("kernel.randomize_va_space", "2"),
    ("kernel.kptr_restrict", "2"),
    ("kernel.dmesg_restrict", "1"),
    ("kernel.yama.ptrace_scope", "1"),
    ("fs.suid_dumpable", "0"),
    ("fs.protected_symlinks", "1"),
    ("fs.protected_hardlinks", "1"),
    ("net.ipv4.conf.all.rp_filter", "1"),
    ("net.ipv4.conf.default.rp_filter", "1"),
    ("net.ipv4.conf.all.accept_redirects", "0"),
    ("net.ipv4.conf.default.accept_redirects", "0"),
    ("net.ipv4.conf.all.send_redirects", "0"),
    ("net.ipv4.conf.all.accept_source_route", "0"),
    ("net.ipv4.tcp_syncookies", "1"),
    ("net.ipv4.icmp_echo_ignore_broadcasts", "1"),
    ("net.ipv4.conf.all.log_martians", "1"),
];

pub struct SysctlParameterSet {
    params: Vec<(String, String)>,
}

impl SysctlParameterSet {
    pub fn standard() -> Self {
        Self {
            params: SYSCTL_PARAMS
                .iter()
                .map(|(k, v)| (k.to_string(), v.to_string()))
                .collect(),
        }
    }

    pub fn params(&self) -> &[(String, String)] {
        &self.params
    }

    /// Render the sysctl.d file. Stable order, no timestamps: two renders of
    /// the same set are byte-identical.
    pub fn render(&self) -> String {
        let mut out = String::from(
            "# Kernel hardening parameters.\n\
             # Rewritten on every hardening run; local edits are discarded.\n\n",
        );
        for (key, value) in &self.params {
            out.push_str(key);
            out.push_str(" = ");
            out.push_str(value);
            out.push('\n');
        }
        out
    }

    /// Write the rendered set to its sysctl.d location, replacing whatever
    /// is there.
    pub fn install(&self, path: &Path) -> Result<()> {
        fsutil::write_with_dirs(path, self.render())
    }

    /// Apply each parameter to the running kernel, one `sysctl -w` per key so
    /// a failure names the key. All failures are collected before reporting.
    pub fn apply_live(&self) -> Result<()> {
        let mut failed = Vec::new();
        for (key, value) in &self.params {
            let result = Cmd::new("sysctl")
                .arg("-w")
                .arg(format!("{}={}", key, value))
                .allow_fail()
                .run()?;
            if !result.success() {
                log::warn!("sysctl rejected {}: {}", key, result.stderr_trimmed());
                failed.push(key.as_str());
            }
        }
        if !failed.is_empty() {
            bail!("sysctl apply failed for: {}", failed.join(", "));
        }
        Ok(())
    }
}
