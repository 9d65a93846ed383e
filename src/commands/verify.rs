//! Verify command - standalone integrity report.
//!
//! Runs the three integrity checks without applying any hardening, and
//! reports availability of the collaborator tools the pipelines shell out to.
//! Warnings do not fail the report; only a failed check does.

use anyhow::Result;

use crate::config::WardenConfig;
use crate::integrity::{IntegrityVerifier, ScanOutcome};

/// Result of a single verification check.
#[derive(Debug, Clone)]
pub struct CheckResult {
    pub name: String,
    pub status: CheckStatus,
    pub details: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CheckStatus {
    Pass,
    Fail,
    Warn,
}

impl CheckResult {
    fn pass(name: &str) -> Self {
        Self {
            name: name.to_string(),
            status: CheckStatus::Pass,
            details: None,
        }
    }

    fn fail(name: &str, details: String) -> Self {
        Self {
            name: name.to_string(),
            status: CheckStatus::Fail,
            details: Some(details),
        }
    }

    fn warn(name: &str, details: String) -> Self {
        Self {
            name: name.to_string(),
            status: CheckStatus::Warn,
            details: Some(details),
        }
    }
}

/// Results of all verification checks.
pub struct VerifyReport {
    pub checks: Vec<CheckResult>,
}

impl VerifyReport {
    /// True when no check failed. Warnings are allowed.
    pub fn all_passed(&self) -> bool {
        !self.checks.iter().any(|c| c.status == CheckStatus::Fail)
    }

    pub fn print(&self) {
        println!("=== Integrity Report ===\n");
        for check in &self.checks {
            let (icon, label) = match check.status {
                CheckStatus::Pass => ("✓", "PASS"),
                CheckStatus::Fail => ("✗", "FAIL"),
                CheckStatus::Warn => ("⚠", "WARN"),
            };
            match &check.details {
                Some(details) => println!("  {} [{}] {}: {}", icon, label, check.name, details),
                None => println!("  {} [{}] {}", icon, label, check.name),
            }
        }

        let passed = self
            .checks
            .iter()
            .filter(|c| c.status == CheckStatus::Pass)
            .count();
        let failed = self
            .checks
            .iter()
            .filter(|c| c.status == CheckStatus::Fail)
            .count();
        let warned = self
            .checks
            .iter()
            .filter(|c| c.status == CheckStatus::Warn)
            .count();
        println!();
        println!(
            "Summary: {} passed, {} failed, {} warnings ({} total)",
            passed,
            failed,
            warned,
            self.checks.len()
        );
    }
}

/// Collaborator tools the pipelines call. Absence is a warning here; the
/// stage that needs a missing tool will fail when it actually runs.
const COLLABORATOR_TOOLS: &[&str] = &[
    "mount",
    "sysctl",
    "iptables",
    "systemctl",
    "auditctl",
    "apparmor_parser",
    "openssl",
];

/// Execute the verify command. Returns whether every check passed.
pub fn cmd_verify(config: &WardenConfig) -> Result<bool> {
    let report = build_report(config);
    report.print();
    Ok(report.all_passed())
}

fn build_report(config: &WardenConfig) -> VerifyReport {
    let verifier = IntegrityVerifier::new(config);
    let mut checks = Vec::new();

    checks.push(match verifier.verify_kernel() {
        Ok(()) => CheckResult::pass("kernel digest"),
        Err(err) => CheckResult::fail("kernel digest", err.to_string()),
    });

    checks.push(match verifier.verify_boot_partition() {
        Ok(()) => CheckResult::pass("boot partition signature"),
        Err(err) => CheckResult::fail("boot partition signature", err.to_string()),
    });

    checks.push(match verifier.scan_for_rootkit() {
        ScanOutcome::Clean => CheckResult::pass("rootkit scan"),
        ScanOutcome::Positive(hits) => CheckResult::fail("rootkit scan", hits),
        ScanOutcome::Unavailable(reason) => CheckResult::warn("rootkit scan", reason),
    });

    for tool in COLLABORATOR_TOOLS
        .iter()
        .copied()
        .chain(std::iter::once(config.rootkit_scanner.as_str()))
    {
        let name = format!("tool: {tool}");
        checks.push(match which::which(tool) {
            Ok(path) => CheckResult {
                name,
                status: CheckStatus::Pass,
                details: Some(path.display().to_string()),
            },
            Err(_) => CheckResult::warn(&name, "not installed".to_string()),
        });
    }

    VerifyReport { checks }
}
