//! Read-only forensic capture.
//!
//! Collects a point-in-time picture of the system into an append-only log:
//! rootkit scan output, recently modified files, the process table, open
//! network connections, authentication failures, and basic resource state
//! with anomaly flags. Nothing on the system is mutated; the output file is
//! the only write.

use std::fmt::Write as _;
use std::fs::{self, OpenOptions};
use std::io::Write as _;
use std::path::Path;
use std::time::{Duration, SystemTime};

use anyhow::{Context, Result};
use walkdir::WalkDir;

use crate::config::WardenConfig;
use crate::integrity::{IntegrityVerifier, ScanOutcome};
use crate::logging;
use crate::process::Cmd;

/// Modification window for the "recently modified" section.
const RECENT_WINDOW: Duration = Duration::from_secs(48 * 3600);
/// Entry cap for the "recently modified" section.
const RECENT_CAP: usize = 200;
/// Keep the last N matching authentication-failure lines.
const AUTH_TAIL: usize = 50;

const LOAD_PER_CORE_LIMIT: f64 = 0.8;
const MEMORY_USED_LIMIT: f64 = 85.0;
const DISK_USED_LIMIT: u32 = 90;

pub struct ForensicCollector<'a> {
    config: &'a WardenConfig,
}

impl<'a> ForensicCollector<'a> {
    pub fn new(config: &'a WardenConfig) -> Self {
        Self { config }
    }

    /// Append a full capture to `out`, creating it if needed.
    pub fn collect(&self, out: &Path) -> Result<()> {
        let mut report = String::new();
        let _ = writeln!(report, "=== forensic capture {} ===", logging::log_stamp());
        let _ = writeln!(report);

        self.rootkit_section(&mut report);
        self.recent_files_section(&mut report);
        command_section(&mut report, "running processes", "ps", &["aux"]);
        command_section(&mut report, "network connections", "ss", &["-tunap"]);
        self.auth_failures_section(&mut report);
        self.system_state_section(&mut report);

        if let Some(parent) = out.parent() {
            fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create {}", parent.display()))?;
        }
        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(out)
            .with_context(|| format!("Failed to open {}", out.display()))?;
        file.write_all(report.as_bytes())
            .with_context(|| format!("Failed to write {}", out.display()))?;
        Ok(())
    }

    fn rootkit_section(&self, report: &mut String) {
        let _ = writeln!(report, "--- rootkit scan ---");
        let verifier = IntegrityVerifier::new(self.config);
        match verifier.scan_for_rootkit() {
            ScanOutcome::Clean => {
                let _ = writeln!(report, "scan clean");
            }
            ScanOutcome::Positive(findings) => {
                let _ = writeln!(report, "POSITIVE: {findings}");
            }
            ScanOutcome::Unavailable(reason) => {
                let _ = writeln!(report, "(scanner unavailable: {reason})");
            }
        }
        let _ = writeln!(report);
    }

    fn recent_files_section(&self, report: &mut String) {
        let _ = writeln!(
            report,
            "--- files modified in the last {}h ---",
            RECENT_WINDOW.as_secs() / 3600
        );
        let now = SystemTime::now();
        let mut listed = 0usize;
        let mut truncated = false;

        'dirs: for dir in &self.config.forensic_scan_dirs {
            if !dir.exists() {
                continue;
            }
            for ent in WalkDir::new(dir)
                .follow_links(false)
                .into_iter()
                .filter_map(Result::ok)
            {
                if !ent.file_type().is_file() {
                    continue;
                }
                let recent = ent
                    .metadata()
                    .ok()
                    .and_then(|md| md.modified().ok())
                    .and_then(|mtime| now.duration_since(mtime).ok())
                    .map(|age| age <= RECENT_WINDOW)
                    .unwrap_or(false);
                if !recent {
                    continue;
                }
                if listed == RECENT_CAP {
                    truncated = true;
                    break 'dirs;
                }
                let _ = writeln!(report, "{}", ent.path().display());
                listed += 1;
            }
        }

        if truncated {
            let _ = writeln!(report, "(truncated at {RECENT_CAP} entries)");
        } else if listed == 0 {
            let _ = writeln!(report, "(none)");
        }
        let _ = writeln!(report);
    }

    fn auth_failures_section(&self, report: &mut String) {
        let _ = writeln!(report, "--- authentication failures ---");
        match fs::read_to_string(&self.config.auth_log) {
            Ok(content) => {
                let matches: Vec<&str> = content
                    .lines()
                    .filter(|line| {
                        line.contains("Failed password")
                            || line.contains("authentication failure")
                            || line.contains("Invalid user")
                    })
                    .collect();
                let start = matches.len().saturating_sub(AUTH_TAIL);
                if matches.is_empty() {
                    let _ = writeln!(report, "(none)");
                } else {
                    for line in &matches[start..] {
                        let _ = writeln!(report, "{line}");
                    }
                }
            }
            Err(_) => {
                let _ = writeln!(
                    report,
                    "(auth log not readable: {})",
                    self.config.auth_log.display()
                );
            }
        }
        let _ = writeln!(report);
    }

    fn system_state_section(&self, report: &mut String) {
        let _ = writeln!(report, "--- system state ---");
        let root = &self.config.system_root;

        if let Ok(loadavg) = fs::read_to_string(root.join("proc/loadavg")) {
            let cores = core_count(root);
            let load1 = loadavg
                .split_whitespace()
                .next()
                .and_then(|v| v.parse::<f64>().ok());
            match load1 {
                Some(load) => {
                    let _ = writeln!(report, "load average (1m): {load:.2} on {cores} cores");
                    if load > LOAD_PER_CORE_LIMIT * cores as f64 {
                        let _ = writeln!(
                            report,
                            "ANOMALY: load {load:.2} exceeds {:.0}% of {cores} cores",
                            LOAD_PER_CORE_LIMIT * 100.0
                        );
                    }
                }
                None => {
                    let _ = writeln!(report, "load average: {}", loadavg.trim());
                }
            }
        }

        if let Some((total, available)) = meminfo_kb(root) {
            let used = 100.0 * (1.0 - available as f64 / total as f64);
            let _ = writeln!(report, "memory: {used:.0}% used ({total} kB total)");
            if used > MEMORY_USED_LIMIT {
                let _ = writeln!(
                    report,
                    "ANOMALY: memory use {used:.0}% exceeds {MEMORY_USED_LIMIT:.0}%"
                );
            }
        }

        match Cmd::new("df").arg("-P").allow_fail().run() {
            Ok(result) if result.success() => {
                for line in result.stdout.lines().skip(1) {
                    let fields: Vec<&str> = line.split_whitespace().collect();
                    if fields.len() < 6 {
                        continue;
                    }
                    let used: Option<u32> = fields[4].trim_end_matches('%').parse().ok();
                    if let Some(pct) = used {
                        if pct > DISK_USED_LIMIT {
                            let _ = writeln!(
                                report,
                                "ANOMALY: {} at {pct}% capacity (limit {DISK_USED_LIMIT}%)",
                                fields[5]
                            );
                        }
                    }
                }
                let _ = writeln!(report, "disk capacity checked ({} filesystems)",
                    result.stdout.lines().skip(1).count());
            }
            _ => {
                let _ = writeln!(report, "(df unavailable)");
            }
        }
        let _ = writeln!(report);
    }
}

fn command_section(report: &mut String, title: &str, program: &str, args: &[&str]) {
    let _ = writeln!(report, "--- {title} ---");
    match Cmd::new(program).args(args).allow_fail().run() {
        Ok(result) if result.success() => {
            let _ = writeln!(report, "{}", result.stdout_trimmed());
        }
        Ok(result) => {
            let _ = writeln!(
                report,
                "({program} exited with code {}: {})",
                result.code(),
                result.stderr_trimmed()
            );
        }
        Err(err) => {
            let _ = writeln!(report, "({program} unavailable: {err:#})");
        }
    }
    let _ = writeln!(report);
}

fn core_count(root: &Path) -> usize {
    fs::read_to_string(root.join("proc/cpuinfo"))
        .map(|content| {
            content
                .lines()
                .filter(|line| line.starts_with("processor"))
                .count()
        })
        .ok()
        .filter(|&n| n > 0)
        .unwrap_or(1)
}

fn meminfo_kb(root: &Path) -> Option<(u64, u64)> {
    let content = fs::read_to_string(root.join("proc/meminfo")).ok()?;
    let field = |name: &str| -> Option<u64> {
        content
            .lines()
            .find(|line| line.starts_with(name))?
            .split_whitespace()
            .nth(1)?
            .parse()
            .ok()
    };
    Some((field("MemTotal:")?, field("MemAvailable:")?))
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn write_proc(root: &Path, loadavg: &str, mem_total: u64, mem_available: u64) {
        fs::create_dir_all(root.join("proc")).unwrap();
        fs::write(root.join("proc/loadavg"), loadavg).unwrap();
        fs::write(
            root.join("proc/cpuinfo"),
            "processor\t: 0\nprocessor\t: 1\n",
        )
        .unwrap();
        fs::write(
            root.join("proc/meminfo"),
            format!("MemTotal:       {mem_total} kB\nMemAvailable:   {mem_available} kB\n"),
        )
        .unwrap();
    }

    #[test]
    fn test_collect_writes_all_sections() {
        let tmp = TempDir::new().unwrap();
        let config = WardenConfig::for_root(tmp.path());
        write_proc(tmp.path(), "0.10 0.05 0.01 1/100 4242\n", 1_000_000, 800_000);

        let out = tmp.path().join("forensic.log");
        ForensicCollector::new(&config).collect(&out).unwrap();

        let report = fs::read_to_string(&out).unwrap();
        assert!(report.contains("=== forensic capture "));
        assert!(report.contains("--- rootkit scan ---"));
        assert!(report.contains("--- running processes ---"));
        assert!(report.contains("--- network connections ---"));
        assert!(report.contains("--- authentication failures ---"));
        assert!(report.contains("--- system state ---"));
    }

    #[test]
    fn test_collect_appends_not_truncates() {
        let tmp = TempDir::new().unwrap();
        let config = WardenConfig::for_root(tmp.path());
        let out = tmp.path().join("forensic.log");

        let collector = ForensicCollector::new(&config);
        collector.collect(&out).unwrap();
        collector.collect(&out).unwrap();

        let report = fs::read_to_string(&out).unwrap();
        assert_eq!(report.matches("=== forensic capture ").count(), 2);
    }

    #[test]
    fn test_load_anomaly_flagged() {
        let tmp = TempDir::new().unwrap();
        let config = WardenConfig::for_root(tmp.path());
        // 2 cores, 1-minute load 3.9: well past the 80% line.
        write_proc(tmp.path(), "3.90 2.50 1.10 5/100 4242\n", 1_000_000, 900_000);

        let out = tmp.path().join("forensic.log");
        ForensicCollector::new(&config).collect(&out).unwrap();

        let report = fs::read_to_string(&out).unwrap();
        assert!(report.contains("ANOMALY: load 3.90"));
    }

    #[test]
    fn test_memory_anomaly_flagged() {
        let tmp = TempDir::new().unwrap();
        let config = WardenConfig::for_root(tmp.path());
        // 95% used.
        write_proc(tmp.path(), "0.10 0.05 0.01 1/100 4242\n", 1_000_000, 50_000);

        let out = tmp.path().join("forensic.log");
        ForensicCollector::new(&config).collect(&out).unwrap();

        let report = fs::read_to_string(&out).unwrap();
        assert!(report.contains("ANOMALY: memory use 95%"));
    }

    #[test]
    fn test_auth_failures_filtered() {
        let tmp = TempDir::new().unwrap();
        let config = WardenConfig::for_root(tmp.path());
        fs::create_dir_all(tmp.path().join("var/log")).unwrap();
        fs::write(
            &config.auth_log,
            "Jan 1 session opened for user pi\n\
             Jan 1 Failed password for root from 10.0.0.9\n\
             Jan 1 Invalid user admin from 10.0.0.9\n\
             Jan 1 session closed for user pi\n",
        )
        .unwrap();

        let out = tmp.path().join("forensic.log");
        ForensicCollector::new(&config).collect(&out).unwrap();

        let report = fs::read_to_string(&out).unwrap();
        assert!(report.contains("Failed password for root"));
        assert!(report.contains("Invalid user admin"));
        assert!(!report.contains("session opened"));
    }

    #[test]
    fn test_recent_files_listed() {
        let tmp = TempDir::new().unwrap();
        let config = WardenConfig::for_root(tmp.path());
        fs::create_dir_all(tmp.path().join("etc")).unwrap();
        fs::write(tmp.path().join("etc/fresh.conf"), "x").unwrap();

        let out = tmp.path().join("forensic.log");
        ForensicCollector::new(&config).collect(&out).unwrap();

        let report = fs::read_to_string(&out).unwrap();
        assert!(report.contains("etc/fresh.conf"));
    }
}
