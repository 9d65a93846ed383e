//! Boot command - the staged bring-up pipeline.
//!
//! Five phases in fixed order: Integrity Verification, Boot Hardening,
//! Network Security, System Hardening, Service Initialization. Each phase is
//! a pipeline of required stages (plus the few stages the design marks
//! optional); the first required failure halts the phase and ends the run.
//! An integrity halt is reported separately so the caller can drop to the
//! emergency shell instead of exiting.

use std::fs;

use anyhow::Result;

use crate::config::WardenConfig;
use crate::errors::WardenError;
use crate::fsutil;
use crate::hardening::{HardeningApplier, REMOUNT_POINTS};
use crate::integrity::{IntegrityVerifier, ScanOutcome};
use crate::logging;
use crate::network::NetworkSecurityConfigurator;
use crate::services::ServiceInitializer;
use crate::stage::{Halt, Pipeline, Stage, StageResult};

/// How a boot run ended. Policy lives with the caller: an integrity failure
/// means the system cannot be trusted and gets the emergency shell; a later
/// phase failure is reported and the process exits non-zero.
#[derive(Debug)]
pub enum BootOutcome {
    Success,
    IntegrityFailure { stage: String, reason: String },
    PhaseFailure { phase: String, stage: String, reason: String },
}

impl BootOutcome {
    /// Classify a halted run under the failure taxonomy; `None` for success.
    /// An integrity halt is an attestation failure, any later halt is a
    /// configuration failure naming its phase and stage.
    pub fn classify(&self) -> Option<WardenError> {
        match self {
            BootOutcome::Success => None,
            BootOutcome::IntegrityFailure { stage, reason } => {
                Some(WardenError::Integrity(format!("'{stage}': {reason}")))
            }
            BootOutcome::PhaseFailure { phase, stage, reason } => {
                Some(WardenError::Configuration(format!(
                    "{phase} halted at '{stage}': {reason}"
                )))
            }
        }
    }
}

/// Execute the boot command.
pub fn cmd_boot(config: &WardenConfig) -> Result<BootOutcome> {
    log::info!("warden bring-up starting (root {})", config.system_root.display());

    if let Some(halt) = run_phase("Integrity Verification", integrity_stages(config))? {
        return Ok(BootOutcome::IntegrityFailure {
            stage: halt.stage,
            reason: halt.reason,
        });
    }

    let phases = [
        ("Boot Hardening", boot_hardening_stages(config)),
        ("Network Security", network_security_stages(config)),
        ("System Hardening", system_hardening_stages(config)),
        ("Service Initialization", service_stages(config)),
    ];
    for (name, stages) in phases {
        if let Some(halt) = run_phase(name, stages)? {
            return Ok(BootOutcome::PhaseFailure {
                phase: name.to_string(),
                stage: halt.stage,
                reason: halt.reason,
            });
        }
    }

    record_first_boot(config)?;
    log::info!("bring-up complete: system verified and hardened");
    Ok(BootOutcome::Success)
}

fn run_phase(name: &str, stages: Vec<Stage>) -> Result<Option<Halt>> {
    let report = Pipeline::new(name, stages)?.run();
    if report.halted.is_some() {
        report.print();
    }
    Ok(report.halted)
}

fn integrity_stages(config: &WardenConfig) -> Vec<Stage> {
    vec![
        Stage::new("verify kernel digest", true, move || {
            IntegrityVerifier::new(config).verify_kernel().into()
        }),
        Stage::new("verify boot partition signature", true, move || {
            IntegrityVerifier::new(config).verify_boot_partition().into()
        }),
        // The verifier reports three ways; the policy here is that a positive
        // hit is fatal while a missing scanner only warns.
        Stage::new("scan for rootkits", true, move || {
            match IntegrityVerifier::new(config).scan_for_rootkit() {
                ScanOutcome::Clean => StageResult::Success,
                ScanOutcome::Positive(hits) => {
                    StageResult::failure(format!("rootkit scan positive: {hits}"))
                }
                ScanOutcome::Unavailable(reason) => {
                    log::warn!("rootkit scan skipped: {reason}");
                    StageResult::Success
                }
            }
        }),
    ]
}

fn boot_hardening_stages(config: &WardenConfig) -> Vec<Stage> {
    let mut stages: Vec<Stage> = REMOUNT_POINTS
        .iter()
        .map(|mount_point| {
            Stage::new(format!("remount {mount_point}"), true, move || {
                HardeningApplier::new(config).remount(mount_point).into()
            })
        })
        .collect();
    stages.push(Stage::new("install kernel parameters", true, move || {
        HardeningApplier::new(config).apply_sysctl().into()
    }));
    stages
}

fn network_security_stages(config: &WardenConfig) -> Vec<Stage> {
    vec![
        Stage::new("install default-deny firewall", true, move || {
            NetworkSecurityConfigurator::new(config).apply().into()
        }),
        // Persistence is a courtesy to the next boot; the live ruleset is
        // already in effect.
        Stage::new("persist firewall ruleset", false, move || {
            NetworkSecurityConfigurator::new(config).persist().into()
        }),
    ]
}

fn system_hardening_stages(config: &WardenConfig) -> Vec<Stage> {
    vec![
        Stage::new("apply SSH policy", true, move || {
            HardeningApplier::new(config).apply_ssh_policy().into()
        }),
        Stage::new("install audit rules", true, move || {
            HardeningApplier::new(config).apply_audit_rules().into()
        }),
        Stage::new("load AppArmor profiles", true, move || {
            HardeningApplier::new(config).load_apparmor_profiles().into()
        }),
    ]
}

fn service_stages(config: &WardenConfig) -> Vec<Stage> {
    config
        .service_units
        .iter()
        .map(|unit| {
            let unit = unit.clone();
            Stage::new(format!("start {unit}"), true, move || {
                ServiceInitializer::new(config).enable_and_start(&unit).into()
            })
        })
        .collect()
}

/// Write the first-boot marker after the first fully successful run. The
/// marker never gates execution; on later runs its timestamp is reported.
fn record_first_boot(config: &WardenConfig) -> Result<()> {
    let marker = config.marker_file();
    if marker.exists() {
        if let Ok(stamp) = fs::read_to_string(&marker) {
            log::info!("first-boot initialization previously completed: {}", stamp.trim());
        }
        return Ok(());
    }
    fsutil::write_with_dirs(&marker, format!("{}\n", logging::log_stamp()))?;
    log::info!("first-boot initialization complete; marker written");
    Ok(())
}
