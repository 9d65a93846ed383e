//! Boot pipeline scenarios: integrity failures halt everything downstream.
//!
//! A full successful bring-up needs mount/iptables/systemctl against a live
//! system, so these tests exercise the failure side: any integrity halt must
//! leave the system completely untouched by the hardening phases.

mod helpers;

use helpers::TestEnv;
use warden::commands::{cmd_boot, BootOutcome};

/// Nothing past Integrity Verification may have run: no generated hardening
/// files, no marker.
fn assert_no_hardening_applied(env: &TestEnv) {
    assert!(!env.config.sysctl_conf.exists());
    assert!(!env.config.sshd_config.exists());
    assert!(!env.config.audit_rules.exists());
    assert!(!env.config.firewall_rules_file.exists());
    assert!(!env.config.marker_file().exists());
}

#[test]
fn test_kernel_digest_mismatch_is_an_integrity_failure() {
    let env = TestEnv::new();
    env.install_kernel("original kernel");
    env.record_baseline();
    env.install_kernel("tampered kernel");

    match cmd_boot(&env.config).unwrap() {
        BootOutcome::IntegrityFailure { stage, reason } => {
            assert_eq!(stage, "verify kernel digest");
            assert!(reason.contains("mismatch"));
        }
        other => panic!("expected IntegrityFailure, got {other:?}"),
    }
    assert_no_hardening_applied(&env);
}

#[test]
fn test_missing_kernel_image_halts_the_first_stage() {
    let env = TestEnv::new();

    match cmd_boot(&env.config).unwrap() {
        BootOutcome::IntegrityFailure { stage, reason } => {
            assert_eq!(stage, "verify kernel digest");
            assert!(reason.contains("kernel image not found"));
        }
        other => panic!("expected IntegrityFailure, got {other:?}"),
    }
    assert_no_hardening_applied(&env);
}

#[test]
fn test_missing_baseline_points_at_the_baseline_command() {
    let env = TestEnv::new();
    env.install_kernel("kernel bits");

    match cmd_boot(&env.config).unwrap() {
        BootOutcome::IntegrityFailure { reason, .. } => {
            assert!(reason.contains("warden baseline"));
        }
        other => panic!("expected IntegrityFailure, got {other:?}"),
    }
    assert_no_hardening_applied(&env);
}

#[test]
fn test_missing_signature_material_halts_after_the_kernel_check() {
    let env = TestEnv::new();
    env.install_kernel("kernel bits");
    env.record_baseline();
    // Kernel check passes; the signature stage finds no manifest.

    match cmd_boot(&env.config).unwrap() {
        BootOutcome::IntegrityFailure { stage, reason } => {
            assert_eq!(stage, "verify boot partition signature");
            assert!(reason.contains("boot manifest not found"));
        }
        other => panic!("expected IntegrityFailure, got {other:?}"),
    }
    assert_no_hardening_applied(&env);
}

#[test]
fn test_failed_boot_never_writes_the_first_boot_marker() {
    let env = TestEnv::new();
    env.install_kernel("original kernel");
    env.record_baseline();
    env.install_kernel("tampered kernel");

    let _ = cmd_boot(&env.config).unwrap();
    assert!(!env.config.marker_file().exists());
    assert!(!env.config.state_dir.exists());
}
