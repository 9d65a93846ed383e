//! Failure taxonomy for the bring-up, recovery, and update pipelines.
//!
//! Orchestrators classify stage failures with these variants; the variant
//! decides routing (emergency shell, rollback, abort) and the user-visible
//! failure category. Incidental I/O errors stay `anyhow` and are wrapped into
//! a variant only at the point where the classification matters.

use crate::backup::BackupKind;

#[derive(Debug, thiserror::Error)]
pub enum WardenError {
    /// Kernel or boot-partition attestation failed. Routes to the emergency
    /// shell when raised during boot.
    #[error("integrity failure: {0}")]
    Integrity(String),

    /// A hardening, network, or service sub-step failed. Fatal for its phase;
    /// the message names the specific parameter, file, or unit.
    #[error("configuration failure: {0}")]
    Configuration(String),

    /// Restore was attempted with no valid archive. Non-fatal for best-effort
    /// restores, fatal for firmware rollback.
    #[error("no valid {} backup archive found", .0.as_str())]
    BackupMissing(BackupKind),

    /// Firmware fetch failed; the update aborts before touching the system.
    #[error("download failure: {0}")]
    Download(String),

    /// A critical file was absent after apply; triggers automatic rollback.
    #[error("verification failure: missing critical files: {}", .missing.join(", "))]
    Verification { missing: Vec<String> },

    /// Rollback itself could not restore the previous firmware. The system is
    /// left with an unverified update and needs manual intervention.
    #[error("rollback failure: {0}")]
    Rollback(String),
}
