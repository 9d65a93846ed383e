//! Integrity verification: kernel digest, boot-partition signature, rootkit
//! presence.
//!
//! The verifier only reports. Policy — halt, drop to the emergency shell,
//! tolerate a missing scanner — belongs to the orchestrator, which is why the
//! rootkit scan returns a three-way [`ScanOutcome`] instead of folding
//! "scanner absent" and "rootkit found" into one failure.

use anyhow::{Context, Result};
use sha2::{Digest, Sha256};
use std::fs::{self, File};
use std::io::{BufReader, Read};
use std::path::Path;

use crate::config::WardenConfig;
use crate::errors::WardenError;
use crate::process::Cmd;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ScanOutcome {
    Clean,
    /// The scanner reported an infection. Details carry the matching lines.
    Positive(String),
    /// The scan could not run (scanner missing or broken).
    Unavailable(String),
}

pub struct IntegrityVerifier<'a> {
    config: &'a WardenConfig,
}

impl<'a> IntegrityVerifier<'a> {
    pub fn new(config: &'a WardenConfig) -> Self {
        Self { config }
    }

    /// Compare the kernel image digest against the recorded reference.
    ///
    /// A missing reference fails too: a device without a baseline cannot
    /// attest itself.
    pub fn verify_kernel(&self) -> Result<(), WardenError> {
        let image = &self.config.kernel_image;
        if !image.exists() {
            return Err(WardenError::Integrity(format!(
                "kernel image not found: {}",
                image.display()
            )));
        }

        let reference = &self.config.kernel_digest_ref;
        if !reference.exists() {
            return Err(WardenError::Integrity(format!(
                "no reference digest at {}; record one with 'warden baseline'",
                reference.display()
            )));
        }

        let expected = fs::read_to_string(reference)
            .map_err(|e| {
                WardenError::Integrity(format!(
                    "cannot read reference digest {}: {}",
                    reference.display(),
                    e
                ))
            })?
            .trim()
            .to_lowercase();

        let actual = sha256_file(image).map_err(|e| {
            WardenError::Integrity(format!(
                "cannot hash kernel image {}: {:#}",
                image.display(),
                e
            ))
        })?;

        if actual != expected {
            return Err(WardenError::Integrity(format!(
                "kernel digest mismatch for {}: expected {}, got {}",
                image.display(),
                expected,
                actual
            )));
        }
        Ok(())
    }

    /// Check the detached signature over the boot-partition manifest.
    pub fn verify_boot_partition(&self) -> Result<(), WardenError> {
        let checks = [
            ("boot manifest", &self.config.boot_manifest),
            ("boot signature", &self.config.boot_signature),
            ("signing public key", &self.config.signing_pubkey),
        ];
        for (label, path) in checks {
            if !path.exists() {
                return Err(WardenError::Integrity(format!(
                    "{} not found: {}",
                    label,
                    path.display()
                )));
            }
        }

        let result = Cmd::new("openssl")
            .args(["dgst", "-sha256", "-verify"])
            .arg_path(&self.config.signing_pubkey)
            .arg("-signature")
            .arg_path(&self.config.boot_signature)
            .arg_path(&self.config.boot_manifest)
            .allow_fail()
            .run()
            .map_err(|e| {
                WardenError::Integrity(format!("signature verifier unavailable: {:#}", e))
            })?;

        if !result.success() {
            let detail = if result.stderr_trimmed().is_empty() {
                result.stdout_trimmed()
            } else {
                result.stderr_trimmed()
            };
            return Err(WardenError::Integrity(format!(
                "boot partition signature rejected: {}",
                detail
            )));
        }
        Ok(())
    }

    /// Run the signature-based rootkit scan.
    pub fn scan_for_rootkit(&self) -> ScanOutcome {
        let scanner = &self.config.rootkit_scanner;
        if which::which(scanner).is_err() {
            return ScanOutcome::Unavailable(format!("{} is not installed", scanner));
        }

        match Cmd::new(scanner).arg("-q").allow_fail().run() {
            Err(e) => ScanOutcome::Unavailable(format!("{:#}", e)),
            Ok(result) => {
                let hits: Vec<String> = result
                    .stdout
                    .lines()
                    .chain(result.stderr.lines())
                    .filter(|line| line.contains("INFECTED"))
                    .map(|line| line.trim().to_string())
                    .collect();

                if !hits.is_empty() {
                    ScanOutcome::Positive(hits.join("; "))
                } else if result.success() {
                    ScanOutcome::Clean
                } else {
                    ScanOutcome::Unavailable(format!(
                        "{} exited with code {}",
                        scanner,
                        result.code()
                    ))
                }
            }
        }
    }
}

/// SHA-256 of a file, streamed, as lowercase hex.
pub fn sha256_file(path: &Path) -> Result<String> {
    let file =
        File::open(path).with_context(|| format!("Failed to open {}", path.display()))?;
    let mut reader = BufReader::new(file);
    let mut hasher = Sha256::new();
    let mut buf = vec![0u8; 1024 * 1024];
    loop {
        let n = reader
            .read(&mut buf)
            .with_context(|| format!("Failed to read {}", path.display()))?;
        if n == 0 {
            break;
        }
        hasher.update(&buf[..n]);
    }
    Ok(format!("{:x}", hasher.finalize()))
}
