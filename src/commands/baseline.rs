//! Baseline command - records the kernel reference digest.

use anyhow::Result;

use crate::config::WardenConfig;
use crate::fsutil;
use crate::integrity;

/// Compute the kernel image digest and write it as the integrity reference.
/// An existing reference is overwritten: recording a new baseline is an
/// explicit operator decision.
pub fn cmd_baseline(config: &WardenConfig) -> Result<()> {
    let digest = integrity::sha256_file(&config.kernel_image)?;
    fsutil::write_with_dirs(&config.kernel_digest_ref, format!("{digest}\n"))?;
    println!("kernel baseline recorded: {digest}");
    println!("  image:     {}", config.kernel_image.display());
    println!("  reference: {}", config.kernel_digest_ref.display());
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    #[test]
    fn test_baseline_matches_kernel_digest() {
        let tmp = TempDir::new().unwrap();
        let config = WardenConfig::for_root(tmp.path());
        fs::create_dir_all(config.kernel_image.parent().unwrap()).unwrap();
        fs::write(&config.kernel_image, b"kernel bits").unwrap();

        cmd_baseline(&config).unwrap();
        let recorded = fs::read_to_string(&config.kernel_digest_ref).unwrap();
        let expected = integrity::sha256_file(&config.kernel_image).unwrap();
        assert_eq!(recorded.trim(), expected);
    }

    #[test]
    fn test_baseline_overwrites_previous_reference() {
        let tmp = TempDir::new().unwrap();
        let config = WardenConfig::for_root(tmp.path());
        fs::create_dir_all(config.kernel_image.parent().unwrap()).unwrap();
        fs::write(&config.kernel_image, b"kernel bits").unwrap();
        fs::create_dir_all(config.kernel_digest_ref.parent().unwrap()).unwrap();
        fs::write(&config.kernel_digest_ref, "stale\n").unwrap();

        cmd_baseline(&config).unwrap();
        let recorded = fs::read_to_string(&config.kernel_digest_ref).unwrap();
        assert_ne!(recorded.trim(), "stale");
        assert_eq!(recorded.trim().len(), 64);
    }

    #[test]
    fn test_baseline_without_kernel_fails() {
        let tmp = TempDir::new().unwrap();
        let config = WardenConfig::for_root(tmp.path());
        assert!(cmd_baseline(&config).is_err());
    }
}
