//! Shared test utilities for warden tests.
#![allow(dead_code)]

use std::fs;
use std::path::{Path, PathBuf};
use tempfile::TempDir;

use warden::config::WardenConfig;
use warden::integrity;

/// Test environment: a temporary directory posing as the system root, with a
/// configuration rooted in it. No device paths are set, so nothing in a test
/// ever mounts or touches real hardware.
pub struct TestEnv {
    /// Temporary directory (kept alive for the lifetime of TestEnv)
    pub _temp_dir: TempDir,
    /// The fake system root
    pub root: PathBuf,
    /// Configuration with every path under `root`
    pub config: WardenConfig,
}

impl TestEnv {
    pub fn new() -> Self {
        let temp_dir = TempDir::new().expect("Failed to create temp dir");
        let root = temp_dir.path().to_path_buf();
        let config = WardenConfig::for_root(&root);
        Self {
            _temp_dir: temp_dir,
            root,
            config,
        }
    }

    /// Write a file under the root, creating parent directories.
    pub fn write(&self, rel: &str, content: &str) -> PathBuf {
        let path = self.root.join(rel);
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).expect("Failed to create parent dirs");
        }
        fs::write(&path, content).expect("Failed to write test file");
        path
    }

    /// Read a file under the root as a string.
    pub fn read(&self, rel: &str) -> String {
        fs::read_to_string(self.root.join(rel)).expect("Failed to read test file")
    }

    pub fn exists(&self, rel: &str) -> bool {
        self.root.join(rel).exists()
    }

    /// Install a kernel image with the given content.
    pub fn install_kernel(&self, content: &str) {
        self.write("boot/kernel8.img", content);
    }

    /// Record the installed kernel's digest as the integrity reference.
    pub fn record_baseline(&self) {
        let digest =
            integrity::sha256_file(&self.config.kernel_image).expect("Failed to hash kernel");
        self.write("etc/warden/kernel.sha256", &format!("{digest}\n"));
    }

    /// Install the default platform firmware files with `old <name>` content.
    pub fn install_firmware(&self) {
        for name in &self.config.firmware_boot_files {
            self.write(&format!("boot/{name}"), &format!("old {name}"));
        }
    }

    /// Create a local firmware bundle directory with `new <name>` content for
    /// the given files, and point the configuration's source at it.
    pub fn stage_bundle(&mut self, files: &[&str]) -> PathBuf {
        let bundle = self.root.join("bundle");
        fs::create_dir_all(&bundle).expect("Failed to create bundle dir");
        for name in files {
            fs::write(bundle.join(name), format!("new {name}")).expect("Failed to stage file");
        }
        self.config.firmware_source = bundle.display().to_string();
        bundle
    }
}

/// Assert that a file exists and contains the given needle.
pub fn assert_file_contains(path: &Path, needle: &str) {
    let content = fs::read_to_string(path)
        .unwrap_or_else(|_| panic!("Failed to read {}", path.display()));
    assert!(
        content.contains(needle),
        "{} does not contain '{}'",
        path.display(),
        needle
    );
}
