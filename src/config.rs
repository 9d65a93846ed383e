//! Configuration: every path and tunable the controller touches.
//!
//! Built once at startup and passed by reference into each component; nothing
//! reads the environment after construction. Defaults target a
//! Raspberry-Pi-class Debian system; environment variables override
//! individual entries, and `WARDEN_ROOT` relocates the whole path set under
//! an alternate root (bench images, tests).

use std::env;
use std::path::{Path, PathBuf};

/// Default base URL for sparse firmware fetches (one file per request).
pub const DEFAULT_FIRMWARE_SOURCE: &str =
    "https://raw.githubusercontent.com/raspberrypi/firmware/master/boot";

/// Platform boot files installed by a firmware update. Also the default
/// critical set: an update is accepted only if all of these are present
/// afterwards.
pub const DEFAULT_BOOT_FILES: &[&str] =
    &["bootcode.bin", "start.elf", "fixup.dat", "kernel8.img"];

#[derive(Debug, Clone)]
pub struct WardenConfig {
    /// Root all file paths hang off. `/` on a live device.
    pub system_root: PathBuf,

    // Integrity verification
    pub kernel_image: PathBuf,
    pub kernel_digest_ref: PathBuf,
    pub boot_manifest: PathBuf,
    pub boot_signature: PathBuf,
    pub signing_pubkey: PathBuf,
    pub rootkit_scanner: String,

    // Hardening output files (fully rewritten on every run)
    pub sysctl_conf: PathBuf,
    pub sshd_config: PathBuf,
    pub audit_rules: PathBuf,
    pub apparmor_dir: PathBuf,
    pub firewall_rules_file: PathBuf,

    /// Local service account allowed outbound DNS and relay traffic.
    pub proxy_owner: String,

    /// Security service units, in start order.
    pub service_units: Vec<String>,

    // Durable state
    pub state_dir: PathBuf,
    pub backup_dir: PathBuf,
    pub config_backup_sources: Vec<PathBuf>,
    pub user_backup_sources: Vec<PathBuf>,

    // Recovery
    pub recovery_device: Option<PathBuf>,
    pub recovery_mount: PathBuf,
    pub boot_device: Option<PathBuf>,
    pub root_device: Option<PathBuf>,

    // Firmware
    pub boot_dir: PathBuf,
    pub firmware_lib_dir: PathBuf,
    pub firmware_source: String,
    pub firmware_boot_files: Vec<String>,
    pub firmware_lib_files: Vec<String>,
    pub firmware_critical_files: Vec<String>,

    // Forensics
    pub auth_log: PathBuf,
    pub forensic_scan_dirs: Vec<PathBuf>,

    // Timeouts and retries
    pub download_timeout_secs: u64,
    pub download_retries: u32,
    pub service_timeout_secs: u64,
}

fn rooted(root: &Path, rel: &str) -> PathBuf {
    root.join(rel)
}

impl WardenConfig {
    /// Defaults with every path placed under `root`.
    ///
    /// Device paths (recovery/boot/root partitions) only apply on the real
    /// root; under an alternate root there is no block device to point at.
    pub fn for_root(root: &Path) -> Self {
        let live = root == Path::new("/");
        Self {
            system_root: root.to_path_buf(),

            kernel_image: rooted(root, "boot/kernel8.img"),
            kernel_digest_ref: rooted(root, "etc/warden/kernel.sha256"),
            boot_manifest: rooted(root, "etc/warden/boot.manifest"),
            boot_signature: rooted(root, "etc/warden/boot.manifest.sig"),
            signing_pubkey: rooted(root, "etc/warden/warden.pub"),
            rootkit_scanner: "chkrootkit".to_string(),

            sysctl_conf: rooted(root, "etc/sysctl.d/99-warden.conf"),
            sshd_config: rooted(root, "etc/ssh/sshd_config"),
            audit_rules: rooted(root, "etc/audit/rules.d/warden.rules"),
            apparmor_dir: rooted(root, "etc/apparmor.d/warden"),
            firewall_rules_file: rooted(root, "etc/iptables/rules.v4"),

            proxy_owner: "debian-tor".to_string(),

            service_units: vec![
                "auditd.service".to_string(),
                "aidecheck.timer".to_string(),
                "fail2ban.service".to_string(),
                "tor.service".to_string(),
                "acct.service".to_string(),
            ],

            state_dir: rooted(root, "var/lib/warden"),
            backup_dir: rooted(root, "var/backups/warden"),
            config_backup_sources: vec![
                rooted(root, "etc/warden"),
                rooted(root, "etc/ssh"),
                rooted(root, "etc/sysctl.d"),
                rooted(root, "etc/audit"),
                rooted(root, "etc/iptables"),
            ],
            user_backup_sources: vec![rooted(root, "home")],

            recovery_device: live.then(|| PathBuf::from("/dev/mmcblk0p3")),
            recovery_mount: rooted(root, "mnt/recovery"),
            boot_device: live.then(|| PathBuf::from("/dev/mmcblk0p1")),
            root_device: live.then(|| PathBuf::from("/dev/mmcblk0p2")),

            boot_dir: rooted(root, "boot"),
            firmware_lib_dir: rooted(root, "usr/lib"),
            firmware_source: DEFAULT_FIRMWARE_SOURCE.to_string(),
            firmware_boot_files: DEFAULT_BOOT_FILES.iter().map(|s| s.to_string()).collect(),
            firmware_lib_files: Vec::new(),
            firmware_critical_files: DEFAULT_BOOT_FILES.iter().map(|s| s.to_string()).collect(),

            auth_log: rooted(root, "var/log/auth.log"),
            forensic_scan_dirs: vec![
                rooted(root, "etc"),
                rooted(root, "home"),
                rooted(root, "usr/local/bin"),
            ],

            download_timeout_secs: 300,
            download_retries: 3,
            service_timeout_secs: 90,
        }
    }

    /// Load configuration from the environment.
    ///
    /// `main` loads `/etc/warden/warden.env` (then a local `.env`) first, so
    /// entries from those files arrive here as ordinary environment
    /// variables; real environment variables take precedence by the loading
    /// order.
    pub fn load() -> Self {
        let root = env::var("WARDEN_ROOT")
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from("/"));
        let mut config = Self::for_root(&root);

        if let Ok(path) = env::var("WARDEN_KERNEL_IMAGE") {
            config.kernel_image = PathBuf::from(path);
        }
        if let Ok(dir) = env::var("WARDEN_BACKUP_DIR") {
            config.backup_dir = PathBuf::from(dir);
        }
        if let Ok(mount) = env::var("WARDEN_RECOVERY_MOUNT") {
            config.recovery_mount = PathBuf::from(mount);
        }
        if let Ok(device) = env::var("WARDEN_RECOVERY_DEVICE") {
            config.recovery_device = parse_device(&device);
        }
        if let Ok(device) = env::var("WARDEN_BOOT_DEVICE") {
            config.boot_device = parse_device(&device);
        }
        if let Ok(device) = env::var("WARDEN_ROOT_DEVICE") {
            config.root_device = parse_device(&device);
        }
        if let Ok(source) = env::var("WARDEN_FIRMWARE_SOURCE") {
            config.firmware_source = source;
        }
        if let Ok(owner) = env::var("WARDEN_PROXY_OWNER") {
            config.proxy_owner = owner;
        }
        if let Ok(scanner) = env::var("WARDEN_ROOTKIT_SCANNER") {
            config.rootkit_scanner = scanner;
        }
        if let Ok(units) = env::var("WARDEN_SERVICES") {
            config.service_units = units
                .split(',')
                .map(|u| u.trim().to_string())
                .filter(|u| !u.is_empty())
                .collect();
        }
        if let Some(secs) = parse_var_u64("WARDEN_DOWNLOAD_TIMEOUT") {
            config.download_timeout_secs = secs;
        }
        if let Some(retries) = parse_var_u64("WARDEN_DOWNLOAD_RETRIES") {
            config.download_retries = retries as u32;
        }
        if let Some(secs) = parse_var_u64("WARDEN_SERVICE_TIMEOUT") {
            config.service_timeout_secs = secs;
        }

        config
    }

    /// Marker recording that first-boot initialization completed once.
    pub fn marker_file(&self) -> PathBuf {
        self.state_dir.join("first-boot-complete")
    }

    /// Mutual-exclusion lock file shared by boot, recovery, and update.
    pub fn lock_file(&self) -> PathBuf {
        self.state_dir.join("warden.lock")
    }

    /// Whether a kernel reference digest has been recorded.
    pub fn has_baseline(&self) -> bool {
        self.kernel_digest_ref.exists()
    }

    /// Print the effective configuration.
    pub fn print(&self) {
        println!("Configuration:");
        println!("  system root         {}", self.system_root.display());
        println!("  kernel image        {}", self.kernel_image.display());
        println!("  reference digest    {}", self.kernel_digest_ref.display());
        println!("  boot manifest       {}", self.boot_manifest.display());
        println!("  signing public key  {}", self.signing_pubkey.display());
        println!("  rootkit scanner     {}", self.rootkit_scanner);
        println!("  sysctl file         {}", self.sysctl_conf.display());
        println!("  sshd config         {}", self.sshd_config.display());
        println!("  audit rules         {}", self.audit_rules.display());
        println!("  apparmor profiles   {}", self.apparmor_dir.display());
        println!("  firewall rules      {}", self.firewall_rules_file.display());
        println!("  proxy owner         {}", self.proxy_owner);
        println!("  services            {}", self.service_units.join(", "));
        println!("  state dir           {}", self.state_dir.display());
        println!("  backup dir          {}", self.backup_dir.display());
        println!("  recovery device     {}", display_device(&self.recovery_device));
        println!("  recovery mount      {}", self.recovery_mount.display());
        println!("  boot device         {}", display_device(&self.boot_device));
        println!("  root device         {}", display_device(&self.root_device));
        println!("  boot dir            {}", self.boot_dir.display());
        println!("  firmware source     {}", self.firmware_source);
        println!("  firmware files      {}", self.firmware_boot_files.join(", "));
        println!("  critical files      {}", self.firmware_critical_files.join(", "));
        println!("  download timeout    {}s", self.download_timeout_secs);
        println!("  service timeout     {}s", self.service_timeout_secs);
        if self.has_baseline() {
            println!("  kernel baseline     recorded");
        } else {
            println!("  kernel baseline     MISSING (run 'warden baseline' to record one)");
        }
    }
}

fn parse_device(value: &str) -> Option<PathBuf> {
    let value = value.trim();
    if value.is_empty() || value.eq_ignore_ascii_case("none") {
        None
    } else {
        Some(PathBuf::from(value))
    }
}

fn parse_var_u64(name: &str) -> Option<u64> {
    env::var(name).ok().and_then(|v| v.trim().parse().ok())
}

fn display_device(device: &Option<PathBuf>) -> String {
    match device {
        Some(path) => path.display().to_string(),
        None => "(none)".to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;

    #[test]
    fn test_for_root_relocates_paths() {
        let config = WardenConfig::for_root(Path::new("/srv/bench"));
        assert_eq!(
            config.kernel_image,
            PathBuf::from("/srv/bench/boot/kernel8.img")
        );
        assert_eq!(
            config.marker_file(),
            PathBuf::from("/srv/bench/var/lib/warden/first-boot-complete")
        );
        assert!(config.recovery_device.is_none());
        assert!(config.boot_device.is_none());
    }

    #[test]
    fn test_live_root_has_device_defaults() {
        let config = WardenConfig::for_root(Path::new("/"));
        assert_eq!(
            config.recovery_device,
            Some(PathBuf::from("/dev/mmcblk0p3"))
        );
        assert_eq!(config.sysctl_conf, PathBuf::from("/etc/sysctl.d/99-warden.conf"));
    }

    #[test]
    fn test_parse_device_none_values() {
        assert_eq!(parse_device(""), None);
        assert_eq!(parse_device("none"), None);
        assert_eq!(parse_device("NONE"), None);
        assert_eq!(parse_device("/dev/sda3"), Some(PathBuf::from("/dev/sda3")));
    }

    #[test]
    #[serial]
    fn test_load_respects_env_overrides() {
        env::set_var("WARDEN_ROOT", "/srv/bench");
        env::set_var("WARDEN_SERVICES", "auditd.service, tor.service");
        env::set_var("WARDEN_DOWNLOAD_TIMEOUT", "42");
        env::set_var("WARDEN_RECOVERY_DEVICE", "none");

        let config = WardenConfig::load();
        assert_eq!(config.system_root, PathBuf::from("/srv/bench"));
        assert_eq!(
            config.service_units,
            vec!["auditd.service".to_string(), "tor.service".to_string()]
        );
        assert_eq!(config.download_timeout_secs, 42);
        assert!(config.recovery_device.is_none());

        env::remove_var("WARDEN_ROOT");
        env::remove_var("WARDEN_SERVICES");
        env::remove_var("WARDEN_DOWNLOAD_TIMEOUT");
        env::remove_var("WARDEN_RECOVERY_DEVICE");
    }
}
