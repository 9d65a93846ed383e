//! SSH daemon policy.
//!
//! The policy file is a full replacement, not a merge: root login and
//! password authentication off, modern key exchange and cipher set only.

use anyhow::Result;

use crate::config::WardenConfig;
use crate::fsutil;

pub const SSHD_POLICY: &str = "\
# OpenSSH server policy.
# Rewritten on every hardening run; local edits are discarded.

Protocol 2
Port 22
PermitRootLogin no
PasswordAuthentication no
KbdInteractiveAuthentication no
ChallengeResponseAuthentication no
PubkeyAuthentication yes
PermitEmptyPasswords no
HostbasedAuthentication no
IgnoreRhosts yes
X11Forwarding no
AllowAgentForwarding no
AllowTcpForwarding no
PermitTunnel no
MaxAuthTries 3
MaxSessions 4
LoginGraceTime 20
ClientAliveInterval 300
ClientAliveCountMax 2
KexAlgorithms curve25519-sha256,curve25519-sha256@libssh.org
Ciphers chacha20-poly1305@openssh.com,aes256-gcm@openssh.com,aes128-gcm@openssh.com
MACs hmac-sha2-512-etm@openssh.com,hmac-sha2-256-etm@openssh.com
Subsystem sftp internal-sftp
";

/// Overwrite the daemon configuration with the hardened policy, readable by
/// root only.
pub fn install(config: &WardenConfig) -> Result<()> {
    fsutil::write_mode(&config.sshd_config, SSHD_POLICY, 0o600)
}
