//! Default-deny firewall with an explicit allow-list.
//!
//! The ruleset is replaced wholesale: flush, set all default policies to
//! DROP, then insert the allow-list. Re-applying the policy therefore always
//! converges on the same kernel state, never an accumulation of rules.
//! Allowed traffic: loopback, established/related connections, and — for the
//! anonymizing-proxy service account only — DNS and outbound relay
//! connections.

use anyhow::Result;

use crate::config::WardenConfig;
use crate::fsutil;
use crate::process::Cmd;

/// Ordered iptables invocations. Order is part of the contract: the flush
/// and default-deny policies come first, the allow-list after.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FirewallPolicy {
    rules: Vec<Vec<String>>,
}

impl FirewallPolicy {
    pub fn standard(config: &WardenConfig) -> Self {
        let owner = config.proxy_owner.as_str();
        let rules: Vec<Vec<&str>> = vec![
            vec!["-F"],
            vec!["-X"],
            vec!["-P", "INPUT", "DROP"],
            vec!["-P", "FORWARD", "DROP"],
            vec!["-P", "OUTPUT", "DROP"],
            vec!["-A", "INPUT", "-i", "lo", "-j", "ACCEPT"],
            vec!["-A", "OUTPUT", "-o", "lo", "-j", "ACCEPT"],
            vec![
                "-A", "INPUT", "-m", "conntrack", "--ctstate", "ESTABLISHED,RELATED", "-j",
                "ACCEPT",
            ],
            vec![
                "-A", "OUTPUT", "-m", "conntrack", "--ctstate", "ESTABLISHED,RELATED", "-j",
                "ACCEPT",
            ],
            vec![
                "-A", "OUTPUT", "-p", "udp", "--dport", "53", "-m", "owner", "--uid-owner",
                owner, "-j", "ACCEPT",
            ],
            vec![
                "-A", "OUTPUT", "-p", "tcp", "--dport", "53", "-m", "owner", "--uid-owner",
                owner, "-j", "ACCEPT",
            ],
            vec![
                "-A", "OUTPUT", "-p", "tcp", "-m", "owner", "--uid-owner", owner, "-j",
                "ACCEPT",
            ],
        ];
        Self {
            rules: rules
                .into_iter()
                .map(|rule| rule.into_iter().map(str::to_string).collect())
                .collect(),
        }
    }

    pub fn rules(&self) -> &[Vec<String>] {
        &self.rules
    }

    /// One `iptables ...` line per rule, for logging and inspection.
    pub fn render(&self) -> String {
        let mut out = String::new();
        for rule in &self.rules {
            out.push_str("iptables ");
            out.push_str(&rule.join(" "));
            out.push('\n');
        }
        out
    }
}

pub struct NetworkSecurityConfigurator<'a> {
    config: &'a WardenConfig,
}

impl<'a> NetworkSecurityConfigurator<'a> {
    pub fn new(config: &'a WardenConfig) -> Self {
        Self { config }
    }

    /// Install the standard policy into the running kernel. Stops at the
    /// first rejected rule; the error names the failing invocation.
    pub fn apply(&self) -> Result<()> {
        let policy = FirewallPolicy::standard(self.config);
        for rule in policy.rules() {
            Cmd::new("iptables")
                .args(rule.iter().map(String::as_str))
                .error_msg(format!("firewall rule failed: iptables {}", rule.join(" ")))
                .run()?;
        }
        log::info!("default-deny firewall active ({} rules)", policy.rules().len());
        Ok(())
    }

    /// Save the active ruleset to boot-persisted storage. The live kernel
    /// state is already in effect; this is for the next boot.
    pub fn persist(&self) -> Result<()> {
        let result = Cmd::new("iptables-save")
            .error_msg("could not capture active ruleset")
            .run()?;
        fsutil::write_with_dirs(&self.config.firewall_rules_file, result.stdout)?;
        log::info!(
            "firewall ruleset saved to {}",
            self.config.firewall_rules_file.display()
        );
        Ok(())
    }
}
