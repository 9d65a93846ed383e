//! Security service bring-up.
//!
//! Enables and starts the monitoring stack in dependency order. The audit
//! daemon comes first so that everything after it is recorded.

use std::time::Duration;

use anyhow::Result;

use crate::config::WardenConfig;
use crate::process::Cmd;

pub struct ServiceInitializer<'a> {
    config: &'a WardenConfig,
}

impl<'a> ServiceInitializer<'a> {
    pub fn new(config: &'a WardenConfig) -> Self {
        Self { config }
    }

    /// Units to bring up, in start order.
    pub fn units(&self) -> &[String] {
        &self.config.service_units
    }

    /// Enable a unit for future boots and start it now. Either step may hang
    /// on a wedged unit, so both run under the configured timeout.
    pub fn enable_and_start(&self, unit: &str) -> Result<()> {
        let limit = Duration::from_secs(self.config.service_timeout_secs);
        Cmd::new("systemctl")
            .args(["enable", unit])
            .timeout(limit)
            .error_msg(format!("could not enable {unit}"))
            .run()?;
        Cmd::new("systemctl")
            .args(["start", unit])
            .timeout(limit)
            .error_msg(format!("could not start {unit}"))
            .run()?;
        log::info!("service active: {unit}");
        Ok(())
    }
}
