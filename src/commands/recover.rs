//! Recover command - runs one recovery mode.

use anyhow::Result;

use crate::config::WardenConfig;
use crate::recovery::{RecoveryController, RecoveryMode};

/// Execute the recover command. The mode selector has already been validated
/// by the caller; this only drives the state machine.
pub fn cmd_recover(config: &WardenConfig, mode: RecoveryMode) -> Result<()> {
    let mut controller = RecoveryController::new(config);
    let result = controller.run(mode);
    log::info!("recovery finished in state '{}'", controller.state());
    result
}
