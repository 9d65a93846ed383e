//! Firmware-update command.

use anyhow::Result;

use crate::config::WardenConfig;
use crate::firmware::{FirmwareUpdater, UpdateOutcome};

/// Execute the firmware update pipeline.
pub fn cmd_firmware_update(config: &WardenConfig) -> Result<UpdateOutcome> {
    let updater = FirmwareUpdater::new(config);
    log::info!(
        "firmware update: {} files from {}",
        updater.bundle().file_count(),
        updater.bundle().source
    );
    updater.run()
}
