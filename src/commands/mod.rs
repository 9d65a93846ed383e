//! CLI command handlers.
//!
//! Each submodule handles a specific CLI command:
//! - `boot` - Staged boot bring-up pipeline
//! - `recover` - Recovery state machine (basic/advanced/forensic)
//! - `firmware` - Firmware update with automatic rollback
//! - `verify` - Standalone integrity report
//! - `baseline` - Record the kernel reference digest
//! - `backup` - Operator access to backup creation and restore
//! - `show` - Display information

pub mod backup;
pub mod baseline;
pub mod boot;
pub mod firmware;
pub mod recover;
pub mod show;
pub mod verify;

pub use backup::{cmd_backup_create, cmd_backup_restore};
pub use baseline::cmd_baseline;
pub use boot::{cmd_boot, BootOutcome};
pub use firmware::cmd_firmware_update;
pub use recover::cmd_recover;
pub use show::cmd_show_config;
pub use verify::cmd_verify;
