//! Show command - displays information.

use crate::config::WardenConfig;

/// Print the effective configuration.
pub fn cmd_show_config(config: &WardenConfig) {
    config.print();
}
