//! Warden library exports.
//!
//! The binary in `main.rs` is a thin CLI over these modules; integration
//! tests drive them directly.

pub mod backup;
pub mod commands;
pub mod config;
pub mod errors;
pub mod firmware;
pub mod forensic;
pub mod fsutil;
pub mod hardening;
pub mod integrity;
pub mod lock;
pub mod logging;
pub mod network;
pub mod process;
pub mod recovery;
pub mod services;
pub mod stage;
