//! Dual-sink logging: console always, plus an attachable log file.
//!
//! The console sink mirrors the interactive status output (stdout for info,
//! stderr for warnings and errors). The file sink can be attached and detached
//! at runtime — recovery uses this to redirect its output under the recovery
//! mount. A write error on the file sink detaches it and reports the
//! degradation once; console output is never suppressed by file-sink state.

use anyhow::{Context, Result};
use log::{Level, LevelFilter, Log, Metadata, Record};
use std::fs::{File, OpenOptions};
use std::io::Write;
use std::path::Path;
use std::sync::{Mutex, OnceLock};
use time::OffsetDateTime;

struct DualLogger {
    file: Mutex<Option<File>>,
}

static LOGGER: OnceLock<DualLogger> = OnceLock::new();

/// Install the global logger. Safe to call more than once.
pub fn init() {
    let logger = LOGGER.get_or_init(|| DualLogger {
        file: Mutex::new(None),
    });
    if log::set_logger(logger).is_ok() {
        log::set_max_level(LevelFilter::Debug);
    }
}

/// Attach a file sink, creating the file (append mode) if needed.
///
/// Subsequent log output is duplicated into the file until `detach_file` is
/// called or a write error detaches it.
pub fn attach_file(path: &Path) -> Result<()> {
    let file = OpenOptions::new()
        .create(true)
        .append(true)
        .open(path)
        .with_context(|| format!("Failed to open log file {}", path.display()))?;

    if let Some(logger) = LOGGER.get() {
        if let Ok(mut slot) = logger.file.lock() {
            *slot = Some(file);
        }
    }
    Ok(())
}

/// Detach the file sink, if one is attached. Console logging continues.
pub fn detach_file() {
    if let Some(logger) = LOGGER.get() {
        if let Ok(mut slot) = logger.file.lock() {
            if let Some(mut file) = slot.take() {
                let _ = file.flush();
            }
        }
    }
}

/// Whether a file sink is currently attached.
pub fn file_attached() -> bool {
    LOGGER
        .get()
        .and_then(|l| l.file.lock().ok().map(|slot| slot.is_some()))
        .unwrap_or(false)
}

impl Log for DualLogger {
    fn enabled(&self, metadata: &Metadata) -> bool {
        metadata.level() <= Level::Debug
    }

    fn log(&self, record: &Record) {
        if !self.enabled(record.metadata()) {
            return;
        }

        // Console sink. Debug lines go to the file only.
        match record.level() {
            Level::Error => eprintln!("[ERROR] {}", record.args()),
            Level::Warn => eprintln!("[WARN] {}", record.args()),
            Level::Info => println!("{}", record.args()),
            _ => {}
        }

        // File sink, best effort. On a write error the sink is dropped and
        // the degradation reported once on the console.
        if let Ok(mut slot) = self.file.lock() {
            if let Some(file) = slot.as_mut() {
                let line = format!(
                    "{} [{:5}] {}\n",
                    log_stamp(),
                    record.level(),
                    record.args()
                );
                if file.write_all(line.as_bytes()).is_err() {
                    *slot = None;
                    eprintln!("[WARN] log file became unwritable; continuing console-only");
                }
            }
        }
    }

    fn flush(&self) {
        if let Ok(mut slot) = self.file.lock() {
            if let Some(file) = slot.as_mut() {
                let _ = file.flush();
            }
        }
    }
}

/// UTC timestamp for log lines: `2026-03-01 14:30:05 UTC`.
pub fn log_stamp() -> String {
    let now = OffsetDateTime::now_utc();
    format!(
        "{:04}-{:02}-{:02} {:02}:{:02}:{:02} UTC",
        now.year(),
        now.month() as u8,
        now.day(),
        now.hour(),
        now.minute(),
        now.second()
    )
}

/// Compact UTC timestamp for file names: `20260301T143005Z`.
pub fn file_stamp() -> String {
    let now = OffsetDateTime::now_utc();
    format!(
        "{:04}{:02}{:02}T{:02}{:02}{:02}Z",
        now.year(),
        now.month() as u8,
        now.day(),
        now.hour(),
        now.minute(),
        now.second()
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;
    use std::path::PathBuf;
    use tempfile::TempDir;

    #[test]
    #[serial]
    fn test_attach_and_detach_round_trip() {
        init();
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("warden.log");

        attach_file(&path).unwrap();
        assert!(file_attached());
        log::info!("recorded for the file sink");
        detach_file();
        assert!(!file_attached());

        let contents = std::fs::read_to_string(&path).unwrap();
        assert!(contents.contains("recorded for the file sink"));
    }

    #[test]
    #[serial]
    fn test_write_error_detaches_the_file_sink() {
        init();
        // /dev/full accepts the open but fails every write with ENOSPC.
        attach_file(&PathBuf::from("/dev/full")).unwrap();
        assert!(file_attached());

        log::info!("this line cannot reach the file sink");

        assert!(!file_attached());
        // Console logging still works with the sink gone.
        log::info!("console-only after degradation");
    }

    #[test]
    fn test_file_stamp_shape() {
        let stamp = file_stamp();
        assert_eq!(stamp.len(), 16);
        assert!(stamp.ends_with('Z'));
        assert!(stamp.contains('T'));
    }

    #[test]
    fn test_log_stamp_shape() {
        let stamp = log_stamp();
        assert!(stamp.ends_with(" UTC"));
        assert_eq!(stamp.matches(':').count(), 2);
    }
}
