use chrono::Local;
use std::fs::OpenOptions;
use std::io::Write;
use std::path::{Path, PathBuf};

use crate::orchestrator::SessionLog;

/// Append-only text log for one device session.
///
/// Lines look like `[2025-01-31 14:02:11] T09: USB MicroPython Detection - PASS ...`.
/// Write failures are reported through tracing and never interrupt a session.
#[derive(Debug, Clone)]
pub struct DeviceLog {
    path: PathBuf,
}

impl DeviceLog {
    /// Log file for `device_id` under `log_dir`, stamped with the current local time.
    pub fn new(log_dir: &Path, device_id: &str) -> Self {
        let stamp = Local::now().format("%Y%m%d_%H%M%S");
        let path = log_dir.join(format!("device_{}_log_{}.txt", device_id, stamp));
        Self { path }
    }

    pub fn at(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn write_line(&self, line: &str) -> std::io::Result<()> {
        if let Some(parent) = self.path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)?;
        writeln!(
            file,
            "[{}] {}",
            Local::now().format("%Y-%m-%d %H:%M:%S"),
            line
        )
    }
}

impl SessionLog for DeviceLog {
    fn append(&self, device_id: &str, line: &str) {
        if let Err(e) = self.write_line(line) {
            tracing::warn!(
                device = device_id,
                path = %self.path.display(),
                error = %e,
                "failed to write device log"
            );
        }
    }
}
