use anyhow::{Context, Result};
use std::fs;
use std::path::{Path, PathBuf};

use super::SessionRecord;
use crate::aggregate::SessionSummary;
use crate::orchestrator::Exporter;

/// Stores finalized sessions as pretty JSON, one file per session.
pub struct SessionArchive {
    sessions_dir: PathBuf,
    log_file: Option<PathBuf>,
}

impl SessionArchive {
    pub fn new(sessions_dir: &Path) -> Self {
        Self {
            sessions_dir: sessions_dir.to_path_buf(),
            log_file: None,
        }
    }

    /// Reference this device log from archived records.
    pub fn with_log_file(mut self, log_file: impl Into<PathBuf>) -> Self {
        self.log_file = Some(log_file.into());
        self
    }

    pub fn sessions_dir(&self) -> &Path {
        &self.sessions_dir
    }

    /// Write `summary` and return the path of the new record.
    pub fn save(&self, summary: &SessionSummary) -> Result<PathBuf> {
        fs::create_dir_all(&self.sessions_dir).with_context(|| {
            format!(
                "Failed to create sessions directory: {}",
                self.sessions_dir.display()
            )
        })?;

        let record = SessionRecord::new(summary.clone(), self.log_file.clone());
        let filename = format!(
            "{}_{}_{}.json",
            summary.started_at.format("%Y-%m-%dT%H-%M-%S"),
            sanitize(&summary.device.id),
            &record.session_id.to_string()[..8]
        );
        let path = self.sessions_dir.join(filename);

        let json =
            serde_json::to_string_pretty(&record).context("Failed to serialize session record")?;
        fs::write(&path, json)
            .with_context(|| format!("Failed to write session record: {}", path.display()))?;
        tracing::debug!(path = %path.display(), "session archived");
        Ok(path)
    }

    /// Stored records, most recent first.
    pub fn list(&self) -> Result<Vec<PathBuf>> {
        if !self.sessions_dir.exists() {
            return Ok(Vec::new());
        }

        let mut records: Vec<PathBuf> = fs::read_dir(&self.sessions_dir)
            .with_context(|| format!("Failed to read {}", self.sessions_dir.display()))?
            .filter_map(|e| e.ok())
            .map(|e| e.path())
            .filter(|p| p.extension().map(|e| e == "json").unwrap_or(false))
            .collect();

        records.sort();
        records.reverse();
        Ok(records)
    }

    pub fn load(&self, path: &Path) -> Result<SessionRecord> {
        let content = fs::read_to_string(path)
            .with_context(|| format!("Failed to read session record: {}", path.display()))?;
        serde_json::from_str(&content)
            .with_context(|| format!("Failed to parse session record: {}", path.display()))
    }
}

impl Exporter for SessionArchive {
    fn write(&self, summary: &SessionSummary) -> Result<()> {
        self.save(summary).map(|_| ())
    }
}

/// Keep device ids usable inside a file name.
fn sanitize(id: &str) -> String {
    id.chars()
        .map(|c| if c.is_ascii_alphanumeric() || c == '-' { c } else { '_' })
        .collect()
}
