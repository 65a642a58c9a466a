//! Durable session records: the per-device text log and the JSON archive.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use uuid::Uuid;

use crate::aggregate::SessionSummary;

/// A finalized session as stored on disk.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionRecord {
    pub session_id: Uuid,
    pub archived_at: DateTime<Utc>,
    /// Per-device text log written during the run
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub log_file: Option<PathBuf>,
    pub summary: SessionSummary,
}

impl SessionRecord {
    pub fn new(summary: SessionSummary, log_file: Option<PathBuf>) -> Self {
        Self {
            session_id: Uuid::new_v4(),
            archived_at: Utc::now(),
            log_file,
            summary,
        }
    }
}

pub mod archive;
pub mod device_log;

pub use archive::SessionArchive;
pub use device_log::DeviceLog;
