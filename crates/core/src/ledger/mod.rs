use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::Result;

/// Record of the most recent live upload.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LedgerEntry {
    pub last_filepath: PathBuf,
    pub last_video_id: String,
    pub published_at: DateTime<Utc>,
}

/// JSON state file that stops the same timelapse being uploaded twice.
#[derive(Debug, Clone)]
pub struct UploadLedger {
    path: PathBuf,
}

impl UploadLedger {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// The stored entry. A missing or unreadable file counts as empty.
    pub fn load(&self) -> Option<LedgerEntry> {
        let raw = match std::fs::read_to_string(&self.path) {
            Ok(raw) => raw,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return None,
            Err(e) => {
                tracing::warn!(path = %self.path.display(), error = %e, "cannot read upload ledger");
                return None;
            }
        };
        match serde_json::from_str(&raw) {
            Ok(entry) => Some(entry),
            Err(e) => {
                tracing::warn!(path = %self.path.display(), error = %e, "ignoring corrupt upload ledger");
                None
            }
        }
    }

    /// Whether `timelapse` is the file recorded by the last upload.
    pub fn already_published(&self, timelapse: &Path) -> bool {
        let Some(entry) = self.load() else {
            return false;
        };
        match (
            entry.last_filepath.canonicalize(),
            timelapse.canonicalize(),
        ) {
            (Ok(recorded), Ok(candidate)) => recorded == candidate,
            _ => false,
        }
    }

    pub fn record(&self, timelapse: &Path, video_id: &str) -> Result<()> {
        let entry = LedgerEntry {
            last_filepath: timelapse.canonicalize()?,
            last_video_id: video_id.to_string(),
            published_at: Utc::now(),
        };
        if let Some(parent) = self.path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        // Staged write; the rename replaces the old file atomically.
        let staging = self.path.with_extension("json.tmp");
        std::fs::write(&staging, serde_json::to_vec_pretty(&entry)?)?;
        std::fs::rename(&staging, &self.path)?;
        Ok(())
    }
}
