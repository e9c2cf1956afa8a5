use std::path::{Path, PathBuf};

use async_trait::async_trait;
use tokio::fs::{self, OpenOptions};
use tokio::io::AsyncWriteExt;

use crate::core::upload::{ActivityError, ActivityEvent, ActivityLog};

/// Append-only JSONL sink for upload activity, one event per line.
/// Failures here are reported but the orchestrator treats them as
/// non-fatal; an upload never fails because its log entry did.
pub struct FileActivityLog {
    path: PathBuf,
}

impl FileActivityLog {
    pub fn new(path: impl AsRef<Path>) -> Self {
        Self {
            path: path.as_ref().to_path_buf(),
        }
    }
}

#[async_trait]
impl ActivityLog for FileActivityLog {
    async fn record(&self, event: ActivityEvent) -> Result<(), ActivityError> {
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent)
                .await
                .map_err(|e| ActivityError::Sink(e.to_string()))?;
        }

        let mut line =
            serde_json::to_string(&event).map_err(|e| ActivityError::Sink(e.to_string()))?;
        line.push('\n');

        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)
            .await
            .map_err(|e| ActivityError::Sink(e.to_string()))?;
        file.write_all(line.as_bytes())
            .await
            .map_err(|e| ActivityError::Sink(e.to_string()))?;
        // write_all only fills tokio's internal buffer; flush so the
        // event is actually on disk before we report success.
        file.flush()
            .await
            .map_err(|e| ActivityError::Sink(e.to_string()))
    }
}
