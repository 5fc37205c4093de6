//! # store: Snapshot persistence
//!
//! The newest snapshot is kept as `DATA_DIR/last.json` so a restart resumes
//! diffing where it left off. Writes go to `last.json.tmp` first and are
//! renamed over the old file, so readers never see a half-written document.

use std::path::{Path, PathBuf};

use chrono::Local;
use tracing::{debug, info, warn};

use crate::error::AppError;
use crate::models::Snapshot;

const LAST_FILE: &str = "last.json";
const HISTORY_DIR: &str = "data";

pub struct SnapshotStore {
    data_dir:     PathBuf,
    save_history: bool,
}

impl SnapshotStore {
    pub fn new(data_dir: impl Into<PathBuf>, save_history: bool) -> Self {
        Self { data_dir: data_dir.into(), save_history }
    }

    pub fn last_path(&self) -> PathBuf {
        self.data_dir.join(LAST_FILE)
    }

    /// Stored snapshot, or `None` when absent or unreadable.
    pub async fn load_previous(&self) -> Option<Snapshot> {
        let path = self.last_path();
        let text = match tokio::fs::read_to_string(&path).await {
            Ok(text) => text,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                debug!(path = %path.display(), "No previous snapshot on disk");
                return None;
            }
            Err(e) => {
                warn!(path = %path.display(), error = %e, "⚠️ Previous snapshot unreadable, starting fresh");
                return None;
            }
        };

        match serde_json::from_str(&text) {
            Ok(snapshot) => Some(snapshot),
            Err(e) => {
                warn!(path = %path.display(), error = %e, "⚠️ Previous snapshot corrupt, starting fresh");
                None
            }
        }
    }

    pub async fn save(&self, snapshot: &Snapshot) -> Result<(), AppError> {
        let bytes = serde_json::to_vec_pretty(snapshot)
            .map_err(|e| AppError::Storage(format!("snapshot encode: {e}")))?;
        write_atomic(&self.last_path(), &bytes).await?;
        debug!(
            models    = snapshot.models.len(),
            positions = snapshot.position_count(),
            "💾 Snapshot persisted"
        );
        Ok(())
    }

    /// Timestamped copy under `DATA_DIR/data/`, when history is enabled.
    pub async fn archive(&self, snapshot: &Snapshot) -> Result<Option<PathBuf>, AppError> {
        if !self.save_history {
            return Ok(None);
        }
        let stamp = snapshot.fetched_at.with_timezone(&Local).format("%Y%m%d_%H%M%S");
        let path = self
            .data_dir
            .join(HISTORY_DIR)
            .join(format!("positions_{stamp}.json"));

        let bytes = serde_json::to_vec_pretty(snapshot)
            .map_err(|e| AppError::Storage(format!("snapshot encode: {e}")))?;
        write_atomic(&path, &bytes).await?;
        info!(path = %path.display(), "🗄️ Snapshot archived");
        Ok(Some(path))
    }
}

/// Write `bytes` to `<path>.tmp` then rename over `path`.
pub async fn write_atomic(path: &Path, bytes: &[u8]) -> Result<(), AppError> {
    if let Some(dir) = path.parent().filter(|d| !d.as_os_str().is_empty()) {
        tokio::fs::create_dir_all(dir)
            .await
            .map_err(|e| AppError::Storage(format!("create {}: {e}", dir.display())))?;
    }

    let mut tmp = path.as_os_str().to_owned();
    tmp.push(".tmp");
    let tmp = PathBuf::from(tmp);

    tokio::fs::write(&tmp, bytes)
        .await
        .map_err(|e| AppError::Storage(format!("write {}: {e}", tmp.display())))?;
    tokio::fs::rename(&tmp, path)
        .await
        .map_err(|e| AppError::Storage(format!("rename {}: {e}", path.display())))
}
