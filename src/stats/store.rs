use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tracing::info;
use uuid::Uuid;

use super::record::StatsView;

/// Statistics snapshot as written to durable storage
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StatsSnapshot {
    /// Session the statistics belong to
    pub session_id: String,

    /// Start of the statistics epoch (session creation or last reset)
    pub started_at: DateTime<Utc>,

    /// When the snapshot was taken
    pub saved_at: DateTime<Utc>,

    pub stats: StatsView,
}

/// Durable storage for statistics snapshots
#[async_trait::async_trait]
pub trait StatsStore: Send + Sync {
    /// Save a snapshot, returning where it was written
    ///
    /// Snapshots sharing `session_id` and `started_at` replace each other.
    async fn save(&self, snapshot: &StatsSnapshot) -> Result<PathBuf>;
}

/// Writes snapshots as pretty-printed JSON files
///
/// File name: `stats_<session>_<YYYYmmdd_HHMMSS>.json`, where the timestamp is
/// the epoch start, so one file exists per session per reset.
#[derive(Debug, Clone)]
pub struct JsonFileStore {
    dir: PathBuf,
}

impl JsonFileStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Path a snapshot will be written to
    pub fn path_for(&self, snapshot: &StatsSnapshot) -> PathBuf {
        let session: String = snapshot.session_id.chars().take(8).collect();
        self.dir.join(format!(
            "stats_{}_{}.json",
            session,
            snapshot.started_at.format("%Y%m%d_%H%M%S")
        ))
    }
}

#[async_trait::async_trait]
impl StatsStore for JsonFileStore {
    async fn save(&self, snapshot: &StatsSnapshot) -> Result<PathBuf> {
        tokio::fs::create_dir_all(&self.dir)
            .await
            .with_context(|| format!("Failed to create stats directory {:?}", self.dir))?;

        let path = self.path_for(snapshot);
        let json = serde_json::to_vec_pretty(snapshot)?;

        // Written aside and renamed into place so concurrent saves of the same
        // epoch never leave a mixed file behind.
        let tmp_path = self.dir.join(format!(".{}.tmp", Uuid::new_v4()));
        tokio::fs::write(&tmp_path, json)
            .await
            .with_context(|| format!("Failed to write stats file {:?}", tmp_path))?;

        if let Err(e) = tokio::fs::rename(&tmp_path, &path).await {
            let _ = tokio::fs::remove_file(&tmp_path).await;
            return Err(e).with_context(|| format!("Failed to write stats file {:?}", path));
        }

        info!("Statistics saved to {}", path.display());

        Ok(path)
    }
}
