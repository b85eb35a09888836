use chrono::{DateTime, Utc};
use std::path::PathBuf;
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{info, warn};

use super::record::{StatsRecord, StatsView};
use super::store::{StatsSnapshot, StatsStore};
use crate::detection::DetectionEvent;
use crate::error::StreamError;

/// Per-session statistics accumulator
///
/// `record` is called from the frame pipeline while `snapshot`, `reset` and
/// `persist` come from command handlers; all of them serialize on one mutex
/// that is never held across store I/O.
pub struct StatsAggregator {
    session_id: String,
    record: Mutex<StatsRecord>,
    store: Option<Arc<dyn StatsStore>>,
}

impl StatsAggregator {
    pub fn new(session_id: impl Into<String>, store: Option<Arc<dyn StatsStore>>) -> Self {
        Self::with_start(session_id, Utc::now(), store)
    }

    /// Create an aggregator whose epoch started at `session_start`
    pub fn with_start(
        session_id: impl Into<String>,
        session_start: DateTime<Utc>,
        store: Option<Arc<dyn StatsStore>>,
    ) -> Self {
        Self {
            session_id: session_id.into(),
            record: Mutex::new(StatsRecord::new(session_start)),
            store,
        }
    }

    /// Count the labels of one detection event
    pub async fn record(&self, event: &DetectionEvent) {
        if event.is_empty() {
            return;
        }

        let mut record = self.record.lock().await;
        record.record(event);
    }

    /// Current statistics
    pub async fn snapshot(&self) -> StatsView {
        let record = self.record.lock().await;
        record.view_at(Utc::now())
    }

    /// Zero all counts and restart the elapsed-time clock
    ///
    /// Does not touch a running pipeline. When a store is configured the
    /// pre-reset statistics are archived first.
    pub async fn reset(&self) {
        let archived = {
            let mut record = self.record.lock().await;
            let now = Utc::now();
            let archived = (!record.is_empty()).then(|| self.to_snapshot(&record, now));
            record.reset(now);
            archived
        };

        info!("Statistics reset for session {}", self.session_id);

        if let (Some(store), Some(snapshot)) = (&self.store, archived) {
            if let Err(e) = store.save(&snapshot).await {
                warn!("Failed to archive statistics before reset: {:#}", e);
            }
        }
    }

    /// Write the current snapshot to the configured store
    pub async fn persist(&self) -> Result<PathBuf, StreamError> {
        let store = self.store.as_ref().ok_or_else(|| {
            StreamError::Persist(anyhow::anyhow!("no statistics store configured"))
        })?;

        let snapshot = {
            let record = self.record.lock().await;
            self.to_snapshot(&record, Utc::now())
        };

        store.save(&snapshot).await.map_err(StreamError::Persist)
    }

    fn to_snapshot(&self, record: &StatsRecord, now: DateTime<Utc>) -> StatsSnapshot {
        StatsSnapshot {
            session_id: self.session_id.clone(),
            started_at: record.session_start(),
            saved_at: now,
            stats: record.view_at(now),
        }
    }
}
