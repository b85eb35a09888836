use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::detection::DetectionEvent;

/// Smallest elapsed time used as the frequency denominator (one second)
pub const MIN_ELAPSED_MINUTES: f64 = 1.0 / 60.0;

/// Elapsed time since the statistics epoch started
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SessionDuration {
    /// Total elapsed seconds
    pub seconds: f64,

    /// Total elapsed minutes
    pub minutes: f64,

    /// Total elapsed hours
    pub hours: f64,
}

/// Counts and per-minute frequencies for one label category
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct LabelStats {
    /// Occurrences per label since the last reset
    pub counts: BTreeMap<String, u64>,

    /// Occurrences per minute of elapsed time
    pub frequencies: BTreeMap<String, f64>,
}

/// Point-in-time view of a session's statistics
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StatsView {
    pub session_duration: SessionDuration,
    pub gestures: LabelStats,
    pub expressions: LabelStats,
}

/// Raw detection counts for one session
#[derive(Debug, Clone)]
pub struct StatsRecord {
    gesture_counts: BTreeMap<String, u64>,
    expression_counts: BTreeMap<String, u64>,
    session_start: DateTime<Utc>,
}

impl StatsRecord {
    pub fn new(session_start: DateTime<Utc>) -> Self {
        Self {
            gesture_counts: BTreeMap::new(),
            expression_counts: BTreeMap::new(),
            session_start,
        }
    }

    /// When the current statistics epoch started
    pub fn session_start(&self) -> DateTime<Utc> {
        self.session_start
    }

    pub fn is_empty(&self) -> bool {
        self.gesture_counts.is_empty() && self.expression_counts.is_empty()
    }

    /// Add one count per label occurrence in `event`
    pub fn record(&mut self, event: &DetectionEvent) {
        for gesture in &event.gestures {
            *self
                .gesture_counts
                .entry(gesture.as_str().to_string())
                .or_insert(0) += 1;
        }

        for expression in &event.expressions {
            *self
                .expression_counts
                .entry(expression.as_str().to_string())
                .or_insert(0) += 1;
        }
    }

    /// Zero all counts and restart the epoch at `now`
    pub fn reset(&mut self, now: DateTime<Utc>) {
        self.gesture_counts.clear();
        self.expression_counts.clear();
        self.session_start = now;
    }

    /// Derive the view as of `now`
    pub fn view_at(&self, now: DateTime<Utc>) -> StatsView {
        let elapsed_ms = now
            .signed_duration_since(self.session_start)
            .num_milliseconds()
            .max(0);
        let seconds = elapsed_ms as f64 / 1000.0;
        let minutes = seconds / 60.0;

        StatsView {
            session_duration: SessionDuration {
                seconds,
                minutes,
                hours: minutes / 60.0,
            },
            gestures: label_stats(&self.gesture_counts, minutes),
            expressions: label_stats(&self.expression_counts, minutes),
        }
    }
}

fn label_stats(counts: &BTreeMap<String, u64>, elapsed_minutes: f64) -> LabelStats {
    let denominator = elapsed_minutes.max(MIN_ELAPSED_MINUTES);

    LabelStats {
        counts: counts.clone(),
        frequencies: counts
            .iter()
            .map(|(label, &count)| (label.clone(), count as f64 / denominator))
            .collect(),
    }
}
