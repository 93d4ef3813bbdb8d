//! Queryable history of sync attempts, per collection.
//!
//! Observability only; nothing here affects reconciliation. Every completed
//! attempt appends one [`SyncMetricRecord`]; the UI reads success rates and
//! average durations from here to render diagnostics. None of these calls
//! can fail: a collection with no history reports neutral values instead of
//! erroring.

use parking_lot::RwLock;
use serde::Serialize;
use std::collections::HashMap;
use std::time::Duration;

use crate::entity::now_millis;
use crate::metrics;

/// One completed sync attempt.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SyncMetricRecord {
    pub collection: String,
    pub duration_ms: u64,
    pub success: bool,
    /// When the attempt finished, epoch milliseconds.
    pub at: i64,
}

/// Append-only store of [`SyncMetricRecord`]s with per-collection
/// aggregation.
#[derive(Debug, Default)]
pub struct SyncMetrics {
    history: RwLock<HashMap<String, Vec<SyncMetricRecord>>>,
}

impl SyncMetrics {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Append one attempt and mirror it to the process-wide metrics facade.
    pub fn record_attempt(&self, collection: &str, duration: Duration, success: bool) {
        let record = SyncMetricRecord {
            collection: collection.to_string(),
            duration_ms: duration.as_millis() as u64,
            success,
            at: now_millis(),
        };
        metrics::record_attempt(collection, success, duration.as_secs_f64());
        self.history
            .write()
            .entry(collection.to_string())
            .or_default()
            .push(record);
    }

    /// Fraction of attempts that succeeded, in `[0.0, 1.0]`. A collection
    /// with no history reports `0.0`.
    #[must_use]
    pub fn success_rate(&self, collection: &str) -> f64 {
        let history = self.history.read();
        let Some(records) = history.get(collection) else {
            return 0.0;
        };
        if records.is_empty() {
            return 0.0;
        }
        let successes = records.iter().filter(|r| r.success).count();
        successes as f64 / records.len() as f64
    }

    /// Mean attempt duration. A collection with no history reports zero.
    #[must_use]
    pub fn average_duration(&self, collection: &str) -> Duration {
        let history = self.history.read();
        let Some(records) = history.get(collection) else {
            return Duration::ZERO;
        };
        if records.is_empty() {
            return Duration::ZERO;
        }
        let total_ms: u64 = records.iter().map(|r| r.duration_ms).sum();
        Duration::from_millis(total_ms / records.len() as u64)
    }

    /// Number of recorded attempts for a collection.
    #[must_use]
    pub fn attempts(&self, collection: &str) -> usize {
        self.history
            .read()
            .get(collection)
            .map_or(0, |records| records.len())
    }

    /// Snapshot of the raw records for diagnostics screens.
    #[must_use]
    pub fn records(&self, collection: &str) -> Vec<SyncMetricRecord> {
        self.history
            .read()
            .get(collection)
            .cloned()
            .unwrap_or_default()
    }

    /// Discard all history for one collection. Other collections keep theirs.
    pub fn clear(&self, collection: &str) {
        self.history.write().remove(collection);
    }
}
