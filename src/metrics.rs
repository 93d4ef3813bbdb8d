// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! Metrics instrumentation for the sync engine.
//!
//! Uses the `metrics` crate for backend-agnostic metrics collection.
//! The embedding application is responsible for choosing the exporter
//! (Prometheus, OTEL, etc.); without a recorder installed every call here
//! is a no-op.
//!
//! # Metric Naming Convention
//! - `courtside_sync_` prefix for all metrics
//! - `_total` suffix for counters
//! - `_seconds` suffix for duration histograms
//!
//! # Labels
//! - `collection`: matches, sets, score_points, players, player_stats, teams
//! - `outcome`: success, failure
//! - `source`: remote, local_fallback, local_first
//!
//! This facade is the process-wide, label-oriented view. The queryable
//! per-collection history the UI reads lives in
//! [`crate::sync_metrics::SyncMetrics`].

use metrics::{counter, gauge, histogram};
use std::time::Instant;

/// Counter: reconciliation attempts, labels `collection`, `outcome`.
pub const METRIC_SYNC_ATTEMPTS: &str = "courtside_sync_attempts_total";
/// Histogram: full reconciliation cycle duration, label `collection`.
pub const METRIC_SYNC_DURATION: &str = "courtside_sync_cycle_seconds";
/// Counter: resolved conflicts, labels `collection`, `winner`.
pub const METRIC_SYNC_CONFLICTS: &str = "courtside_sync_conflicts_total";
/// Counter: lock acquisitions that timed out, label `collection`.
pub const METRIC_LOCK_TIMEOUTS: &str = "courtside_sync_lock_timeouts_total";
/// Counter: data loads, labels `collection`, `source`.
pub const METRIC_READS: &str = "courtside_sync_reads_total";
/// Counter: optimistic local writes, label `collection`.
pub const METRIC_WRITES: &str = "courtside_sync_writes_total";
/// Gauge: current unpushed local changes, label `collection`.
pub const METRIC_PENDING: &str = "courtside_sync_pending_changes";
/// Histogram: remote round-trip latency, label `collection`.
pub const METRIC_REMOTE_LATENCY: &str = "courtside_sync_remote_seconds";
/// Counter: status events dropped because a subscriber lagged.
pub const METRIC_EVENTS_LAGGED: &str = "courtside_sync_events_lagged_total";

/// Record one reconciliation attempt, successful or not.
pub fn record_attempt(collection: &str, success: bool, duration_secs: f64) {
    let outcome = if success { "success" } else { "failure" };
    counter!(
        METRIC_SYNC_ATTEMPTS,
        "collection" => collection.to_string(),
        "outcome" => outcome
    )
    .increment(1);
    histogram!(
        METRIC_SYNC_DURATION,
        "collection" => collection.to_string()
    )
    .record(duration_secs);
}

/// Record one resolved conflict; `winner` is `"local"` or `"remote"`.
pub fn record_conflict(collection: &str, winner: &'static str) {
    counter!(
        METRIC_SYNC_CONFLICTS,
        "collection" => collection.to_string(),
        "winner" => winner
    )
    .increment(1);
}

/// Record a lock acquisition that gave up after its timeout.
pub fn record_lock_timeout(collection: &str) {
    counter!(
        METRIC_LOCK_TIMEOUTS,
        "collection" => collection.to_string()
    )
    .increment(1);
}

/// Record one data load; `source` is `"remote"`, `"local_fallback"` or
/// `"local_first"`.
pub fn record_read(collection: &str, source: &'static str) {
    counter!(
        METRIC_READS,
        "collection" => collection.to_string(),
        "source" => source
    )
    .increment(1);
}

/// Record one optimistic local write.
pub fn record_write(collection: &str) {
    counter!(METRIC_WRITES, "collection" => collection.to_string()).increment(1);
}

/// Set the current pending-change count for a collection.
pub fn gauge_pending(collection: &str, pending: u64) {
    gauge!(METRIC_PENDING, "collection" => collection.to_string()).set(pending as f64);
}

/// Record that a lagged event subscriber skipped `missed` events.
pub fn record_events_lagged(missed: u64) {
    counter!(METRIC_EVENTS_LAGGED).increment(missed);
}

/// A timing guard that records latency on drop.
///
/// ```
/// use courtside_sync::metrics::{LatencyTimer, METRIC_REMOTE_LATENCY};
///
/// {
///     let _timer = LatencyTimer::new(METRIC_REMOTE_LATENCY, "matches");
///     // ... the timed call ...
/// } // recorded here
/// ```
pub struct LatencyTimer {
    metric: &'static str,
    collection: String,
    start: Instant,
}

impl LatencyTimer {
    /// Start a new latency timer.
    #[must_use]
    pub fn new(metric: &'static str, collection: &str) -> Self {
        Self {
            metric,
            collection: collection.to_string(),
            start: Instant::now(),
        }
    }
}

impl Drop for LatencyTimer {
    fn drop(&mut self) {
        histogram!(self.metric, "collection" => self.collection.clone())
            .record(self.start.elapsed().as_secs_f64());
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    // These tests verify the API compiles and doesn't panic without a
    // recorder. The demo uses metrics-util's DebuggingRecorder for real
    // assertions on emitted values.

    #[test]
    fn test_record_attempt() {
        record_attempt("score_points", true, 0.25);
        record_attempt("score_points", false, 1.5);
        record_attempt("matches", true, 0.02);
    }

    #[test]
    fn test_record_conflict() {
        record_conflict("score_points", "remote");
        record_conflict("score_points", "local");
    }

    #[test]
    fn test_read_write_counters() {
        record_read("matches", "remote");
        record_read("matches", "local_fallback");
        record_read("sets", "local_first");
        record_write("score_points");
    }

    #[test]
    fn test_gauges_and_timeouts() {
        gauge_pending("score_points", 3);
        gauge_pending("score_points", 0);
        record_lock_timeout("matches");
        record_events_lagged(2);
    }

    #[test]
    fn test_latency_timer() {
        {
            let _timer = LatencyTimer::new(METRIC_REMOTE_LATENCY, "matches");
            // Simulate some work
            std::thread::sleep(Duration::from_micros(10));
        }
        // Timer recorded on drop
    }
}
