//! Public types for the sync coordinator.

use serde::Serialize;
use uuid::Uuid;

use crate::error::SyncError;

/// Per-collection sync state.
///
/// Exactly one value per collection at any instant. Use
/// [`super::SyncCoordinator::status()`] for a synchronous read or
/// [`super::SyncCoordinator::on_event()`] to watch transitions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SyncStatus {
    /// No reconciliation in flight; local and remote were consistent at the
    /// last checkpoint
    #[default]
    Idle,
    /// A reconciliation cycle is running
    Syncing,
    /// The last cycle failed; dirty entities are preserved for retry
    Error,
}

impl std::fmt::Display for SyncStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Idle => write!(f, "Idle"),
            Self::Syncing => write!(f, "Syncing"),
            Self::Error => write!(f, "Error"),
        }
    }
}

/// Opaque handle to a held collection lock.
///
/// Returned by [`super::SyncCoordinator::acquire_lock()`]; single-use.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct LockId(Uuid);

impl LockId {
    pub(super) fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl std::fmt::Display for LockId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Notification emitted once per status transition.
///
/// Carries the pending-change count at transition time so a UI badge can
/// show "3 changes waiting" next to the status without another query.
/// Never replayed: subscribers only see events emitted after they
/// subscribed.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SyncEvent {
    pub collection: String,
    pub status: SyncStatus,
    /// Dirty entities in the collection when the transition happened
    pub pending: u64,
    /// Epoch milliseconds
    pub at: i64,
}

/// Summary of one reconciliation cycle for one collection.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReconcileOutcome {
    pub collection: String,
    /// Remote entities applied to the local replica
    pub pulled: usize,
    /// Local dirty entities pushed to the remote
    pub pushed: usize,
    /// Ids modified on both sides and resolved by timestamp
    pub conflicts: usize,
    /// Checkpoint after the cycle (unchanged if nothing moved)
    pub checkpoint: i64,
}

impl ReconcileOutcome {
    /// True when the cycle moved no data in either direction.
    #[must_use]
    pub fn is_noop(&self) -> bool {
        self.pulled == 0 && self.pushed == 0
    }
}

/// Aggregate result of [`super::SyncCoordinator::reconcile_all()`].
///
/// One collection's failure never aborts the others; failures are
/// collected here instead.
#[derive(Debug)]
pub struct CycleReport {
    pub outcomes: Vec<ReconcileOutcome>,
    pub failures: Vec<(String, SyncError)>,
}

impl CycleReport {
    /// Check if every collection reconciled cleanly
    #[must_use]
    pub fn is_success(&self) -> bool {
        self.failures.is_empty()
    }

    /// Total collections attempted
    #[must_use]
    pub fn attempted(&self) -> usize {
        self.outcomes.len() + self.failures.len()
    }
}
