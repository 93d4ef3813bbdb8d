// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! Sync coordination between the local replica and the remote backend.
//!
//! The [`SyncCoordinator`] is the only component that mutates sync state.
//! It owns:
//! - per-collection exclusive locks (semaphore permits, time-bounded)
//! - per-collection [`SyncStatus`] and the event fan-out for transitions
//! - the pull/push reconciliation cycle with last-writer-wins conflicts
//! - the background scheduler (`run`) for periodic and reconnect-triggered
//!   cycles
//!
//! # Example
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use courtside_sync::{
//!     InMemoryRemote, SchemaRegistry, SqliteReplica, SyncConfig, SyncCoordinator,
//! };
//!
//! # #[tokio::main]
//! # async fn main() -> Result<(), courtside_sync::SyncError> {
//! let schemas = Arc::new(SchemaRegistry::builtin());
//! let replica = Arc::new(SqliteReplica::in_memory(schemas)?);
//! let remote = Arc::new(InMemoryRemote::new());
//! let coordinator = SyncCoordinator::new(SyncConfig::default(), replica, remote);
//!
//! let outcome = coordinator.reconcile("score_points").await?;
//! println!("pushed {} entities", outcome.pushed);
//! # Ok(())
//! # }
//! ```

mod events;
mod locks;
mod reconcile;
mod scheduler;
mod types;

pub use events::EventStream;
pub use reconcile::{resolve_conflict, Winner};
pub use types::{CycleReport, LockId, ReconcileOutcome, SyncEvent, SyncStatus};

use std::sync::Arc;

use dashmap::DashMap;
use tokio::sync::Semaphore;

use crate::config::SyncConfig;
use crate::entity::now_millis;
use crate::metrics;
use crate::remote::RemoteStore;
use crate::replica::SqliteReplica;
use crate::resilience::RemoteHealth;
use crate::sync_metrics::SyncMetrics;

use events::EventBus;
use locks::HeldLock;

/// Orchestrates reconciliation between the local replica and the remote
/// source of truth.
///
/// # Thread Safety
///
/// The coordinator is `Send + Sync` and designed to be shared as one
/// `Arc<SyncCoordinator>` across the whole process. All mutation of
/// checkpoints and dirty markers happens inside a collection's lock;
/// status reads and event subscriptions never block.
pub struct SyncCoordinator {
    config: SyncConfig,

    replica: Arc<SqliteReplica>,
    remote: Arc<dyn RemoteStore>,

    /// Shared connectivity verdict, fed by cycles and probes
    health: Arc<RemoteHealth>,

    /// Queryable per-collection attempt history
    sync_metrics: Arc<SyncMetrics>,

    /// One single-permit semaphore per collection; the permit is the lock
    locks: DashMap<String, Arc<Semaphore>>,

    /// Live grants by id, holding the parked permits
    held: DashMap<LockId, HeldLock>,

    /// Current status per collection (absent = never synced = Idle)
    statuses: DashMap<String, SyncStatus>,

    events: EventBus,
}

impl SyncCoordinator {
    /// Create a coordinator over an already-opened replica and remote.
    ///
    /// Construction is cheap and performs no I/O; the first network touch
    /// happens on the first cycle or probe.
    pub fn new(
        config: SyncConfig,
        replica: Arc<SqliteReplica>,
        remote: Arc<dyn RemoteStore>,
    ) -> Self {
        let health = Arc::new(RemoteHealth::new(config.health_failure_threshold));
        let events = EventBus::new(config.event_buffer);

        Self {
            replica,
            remote,
            health,
            sync_metrics: Arc::new(SyncMetrics::new()),
            locks: DashMap::new(),
            held: DashMap::new(),
            statuses: DashMap::new(),
            events,
            config,
        }
    }

    /// Current status of a collection. Synchronous; a collection that has
    /// never synced reports [`SyncStatus::Idle`].
    #[must_use]
    pub fn status(&self, collection: &str) -> SyncStatus {
        self.statuses
            .get(collection)
            .map(|status| *status)
            .unwrap_or_default()
    }

    /// Subscribe to every status transition, across all collections.
    #[must_use]
    pub fn on_event(&self) -> EventStream {
        self.events.subscribe_all()
    }

    /// Subscribe to one collection's status transitions.
    #[must_use]
    pub fn on_collection_event(&self, collection: &str) -> EventStream {
        self.events.subscribe(collection)
    }

    /// Shared connectivity verdict for this coordinator's remote.
    #[must_use]
    pub fn health(&self) -> &Arc<RemoteHealth> {
        &self.health
    }

    /// Queryable sync attempt history.
    #[must_use]
    pub fn sync_metrics(&self) -> &SyncMetrics {
        &self.sync_metrics
    }

    /// The local replica this coordinator reconciles.
    #[must_use]
    pub fn replica(&self) -> &SqliteReplica {
        &self.replica
    }

    /// Publish a status transition and its event.
    ///
    /// Setting the status a collection already has emits nothing: events
    /// mark transitions, not repetitions.
    fn set_status(&self, collection: &str, status: SyncStatus) {
        let previous = self.statuses.insert(collection.to_string(), status);
        if previous.unwrap_or_default() == status {
            return;
        }

        let pending = self.replica.pending_count(collection).unwrap_or(0);
        metrics::gauge_pending(collection, pending);
        self.events.emit(SyncEvent {
            collection: collection.to_string(),
            status,
            pending,
            at: now_millis(),
        });
    }

    #[cfg(test)]
    pub(crate) fn for_tests() -> Self {
        Self::for_tests_with_remote().0
    }

    #[cfg(test)]
    pub(crate) fn for_tests_with_remote() -> (Self, Arc<crate::remote::InMemoryRemote>) {
        let schemas = Arc::new(crate::schema::SchemaRegistry::builtin());
        let replica = Arc::new(SqliteReplica::in_memory(schemas).unwrap());
        let remote = Arc::new(crate::remote::InMemoryRemote::new());
        let config = SyncConfig {
            lock_timeout_ms: 1000,
            ..SyncConfig::default()
        };
        (Self::new(config, replica, remote.clone()), remote)
    }
}

impl std::fmt::Debug for SyncCoordinator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SyncCoordinator")
            .field("held_locks", &self.held.len())
            .field("collections", &self.statuses.len())
            .finish_non_exhaustive()
    }
}
