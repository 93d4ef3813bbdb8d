// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! Pull/push reconciliation with last-writer-wins conflict resolution.
//!
//! One cycle per collection, always under the collection lock:
//!
//! ```text
//! pull (remote since checkpoint) → resolve conflicts → push dirty → advance checkpoint
//! ```
//!
//! The checkpoint only moves after a fully clean cycle, so a mid-cycle
//! failure re-pulls the same window next time instead of skipping it.
//! Dirty markers survive every failure path; a local write is only marked
//! clean once the remote has acknowledged the exact copy that was pushed,
//! so a write landing while its entity is on the wire stays dirty and
//! rides the next cycle.

use std::collections::BTreeMap;
use std::time::Instant;

use tracing::{debug, error, info, instrument, warn};

use super::types::{CycleReport, ReconcileOutcome, SyncStatus};
use super::SyncCoordinator;
use crate::config::TieBreak;
use crate::entity::Entity;
use crate::error::SyncError;
use crate::metrics;

/// Which side of a conflict survives.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Winner {
    Local,
    Remote,
}

/// Resolve an id modified on both sides since the last cycle.
///
/// The later last-modified timestamp wins. Exact ties go to `tie_break`;
/// the default remote-wins policy avoids re-pushing an entity the server
/// already has, which would otherwise ping-pong between replicas.
#[must_use]
pub fn resolve_conflict(local: &Entity, remote: &Entity, tie_break: TieBreak) -> Winner {
    if local.updated_at > remote.updated_at {
        Winner::Local
    } else if remote.updated_at > local.updated_at {
        Winner::Remote
    } else {
        match tie_break {
            TieBreak::Remote => Winner::Remote,
            TieBreak::Local => Winner::Local,
        }
    }
}

/// Pull-phase wrapper for a pulled entity that cannot be applied locally.
fn apply_error(collection: &str, id: &str, err: SyncError) -> SyncError {
    SyncError::Reconciliation {
        collection: collection.to_string(),
        phase: "pull",
        reason: format!("apply of '{id}': {err}"),
    }
}

impl SyncCoordinator {
    /// Run one full reconciliation cycle for one collection.
    ///
    /// Takes the collection lock for the whole cycle, transitions status
    /// `Syncing → Idle` on success or `Syncing → Error` on failure, and
    /// records one metric attempt either way. A failed cycle leaves every
    /// dirty marker untouched for the next attempt.
    pub async fn reconcile(&self, collection: &str) -> Result<ReconcileOutcome, SyncError> {
        let started = Instant::now();

        let result = self
            .with_lock(collection, self.lock_timeout(), || async {
                self.set_status(collection, SyncStatus::Syncing);
                let cycle = self.run_cycle(collection).await;
                // Final status is published before the lock drops so a
                // queued pass cannot interleave its own transition.
                match &cycle {
                    Ok(_) => self.set_status(collection, SyncStatus::Idle),
                    Err(_) => self.set_status(collection, SyncStatus::Error),
                }
                cycle
            })
            .await;

        let duration = started.elapsed();
        match &result {
            Ok(outcome) => {
                self.sync_metrics.record_attempt(collection, duration, true);
                info!(
                    collection,
                    pulled = outcome.pulled,
                    pushed = outcome.pushed,
                    conflicts = outcome.conflicts,
                    checkpoint = outcome.checkpoint,
                    "reconciliation complete"
                );
            }
            Err(err) => {
                self.sync_metrics.record_attempt(collection, duration, false);
                warn!(collection, error = %err, "reconciliation failed");
            }
        }
        result
    }

    /// The locked portion of a cycle. Caller holds the collection lock.
    #[instrument(skip(self), fields(collection = %collection))]
    async fn run_cycle(&self, collection: &str) -> Result<ReconcileOutcome, SyncError> {
        let checkpoint = self.replica.checkpoint(collection)?;

        // Phase 1: pull everything the remote saw after our checkpoint.
        let pulled = match self.remote.fetch_since(collection, checkpoint).await {
            Ok(entities) => {
                self.health.record_success();
                entities
            }
            Err(err) => {
                self.health.record_failure();
                return Err(SyncError::Reconciliation {
                    collection: collection.to_string(),
                    phase: "pull",
                    reason: err.to_string(),
                });
            }
        };
        debug!(checkpoint, pulled = pulled.len(), "pull phase complete");

        let mut dirty: BTreeMap<String, Entity> = self
            .replica
            .dirty_entities(collection)?
            .into_iter()
            .map(|entity| (entity.id.clone(), entity))
            .collect();

        let mut outcome = ReconcileOutcome {
            collection: collection.to_string(),
            pulled: 0,
            pushed: 0,
            conflicts: 0,
            checkpoint,
        };
        let mut advanced = checkpoint;

        // Phase 2: apply pulls, resolving ids we also changed locally.
        // Applies are guarded: a write racing the cycle keeps its row and
        // stays dirty, so a later cycle settles it against the remote.
        for remote_entity in &pulled {
            if let Some(local_entity) = dirty.get(&remote_entity.id) {
                outcome.conflicts += 1;
                match resolve_conflict(local_entity, remote_entity, self.config.tie_break) {
                    Winner::Remote => {
                        debug!(id = %remote_entity.id, "conflict: remote copy wins");
                        metrics::record_conflict(collection, "remote");
                        // Adopting the remote copy clears the dirty marker:
                        // the losing local edit must not be re-pushed.
                        let applied = self
                            .replica
                            .apply_remote(collection, remote_entity, Some(local_entity.updated_at))
                            .map_err(|err| apply_error(collection, &remote_entity.id, err))?;
                        dirty.remove(&remote_entity.id);
                        if applied {
                            outcome.pulled += 1;
                            advanced = advanced.max(remote_entity.updated_at);
                        } else {
                            debug!(id = %remote_entity.id, "apply raced by a local write; left dirty for the next cycle");
                        }
                    }
                    Winner::Local => {
                        debug!(id = %remote_entity.id, "conflict: local copy wins");
                        metrics::record_conflict(collection, "local");
                        // Entity stays in the dirty set; the push phase
                        // sends our newer copy.
                    }
                }
            } else {
                let applied = self
                    .replica
                    .apply_remote(collection, remote_entity, None)
                    .map_err(|err| apply_error(collection, &remote_entity.id, err))?;
                if applied {
                    outcome.pulled += 1;
                    advanced = advanced.max(remote_entity.updated_at);
                } else {
                    debug!(id = %remote_entity.id, "apply raced by a local write; left dirty for the next cycle");
                }
            }
        }

        // Phase 3: push surviving dirty entities, adopting the remote's
        // authoritative timestamp for each acknowledged write.
        for (id, entity) in &dirty {
            let authoritative_ts = match self.remote.upsert(collection, entity).await {
                Ok(ts) => ts,
                Err(err) => {
                    self.health.record_failure();
                    return Err(SyncError::Reconciliation {
                        collection: collection.to_string(),
                        phase: "push",
                        reason: format!("upsert of '{id}': {err}"),
                    });
                }
            };
            // The clear only lands if the row is still the pushed snapshot.
            let cleared =
                self.replica
                    .mark_clean(collection, id, entity.updated_at, authoritative_ts)?;
            if !cleared {
                debug!(id = %id, "write landed mid-push; kept dirty for the next cycle");
            }
            advanced = advanced.max(authoritative_ts);
            outcome.pushed += 1;
        }
        if outcome.pushed > 0 {
            self.health.record_success();
            debug!(pushed = outcome.pushed, "push phase complete");
        }

        // Phase 4: the checkpoint moves only after a fully clean cycle.
        if advanced > checkpoint {
            self.replica.set_checkpoint(collection, advanced)?;
            outcome.checkpoint = advanced;
        }

        metrics::gauge_pending(collection, self.replica.pending_count(collection)?);
        Ok(outcome)
    }

    /// One cycle over every known collection.
    ///
    /// Collections reconcile concurrently; each has its own lock and its
    /// own failure slot in the report, so one offline collection cannot
    /// stall the rest.
    pub async fn reconcile_all(&self) -> CycleReport {
        let collections = match self.replica.collections() {
            Ok(list) => list,
            Err(err) => {
                error!(error = %err, "could not enumerate collections");
                return CycleReport {
                    outcomes: Vec::new(),
                    failures: vec![("*".to_string(), err)],
                };
            }
        };

        let cycles = collections.into_iter().map(|collection| async move {
            let result = self.reconcile(&collection).await;
            (collection, result)
        });

        let mut report = CycleReport {
            outcomes: Vec::new(),
            failures: Vec::new(),
        };
        for (collection, result) in futures::future::join_all(cycles).await {
            match result {
                Ok(outcome) => report.outcomes.push(outcome),
                Err(err) => report.failures.push((collection, err)),
            }
        }

        info!(
            attempted = report.attempted(),
            failures = report.failures.len(),
            "reconcile_all complete"
        );
        report
    }
}
