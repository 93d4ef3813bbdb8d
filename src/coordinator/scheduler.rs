//! Background scheduling for reconciliation.
//!
//! Courtside usage is bursty: long stretches of score entry with no
//! connectivity, then a hallway with wifi. The scheduler covers both with
//! a periodic cycle and an immediate cycle on reconnect, plus active
//! health probes so "reconnect" is noticed without waiting for a user
//! read to fail.

use std::time::Duration;

use tokio::sync::watch;
use tokio::time::{interval, MissedTickBehavior};
use tracing::{debug, info, warn};

use super::SyncCoordinator;

impl SyncCoordinator {
    /// Run the scheduler loop until `shutdown` flips to `true` (or its
    /// sender is dropped).
    ///
    /// Cadences, all from [`crate::SyncConfig`]:
    /// - `reconcile_all()` every `sync_interval_ms`, first pass immediately
    ///   on startup
    /// - a health probe every `health_probe_interval_ms`
    /// - one extra cycle the moment the health verdict flips back online
    ///
    /// One cycle's failure is logged and the loop keeps going.
    #[tracing::instrument(skip(self, shutdown))]
    pub async fn run(&self, mut shutdown: watch::Receiver<bool>) {
        let mut sync_tick = interval(Duration::from_millis(self.config.sync_interval_ms.max(1)));
        sync_tick.set_missed_tick_behavior(MissedTickBehavior::Delay);

        let mut probe_tick = interval(Duration::from_millis(
            self.config.health_probe_interval_ms.max(1),
        ));
        probe_tick.set_missed_tick_behavior(MissedTickBehavior::Delay);

        let mut online_rx = self.health.watch();

        info!(
            sync_interval_ms = self.config.sync_interval_ms,
            probe_interval_ms = self.config.health_probe_interval_ms,
            "sync scheduler running"
        );

        loop {
            tokio::select! {
                // Shutdown signal (a dropped sender counts as one)
                changed = shutdown.changed() => {
                    if changed.is_err() || *shutdown.borrow_and_update() {
                        info!("sync scheduler stopped");
                        return;
                    }
                }

                // Periodic full pass - first tick fires immediately
                _ = sync_tick.tick() => {
                    let report = self.reconcile_all().await;
                    if !report.is_success() {
                        warn!(failures = report.failures.len(), "scheduled cycle had failures");
                    }
                }

                // Active connectivity probe
                _ = probe_tick.tick() => {
                    self.health.probe(self.remote.as_ref()).await;
                }

                // Reconnect trigger: sync as soon as the remote is back
                changed = online_rx.changed() => {
                    if changed.is_err() {
                        continue;
                    }
                    if *online_rx.borrow_and_update() {
                        info!("connectivity restored, reconciling immediately");
                        let report = self.reconcile_all().await;
                        if !report.is_success() {
                            warn!(
                                failures = report.failures.len(),
                                "reconnect cycle had failures"
                            );
                        }
                    } else {
                        debug!("remote offline, deferring pushes until reconnect");
                    }
                }
            }
        }
    }
}
