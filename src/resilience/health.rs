//! Connectivity tracking for the remote source of truth.
//!
//! Courtside networks flap. Rather than let every read discover the outage
//! on its own, remote call sites report outcomes here and the rest of the
//! engine consults one shared verdict. Transitions are published on a
//! watch channel so the scheduler can trigger a sync pass the moment
//! connectivity returns.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};

use tokio::sync::{watch, Mutex};
use tracing::{debug, info, warn};

use crate::remote::RemoteStore;

/// Health checker for the remote endpoint.
///
/// A single failure does not mark the remote offline; scorekeepers hit
/// one-off packet loss all the time. Only `failure_threshold` consecutive
/// failures flip the verdict, while a single success restores it.
pub struct RemoteHealth {
    /// Last known health state
    healthy: AtomicBool,
    /// Consecutive failure count
    failures: AtomicU64,
    /// Consecutive failures required before we consider the remote offline
    failure_threshold: u64,
    /// Publishes offline/online transitions to interested run loops
    online_tx: watch::Sender<bool>,
    /// Lock for active probes (prevent thundering herd)
    probing: Mutex<()>,
}

impl RemoteHealth {
    pub fn new(failure_threshold: u64) -> Self {
        let (online_tx, _) = watch::channel(true);
        Self {
            healthy: AtomicBool::new(true), // Assume healthy until proven otherwise
            failures: AtomicU64::new(0),
            failure_threshold: failure_threshold.max(1),
            online_tx,
            probing: Mutex::new(()),
        }
    }

    /// Record a successful remote operation.
    pub fn record_success(&self) {
        self.failures.store(0, Ordering::Release);
        if !self.healthy.swap(true, Ordering::AcqRel) {
            info!("remote connectivity restored");
            self.online_tx.send_replace(true);
        }
    }

    /// Record a failed remote operation.
    pub fn record_failure(&self) {
        let failures = self.failures.fetch_add(1, Ordering::AcqRel) + 1;
        if failures >= self.failure_threshold && self.healthy.swap(false, Ordering::AcqRel) {
            warn!(failures, "remote considered offline, serving from local replica");
            self.online_tx.send_replace(false);
        }
    }

    /// Check if the remote is considered reachable.
    pub fn is_online(&self) -> bool {
        self.healthy.load(Ordering::Acquire)
    }

    /// Get consecutive failure count.
    pub fn failure_count(&self) -> u64 {
        self.failures.load(Ordering::Acquire)
    }

    /// Subscribe to offline/online transitions. The receiver holds the
    /// current verdict immediately.
    pub fn watch(&self) -> watch::Receiver<bool> {
        self.online_tx.subscribe()
    }

    /// Actively probe the remote and fold the result into the verdict.
    ///
    /// Concurrent probes collapse into one; callers that lose the race get
    /// the current verdict without issuing a second ping.
    pub async fn probe(&self, remote: &dyn RemoteStore) -> bool {
        let Ok(_guard) = self.probing.try_lock() else {
            return self.is_online();
        };

        match remote.ping().await {
            Ok(()) => {
                self.record_success();
                true
            }
            Err(err) => {
                debug!(error = %err, "health probe failed");
                self.record_failure();
                false
            }
        }
    }
}

impl std::fmt::Debug for RemoteHealth {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RemoteHealth")
            .field("healthy", &self.is_online())
            .field("failures", &self.failure_count())
            .field("failure_threshold", &self.failure_threshold)
            .finish()
    }
}
