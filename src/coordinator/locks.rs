//! Collection-scoped exclusive locks.
//!
//! One `tokio` semaphore with a single permit per collection; the parked
//! [`OwnedSemaphorePermit`] is the lock. Acquisition suspends until the
//! permit is granted or the timeout elapses, so a user-triggered manual
//! sync and the background scheduler can never reconcile the same
//! collection at the same time.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{OwnedSemaphorePermit, Semaphore};
use tokio::time::timeout;
use tracing::debug;

use super::types::LockId;
use super::SyncCoordinator;
use crate::error::SyncError;
use crate::metrics;

/// A granted lock, parked until release.
pub(super) struct HeldLock {
    pub(super) collection: String,
    _permit: OwnedSemaphorePermit,
}

impl SyncCoordinator {
    /// Reserve exclusive access to a collection's sync state.
    ///
    /// At most one holder per collection exists at any instant; a second
    /// caller suspends until the holder releases or `timeout_after`
    /// elapses, then fails with [`SyncError::LockTimeout`].
    pub async fn acquire_lock(
        &self,
        collection: &str,
        timeout_after: Duration,
    ) -> Result<LockId, SyncError> {
        let semaphore = self
            .locks
            .entry(collection.to_string())
            .or_insert_with(|| Arc::new(Semaphore::new(1)))
            .clone();

        match timeout(timeout_after, semaphore.acquire_owned()).await {
            Ok(Ok(permit)) => {
                let id = LockId::new();
                self.held.insert(
                    id,
                    HeldLock {
                        collection: collection.to_string(),
                        _permit: permit,
                    },
                );
                debug!(collection, lock = %id, "lock acquired");
                Ok(id)
            }
            Ok(Err(_)) => Err(SyncError::Storage(format!(
                "lock semaphore for '{collection}' closed"
            ))),
            Err(_) => {
                metrics::record_lock_timeout(collection);
                Err(SyncError::LockTimeout {
                    collection: collection.to_string(),
                    waited_ms: timeout_after.as_millis() as u64,
                })
            }
        }
    }

    /// Release a previously acquired lock.
    ///
    /// Releasing an unknown or already-released id is a no-op, so callers
    /// can release unconditionally in cleanup paths.
    pub fn release_lock(&self, id: LockId) {
        if let Some((_, held)) = self.held.remove(&id) {
            debug!(collection = %held.collection, lock = %id, "lock released");
        }
    }

    /// Run `operation` while holding the collection lock.
    ///
    /// The lock is released on every exit path: normal return, error
    /// return, or cancellation of the wrapping future.
    pub async fn with_lock<F, Fut, T>(
        &self,
        collection: &str,
        timeout_after: Duration,
        operation: F,
    ) -> Result<T, SyncError>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T, SyncError>>,
    {
        let id = self.acquire_lock(collection, timeout_after).await?;
        let _guard = LockGuard {
            coordinator: self,
            id,
        };
        operation().await
    }

    /// Lock timeout from config, shared by reconciliation call sites.
    pub(super) fn lock_timeout(&self) -> Duration {
        Duration::from_millis(self.config.lock_timeout_ms)
    }
}

/// RAII release: drops with the `with_lock` future, held or cancelled.
struct LockGuard<'a> {
    coordinator: &'a SyncCoordinator,
    id: LockId,
}

impl Drop for LockGuard<'_> {
    fn drop(&mut self) {
        self.coordinator.release_lock(self.id);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::coordinator::SyncCoordinator;

    #[tokio::test]
    async fn test_lock_is_exclusive_per_collection() {
        let coordinator = SyncCoordinator::for_tests();

        let first = coordinator
            .acquire_lock("matches", Duration::from_millis(100))
            .await
            .unwrap();

        let second = coordinator
            .acquire_lock("matches", Duration::from_millis(50))
            .await;
        assert!(matches!(
            second,
            Err(SyncError::LockTimeout { waited_ms: 50, .. })
        ));

        coordinator.release_lock(first);
        let third = coordinator
            .acquire_lock("matches", Duration::from_millis(100))
            .await;
        assert!(third.is_ok());
    }

    #[tokio::test]
    async fn test_collections_lock_independently() {
        let coordinator = SyncCoordinator::for_tests();

        let _matches = coordinator
            .acquire_lock("matches", Duration::from_millis(100))
            .await
            .unwrap();
        let players = coordinator
            .acquire_lock("players", Duration::from_millis(100))
            .await;
        assert!(players.is_ok());
    }

    #[tokio::test]
    async fn test_release_unknown_lock_is_noop() {
        let coordinator = SyncCoordinator::for_tests();

        let id = coordinator
            .acquire_lock("matches", Duration::from_millis(100))
            .await
            .unwrap();
        coordinator.release_lock(id);
        coordinator.release_lock(id); // second release must not panic
    }

    #[tokio::test]
    async fn test_with_lock_releases_after_success() {
        let coordinator = SyncCoordinator::for_tests();

        let value = coordinator
            .with_lock("matches", Duration::from_millis(100), || async { Ok(7) })
            .await
            .unwrap();
        assert_eq!(value, 7);

        // Immediately acquirable again.
        let id = coordinator
            .acquire_lock("matches", Duration::from_millis(50))
            .await;
        assert!(id.is_ok());
    }

    #[tokio::test]
    async fn test_with_lock_releases_after_failure() {
        let coordinator = SyncCoordinator::for_tests();

        let result: Result<(), _> = coordinator
            .with_lock("matches", Duration::from_millis(100), || async {
                Err(SyncError::Network("injected".into()))
            })
            .await;
        assert!(result.is_err());

        let id = coordinator
            .acquire_lock("matches", Duration::from_millis(50))
            .await;
        assert!(id.is_ok());
    }

    #[tokio::test]
    async fn test_with_lock_releases_when_cancelled() {
        let coordinator = Arc::new(SyncCoordinator::for_tests());

        let held = coordinator.clone();
        let task = tokio::spawn(async move {
            held.with_lock("matches", Duration::from_millis(100), || async {
                tokio::time::sleep(Duration::from_secs(60)).await;
                Ok(())
            })
            .await
        });

        // Let the task take the lock, then cancel it mid-operation.
        tokio::time::sleep(Duration::from_millis(50)).await;
        task.abort();
        let _ = task.await;

        let id = coordinator
            .acquire_lock("matches", Duration::from_millis(500))
            .await;
        assert!(id.is_ok());
    }
}
