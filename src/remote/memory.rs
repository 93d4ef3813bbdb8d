//! In-memory remote backend for tests and demos.
//!
//! Behaves like the real backend at the contract level: upserts are stamped
//! with strictly monotonic authoritative timestamps, `fetch_since` is
//! exclusive of the checkpoint, and an offline switch makes every call fail
//! with [`SyncError::Network`] to simulate losing connectivity courtside.

use async_trait::async_trait;
use dashmap::DashMap;
use parking_lot::Mutex;
use std::sync::atomic::{AtomicBool, Ordering};

use crate::entity::{now_millis, Entity, Query};
use crate::error::SyncError;

use super::RemoteStore;

/// A [`RemoteStore`] living entirely in process memory.
#[derive(Debug, Default)]
pub struct InMemoryRemote {
    collections: DashMap<String, DashMap<String, Entity>>,
    clock: Mutex<i64>,
    offline: AtomicBool,
}

impl InMemoryRemote {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Flip simulated connectivity. While offline, every contract call
    /// returns [`SyncError::Network`].
    pub fn set_online(&self, online: bool) {
        self.offline.store(!online, Ordering::SeqCst);
    }

    #[must_use]
    pub fn is_online(&self) -> bool {
        !self.offline.load(Ordering::SeqCst)
    }

    /// Store an entity exactly as given, preserving its timestamp. Test and
    /// demo seeding; real writes go through [`RemoteStore::upsert`].
    pub fn seed(&self, collection: &str, entity: Entity) {
        let stored = Entity {
            dirty: false,
            ..entity
        };
        self.collections
            .entry(collection.to_string())
            .or_default()
            .insert(stored.id.clone(), stored);
    }

    /// Direct lookup of the stored copy, bypassing the contract.
    #[must_use]
    pub fn entity(&self, collection: &str, id: &str) -> Option<Entity> {
        self.collections
            .get(collection)
            .and_then(|entities| entities.get(id).map(|e| e.clone()))
    }

    /// Number of entities stored for a collection.
    #[must_use]
    pub fn len(&self, collection: &str) -> usize {
        self.collections
            .get(collection)
            .map_or(0, |entities| entities.len())
    }

    #[must_use]
    pub fn is_empty(&self, collection: &str) -> bool {
        self.len(collection) == 0
    }

    /// Authoritative timestamps: wall clock, but strictly monotonic even
    /// when several upserts land in the same millisecond.
    fn next_ts(&self) -> i64 {
        let mut clock = self.clock.lock();
        *clock = (*clock + 1).max(now_millis());
        *clock
    }

    fn check_online(&self) -> Result<(), SyncError> {
        if self.is_online() {
            Ok(())
        } else {
            Err(SyncError::Network("remote unreachable (offline)".into()))
        }
    }
}

#[async_trait]
impl RemoteStore for InMemoryRemote {
    async fn ping(&self) -> Result<(), SyncError> {
        self.check_online()
    }

    async fn fetch_since(
        &self,
        collection: &str,
        checkpoint: i64,
    ) -> Result<Vec<Entity>, SyncError> {
        self.check_online()?;
        let mut entities: Vec<Entity> = self
            .collections
            .get(collection)
            .map(|stored| {
                stored
                    .iter()
                    .filter(|e| e.updated_at > checkpoint)
                    .map(|e| e.value().clone())
                    .collect()
            })
            .unwrap_or_default();
        entities.sort_by(|a, b| {
            a.updated_at
                .cmp(&b.updated_at)
                .then_with(|| a.id.cmp(&b.id))
        });
        Ok(entities)
    }

    async fn upsert(&self, collection: &str, entity: &Entity) -> Result<i64, SyncError> {
        self.check_online()?;
        let updated_at = self.next_ts();
        let stored = Entity {
            id: entity.id.clone(),
            content: entity.content.clone(),
            updated_at,
            dirty: false,
        };
        self.collections
            .entry(collection.to_string())
            .or_default()
            .insert(stored.id.clone(), stored);
        Ok(updated_at)
    }

    async fn fetch(&self, collection: &str, query: &Query) -> Result<Vec<Entity>, SyncError> {
        self.check_online()?;
        let mut entities: Vec<Entity> = self
            .collections
            .get(collection)
            .map(|stored| {
                stored
                    .iter()
                    .filter(|e| query.matches(&e.content))
                    .map(|e| e.value().clone())
                    .collect()
            })
            .unwrap_or_default();
        entities.sort_by(|a, b| {
            a.updated_at
                .cmp(&b.updated_at)
                .then_with(|| a.id.cmp(&b.id))
        });
        Ok(entities)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::sync::Arc;

    fn score_point(id: &str) -> Entity {
        Entity::new(id, json!({"id": id, "match_id": "m1", "home_score": 1}))
    }

    #[tokio::test]
    async fn upsert_assigns_monotonic_timestamps() {
        let remote = InMemoryRemote::new();
        let first = remote.upsert("score_points", &score_point("p1")).await.unwrap();
        let second = remote.upsert("score_points", &score_point("p2")).await.unwrap();
        assert!(second > first);
    }

    #[tokio::test]
    async fn fetch_since_is_exclusive_of_the_checkpoint() {
        let remote = InMemoryRemote::new();
        let mut seeded = score_point("p1");
        seeded.updated_at = 100;
        remote.seed("score_points", seeded);

        assert!(remote.fetch_since("score_points", 100).await.unwrap().is_empty());
        assert_eq!(remote.fetch_since("score_points", 99).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn offline_mode_fails_every_call() {
        let remote = InMemoryRemote::new();
        remote.set_online(false);

        assert!(matches!(remote.ping().await, Err(SyncError::Network(_))));
        assert!(matches!(
            remote.fetch("score_points", &Query::all()).await,
            Err(SyncError::Network(_))
        ));
        assert!(matches!(
            remote.upsert("score_points", &score_point("p1")).await,
            Err(SyncError::Network(_))
        ));

        remote.set_online(true);
        assert!(remote.ping().await.is_ok());
    }

    #[tokio::test]
    async fn fetch_filters_by_query() {
        let remote = InMemoryRemote::new();
        remote
            .upsert("score_points", &score_point("p1"))
            .await
            .unwrap();
        remote
            .upsert(
                "score_points",
                &Entity::new("p2", json!({"id": "p2", "match_id": "m2", "home_score": 3})),
            )
            .await
            .unwrap();

        let hits = remote
            .fetch("score_points", &Query::eq("match_id", "m1"))
            .await
            .unwrap();
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].id, "p1");
    }

    #[tokio::test]
    async fn concurrent_upserts_get_distinct_timestamps() {
        let remote = Arc::new(InMemoryRemote::new());
        let mut handles = Vec::new();
        for i in 0..10 {
            let remote = remote.clone();
            handles.push(tokio::spawn(async move {
                remote
                    .upsert("score_points", &score_point(&format!("p{i}")))
                    .await
                    .unwrap()
            }));
        }

        let mut stamps = Vec::new();
        for handle in handles {
            stamps.push(handle.await.unwrap());
        }
        stamps.sort_unstable();
        stamps.dedup();
        assert_eq!(stamps.len(), 10, "every upsert gets its own timestamp");
    }
}
