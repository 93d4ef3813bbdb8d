// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! One read/write surface for application code.
//!
//! Screens never talk to the replica or the remote directly; they ask the
//! [`DataAccessManager`], which decides per call whether the answer comes
//! from the network or the local replica. Reads degrade to the replica
//! when the remote is unreachable; writes always land locally first and
//! ride the next reconciliation cycle out.

use std::sync::Arc;
use std::time::Duration;

use serde_json::Value;
use tracing::{debug, instrument, warn};
use uuid::Uuid;

use crate::config::SyncConfig;
use crate::entity::{now_millis, Entity, Query};
use crate::error::SyncError;
use crate::metrics;
use crate::remote::RemoteStore;
use crate::replica::SqliteReplica;
use crate::resilience::RemoteHealth;

/// Where a successful read was served from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DataSource {
    /// Fresh from the remote source of truth
    Remote,
    /// Served by the local replica; may lag the remote
    LocalFallback,
}

/// Which side a read should try first.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum CachePreference {
    /// Ask the remote, fall back to the replica on failure
    #[default]
    RemoteFirst,
    /// Serve the replica directly while its checkpoint is fresh enough
    LocalFirst,
}

/// Per-call read options.
#[derive(Debug, Clone, Default)]
pub struct LoadOptions {
    pub preference: CachePreference,
    /// Maximum checkpoint age for serving a `LocalFirst` read without
    /// touching the remote. `None` uses the configured default.
    pub staleness_tolerance: Option<Duration>,
}

/// A successful read: the entities plus their provenance.
///
/// Callers surface [`DataSource::LocalFallback`] to the user as a "may be
/// out of date" notice; the data itself is still valid.
#[derive(Debug, Clone, PartialEq)]
pub struct DataLoadingResult {
    pub data: Vec<Entity>,
    pub source: DataSource,
}

/// Uniform data access over the remote backend and the local replica.
pub struct DataAccessManager {
    config: SyncConfig,
    replica: Arc<SqliteReplica>,
    remote: Arc<dyn RemoteStore>,
    health: Arc<RemoteHealth>,
}

impl DataAccessManager {
    /// Wire up the access surface. `health` is shared with the coordinator
    /// so reads and reconciliation agree on whether the remote is up.
    pub fn new(
        config: SyncConfig,
        replica: Arc<SqliteReplica>,
        remote: Arc<dyn RemoteStore>,
        health: Arc<RemoteHealth>,
    ) -> Self {
        Self {
            config,
            replica,
            remote,
            health,
        }
    }

    /// Load entities, degrading to the local replica when the remote is
    /// unreachable.
    ///
    /// Fails only with [`SyncError::DataUnavailable`], and only when both
    /// sides fail. An empty result from a reachable side is a valid
    /// answer, not a failure.
    #[instrument(skip(self, query, options), fields(collection = %collection))]
    pub async fn load_data(
        &self,
        collection: &str,
        query: &Query,
        options: &LoadOptions,
    ) -> Result<DataLoadingResult, SyncError> {
        if options.preference == CachePreference::LocalFirst {
            let tolerance = options
                .staleness_tolerance
                .unwrap_or(Duration::from_millis(self.config.staleness_tolerance_ms));
            let checkpoint = self.replica.checkpoint(collection)?;
            let age_ms = now_millis().saturating_sub(checkpoint);

            // A collection that has never synced has nothing fresh to
            // serve; fall through to the remote path.
            if checkpoint > 0 && age_ms <= tolerance.as_millis() as i64 {
                let data = self.replica.find(collection, query)?;
                metrics::record_read(collection, "local_first");
                debug!(age_ms, "serving local-first read");
                return Ok(DataLoadingResult {
                    data,
                    source: DataSource::LocalFallback,
                });
            }
        }

        if !self.health.is_online() {
            return self.local_fallback(collection, query, "remote marked offline");
        }

        match self.remote.fetch(collection, query).await {
            Ok(data) => {
                self.health.record_success();
                metrics::record_read(collection, "remote");
                Ok(DataLoadingResult {
                    data,
                    source: DataSource::Remote,
                })
            }
            Err(SyncError::Network(reason)) => {
                self.health.record_failure();
                self.local_fallback(collection, query, &reason)
            }
            Err(err) => Err(err),
        }
    }

    /// Create an entity with an optimistic local write.
    ///
    /// A missing `id` field is filled with a fresh v4 uuid. The entity is
    /// validated, persisted dirty, and pushed by the next reconciliation
    /// cycle; being offline delays the push, never the write.
    pub fn create(&self, collection: &str, mut content: Value) -> Result<Entity, SyncError> {
        let id = match content.get("id").and_then(Value::as_str) {
            Some(id) => id.to_string(),
            None => {
                let id = Uuid::new_v4().to_string();
                if let Some(object) = content.as_object_mut() {
                    object.insert("id".to_string(), Value::String(id.clone()));
                }
                id
            }
        };

        let entity = Entity::new(id, content);
        self.replica.insert(collection, &entity)?;
        metrics::record_write(collection);
        debug!(collection, id = %entity.id, "created locally, pending push");

        Ok(Entity {
            dirty: true,
            ..entity
        })
    }

    /// Patch an entity with an optimistic local write.
    ///
    /// Shallow-merges `patch` into the stored payload, re-validates, and
    /// marks the entity dirty for the next push.
    pub fn update(&self, collection: &str, id: &str, patch: &Value) -> Result<Entity, SyncError> {
        let entity = self.replica.update(collection, id, patch)?;
        metrics::record_write(collection);
        debug!(collection, id, "updated locally, pending push");
        Ok(entity)
    }

    fn local_fallback(
        &self,
        collection: &str,
        query: &Query,
        reason: &str,
    ) -> Result<DataLoadingResult, SyncError> {
        match self.replica.find(collection, query) {
            Ok(data) => {
                warn!(collection, reason, "remote unavailable, serving local replica");
                metrics::record_read(collection, "local_fallback");
                Ok(DataLoadingResult {
                    data,
                    source: DataSource::LocalFallback,
                })
            }
            Err(local_err) => Err(SyncError::DataUnavailable {
                collection: collection.to_string(),
                remote: reason.to_string(),
                local: local_err.to_string(),
            }),
        }
    }
}

impl std::fmt::Debug for DataAccessManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DataAccessManager").finish_non_exhaustive()
    }
}
