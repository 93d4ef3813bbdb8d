//! The remote source of truth, seen from the engine as an opaque
//! request/response service.
//!
//! The engine never reasons about the backend's tables or access rules; it
//! speaks the four-call contract in [`RemoteStore`] and trusts the
//! authoritative last-modified timestamps the backend returns. Production
//! wiring uses [`HttpRemote`]; tests and demos use [`InMemoryRemote`].

use async_trait::async_trait;
use std::sync::Arc;
use tokio::sync::OnceCell;

use crate::config::SyncConfig;
use crate::entity::{Entity, Query};
use crate::error::SyncError;

mod http;
mod memory;

pub use http::HttpRemote;
pub use memory::InMemoryRemote;

/// Request/response contract with the authoritative backend.
///
/// All calls are scoped to one collection. Timestamps returned by the
/// backend (`updated_at` on fetched entities, the acknowledgement of
/// [`RemoteStore::upsert`]) are authoritative and feed conflict resolution
/// and checkpoint advancement.
#[async_trait]
pub trait RemoteStore: Send + Sync {
    /// Cheap connectivity probe.
    async fn ping(&self) -> Result<(), SyncError>;

    /// Entities modified strictly after `checkpoint` (epoch milliseconds).
    async fn fetch_since(
        &self,
        collection: &str,
        checkpoint: i64,
    ) -> Result<Vec<Entity>, SyncError>;

    /// Create-or-replace one entity. Returns the backend's authoritative
    /// last-modified timestamp for the stored copy.
    async fn upsert(&self, collection: &str, entity: &Entity) -> Result<i64, SyncError>;

    /// Direct read matching `query`, for remote-first data loading.
    async fn fetch(&self, collection: &str, query: &Query) -> Result<Vec<Entity>, SyncError>;
}

/// Lazily initialized, memoized accessor for the HTTP client.
///
/// Client construction (TLS setup, connection pool) is deferred until the
/// first call actually needs the backend; afterwards every caller gets the
/// same shared client. Call sites never check readiness themselves.
///
/// # Example
///
/// ```no_run
/// use courtside_sync::{RemoteHandle, SyncConfig};
///
/// # async fn example() -> Result<(), courtside_sync::SyncError> {
/// let config = SyncConfig {
///     remote_url: Some("https://api.example.com/v1".into()),
///     ..Default::default()
/// };
/// let handle = RemoteHandle::new(&config);
/// let client = handle.get().await?; // built here, reused afterwards
/// # Ok(())
/// # }
/// ```
#[derive(Debug)]
pub struct RemoteHandle {
    base_url: Option<String>,
    api_key: Option<String>,
    client: OnceCell<Arc<HttpRemote>>,
}

impl RemoteHandle {
    #[must_use]
    pub fn new(config: &SyncConfig) -> Self {
        Self {
            base_url: config.remote_url.clone(),
            api_key: config.api_key.clone(),
            client: OnceCell::new(),
        }
    }

    /// The shared client, constructing it on first use.
    ///
    /// Fails with [`SyncError::Network`] when no remote endpoint is
    /// configured or the client cannot be built.
    pub async fn get(&self) -> Result<Arc<HttpRemote>, SyncError> {
        self.client
            .get_or_try_init(|| async {
                let Some(url) = self.base_url.as_deref() else {
                    return Err(SyncError::Network("no remote endpoint configured".into()));
                };
                Ok(Arc::new(HttpRemote::new(url, self.api_key.clone())?))
            })
            .await
            .map(Arc::clone)
    }
}
