//! # Courtside Sync
//!
//! An offline-first synchronization engine for courtside volleyball
//! statistics.
//!
//! Gym wifi is unreliable, and a scorekeeper cannot wait for it. Every
//! write lands in a local SQLite replica immediately; a background
//! coordinator reconciles the replica with the remote backend whenever
//! connectivity allows, resolving conflicts by last writer wins.
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                     Application Screens                     │
//! │  • Score entry, rosters, live stat views                    │
//! └─────────────────────────────────────────────────────────────┘
//!                              │
//!                              ▼
//! ┌─────────────────────────────────────────────────────────────┐
//! │                     DataAccessManager                       │
//! │  • Reads: remote first, local replica fallback              │
//! │  • Writes: local first, pushed by the next sync cycle       │
//! └─────────────────────────────────────────────────────────────┘
//!              │                               │
//!              ▼                               ▼
//! ┌─────────────────────────┐   ┌─────────────────────────────┐
//! │  SqliteReplica (local)  │   │  RemoteStore (HTTP backend) │
//! │  • Schema-validated     │   │  • Source of truth          │
//! │  • Dirty markers        │   │  • Authoritative timestamps │
//! └─────────────────────────┘   └─────────────────────────────┘
//!              ▲                               ▲
//!              └───────────────┬───────────────┘
//!                              │
//! ┌─────────────────────────────────────────────────────────────┐
//! │                      SyncCoordinator                        │
//! │  • Per-collection locks, status events                      │
//! │  • Pull/push reconciliation, LWW conflicts                  │
//! │  • Background scheduler + reconnect triggers                │
//! └─────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use std::sync::Arc;
//!
//! use courtside_sync::{
//!     DataAccessManager, InMemoryRemote, LoadOptions, Query, SchemaRegistry,
//!     SqliteReplica, SyncConfig, SyncCoordinator,
//! };
//! use serde_json::json;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), courtside_sync::SyncError> {
//!     let config = SyncConfig::default();
//!     let schemas = Arc::new(SchemaRegistry::builtin());
//!     let replica = Arc::new(SqliteReplica::open("courtside.db", schemas)?);
//!     let remote = Arc::new(InMemoryRemote::new());
//!
//!     let coordinator = Arc::new(SyncCoordinator::new(
//!         config.clone(),
//!         replica.clone(),
//!         remote.clone(),
//!     ));
//!     let data = DataAccessManager::new(
//!         config,
//!         replica,
//!         remote,
//!         coordinator.health().clone(),
//!     );
//!
//!     // Record a score point; lands locally even with no connectivity.
//!     data.create("score_points", json!({"match_id": "m1", "home_score": 5}))?;
//!
//!     // Push it out (the scheduler normally does this on an interval).
//!     coordinator.reconcile("score_points").await?;
//!
//!     let result = data
//!         .load_data("score_points", &Query::eq("match_id", "m1"), &LoadOptions::default())
//!         .await?;
//!     println!("{} points via {:?}", result.data.len(), result.source);
//!     Ok(())
//! }
//! ```
//!
//! ## Features
//!
//! - **Offline-first writes**: every write is durable locally before any
//!   network is involved
//! - **Schema-validated replica**: JSON Schema per collection, rejected
//!   before persistence
//! - **Per-collection locking**: reconciliation passes never overlap on a
//!   collection
//! - **Last-writer-wins conflicts**: timestamp comparison with a
//!   configurable tie-break
//! - **Status events**: broadcast streams of idle/syncing/error
//!   transitions for UI badges
//! - **Connectivity tracking**: failure-threshold health verdict with
//!   reconnect-triggered sync
//! - **Retry logic**: exponential backoff on remote calls before falling
//!   back
//!
//! ## Modules
//!
//! - [`access`]: The [`DataAccessManager`] read/write surface
//! - [`replica`]: Local SQLite replica with dirty tracking
//! - [`remote`]: The [`RemoteStore`] contract, HTTP and in-memory backends
//! - [`coordinator`]: Locks, events, reconciliation, scheduler
//! - [`schema`]: JSON Schema registry for the built-in collections
//! - [`resilience`]: Retry policies and remote health tracking
//! - [`sync_metrics`]: Queryable per-collection sync attempt history

pub mod access;
pub mod config;
pub mod coordinator;
pub mod entity;
pub mod error;
pub mod metrics;
pub mod remote;
pub mod replica;
pub mod resilience;
pub mod schema;
pub mod sync_metrics;

// Note: no `tracing` module here to avoid conflict with the tracing crate;
// the library emits through `tracing` and never installs a subscriber.

pub use access::{CachePreference, DataAccessManager, DataLoadingResult, DataSource, LoadOptions};
pub use config::{SyncConfig, TieBreak};
pub use coordinator::{
    resolve_conflict, CycleReport, EventStream, LockId, ReconcileOutcome, SyncCoordinator,
    SyncEvent, SyncStatus, Winner,
};
pub use entity::{now_millis, Entity, Query};
pub use error::{SyncError, ValidationViolation};
pub use metrics::LatencyTimer;
pub use remote::{HttpRemote, InMemoryRemote, RemoteHandle, RemoteStore};
pub use replica::SqliteReplica;
pub use resilience::{RemoteHealth, RetryConfig};
pub use schema::{CollectionSchema, SchemaRegistry};
pub use sync_metrics::{SyncMetricRecord, SyncMetrics};
