//! Configuration for the sync engine.
//!
//! # Example
//!
//! ```
//! use courtside_sync::{SyncConfig, TieBreak};
//!
//! // Minimal config (uses defaults)
//! let config = SyncConfig::default();
//! assert_eq!(config.lock_timeout_ms, 5_000);
//! assert_eq!(config.tie_break, TieBreak::Remote);
//!
//! // Full config
//! let config = SyncConfig {
//!     remote_url: Some("https://api.example.com/v1".into()),
//!     replica_path: Some("courtside.db".into()),
//!     sync_interval_ms: 15_000,
//!     ..Default::default()
//! };
//! ```

use serde::Deserialize;

/// Which side wins a conflict when local and remote last-modified timestamps
/// are exactly equal.
///
/// The default is [`TieBreak::Remote`]: preferring the server copy on a tie
/// avoids duplicate-push loops where two devices keep re-pushing the same
/// write at each other.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TieBreak {
    /// The remote copy wins on equal timestamps.
    Remote,
    /// The local copy wins on equal timestamps.
    Local,
}

impl Default for TieBreak {
    fn default() -> Self {
        TieBreak::Remote
    }
}

/// Configuration for the sync engine.
///
/// All fields have sensible defaults. At minimum, you should configure
/// `remote_url` and `replica_path` for production use; without them the
/// engine runs against an in-memory replica and whatever remote you wire in.
#[derive(Debug, Clone, Deserialize)]
pub struct SyncConfig {
    /// Base URL of the remote backend (e.g., "https://api.example.com/v1")
    #[serde(default)]
    pub remote_url: Option<String>,

    /// Bearer token presented to the remote backend
    #[serde(default)]
    pub api_key: Option<String>,

    /// Path of the local replica database (None = in-memory, for tests)
    #[serde(default)]
    pub replica_path: Option<String>,

    /// How long acquire_lock waits for a contended collection lock (default: 5s)
    #[serde(default = "default_lock_timeout_ms")]
    pub lock_timeout_ms: u64,

    /// Period of the background reconciliation loop (default: 30s)
    #[serde(default = "default_sync_interval_ms")]
    pub sync_interval_ms: u64,

    /// How old a collection checkpoint may be before a local-first read
    /// retries the remote anyway (default: 60s)
    #[serde(default = "default_staleness_tolerance_ms")]
    pub staleness_tolerance_ms: u64,

    /// Buffered capacity of each status event channel (default: 64)
    #[serde(default = "default_event_buffer")]
    pub event_buffer: usize,

    /// Conflict policy for equal last-modified timestamps
    #[serde(default)]
    pub tie_break: TieBreak,

    /// Period of background connectivity probes (default: 10s)
    #[serde(default = "default_health_probe_interval_ms")]
    pub health_probe_interval_ms: u64,

    /// Consecutive remote failures before the engine considers itself
    /// offline (default: 3)
    #[serde(default = "default_health_failure_threshold")]
    pub health_failure_threshold: u64,
}

fn default_lock_timeout_ms() -> u64 {
    5_000
}
fn default_sync_interval_ms() -> u64 {
    30_000
}
fn default_staleness_tolerance_ms() -> u64 {
    60_000
}
fn default_event_buffer() -> usize {
    64
}
fn default_health_probe_interval_ms() -> u64 {
    10_000
}
fn default_health_failure_threshold() -> u64 {
    3
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            remote_url: None,
            api_key: None,
            replica_path: None,
            lock_timeout_ms: default_lock_timeout_ms(),
            sync_interval_ms: default_sync_interval_ms(),
            staleness_tolerance_ms: default_staleness_tolerance_ms(),
            event_buffer: default_event_buffer(),
            tie_break: TieBreak::default(),
            health_probe_interval_ms: default_health_probe_interval_ms(),
            health_failure_threshold: default_health_failure_threshold(),
        }
    }
}
