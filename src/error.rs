// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! Error taxonomy for the sync engine.
//!
//! Every fallible operation in the crate returns [`SyncError`]. The variants
//! map one-to-one onto how the engine reacts: validation and not-found errors
//! surface to the caller immediately, lock timeouts and network failures are
//! transient and absorbed by the next sync attempt, and
//! [`SyncError::DataUnavailable`] is the only hard failure a UI should ever
//! have to render.

use thiserror::Error;

/// A single schema violation inside an entity payload.
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize)]
pub struct ValidationViolation {
    /// JSON Pointer to the offending part of the payload.
    pub instance_path: String,
    /// Human-readable description of the violation.
    pub message: String,
}

impl std::fmt::Display for ValidationViolation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        if self.instance_path.is_empty() {
            write!(f, "{}", self.message)
        } else {
            write!(f, "{}: {}", self.instance_path, self.message)
        }
    }
}

/// Errors produced by the replica, the remote client, the coordinator and the
/// data access manager.
#[derive(Error, Debug)]
pub enum SyncError {
    /// Entity payload does not satisfy the collection schema. Rejected before
    /// persistence and never retried automatically.
    #[error("validation failed for '{collection}' ({} violation(s))", violations.len())]
    Validation {
        collection: String,
        violations: Vec<ValidationViolation>,
    },

    /// An update targeted an entity that does not exist locally.
    #[error("entity '{id}' not found in '{collection}'")]
    NotFound { collection: String, id: String },

    /// The per-collection sync lock stayed contended past the caller's
    /// timeout. Transient; the next scheduled attempt retries.
    #[error("timed out after {waited_ms}ms waiting for the '{collection}' sync lock")]
    LockTimeout { collection: String, waited_ms: u64 },

    /// The remote backend is unreachable or the request failed in transport.
    /// Reads fall back to the local replica, writes stay queued as dirty.
    #[error("network error: {0}")]
    Network(String),

    /// A pull or push step failed mid-cycle. The collection status moves to
    /// `Error`, dirty markers are preserved and the cycle is retried later.
    #[error("reconciliation of '{collection}' failed during {phase}: {reason}")]
    Reconciliation {
        collection: String,
        phase: &'static str,
        reason: String,
    },

    /// Both the remote and the local replica failed to answer a read. The
    /// only error surfaced all the way to the UI as a hard failure.
    #[error("data unavailable for '{collection}' (remote: {remote}; local: {local})")]
    DataUnavailable {
        collection: String,
        remote: String,
        local: String,
    },

    /// Local database fault (SQLite, serialization, corrupt rows).
    #[error("storage error: {0}")]
    Storage(String),
}

impl SyncError {
    /// Whether the error is expected to clear on its own and should be
    /// retried by the next sync attempt rather than surfaced as fatal.
    #[must_use]
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            SyncError::LockTimeout { .. } | SyncError::Network(_) | SyncError::Reconciliation { .. }
        )
    }
}

impl From<rusqlite::Error> for SyncError {
    fn from(err: rusqlite::Error) -> Self {
        SyncError::Storage(err.to_string())
    }
}

impl From<serde_json::Error> for SyncError {
    fn from(err: serde_json::Error) -> Self {
        SyncError::Storage(format!("payload serialization: {err}"))
    }
}

impl From<reqwest::Error> for SyncError {
    fn from(err: reqwest::Error) -> Self {
        SyncError::Network(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn transient_classification() {
        let lock = SyncError::LockTimeout {
            collection: "matches".into(),
            waited_ms: 2000,
        };
        let network = SyncError::Network("connection refused".into());
        let validation = SyncError::Validation {
            collection: "matches".into(),
            violations: vec![],
        };

        assert!(lock.is_transient());
        assert!(network.is_transient());
        assert!(!validation.is_transient());
    }

    #[test]
    fn violation_display_includes_path() {
        let violation = ValidationViolation {
            instance_path: "/home_score".into(),
            message: "-1 is less than the minimum of 0".into(),
        };
        assert_eq!(
            violation.to_string(),
            "/home_score: -1 is less than the minimum of 0"
        );
    }

    #[test]
    fn messages_name_the_collection() {
        let err = SyncError::Reconciliation {
            collection: "score_points".into(),
            phase: "push",
            reason: "connection reset".into(),
        };
        assert!(err.to_string().contains("score_points"));
        assert!(err.to_string().contains("push"));
    }
}
