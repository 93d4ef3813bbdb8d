//! The unit of synchronization: one entity inside one collection.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::time::{SystemTime, UNIX_EPOCH};

/// Current wall-clock time as epoch milliseconds.
///
/// All last-modified timestamps and checkpoints in the engine use this
/// representation so that local and remote copies compare directly.
#[must_use]
pub fn now_millis() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as i64)
        .unwrap_or(0)
}

/// A synchronized record: a match, set, score point, player, player stat or
/// team.
///
/// The identifier is stable across the local replica and the remote backend.
/// `updated_at` is the last-modified timestamp used for conflict resolution;
/// on entities pulled from the remote it is the server's authoritative value.
/// The dirty flag is replica-local bookkeeping (unpushed changes) and never
/// travels over the wire.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Entity {
    /// Unique identifier within its collection.
    pub id: String,
    /// The record payload as a JSON document.
    pub content: Value,
    /// Last-modified timestamp, epoch milliseconds.
    pub updated_at: i64,
    /// Unpushed local changes. Local-only; skipped in serialization.
    #[serde(skip)]
    pub dirty: bool,
}

impl Entity {
    /// Create a new entity stamped with the current time.
    pub fn new(id: impl Into<String>, content: Value) -> Self {
        Self {
            id: id.into(),
            content,
            updated_at: now_millis(),
            dirty: false,
        }
    }

    /// Look up a top-level field of the payload.
    #[must_use]
    pub fn field(&self, name: &str) -> Option<&Value> {
        self.content.get(name)
    }
}

/// A conjunction of field-equality filters over entity payloads.
///
/// The same query shape is used for local replica lookups and remote
/// fetches. An empty query matches every entity in the collection.
///
/// # Example
///
/// ```
/// use courtside_sync::Query;
/// use serde_json::json;
///
/// let query = Query::eq("match_id", "m1").and("set_number", 2);
/// assert!(query.matches(&json!({"match_id": "m1", "set_number": 2, "home_score": 5})));
/// assert!(!query.matches(&json!({"match_id": "m2", "set_number": 2})));
/// ```
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct Query {
    filters: Vec<(String, Value)>,
}

impl Query {
    /// A query matching every entity in a collection.
    #[must_use]
    pub fn all() -> Self {
        Self::default()
    }

    /// A query requiring `field == value`.
    pub fn eq(field: impl Into<String>, value: impl Into<Value>) -> Self {
        Self {
            filters: vec![(field.into(), value.into())],
        }
    }

    /// Add another `field == value` requirement.
    #[must_use]
    pub fn and(mut self, field: impl Into<String>, value: impl Into<Value>) -> Self {
        self.filters.push((field.into(), value.into()));
        self
    }

    /// The equality filters in declaration order.
    #[must_use]
    pub fn filters(&self) -> &[(String, Value)] {
        &self.filters
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.filters.is_empty()
    }

    /// Whether a payload satisfies every filter.
    #[must_use]
    pub fn matches(&self, content: &Value) -> bool {
        self.filters
            .iter()
            .all(|(field, expected)| content.get(field) == Some(expected))
    }
}
