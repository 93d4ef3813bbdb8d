// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! JSON Schema validation for the built-in collections.
//!
//! Every entity write into the local replica is validated against its
//! collection's schema before it is persisted. The registry ships compiled
//! validators for the six volleyball collections; callers can register
//! additional collections at construction time.

use serde_json::{json, Value};
use std::collections::BTreeMap;

use crate::error::{SyncError, ValidationViolation};

/// A compiled JSON Schema for one collection.
pub struct CollectionSchema {
    name: String,
    validator: jsonschema::Validator,
}

impl CollectionSchema {
    /// Compile a schema document. Fails if the document is not a valid
    /// JSON Schema.
    pub fn new(name: impl Into<String>, schema: &Value) -> Result<Self, SyncError> {
        let name = name.into();
        let validator = jsonschema::validator_for(schema)
            .map_err(|e| SyncError::Storage(format!("invalid schema for '{name}': {e}")))?;
        Ok(Self { name, validator })
    }

    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Collect every violation of `payload` against this schema.
    #[must_use]
    pub fn violations(&self, payload: &Value) -> Vec<ValidationViolation> {
        self.validator
            .iter_errors(payload)
            .map(|error| ValidationViolation {
                instance_path: error.instance_path().to_string(),
                message: error.to_string(),
            })
            .collect()
    }
}

impl std::fmt::Debug for CollectionSchema {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CollectionSchema")
            .field("name", &self.name)
            .finish_non_exhaustive()
    }
}

/// The set of collections the replica is willing to store, with their
/// compiled validators.
#[derive(Debug, Default)]
pub struct SchemaRegistry {
    schemas: BTreeMap<String, CollectionSchema>,
}

impl SchemaRegistry {
    /// An empty registry. Mostly useful as a base for custom collections.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// The registry with the six built-in volleyball collections: `matches`,
    /// `sets`, `score_points`, `players`, `player_stats` and `teams`.
    #[must_use]
    pub fn builtin() -> Self {
        let mut registry = Self::new();
        for (name, schema) in builtin_schemas() {
            // Built-in schemas are static documents; compiling them cannot fail.
            if let Ok(compiled) = CollectionSchema::new(name, &schema) {
                registry.schemas.insert(compiled.name.clone(), compiled);
            }
        }
        registry
    }

    /// Register (or replace) a collection schema.
    pub fn register(&mut self, name: impl Into<String>, schema: &Value) -> Result<(), SyncError> {
        let compiled = CollectionSchema::new(name, schema)?;
        self.schemas.insert(compiled.name.clone(), compiled);
        Ok(())
    }

    /// Whether a collection is known to the registry.
    #[must_use]
    pub fn contains(&self, collection: &str) -> bool {
        self.schemas.contains_key(collection)
    }

    /// Names of all registered collections, sorted.
    #[must_use]
    pub fn collections(&self) -> Vec<String> {
        self.schemas.keys().cloned().collect()
    }

    /// Validate a payload against its collection schema.
    ///
    /// Unknown collections are rejected: the replica only stores shapes it
    /// knows how to reconcile.
    pub fn validate(&self, collection: &str, payload: &Value) -> Result<(), SyncError> {
        let Some(schema) = self.schemas.get(collection) else {
            return Err(SyncError::Validation {
                collection: collection.to_string(),
                violations: vec![ValidationViolation {
                    instance_path: String::new(),
                    message: format!("unknown collection '{collection}'"),
                }],
            });
        };
        let violations = schema.violations(payload);
        if violations.is_empty() {
            Ok(())
        } else {
            Err(SyncError::Validation {
                collection: collection.to_string(),
                violations,
            })
        }
    }
}

/// Schema documents for the built-in collections.
///
/// Each schema requires `id` plus the fields reconciliation and the stat
/// screens rely on; additional properties are allowed so older clients can
/// sync forward-compatible payloads.
fn builtin_schemas() -> Vec<(&'static str, Value)> {
    vec![
        (
            "matches",
            json!({
                "type": "object",
                "required": ["id", "home_team", "away_team"],
                "properties": {
                    "id": {"type": "string", "minLength": 1},
                    "home_team": {"type": "string"},
                    "away_team": {"type": "string"},
                    "date": {"type": "string"},
                    "location": {"type": "string"},
                    "home_sets": {"type": "integer", "minimum": 0},
                    "away_sets": {"type": "integer", "minimum": 0},
                    "finished": {"type": "boolean"}
                }
            }),
        ),
        (
            "sets",
            json!({
                "type": "object",
                "required": ["id", "match_id", "number"],
                "properties": {
                    "id": {"type": "string", "minLength": 1},
                    "match_id": {"type": "string", "minLength": 1},
                    "number": {"type": "integer", "minimum": 1, "maximum": 5},
                    "home_score": {"type": "integer", "minimum": 0},
                    "away_score": {"type": "integer", "minimum": 0},
                    "finished": {"type": "boolean"}
                }
            }),
        ),
        (
            "score_points",
            json!({
                "type": "object",
                "required": ["id", "match_id"],
                "properties": {
                    "id": {"type": "string", "minLength": 1},
                    "match_id": {"type": "string", "minLength": 1},
                    "set_number": {"type": "integer", "minimum": 1, "maximum": 5},
                    "home_score": {"type": "integer", "minimum": 0},
                    "away_score": {"type": "integer", "minimum": 0},
                    "scorer_id": {"type": ["string", "null"]},
                    "skill": {
                        "type": "string",
                        "enum": ["attack", "block", "serve", "opponent_error", "other"]
                    }
                }
            }),
        ),
        (
            "players",
            json!({
                "type": "object",
                "required": ["id", "name"],
                "properties": {
                    "id": {"type": "string", "minLength": 1},
                    "name": {"type": "string", "minLength": 1},
                    "number": {"type": "integer", "minimum": 0},
                    "position": {"type": "string"},
                    "team_id": {"type": "string"}
                }
            }),
        ),
        (
            "player_stats",
            json!({
                "type": "object",
                "required": ["id", "player_id", "match_id"],
                "properties": {
                    "id": {"type": "string", "minLength": 1},
                    "player_id": {"type": "string", "minLength": 1},
                    "match_id": {"type": "string", "minLength": 1},
                    "attacks": {"type": "integer", "minimum": 0},
                    "blocks": {"type": "integer", "minimum": 0},
                    "serves": {"type": "integer", "minimum": 0},
                    "errors": {"type": "integer", "minimum": 0}
                }
            }),
        ),
        (
            "teams",
            json!({
                "type": "object",
                "required": ["id", "name"],
                "properties": {
                    "id": {"type": "string", "minLength": 1},
                    "name": {"type": "string", "minLength": 1},
                    "club": {"type": "string"}
                }
            }),
        ),
    ]
}
