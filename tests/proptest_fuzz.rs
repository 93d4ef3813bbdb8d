//! Property-based tests (fuzzing) for sync engine resilience.
//!
//! Uses proptest to generate random and malformed inputs and verify that
//! entity parsing, conflict resolution, query matching and schema
//! validation never panic, only return clean values or errors.
//!
//! Run with: `cargo test --test proptest_fuzz`

use proptest::prelude::*;
use serde_json::{json, Value};
use std::time::Duration;

use courtside_sync::{
    resolve_conflict, Entity, Query, SchemaRegistry, SyncMetrics, TieBreak, Winner,
};

// =============================================================================
// Strategies for generating test data
// =============================================================================

/// Generate a valid entity with a random payload of string fields
fn entity_strategy() -> impl Strategy<Value = Entity> {
    (
        "[a-z0-9]{1,12}(-[a-z0-9]{1,12}){0,3}", // ids like "p1-a3f"
        0i64..4_102_444_800_000,                // timestamps up to year 2100
        prop::collection::btree_map("[a-z_]{1,10}", "[ -~]{0,40}", 0..8),
    )
        .prop_map(|(id, ts, fields)| {
            let mut content = serde_json::Map::new();
            content.insert("id".into(), Value::String(id.clone()));
            for (key, value) in fields {
                content.insert(key, Value::String(value));
            }
            Entity {
                id,
                content: Value::Object(content),
                updated_at: ts,
                dirty: false,
            }
        })
}

/// Generate arbitrary JSON values (including shapes no schema allows)
fn arbitrary_json_strategy() -> impl Strategy<Value = Value> {
    let leaf = prop_oneof![
        Just(Value::Null),
        any::<bool>().prop_map(Value::Bool),
        any::<i64>().prop_map(|n| Value::Number(n.into())),
        ".*".prop_map(Value::String),
    ];

    leaf.prop_recursive(
        4,  // depth
        64, // max nodes
        10, // items per collection
        |inner| {
            prop_oneof![
                prop::collection::vec(inner.clone(), 0..10).prop_map(Value::Array),
                prop::collection::hash_map(".*", inner, 0..10)
                    .prop_map(|m| Value::Object(m.into_iter().collect())),
            ]
        },
    )
}

fn tie_break_strategy() -> impl Strategy<Value = TieBreak> {
    prop_oneof![Just(TieBreak::Remote), Just(TieBreak::Local)]
}

fn entity_at(ts: i64) -> Entity {
    Entity {
        id: "p1".into(),
        content: json!({"id": "p1"}),
        updated_at: ts,
        dirty: false,
    }
}

// =============================================================================
// Deserialization Fuzz Tests
// =============================================================================

proptest! {
    /// Entity deserialization should never panic on arbitrary bytes
    #[test]
    fn fuzz_entity_from_random_bytes(bytes in prop::collection::vec(any::<u8>(), 0..10000)) {
        // Should never panic, only return Err
        let result: Result<Entity, _> = serde_json::from_slice(&bytes);
        let _ = result;
    }

    /// Entity deserialization should handle arbitrary JSON gracefully
    #[test]
    fn fuzz_entity_from_arbitrary_json(json in arbitrary_json_strategy()) {
        let serialized = serde_json::to_vec(&json).unwrap();
        let result: Result<Entity, _> = serde_json::from_slice(&serialized);
        // Either parses (if the JSON happens to match the entity shape) or
        // fails cleanly
        let _ = result;
    }

    /// A corrupted serialized entity should fail gracefully
    #[test]
    fn fuzz_corrupted_entity(
        entity in entity_strategy(),
        corruption in prop::collection::vec(any::<u8>(), 1..50),
        position in 0usize..10000,
    ) {
        let serialized = serde_json::to_vec(&entity).unwrap();

        if serialized.is_empty() {
            return Ok(());
        }

        let mut corrupted = serialized.clone();
        let pos = position % corrupted.len();

        // Inject corruption
        for (i, b) in corruption.iter().enumerate() {
            let idx = (pos + i) % corrupted.len();
            corrupted[idx] ^= b;
        }

        // Should never panic
        let result: Result<Entity, _> = serde_json::from_slice(&corrupted);
        let _ = result;
    }

    /// The dirty flag is replica bookkeeping and must never ride the wire
    #[test]
    fn prop_dirty_flag_never_rides_the_wire(entity in entity_strategy()) {
        let mut dirty_copy = entity.clone();
        dirty_copy.dirty = true;

        let wire = serde_json::to_vec(&dirty_copy).unwrap();
        let back: Entity = serde_json::from_slice(&wire).unwrap();

        prop_assert!(!back.dirty, "dirty flag leaked into serialization");
        prop_assert_eq!(back.id, entity.id);
        prop_assert_eq!(back.content, entity.content);
        prop_assert_eq!(back.updated_at, entity.updated_at);
    }
}

// =============================================================================
// Conflict Resolution Invariant Tests
// =============================================================================

proptest! {
    /// The later last-modified timestamp always wins, whatever the policy
    #[test]
    fn prop_later_writer_always_wins(
        local_ts in 0i64..i64::MAX / 2,
        remote_ts in 0i64..i64::MAX / 2,
        tie_break in tie_break_strategy(),
    ) {
        if local_ts != remote_ts {
            let winner = resolve_conflict(
                &entity_at(local_ts),
                &entity_at(remote_ts),
                tie_break,
            );
            let expected = if local_ts > remote_ts {
                Winner::Local
            } else {
                Winner::Remote
            };
            prop_assert_eq!(winner, expected);
        }
    }

    /// Exact ties follow the configured policy and nothing else
    #[test]
    fn prop_ties_follow_policy(
        ts in 0i64..i64::MAX / 2,
        tie_break in tie_break_strategy(),
    ) {
        let winner = resolve_conflict(&entity_at(ts), &entity_at(ts), tie_break);
        let expected = match tie_break {
            TieBreak::Remote => Winner::Remote,
            TieBreak::Local => Winner::Local,
        };
        prop_assert_eq!(winner, expected);
    }

    /// Swapping the two sides of a non-tied conflict flips the winner
    #[test]
    fn prop_resolution_is_role_symmetric(
        ts_a in 0i64..i64::MAX / 2,
        ts_b in 0i64..i64::MAX / 2,
        tie_break in tie_break_strategy(),
    ) {
        if ts_a != ts_b {
            let forward = resolve_conflict(&entity_at(ts_a), &entity_at(ts_b), tie_break);
            let reversed = resolve_conflict(&entity_at(ts_b), &entity_at(ts_a), tie_break);
            prop_assert_ne!(forward, reversed, "the same side won both orderings");
        }
    }
}

// =============================================================================
// Query Matching Invariant Tests
// =============================================================================

proptest! {
    /// The empty query matches any payload, object or not
    #[test]
    fn prop_empty_query_matches_anything(content in arbitrary_json_strategy()) {
        prop_assert!(Query::all().matches(&content));
    }

    /// A query built from a payload's own field always matches it
    #[test]
    fn prop_query_matches_own_field(
        field in "[a-z_]{1,10}",
        value in "[ -~]{0,40}",
        other in "[ -~]{0,40}",
    ) {
        let mut map = serde_json::Map::new();
        map.insert(field.clone(), Value::String(value.clone()));
        let content = Value::Object(map);

        prop_assert!(Query::eq(&field, value.as_str()).matches(&content));
        if other != value {
            prop_assert!(!Query::eq(&field, other.as_str()).matches(&content));
        }
    }

    /// Matching arbitrary payloads never panics
    #[test]
    fn fuzz_query_matching_never_panics(
        content in arbitrary_json_strategy(),
        field in ".*",
        value in arbitrary_json_strategy(),
    ) {
        let query = Query::eq(field, value).and("match_id", "m1");
        let _ = query.matches(&content);
    }
}

// =============================================================================
// Schema Validation Fuzz Tests
// =============================================================================

proptest! {
    /// Validation of arbitrary payloads returns errors, never panics
    #[test]
    fn fuzz_validation_never_panics(
        collection in "[a-z_]{1,20}",
        payload in arbitrary_json_strategy(),
    ) {
        let registry = SchemaRegistry::builtin();
        let _ = registry.validate(&collection, &payload);
    }

    /// Well-formed score points always pass the built-in schema
    #[test]
    fn prop_well_formed_score_points_validate(
        id in "[a-z0-9-]{1,24}",
        match_id in "[a-z0-9-]{1,24}",
        home_score in 0u32..200,
        away_score in 0u32..200,
    ) {
        let registry = SchemaRegistry::builtin();
        let payload = json!({
            "id": id,
            "match_id": match_id,
            "home_score": home_score,
            "away_score": away_score,
        });
        prop_assert!(registry.validate("score_points", &payload).is_ok());
    }
}

// =============================================================================
// Sync Metrics Invariant Tests
// =============================================================================

proptest! {
    /// Success rate stays in [0, 1] and the mean never exceeds the maximum
    #[test]
    fn prop_metrics_aggregates_are_bounded(
        attempts in prop::collection::vec((0u64..10_000, any::<bool>()), 1..50),
    ) {
        let metrics = SyncMetrics::new();
        for (ms, success) in &attempts {
            metrics.record_attempt("score_points", Duration::from_millis(*ms), *success);
        }

        let rate = metrics.success_rate("score_points");
        prop_assert!((0.0..=1.0).contains(&rate));

        let successes = attempts.iter().filter(|(_, s)| *s).count();
        let expected = successes as f64 / attempts.len() as f64;
        prop_assert!((rate - expected).abs() < 1e-9);

        let max_ms = attempts.iter().map(|(ms, _)| *ms).max().unwrap_or(0);
        prop_assert!(metrics.average_duration("score_points") <= Duration::from_millis(max_ms));
        prop_assert_eq!(metrics.attempts("score_points"), attempts.len());
    }

    /// Unknown collections report neutral values instead of erroring
    #[test]
    fn prop_metrics_neutral_for_unknown_collections(collection in ".*") {
        let metrics = SyncMetrics::new();
        prop_assert_eq!(metrics.success_rate(&collection), 0.0);
        prop_assert_eq!(metrics.average_duration(&collection), Duration::ZERO);
        prop_assert_eq!(metrics.attempts(&collection), 0);
        metrics.clear(&collection);
    }
}
