// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! Local replica store: durable, schema-validated storage that works with
//! no connectivity at all.
//!
//! One SQLite database holds every collection, keyed by `(collection, id)`.
//! Each row carries the serialized payload, its last-modified timestamp and a
//! dirty flag marking unpushed local changes. A `sync_meta` table stores the
//! per-collection reconciliation checkpoint.
//!
//! All operations are synchronous-fast: the connection sits behind a
//! [`parking_lot::Mutex`] with short critical sections and nothing here ever
//! touches the network. Reconciliation-facing methods (`dirty_entities`,
//! `apply_remote`, `mark_clean`, `set_checkpoint`) are only called by the
//! coordinator while it holds the collection's sync lock. Application
//! writes take no such lock, so the clearing side (`apply_remote`,
//! `mark_clean`) is timestamp-guarded against writes racing a push.

use parking_lot::Mutex;
use rusqlite::{params, Connection, OptionalExtension};
use serde_json::Value;
use std::collections::BTreeSet;
use std::path::Path;
use std::sync::Arc;
use tracing::debug;

use crate::entity::{now_millis, Entity, Query};
use crate::error::SyncError;
use crate::schema::SchemaRegistry;

const DDL: &str = "
CREATE TABLE IF NOT EXISTS entities (
    collection TEXT NOT NULL,
    id         TEXT NOT NULL,
    content    TEXT NOT NULL,
    updated_at INTEGER NOT NULL,
    dirty      INTEGER NOT NULL DEFAULT 0,
    PRIMARY KEY (collection, id)
);
CREATE INDEX IF NOT EXISTS idx_entities_dirty ON entities (collection, dirty);
CREATE TABLE IF NOT EXISTS sync_meta (
    collection TEXT PRIMARY KEY,
    checkpoint INTEGER NOT NULL DEFAULT 0
);
";

/// The local replica store.
pub struct SqliteReplica {
    conn: Mutex<Connection>,
    schemas: Arc<SchemaRegistry>,
}

impl SqliteReplica {
    /// Open (or create) a durable replica at `path`.
    pub fn open(path: impl AsRef<Path>, schemas: Arc<SchemaRegistry>) -> Result<Self, SyncError> {
        let conn = Connection::open(path)?;
        let _mode: String = conn.query_row("PRAGMA journal_mode = WAL", [], |row| row.get(0))?;
        conn.execute_batch("PRAGMA synchronous = NORMAL;")?;
        Self::with_connection(conn, schemas)
    }

    /// An in-memory replica. State is lost on drop; intended for tests and
    /// demos.
    pub fn in_memory(schemas: Arc<SchemaRegistry>) -> Result<Self, SyncError> {
        Self::with_connection(Connection::open_in_memory()?, schemas)
    }

    fn with_connection(conn: Connection, schemas: Arc<SchemaRegistry>) -> Result<Self, SyncError> {
        conn.execute_batch(DDL)?;
        Ok(Self {
            conn: Mutex::new(conn),
            schemas,
        })
    }

    /// The schema registry backing this replica.
    #[must_use]
    pub fn schemas(&self) -> &SchemaRegistry {
        &self.schemas
    }

    /// Persist a new entity and mark it dirty.
    ///
    /// Fails with [`SyncError::Validation`] if the payload does not satisfy
    /// the collection schema, and with [`SyncError::Storage`] if the id
    /// already exists (edits go through [`SqliteReplica::update`]).
    pub fn insert(&self, collection: &str, entity: &Entity) -> Result<(), SyncError> {
        self.schemas.validate(collection, &entity.content)?;
        let content = serde_json::to_string(&entity.content)?;

        let conn = self.conn.lock();
        let result = conn.execute(
            "INSERT INTO entities (collection, id, content, updated_at, dirty)
             VALUES (?1, ?2, ?3, ?4, 1)",
            params![collection, entity.id, content, entity.updated_at],
        );
        match result {
            Ok(_) => {
                debug!(collection, id = %entity.id, "inserted local entity");
                Ok(())
            }
            Err(rusqlite::Error::SqliteFailure(e, _))
                if e.code == rusqlite::ErrorCode::ConstraintViolation =>
            {
                Err(SyncError::Storage(format!(
                    "entity '{}' already exists in '{collection}'",
                    entity.id
                )))
            }
            Err(e) => Err(e.into()),
        }
    }

    /// Shallow-merge a patch into an existing entity, bump its last-modified
    /// timestamp and mark it dirty. Returns the updated entity.
    pub fn update(&self, collection: &str, id: &str, patch: &Value) -> Result<Entity, SyncError> {
        let conn = self.conn.lock();
        let existing: Option<(String, i64)> = conn
            .query_row(
                "SELECT content, updated_at FROM entities WHERE collection = ?1 AND id = ?2",
                params![collection, id],
                |row| Ok((row.get(0)?, row.get(1)?)),
            )
            .optional()?;
        let Some((raw, previous_ts)) = existing else {
            return Err(SyncError::NotFound {
                collection: collection.to_string(),
                id: id.to_string(),
            });
        };

        let mut content: Value = serde_json::from_str(&raw)?;
        match (content.as_object_mut(), patch.as_object()) {
            (Some(target), Some(fields)) => {
                for (key, value) in fields {
                    target.insert(key.clone(), value.clone());
                }
            }
            _ => content = patch.clone(),
        }
        self.schemas.validate(collection, &content)?;

        // Strictly newer than the previous write, even within one clock tick.
        let updated_at = now_millis().max(previous_ts + 1);
        conn.execute(
            "UPDATE entities SET content = ?3, updated_at = ?4, dirty = 1
             WHERE collection = ?1 AND id = ?2",
            params![collection, id, serde_json::to_string(&content)?, updated_at],
        )?;
        debug!(collection, id, "updated local entity");

        Ok(Entity {
            id: id.to_string(),
            content,
            updated_at,
            dirty: true,
        })
    }

    /// Snapshot of every entity in `collection` matching `query`, ordered by
    /// last-modified time. An empty result is a valid answer.
    pub fn find(&self, collection: &str, query: &Query) -> Result<Vec<Entity>, SyncError> {
        let conn = self.conn.lock();
        let mut stmt = conn.prepare(
            "SELECT id, content, updated_at, dirty FROM entities
             WHERE collection = ?1 ORDER BY updated_at, id",
        )?;
        let rows = stmt.query_map(params![collection], |row| {
            Ok((
                row.get::<_, String>(0)?,
                row.get::<_, String>(1)?,
                row.get::<_, i64>(2)?,
                row.get::<_, i64>(3)?,
            ))
        })?;

        let mut entities = Vec::new();
        for row in rows {
            let (id, raw, updated_at, dirty) = row?;
            let content: Value = serde_json::from_str(&raw)?;
            if query.matches(&content) {
                entities.push(Entity {
                    id,
                    content,
                    updated_at,
                    dirty: dirty != 0,
                });
            }
        }
        Ok(entities)
    }

    /// Fetch one entity by id.
    pub fn get(&self, collection: &str, id: &str) -> Result<Option<Entity>, SyncError> {
        let conn = self.conn.lock();
        let row: Option<(String, i64, i64)> = conn
            .query_row(
                "SELECT content, updated_at, dirty FROM entities
                 WHERE collection = ?1 AND id = ?2",
                params![collection, id],
                |row| Ok((row.get(0)?, row.get(1)?, row.get(2)?)),
            )
            .optional()?;
        match row {
            Some((raw, updated_at, dirty)) => Ok(Some(Entity {
                id: id.to_string(),
                content: serde_json::from_str(&raw)?,
                updated_at,
                dirty: dirty != 0,
            })),
            None => Ok(None),
        }
    }

    /// Number of entities with unpushed local changes.
    pub fn pending_count(&self, collection: &str) -> Result<u64, SyncError> {
        let conn = self.conn.lock();
        let count: i64 = conn.query_row(
            "SELECT COUNT(*) FROM entities WHERE collection = ?1 AND dirty = 1",
            params![collection],
            |row| row.get(0),
        )?;
        Ok(count as u64)
    }

    /// Every dirty entity in `collection`, oldest change first.
    pub fn dirty_entities(&self, collection: &str) -> Result<Vec<Entity>, SyncError> {
        let conn = self.conn.lock();
        let mut stmt = conn.prepare(
            "SELECT id, content, updated_at FROM entities
             WHERE collection = ?1 AND dirty = 1 ORDER BY updated_at, id",
        )?;
        let rows = stmt.query_map(params![collection], |row| {
            Ok((
                row.get::<_, String>(0)?,
                row.get::<_, String>(1)?,
                row.get::<_, i64>(2)?,
            ))
        })?;

        let mut entities = Vec::new();
        for row in rows {
            let (id, raw, updated_at) = row?;
            entities.push(Entity {
                id,
                content: serde_json::from_str(&raw)?,
                updated_at,
                dirty: true,
            });
        }
        Ok(entities)
    }

    /// Upsert an authoritative remote copy without marking it dirty.
    ///
    /// A dirty row is never overwritten blindly: with `displaces == None`
    /// the copy only lands on a missing or clean row; a conflict resolution
    /// passes the losing local copy's timestamp so the overwrite applies
    /// only while the row still carries it. Returns whether the copy
    /// landed; `false` means a local write raced in and the next cycle
    /// resolves it against a fresh snapshot.
    pub fn apply_remote(
        &self,
        collection: &str,
        entity: &Entity,
        displaces: Option<i64>,
    ) -> Result<bool, SyncError> {
        self.schemas.validate(collection, &entity.content)?;
        let content = serde_json::to_string(&entity.content)?;
        let conn = self.conn.lock();
        let applied = conn.execute(
            "INSERT INTO entities (collection, id, content, updated_at, dirty)
             VALUES (?1, ?2, ?3, ?4, 0)
             ON CONFLICT (collection, id) DO UPDATE SET
                 content = excluded.content,
                 updated_at = excluded.updated_at,
                 dirty = 0
             WHERE entities.dirty = 0 OR entities.updated_at = ?5",
            params![collection, entity.id, content, entity.updated_at, displaces],
        )?;
        Ok(applied > 0)
    }

    /// Clear the dirty flag after a successful push, adopting the server's
    /// authoritative timestamp.
    ///
    /// Guarded on `pushed_ts`, the timestamp of the copy that actually went
    /// over the wire. A write landing mid-push bumps the row past it: the
    /// row then stays dirty for the next cycle, and its timestamp is lifted
    /// above `authoritative_ts` so the pending write outranks the copy the
    /// server just accepted. Returns whether the flag was cleared.
    pub fn mark_clean(
        &self,
        collection: &str,
        id: &str,
        pushed_ts: i64,
        authoritative_ts: i64,
    ) -> Result<bool, SyncError> {
        let conn = self.conn.lock();
        let cleared = conn.execute(
            "UPDATE entities SET dirty = 0, updated_at = ?4
             WHERE collection = ?1 AND id = ?2 AND updated_at = ?3",
            params![collection, id, pushed_ts, authoritative_ts],
        )?;
        if cleared == 0 {
            conn.execute(
                "UPDATE entities SET updated_at = ?3 + 1
                 WHERE collection = ?1 AND id = ?2 AND dirty = 1 AND updated_at <= ?3",
                params![collection, id, authoritative_ts],
            )?;
        }
        Ok(cleared > 0)
    }

    /// The last successfully reconciled point for a collection. Never-synced
    /// collections report 0.
    pub fn checkpoint(&self, collection: &str) -> Result<i64, SyncError> {
        let conn = self.conn.lock();
        let checkpoint: Option<i64> = conn
            .query_row(
                "SELECT checkpoint FROM sync_meta WHERE collection = ?1",
                params![collection],
                |row| row.get(0),
            )
            .optional()?;
        Ok(checkpoint.unwrap_or(0))
    }

    /// Advance the reconciliation checkpoint.
    pub fn set_checkpoint(&self, collection: &str, checkpoint: i64) -> Result<(), SyncError> {
        let conn = self.conn.lock();
        conn.execute(
            "INSERT INTO sync_meta (collection, checkpoint) VALUES (?1, ?2)
             ON CONFLICT (collection) DO UPDATE SET checkpoint = excluded.checkpoint",
            params![collection, checkpoint],
        )?;
        Ok(())
    }

    /// Every collection this replica knows about: the registered schemas plus
    /// anything holding local state (entities or a checkpoint).
    pub fn collections(&self) -> Result<Vec<String>, SyncError> {
        let mut names: BTreeSet<String> = self.schemas.collections().into_iter().collect();
        let conn = self.conn.lock();
        let mut stmt = conn.prepare(
            "SELECT DISTINCT collection FROM entities
             UNION SELECT collection FROM sync_meta",
        )?;
        let rows = stmt.query_map([], |row| row.get::<_, String>(0))?;
        for name in rows {
            names.insert(name?);
        }
        Ok(names.into_iter().collect())
    }
}

impl std::fmt::Debug for SqliteReplica {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SqliteReplica").finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn test_replica() -> SqliteReplica {
        SqliteReplica::in_memory(Arc::new(SchemaRegistry::builtin())).unwrap()
    }

    fn score_point(id: &str, home_score: i64) -> Entity {
        Entity::new(id, json!({"id": id, "match_id": "m1", "home_score": home_score}))
    }

    #[test]
    fn insert_then_find() {
        let replica = test_replica();
        replica.insert("score_points", &score_point("p1", 5)).unwrap();

        let found = replica
            .find("score_points", &Query::eq("match_id", "m1"))
            .unwrap();
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].id, "p1");
        assert!(found[0].dirty, "local writes start dirty");
    }

    #[test]
    fn insert_rejects_schema_violations() {
        let replica = test_replica();
        let bad = Entity::new("p1", json!({"id": "p1", "home_score": "five"}));
        let err = replica.insert("score_points", &bad).unwrap_err();
        assert!(matches!(err, SyncError::Validation { .. }));

        // Nothing persisted.
        assert_eq!(
            replica.find("score_points", &Query::all()).unwrap().len(),
            0
        );
    }

    #[test]
    fn insert_duplicate_id_is_an_error() {
        let replica = test_replica();
        replica.insert("score_points", &score_point("p1", 5)).unwrap();
        let err = replica
            .insert("score_points", &score_point("p1", 6))
            .unwrap_err();
        assert!(matches!(err, SyncError::Storage(_)));
    }

    #[test]
    fn update_merges_bumps_and_dirties() {
        let replica = test_replica();
        let original = score_point("p1", 5);
        replica.insert("score_points", &original).unwrap();

        let updated = replica
            .update("score_points", "p1", &json!({"home_score": 6}))
            .unwrap();
        assert_eq!(updated.field("home_score"), Some(&json!(6)));
        assert_eq!(updated.field("match_id"), Some(&json!("m1")), "merge keeps fields");
        assert!(updated.updated_at > original.updated_at);
        assert!(updated.dirty);
    }

    #[test]
    fn update_missing_entity_is_not_found() {
        let replica = test_replica();
        let err = replica
            .update("score_points", "ghost", &json!({"home_score": 1}))
            .unwrap_err();
        assert!(matches!(err, SyncError::NotFound { .. }));
    }

    #[test]
    fn update_rejects_invalid_merge_result() {
        let replica = test_replica();
        replica.insert("score_points", &score_point("p1", 5)).unwrap();
        let err = replica
            .update("score_points", "p1", &json!({"home_score": -1}))
            .unwrap_err();
        assert!(matches!(err, SyncError::Validation { .. }));

        // Original payload untouched.
        let kept = replica.get("score_points", "p1").unwrap().unwrap();
        assert_eq!(kept.field("home_score"), Some(&json!(5)));
    }

    #[test]
    fn pending_count_tracks_dirty_rows() {
        let replica = test_replica();
        assert_eq!(replica.pending_count("score_points").unwrap(), 0);

        let p1 = score_point("p1", 1);
        replica.insert("score_points", &p1).unwrap();
        replica.insert("score_points", &score_point("p2", 2)).unwrap();
        assert_eq!(replica.pending_count("score_points").unwrap(), 2);

        assert!(replica
            .mark_clean("score_points", "p1", p1.updated_at, now_millis())
            .unwrap());
        assert_eq!(replica.pending_count("score_points").unwrap(), 1);
    }

    #[test]
    fn apply_remote_lands_on_missing_and_clean_rows() {
        let replica = test_replica();

        let remote = Entity {
            id: "p1".into(),
            content: json!({"id": "p1", "match_id": "m1", "home_score": 7}),
            updated_at: now_millis(),
            dirty: false,
        };
        assert!(replica.apply_remote("score_points", &remote, None).unwrap());

        let newer = Entity {
            id: "p1".into(),
            content: json!({"id": "p1", "match_id": "m1", "home_score": 8}),
            updated_at: remote.updated_at + 10,
            dirty: false,
        };
        assert!(replica.apply_remote("score_points", &newer, None).unwrap());

        let stored = replica.get("score_points", "p1").unwrap().unwrap();
        assert_eq!(stored.field("home_score"), Some(&json!(8)));
        assert!(!stored.dirty);
        assert_eq!(replica.pending_count("score_points").unwrap(), 0);
    }

    #[test]
    fn apply_remote_leaves_dirty_rows_alone() {
        let replica = test_replica();
        let local = score_point("p1", 5);
        replica.insert("score_points", &local).unwrap();

        let remote = Entity {
            id: "p1".into(),
            content: json!({"id": "p1", "match_id": "m1", "home_score": 7}),
            updated_at: local.updated_at + 10,
            dirty: false,
        };
        assert!(!replica.apply_remote("score_points", &remote, None).unwrap());

        // The unpushed local write survives untouched.
        let kept = replica.get("score_points", "p1").unwrap().unwrap();
        assert_eq!(kept.field("home_score"), Some(&json!(5)));
        assert!(kept.dirty);
    }

    #[test]
    fn apply_remote_displaces_only_the_compared_copy() {
        let replica = test_replica();
        let local = score_point("p1", 5);
        replica.insert("score_points", &local).unwrap();

        let remote = Entity {
            id: "p1".into(),
            content: json!({"id": "p1", "match_id": "m1", "home_score": 7}),
            updated_at: local.updated_at + 10,
            dirty: false,
        };

        // The row moved past the compared timestamp; the overwrite must
        // not land.
        let raced = replica
            .update("score_points", "p1", &json!({"home_score": 6}))
            .unwrap();
        assert!(!replica
            .apply_remote("score_points", &remote, Some(local.updated_at))
            .unwrap());
        let kept = replica.get("score_points", "p1").unwrap().unwrap();
        assert_eq!(kept.field("home_score"), Some(&json!(6)));
        assert!(kept.dirty);

        // Against the current copy the resolution applies.
        assert!(replica
            .apply_remote("score_points", &remote, Some(raced.updated_at))
            .unwrap());
        let adopted = replica.get("score_points", "p1").unwrap().unwrap();
        assert_eq!(adopted.field("home_score"), Some(&json!(7)));
        assert!(!adopted.dirty);
    }

    #[test]
    fn mark_clean_skips_rows_that_moved_past_the_push() {
        let replica = test_replica();
        let pushed = score_point("p1", 5);
        replica.insert("score_points", &pushed).unwrap();

        // A write lands between the push snapshot and the server ack.
        let raced = replica
            .update("score_points", "p1", &json!({"home_score": 6}))
            .unwrap();

        let ack = raced.updated_at + 50;
        assert!(!replica
            .mark_clean("score_points", "p1", pushed.updated_at, ack)
            .unwrap());

        let kept = replica.get("score_points", "p1").unwrap().unwrap();
        assert!(kept.dirty, "raced write must stay pending");
        assert_eq!(kept.field("home_score"), Some(&json!(6)));
        assert!(
            kept.updated_at > ack,
            "pending write must outrank the acknowledged copy"
        );

        // The next push snapshots the raced copy; its clear goes through.
        assert!(replica
            .mark_clean("score_points", "p1", kept.updated_at, ack + 50)
            .unwrap());
        let cleaned = replica.get("score_points", "p1").unwrap().unwrap();
        assert!(!cleaned.dirty);
        assert_eq!(cleaned.updated_at, ack + 50);
    }

    #[test]
    fn update_is_strictly_newer_even_within_one_tick() {
        let replica = test_replica();

        // A clean copy stamped in the future; the bump must still move
        // strictly forward.
        let future = now_millis() + 60_000;
        let remote = Entity {
            id: "p1".into(),
            content: json!({"id": "p1", "match_id": "m1", "home_score": 5}),
            updated_at: future,
            dirty: false,
        };
        replica.apply_remote("score_points", &remote, None).unwrap();

        let updated = replica
            .update("score_points", "p1", &json!({"home_score": 6}))
            .unwrap();
        assert_eq!(updated.updated_at, future + 1);
    }

    #[test]
    fn checkpoint_roundtrip() {
        let replica = test_replica();
        assert_eq!(replica.checkpoint("matches").unwrap(), 0);

        replica.set_checkpoint("matches", 1234).unwrap();
        assert_eq!(replica.checkpoint("matches").unwrap(), 1234);

        replica.set_checkpoint("matches", 5678).unwrap();
        assert_eq!(replica.checkpoint("matches").unwrap(), 5678);
    }

    #[test]
    fn collections_include_builtin_and_stateful() {
        let replica = test_replica();
        let collections = replica.collections().unwrap();
        assert!(collections.contains(&"score_points".to_string()));
        assert!(collections.contains(&"teams".to_string()));
    }

    #[test]
    fn durable_replica_survives_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("replica.db");
        let schemas = Arc::new(SchemaRegistry::builtin());

        {
            let replica = SqliteReplica::open(&path, schemas.clone()).unwrap();
            replica.insert("score_points", &score_point("p1", 5)).unwrap();
            replica.set_checkpoint("score_points", 99).unwrap();
        }

        let reopened = SqliteReplica::open(&path, schemas).unwrap();
        let found = reopened.get("score_points", "p1").unwrap().unwrap();
        assert_eq!(found.field("home_score"), Some(&json!(5)));
        assert!(found.dirty, "dirty markers survive restarts");
        assert_eq!(reopened.checkpoint("score_points").unwrap(), 99);
    }
}
