//! Durable context graph store.
//!
//! Typed nodes with directed "reference" relationships, explicit
//! caller-driven importance decay, and threshold-based pruning. Also the
//! overflow destination for compacted conversation summaries.
//!
//! There is no background sweeper: decay and pruning run only when a caller
//! invokes them.

// SQLite returns i64; node counts and ages are non-negative and small.
#![allow(clippy::cast_possible_truncation)]
#![allow(clippy::cast_sign_loss)]
#![allow(clippy::cast_possible_wrap)]

use crate::models::{
    ContextMap, ContextNode, ContextValue, NodeId, RelatedNode, Summary, map_from_json,
    map_to_json,
};
use crate::storage::{acquire_lock, apply_pragmas, op_failed};
use crate::{Result, current_timestamp};
use lru::LruCache;
use rusqlite::{Connection, OptionalExtension, Row, params};
use std::num::NonZeroUsize;
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use std::time::Duration;
use tracing::instrument;

/// Importance below which aged nodes become prunable.
const PRUNE_IMPORTANCE_THRESHOLD: f64 = 0.5;

/// Filter for [`ContextGraphStore::query_relevant`].
#[derive(Debug, Clone, Default)]
pub struct NodeQuery {
    /// Restrict to a node type.
    pub node_type: Option<String>,
    /// Restrict to nodes created within this window.
    pub within: Option<Duration>,
    /// Maximum results.
    pub limit: usize,
}

impl NodeQuery {
    /// Creates a query returning up to `limit` nodes.
    #[must_use]
    pub fn latest(limit: usize) -> Self {
        Self {
            limit,
            ..Self::default()
        }
    }

    /// Restricts the query to one node type.
    #[must_use]
    pub fn with_type(mut self, node_type: impl Into<String>) -> Self {
        self.node_type = Some(node_type.into());
        self
    }

    /// Restricts the query to a recency window.
    #[must_use]
    pub const fn with_within(mut self, within: Duration) -> Self {
        self.within = Some(within);
        self
    }
}

/// SQLite-backed context graph store.
///
/// # Concurrency Model
///
/// A `Mutex<Connection>` with WAL mode and `busy_timeout`. One logical writer
/// per store instance; every operation is a single short transaction.
///
/// # Schema
///
/// - `context_nodes`: typed nodes with importance
/// - `context_relations`: directed edges with strength
/// - `conversation_summaries`: compacted conversation segments per session
pub struct ContextGraphStore {
    /// Connection to the `SQLite` database.
    conn: Mutex<Connection>,
    /// Recently touched nodes, mirrored so importance updates apply to both
    /// the persisted and the cached copy.
    cache: Mutex<LruCache<NodeId, ContextNode>>,
    /// Path to the database (None for in-memory).
    db_path: Option<PathBuf>,
}

impl ContextGraphStore {
    /// Creates a new store at the given path.
    ///
    /// # Errors
    ///
    /// Returns an error if the database cannot be opened or initialized.
    pub fn new(db_path: impl Into<PathBuf>, cache_capacity: usize) -> Result<Self> {
        let db_path = db_path.into();
        let conn = Connection::open(&db_path).map_err(|e| op_failed("open_context_store", &e))?;
        let store = Self {
            conn: Mutex::new(conn),
            cache: Mutex::new(LruCache::new(cache_cap(cache_capacity))),
            db_path: Some(db_path),
        };
        store.initialize()?;
        Ok(store)
    }

    /// Creates an in-memory store (useful for testing).
    ///
    /// # Errors
    ///
    /// Returns an error if the database cannot be initialized.
    pub fn in_memory() -> Result<Self> {
        let conn =
            Connection::open_in_memory().map_err(|e| op_failed("open_context_store_memory", &e))?;
        let store = Self {
            conn: Mutex::new(conn),
            cache: Mutex::new(LruCache::new(cache_cap(256))),
            db_path: None,
        };
        store.initialize()?;
        Ok(store)
    }

    /// Returns the database path.
    #[must_use]
    pub fn db_path(&self) -> Option<&Path> {
        self.db_path.as_deref()
    }

    fn initialize(&self) -> Result<()> {
        let conn = acquire_lock(&self.conn);
        apply_pragmas(&conn);

        conn.execute(
            "CREATE TABLE IF NOT EXISTS context_nodes (
                id TEXT PRIMARY KEY,
                node_type TEXT NOT NULL,
                content TEXT NOT NULL,
                timestamp INTEGER NOT NULL,
                importance REAL NOT NULL DEFAULT 1.0
            )",
            [],
        )
        .map_err(|e| op_failed("create_context_nodes_table", &e))?;

        conn.execute(
            "CREATE TABLE IF NOT EXISTS context_relations (
                source_id TEXT NOT NULL,
                target_id TEXT NOT NULL,
                relation_type TEXT NOT NULL DEFAULT 'reference',
                strength REAL NOT NULL DEFAULT 1.0,
                PRIMARY KEY (source_id, target_id, relation_type)
            )",
            [],
        )
        .map_err(|e| op_failed("create_context_relations_table", &e))?;

        conn.execute(
            "CREATE TABLE IF NOT EXISTS conversation_summaries (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                session_id TEXT NOT NULL,
                timestamp INTEGER NOT NULL,
                importance REAL NOT NULL,
                topics TEXT NOT NULL,
                messages TEXT NOT NULL,
                modalities TEXT NOT NULL
            )",
            [],
        )
        .map_err(|e| op_failed("create_conversation_summaries_table", &e))?;

        let _ = conn.execute(
            "CREATE INDEX IF NOT EXISTS idx_context_nodes_type ON context_nodes(node_type)",
            [],
        );
        let _ = conn.execute(
            "CREATE INDEX IF NOT EXISTS idx_context_nodes_importance
             ON context_nodes(importance DESC)",
            [],
        );
        let _ = conn.execute(
            "CREATE INDEX IF NOT EXISTS idx_context_relations_source
             ON context_relations(source_id)",
            [],
        );
        let _ = conn.execute(
            "CREATE INDEX IF NOT EXISTS idx_conversation_summaries_session
             ON conversation_summaries(session_id)",
            [],
        );

        Ok(())
    }

    fn parse_node_row(row: &Row<'_>) -> rusqlite::Result<ContextNode> {
        let id: String = row.get("id")?;
        let node_type: String = row.get("node_type")?;
        let content_json: String = row.get("content")?;
        let timestamp: i64 = row.get("timestamp")?;
        let importance: f64 = row.get("importance")?;

        Ok(ContextNode {
            id: NodeId::new(id),
            node_type,
            content: map_from_json(&content_json),
            timestamp: timestamp as u64,
            importance,
            references: Vec::new(),
        })
    }

    fn load_references(conn: &Connection, id: &NodeId) -> Vec<NodeId> {
        let Ok(mut stmt) =
            conn.prepare("SELECT target_id FROM context_relations WHERE source_id = ?1")
        else {
            return Vec::new();
        };
        stmt.query_map(params![id.as_str()], |row| {
            row.get::<_, String>(0).map(NodeId::new)
        })
        .map(|rows| rows.filter_map(std::result::Result::ok).collect())
        .unwrap_or_default()
    }

    // ========================================================================
    // Node Operations
    // ========================================================================

    /// Adds a node with importance 1.0 and `reference` edges to each related
    /// id, and returns the generated id.
    ///
    /// # Errors
    ///
    /// Returns an error if the insert fails.
    #[instrument(skip(self, content, related), fields(node_type = %node_type))]
    pub fn add_node(
        &self,
        node_type: &str,
        content: ContextMap,
        related: &[NodeId],
    ) -> Result<NodeId> {
        let mut node = ContextNode::new(node_type, content);
        node.references = related.to_vec();

        let conn = acquire_lock(&self.conn);
        conn.execute(
            "INSERT INTO context_nodes (id, node_type, content, timestamp, importance)
             VALUES (?1, ?2, ?3, ?4, ?5)",
            params![
                node.id.as_str(),
                node.node_type,
                map_to_json(&node.content),
                node.timestamp as i64,
                node.importance,
            ],
        )
        .map_err(|e| op_failed("add_node", &e))?;

        for target in related {
            conn.execute(
                "INSERT OR REPLACE INTO context_relations
                 (source_id, target_id, relation_type, strength)
                 VALUES (?1, ?2, 'reference', 1.0)",
                params![node.id.as_str(), target.as_str()],
            )
            .map_err(|e| op_failed("add_node_relation", &e))?;
        }
        drop(conn);

        let id = node.id.clone();
        if let Ok(mut cache) = self.cache.lock() {
            cache.put(id.clone(), node);
        }

        metrics::counter!("context_nodes_stored_total").increment(1);
        Ok(id)
    }

    /// Fetches a node by id, consulting the hot cache first.
    ///
    /// # Errors
    ///
    /// Returns an error if the query fails.
    #[instrument(skip(self), fields(node_id = %id))]
    pub fn get_node(&self, id: &NodeId) -> Result<Option<ContextNode>> {
        if let Ok(mut cache) = self.cache.lock() {
            if let Some(node) = cache.get(id) {
                return Ok(Some(node.clone()));
            }
        }

        let conn = acquire_lock(&self.conn);
        let node = conn
            .query_row(
                "SELECT * FROM context_nodes WHERE id = ?1",
                params![id.as_str()],
                Self::parse_node_row,
            )
            .optional()
            .map_err(|e| op_failed("get_node", &e))?;

        Ok(node.map(|mut n| {
            n.references = Self::load_references(&conn, id);
            n
        }))
    }

    /// Replaces a node's content, refreshing its timestamp.
    ///
    /// Returns false (a no-op) for an unknown id.
    ///
    /// # Errors
    ///
    /// Returns an error if the update fails.
    #[instrument(skip(self, content), fields(node_id = %id))]
    pub fn update_node(&self, id: &NodeId, content: ContextMap) -> Result<bool> {
        let now = current_timestamp();
        let conn = acquire_lock(&self.conn);
        let rows = conn
            .execute(
                "UPDATE context_nodes SET content = ?1, timestamp = ?2 WHERE id = ?3",
                params![map_to_json(&content), now as i64, id.as_str()],
            )
            .map_err(|e| op_failed("update_node", &e))?;
        drop(conn);

        if rows > 0 {
            if let Ok(mut cache) = self.cache.lock() {
                if let Some(node) = cache.get_mut(id) {
                    node.content = content;
                    node.timestamp = now;
                }
            }
        }
        Ok(rows > 0)
    }

    /// Returns nodes ranked by importance descending, optionally filtered by
    /// type and recency window.
    ///
    /// # Errors
    ///
    /// Returns an error if the query fails.
    #[instrument(skip(self, query))]
    pub fn query_relevant(&self, query: &NodeQuery) -> Result<Vec<ContextNode>> {
        let conn = acquire_lock(&self.conn);

        let mut conditions = Vec::new();
        let mut params_vec: Vec<Box<dyn rusqlite::ToSql>> = Vec::new();

        if let Some(ref node_type) = query.node_type {
            conditions.push(format!("node_type = ?{}", params_vec.len() + 1));
            params_vec.push(Box::new(node_type.clone()));
        }
        if let Some(within) = query.within {
            let min_time = current_timestamp().saturating_sub(within.as_secs());
            conditions.push(format!("timestamp > ?{}", params_vec.len() + 1));
            params_vec.push(Box::new(min_time as i64));
        }

        let where_clause = if conditions.is_empty() {
            String::new()
        } else {
            format!("WHERE {}", conditions.join(" AND "))
        };
        let sql = format!(
            "SELECT * FROM context_nodes {where_clause}
             ORDER BY importance DESC, timestamp DESC LIMIT {}",
            query.limit
        );

        let mut stmt = conn
            .prepare(&sql)
            .map_err(|e| op_failed("query_relevant_prepare", &e))?;
        let param_refs: Vec<&dyn rusqlite::ToSql> = params_vec.iter().map(|p| p.as_ref()).collect();

        let nodes: Vec<ContextNode> = stmt
            .query_map(param_refs.as_slice(), Self::parse_node_row)
            .map_err(|e| op_failed("query_relevant", &e))?
            .filter_map(std::result::Result::ok)
            .collect();

        Ok(nodes
            .into_iter()
            .map(|mut n| {
                n.references = Self::load_references(&conn, &n.id);
                n
            })
            .collect())
    }

    /// Multiplies a node's importance by `factor`.
    ///
    /// Factors below 1.0 decay, above 1.0 reinforce. The change applies to
    /// both the persisted row and any cached copy. Unknown ids are a logged
    /// no-op.
    ///
    /// # Errors
    ///
    /// Returns an error if the update fails.
    #[instrument(skip(self), fields(node_id = %id))]
    pub fn update_importance(&self, id: &NodeId, factor: f64) -> Result<()> {
        let conn = acquire_lock(&self.conn);
        let rows = conn
            .execute(
                "UPDATE context_nodes SET importance = importance * ?1 WHERE id = ?2",
                params![factor, id.as_str()],
            )
            .map_err(|e| op_failed("update_importance", &e))?;
        drop(conn);

        if rows == 0 {
            tracing::debug!(node_id = %id, "update_importance on unknown node, no-op");
            return Ok(());
        }
        if let Ok(mut cache) = self.cache.lock() {
            if let Some(node) = cache.get_mut(id) {
                node.importance *= factor;
            }
        }
        Ok(())
    }

    /// Adds a directed `reference` relation between two nodes.
    ///
    /// # Errors
    ///
    /// Returns an error if the insert fails.
    #[instrument(skip(self))]
    pub fn add_relation(&self, source: &NodeId, target: &NodeId, strength: f64) -> Result<()> {
        let conn = acquire_lock(&self.conn);
        conn.execute(
            "INSERT OR REPLACE INTO context_relations
             (source_id, target_id, relation_type, strength)
             VALUES (?1, ?2, 'reference', ?3)",
            params![source.as_str(), target.as_str(), strength],
        )
        .map_err(|e| op_failed("add_relation", &e))?;
        drop(conn);

        // Cached copies of the source would carry stale references.
        if let Ok(mut cache) = self.cache.lock() {
            cache.pop(source);
        }
        metrics::counter!("context_relations_stored_total").increment(1);
        Ok(())
    }

    /// One-hop traversal over outgoing relations, ordered by edge strength
    /// descending.
    ///
    /// # Errors
    ///
    /// Returns an error if the query fails.
    #[instrument(skip(self), fields(node_id = %id))]
    pub fn get_related(&self, id: &NodeId) -> Result<Vec<RelatedNode>> {
        let conn = acquire_lock(&self.conn);
        let mut stmt = conn
            .prepare(
                "SELECT n.id, n.node_type, n.content, n.timestamp, n.importance, r.strength
                 FROM context_nodes n
                 JOIN context_relations r ON n.id = r.target_id
                 WHERE r.source_id = ?1
                 ORDER BY r.strength DESC",
            )
            .map_err(|e| op_failed("get_related_prepare", &e))?;

        let related = stmt
            .query_map(params![id.as_str()], |row| {
                let node = Self::parse_node_row(row)?;
                let strength: f64 = row.get("strength")?;
                Ok(RelatedNode { node, strength })
            })
            .map_err(|e| op_failed("get_related", &e))?
            .filter_map(std::result::Result::ok)
            .collect();

        Ok(related)
    }

    /// Deletes nodes older than `max_age` whose importance has decayed below
    /// the prune threshold, removing their relations first to preserve
    /// referential integrity. Returns the number of nodes removed.
    ///
    /// Idempotent: a second call with no intervening writes removes nothing.
    ///
    /// # Errors
    ///
    /// Returns an error if a delete fails.
    #[instrument(skip(self))]
    pub fn prune_older_than(&self, max_age: Duration) -> Result<usize> {
        let cutoff = current_timestamp().saturating_sub(max_age.as_secs()) as i64;
        let conn = acquire_lock(&self.conn);

        // Relations first
        conn.execute(
            "DELETE FROM context_relations
             WHERE source_id IN (
                SELECT id FROM context_nodes WHERE timestamp <= ?1 AND importance < ?2
             ) OR target_id IN (
                SELECT id FROM context_nodes WHERE timestamp <= ?1 AND importance < ?2
             )",
            params![cutoff, PRUNE_IMPORTANCE_THRESHOLD],
        )
        .map_err(|e| op_failed("prune_relations", &e))?;

        let removed = conn
            .execute(
                "DELETE FROM context_nodes WHERE timestamp <= ?1 AND importance < ?2",
                params![cutoff, PRUNE_IMPORTANCE_THRESHOLD],
            )
            .map_err(|e| op_failed("prune_nodes", &e))?;
        drop(conn);

        if removed > 0 {
            // Cached copies of pruned nodes must not resurface.
            if let Ok(mut cache) = self.cache.lock() {
                cache.clear();
            }
            metrics::counter!("context_nodes_pruned_total").increment(removed as u64);
        }
        Ok(removed)
    }

    /// Returns the number of stored nodes.
    ///
    /// # Errors
    ///
    /// Returns an error if the query fails.
    pub fn node_count(&self) -> Result<usize> {
        let conn = acquire_lock(&self.conn);
        let count: i64 = conn
            .query_row("SELECT COUNT(*) FROM context_nodes", [], |row| row.get(0))
            .map_err(|e| op_failed("node_count", &e))?;
        Ok(count as usize)
    }

    // ========================================================================
    // Summary Operations
    // ========================================================================

    /// Persists compacted conversation summaries for a session.
    ///
    /// # Errors
    ///
    /// Returns an error if any insert fails; callers must then retain the
    /// source segments (eviction never discards unrecorded data).
    #[instrument(skip(self, summaries), fields(session = %session_id, count = summaries.len()))]
    pub fn store_summaries(&self, session_id: &str, summaries: &[Summary]) -> Result<usize> {
        let conn = acquire_lock(&self.conn);
        for summary in summaries {
            let topics =
                serde_json::to_string(&summary.topics).unwrap_or_else(|_| "[]".to_string());
            let messages =
                serde_json::to_string(&summary.messages).unwrap_or_else(|_| "[]".to_string());
            let modalities =
                serde_json::to_string(&summary.modalities).unwrap_or_else(|_| "[]".to_string());
            conn.execute(
                "INSERT INTO conversation_summaries
                 (session_id, timestamp, importance, topics, messages, modalities)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
                params![
                    session_id,
                    summary.timestamp as i64,
                    summary.importance,
                    topics,
                    messages,
                    modalities,
                ],
            )
            .map_err(|e| op_failed("store_summaries", &e))?;
        }
        metrics::counter!("summaries_stored_total").increment(summaries.len() as u64);
        Ok(summaries.len())
    }

    /// Returns summaries whose topics overlap the query terms, ranked by
    /// topic similarity then importance.
    ///
    /// # Errors
    ///
    /// Returns an error if the query fails.
    #[instrument(skip(self))]
    pub fn query_summaries(&self, terms: &[String], limit: usize) -> Result<Vec<Summary>> {
        let conn = acquire_lock(&self.conn);
        let mut stmt = conn
            .prepare(
                "SELECT timestamp, importance, topics, messages, modalities
                 FROM conversation_summaries ORDER BY timestamp DESC",
            )
            .map_err(|e| op_failed("query_summaries_prepare", &e))?;

        let summaries: Vec<Summary> = stmt
            .query_map([], |row| {
                let timestamp: i64 = row.get(0)?;
                let importance: f64 = row.get(1)?;
                let topics_json: String = row.get(2)?;
                let messages_json: String = row.get(3)?;
                let modalities_json: String = row.get(4)?;
                Ok(Summary {
                    timestamp: timestamp as u64,
                    importance,
                    topics: serde_json::from_str(&topics_json).unwrap_or_default(),
                    messages: serde_json::from_str(&messages_json).unwrap_or_default(),
                    modalities: serde_json::from_str(&modalities_json).unwrap_or_default(),
                })
            })
            .map_err(|e| op_failed("query_summaries", &e))?
            .filter_map(std::result::Result::ok)
            .collect();
        drop(stmt);
        drop(conn);

        let query_topics = ContextValue::text_list(terms.iter().cloned());
        let mut scored: Vec<(f64, Summary)> = summaries
            .into_iter()
            .filter_map(|s| {
                let stored = ContextValue::text_list(s.topics.iter().cloned());
                let similarity = crate::relevance::score_values(&query_topics, &stored);
                (similarity > 0.0).then_some((similarity, s))
            })
            .collect();
        scored.sort_by(|a, b| {
            b.0.partial_cmp(&a.0)
                .unwrap_or(std::cmp::Ordering::Equal)
                .then_with(|| {
                    b.1.importance
                        .partial_cmp(&a.1.importance)
                        .unwrap_or(std::cmp::Ordering::Equal)
                })
        });
        Ok(scored.into_iter().take(limit).map(|(_, s)| s).collect())
    }

    /// Deletes all summaries stored for a session. Returns the count removed.
    ///
    /// # Errors
    ///
    /// Returns an error if the delete fails.
    #[instrument(skip(self))]
    pub fn clear_session(&self, session_id: &str) -> Result<usize> {
        let conn = acquire_lock(&self.conn);
        let rows = conn
            .execute(
                "DELETE FROM conversation_summaries WHERE session_id = ?1",
                params![session_id],
            )
            .map_err(|e| op_failed("clear_session", &e))?;
        Ok(rows)
    }

    /// Returns the number of stored summaries across all sessions.
    ///
    /// # Errors
    ///
    /// Returns an error if the query fails.
    pub fn summary_count(&self) -> Result<usize> {
        let conn = acquire_lock(&self.conn);
        let count: i64 = conn
            .query_row("SELECT COUNT(*) FROM conversation_summaries", [], |row| {
                row.get(0)
            })
            .map_err(|e| op_failed("summary_count", &e))?;
        Ok(count as usize)
    }

    /// Removes all nodes, relations, and summaries.
    ///
    /// # Errors
    ///
    /// Returns an error if a delete fails.
    pub fn clear(&self) -> Result<()> {
        let conn = acquire_lock(&self.conn);
        conn.execute("DELETE FROM context_relations", [])
            .map_err(|e| op_failed("clear_relations", &e))?;
        conn.execute("DELETE FROM context_nodes", [])
            .map_err(|e| op_failed("clear_nodes", &e))?;
        conn.execute("DELETE FROM conversation_summaries", [])
            .map_err(|e| op_failed("clear_summaries", &e))?;
        drop(conn);
        if let Ok(mut cache) = self.cache.lock() {
            cache.clear();
        }
        Ok(())
    }
}

fn cache_cap(capacity: usize) -> NonZeroUsize {
    NonZeroUsize::new(capacity).unwrap_or_else(|| NonZeroUsize::new(1).unwrap_or(NonZeroUsize::MIN))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::ContextValue;

    fn content(topic: &str) -> ContextMap {
        let mut map = ContextMap::new();
        map.insert("topic".to_string(), ContextValue::text(topic));
        map
    }

    #[test]
    fn test_add_and_get_node() {
        let store = ContextGraphStore::in_memory().unwrap();
        let id = store.add_node("system_state", content("boot"), &[]).unwrap();

        let node = store.get_node(&id).unwrap().unwrap();
        assert_eq!(node.node_type, "system_state");
        assert!((node.importance - 1.0).abs() < f64::EPSILON);
        assert_eq!(node.content, content("boot"));
    }

    #[test]
    fn test_references_persisted_as_relations() {
        let store = ContextGraphStore::in_memory().unwrap();
        let a = store.add_node("note", content("a"), &[]).unwrap();
        let b = store.add_node("note", content("b"), &[a.clone()]).unwrap();

        let related = store.get_related(&b).unwrap();
        assert_eq!(related.len(), 1);
        assert_eq!(related[0].node.id, a);
        assert!((related[0].strength - 1.0).abs() < f64::EPSILON);
    }

    #[test]
    fn test_get_related_ordered_by_strength() {
        let store = ContextGraphStore::in_memory().unwrap();
        let root = store.add_node("note", content("root"), &[]).unwrap();
        let weak = store.add_node("note", content("weak"), &[]).unwrap();
        let strong = store.add_node("note", content("strong"), &[]).unwrap();
        store.add_relation(&root, &weak, 0.2).unwrap();
        store.add_relation(&root, &strong, 0.9).unwrap();

        let related = store.get_related(&root).unwrap();
        assert_eq!(related[0].node.id, strong);
        assert_eq!(related[1].node.id, weak);
    }

    #[test]
    fn test_importance_monotonicity() {
        let store = ContextGraphStore::in_memory().unwrap();
        let id = store.add_node("note", content("x"), &[]).unwrap();

        store.update_importance(&id, 2.0).unwrap();
        let up = store.get_node(&id).unwrap().unwrap().importance;
        assert!(up > 1.0);

        store.update_importance(&id, 0.5).unwrap();
        let down = store.get_node(&id).unwrap().unwrap().importance;
        assert!(down < up);

        store.update_importance(&id, 1.0).unwrap();
        let same = store.get_node(&id).unwrap().unwrap().importance;
        assert!((same - down).abs() < 1e-12);
    }

    #[test]
    fn test_update_importance_unknown_id_is_noop() {
        let store = ContextGraphStore::in_memory().unwrap();
        assert!(store.update_importance(&NodeId::from("missing"), 0.5).is_ok());
    }

    #[test]
    fn test_query_relevant_ranked_and_filtered() {
        let store = ContextGraphStore::in_memory().unwrap();
        let low = store.add_node("state", content("low"), &[]).unwrap();
        let high = store.add_node("state", content("high"), &[]).unwrap();
        store.add_node("pref", content("other"), &[]).unwrap();
        store.update_importance(&low, 0.3).unwrap();
        store.update_importance(&high, 1.5).unwrap();

        let nodes = store
            .query_relevant(&NodeQuery::latest(10).with_type("state"))
            .unwrap();
        assert_eq!(nodes.len(), 2);
        assert_eq!(nodes[0].id, high);
        assert_eq!(nodes[1].id, low);
    }

    #[test]
    fn test_prune_removes_only_aged_low_importance() {
        let store = ContextGraphStore::in_memory().unwrap();
        let stale = store.add_node("note", content("stale"), &[]).unwrap();
        let fresh = store.add_node("note", content("fresh"), &[]).unwrap();
        store.update_importance(&stale, 0.1).unwrap();

        // Nothing is old enough yet
        assert_eq!(store.prune_older_than(Duration::from_secs(3600)).unwrap(), 0);

        // With a zero window everything is "old"; only the decayed node goes
        let removed = store.prune_older_than(Duration::from_secs(0)).unwrap();
        assert_eq!(removed, 1);
        assert!(store.get_node(&stale).unwrap().is_none());
        assert!(store.get_node(&fresh).unwrap().is_some());

        // Idempotent
        assert_eq!(store.prune_older_than(Duration::from_secs(0)).unwrap(), 0);
    }

    #[test]
    fn test_prune_removes_relations_of_pruned_nodes() {
        let store = ContextGraphStore::in_memory().unwrap();
        let doomed = store.add_node("note", content("doomed"), &[]).unwrap();
        let keeper = store.add_node("note", content("keeper"), &[doomed.clone()]).unwrap();
        store.update_importance(&doomed, 0.1).unwrap();

        store.prune_older_than(Duration::from_secs(0)).unwrap();
        assert!(store.get_related(&keeper).unwrap().is_empty());
    }

    #[test]
    fn test_summary_store_query_and_session_clear() {
        let store = ContextGraphStore::in_memory().unwrap();
        let summaries = vec![
            Summary {
                timestamp: 100,
                importance: 0.9,
                topics: vec!["database".to_string(), "schema".to_string()],
                messages: vec!["alter the schema".to_string(), "done".to_string()],
                modalities: vec![],
            },
            Summary {
                timestamp: 200,
                importance: 0.2,
                topics: vec!["weather".to_string()],
                messages: vec!["is it raining".to_string(), "no".to_string()],
                modalities: vec![],
            },
        ];
        store.store_summaries("session-1", &summaries).unwrap();
        assert_eq!(store.summary_count().unwrap(), 2);

        let hits = store
            .query_summaries(&["database".to_string()], 5)
            .unwrap();
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].timestamp, 100);

        assert_eq!(store.clear_session("session-1").unwrap(), 2);
        assert_eq!(store.summary_count().unwrap(), 0);
    }

    #[test]
    fn test_update_node_refreshes_content() {
        let store = ContextGraphStore::in_memory().unwrap();
        let id = store.add_node("note", content("before"), &[]).unwrap();
        assert!(store.update_node(&id, content("after")).unwrap());
        let node = store.get_node(&id).unwrap().unwrap();
        assert_eq!(node.content, content("after"));

        assert!(!store.update_node(&NodeId::from("missing"), content("x")).unwrap());
    }
}
