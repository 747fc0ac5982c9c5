//! Interaction pattern store.
//!
//! Patterns are keyed by (type, canonical payload JSON): observing the same
//! payload again bumps frequency and folds the outcome into the running
//! success rate instead of inserting a duplicate row.

#![allow(clippy::cast_possible_truncation)]
#![allow(clippy::cast_sign_loss)]
#![allow(clippy::cast_possible_wrap)]

use crate::models::{ContextMap, Pattern, RankedPattern, map_from_json, map_to_json};
use crate::relevance::{self, WeightTable};
use crate::storage::{acquire_lock, apply_pragmas, op_failed};
use crate::{Result, current_timestamp};
use rusqlite::{Connection, OptionalExtension, Row, params};
use std::path::PathBuf;
use std::sync::Mutex;
use std::time::Duration;
use tracing::instrument;

/// Minimum running success rate for a pattern to be considered proven.
const PROVEN_SUCCESS_RATE: f64 = 0.7;
/// Recency window for pattern matching.
const PATTERN_RECENCY: Duration = Duration::from_secs(7 * 24 * 3600);
/// Minimum weighted relevance for a pattern match.
const PATTERN_RELEVANCE_THRESHOLD: f64 = 0.5;

/// SQLite-backed interaction pattern store.
pub struct PatternStore {
    /// Connection to the `SQLite` database.
    conn: Mutex<Connection>,
    /// Path to the database (None for in-memory).
    db_path: Option<PathBuf>,
}

impl PatternStore {
    /// Creates a new store at the given path.
    ///
    /// # Errors
    ///
    /// Returns an error if the database cannot be opened or initialized.
    pub fn new(db_path: impl Into<PathBuf>) -> Result<Self> {
        let db_path = db_path.into();
        let conn = Connection::open(&db_path).map_err(|e| op_failed("open_pattern_store", &e))?;
        let store = Self {
            conn: Mutex::new(conn),
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
            Connection::open_in_memory().map_err(|e| op_failed("open_pattern_store_memory", &e))?;
        let store = Self {
            conn: Mutex::new(conn),
            db_path: None,
        };
        store.initialize()?;
        Ok(store)
    }

    /// Returns the database path.
    #[must_use]
    pub fn db_path(&self) -> Option<&std::path::Path> {
        self.db_path.as_deref()
    }

    fn initialize(&self) -> Result<()> {
        let conn = acquire_lock(&self.conn);
        apply_pragmas(&conn);

        conn.execute(
            "CREATE TABLE IF NOT EXISTS interaction_patterns (
                pattern_type TEXT NOT NULL,
                pattern_data TEXT NOT NULL,
                frequency INTEGER NOT NULL DEFAULT 1,
                success_rate REAL NOT NULL DEFAULT 1.0,
                last_used INTEGER NOT NULL,
                PRIMARY KEY (pattern_type, pattern_data)
            )",
            [],
        )
        .map_err(|e| op_failed("create_interaction_patterns_table", &e))?;

        let _ = conn.execute(
            "CREATE INDEX IF NOT EXISTS idx_interaction_patterns_type
             ON interaction_patterns(pattern_type, last_used DESC)",
            [],
        );

        Ok(())
    }

    fn parse_pattern_row(row: &Row<'_>) -> rusqlite::Result<Pattern> {
        let pattern_type: String = row.get("pattern_type")?;
        let data_json: String = row.get("pattern_data")?;
        let frequency: i64 = row.get("frequency")?;
        let success_rate: f64 = row.get("success_rate")?;
        let last_used: i64 = row.get("last_used")?;

        Ok(Pattern {
            pattern_type,
            data: map_from_json(&data_json),
            frequency: frequency as u64,
            success_rate,
            last_used: last_used as u64,
        })
    }

    /// Records an observation of a pattern.
    ///
    /// A new (type, payload) pair starts with frequency 1 and a success rate
    /// of 1.0 or 0.0; a repeat observation bumps frequency and folds the
    /// outcome into the running mean. The payload JSON is canonical (sorted
    /// keys), so structurally equal payloads always hit the same row.
    ///
    /// # Errors
    ///
    /// Returns an error if the write fails.
    #[instrument(skip(self, data), fields(pattern_type = %pattern_type))]
    pub fn record_pattern(&self, pattern_type: &str, data: &ContextMap, success: bool) -> Result<()> {
        let data_json = map_to_json(data);
        let now = current_timestamp() as i64;
        let outcome = if success { 1.0 } else { 0.0 };

        let conn = acquire_lock(&self.conn);
        conn.execute(
            "INSERT INTO interaction_patterns
             (pattern_type, pattern_data, frequency, success_rate, last_used)
             VALUES (?1, ?2, 1, ?3, ?4)
             ON CONFLICT(pattern_type, pattern_data) DO UPDATE SET
                frequency = frequency + 1,
                success_rate = (success_rate * frequency + ?3) / (frequency + 1),
                last_used = ?4",
            params![pattern_type, data_json, outcome, now],
        )
        .map_err(|e| op_failed("record_pattern", &e))?;
        metrics::counter!("patterns_recorded_total").increment(1);
        Ok(())
    }

    /// Fetches one pattern by its (type, payload) key.
    ///
    /// # Errors
    ///
    /// Returns an error if the query fails.
    pub fn get_pattern(&self, pattern_type: &str, data: &ContextMap) -> Result<Option<Pattern>> {
        let conn = acquire_lock(&self.conn);
        conn.query_row(
            "SELECT * FROM interaction_patterns
             WHERE pattern_type = ?1 AND pattern_data = ?2",
            params![pattern_type, map_to_json(data)],
            Self::parse_pattern_row,
        )
        .optional()
        .map_err(|e| op_failed("get_pattern", &e))
    }

    /// Returns recent, proven patterns of one type relevant to the query
    /// context.
    ///
    /// Candidates must have a success rate above 0.7 and have been used
    /// within the last week; they are scored against the query with the
    /// interaction weight table and kept above the relevance threshold,
    /// ranked descending.
    ///
    /// # Errors
    ///
    /// Returns an error if the query fails.
    #[instrument(skip(self, context), fields(pattern_type = %pattern_type))]
    pub fn relevant_patterns(
        &self,
        pattern_type: &str,
        context: &ContextMap,
        limit: usize,
    ) -> Result<Vec<RankedPattern>> {
        let min_used = current_timestamp().saturating_sub(PATTERN_RECENCY.as_secs()) as i64;

        let candidates = {
            let conn = acquire_lock(&self.conn);
            let mut stmt = conn
                .prepare(
                    "SELECT * FROM interaction_patterns
                     WHERE pattern_type = ?1 AND success_rate > ?2 AND last_used > ?3
                     ORDER BY frequency * success_rate DESC",
                )
                .map_err(|e| op_failed("relevant_patterns_prepare", &e))?;
            let patterns: Vec<Pattern> = stmt
                .query_map(
                    params![pattern_type, PROVEN_SUCCESS_RATE, min_used],
                    Self::parse_pattern_row,
                )
                .map_err(|e| op_failed("relevant_patterns", &e))?
                .filter_map(std::result::Result::ok)
                .collect();
            patterns
        };

        let weights = WeightTable::interaction_defaults();
        let mut ranked: Vec<RankedPattern> = candidates
            .into_iter()
            .filter_map(|pattern| {
                let relevance = relevance::score_weighted(context, &pattern.data, &weights);
                (relevance > PATTERN_RELEVANCE_THRESHOLD)
                    .then_some(RankedPattern { pattern, relevance })
            })
            .collect();

        ranked.sort_by(|a, b| {
            b.relevance
                .partial_cmp(&a.relevance)
                .unwrap_or(std::cmp::Ordering::Equal)
        });
        ranked.truncate(limit);
        Ok(ranked)
    }

    /// Returns the number of stored patterns.
    ///
    /// # Errors
    ///
    /// Returns an error if the query fails.
    pub fn pattern_count(&self) -> Result<usize> {
        let conn = acquire_lock(&self.conn);
        let count: i64 = conn
            .query_row("SELECT COUNT(*) FROM interaction_patterns", [], |row| {
                row.get(0)
            })
            .map_err(|e| op_failed("pattern_count", &e))?;
        Ok(count as usize)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::ContextValue;

    fn ctx(entries: &[(&str, ContextValue)]) -> ContextMap {
        entries
            .iter()
            .map(|(k, v)| ((*k).to_string(), v.clone()))
            .collect()
    }

    #[test]
    fn test_repeat_observation_upserts() {
        let store = PatternStore::in_memory().unwrap();
        let data = ctx(&[("command", ContextValue::text("git status"))]);

        store.record_pattern("command", &data, true).unwrap();
        store.record_pattern("command", &data, true).unwrap();
        store.record_pattern("command", &data, false).unwrap();

        assert_eq!(store.pattern_count().unwrap(), 1);
        let pattern = store.get_pattern("command", &data).unwrap().unwrap();
        assert_eq!(pattern.frequency, 3);
        assert!((pattern.success_rate - 2.0 / 3.0).abs() < 1e-9);
    }

    #[test]
    fn test_relevant_patterns_filters_unproven() {
        let store = PatternStore::in_memory().unwrap();
        let good = ctx(&[("task_type", ContextValue::text("build"))]);
        let bad = ctx(&[("task_type", ContextValue::text("deploy"))]);

        store.record_pattern("workflow", &good, true).unwrap();
        // Failing pattern drops to 0.5 success rate, below the proven bar
        store.record_pattern("workflow", &bad, true).unwrap();
        store.record_pattern("workflow", &bad, false).unwrap();

        let hits = store.relevant_patterns("workflow", &good, 10).unwrap();
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].pattern.data, good);
        assert!(hits[0].relevance > PATTERN_RELEVANCE_THRESHOLD);
    }

    #[test]
    fn test_relevant_patterns_respects_weighting() {
        let store = PatternStore::in_memory().unwrap();
        let stored = ctx(&[
            ("task_type", ContextValue::text("refactor")),
            ("tags", ContextValue::text_list(["x"])),
        ]);
        store.record_pattern("workflow", &stored, true).unwrap();

        // Query agrees on the heavy key and disagrees on the light one:
        // (1.0 * 1.0 + 0.4 * 0.0) / 1.4 > 0.5
        let query = ctx(&[
            ("task_type", ContextValue::text("refactor")),
            ("tags", ContextValue::text_list(["y"])),
        ]);
        let hits = store.relevant_patterns("workflow", &query, 10).unwrap();
        assert_eq!(hits.len(), 1);
        assert!((hits[0].relevance - 1.0 / 1.4).abs() < 1e-9);
    }

    #[test]
    fn test_different_payloads_are_distinct_rows() {
        let store = PatternStore::in_memory().unwrap();
        store
            .record_pattern("command", &ctx(&[("command", ContextValue::text("ls"))]), true)
            .unwrap();
        store
            .record_pattern("command", &ctx(&[("command", ContextValue::text("pwd"))]), true)
            .unwrap();
        assert_eq!(store.pattern_count().unwrap(), 2);
    }
}
