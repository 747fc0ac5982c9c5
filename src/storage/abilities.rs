//! Ability record and metrics store.
//!
//! Ability rows hold the declared record; metric observations are appended to
//! a separate table so usage history survives restarts. Example contexts ride
//! inside the metadata column under a reserved `contexts` key.

#![allow(clippy::cast_possible_truncation)]
#![allow(clippy::cast_sign_loss)]
#![allow(clippy::cast_possible_wrap)]

use crate::models::{
    AbilityId, AbilityMetrics, AbilityRecord, AbilityStatus, AbilityType, ContextMap,
    ContextValue, map_from_json, map_to_json,
};
use crate::storage::{acquire_lock, apply_pragmas, op_failed};
use crate::{Result, current_timestamp};
use rusqlite::{Connection, OptionalExtension, Row, params};
use std::path::PathBuf;
use std::sync::Mutex;
use tracing::instrument;

/// Reserved metadata key carrying the declared example contexts.
const CONTEXTS_KEY: &str = "contexts";

/// SQLite-backed ability store.
pub struct AbilityStore {
    /// Connection to the `SQLite` database.
    conn: Mutex<Connection>,
    /// Path to the database (None for in-memory).
    db_path: Option<PathBuf>,
}

impl AbilityStore {
    /// Creates a new store at the given path.
    ///
    /// # Errors
    ///
    /// Returns an error if the database cannot be opened or initialized.
    pub fn new(db_path: impl Into<PathBuf>) -> Result<Self> {
        let db_path = db_path.into();
        let conn = Connection::open(&db_path).map_err(|e| op_failed("open_ability_store", &e))?;
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
            Connection::open_in_memory().map_err(|e| op_failed("open_ability_store_memory", &e))?;
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
            "CREATE TABLE IF NOT EXISTS abilities (
                id TEXT PRIMARY KEY,
                name TEXT NOT NULL,
                description TEXT NOT NULL DEFAULT '',
                type TEXT NOT NULL,
                status TEXT NOT NULL,
                requirements TEXT NOT NULL DEFAULT '{}',
                metadata TEXT NOT NULL DEFAULT '{}',
                created_at INTEGER NOT NULL,
                updated_at INTEGER NOT NULL
            )",
            [],
        )
        .map_err(|e| op_failed("create_abilities_table", &e))?;

        conn.execute(
            "CREATE TABLE IF NOT EXISTS ability_metrics (
                ability_id TEXT NOT NULL,
                timestamp INTEGER NOT NULL,
                metric_type TEXT NOT NULL,
                metric_value REAL NOT NULL
            )",
            [],
        )
        .map_err(|e| op_failed("create_ability_metrics_table", &e))?;

        let _ = conn.execute(
            "CREATE INDEX IF NOT EXISTS idx_ability_metrics_ability
             ON ability_metrics(ability_id, metric_type, timestamp DESC)",
            [],
        );

        Ok(())
    }

    fn pack_metadata(record: &AbilityRecord) -> String {
        let mut value = serde_json::to_value(&record.metadata)
            .unwrap_or_else(|_| serde_json::Value::Object(serde_json::Map::new()));
        if let serde_json::Value::Object(ref mut fields) = value {
            let contexts: Vec<serde_json::Value> = record
                .example_contexts
                .iter()
                .map(|c| serde_json::to_value(c).unwrap_or(serde_json::Value::Null))
                .collect();
            fields.insert(CONTEXTS_KEY.to_string(), serde_json::Value::Array(contexts));
        }
        value.to_string()
    }

    fn unpack_metadata(text: &str) -> (ContextMap, Vec<ContextMap>) {
        let Ok(serde_json::Value::Object(mut fields)) =
            serde_json::from_str::<serde_json::Value>(text)
        else {
            return (ContextMap::new(), Vec::new());
        };

        let contexts = match fields.remove(CONTEXTS_KEY) {
            Some(serde_json::Value::Array(items)) => items
                .iter()
                .filter_map(|item| match item {
                    serde_json::Value::Object(obj) => Some(
                        obj.iter()
                            .map(|(k, v)| (k.clone(), ContextValue::from_json(v)))
                            .collect(),
                    ),
                    _ => None,
                })
                .collect(),
            _ => Vec::new(),
        };

        let metadata = fields
            .iter()
            .map(|(k, v)| (k.clone(), ContextValue::from_json(v)))
            .collect();
        (metadata, contexts)
    }

    fn parse_ability_row(row: &Row<'_>) -> rusqlite::Result<AbilityRecord> {
        let id: String = row.get("id")?;
        let name: String = row.get("name")?;
        let description: String = row.get("description")?;
        let ability_type: String = row.get("type")?;
        let status: String = row.get("status")?;
        let requirements: String = row.get("requirements")?;
        let metadata_json: String = row.get("metadata")?;
        let created_at: i64 = row.get("created_at")?;
        let updated_at: i64 = row.get("updated_at")?;

        let (metadata, example_contexts) = Self::unpack_metadata(&metadata_json);
        Ok(AbilityRecord {
            id: AbilityId::new(id),
            name,
            description,
            ability_type: AbilityType::parse(&ability_type),
            status: AbilityStatus::parse(&status),
            requirements: map_from_json(&requirements),
            metadata,
            example_contexts,
            created_at: created_at as u64,
            updated_at: updated_at as u64,
        })
    }

    /// Inserts or replaces an ability record.
    ///
    /// # Errors
    ///
    /// Returns an error if the write fails.
    #[instrument(skip(self, record), fields(ability_id = %record.id, name = %record.name))]
    pub fn save_ability(&self, record: &AbilityRecord) -> Result<()> {
        let conn = acquire_lock(&self.conn);
        conn.execute(
            "INSERT OR REPLACE INTO abilities
             (id, name, description, type, status, requirements, metadata,
              created_at, updated_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)",
            params![
                record.id.as_str(),
                record.name,
                record.description,
                record.ability_type.as_str(),
                record.status.as_str(),
                map_to_json(&record.requirements),
                Self::pack_metadata(record),
                record.created_at as i64,
                record.updated_at as i64,
            ],
        )
        .map_err(|e| op_failed("save_ability", &e))?;
        metrics::counter!("abilities_stored_total").increment(1);
        Ok(())
    }

    /// Fetches an ability by id.
    ///
    /// # Errors
    ///
    /// Returns an error if the query fails.
    #[instrument(skip(self), fields(ability_id = %id))]
    pub fn get_ability(&self, id: &AbilityId) -> Result<Option<AbilityRecord>> {
        let conn = acquire_lock(&self.conn);
        conn.query_row(
            "SELECT * FROM abilities WHERE id = ?1",
            params![id.as_str()],
            Self::parse_ability_row,
        )
        .optional()
        .map_err(|e| op_failed("get_ability", &e))
    }

    /// Returns every stored ability record.
    ///
    /// # Errors
    ///
    /// Returns an error if the query fails.
    pub fn list_abilities(&self) -> Result<Vec<AbilityRecord>> {
        let conn = acquire_lock(&self.conn);
        let mut stmt = conn
            .prepare("SELECT * FROM abilities ORDER BY created_at")
            .map_err(|e| op_failed("list_abilities_prepare", &e))?;
        let records = stmt
            .query_map([], Self::parse_ability_row)
            .map_err(|e| op_failed("list_abilities", &e))?
            .filter_map(std::result::Result::ok)
            .collect();
        Ok(records)
    }

    /// Updates an ability's status. Returns false for an unknown id.
    ///
    /// # Errors
    ///
    /// Returns an error if the update fails.
    #[instrument(skip(self), fields(ability_id = %id, status = status.as_str()))]
    pub fn update_status(&self, id: &AbilityId, status: AbilityStatus) -> Result<bool> {
        let conn = acquire_lock(&self.conn);
        let rows = conn
            .execute(
                "UPDATE abilities SET status = ?1, updated_at = ?2 WHERE id = ?3",
                params![status.as_str(), current_timestamp() as i64, id.as_str()],
            )
            .map_err(|e| op_failed("update_ability_status", &e))?;
        Ok(rows > 0)
    }

    /// Appends one metric observation per tracked dimension.
    ///
    /// # Errors
    ///
    /// Returns an error if a write fails.
    #[instrument(skip(self, snapshot), fields(ability_id = %id))]
    pub fn record_metrics(&self, id: &AbilityId, snapshot: &AbilityMetrics) -> Result<()> {
        #[allow(clippy::cast_precision_loss)]
        let rows = [
            ("usage_count", snapshot.usage_count as f64),
            ("success_rate", snapshot.success_rate),
            ("response_time", snapshot.avg_response_time),
            ("confidence", snapshot.confidence_level),
        ];
        let now = snapshot.last_used.unwrap_or_else(current_timestamp) as i64;

        let conn = acquire_lock(&self.conn);
        for (metric_type, metric_value) in rows {
            conn.execute(
                "INSERT INTO ability_metrics (ability_id, timestamp, metric_type, metric_value)
                 VALUES (?1, ?2, ?3, ?4)",
                params![id.as_str(), now, metric_type, metric_value],
            )
            .map_err(|e| op_failed("record_metrics", &e))?;
        }
        metrics::counter!("ability_uses_recorded_total").increment(1);
        Ok(())
    }

    /// Loads the latest metrics snapshot for an ability.
    ///
    /// Reads only the newest observation per metric dimension, so retrieval
    /// cost stays flat as the append-only history grows. Returns the neutral
    /// default (confidence 0.5) when no use was ever recorded.
    ///
    /// # Errors
    ///
    /// Returns an error if the query fails.
    pub fn load_metrics(&self, id: &AbilityId) -> Result<AbilityMetrics> {
        let conn = acquire_lock(&self.conn);
        let mut stmt = conn
            .prepare(
                "SELECT metric_type, metric_value, timestamp FROM ability_metrics
                 WHERE rowid IN (
                     SELECT MAX(rowid) FROM ability_metrics
                     WHERE ability_id = ?1 GROUP BY metric_type
                 )",
            )
            .map_err(|e| op_failed("load_metrics_prepare", &e))?;

        let mut snapshot = AbilityMetrics::default();
        let observations = stmt
            .query_map(params![id.as_str()], |row| {
                let metric_type: String = row.get(0)?;
                let metric_value: f64 = row.get(1)?;
                let timestamp: i64 = row.get(2)?;
                Ok((metric_type, metric_value, timestamp))
            })
            .map_err(|e| op_failed("load_metrics", &e))?;

        let mut seen_any = false;
        for observation in observations.filter_map(std::result::Result::ok) {
            seen_any = true;
            let (metric_type, metric_value, timestamp) = observation;
            match metric_type.as_str() {
                "usage_count" => snapshot.usage_count = metric_value as u64,
                "success_rate" => snapshot.success_rate = metric_value,
                "response_time" => snapshot.avg_response_time = metric_value,
                "confidence" => snapshot.confidence_level = metric_value,
                _ => {},
            }
            let timestamp = timestamp as u64;
            snapshot.last_used = Some(snapshot.last_used.map_or(timestamp, |t| t.max(timestamp)));
        }
        if !seen_any {
            return Ok(AbilityMetrics::default());
        }
        Ok(snapshot)
    }

    /// Returns the number of stored abilities.
    ///
    /// # Errors
    ///
    /// Returns an error if the query fails.
    pub fn ability_count(&self) -> Result<usize> {
        let conn = acquire_lock(&self.conn);
        let count: i64 = conn
            .query_row("SELECT COUNT(*) FROM abilities", [], |row| row.get(0))
            .map_err(|e| op_failed("ability_count", &e))?;
        Ok(count as usize)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(name: &str) -> AbilityRecord {
        let now = current_timestamp();
        let mut example = ContextMap::new();
        example.insert("task_type".to_string(), ContextValue::text("search"));
        AbilityRecord {
            id: AbilityId::generate(),
            name: name.to_string(),
            description: "finds things".to_string(),
            ability_type: AbilityType::Perception,
            status: AbilityStatus::Active,
            requirements: ContextMap::new(),
            metadata: {
                let mut m = ContextMap::new();
                m.insert("version".to_string(), ContextValue::from(2i64));
                m
            },
            example_contexts: vec![example],
            created_at: now,
            updated_at: now,
        }
    }

    #[test]
    fn test_save_and_get_round_trip() {
        let store = AbilityStore::in_memory().unwrap();
        let original = record("web_search");
        store.save_ability(&original).unwrap();

        let loaded = store.get_ability(&original.id).unwrap().unwrap();
        assert_eq!(loaded.name, "web_search");
        assert_eq!(loaded.ability_type, AbilityType::Perception);
        assert_eq!(loaded.metadata, original.metadata);
        assert_eq!(loaded.example_contexts, original.example_contexts);
    }

    #[test]
    fn test_metadata_contexts_key_not_leaked() {
        let store = AbilityStore::in_memory().unwrap();
        let original = record("summarize");
        store.save_ability(&original).unwrap();

        let loaded = store.get_ability(&original.id).unwrap().unwrap();
        assert!(!loaded.metadata.contains_key(CONTEXTS_KEY));
    }

    #[test]
    fn test_metrics_round_trip() {
        let store = AbilityStore::in_memory().unwrap();
        let ability = record("translate");
        store.save_ability(&ability).unwrap();

        let mut snapshot = AbilityMetrics::default();
        snapshot.record(true, 0.5, 1000);
        snapshot.record(true, 1.5, 2000);
        store.record_metrics(&ability.id, &snapshot).unwrap();

        let loaded = store.load_metrics(&ability.id).unwrap();
        assert_eq!(loaded.usage_count, 2);
        assert!((loaded.success_rate - 1.0).abs() < 1e-9);
        assert!((loaded.avg_response_time - 1.0).abs() < 1e-9);
        assert_eq!(loaded.last_used, Some(2000));
    }

    #[test]
    fn test_metric_rows_use_documented_names() {
        let store = AbilityStore::in_memory().unwrap();
        let ability = record("plan");
        store.save_ability(&ability).unwrap();

        let mut snapshot = AbilityMetrics::default();
        snapshot.record(true, 0.3, 1000);
        store.record_metrics(&ability.id, &snapshot).unwrap();

        let conn = acquire_lock(&store.conn);
        let mut stmt = conn
            .prepare("SELECT DISTINCT metric_type FROM ability_metrics ORDER BY metric_type")
            .unwrap();
        let names: Vec<String> = stmt
            .query_map([], |row| row.get(0))
            .unwrap()
            .filter_map(std::result::Result::ok)
            .collect();
        assert_eq!(
            names,
            vec!["confidence", "response_time", "success_rate", "usage_count"]
        );
    }

    #[test]
    fn test_load_metrics_reads_newest_observation() {
        let store = AbilityStore::in_memory().unwrap();
        let ability = record("navigate");
        store.save_ability(&ability).unwrap();

        let mut snapshot = AbilityMetrics::default();
        snapshot.record(true, 1.0, 1000);
        store.record_metrics(&ability.id, &snapshot).unwrap();
        snapshot.record(false, 3.0, 2000);
        store.record_metrics(&ability.id, &snapshot).unwrap();

        let loaded = store.load_metrics(&ability.id).unwrap();
        assert_eq!(loaded.usage_count, 2);
        assert!((loaded.success_rate - 0.5).abs() < 1e-9);
        assert!((loaded.avg_response_time - 2.0).abs() < 1e-9);
        assert_eq!(loaded.last_used, Some(2000));
    }

    #[test]
    fn test_unused_ability_has_neutral_metrics() {
        let store = AbilityStore::in_memory().unwrap();
        let metrics = store.load_metrics(&AbilityId::from("never_used")).unwrap();
        assert_eq!(metrics, AbilityMetrics::default());
        assert!((metrics.confidence_level - 0.5).abs() < f64::EPSILON);
    }

    #[test]
    fn test_update_status() {
        let store = AbilityStore::in_memory().unwrap();
        let ability = record("speak");
        store.save_ability(&ability).unwrap();

        assert!(store.update_status(&ability.id, AbilityStatus::Deprecated).unwrap());
        let loaded = store.get_ability(&ability.id).unwrap().unwrap();
        assert_eq!(loaded.status, AbilityStatus::Deprecated);

        assert!(!store.update_status(&AbilityId::from("missing"), AbilityStatus::Active).unwrap());
    }
}
