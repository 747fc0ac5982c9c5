//! Task dependency graph store.
//!
//! Tasks with intended-but-unenforced acyclic dependency edges. Cycles are
//! tolerated at creation time and neutralized at resolution time by a
//! per-call visited set, so chain resolution always terminates.
//!
//! Context payloads are stored one row per context type in `task_context`,
//! which lets related-task candidate selection happen in SQL.

#![allow(clippy::cast_possible_truncation)]
#![allow(clippy::cast_sign_loss)]
#![allow(clippy::cast_possible_wrap)]

use crate::models::{ContextMap, ContextValue, Task, TaskId, TaskPriority, TaskStatus};
use crate::relevance;
use crate::storage::{acquire_lock, apply_pragmas, op_failed};
use crate::{Result, current_timestamp};
use rusqlite::{Connection, OptionalExtension, Row, params};
use std::collections::HashSet;
use std::path::PathBuf;
use std::sync::Mutex;
use tracing::instrument;

/// Minimum relevance for a task to count as related.
const RELATED_TASK_THRESHOLD: f64 = 0.5;

/// SQLite-backed task dependency graph.
///
/// Tasks are never hard-deleted; terminal tasks stay queryable for history.
pub struct TaskGraphStore {
    /// Connection to the `SQLite` database.
    conn: Mutex<Connection>,
    /// Path to the database (None for in-memory).
    db_path: Option<PathBuf>,
}

impl TaskGraphStore {
    /// Creates a new store at the given path.
    ///
    /// # Errors
    ///
    /// Returns an error if the database cannot be opened or initialized.
    pub fn new(db_path: impl Into<PathBuf>) -> Result<Self> {
        let db_path = db_path.into();
        let conn = Connection::open(&db_path).map_err(|e| op_failed("open_task_store", &e))?;
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
            Connection::open_in_memory().map_err(|e| op_failed("open_task_store_memory", &e))?;
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
            "CREATE TABLE IF NOT EXISTS tasks (
                id TEXT PRIMARY KEY,
                title TEXT NOT NULL,
                description TEXT NOT NULL DEFAULT '',
                status TEXT NOT NULL DEFAULT 'pending',
                priority INTEGER NOT NULL DEFAULT 2,
                created_at INTEGER NOT NULL,
                updated_at INTEGER NOT NULL,
                completed_at INTEGER
            )",
            [],
        )
        .map_err(|e| op_failed("create_tasks_table", &e))?;

        conn.execute(
            "CREATE TABLE IF NOT EXISTS task_dependencies (
                task_id TEXT NOT NULL,
                depends_on_id TEXT NOT NULL,
                PRIMARY KEY (task_id, depends_on_id)
            )",
            [],
        )
        .map_err(|e| op_failed("create_task_dependencies_table", &e))?;

        conn.execute(
            "CREATE TABLE IF NOT EXISTS task_context (
                task_id TEXT NOT NULL,
                context_type TEXT NOT NULL,
                context_data TEXT NOT NULL,
                PRIMARY KEY (task_id, context_type)
            )",
            [],
        )
        .map_err(|e| op_failed("create_task_context_table", &e))?;

        let _ = conn.execute(
            "CREATE INDEX IF NOT EXISTS idx_tasks_status ON tasks(status)",
            [],
        );
        let _ = conn.execute(
            "CREATE INDEX IF NOT EXISTS idx_task_context_type
             ON task_context(context_type)",
            [],
        );

        Ok(())
    }

    fn parse_task_row(row: &Row<'_>) -> rusqlite::Result<Task> {
        let id: String = row.get("id")?;
        let title: String = row.get("title")?;
        let description: String = row.get("description")?;
        let status: String = row.get("status")?;
        let priority: i64 = row.get("priority")?;
        let created_at: i64 = row.get("created_at")?;
        let updated_at: i64 = row.get("updated_at")?;
        let completed_at: Option<i64> = row.get("completed_at")?;

        Ok(Task {
            id: TaskId::new(id),
            title,
            description,
            status: TaskStatus::parse(&status),
            priority: TaskPriority::from_ordinal(priority),
            depends_on: Vec::new(),
            context: ContextMap::new(),
            created_at: created_at as u64,
            updated_at: updated_at as u64,
            completed_at: completed_at.map(|t| t as u64),
        })
    }

    fn load_dependencies(conn: &Connection, id: &TaskId) -> Vec<TaskId> {
        let Ok(mut stmt) =
            conn.prepare("SELECT depends_on_id FROM task_dependencies WHERE task_id = ?1")
        else {
            return Vec::new();
        };
        stmt.query_map(params![id.as_str()], |row| {
            row.get::<_, String>(0).map(TaskId::new)
        })
        .map(|rows| rows.filter_map(std::result::Result::ok).collect())
        .unwrap_or_default()
    }

    fn load_context(conn: &Connection, id: &TaskId) -> ContextMap {
        let Ok(mut stmt) = conn
            .prepare("SELECT context_type, context_data FROM task_context WHERE task_id = ?1")
        else {
            return ContextMap::new();
        };
        stmt.query_map(params![id.as_str()], |row| {
            let context_type: String = row.get(0)?;
            let context_data: String = row.get(1)?;
            Ok((context_type, context_data))
        })
        .map(|rows| {
            rows.filter_map(std::result::Result::ok)
                .filter_map(|(context_type, data)| {
                    serde_json::from_str::<serde_json::Value>(&data)
                        .ok()
                        .map(|v| (context_type, ContextValue::from_json(&v)))
                })
                .collect()
        })
        .unwrap_or_default()
    }

    fn store_context(conn: &Connection, id: &TaskId, context: &ContextMap) -> Result<()> {
        for (context_type, value) in context {
            let data = serde_json::to_value(value)
                .unwrap_or(serde_json::Value::Null)
                .to_string();
            conn.execute(
                "INSERT OR REPLACE INTO task_context (task_id, context_type, context_data)
                 VALUES (?1, ?2, ?3)",
                params![id.as_str(), context_type, data],
            )
            .map_err(|e| op_failed("store_task_context", &e))?;
        }
        Ok(())
    }

    fn hydrate(conn: &Connection, mut task: Task) -> Task {
        task.depends_on = Self::load_dependencies(conn, &task.id);
        task.context = Self::load_context(conn, &task.id);
        task
    }

    /// Creates a Pending task and persists its dependency edges as given.
    ///
    /// Dependency edges are not validated for cycles; resolution tolerates
    /// them instead.
    ///
    /// # Errors
    ///
    /// Returns an error if the insert fails.
    #[instrument(skip(self, description, depends_on, context), fields(title = %title))]
    pub fn create_task(
        &self,
        title: &str,
        description: &str,
        priority: TaskPriority,
        depends_on: &[TaskId],
        context: ContextMap,
    ) -> Result<TaskId> {
        let id = TaskId::generate();
        let now = current_timestamp();

        let conn = acquire_lock(&self.conn);
        conn.execute(
            "INSERT INTO tasks
             (id, title, description, status, priority, created_at, updated_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
            params![
                id.as_str(),
                title,
                description,
                TaskStatus::Pending.as_str(),
                priority.ordinal(),
                now as i64,
                now as i64,
            ],
        )
        .map_err(|e| op_failed("create_task", &e))?;

        for dep in depends_on {
            conn.execute(
                "INSERT OR IGNORE INTO task_dependencies (task_id, depends_on_id)
                 VALUES (?1, ?2)",
                params![id.as_str(), dep.as_str()],
            )
            .map_err(|e| op_failed("create_task_dependency", &e))?;
        }
        Self::store_context(&conn, &id, &context)?;

        metrics::counter!("tasks_created_total").increment(1);
        Ok(id)
    }

    /// Fetches a task by id, with its dependency edges and context payload.
    ///
    /// # Errors
    ///
    /// Returns an error if the query fails.
    #[instrument(skip(self), fields(task_id = %id))]
    pub fn get_task(&self, id: &TaskId) -> Result<Option<Task>> {
        let conn = acquire_lock(&self.conn);
        let task = conn
            .query_row(
                "SELECT * FROM tasks WHERE id = ?1",
                params![id.as_str()],
                Self::parse_task_row,
            )
            .optional()
            .map_err(|e| op_failed("get_task", &e))?;

        Ok(task.map(|t| Self::hydrate(&conn, t)))
    }

    /// Updates a task's status, optionally merging extra context.
    ///
    /// Any state-to-state transition is accepted. The completion timestamp is
    /// set iff the new status is `Completed`. Returns false (a no-op) for an
    /// unknown id.
    ///
    /// # Errors
    ///
    /// Returns an error if the update fails.
    #[instrument(skip(self, context_patch), fields(task_id = %id, status = status.as_str()))]
    pub fn update_status(
        &self,
        id: &TaskId,
        status: TaskStatus,
        context_patch: Option<&ContextMap>,
    ) -> Result<bool> {
        let now = current_timestamp() as i64;
        let completed_at = (status == TaskStatus::Completed).then_some(now);

        let conn = acquire_lock(&self.conn);
        let rows = conn
            .execute(
                "UPDATE tasks SET status = ?1, updated_at = ?2, completed_at = ?3 WHERE id = ?4",
                params![status.as_str(), now, completed_at, id.as_str()],
            )
            .map_err(|e| op_failed("update_status", &e))?;

        if rows == 0 {
            tracing::debug!(task_id = %id, "update_status on unknown task, no-op");
            return Ok(false);
        }
        if let Some(patch) = context_patch {
            Self::store_context(&conn, id, patch)?;
        }
        Ok(true)
    }

    /// Resolves the dependency chain rooted at `id`.
    ///
    /// Depth-first pre-order over `depends_on` edges with a per-call visited
    /// set: an already-visited id is skipped, which doubles as cycle
    /// protection. The root comes first and no task appears twice. An
    /// unknown root yields an empty chain.
    ///
    /// # Errors
    ///
    /// Returns an error if a query fails.
    #[instrument(skip(self), fields(task_id = %id))]
    pub fn resolve_chain(&self, id: &TaskId) -> Result<Vec<Task>> {
        let mut chain = Vec::new();
        let mut visited = HashSet::new();
        let mut stack = vec![id.clone()];

        while let Some(current) = stack.pop() {
            if !visited.insert(current.clone()) {
                continue;
            }
            let Some(task) = self.get_task(&current)? else {
                continue;
            };
            // Reverse so dependencies are visited in declared order.
            for dep in task.depends_on.iter().rev() {
                if !visited.contains(dep) {
                    stack.push(dep.clone());
                }
            }
            chain.push(task);
        }

        Ok(chain)
    }

    /// Returns non-completed tasks whose context is relevant to the query.
    ///
    /// Candidates are tasks carrying at least one of the query's context
    /// types; each is scored against the full query context and kept above
    /// the relevance threshold, ranked descending.
    ///
    /// # Errors
    ///
    /// Returns an error if the query fails.
    #[instrument(skip(self, context))]
    pub fn related_tasks(&self, context: &ContextMap, limit: usize) -> Result<Vec<(Task, f64)>> {
        if context.is_empty() {
            return Ok(Vec::new());
        }

        let candidates = {
            let conn = acquire_lock(&self.conn);
            let placeholders = (1..=context.len())
                .map(|i| format!("?{i}"))
                .collect::<Vec<_>>()
                .join(", ");
            let sql = format!(
                "SELECT DISTINCT t.* FROM tasks t
                 JOIN task_context tc ON tc.task_id = t.id
                 WHERE t.status != 'completed' AND tc.context_type IN ({placeholders})"
            );
            let mut stmt = conn
                .prepare(&sql)
                .map_err(|e| op_failed("related_tasks_prepare", &e))?;
            let key_params: Vec<&dyn rusqlite::ToSql> =
                context.keys().map(|k| k as &dyn rusqlite::ToSql).collect();
            let tasks: Vec<Task> = stmt
                .query_map(key_params.as_slice(), Self::parse_task_row)
                .map_err(|e| op_failed("related_tasks", &e))?
                .filter_map(std::result::Result::ok)
                .collect();
            tasks
                .into_iter()
                .map(|t| Self::hydrate(&conn, t))
                .collect::<Vec<_>>()
        };

        let mut scored: Vec<(Task, f64)> = candidates
            .into_iter()
            .filter_map(|t| {
                let s = relevance::score(context, &t.context);
                (s > RELATED_TASK_THRESHOLD).then_some((t, s))
            })
            .collect();

        scored.sort_by(|a, b| b.1.partial_cmp(&a.1).unwrap_or(std::cmp::Ordering::Equal));
        scored.truncate(limit);
        Ok(scored)
    }

    /// Returns tasks in a given status.
    ///
    /// # Errors
    ///
    /// Returns an error if the query fails.
    pub fn tasks_by_status(&self, status: TaskStatus) -> Result<Vec<Task>> {
        let conn = acquire_lock(&self.conn);
        let mut stmt = conn
            .prepare("SELECT * FROM tasks WHERE status = ?1 ORDER BY priority DESC, created_at")
            .map_err(|e| op_failed("tasks_by_status_prepare", &e))?;
        let tasks: Vec<Task> = stmt
            .query_map(params![status.as_str()], Self::parse_task_row)
            .map_err(|e| op_failed("tasks_by_status", &e))?
            .filter_map(std::result::Result::ok)
            .collect();
        Ok(tasks.into_iter().map(|t| Self::hydrate(&conn, t)).collect())
    }

    /// Returns the number of stored tasks.
    ///
    /// # Errors
    ///
    /// Returns an error if the query fails.
    pub fn task_count(&self) -> Result<usize> {
        let conn = acquire_lock(&self.conn);
        let count: i64 = conn
            .query_row("SELECT COUNT(*) FROM tasks", [], |row| row.get(0))
            .map_err(|e| op_failed("task_count", &e))?;
        Ok(count as usize)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ctx(entries: &[(&str, ContextValue)]) -> ContextMap {
        entries
            .iter()
            .map(|(k, v)| ((*k).to_string(), v.clone()))
            .collect()
    }

    #[test]
    fn test_create_and_get() {
        let store = TaskGraphStore::in_memory().unwrap();
        let context = ctx(&[("project", ContextValue::text("reports"))]);
        let id = store
            .create_task(
                "write report",
                "quarterly numbers",
                TaskPriority::High,
                &[],
                context.clone(),
            )
            .unwrap();

        let task = store.get_task(&id).unwrap().unwrap();
        assert_eq!(task.title, "write report");
        assert_eq!(task.status, TaskStatus::Pending);
        assert_eq!(task.priority, TaskPriority::High);
        assert_eq!(task.context, context);
        assert!(task.completed_at.is_none());
    }

    #[test]
    fn test_resolve_simple_chain() {
        let store = TaskGraphStore::in_memory().unwrap();
        let t1 = store
            .create_task("t1", "", TaskPriority::Medium, &[], ContextMap::new())
            .unwrap();
        let t2 = store
            .create_task("t2", "", TaskPriority::Medium, &[t1.clone()], ContextMap::new())
            .unwrap();

        let chain = store.resolve_chain(&t2).unwrap();
        let ids: Vec<_> = chain.iter().map(|t| t.id.clone()).collect();
        assert_eq!(ids, vec![t2, t1]);
    }

    #[test]
    fn test_resolve_chain_tolerates_cycles() {
        let store = TaskGraphStore::in_memory().unwrap();
        let a = store
            .create_task("a", "", TaskPriority::Medium, &[], ContextMap::new())
            .unwrap();
        let b = store
            .create_task("b", "", TaskPriority::Medium, &[a.clone()], ContextMap::new())
            .unwrap();

        // Close the loop: a depends on b as well.
        {
            let conn = acquire_lock(&store.conn);
            conn.execute(
                "INSERT INTO task_dependencies (task_id, depends_on_id) VALUES (?1, ?2)",
                params![a.as_str(), b.as_str()],
            )
            .unwrap();
        }

        let chain = store.resolve_chain(&a).unwrap();
        assert_eq!(chain.len(), 2);
        assert_eq!(chain[0].id, a);
        let ids: HashSet<_> = chain.iter().map(|t| t.id.clone()).collect();
        assert_eq!(ids.len(), 2);
    }

    #[test]
    fn test_resolve_chain_unknown_root_is_empty() {
        let store = TaskGraphStore::in_memory().unwrap();
        assert!(store.resolve_chain(&TaskId::from("missing")).unwrap().is_empty());
    }

    #[test]
    fn test_update_status_sets_completion_time() {
        let store = TaskGraphStore::in_memory().unwrap();
        let id = store
            .create_task("t", "", TaskPriority::Medium, &[], ContextMap::new())
            .unwrap();

        assert!(store.update_status(&id, TaskStatus::Completed, None).unwrap());
        assert!(store.get_task(&id).unwrap().unwrap().completed_at.is_some());

        // Moving back out of Completed clears it
        assert!(store.update_status(&id, TaskStatus::InProgress, None).unwrap());
        assert!(store.get_task(&id).unwrap().unwrap().completed_at.is_none());

        assert!(
            !store
                .update_status(&TaskId::from("missing"), TaskStatus::Failed, None)
                .unwrap()
        );
    }

    #[test]
    fn test_update_status_merges_context_patch() {
        let store = TaskGraphStore::in_memory().unwrap();
        let id = store
            .create_task(
                "t",
                "",
                TaskPriority::Medium,
                &[],
                ctx(&[("stage", ContextValue::text("draft"))]),
            )
            .unwrap();

        let patch = ctx(&[("stage", ContextValue::text("review"))]);
        store
            .update_status(&id, TaskStatus::InProgress, Some(&patch))
            .unwrap();

        let task = store.get_task(&id).unwrap().unwrap();
        assert_eq!(task.context, patch);
    }

    #[test]
    fn test_related_tasks_scored_and_filtered() {
        let store = TaskGraphStore::in_memory().unwrap();
        let rust_ctx = ctx(&[
            ("task_type", ContextValue::text("refactor")),
            ("lang", ContextValue::text("rust")),
        ]);
        let matching = store
            .create_task("near", "", TaskPriority::Medium, &[], rust_ctx.clone())
            .unwrap();
        store
            .create_task(
                "far",
                "",
                TaskPriority::Medium,
                &[],
                ctx(&[("task_type", ContextValue::text("deploy"))]),
            )
            .unwrap();
        let done = store
            .create_task("done", "", TaskPriority::Medium, &[], rust_ctx.clone())
            .unwrap();
        store.update_status(&done, TaskStatus::Completed, None).unwrap();

        let related = store.related_tasks(&rust_ctx, 10).unwrap();
        assert_eq!(related.len(), 1);
        assert_eq!(related[0].0.id, matching);
        assert!((related[0].1 - 1.0).abs() < 1e-9);
    }

    #[test]
    fn test_related_tasks_empty_query() {
        let store = TaskGraphStore::in_memory().unwrap();
        store
            .create_task("t", "", TaskPriority::Medium, &[], ContextMap::new())
            .unwrap();
        assert!(store.related_tasks(&ContextMap::new(), 5).unwrap().is_empty());
    }
}
