//! Task and dependency types.

use super::context::ContextMap;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Unique identifier for a task.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TaskId(String);

impl TaskId {
    /// Creates a new task ID.
    #[must_use]
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Generates a fresh task ID.
    #[must_use]
    pub fn generate() -> Self {
        Self(format!("task_{}", uuid::Uuid::new_v4()))
    }

    /// Returns the ID as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for TaskId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<&str> for TaskId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

/// Task lifecycle states.
///
/// Transitions are intentionally unconstrained: callers are trusted, and any
/// state-to-state update is accepted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskStatus {
    /// Not yet started.
    Pending,
    /// Actively being worked on.
    InProgress,
    /// Waiting on something external.
    Blocked,
    /// Finished successfully (terminal).
    Completed,
    /// Finished unsuccessfully (terminal).
    Failed,
}

impl TaskStatus {
    /// Returns the canonical string form.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::InProgress => "in_progress",
            Self::Blocked => "blocked",
            Self::Completed => "completed",
            Self::Failed => "failed",
        }
    }

    /// Parses a status string, defaulting unknown values to `Pending`.
    #[must_use]
    pub fn parse(s: &str) -> Self {
        match s {
            "in_progress" => Self::InProgress,
            "blocked" => Self::Blocked,
            "completed" => Self::Completed,
            "failed" => Self::Failed,
            _ => Self::Pending,
        }
    }
}

/// Task priority levels, ordered low to critical.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskPriority {
    /// Low priority.
    Low,
    /// Medium priority (default).
    Medium,
    /// High priority.
    High,
    /// Critical priority.
    Critical,
}

impl TaskPriority {
    /// Returns the ordinal value (1-4).
    #[must_use]
    pub const fn ordinal(self) -> i64 {
        match self {
            Self::Low => 1,
            Self::Medium => 2,
            Self::High => 3,
            Self::Critical => 4,
        }
    }

    /// Parses an ordinal value, defaulting out-of-range values to `Medium`.
    #[must_use]
    pub const fn from_ordinal(value: i64) -> Self {
        match value {
            1 => Self::Low,
            3 => Self::High,
            4 => Self::Critical,
            _ => Self::Medium,
        }
    }
}

impl Default for TaskPriority {
    fn default() -> Self {
        Self::Medium
    }
}

/// A tracked task with dependency edges and a context payload.
///
/// Tasks are never hard-deleted by this engine.
#[derive(Debug, Clone)]
pub struct Task {
    /// Unique identifier.
    pub id: TaskId,
    /// Short title.
    pub title: String,
    /// Longer description.
    pub description: String,
    /// Current lifecycle state.
    pub status: TaskStatus,
    /// Priority ordinal.
    pub priority: TaskPriority,
    /// Ids of tasks this task depends on. May form cycles; resolution is
    /// cycle-safe rather than creation-validated.
    pub depends_on: Vec<TaskId>,
    /// Context payload, keyed by context type.
    pub context: ContextMap,
    /// Creation timestamp (unix seconds).
    pub created_at: u64,
    /// Last update timestamp.
    pub updated_at: u64,
    /// Completion timestamp, set iff status became `Completed`.
    pub completed_at: Option<u64>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_round_trip() {
        for s in [
            TaskStatus::Pending,
            TaskStatus::InProgress,
            TaskStatus::Blocked,
            TaskStatus::Completed,
            TaskStatus::Failed,
        ] {
            assert_eq!(TaskStatus::parse(s.as_str()), s);
        }
        assert_eq!(TaskStatus::parse("unknown"), TaskStatus::Pending);
    }

    #[test]
    fn test_priority_ordering() {
        assert!(TaskPriority::Critical > TaskPriority::Low);
        assert_eq!(TaskPriority::from_ordinal(3), TaskPriority::High);
        assert_eq!(TaskPriority::from_ordinal(99), TaskPriority::Medium);
    }
}
