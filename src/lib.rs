//! # Mnemon
//!
//! Context and memory retention engine for desktop assistants.
//!
//! Mnemon decides what conversational and situational state to keep,
//! compress, forget, or resurface under a bounded memory budget, and ranks
//! stored knowledge by structural relevance to the current situation.
//!
//! ## Components
//!
//! - Relevance scoring over tagged context payloads ([`relevance`])
//! - Bounded conversation window with importance-ranked compaction
//!   ([`services::ConversationMemoryManager`])
//! - Durable context graph with caller-driven decay and pruning
//!   ([`storage::ContextGraphStore`])
//! - Cycle-tolerant task dependency resolution ([`storage::TaskGraphStore`])
//! - Ability usage metrics and confidence ranking
//!   ([`services::AbilityRegistry`])
//!
//! ## Example
//!
//! ```rust,ignore
//! use mnemon::{EngineConfig, MemoryEngine};
//!
//! let engine = MemoryEngine::open(&EngineConfig::default())?;
//! engine.memory().append_exchange("open the config", "opening it now", &[]);
//! let context = engine.memory().get_relevant_context("config", 5);
//! ```

#![deny(clippy::all)]
#![warn(clippy::pedantic)]
#![warn(missing_docs)]
#![forbid(unsafe_code)]
#![allow(clippy::multiple_crate_versions)]

use thiserror::Error as ThisError;

// Module declarations
pub mod config;
pub mod engine;
pub mod models;
pub mod relevance;
pub mod services;
pub mod storage;
pub mod topics;

// Re-exports for convenience
pub use config::{EngineConfig, MemoryConfig};
pub use engine::MemoryEngine;
pub use models::{
    AbilityId, AbilityMetrics, AbilityRecord, AbilityStatus, AbilityType, ContextMap, ContextNode,
    ContextValue, ConversationSegment, Modality, NodeId, Pattern, ScalarValue, Summary, Task,
    TaskId, TaskPriority, TaskStatus,
};
pub use relevance::{WeightTable, score, score_values, score_weighted};
pub use services::{AbilityRegistry, CompactionStats, ConversationMemoryManager, RankedAbility};
pub use storage::{AbilityStore, ContextGraphStore, PatternStore, TaskGraphStore};

/// Error type for mnemon operations.
///
/// Uses `thiserror` for automatic `Display` and `Error` trait implementations.
///
/// Store faults are mapped to [`Error::OperationFailed`] at the storage layer
/// and degraded to empty/default results at the service boundary, so the
/// conversational path is never interrupted by a context-store fault.
#[derive(Debug, ThisError)]
pub enum Error {
    /// Invalid input was provided.
    ///
    /// Raised when:
    /// - Required fields are missing (e.g. empty ability name)
    /// - A stored payload fails JSON deserialization
    #[error("invalid input: {0}")]
    InvalidInput(String),

    /// An operation failed.
    ///
    /// Raised when:
    /// - `SQLite` database operations fail
    /// - Filesystem I/O errors occur
    /// - A configuration file cannot be read or parsed
    #[error("operation '{operation}' failed: {cause}")]
    OperationFailed {
        /// The operation that failed.
        operation: String,
        /// The underlying cause.
        cause: String,
    },
}

/// Result type alias for mnemon operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Returns the current Unix timestamp in seconds.
///
/// Centralized to avoid duplicate implementations across the codebase. Falls
/// back to 0 if the system clock is before the Unix epoch.
#[must_use]
pub fn current_timestamp() -> u64 {
    use std::time::{SystemTime, UNIX_EPOCH};
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or(0)
}
