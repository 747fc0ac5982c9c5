//! Interaction pattern records.

use super::context::ContextMap;

/// A remembered regularity shared by multiple subsystems.
///
/// Patterns accumulate frequency and a running success rate as matching
/// interactions recur.
#[derive(Debug, Clone)]
pub struct Pattern {
    /// Type tag grouping related patterns (e.g. `"command"`, `"file_access"`).
    pub pattern_type: String,
    /// Opaque data payload identifying the pattern.
    pub data: ContextMap,
    /// Number of times this pattern has been observed.
    pub frequency: u64,
    /// Online running mean of success, in [0, 1].
    pub success_rate: f64,
    /// Timestamp of the last observation (unix seconds).
    pub last_used: u64,
}

/// A pattern scored against a query context.
#[derive(Debug, Clone)]
pub struct RankedPattern {
    /// The matched pattern.
    pub pattern: Pattern,
    /// Weighted relevance to the query context, in (0.5, 1].
    pub relevance: f64,
}
