//! Ability (capability) records and usage metrics.

use super::context::ContextMap;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Unique identifier for an ability.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct AbilityId(String);

impl AbilityId {
    /// Creates a new ability ID.
    #[must_use]
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Generates a fresh ability ID.
    #[must_use]
    pub fn generate() -> Self {
        Self(format!("ability_{}", uuid::Uuid::new_v4()))
    }

    /// Returns the ID as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for AbilityId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<&str> for AbilityId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

/// Categories of abilities.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AbilityType {
    /// Perceiving and understanding input.
    Perception,
    /// Processing and reasoning.
    Cognition,
    /// Taking action or making changes.
    Action,
    /// Learning and adapting.
    Learning,
    /// Interacting and expressing.
    Communication,
    /// Storing and recalling information.
    Memory,
    /// Meta-abilities for self-awareness.
    Awareness,
    /// UI-related abilities.
    Ui,
}

impl AbilityType {
    /// Returns the canonical string form.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Perception => "perception",
            Self::Cognition => "cognition",
            Self::Action => "action",
            Self::Learning => "learning",
            Self::Communication => "communication",
            Self::Memory => "memory",
            Self::Awareness => "awareness",
            Self::Ui => "ui",
        }
    }

    /// Parses a type string, defaulting unknown values to `Action`.
    #[must_use]
    pub fn parse(s: &str) -> Self {
        match s {
            "perception" => Self::Perception,
            "cognition" => Self::Cognition,
            "learning" => Self::Learning,
            "communication" => Self::Communication,
            "memory" => Self::Memory,
            "awareness" => Self::Awareness,
            "ui" => Self::Ui,
            _ => Self::Action,
        }
    }
}

/// Status of an ability.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AbilityStatus {
    /// Currently available and working.
    Active,
    /// Present but not currently available.
    Inactive,
    /// Still being developed or learned.
    Learning,
    /// No longer in use.
    Deprecated,
}

impl AbilityStatus {
    /// Returns the canonical string form.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Active => "active",
            Self::Inactive => "inactive",
            Self::Learning => "learning",
            Self::Deprecated => "deprecated",
        }
    }

    /// Parses a status string, defaulting unknown values to `Inactive`.
    #[must_use]
    pub fn parse(s: &str) -> Self {
        match s {
            "active" => Self::Active,
            "learning" => Self::Learning,
            "deprecated" => Self::Deprecated,
            _ => Self::Inactive,
        }
    }
}

/// A registered capability.
///
/// Abilities are plain records; callers dispatch on id/name themselves.
/// Nothing resembling a function reference is ever persisted.
#[derive(Debug, Clone)]
pub struct AbilityRecord {
    /// Unique identifier.
    pub id: AbilityId,
    /// Human-readable name. Must be non-blank at registration.
    pub name: String,
    /// Description of what the ability does.
    pub description: String,
    /// Category.
    pub ability_type: AbilityType,
    /// Current status.
    pub status: AbilityStatus,
    /// Declared requirements.
    pub requirements: ContextMap,
    /// Free-form metadata.
    pub metadata: ContextMap,
    /// Example contexts in which the ability applies, used for relevance
    /// scoring.
    pub example_contexts: Vec<ContextMap>,
    /// Creation timestamp (unix seconds).
    pub created_at: u64,
    /// Last update timestamp.
    pub updated_at: u64,
}

/// Usage and effectiveness metrics for one ability.
#[derive(Debug, Clone, PartialEq)]
pub struct AbilityMetrics {
    /// Total recorded uses.
    pub usage_count: u64,
    /// Online running mean of success, in [0, 1].
    pub success_rate: f64,
    /// Online running mean of response time in seconds.
    pub avg_response_time: f64,
    /// Blend of success rate and responsiveness, in [0, 1].
    pub confidence_level: f64,
    /// Timestamp of the last recorded use (unix seconds).
    pub last_used: Option<u64>,
}

impl Default for AbilityMetrics {
    fn default() -> Self {
        Self {
            usage_count: 0,
            success_rate: 0.0,
            avg_response_time: 0.0,
            confidence_level: 0.5,
            last_used: None,
        }
    }
}

impl AbilityMetrics {
    /// Folds one use into the running means and recomputes confidence.
    ///
    /// Confidence blends effectiveness and responsiveness:
    /// `0.7 * success_rate + 0.3 * min(1, 1 / (avg_response_time + 1))`.
    #[allow(clippy::cast_precision_loss)]
    pub fn record(&mut self, success: bool, response_time: f64, now: u64) {
        self.usage_count += 1;
        let n = self.usage_count as f64;
        self.last_used = Some(now);
        self.avg_response_time = (self.avg_response_time * (n - 1.0) + response_time) / n;
        let outcome = if success { 1.0 } else { 0.0 };
        self.success_rate = (self.success_rate * (n - 1.0) + outcome) / n;
        self.confidence_level = 0.7 * self.success_rate
            + 0.3 * (1.0 / (self.avg_response_time + 1.0)).min(1.0);
    }
}
