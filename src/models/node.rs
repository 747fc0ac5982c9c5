//! Context graph node types.

use super::context::ContextMap;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Unique identifier for a context node.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct NodeId(String);

impl NodeId {
    /// Creates a new node ID.
    #[must_use]
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Generates a fresh ID carrying the node type as a prefix.
    #[must_use]
    pub fn generate(node_type: &str) -> Self {
        Self(format!("{node_type}_{}", uuid::Uuid::new_v4()))
    }

    /// Returns the ID as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<&str> for NodeId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

/// A persisted unit of situational information.
///
/// References are weak links (not ownership) and may form cycles.
#[derive(Debug, Clone)]
pub struct ContextNode {
    /// Unique identifier.
    pub id: NodeId,
    /// Type tag (e.g. `"system_state"`, `"user_preference"`).
    pub node_type: String,
    /// Opaque content payload.
    pub content: ContextMap,
    /// Creation timestamp (unix seconds).
    pub timestamp: u64,
    /// Importance score. Initialized to 1.0, mutated by decay/reinforcement.
    pub importance: f64,
    /// Outgoing reference ids.
    pub references: Vec<NodeId>,
}

impl ContextNode {
    /// Creates a new node with importance 1.0.
    #[must_use]
    pub fn new(node_type: impl Into<String>, content: ContextMap) -> Self {
        let node_type = node_type.into();
        Self {
            id: NodeId::generate(&node_type),
            node_type,
            content,
            timestamp: crate::current_timestamp(),
            importance: 1.0,
            references: Vec::new(),
        }
    }
}

/// A node returned by one-hop traversal, carrying the edge strength.
#[derive(Debug, Clone)]
pub struct RelatedNode {
    /// The related node.
    pub node: ContextNode,
    /// Strength of the connecting relation.
    pub strength: f64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_generated_id_carries_type_prefix() {
        let node = ContextNode::new("system_state", ContextMap::new());
        assert!(node.id.as_str().starts_with("system_state_"));
        assert!((node.importance - 1.0).abs() < f64::EPSILON);
    }
}
