//! Data model types.

pub mod ability;
pub mod context;
pub mod node;
pub mod pattern;
pub mod segment;
pub mod task;

pub use ability::{AbilityId, AbilityMetrics, AbilityRecord, AbilityStatus, AbilityType};
pub use context::{ContextMap, ContextValue, ScalarValue, map_from_json, map_to_json};
pub use node::{ContextNode, NodeId, RelatedNode};
pub use pattern::{Pattern, RankedPattern};
pub use segment::{ConversationSegment, Modality, Summary};
pub use task::{Task, TaskId, TaskPriority, TaskStatus};
