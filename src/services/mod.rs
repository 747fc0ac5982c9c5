//! Engine services layered over the durable stores.
//!
//! Services follow a fail-soft discipline: store faults are logged and
//! degraded to empty or default results so the conversational path is never
//! interrupted.

pub mod abilities;
pub mod memory;

pub use abilities::{AbilityRegistry, RankedAbility};
pub use memory::{CompactionStats, ConversationMemoryManager};
