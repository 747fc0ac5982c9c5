//! Engine facade wiring the stores and services together.
//!
//! One [`MemoryEngine`] per assistant process; share it by handle. It is an
//! explicitly constructed, dependency-injected coordinator rather than a
//! process-wide singleton.

use crate::config::EngineConfig;
use crate::services::{AbilityRegistry, ConversationMemoryManager};
use crate::storage::{AbilityStore, ContextGraphStore, PatternStore, TaskGraphStore};
use crate::{Error, Result};
use std::sync::Arc;
use std::time::Duration;
use tracing::instrument;

/// Context and memory retention engine.
///
/// Owns the durable stores and the session-scoped services over them. All
/// handles are cheap to clone via `Arc` and safe to share across threads;
/// callers on async runtimes should wrap store-touching calls in their
/// runtime's blocking facility.
pub struct MemoryEngine {
    config: EngineConfig,
    graph: Arc<ContextGraphStore>,
    tasks: Arc<TaskGraphStore>,
    patterns: Arc<PatternStore>,
    memory: ConversationMemoryManager,
    registry: AbilityRegistry,
}

impl MemoryEngine {
    /// Opens the engine with stores rooted at the configured data directory.
    ///
    /// # Errors
    ///
    /// Returns an error if the data directory cannot be created or a store
    /// fails to open.
    #[instrument(skip(config), fields(data_dir = %config.data_dir.display()))]
    pub fn open(config: &EngineConfig) -> Result<Self> {
        std::fs::create_dir_all(&config.data_dir).map_err(|e| Error::OperationFailed {
            operation: "create_data_dir".to_string(),
            cause: e.to_string(),
        })?;

        let graph = Arc::new(ContextGraphStore::new(
            config.data_dir.join("context.db"),
            config.node_cache_capacity,
        )?);
        let tasks = Arc::new(TaskGraphStore::new(config.data_dir.join("tasks.db"))?);
        let abilities = Arc::new(AbilityStore::new(config.data_dir.join("abilities.db"))?);
        let patterns = Arc::new(PatternStore::new(config.data_dir.join("patterns.db"))?);

        tracing::info!(data_dir = %config.data_dir.display(), "memory engine opened");
        Ok(Self {
            memory: ConversationMemoryManager::new(config.memory.clone(), Arc::clone(&graph)),
            registry: AbilityRegistry::new(abilities),
            config: config.clone(),
            graph,
            tasks,
            patterns,
        })
    }

    /// Opens a fully in-memory engine (useful for testing).
    ///
    /// # Errors
    ///
    /// Returns an error if a store fails to initialize.
    pub fn in_memory() -> Result<Self> {
        let config = EngineConfig::default();
        let graph = Arc::new(ContextGraphStore::in_memory()?);
        Ok(Self {
            memory: ConversationMemoryManager::new(config.memory.clone(), Arc::clone(&graph)),
            registry: AbilityRegistry::new(Arc::new(AbilityStore::in_memory()?)),
            graph,
            tasks: Arc::new(TaskGraphStore::in_memory()?),
            patterns: Arc::new(PatternStore::in_memory()?),
            config,
        })
    }

    /// Returns the engine configuration.
    #[must_use]
    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// Returns the conversation memory manager for this session.
    #[must_use]
    pub fn memory(&self) -> &ConversationMemoryManager {
        &self.memory
    }

    /// Returns the context graph store.
    #[must_use]
    pub fn graph(&self) -> &ContextGraphStore {
        &self.graph
    }

    /// Returns the task dependency graph store.
    #[must_use]
    pub fn tasks(&self) -> &TaskGraphStore {
        &self.tasks
    }

    /// Returns the ability registry.
    #[must_use]
    pub fn abilities(&self) -> &AbilityRegistry {
        &self.registry
    }

    /// Returns the interaction pattern store.
    #[must_use]
    pub fn patterns(&self) -> &PatternStore {
        &self.patterns
    }

    /// Runs one maintenance pass: refreshes active-segment importance against
    /// the current topic window and prunes decayed context nodes older than
    /// `max_age`. Returns the number of nodes removed.
    ///
    /// There is no background sweeper; call this periodically from the
    /// orchestration layer.
    ///
    /// # Errors
    ///
    /// Returns an error if pruning fails.
    #[instrument(skip(self))]
    pub fn maintain(&self, max_age: Duration) -> Result<usize> {
        self.memory.recompute_importance();
        let pruned = self.graph.prune_older_than(max_age)?;
        if pruned > 0 {
            tracing::info!(pruned, "maintenance pruned decayed context nodes");
        }
        Ok(pruned)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{ContextMap, Modality};

    #[test]
    fn test_in_memory_engine_wires_services() {
        let engine = MemoryEngine::in_memory().unwrap();

        engine
            .memory()
            .append_exchange("hello engine", "hello user", &[Modality::Text]);
        assert_eq!(engine.memory().active_count(), 1);

        let id = engine
            .graph()
            .add_node("system_state", ContextMap::new(), &[])
            .unwrap();
        assert!(engine.graph().get_node(&id).unwrap().is_some());
    }

    #[test]
    fn test_maintain_reports_pruned_count() {
        let engine = MemoryEngine::in_memory().unwrap();
        let id = engine
            .graph()
            .add_node("note", ContextMap::new(), &[])
            .unwrap();
        engine.graph().update_importance(&id, 0.1).unwrap();

        assert_eq!(engine.maintain(Duration::from_secs(0)).unwrap(), 1);
        assert_eq!(engine.maintain(Duration::from_secs(0)).unwrap(), 0);
    }
}
