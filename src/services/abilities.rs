//! Capability registry and usage tracking.
//!
//! An explicitly constructed registry shared by handle, not ambient global
//! state. Abilities are plain records; dispatch stays with the caller and no
//! function reference is ever persisted.

use crate::current_timestamp;
use crate::models::{
    AbilityId, AbilityMetrics, AbilityRecord, AbilityStatus, AbilityType, ContextMap,
};
use crate::relevance::score;
use crate::storage::AbilityStore;
use std::sync::Arc;
use tracing::instrument;

/// Relevance assigned to an active ability with no declared example contexts.
const NO_EXAMPLES_RELEVANCE: f64 = 0.5;
/// Minimum relevance for an ability to be returned.
const ABILITY_RELEVANCE_THRESHOLD: f64 = 0.5;

/// An ability matched against a query context.
#[derive(Debug, Clone)]
pub struct RankedAbility {
    /// The matched ability.
    pub record: AbilityRecord,
    /// Context similarity, max over the ability's declared examples.
    pub relevance: f64,
    /// Current confidence level.
    pub confidence: f64,
}

impl RankedAbility {
    /// Ranking key: relevance weighted by confidence.
    #[must_use]
    pub fn rank(&self) -> f64 {
        self.relevance * self.confidence
    }
}

/// Registry of declared capabilities with durable usage metrics.
pub struct AbilityRegistry {
    store: Arc<AbilityStore>,
}

impl AbilityRegistry {
    /// Creates a registry backed by the given store.
    #[must_use]
    pub fn new(store: Arc<AbilityStore>) -> Self {
        Self { store }
    }

    /// Registers an ability and returns its generated id.
    ///
    /// A blank name is rejected with `None`; nothing is stored. Store faults
    /// are logged and also yield `None`.
    #[instrument(skip_all, fields(name = %name))]
    pub fn register(
        &self,
        name: &str,
        description: &str,
        ability_type: AbilityType,
        requirements: ContextMap,
        metadata: ContextMap,
        example_contexts: Vec<ContextMap>,
    ) -> Option<AbilityId> {
        if name.trim().is_empty() {
            tracing::warn!("rejecting ability registration with blank name");
            return None;
        }

        let now = current_timestamp();
        let record = AbilityRecord {
            id: AbilityId::generate(),
            name: name.to_string(),
            description: description.to_string(),
            ability_type,
            status: AbilityStatus::Active,
            requirements,
            metadata,
            example_contexts,
            created_at: now,
            updated_at: now,
        };

        match self.store.save_ability(&record) {
            Ok(()) => {
                metrics::counter!("abilities_registered_total").increment(1);
                Some(record.id)
            },
            Err(e) => {
                tracing::error!(error = %e, "ability registration failed");
                None
            },
        }
    }

    /// Fetches a registered ability.
    #[must_use]
    pub fn get(&self, id: &AbilityId) -> Option<AbilityRecord> {
        match self.store.get_ability(id) {
            Ok(record) => record,
            Err(e) => {
                tracing::error!(error = %e, "ability lookup failed");
                None
            },
        }
    }

    /// Updates an ability's status. Unknown ids are a logged no-op.
    #[instrument(skip(self), fields(ability_id = %id))]
    pub fn update_status(&self, id: &AbilityId, status: AbilityStatus, reason: Option<&str>) {
        match self.store.update_status(id, status) {
            Ok(true) => {
                tracing::info!(
                    ability_id = %id,
                    status = status.as_str(),
                    reason = reason.unwrap_or("unspecified"),
                    "ability status changed"
                );
            },
            Ok(false) => tracing::debug!(ability_id = %id, "status update on unknown ability"),
            Err(e) => tracing::error!(error = %e, "ability status update failed"),
        }
    }

    /// Folds one use into the ability's running metrics and persists the
    /// updated snapshot. Unknown ids are a logged no-op.
    #[instrument(skip(self), fields(ability_id = %id, success))]
    pub fn record_use(&self, id: &AbilityId, success: bool, response_time: f64) {
        let known = match self.store.get_ability(id) {
            Ok(record) => record.is_some(),
            Err(e) => {
                tracing::error!(error = %e, "ability lookup failed");
                return;
            },
        };
        if !known {
            tracing::debug!(ability_id = %id, "use recorded for unknown ability, no-op");
            return;
        }

        let mut snapshot = match self.store.load_metrics(id) {
            Ok(snapshot) => snapshot,
            Err(e) => {
                tracing::error!(error = %e, "metrics load failed, starting from neutral");
                AbilityMetrics::default()
            },
        };
        snapshot.record(success, response_time, current_timestamp());

        if let Err(e) = self.store.record_metrics(id, &snapshot) {
            tracing::error!(error = %e, "metrics persistence failed");
        }
    }

    /// Returns the current metrics snapshot for a registered ability, or
    /// `None` for an unknown id.
    ///
    /// Abilities with no recorded uses report the neutral default.
    #[must_use]
    pub fn metrics(&self, id: &AbilityId) -> Option<AbilityMetrics> {
        self.get(id)?;
        match self.store.load_metrics(id) {
            Ok(snapshot) => Some(snapshot),
            Err(e) => {
                tracing::error!(error = %e, "metrics load failed, reporting neutral");
                Some(AbilityMetrics::default())
            },
        }
    }

    fn confidence(&self, id: &AbilityId) -> f64 {
        self.store
            .load_metrics(id)
            .map(|m| m.confidence_level)
            .unwrap_or_else(|e| {
                tracing::error!(error = %e, "metrics load failed, assuming neutral");
                AbilityMetrics::default().confidence_level
            })
    }

    /// Returns active abilities relevant to the query context.
    ///
    /// Relevance is the maximum similarity between the query and each of the
    /// ability's declared example contexts; an ability with none declared
    /// scores a neutral 0.5. Results are filtered by confidence and
    /// relevance, then ranked by relevance times confidence.
    #[instrument(skip(self, context))]
    pub fn find_relevant(&self, context: &ContextMap, min_confidence: f64) -> Vec<RankedAbility> {
        let records = match self.store.list_abilities() {
            Ok(records) => records,
            Err(e) => {
                tracing::error!(error = %e, "ability listing failed, returning empty");
                return Vec::new();
            },
        };

        let mut matched: Vec<RankedAbility> = records
            .into_iter()
            .filter(|r| r.status == AbilityStatus::Active)
            .filter_map(|record| {
                let confidence = self.confidence(&record.id);
                if confidence < min_confidence {
                    return None;
                }
                let relevance = if record.example_contexts.is_empty() {
                    NO_EXAMPLES_RELEVANCE
                } else {
                    record
                        .example_contexts
                        .iter()
                        .map(|example| score(context, example))
                        .fold(0.0_f64, f64::max)
                };
                (relevance > ABILITY_RELEVANCE_THRESHOLD).then_some(RankedAbility {
                    record,
                    relevance,
                    confidence,
                })
            })
            .collect();

        matched.sort_by(|a, b| {
            b.rank()
                .partial_cmp(&a.rank())
                .unwrap_or(std::cmp::Ordering::Equal)
        });
        matched
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::ContextValue;

    fn registry() -> AbilityRegistry {
        AbilityRegistry::new(Arc::new(AbilityStore::in_memory().unwrap()))
    }

    fn ctx(entries: &[(&str, ContextValue)]) -> ContextMap {
        entries
            .iter()
            .map(|(k, v)| ((*k).to_string(), v.clone()))
            .collect()
    }

    fn register(registry: &AbilityRegistry, name: &str, examples: Vec<ContextMap>) -> Option<AbilityId> {
        registry.register(
            name,
            "",
            AbilityType::Action,
            ContextMap::new(),
            ContextMap::new(),
            examples,
        )
    }

    #[test]
    fn test_blank_name_rejected() {
        let registry = registry();
        assert!(register(&registry, "", vec![]).is_none());
        assert!(register(&registry, "   ", vec![]).is_none());
        assert!(registry.find_relevant(&ContextMap::new(), 0.0).is_empty());
    }

    #[test]
    fn test_register_and_find_by_example_context() {
        let registry = registry();
        let example = ctx(&[("task_type", ContextValue::text("search"))]);
        let id = register(&registry, "web_search", vec![example.clone()]).unwrap();

        let hits = registry.find_relevant(&example, 0.0);
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].record.id, id);
        assert!((hits[0].relevance - 1.0).abs() < 1e-9);
    }

    #[test]
    fn test_find_relevant_max_over_examples() {
        let registry = registry();
        let near = ctx(&[("task_type", ContextValue::text("translate"))]);
        let far = ctx(&[("task_type", ContextValue::text("draw"))]);
        register(&registry, "translate", vec![far, near.clone()]).unwrap();

        let hits = registry.find_relevant(&near, 0.0);
        assert_eq!(hits.len(), 1);
        assert!((hits[0].relevance - 1.0).abs() < 1e-9);
    }

    #[test]
    fn test_inactive_abilities_excluded() {
        let registry = registry();
        let example = ctx(&[("task_type", ContextValue::text("speak"))]);
        let id = register(&registry, "speak", vec![example.clone()]).unwrap();

        registry.update_status(&id, AbilityStatus::Deprecated, Some("superseded"));
        assert!(registry.find_relevant(&example, 0.0).is_empty());
    }

    #[test]
    fn test_confidence_threshold_filters() {
        let registry = registry();
        let example = ctx(&[("task_type", ContextValue::text("fetch"))]);
        let id = register(&registry, "fetch", vec![example.clone()]).unwrap();

        // Fresh ability sits at neutral 0.5 confidence
        assert!(registry.find_relevant(&example, 0.6).is_empty());

        // Fast successes raise confidence past the bar
        for _ in 0..5 {
            registry.record_use(&id, true, 0.1);
        }
        let hits = registry.find_relevant(&example, 0.6);
        assert_eq!(hits.len(), 1);
        assert!(hits[0].confidence > 0.6);
    }

    #[test]
    fn test_record_use_unknown_id_is_noop() {
        let registry = registry();
        registry.record_use(&AbilityId::from("missing"), true, 1.0);
        assert!(registry.metrics(&AbilityId::from("missing")).is_none());
    }

    #[test]
    fn test_metrics_accumulate_across_uses() {
        let registry = registry();
        let id = register(&registry, "count", vec![]).unwrap();

        registry.record_use(&id, true, 1.0);
        registry.record_use(&id, false, 3.0);

        let metrics = registry.metrics(&id).unwrap();
        assert_eq!(metrics.usage_count, 2);
        assert!((metrics.success_rate - 0.5).abs() < 1e-9);
        assert!((metrics.avg_response_time - 2.0).abs() < 1e-9);
    }
}
