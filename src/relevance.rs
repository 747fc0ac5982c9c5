//! Structural relevance scoring between context payloads.
//!
//! The scorer is a pure function used by every retrieval path: related-task
//! lookup, ability ranking, and pattern matching. Scores are always in
//! [0, 1].
//!
//! Rules:
//! - Scalar leaves score 1.0 on equality, else 0.0.
//! - Lists score the Jaccard index of their element sets (0.0 on an empty
//!   union).
//! - Maps recurse over the intersection of keys present in both sides and
//!   average the per-key scores; an empty intersection contributes 0.0.
//! - Any type mismatch between corresponding values contributes 0.0.

use crate::models::{ContextMap, ContextValue};
use std::collections::{HashMap, HashSet};

/// Static importance weights for top-level context keys.
///
/// Keys not present in the table fall back to the table's default weight.
#[derive(Debug, Clone)]
pub struct WeightTable {
    weights: HashMap<String, f64>,
    default: f64,
}

impl WeightTable {
    /// Creates a table from (key, weight) pairs with the given fallback.
    #[must_use]
    pub fn new<I, S>(entries: I, default: f64) -> Self
    where
        I: IntoIterator<Item = (S, f64)>,
        S: Into<String>,
    {
        Self {
            weights: entries.into_iter().map(|(k, w)| (k.into(), w)).collect(),
            default,
        }
    }

    /// Weights tuned for interaction-pattern matching.
    #[must_use]
    pub fn interaction_defaults() -> Self {
        Self::new(
            [
                ("task_type", 1.0),
                ("file_type", 0.8),
                ("command", 0.8),
                ("directory", 0.6),
                ("tags", 0.4),
            ],
            0.5,
        )
    }

    /// Returns the weight for a key.
    #[must_use]
    pub fn weight(&self, key: &str) -> f64 {
        self.weights.get(key).copied().unwrap_or(self.default)
    }
}

impl Default for WeightTable {
    /// A uniform table: every key weighs 1.0.
    fn default() -> Self {
        Self {
            weights: HashMap::new(),
            default: 1.0,
        }
    }
}

/// Scores the structural similarity of two context values.
#[must_use]
pub fn score_values(a: &ContextValue, b: &ContextValue) -> f64 {
    match (a, b) {
        (ContextValue::Scalar(x), ContextValue::Scalar(y)) => {
            if x == y { 1.0 } else { 0.0 }
        },
        (ContextValue::List(x), ContextValue::List(y)) => {
            let xs: HashSet<_> = x.iter().collect();
            let ys: HashSet<_> = y.iter().collect();
            let union = xs.union(&ys).count();
            if union == 0 {
                0.0
            } else {
                #[allow(clippy::cast_precision_loss)]
                let jaccard = xs.intersection(&ys).count() as f64 / union as f64;
                jaccard
            }
        },
        (ContextValue::Map(x), ContextValue::Map(y)) => {
            let common: Vec<_> = x.keys().filter(|k| y.contains_key(*k)).collect();
            if common.is_empty() {
                return 0.0;
            }
            let total: f64 = common.iter().map(|k| score_values(&x[*k], &y[*k])).sum();
            #[allow(clippy::cast_precision_loss)]
            let mean = total / common.len() as f64;
            mean
        },
        // Type mismatch
        _ => 0.0,
    }
}

/// Scores two context maps with uniform weights.
#[must_use]
pub fn score(a: &ContextMap, b: &ContextMap) -> f64 {
    score_weighted(a, b, &WeightTable::default())
}

/// Scores two context maps, weighting top-level keys by the given table.
///
/// Only keys present in both maps contribute:
/// `sum(weight * subscore) / sum(weight)`. No common keys scores 0.0.
#[must_use]
pub fn score_weighted(a: &ContextMap, b: &ContextMap, weights: &WeightTable) -> f64 {
    let mut weighted_sum = 0.0;
    let mut weight_total = 0.0;

    for (key, value) in a {
        let Some(other) = b.get(key) else { continue };
        let w = weights.weight(key);
        weighted_sum += w * score_values(value, other);
        weight_total += w;
    }

    if weight_total > 0.0 {
        weighted_sum / weight_total
    } else {
        0.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use test_case::test_case;

    fn map(entries: &[(&str, ContextValue)]) -> ContextMap {
        entries
            .iter()
            .map(|(k, v)| ((*k).to_string(), v.clone()))
            .collect()
    }

    #[test]
    fn test_weighted_example() {
        // score({"lang":"python","tags":["a","b"]}, {"lang":"python","tags":["b","c"]})
        // with uniform weights = (1.0 + 1/3) / 2
        let a = map(&[
            ("lang", ContextValue::text("python")),
            ("tags", ContextValue::text_list(["a", "b"])),
        ]);
        let b = map(&[
            ("lang", ContextValue::text("python")),
            ("tags", ContextValue::text_list(["b", "c"])),
        ]);
        let expected = (1.0 + 1.0 / 3.0) / 2.0;
        assert!((score(&a, &b) - expected).abs() < 1e-9);
    }

    #[test_case(ContextValue::text("x"), ContextValue::text("x") => 1.0; "equal text")]
    #[test_case(ContextValue::text("x"), ContextValue::text("y") => 0.0; "different text")]
    #[test_case(ContextValue::from(3i64), ContextValue::from(3i64) => 1.0; "equal int")]
    #[test_case(ContextValue::from(true), ContextValue::from(false) => 0.0; "different bool")]
    #[test_case(ContextValue::text("3"), ContextValue::from(3i64) => 0.0; "type mismatch scalar")]
    #[test_case(ContextValue::text("x"), ContextValue::text_list(["x"]) => 0.0; "scalar vs list")]
    #[test_case(ContextValue::List(vec![]), ContextValue::List(vec![]) => 0.0; "empty union")]
    fn test_leaf_scores(a: ContextValue, b: ContextValue) -> f64 {
        score_values(&a, &b)
    }

    #[test]
    fn test_jaccard_duplicates_ignored() {
        // Lists compare as sets
        let a = ContextValue::text_list(["a", "a", "b"]);
        let b = ContextValue::text_list(["b", "c"]);
        assert!((score_values(&a, &b) - 1.0 / 3.0).abs() < 1e-9);
    }

    #[test]
    fn test_nested_map_empty_intersection_is_zero() {
        let a = map(&[("inner", ContextValue::Map(map(&[("x", ContextValue::from(1i64))])))]);
        let b = map(&[("inner", ContextValue::Map(map(&[("y", ContextValue::from(1i64))])))]);
        assert!((score(&a, &b) - 0.0).abs() < f64::EPSILON);
    }

    #[test]
    fn test_no_common_top_level_keys() {
        let a = map(&[("x", ContextValue::from(1i64))]);
        let b = map(&[("y", ContextValue::from(1i64))]);
        assert!((score(&a, &b) - 0.0).abs() < f64::EPSILON);
    }

    #[test]
    fn test_weight_table_skews_score() {
        let a = map(&[
            ("task_type", ContextValue::text("build")),
            ("tags", ContextValue::text_list(["x"])),
        ]);
        let b = map(&[
            ("task_type", ContextValue::text("build")),
            ("tags", ContextValue::text_list(["y"])),
        ]);
        let weights = WeightTable::interaction_defaults();
        // (1.0 * 1.0 + 0.4 * 0.0) / 1.4
        assert!((score_weighted(&a, &b, &weights) - 1.0 / 1.4).abs() < 1e-9);
    }

    // Strategy for small scalar-leaf maps
    fn scalar_map_strategy() -> impl Strategy<Value = ContextMap> {
        prop::collection::btree_map(
            "[a-z]{1,6}",
            prop_oneof![
                any::<i64>().prop_map(ContextValue::from),
                any::<bool>().prop_map(ContextValue::from),
                "[a-z]{0,8}".prop_map(ContextValue::text),
            ],
            1..6,
        )
    }

    proptest! {
        #[test]
        fn prop_self_similarity_is_one(m in scalar_map_strategy()) {
            prop_assert!((score(&m, &m) - 1.0).abs() < 1e-9);
        }

        #[test]
        fn prop_score_in_unit_interval(
            a in scalar_map_strategy(),
            b in scalar_map_strategy(),
        ) {
            let s = score(&a, &b);
            prop_assert!((0.0..=1.0).contains(&s));
        }

        #[test]
        fn prop_score_symmetric(
            a in scalar_map_strategy(),
            b in scalar_map_strategy(),
        ) {
            prop_assert!((score(&a, &b) - score(&b, &a)).abs() < 1e-9);
        }
    }
}
