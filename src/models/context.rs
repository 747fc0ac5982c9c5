//! Tagged context payload values.
//!
//! Free-form nested context maps (arbitrary scalar/list/map mixes) are
//! represented as a tagged variant so relevance recursion is exhaustively
//! type-checked. Payloads round-trip through JSON for storage.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::hash::{Hash, Hasher};

/// A scalar leaf in a context payload.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ScalarValue {
    /// Boolean value.
    Bool(bool),
    /// Integer value.
    Int(i64),
    /// Floating point value.
    Float(f64),
    /// Text value.
    Text(String),
}

// Floats compare by bit pattern so scalar sets (Jaccard) are well-defined.
// NaN payloads never arise from JSON, so reflexivity holds in practice.
impl Eq for ScalarValue {}

impl Hash for ScalarValue {
    fn hash<H: Hasher>(&self, state: &mut H) {
        match self {
            Self::Bool(b) => {
                0u8.hash(state);
                b.hash(state);
            },
            Self::Int(i) => {
                1u8.hash(state);
                i.hash(state);
            },
            Self::Float(f) => {
                2u8.hash(state);
                f.to_bits().hash(state);
            },
            Self::Text(s) => {
                3u8.hash(state);
                s.hash(state);
            },
        }
    }
}

impl std::fmt::Display for ScalarValue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Bool(b) => write!(f, "{b}"),
            Self::Int(i) => write!(f, "{i}"),
            Self::Float(x) => write!(f, "{x}"),
            Self::Text(s) => write!(f, "{s}"),
        }
    }
}

/// A context payload value: scalar leaf, list of scalars, or nested map.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ContextValue {
    /// A single scalar.
    Scalar(ScalarValue),
    /// A list of scalars, compared as a set.
    List(Vec<ScalarValue>),
    /// A nested map of named values.
    Map(BTreeMap<String, ContextValue>),
}

/// The universal context payload type: named values at the top level.
pub type ContextMap = BTreeMap<String, ContextValue>;

impl ContextValue {
    /// Creates a text scalar.
    pub fn text(s: impl Into<String>) -> Self {
        Self::Scalar(ScalarValue::Text(s.into()))
    }

    /// Creates a list of text scalars.
    pub fn text_list<I, S>(items: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self::List(
            items
                .into_iter()
                .map(|s| ScalarValue::Text(s.into()))
                .collect(),
        )
    }

    /// Converts a JSON value into a context value, degrading lossily.
    ///
    /// JSON null becomes empty text; list elements that are not scalars are
    /// flattened to their string rendering.
    #[must_use]
    pub fn from_json(value: &serde_json::Value) -> Self {
        use serde_json::Value;
        match value {
            Value::Null => Self::Scalar(ScalarValue::Text(String::new())),
            Value::Bool(b) => Self::Scalar(ScalarValue::Bool(*b)),
            Value::Number(n) => Self::Scalar(n.as_i64().map_or_else(
                || ScalarValue::Float(n.as_f64().unwrap_or(0.0)),
                ScalarValue::Int,
            )),
            Value::String(s) => Self::Scalar(ScalarValue::Text(s.clone())),
            Value::Array(items) => Self::List(items.iter().map(json_scalar).collect()),
            Value::Object(fields) => Self::Map(
                fields
                    .iter()
                    .map(|(k, v)| (k.clone(), Self::from_json(v)))
                    .collect(),
            ),
        }
    }

    /// Converts this value into JSON.
    #[must_use]
    pub fn to_json(&self) -> serde_json::Value {
        // Untagged serde maps each variant onto its natural JSON shape.
        serde_json::to_value(self).unwrap_or(serde_json::Value::Null)
    }
}

fn json_scalar(value: &serde_json::Value) -> ScalarValue {
    use serde_json::Value;
    match value {
        Value::Bool(b) => ScalarValue::Bool(*b),
        Value::Number(n) => n.as_i64().map_or_else(
            || ScalarValue::Float(n.as_f64().unwrap_or(0.0)),
            ScalarValue::Int,
        ),
        Value::String(s) => ScalarValue::Text(s.clone()),
        other => ScalarValue::Text(other.to_string()),
    }
}

impl From<&str> for ContextValue {
    fn from(s: &str) -> Self {
        Self::text(s)
    }
}

impl From<String> for ContextValue {
    fn from(s: String) -> Self {
        Self::text(s)
    }
}

impl From<i64> for ContextValue {
    fn from(i: i64) -> Self {
        Self::Scalar(ScalarValue::Int(i))
    }
}

impl From<f64> for ContextValue {
    fn from(f: f64) -> Self {
        Self::Scalar(ScalarValue::Float(f))
    }
}

impl From<bool> for ContextValue {
    fn from(b: bool) -> Self {
        Self::Scalar(ScalarValue::Bool(b))
    }
}

/// Serializes a context map to its canonical JSON text form for storage.
#[must_use]
pub fn map_to_json(map: &ContextMap) -> String {
    serde_json::to_string(map).unwrap_or_else(|_| "{}".to_string())
}

/// Parses a context map from stored JSON text, degrading to empty on error.
#[must_use]
pub fn map_from_json(text: &str) -> ContextMap {
    match serde_json::from_str::<serde_json::Value>(text) {
        Ok(serde_json::Value::Object(fields)) => fields
            .iter()
            .map(|(k, v)| (k.clone(), ContextValue::from_json(v)))
            .collect(),
        _ => ContextMap::new(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_scalar_equality_and_hash() {
        use std::collections::HashSet;
        let set: HashSet<ScalarValue> = [
            ScalarValue::Text("a".to_string()),
            ScalarValue::Text("a".to_string()),
            ScalarValue::Int(1),
            ScalarValue::Float(1.0),
        ]
        .into_iter()
        .collect();
        // Int(1) and Float(1.0) are distinct leaves
        assert_eq!(set.len(), 3);
    }

    #[test]
    fn test_json_round_trip() {
        let mut map = ContextMap::new();
        map.insert("lang".to_string(), ContextValue::text("rust"));
        map.insert("tags".to_string(), ContextValue::text_list(["a", "b"]));
        let mut inner = ContextMap::new();
        inner.insert("depth".to_string(), ContextValue::from(2i64));
        map.insert("nested".to_string(), ContextValue::Map(inner));

        let encoded = map_to_json(&map);
        let decoded = map_from_json(&encoded);
        assert_eq!(map, decoded);
    }

    #[test]
    fn test_from_json_degrades_null() {
        let value = ContextValue::from_json(&serde_json::Value::Null);
        assert_eq!(value, ContextValue::text(""));
    }

    #[test]
    fn test_map_from_json_bad_input() {
        assert!(map_from_json("not json").is_empty());
        assert!(map_from_json("[1,2,3]").is_empty());
    }
}
