//! Exact-match payload filters.

use std::collections::HashMap;

use qdrant_client::qdrant::{
    condition::ConditionOneOf, r#match::MatchValue, Condition, FieldCondition, Filter, Match,
};
use serde_json::Value;

/// A scalar value a payload field must equal.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FieldMatch {
    Keyword(String),
    Integer(i64),
    Bool(bool),
}

impl FieldMatch {
    fn matches(&self, value: &Value) -> bool {
        match (self, value) {
            (FieldMatch::Keyword(expected), Value::String(actual)) => expected == actual,
            (FieldMatch::Integer(expected), Value::Number(actual)) => {
                actual.as_i64() == Some(*expected)
            }
            (FieldMatch::Bool(expected), Value::Bool(actual)) => expected == actual,
            _ => false,
        }
    }

    fn to_match_value(&self) -> MatchValue {
        match self {
            FieldMatch::Keyword(s) => MatchValue::Keyword(s.clone()),
            FieldMatch::Integer(i) => MatchValue::Integer(*i),
            FieldMatch::Bool(b) => MatchValue::Boolean(*b),
        }
    }
}

/// Conjunction of field conditions; every condition must hold.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SearchFilter {
    conditions: Vec<(String, FieldMatch)>,
}

impl SearchFilter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_keyword(self, key: &str, value: &str) -> Self {
        self.with(key, FieldMatch::Keyword(value.to_string()))
    }

    pub fn with_integer(self, key: &str, value: i64) -> Self {
        self.with(key, FieldMatch::Integer(value))
    }

    pub fn with_bool(self, key: &str, value: bool) -> Self {
        self.with(key, FieldMatch::Bool(value))
    }

    pub fn with(mut self, key: &str, value: FieldMatch) -> Self {
        self.conditions.push((key.to_string(), value));
        self
    }

    pub fn is_empty(&self) -> bool {
        self.conditions.is_empty()
    }

    /// Evaluate against a payload. A missing field never matches.
    pub fn matches(&self, payload: &HashMap<String, Value>) -> bool {
        self.conditions.iter().all(|(key, expected)| {
            payload
                .get(key)
                .map(|value| expected.matches(value))
                .unwrap_or(false)
        })
    }

    pub(crate) fn to_qdrant_filter(&self) -> Filter {
        let conditions = self
            .conditions
            .iter()
            .map(|(key, value)| make_match_condition(key, value.to_match_value()))
            .collect();

        Filter {
            must: conditions,
            ..Default::default()
        }
    }
}

/// Create a match condition for a field
fn make_match_condition(key: &str, value: MatchValue) -> Condition {
    Condition {
        condition_one_of: Some(ConditionOneOf::Field(FieldCondition {
            key: key.to_string(),
            r#match: Some(Match {
                match_value: Some(value),
            }),
            ..Default::default()
        })),
    }
}
