//! Tool request and response types.
//!
//! Requests deserialize into strongly typed structs and are validated here,
//! before the service touches the embedder or the vector store.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::chunk::ChunkInput;
use crate::error::{ValidationError, ValidationResult};
use crate::level::Level;

pub const MIN_MAX_TOKENS: i64 = 50;
pub const MAX_MAX_TOKENS: i64 = 4096;
pub const MIN_K: i64 = 1;
pub const MAX_K: i64 = 100;

fn default_repo_root() -> String {
    ".".to_string()
}

/// Parameters of `store_memory`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoreMemoryRequest {
    /// SHA or unique ID of the commit being indexed.
    pub commit_id: String,
    #[serde(default)]
    pub chunks: Vec<ChunkInput>,
    #[serde(default = "default_repo_root")]
    pub repo_root: String,
}

impl StoreMemoryRequest {
    pub fn validate(&self) -> ValidationResult<()> {
        if self.commit_id.trim().is_empty() {
            return Err(ValidationError::Empty("commit_id"));
        }
        Ok(())
    }
}

/// Parameters of `query_memory`, as received.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct QueryMemoryRequest {
    pub prompt: String,
    #[serde(default)]
    pub max_tokens: Option<i64>,
    #[serde(default)]
    pub context_levels: Option<Vec<Level>>,
    /// Exact-match payload filter, e.g. `{"repo_path": "/a/b.py"}`.
    #[serde(default)]
    pub filter: Option<BTreeMap<String, Value>>,
    #[serde(default)]
    pub k: Option<i64>,
}

/// A scalar a payload field must equal.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FilterValue {
    Keyword(String),
    Integer(i64),
    Bool(bool),
}

/// A validated query with defaults applied.
#[derive(Debug, Clone, PartialEq)]
pub struct ResolvedQuery {
    pub prompt: String,
    pub max_tokens: usize,
    /// Never empty.
    pub levels: Vec<Level>,
    pub filter: BTreeMap<String, FilterValue>,
    pub k: usize,
}

impl QueryMemoryRequest {
    /// Validate the request and fill in defaults.
    pub fn resolve(
        self,
        default_max_tokens: usize,
        default_k: usize,
    ) -> ValidationResult<ResolvedQuery> {
        if self.prompt.trim().is_empty() {
            return Err(ValidationError::Empty("prompt"));
        }

        let max_tokens = check_range(
            "max_tokens",
            self.max_tokens.unwrap_or(default_max_tokens as i64),
            MIN_MAX_TOKENS,
            MAX_MAX_TOKENS,
        )?;
        let k = check_range("k", self.k.unwrap_or(default_k as i64), MIN_K, MAX_K)?;

        let levels = match self.context_levels {
            Some(levels) if !levels.is_empty() => levels,
            _ => Level::all().to_vec(),
        };

        let filter = self
            .filter
            .unwrap_or_default()
            .into_iter()
            .map(|(key, value)| parse_filter_value(&key, value).map(|v| (key, v)))
            .collect::<ValidationResult<_>>()?;

        Ok(ResolvedQuery {
            prompt: self.prompt,
            max_tokens: max_tokens as usize,
            levels,
            filter,
            k: k as usize,
        })
    }
}

fn check_range(field: &'static str, value: i64, min: i64, max: i64) -> ValidationResult<i64> {
    if (min..=max).contains(&value) {
        Ok(value)
    } else {
        Err(ValidationError::OutOfRange {
            field,
            value,
            min,
            max,
        })
    }
}

fn parse_filter_value(key: &str, value: Value) -> ValidationResult<FilterValue> {
    if key.is_empty() {
        return Err(ValidationError::InvalidFilter("empty field name".into()));
    }
    match value {
        Value::String(s) => Ok(FilterValue::Keyword(s)),
        Value::Bool(b) => Ok(FilterValue::Bool(b)),
        Value::Number(n) => n.as_i64().map(FilterValue::Integer).ok_or_else(|| {
            ValidationError::InvalidFilter(format!("{key}: only integer numbers can be matched"))
        }),
        other => Err(ValidationError::InvalidFilter(format!(
            "{key}: expected a string, integer or boolean, got {other}"
        ))),
    }
}

/// Response of `store_memory`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StoreMemoryResponse {
    pub indexed: usize,
    pub removed: usize,
    pub duration_ms: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl StoreMemoryResponse {
    pub fn completed(indexed: usize, duration_ms: u64) -> Self {
        Self {
            indexed,
            removed: 0,
            duration_ms,
            error: None,
        }
    }

    /// Zero-effect response carrying an error message.
    pub fn failed(message: impl Into<String>) -> Self {
        Self {
            indexed: 0,
            removed: 0,
            duration_ms: 0,
            error: Some(message.into()),
        }
    }

    pub fn is_error(&self) -> bool {
        self.error.is_some()
    }
}

/// One packed result item.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PackedChunk {
    pub repo_path: String,
    pub level: Level,
    pub context: String,
    pub score: f64,
}

/// Response of `query_memory`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct QueryMemoryResponse {
    pub chunks: Vec<PackedChunk>,
    pub truncated: bool,
    pub tokens: usize,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl QueryMemoryResponse {
    /// Empty response carrying an error message.
    pub fn failed(message: impl Into<String>) -> Self {
        Self {
            error: Some(message.into()),
            ..Default::default()
        }
    }

    pub fn is_error(&self) -> bool {
        self.error.is_some()
    }
}
