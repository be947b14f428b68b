//! Qdrant-backed vector store.
//!
//! Provides collection management, upsert, search, and scroll over the
//! Qdrant gRPC API. Point ids are unsigned integers; payloads are converted
//! between JSON and Qdrant values at this boundary.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use qdrant_client::qdrant::{
    point_id::PointIdOptions, CreateCollectionBuilder, Distance, PointId, PointStruct,
    ScrollPointsBuilder, SearchPointsBuilder, UpsertPointsBuilder, Value as QdrantValue,
    VectorParamsBuilder,
};
use qdrant_client::Qdrant;
use serde_json::Value;
use tracing::{debug, info, warn};

use crate::{Error, Result, ScoredRecord, SearchFilter, VectorPoint, VectorStore};

/// Configuration for the Qdrant service.
#[derive(Debug, Clone)]
pub struct QdrantConfig {
    pub url: String,
}

impl QdrantConfig {
    /// Create a new Qdrant configuration.
    pub fn new(url: impl Into<String>) -> Self {
        Self { url: url.into() }
    }
}

/// Service for vector storage using Qdrant.
#[derive(Clone)]
pub struct QdrantService {
    inner: Arc<QdrantServiceInner>,
}

struct QdrantServiceInner {
    client: Qdrant,
}

impl QdrantService {
    /// Create a new Qdrant service and verify the connection.
    pub async fn new(config: &QdrantConfig) -> Result<Self> {
        let client = Qdrant::from_url(&config.url)
            .build()
            .map_err(|e| Error::VectorStore(format!("Failed to connect to Qdrant: {}", e)))?;

        // Test connection
        client
            .list_collections()
            .await
            .map_err(|e| Error::VectorStore(format!("Qdrant connection test failed: {}", e)))?;

        info!(url = %config.url, "Qdrant service connected");

        Ok(Self {
            inner: Arc::new(QdrantServiceInner { client }),
        })
    }
}

#[async_trait]
impl VectorStore for QdrantService {
    fn backend(&self) -> &'static str {
        "qdrant"
    }

    async fn collection_exists(&self, collection: &str) -> Result<bool> {
        self.inner
            .client
            .collection_exists(collection)
            .await
            .map_err(|e| Error::VectorStore(format!("Failed to check collection: {}", e)))
    }

    async fn collection_dimension(&self, collection: &str) -> Result<Option<usize>> {
        if !self.collection_exists(collection).await? {
            return Ok(None);
        }

        let info = self
            .inner
            .client
            .collection_info(collection)
            .await
            .map_err(|e| Error::VectorStore(format!("Failed to get collection info: {}", e)))?;

        // Extract vector dimension from collection config
        let dimension = info
            .result
            .as_ref()
            .and_then(|r| r.config.as_ref())
            .and_then(|c| c.params.as_ref())
            .and_then(|p| p.vectors_config.as_ref())
            .and_then(|vc| match vc.config.as_ref() {
                Some(qdrant_client::qdrant::vectors_config::Config::Params(params)) => {
                    Some(params.size as usize)
                }
                _ => None,
            })
            .unwrap_or(0);

        Ok(Some(dimension))
    }

    async fn create_collection(&self, collection: &str, dimension: usize) -> Result<()> {
        self.inner
            .client
            .create_collection(
                CreateCollectionBuilder::new(collection)
                    .vectors_config(VectorParamsBuilder::new(dimension as u64, Distance::Cosine)),
            )
            .await
            .map_err(|e| Error::VectorStore(format!("Failed to create collection: {}", e)))?;

        info!(collection = %collection, dimension, "Created Qdrant collection");

        Ok(())
    }

    async fn upsert(&self, collection: &str, points: Vec<VectorPoint>) -> Result<()> {
        if points.is_empty() {
            return Ok(());
        }

        let qdrant_points: Vec<PointStruct> = points
            .into_iter()
            .map(|point| {
                let qdrant_payload: HashMap<String, QdrantValue> = point
                    .payload
                    .into_iter()
                    .filter_map(|(k, v)| json_to_qdrant_value(v).map(|qv| (k, qv)))
                    .collect();

                PointStruct::new(point.id, point.vector, qdrant_payload)
            })
            .collect();

        let count = qdrant_points.len();

        // Wait for the write to be applied so cluster points are visible
        // before dependent chunk points are written.
        self.inner
            .client
            .upsert_points(UpsertPointsBuilder::new(collection, qdrant_points).wait(true))
            .await
            .map_err(|e| Error::VectorStore(format!("Failed to upsert points: {}", e)))?;

        debug!(collection = %collection, count, "Upserted points");

        Ok(())
    }

    async fn search(
        &self,
        collection: &str,
        vector: &[f32],
        limit: usize,
        filter: Option<&SearchFilter>,
    ) -> Result<Vec<ScoredRecord>> {
        let mut builder =
            SearchPointsBuilder::new(collection, vector.to_vec(), limit as u64).with_payload(true);

        if let Some(f) = filter {
            builder = builder.filter(f.to_qdrant_filter());
        }

        let response = self
            .inner
            .client
            .search_points(builder)
            .await
            .map_err(|e| Error::VectorStore(format!("Search failed: {}", e)))?;

        Ok(response
            .result
            .into_iter()
            .filter_map(|point| to_record(point.id, point.score, point.payload))
            .collect())
    }

    async fn scroll(
        &self,
        collection: &str,
        filter: Option<&SearchFilter>,
        limit: usize,
    ) -> Result<Vec<ScoredRecord>> {
        let mut builder = ScrollPointsBuilder::new(collection)
            .limit(limit as u32)
            .with_payload(true);

        if let Some(f) = filter {
            builder = builder.filter(f.to_qdrant_filter());
        }

        let response = self
            .inner
            .client
            .scroll(builder)
            .await
            .map_err(|e| Error::VectorStore(format!("Scroll failed: {}", e)))?;

        Ok(response
            .result
            .into_iter()
            .filter_map(|point| to_record(point.id, 1.0, point.payload))
            .collect())
    }
}

/// Convert a returned point; points with non-numeric ids were not written
/// by this service and are skipped.
fn to_record(
    id: Option<PointId>,
    score: f32,
    payload: HashMap<String, QdrantValue>,
) -> Option<ScoredRecord> {
    let id = match id.and_then(|id| id.point_id_options) {
        Some(PointIdOptions::Num(num)) => num,
        other => {
            warn!(id = ?other, "Skipping point with non-numeric id");
            return None;
        }
    };

    let payload = payload
        .into_iter()
        .filter_map(|(k, v)| qdrant_value_to_json(v).map(|jv| (k, jv)))
        .collect();

    Some(ScoredRecord { id, score, payload })
}

/// Convert JSON value to Qdrant value
fn json_to_qdrant_value(value: Value) -> Option<QdrantValue> {
    match value {
        Value::Null => None,
        Value::Bool(b) => Some(QdrantValue::from(b)),
        Value::Number(n) => {
            if let Some(i) = n.as_i64() {
                Some(QdrantValue::from(i))
            } else if let Some(f) = n.as_f64() {
                Some(QdrantValue::from(f))
            } else {
                None
            }
        }
        Value::String(s) => Some(QdrantValue::from(s)),
        Value::Array(arr) => {
            let values: Vec<QdrantValue> =
                arr.into_iter().filter_map(json_to_qdrant_value).collect();
            if values.is_empty() {
                None
            } else {
                Some(QdrantValue::from(values))
            }
        }
        Value::Object(_) => {
            // Qdrant doesn't support nested objects directly, serialize to string
            Some(QdrantValue::from(value.to_string()))
        }
    }
}

/// Convert Qdrant value to JSON value
fn qdrant_value_to_json(value: QdrantValue) -> Option<Value> {
    use qdrant_client::qdrant::value::Kind;

    match value.kind {
        Some(Kind::NullValue(_)) => Some(Value::Null),
        Some(Kind::BoolValue(b)) => Some(Value::Bool(b)),
        Some(Kind::IntegerValue(i)) => Some(Value::Number(i.into())),
        Some(Kind::DoubleValue(d)) => serde_json::Number::from_f64(d).map(Value::Number),
        Some(Kind::StringValue(s)) => Some(Value::String(s)),
        Some(Kind::ListValue(list)) => {
            let values: Vec<Value> = list
                .values
                .into_iter()
                .filter_map(qdrant_value_to_json)
                .collect();
            Some(Value::Array(values))
        }
        Some(Kind::StructValue(obj)) => {
            let map: serde_json::Map<String, Value> = obj
                .fields
                .into_iter()
                .filter_map(|(k, v)| qdrant_value_to_json(v).map(|jv| (k, jv)))
                .collect();
            Some(Value::Object(map))
        }
        None => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_payload_values_survive_conversion() {
        let original = json!({
            "level": "file",
            "member_count": 3,
            "importance": 2.5,
            "centroid": [0.5, -0.25, 1.0],
        });

        let Value::Object(map) = original.clone() else {
            unreachable!()
        };
        let converted: serde_json::Map<String, Value> = map
            .into_iter()
            .filter_map(|(k, v)| {
                json_to_qdrant_value(v)
                    .and_then(qdrant_value_to_json)
                    .map(|v| (k, v))
            })
            .collect();

        assert_eq!(Value::Object(converted), original);
    }

    #[test]
    fn test_float_arrays_stay_floats() {
        let value = json_to_qdrant_value(json!([1.0, 0.0])).and_then(qdrant_value_to_json);
        let values = value.unwrap();
        assert!(values[0].is_f64());
        assert_eq!(values[0].as_f64(), Some(1.0));
    }

    #[test]
    fn test_null_and_empty_arrays_dropped() {
        assert!(json_to_qdrant_value(Value::Null).is_none());
        assert!(json_to_qdrant_value(json!([])).is_none());
    }

    #[test]
    fn test_non_numeric_point_ids_skipped() {
        let uuid = PointId::from("5c56c793-69f3-4fbf-87e6-c4bf54c28c26".to_string());
        assert!(to_record(Some(uuid), 1.0, HashMap::new()).is_none());

        let record = to_record(Some(PointId::from(7u64)), 0.5, HashMap::new()).unwrap();
        assert_eq!(record.id, 7);
    }
}
