//! In-process vector store.
//!
//! Keeps every collection in a map and answers searches by scoring all
//! matching points. Vectors are stored as given (not normalized), which is
//! harmless for cosine scoring.

use std::collections::{BTreeMap, HashMap};

use async_trait::async_trait;
use serde_json::Value;
use tokio::sync::RwLock;
use tracing::{debug, info};

use crate::{cosine_similarity, Error, Result, ScoredRecord, SearchFilter, VectorPoint, VectorStore};

struct Collection {
    dimension: usize,
    points: BTreeMap<u64, (Vec<f32>, HashMap<String, Value>)>,
}

/// Brute-force cosine store held in memory.
#[derive(Default)]
pub struct InMemoryStore {
    collections: RwLock<HashMap<String, Collection>>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of points in a collection (0 if it does not exist).
    pub async fn len(&self, collection: &str) -> usize {
        self.collections
            .read()
            .await
            .get(collection)
            .map(|c| c.points.len())
            .unwrap_or(0)
    }

    pub async fn is_empty(&self, collection: &str) -> bool {
        self.len(collection).await == 0
    }
}

#[async_trait]
impl VectorStore for InMemoryStore {
    fn backend(&self) -> &'static str {
        "memory"
    }

    async fn collection_exists(&self, collection: &str) -> Result<bool> {
        Ok(self.collections.read().await.contains_key(collection))
    }

    async fn collection_dimension(&self, collection: &str) -> Result<Option<usize>> {
        Ok(self
            .collections
            .read()
            .await
            .get(collection)
            .map(|c| c.dimension))
    }

    async fn create_collection(&self, collection: &str, dimension: usize) -> Result<()> {
        let mut collections = self.collections.write().await;
        if collections.contains_key(collection) {
            return Err(Error::VectorStore(format!(
                "Collection already exists: {}",
                collection
            )));
        }

        collections.insert(
            collection.to_string(),
            Collection {
                dimension,
                points: BTreeMap::new(),
            },
        );

        info!(collection = %collection, dimension, "Created in-memory collection");
        Ok(())
    }

    async fn upsert(&self, collection: &str, points: Vec<VectorPoint>) -> Result<()> {
        if points.is_empty() {
            return Ok(());
        }

        let mut collections = self.collections.write().await;
        let target = collections
            .get_mut(collection)
            .ok_or_else(|| Error::CollectionNotFound(collection.to_string()))?;

        // Validate the whole batch before touching the collection.
        if let Some(bad) = points.iter().find(|p| p.vector.len() != target.dimension) {
            return Err(Error::DimensionMismatch {
                collection: collection.to_string(),
                expected: target.dimension,
                actual: bad.vector.len(),
            });
        }

        let count = points.len();
        for point in points {
            target.points.insert(point.id, (point.vector, point.payload));
        }

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
        let collections = self.collections.read().await;
        let target = collections
            .get(collection)
            .ok_or_else(|| Error::CollectionNotFound(collection.to_string()))?;

        let mut results: Vec<ScoredRecord> = target
            .points
            .iter()
            .filter(|(_, (_, payload))| filter.map(|f| f.matches(payload)).unwrap_or(true))
            .map(|(id, (stored, payload))| ScoredRecord {
                id: *id,
                score: cosine_similarity(vector, stored),
                payload: payload.clone(),
            })
            .collect();

        // Points iterate in id order and the sort is stable, so ties stay id-ordered.
        results.sort_by(|a, b| b.score.total_cmp(&a.score));
        results.truncate(limit);

        Ok(results)
    }

    async fn scroll(
        &self,
        collection: &str,
        filter: Option<&SearchFilter>,
        limit: usize,
    ) -> Result<Vec<ScoredRecord>> {
        let collections = self.collections.read().await;
        let target = collections
            .get(collection)
            .ok_or_else(|| Error::CollectionNotFound(collection.to_string()))?;

        Ok(target
            .points
            .iter()
            .filter(|(_, (_, payload))| filter.map(|f| f.matches(payload)).unwrap_or(true))
            .take(limit)
            .map(|(id, (_, payload))| ScoredRecord {
                id: *id,
                score: 1.0,
                payload: payload.clone(),
            })
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn point(id: u64, vector: Vec<f32>, level: &str) -> VectorPoint {
        let mut payload = HashMap::new();
        payload.insert("level".to_string(), json!(level));
        VectorPoint { id, vector, payload }
    }

    async fn store_with(points: Vec<VectorPoint>) -> InMemoryStore {
        let store = InMemoryStore::new();
        store.create_collection("test", 2).await.unwrap();
        store.upsert("test", points).await.unwrap();
        store
    }

    #[tokio::test]
    async fn test_search_orders_by_similarity_and_filters() {
        let store = store_with(vec![
            point(1, vec![0.0, 1.0], "file"),
            point(2, vec![1.0, 0.1], "file"),
            point(3, vec![1.0, 0.0], "module"),
        ])
        .await;

        let filter = SearchFilter::new().with_keyword("level", "file");
        let results = store.search("test", &[1.0, 0.0], 10, Some(&filter)).await.unwrap();

        let ids: Vec<u64> = results.iter().map(|r| r.id).collect();
        assert_eq!(ids, vec![2, 1]);
        assert!(results[0].score > results[1].score);
    }

    #[tokio::test]
    async fn test_search_respects_limit() {
        let points = (1..=5).map(|i| point(i, vec![1.0, i as f32], "file")).collect();
        let store = store_with(points).await;
        let results = store.search("test", &[1.0, 0.0], 3, None).await.unwrap();
        assert_eq!(results.len(), 3);
    }

    #[tokio::test]
    async fn test_upsert_replaces_by_id() {
        let store = store_with(vec![point(1, vec![1.0, 0.0], "file")]).await;
        store
            .upsert("test", vec![point(1, vec![0.0, 1.0], "module")])
            .await
            .unwrap();

        assert_eq!(store.len("test").await, 1);
        let results = store.scroll("test", None, 10).await.unwrap();
        assert_eq!(results[0].payload["level"], json!("module"));
    }

    #[tokio::test]
    async fn test_upsert_rejects_wrong_dimension_atomically() {
        let store = store_with(vec![]).await;
        let err = store
            .upsert(
                "test",
                vec![point(1, vec![1.0, 0.0], "file"), point(2, vec![1.0], "file")],
            )
            .await
            .unwrap_err();

        assert!(matches!(err, Error::DimensionMismatch { expected: 2, actual: 1, .. }));
        assert!(store.is_empty("test").await);
    }

    #[tokio::test]
    async fn test_scroll_pages_in_id_order() {
        let store = store_with(vec![
            point(9, vec![1.0, 0.0], "file"),
            point(3, vec![1.0, 0.0], "file"),
            point(5, vec![1.0, 0.0], "module"),
        ])
        .await;

        let filter = SearchFilter::new().with_keyword("level", "file");
        let results = store.scroll("test", Some(&filter), 1).await.unwrap();
        assert_eq!(results.len(), 1);
        assert_eq!(results[0].id, 3);
    }

    #[tokio::test]
    async fn test_missing_collection_is_an_error() {
        let store = InMemoryStore::new();
        assert!(!store.collection_exists("nope").await.unwrap());
        assert!(store.search("nope", &[1.0], 1, None).await.is_err());
        assert!(store.scroll("nope", None, 1).await.is_err());
    }
}
