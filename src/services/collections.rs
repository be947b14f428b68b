//! The two collections behind the memory service.
//!
//! Wraps the vector store with the cluster and chunk collection names, the
//! embedding dimension and the per-call timeout, and converts between store
//! points and the record types.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use strata_models::{ChunkRecord, ClusterRecord, Level, StoredCluster};
use strata_qdrant::{ScoredRecord, SearchFilter, VectorPoint, VectorStore};
use tokio::sync::Mutex;
use tracing::{debug, info};

use super::cluster::ClusterCandidate;
use crate::{Error, Result};

pub struct MemoryCollections {
    store: Arc<dyn VectorStore>,
    clusters: String,
    chunks: String,
    dimension: usize,
    timeout: Duration,
    ensured: Mutex<bool>,
}

impl MemoryCollections {
    pub fn new(
        store: Arc<dyn VectorStore>,
        clusters: String,
        chunks: String,
        dimension: usize,
        timeout: Duration,
    ) -> Self {
        Self {
            store,
            clusters,
            chunks,
            dimension,
            timeout,
            ensured: Mutex::new(false),
        }
    }

    pub fn clusters_name(&self) -> &str {
        &self.clusters
    }

    pub fn chunks_name(&self) -> &str {
        &self.chunks
    }

    pub fn backend(&self) -> &'static str {
        self.store.backend()
    }

    /// Create both collections if missing.
    ///
    /// Succeeds at most once per process; a failed attempt is retried by the
    /// next caller. An existing collection of another dimension is an error.
    pub async fn ensure(&self) -> Result<()> {
        let mut ensured = self.ensured.lock().await;
        if *ensured {
            return Ok(());
        }

        for name in [&self.clusters, &self.chunks] {
            let existing = self
                .timed("collection lookup", self.store.collection_dimension(name))
                .await?;

            match existing {
                None => {
                    self.timed(
                        "collection create",
                        self.store.create_collection(name, self.dimension),
                    )
                    .await?;
                }
                Some(dimension) if dimension == self.dimension => {
                    debug!(collection = %name, dimension, "Collection exists");
                }
                Some(dimension) => {
                    return Err(Error::VectorStore(format!(
                        "Collection {} has dimension {}, but the embedder produces {}",
                        name, dimension, self.dimension
                    )));
                }
            }
        }

        info!(
            clusters = %self.clusters,
            chunks = %self.chunks,
            dimension = self.dimension,
            backend = self.store.backend(),
            "Collections ready"
        );
        *ensured = true;
        Ok(())
    }

    /// Nearest clusters at `level`, most similar first.
    pub async fn search_clusters(
        &self,
        vector: &[f32],
        level: Level,
        limit: usize,
    ) -> Result<Vec<ClusterCandidate>> {
        let filter =
            SearchFilter::new().with_keyword(strata_models::payload::KEY_LEVEL, level.as_str());
        let hits = self
            .timed(
                "cluster search",
                self.store.search(&self.clusters, vector, limit, Some(&filter)),
            )
            .await?;

        Ok(hits
            .into_iter()
            .map(|hit| ClusterCandidate {
                cluster: StoredCluster::from_payload(hit.id, &hit.payload),
                similarity: hit.score,
            })
            .collect())
    }

    /// One page of chunks matching `filter`.
    pub async fn scan_chunks(
        &self,
        filter: &SearchFilter,
        limit: usize,
    ) -> Result<Vec<ScoredRecord>> {
        self.timed("chunk scan", self.store.scroll(&self.chunks, Some(filter), limit))
            .await
    }

    /// Write cluster records; the centroid doubles as the point vector.
    pub async fn upsert_clusters(&self, clusters: Vec<ClusterRecord>) -> Result<()> {
        let points = clusters
            .into_iter()
            .map(|cluster| VectorPoint {
                id: cluster.id,
                payload: cluster.to_payload(),
                vector: cluster.centroid,
            })
            .collect();

        self.timed("cluster upsert", self.store.upsert(&self.clusters, points))
            .await
    }

    /// Write chunk records with their own embeddings.
    pub async fn upsert_chunks(&self, chunks: Vec<(ChunkRecord, Vec<f32>)>) -> Result<()> {
        let points = chunks
            .into_iter()
            .map(|(chunk, vector)| VectorPoint {
                id: chunk.id,
                payload: chunk.to_payload(),
                vector,
            })
            .collect();

        self.timed("chunk upsert", self.store.upsert(&self.chunks, points))
            .await
    }

    /// Run a store call under the operation timeout.
    async fn timed<T, F>(&self, operation: &'static str, call: F) -> Result<T>
    where
        F: Future<Output = strata_qdrant::Result<T>>,
    {
        match tokio::time::timeout(self.timeout, call).await {
            Ok(result) => result.map_err(Error::from),
            Err(_) => Err(Error::Timeout {
                operation,
                timeout_ms: self.timeout.as_millis() as u64,
            }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use strata_qdrant::InMemoryStore;

    fn collections(store: Arc<InMemoryStore>, dimension: usize) -> MemoryCollections {
        MemoryCollections::new(
            store,
            "t_clusters".into(),
            "t_chunks".into(),
            dimension,
            Duration::from_secs(5),
        )
    }

    #[tokio::test]
    async fn test_ensure_creates_both_collections_once() {
        let store = Arc::new(InMemoryStore::new());
        let collections = collections(store.clone(), 3);

        collections.ensure().await.unwrap();
        collections.ensure().await.unwrap();

        assert_eq!(store.collection_dimension("t_clusters").await.unwrap(), Some(3));
        assert_eq!(store.collection_dimension("t_chunks").await.unwrap(), Some(3));
    }

    #[tokio::test]
    async fn test_ensure_rejects_dimension_mismatch() {
        let store = Arc::new(InMemoryStore::new());
        store.create_collection("t_clusters", 4).await.unwrap();

        let err = collections(store, 3).ensure().await.unwrap_err();
        assert!(matches!(err, Error::VectorStore(_)));
        assert!(err.to_string().contains("dimension 4"));
    }

    #[tokio::test]
    async fn test_cluster_search_is_level_scoped() {
        let store = Arc::new(InMemoryStore::new());
        let collections = collections(store, 2);
        collections.ensure().await.unwrap();

        collections
            .upsert_clusters(vec![
                ClusterRecord {
                    id: 1,
                    level: Level::File,
                    centroid: vec![1.0, 0.0],
                    member_count: 2,
                    importance: 1.5,
                },
                ClusterRecord {
                    id: 2,
                    level: Level::Module,
                    centroid: vec![1.0, 0.0],
                    member_count: 1,
                    importance: 1.0,
                },
            ])
            .await
            .unwrap();

        let hits = collections.search_clusters(&[1.0, 0.0], Level::File, 5).await.unwrap();
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].cluster.id, 1);
        assert_eq!(hits[0].cluster.member_count, 2);
        assert_eq!(hits[0].cluster.centroid, Some(vec![1.0, 0.0]));
    }
}
