//! Memory Service.
//!
//! Orchestrates the two tools:
//! - `store_memory`: embed each chunk, assign it to a cluster, write the
//!   touched clusters, then the chunks
//! - `query_memory`: embed the prompt, retrieve from the nearest clusters,
//!   rank and pack into the token budget
//!
//! Cluster read-modify-write is serialized per level inside this process.
//! Failures never escape as errors: both tools return their normal response
//! shape with an `error` message and zeroed fields.

use std::collections::BTreeSet;
use std::sync::Arc;
use std::time::{Duration, Instant};

use strata_embeddings::Embedder;
use strata_models::{
    ChunkRecord, Level, QueryMemoryRequest, QueryMemoryResponse, StoreMemoryRequest,
    StoreMemoryResponse,
};
use strata_qdrant::VectorStore;
use tokio::sync::{Mutex, MutexGuard};
use tracing::{debug, info, warn};

use super::cluster::{assign, new_cluster_id, BatchAssigner, CLUSTER_SEARCH_LIMIT};
use super::collections::MemoryCollections;
use super::packing::pack;
use super::retrieval::retrieve;
use crate::config::MemoryConfig;
use crate::Result;

/// Service for storing and querying hierarchical memories.
#[derive(Clone)]
pub struct MemoryService {
    inner: Arc<MemoryServiceInner>,
}

struct MemoryServiceInner {
    collections: MemoryCollections,
    embedder: Arc<dyn Embedder>,
    config: MemoryConfig,
    /// One lock per level, indexed by `Level::index`.
    level_locks: [Mutex<()>; Level::COUNT],
}

impl MemoryService {
    pub fn new(
        store: Arc<dyn VectorStore>,
        embedder: Arc<dyn Embedder>,
        clusters_collection: String,
        chunks_collection: String,
        config: MemoryConfig,
    ) -> Self {
        let collections = MemoryCollections::new(
            store,
            clusters_collection,
            chunks_collection,
            embedder.dimension(),
            config.operation_timeout,
        );

        Self {
            inner: Arc::new(MemoryServiceInner {
                collections,
                embedder,
                config,
                level_locks: std::array::from_fn(|_| Mutex::new(())),
            }),
        }
    }

    pub fn embedder(&self) -> &dyn Embedder {
        self.inner.embedder.as_ref()
    }

    pub fn collections(&self) -> &MemoryCollections {
        &self.inner.collections
    }

    /// Create the collections if needed. Also done lazily by both tools.
    pub async fn ensure_collections(&self) -> Result<()> {
        self.inner.collections.ensure().await
    }

    // =========================================================================
    // store_memory
    // =========================================================================

    /// Store a batch of chunks.
    pub async fn store_memory(&self, request: StoreMemoryRequest) -> StoreMemoryResponse {
        let start = Instant::now();

        match self.try_store(&request).await {
            Ok(indexed) => {
                let duration_ms = start.elapsed().as_millis() as u64;
                info!(
                    commit_id = %request.commit_id,
                    indexed,
                    duration_ms,
                    "Stored memory chunks"
                );
                StoreMemoryResponse::completed(indexed, duration_ms)
            }
            Err(e) => {
                warn!(commit_id = %request.commit_id, error = %e, "store_memory failed");
                StoreMemoryResponse::failed(e.to_string())
            }
        }
    }

    async fn try_store(&self, request: &StoreMemoryRequest) -> Result<usize> {
        request.validate()?;

        if request.chunks.is_empty() {
            return Ok(0);
        }

        self.ensure_collections().await?;

        // Embedding is the slow part and touches no shared state.
        let mut vectors = Vec::with_capacity(request.chunks.len());
        for chunk in &request.chunks {
            vectors.push(self.embed(&chunk.context).await);
        }

        let levels: BTreeSet<Level> = request.chunks.iter().map(|c| c.level).collect();
        let _guards = self.lock_levels(&levels).await;

        let mut batch = BatchAssigner::new();
        let mut records = Vec::with_capacity(request.chunks.len());

        for (chunk, vector) in request.chunks.iter().zip(vectors) {
            // A zero vector is similar to nothing; skip the search.
            let hits = if is_zero(&vector) {
                Vec::new()
            } else {
                self.inner
                    .collections
                    .search_clusters(&vector, chunk.level, CLUSTER_SEARCH_LIMIT)
                    .await?
            };

            let candidates = batch.candidates(chunk.level, &vector, hits);
            let assignment = assign(&vector, chunk.level, &candidates, new_cluster_id);
            debug!(
                repo_path = %chunk.repo_path,
                level = %chunk.level,
                cluster_id = assignment.cluster.id,
                is_new = assignment.is_new,
                member_count = assignment.cluster.member_count,
                "Assigned chunk to cluster"
            );

            records.push((
                ChunkRecord::new(chunk, assignment.cluster.id, &request.commit_id),
                vector,
            ));
            batch.record(&assignment);
        }

        let indexed = records.len();

        // Clusters first, so no chunk ever references a missing cluster.
        self.inner
            .collections
            .upsert_clusters(batch.into_clusters())
            .await?;
        self.inner.collections.upsert_chunks(records).await?;

        Ok(indexed)
    }

    /// Lock every level in `levels`, in ascending order.
    async fn lock_levels(&self, levels: &BTreeSet<Level>) -> Vec<MutexGuard<'_, ()>> {
        let mut guards = Vec::with_capacity(levels.len());
        for level in levels {
            guards.push(self.inner.level_locks[level.index()].lock().await);
        }
        guards
    }

    // =========================================================================
    // query_memory
    // =========================================================================

    /// Retrieve and pack memories relevant to a prompt.
    pub async fn query_memory(&self, request: QueryMemoryRequest) -> QueryMemoryResponse {
        match self.try_query(request).await {
            Ok(response) => response,
            Err(e) => {
                warn!(error = %e, "query_memory failed");
                QueryMemoryResponse::failed(e.to_string())
            }
        }
    }

    async fn try_query(&self, request: QueryMemoryRequest) -> Result<QueryMemoryResponse> {
        let config = &self.inner.config;
        let query = request.resolve(config.default_max_tokens, config.default_k)?;

        self.ensure_collections().await?;

        let vector = self.embed(&query.prompt).await;
        if is_zero(&vector) {
            warn!("Prompt could not be embedded, returning no memories");
            return Ok(QueryMemoryResponse::default());
        }

        let candidates = retrieve(
            &self.inner.collections,
            &vector,
            &query.levels,
            query.k,
            &query.filter,
        )
        .await?;
        let found = candidates.len();

        let packed = pack(candidates, query.max_tokens);
        info!(
            level = %query.levels[0],
            candidates = found,
            returned = packed.chunks.len(),
            tokens = packed.tokens,
            truncated = packed.truncated,
            "Queried memory"
        );

        Ok(QueryMemoryResponse {
            chunks: packed.chunks,
            truncated: packed.truncated,
            tokens: packed.tokens,
            error: None,
        })
    }

    /// Embed under the operation timeout; a timeout yields a zero vector.
    async fn embed(&self, text: &str) -> Vec<f32> {
        let timeout: Duration = self.inner.config.operation_timeout;
        match tokio::time::timeout(timeout, self.inner.embedder.embed(text)).await {
            Ok(vector) => vector,
            Err(_) => {
                warn!(
                    timeout_ms = timeout.as_millis() as u64,
                    "Embedding timed out, using zero vector"
                );
                vec![0.0; self.inner.embedder.dimension()]
            }
        }
    }
}

fn is_zero(vector: &[f32]) -> bool {
    vector.iter().all(|x| *x == 0.0)
}
