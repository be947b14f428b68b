//! Shared fixtures for the integration tests.
//!
//! Everything runs against the in-memory vector store with embedders whose
//! output the tests control, so similarities are exact and repeatable.

#![allow(dead_code)]

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use strata::config::{Config, VectorBackend};
use strata::AppState;
use strata_embeddings::Embedder;
use strata_models::payload::{get_f64, get_u64, KEY_MEMBER_COUNT, KEY_IMPORTANCE};
use strata_models::{ChunkInput, Level, StoreMemoryRequest};
use strata_qdrant::{InMemoryStore, ScoredRecord, SearchFilter, VectorPoint, VectorStore};

pub const CLUSTERS: &str = "test_clusters";
pub const CHUNKS: &str = "test_chunks";

// ============================================================================
// Embedders
// ============================================================================

/// One axis per keyword; text containing none of them embeds to zero.
pub struct KeywordEmbedder {
    keywords: Vec<&'static str>,
}

impl KeywordEmbedder {
    pub fn new() -> Self {
        Self {
            keywords: vec!["add", "http", "parse", "render"],
        }
    }
}

#[async_trait]
impl Embedder for KeywordEmbedder {
    fn dimension(&self) -> usize {
        self.keywords.len()
    }

    fn providers(&self) -> Vec<String> {
        vec!["keyword".into()]
    }

    async fn embed(&self, text: &str) -> Vec<f32> {
        let text = text.to_lowercase();
        self.keywords
            .iter()
            .map(|k| if text.contains(k) { 1.0 } else { 0.0 })
            .collect()
    }
}

/// Exact text to vector lookup, zero for anything unknown.
pub struct MapEmbedder {
    dimension: usize,
    vectors: HashMap<String, Vec<f32>>,
}

impl MapEmbedder {
    pub fn new(dimension: usize) -> Self {
        Self {
            dimension,
            vectors: HashMap::new(),
        }
    }

    pub fn with(mut self, text: &str, vector: Vec<f32>) -> Self {
        assert_eq!(vector.len(), self.dimension);
        self.vectors.insert(text.to_string(), vector);
        self
    }
}

#[async_trait]
impl Embedder for MapEmbedder {
    fn dimension(&self) -> usize {
        self.dimension
    }

    fn providers(&self) -> Vec<String> {
        vec!["map".into()]
    }

    async fn embed(&self, text: &str) -> Vec<f32> {
        self.vectors
            .get(text)
            .cloned()
            .unwrap_or_else(|| vec![0.0; self.dimension])
    }
}

/// Same vector for every text.
pub struct ConstantEmbedder(pub Vec<f32>);

#[async_trait]
impl Embedder for ConstantEmbedder {
    fn dimension(&self) -> usize {
        self.0.len()
    }

    fn providers(&self) -> Vec<String> {
        vec!["constant".into()]
    }

    async fn embed(&self, _text: &str) -> Vec<f32> {
        // Yield so concurrent stores actually interleave.
        tokio::task::yield_now().await;
        self.0.clone()
    }
}

/// Never answers within any reasonable timeout.
pub struct StalledEmbedder {
    pub dimension: usize,
}

#[async_trait]
impl Embedder for StalledEmbedder {
    fn dimension(&self) -> usize {
        self.dimension
    }

    fn providers(&self) -> Vec<String> {
        vec!["stalled".into()]
    }

    async fn embed(&self, _text: &str) -> Vec<f32> {
        tokio::time::sleep(Duration::from_secs(60)).await;
        vec![1.0; self.dimension]
    }
}

// ============================================================================
// Stores
// ============================================================================

/// In-memory store whose searches, scans and upserts can be switched to fail.
pub struct FlakyStore {
    pub inner: InMemoryStore,
    fail_search: AtomicBool,
    fail_upsert: AtomicBool,
    fail_scroll: AtomicBool,
}

impl FlakyStore {
    pub fn new() -> Self {
        Self {
            inner: InMemoryStore::new(),
            fail_search: AtomicBool::new(false),
            fail_upsert: AtomicBool::new(false),
            fail_scroll: AtomicBool::new(false),
        }
    }

    pub fn fail_search(&self, fail: bool) {
        self.fail_search.store(fail, Ordering::SeqCst);
    }

    pub fn fail_upsert(&self, fail: bool) {
        self.fail_upsert.store(fail, Ordering::SeqCst);
    }

    pub fn fail_scroll(&self, fail: bool) {
        self.fail_scroll.store(fail, Ordering::SeqCst);
    }
}

#[async_trait]
impl VectorStore for FlakyStore {
    fn backend(&self) -> &'static str {
        "flaky"
    }

    async fn collection_exists(&self, collection: &str) -> strata_qdrant::Result<bool> {
        self.inner.collection_exists(collection).await
    }

    async fn collection_dimension(&self, collection: &str) -> strata_qdrant::Result<Option<usize>> {
        self.inner.collection_dimension(collection).await
    }

    async fn create_collection(
        &self,
        collection: &str,
        dimension: usize,
    ) -> strata_qdrant::Result<()> {
        self.inner.create_collection(collection, dimension).await
    }

    async fn upsert(
        &self,
        collection: &str,
        points: Vec<VectorPoint>,
    ) -> strata_qdrant::Result<()> {
        if self.fail_upsert.load(Ordering::SeqCst) {
            return Err(strata_qdrant::Error::VectorStore("upsert refused".into()));
        }
        self.inner.upsert(collection, points).await
    }

    async fn search(
        &self,
        collection: &str,
        vector: &[f32],
        limit: usize,
        filter: Option<&SearchFilter>,
    ) -> strata_qdrant::Result<Vec<ScoredRecord>> {
        if self.fail_search.load(Ordering::SeqCst) {
            return Err(strata_qdrant::Error::VectorStore("connection reset".into()));
        }
        self.inner.search(collection, vector, limit, filter).await
    }

    async fn scroll(
        &self,
        collection: &str,
        filter: Option<&SearchFilter>,
        limit: usize,
    ) -> strata_qdrant::Result<Vec<ScoredRecord>> {
        if self.fail_scroll.load(Ordering::SeqCst) {
            return Err(strata_qdrant::Error::VectorStore("scroll aborted".into()));
        }
        self.inner.scroll(collection, filter, limit).await
    }
}

// ============================================================================
// State builders
// ============================================================================

pub fn test_config() -> Config {
    let mut config = Config::default();
    config.store.backend = VectorBackend::Memory;
    config.store.collection_prefix = "test_".into();
    config.memory.operation_timeout = Duration::from_secs(5);
    config
}

pub fn test_state(store: Arc<dyn VectorStore>, embedder: Arc<dyn Embedder>) -> AppState {
    AppState::from_parts(test_config(), store, embedder)
}

pub fn chunk(level: Level, repo_path: &str, context: &str) -> ChunkInput {
    ChunkInput {
        level,
        repo_path: repo_path.into(),
        context: context.into(),
        score: None,
    }
}

pub fn store_request(commit_id: &str, chunks: Vec<ChunkInput>) -> StoreMemoryRequest {
    StoreMemoryRequest {
        commit_id: commit_id.into(),
        chunks,
        repo_root: ".".into(),
    }
}

/// All points of a collection, or none if it was never created.
pub async fn points(store: &dyn VectorStore, collection: &str) -> Vec<ScoredRecord> {
    match store.collection_exists(collection).await {
        Ok(true) => store.scroll(collection, None, 10_000).await.unwrap(),
        _ => Vec::new(),
    }
}

pub fn member_count(record: &ScoredRecord) -> u64 {
    get_u64(&record.payload, KEY_MEMBER_COUNT).unwrap()
}

pub fn importance(record: &ScoredRecord) -> f64 {
    get_f64(&record.payload, KEY_IMPORTANCE).unwrap()
}
