//! Vector storage for Strata.
//!
//! Defines the [`VectorStore`] seam used by the clustering engine and two
//! implementations:
//! - [`QdrantService`]: collections in a Qdrant server (cosine distance)
//! - [`InMemoryStore`]: brute-force cosine search, for tests and local runs

mod filter;
mod memory;
mod qdrant;

use std::collections::HashMap;

use async_trait::async_trait;
use serde_json::Value;

pub use filter::{FieldMatch, SearchFilter};
pub use memory::InMemoryStore;
pub use qdrant::{QdrantConfig, QdrantService};

/// Error types for vector storage.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("Vector store error: {0}")]
    VectorStore(String),

    #[error("Collection not found: {0}")]
    CollectionNotFound(String),

    #[error("Dimension mismatch in {collection}: expected {expected}, got {actual}")]
    DimensionMismatch {
        collection: String,
        expected: usize,
        actual: usize,
    },
}

/// Result type for vector storage.
pub type Result<T> = std::result::Result<T, Error>;

/// A point to upsert.
#[derive(Debug, Clone)]
pub struct VectorPoint {
    pub id: u64,
    pub vector: Vec<f32>,
    pub payload: HashMap<String, Value>,
}

/// A point returned by search or scroll.
///
/// Scroll results carry a score of 1.0.
#[derive(Debug, Clone)]
pub struct ScoredRecord {
    pub id: u64,
    pub score: f32,
    pub payload: HashMap<String, Value>,
}

/// Key-vector-payload store with named collections.
#[async_trait]
pub trait VectorStore: Send + Sync {
    /// Short backend name for status output.
    fn backend(&self) -> &'static str;

    async fn collection_exists(&self, collection: &str) -> Result<bool>;

    /// Vector size of an existing collection, `None` if it does not exist.
    async fn collection_dimension(&self, collection: &str) -> Result<Option<usize>>;

    /// Create a cosine collection.
    async fn create_collection(&self, collection: &str, dimension: usize) -> Result<()>;

    /// Insert or replace points by id.
    async fn upsert(&self, collection: &str, points: Vec<VectorPoint>) -> Result<()>;

    /// Nearest neighbours of `vector`, best first.
    async fn search(
        &self,
        collection: &str,
        vector: &[f32],
        limit: usize,
        filter: Option<&SearchFilter>,
    ) -> Result<Vec<ScoredRecord>>;

    /// First page of points matching `filter`, in id order.
    async fn scroll(
        &self,
        collection: &str,
        filter: Option<&SearchFilter>,
        limit: usize,
    ) -> Result<Vec<ScoredRecord>>;
}

/// Cosine similarity; 0.0 when either vector has zero norm or the
/// lengths differ.
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    if a.len() != b.len() {
        return 0.0;
    }

    let mut dot = 0.0f64;
    let mut norm_a = 0.0f64;
    let mut norm_b = 0.0f64;
    for (x, y) in a.iter().zip(b) {
        let (x, y) = (*x as f64, *y as f64);
        dot += x * y;
        norm_a += x * x;
        norm_b += y * y;
    }

    if norm_a == 0.0 || norm_b == 0.0 {
        return 0.0;
    }

    (dot / (norm_a.sqrt() * norm_b.sqrt())) as f32
}
