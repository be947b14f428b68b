//! Text embeddings for Strata.
//!
//! Supports Ollama, OpenAI, and Gemini embedding APIs with fallback between
//! providers. Embedding never fails from the caller's point of view: a text
//! that no provider can embed becomes a zero vector, which scores 0.0 against
//! everything. With no providers configured, deterministic hash-based
//! placeholders are produced instead.
//!
//! # Example
//!
//! ```no_run
//! use strata_embeddings::{Embedder, EmbeddingConfig, EmbeddingProviderConfig, EmbeddingService};
//!
//! # async fn example() -> Result<(), strata_embeddings::Error> {
//! let config = EmbeddingConfig {
//!     providers: vec![EmbeddingProviderConfig {
//!         name: "ollama".to_string(),
//!         base_url: "http://localhost:11434".to_string(),
//!         model: "mxbai-embed-large:latest".to_string(),
//!         api_key: String::new(),
//!         priority: 1,
//!     }],
//!     dimension: 1024,
//!     auto_pull: true,
//! };
//!
//! let service = EmbeddingService::from_config(&config)?;
//! let vector = service.embed("def add(a, b): return a + b").await;
//! assert_eq!(vector.len(), 1024);
//! # Ok(())
//! # }
//! ```

mod service;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

pub use service::EmbeddingService;

// ============================================================================
// Error types
// ============================================================================

/// Errors that can occur in the embedding service.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// Internal error (HTTP client, parsing, etc.)
    #[error("Internal error: {0}")]
    Internal(String),

    /// Provider API error
    #[error("Provider error: {0}")]
    Provider(String),

    /// Provider returned a vector of the wrong size
    #[error("Embedding dimension mismatch: expected {expected}, got {actual}")]
    DimensionMismatch { expected: usize, actual: usize },

    /// All providers failed
    #[error("All embedding providers failed")]
    AllProvidersFailed,
}

/// Result type for embedding operations.
pub type Result<T> = std::result::Result<T, Error>;

// ============================================================================
// Configuration types
// ============================================================================

/// Configuration for the embedding service.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EmbeddingConfig {
    /// Embedding providers; tried in priority order.
    pub providers: Vec<EmbeddingProviderConfig>,
    /// Length of every vector the service returns.
    pub dimension: usize,
    /// Pull configured Ollama models that are missing at startup.
    #[serde(default = "default_auto_pull")]
    pub auto_pull: bool,
}

fn default_auto_pull() -> bool {
    true
}

impl Default for EmbeddingConfig {
    fn default() -> Self {
        Self {
            providers: Vec::new(),
            dimension: default_dimension(&default_model("ollama")),
            auto_pull: true,
        }
    }
}

/// Configuration for a single embedding provider.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EmbeddingProviderConfig {
    /// Provider name ("ollama", "openai" or "gemini").
    pub name: String,
    /// Base URL for the API.
    pub base_url: String,
    /// Model name to use.
    pub model: String,
    /// API key for authentication (empty for Ollama).
    pub api_key: String,
    /// Priority (lower = higher priority).
    pub priority: u8,
}

impl EmbeddingProviderConfig {
    /// A local Ollama provider, tried first.
    pub fn ollama(base_url: &str, model: &str) -> Self {
        Self {
            name: "ollama".to_string(),
            base_url: base_url.trim_end_matches('/').to_string(),
            model: model.to_string(),
            api_key: String::new(),
            priority: 1,
        }
    }

    /// Ollama is local and needs no key; hosted providers do.
    pub fn has_credentials(&self) -> bool {
        self.name == "ollama" || !self.api_key.is_empty()
    }
}

// ============================================================================
// Default values
// ============================================================================

/// Get default endpoint for a provider.
pub fn default_endpoint(name: &str) -> String {
    match name {
        "gemini" => "https://generativelanguage.googleapis.com/v1beta".to_string(),
        "ollama" => "http://localhost:11434".to_string(),
        _ => "https://api.openai.com/v1".to_string(),
    }
}

/// Get default model for a provider.
pub fn default_model(name: &str) -> String {
    match name {
        "gemini" => "text-embedding-004".to_string(),
        "ollama" => "mxbai-embed-large:latest".to_string(),
        _ => "text-embedding-3-small".to_string(),
    }
}

/// Native output dimension of well-known embedding models.
pub fn default_dimension(model: &str) -> usize {
    if model.contains("mxbai-embed-large") || model.contains("bge-large") {
        1024
    } else if model.contains("text-embedding-3-large") {
        3072
    } else if model.contains("text-embedding-3-small") || model.contains("ada-002") {
        1536
    } else if model.contains("all-minilm") || model.contains("MiniLM-L6") {
        384
    } else {
        // text-embedding-004, nomic-embed-text, mpnet and most others
        768
    }
}

// ============================================================================
// Embedder seam
// ============================================================================

/// Maps text to a fixed-length vector.
#[async_trait]
pub trait Embedder: Send + Sync {
    /// Length of every returned vector.
    fn dimension(&self) -> usize;

    /// Names of the configured providers, in the order they are tried.
    fn providers(&self) -> Vec<String>;

    /// Embed one text. Never fails: unembeddable text yields a zero vector
    /// of length [`Embedder::dimension`].
    async fn embed(&self, text: &str) -> Vec<f32>;
}

/// Scale `vector` to unit length in place. Zero vectors are left alone.
pub fn normalize(vector: &mut [f32]) {
    let norm: f32 = vector.iter().map(|x| x * x).sum::<f32>().sqrt();
    if norm > 0.0 {
        for x in vector.iter_mut() {
            *x /= norm;
        }
    }
}

/// Generate a deterministic embedding from text using hashing.
/// This is NOT semantic - just a fallback for development/testing.
pub fn hash_embed(text: &str, dim: usize) -> Vec<f32> {
    use std::collections::hash_map::DefaultHasher;
    use std::hash::{Hash, Hasher};

    let mut embedding: Vec<f32> = (0..dim as u64)
        .map(|i| {
            let mut hasher = DefaultHasher::new();
            text.hash(&mut hasher);
            i.hash(&mut hasher);
            // Map to [-1, 1]
            ((hasher.finish() as f64 / u64::MAX as f64) * 2.0 - 1.0) as f32
        })
        .collect();

    normalize(&mut embedding);
    embedding
}
