//! Application state for Strata.
//!
//! Contains the shared state that is passed to all handlers.

use std::sync::Arc;

use strata_embeddings::{Embedder, EmbeddingService};
use strata_qdrant::{InMemoryStore, QdrantConfig, QdrantService, VectorStore};
use tracing::{info, warn};

use crate::api::status::RequestStats;
use crate::config::{Config, VectorBackend};
use crate::services::MemoryService;
use crate::Result;

/// Application state shared across all handlers.
#[derive(Clone)]
pub struct AppState {
    /// Configuration, loaded once at startup.
    pub config: Arc<Config>,
    /// Store and query operations.
    pub memory: MemoryService,
    /// Request and error counters for `/status`.
    pub stats: Arc<RequestStats>,
}

impl AppState {
    /// Create a new application state, connecting to the configured
    /// collaborators.
    pub async fn new(config: Config) -> Result<Self> {
        let store: Arc<dyn VectorStore> = match config.store.backend {
            VectorBackend::Qdrant => {
                Arc::new(QdrantService::new(&QdrantConfig::new(&config.store.url)).await?)
            }
            VectorBackend::Memory => {
                warn!("Using in-memory vector store; memories are lost on exit");
                Arc::new(InMemoryStore::new())
            }
        };

        let embeddings = EmbeddingService::from_config(&config.embedding)?;
        match embeddings.prepare_ollama().await {
            Ok(missing) if missing.is_empty() => {}
            Ok(missing) => warn!(
                models = ?missing,
                "Embedding models not available in Ollama; run `ollama pull <model>`"
            ),
            Err(e) => warn!(error = %e, "Ollama is not reachable; embeddings will fall back"),
        }

        let state = Self::from_parts(config, store, Arc::new(embeddings));

        // Retried lazily by the first operation if the store is not ready yet.
        if let Err(e) = state.memory.ensure_collections().await {
            warn!(error = %e, "Collections not ready at startup");
        }

        info!(
            backend = state.memory.collections().backend(),
            dimension = state.memory.embedder().dimension(),
            "Application state initialized"
        );

        Ok(state)
    }

    /// Assemble state around existing collaborators.
    pub fn from_parts(
        config: Config,
        store: Arc<dyn VectorStore>,
        embedder: Arc<dyn Embedder>,
    ) -> Self {
        let memory = MemoryService::new(
            store,
            embedder,
            config.store.clusters_collection(),
            config.store.chunks_collection(),
            config.memory.clone(),
        );

        Self {
            config: Arc::new(config),
            memory,
            stats: Arc::new(RequestStats::new()),
        }
    }
}
