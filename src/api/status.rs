//! Status Routes
//!
//! Health checks and status endpoints.
//!
//! Routes:
//! - GET /health - Basic health check
//! - GET /status - Detailed system status

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Instant;

use axum::{extract::State, routing::get, Json, Router};
use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::AppState;

/// Simple counters for tool traffic.
#[derive(Debug)]
pub struct RequestStats {
    started: Instant,
    requests: AtomicU64,
    errors: AtomicU64,
}

impl RequestStats {
    pub fn new() -> Self {
        Self {
            started: Instant::now(),
            requests: AtomicU64::new(0),
            errors: AtomicU64::new(0),
        }
    }

    pub fn record_request(&self) {
        self.requests.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_error(&self) {
        self.errors.fetch_add(1, Ordering::Relaxed);
    }

    pub fn requests(&self) -> u64 {
        self.requests.load(Ordering::Relaxed)
    }

    pub fn errors(&self) -> u64 {
        self.errors.load(Ordering::Relaxed)
    }

    pub fn uptime_seconds(&self) -> u64 {
        self.started.elapsed().as_secs()
    }
}

impl Default for RequestStats {
    fn default() -> Self {
        Self::new()
    }
}

/// Build status routes.
pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/health", get(health_check))
        .route("/status", get(system_status))
}

// ============================================================================
// Response Types
// ============================================================================

/// Health check response.
#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: HealthStatus,
    pub version: String,
    pub timestamp: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum HealthStatus {
    Healthy,
    Degraded,
}

/// System status response.
#[derive(Debug, Serialize)]
pub struct SystemStatusResponse {
    pub status: HealthStatus,
    pub version: String,
    pub uptime_seconds: u64,
    pub store: StoreStatus,
    pub embeddings: EmbeddingStatus,
    pub metrics: SystemMetrics,
}

#[derive(Debug, Serialize)]
pub struct StoreStatus {
    pub backend: String,
    pub ready: bool,
    pub clusters_collection: String,
    pub chunks_collection: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct EmbeddingStatus {
    /// Empty when hash placeholders are in use.
    pub providers: Vec<String>,
    pub dimension: usize,
}

#[derive(Debug, Serialize)]
pub struct SystemMetrics {
    pub total_requests: u64,
    pub total_errors: u64,
}

// ============================================================================
// Handlers
// ============================================================================

/// Basic health check.
///
/// GET /health
async fn health_check() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: HealthStatus::Healthy,
        version: env!("CARGO_PKG_VERSION").to_string(),
        timestamp: Utc::now(),
    })
}

/// Detailed system status.
///
/// GET /status
///
/// Makes sure the collections exist, so a store outage shows up here as
/// `degraded`.
async fn system_status(State(state): State<AppState>) -> Json<SystemStatusResponse> {
    let memory = &state.memory;
    let ready = memory.ensure_collections().await;
    let collections = memory.collections();

    let status = if ready.is_ok() {
        HealthStatus::Healthy
    } else {
        HealthStatus::Degraded
    };

    Json(SystemStatusResponse {
        status,
        version: env!("CARGO_PKG_VERSION").to_string(),
        uptime_seconds: state.stats.uptime_seconds(),
        store: StoreStatus {
            backend: collections.backend().to_string(),
            ready: ready.is_ok(),
            clusters_collection: collections.clusters_name().to_string(),
            chunks_collection: collections.chunks_name().to_string(),
            message: ready.err().map(|e| e.to_string()),
        },
        embeddings: EmbeddingStatus {
            providers: memory.embedder().providers(),
            dimension: memory.embedder().dimension(),
        },
        metrics: SystemMetrics {
            total_requests: state.stats.requests(),
            total_errors: state.stats.errors(),
        },
    })
}
