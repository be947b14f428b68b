//! Service layer for Strata.
//!
//! Contains the clustering engine and its orchestration:
//! - Cluster (incremental assignment with running-mean centroids)
//! - Retrieval (two-stage cluster-then-chunk search)
//! - Packing (ranking and token-budget packing)
//! - Collections (the cluster and chunk collections in the vector store)
//! - Memory (the `store_memory` and `query_memory` operations)

pub mod cluster;
mod collections;
mod memory;
pub mod packing;
pub mod retrieval;

pub use collections::MemoryCollections;
pub use memory::MemoryService;
