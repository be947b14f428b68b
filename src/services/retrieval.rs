//! Two-stage retrieval: nearest clusters first, then their chunks.

use std::collections::{BTreeMap, HashSet};

use strata_models::payload::{self, KEY_CLUSTER_ID, KEY_IMPORTANCE, KEY_LEVEL};
use strata_models::{ChunkRecord, FilterValue, Level};
use strata_qdrant::{FieldMatch, SearchFilter};
use tracing::{debug, warn};

use super::collections::MemoryCollections;
use crate::Result;

/// Clusters searched per query.
pub const CLUSTER_QUERY_LIMIT: usize = 10;

/// A chunk found by retrieval, with what ranking needs to know about it.
#[derive(Debug, Clone, PartialEq)]
pub struct Candidate {
    pub chunk: ChunkRecord,
    /// Chunk importance if the chunk carries one, else its cluster's.
    pub importance: f64,
}

impl Candidate {
    pub fn rank_score(&self) -> f64 {
        self.chunk.access_count as f64 + self.importance
    }
}

/// Find candidate chunks for `vector`.
///
/// Only the first of `levels` is searched. Each returned cluster
/// contributes at most `k` chunks; lists are concatenated in cluster order.
/// Any store failure aborts the whole retrieval.
pub async fn retrieve(
    collections: &MemoryCollections,
    vector: &[f32],
    levels: &[Level],
    k: usize,
    filter: &BTreeMap<String, FilterValue>,
) -> Result<Vec<Candidate>> {
    let Some(&level) = levels.first() else {
        return Ok(Vec::new());
    };

    let clusters = collections
        .search_clusters(vector, level, CLUSTER_QUERY_LIMIT)
        .await?;
    debug!(level = %level, clusters = clusters.len(), "Matched clusters");

    let mut seen = HashSet::new();
    let mut candidates = Vec::new();

    for found in clusters {
        let cluster = found.cluster;
        let chunk_filter = chunk_filter(cluster.id, level, filter);
        let records = collections.scan_chunks(&chunk_filter, k).await?;

        for record in records {
            if !seen.insert(record.id) {
                continue;
            }
            let Some(chunk) = ChunkRecord::from_payload(record.id, &record.payload) else {
                warn!(chunk_id = record.id, "Skipping chunk with unreadable payload");
                continue;
            };
            let importance =
                payload::get_f64(&record.payload, KEY_IMPORTANCE).unwrap_or(cluster.importance);
            candidates.push(Candidate { chunk, importance });
        }
    }

    Ok(candidates)
}

/// `cluster_id == id AND level == level`, plus the caller's conditions.
fn chunk_filter(
    cluster_id: u64,
    level: Level,
    extra: &BTreeMap<String, FilterValue>,
) -> SearchFilter {
    let base = SearchFilter::new()
        .with_integer(KEY_CLUSTER_ID, cluster_id as i64)
        .with_keyword(KEY_LEVEL, level.as_str());

    extra.iter().fold(base, |filter, (key, value)| {
        let field = match value {
            FilterValue::Keyword(s) => FieldMatch::Keyword(s.clone()),
            FilterValue::Integer(i) => FieldMatch::Integer(*i),
            FilterValue::Bool(b) => FieldMatch::Bool(*b),
        };
        filter.with(key, field)
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::time::Duration;
    use strata_models::{ChunkInput, ClusterRecord};
    use strata_qdrant::InMemoryStore;

    fn cluster(
        id: u64,
        level: Level,
        centroid: Vec<f32>,
        member_count: u64,
        importance: f64,
    ) -> ClusterRecord {
        ClusterRecord {
            id,
            level,
            centroid,
            member_count,
            importance,
        }
    }

    async fn seeded() -> MemoryCollections {
        let collections = MemoryCollections::new(
            Arc::new(InMemoryStore::new()),
            "r_clusters".into(),
            "r_chunks".into(),
            2,
            Duration::from_secs(5),
        );
        collections.ensure().await.unwrap();

        collections
            .upsert_clusters(vec![
                cluster(1, Level::File, vec![1.0, 0.0], 2, 1.5),
                cluster(2, Level::File, vec![0.6, 0.8], 1, 1.0),
                cluster(3, Level::Module, vec![1.0, 0.0], 1, 1.0),
            ])
            .await
            .unwrap();

        let chunk = |path: &str, level: Level, cluster: u64| {
            let input = ChunkInput {
                level,
                repo_path: path.to_string(),
                context: format!("context of {}", path),
                score: None,
            };
            (ChunkRecord::new(&input, cluster, "c1"), vec![1.0, 0.0])
        };

        collections
            .upsert_chunks(vec![
                chunk("/a.py", Level::File, 1),
                chunk("/b.py", Level::File, 1),
                chunk("/c.py", Level::File, 2),
                chunk("/m", Level::Module, 3),
            ])
            .await
            .unwrap();

        collections
    }

    #[tokio::test]
    async fn test_retrieves_chunks_in_cluster_order() {
        let collections = seeded().await;
        let candidates = retrieve(&collections, &[1.0, 0.0], &[Level::File], 24, &BTreeMap::new())
            .await
            .unwrap();

        let paths: Vec<&str> = candidates.iter().map(|c| c.chunk.repo_path.as_str()).collect();
        assert_eq!(paths.len(), 3);
        assert_eq!(paths[2], "/c.py");
        assert_eq!(candidates[0].importance, 1.5);
        assert_eq!(candidates[2].importance, 1.0);
    }

    #[tokio::test]
    async fn test_only_first_level_is_searched() {
        let collections = seeded().await;
        let candidates = retrieve(
            &collections,
            &[1.0, 0.0],
            &[Level::Module, Level::File],
            24,
            &BTreeMap::new(),
        )
        .await
        .unwrap();

        assert_eq!(candidates.len(), 1);
        assert_eq!(candidates[0].chunk.repo_path, "/m");
    }

    #[tokio::test]
    async fn test_k_limits_chunks_per_cluster() {
        let collections = seeded().await;
        let candidates = retrieve(&collections, &[1.0, 0.0], &[Level::File], 1, &BTreeMap::new())
            .await
            .unwrap();

        // One from each of the two file clusters.
        assert_eq!(candidates.len(), 2);
    }

    #[tokio::test]
    async fn test_payload_filter_narrows_results() {
        let collections = seeded().await;
        let mut filter = BTreeMap::new();
        filter.insert("repo_path".to_string(), FilterValue::Keyword("/b.py".into()));

        let candidates = retrieve(&collections, &[1.0, 0.0], &[Level::File], 24, &filter)
            .await
            .unwrap();

        assert_eq!(candidates.len(), 1);
        assert_eq!(candidates[0].chunk.repo_path, "/b.py");
    }

    #[tokio::test]
    async fn test_no_clusters_at_level() {
        let collections = seeded().await;
        let candidates = retrieve(
            &collections,
            &[1.0, 0.0],
            &[Level::FunctionSignature],
            24,
            &BTreeMap::new(),
        )
        .await
        .unwrap();
        assert!(candidates.is_empty());
    }

    #[test]
    fn test_rank_score_adds_access_count() {
        let input = ChunkInput {
            level: Level::File,
            repo_path: "/a.py".into(),
            context: "x".into(),
            score: None,
        };
        let mut chunk = ChunkRecord::new(&input, 1, "c1");
        chunk.access_count = 2;
        let candidate = Candidate { chunk, importance: 1.5 };
        assert_eq!(candidate.rank_score(), 3.5);
    }
}
