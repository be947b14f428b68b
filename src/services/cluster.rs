//! Incremental cluster assignment.
//!
//! Each stored chunk joins the first nearby cluster at its level whose
//! centroid is at least [`SIMILARITY_THRESHOLD`] similar, or starts a new
//! one. Centroids are running means, updated one member at a time.

use std::collections::HashMap;

use rand::Rng;
use strata_models::{ClusterRecord, Level, StoredCluster};
use strata_qdrant::cosine_similarity;
use tracing::warn;

/// Minimum cosine similarity for joining an existing cluster (inclusive).
pub const SIMILARITY_THRESHOLD: f32 = 0.85;

/// Nearest clusters considered per stored chunk.
pub const CLUSTER_SEARCH_LIMIT: usize = 5;

pub const INITIAL_IMPORTANCE: f64 = 1.0;

/// Importance gained per additional member.
pub const IMPORTANCE_INCREMENT: f64 = 0.5;

/// A nearby cluster and its similarity to the incoming vector.
#[derive(Debug, Clone, PartialEq)]
pub struct ClusterCandidate {
    pub cluster: StoredCluster,
    pub similarity: f32,
}

/// Outcome of assigning one vector.
#[derive(Debug, Clone, PartialEq)]
pub struct Assignment {
    /// The cluster as it must be written back.
    pub cluster: ClusterRecord,
    pub is_new: bool,
    /// False when a matched cluster's centroid was unreadable and the
    /// incoming vector was used in its place.
    pub centroid_updated: bool,
}

/// Random cluster id in `1..=i64::MAX`, so it survives signed integer
/// payload fields.
pub fn new_cluster_id() -> u64 {
    rand::thread_rng().gen_range(1..=i64::MAX as u64)
}

/// Assign `vector` to a cluster at `level`.
///
/// `candidates` must be in descending similarity order; the first one at or
/// above the threshold wins. `new_id` is only called when a cluster is
/// created.
pub fn assign(
    vector: &[f32],
    level: Level,
    candidates: &[ClusterCandidate],
    new_id: impl FnOnce() -> u64,
) -> Assignment {
    let Some(matched) = candidates
        .iter()
        .find(|c| c.similarity >= SIMILARITY_THRESHOLD)
    else {
        return Assignment {
            cluster: ClusterRecord {
                id: new_id(),
                level,
                centroid: vector.to_vec(),
                member_count: 1,
                importance: INITIAL_IMPORTANCE,
            },
            is_new: true,
            centroid_updated: false,
        };
    };

    let cluster = &matched.cluster;
    let (centroid, centroid_updated) = match &cluster.centroid {
        Some(old) if old.len() == vector.len() => {
            (running_mean(old, cluster.member_count, vector), true)
        }
        other => {
            warn!(
                cluster_id = cluster.id,
                level = %level,
                stored_len = other.as_ref().map(|c| c.len()),
                expected_len = vector.len(),
                "Cluster centroid unreadable, keeping incoming vector"
            );
            (vector.to_vec(), false)
        }
    };

    Assignment {
        cluster: ClusterRecord {
            id: cluster.id,
            level,
            centroid,
            member_count: cluster.member_count.saturating_add(1),
            importance: cluster.importance + IMPORTANCE_INCREMENT,
        },
        is_new: false,
        centroid_updated,
    }
}

/// `(old * count + new) / (count + 1)`, accumulated in f64.
fn running_mean(old: &[f32], count: u64, new: &[f32]) -> Vec<f32> {
    let n = count as f64;
    old.iter()
        .zip(new)
        .map(|(o, v)| ((*o as f64 * n + *v as f64) / (n + 1.0)) as f32)
        .collect()
}

/// Cluster writes of one store batch, held back until the batch commits.
///
/// Later chunks in the batch must see the pending state, not the stale
/// store copy, so search hits are overlaid with it.
#[derive(Debug, Default)]
pub struct BatchAssigner {
    pending: Vec<ClusterRecord>,
    index: HashMap<u64, usize>,
}

impl BatchAssigner {
    pub fn new() -> Self {
        Self::default()
    }

    /// Merge store hits for `vector` at `level` with the pending clusters.
    ///
    /// Hits that are pending are replaced by the pending record and rescored
    /// against its centroid. Pending clusters the store did not return are
    /// scored locally and merged in. The result is in descending similarity
    /// order; ties keep store order first.
    pub fn candidates(
        &self,
        level: Level,
        vector: &[f32],
        hits: Vec<ClusterCandidate>,
    ) -> Vec<ClusterCandidate> {
        let mut merged: Vec<ClusterCandidate> = hits
            .into_iter()
            .map(|hit| match self.index.get(&hit.cluster.id) {
                Some(&i) => self.local_candidate(&self.pending[i], vector),
                None => hit,
            })
            .collect();

        for record in self.pending.iter().filter(|r| r.level == level) {
            if !merged.iter().any(|c| c.cluster.id == record.id) {
                merged.push(self.local_candidate(record, vector));
            }
        }

        merged.sort_by(|a, b| b.similarity.total_cmp(&a.similarity));
        merged
    }

    fn local_candidate(&self, record: &ClusterRecord, vector: &[f32]) -> ClusterCandidate {
        ClusterCandidate {
            similarity: cosine_similarity(vector, &record.centroid),
            cluster: StoredCluster::from(record),
        }
    }

    /// Remember an assignment's cluster state for the rest of the batch.
    pub fn record(&mut self, assignment: &Assignment) {
        let cluster = assignment.cluster.clone();
        match self.index.get(&cluster.id) {
            Some(&i) => self.pending[i] = cluster,
            None => {
                self.index.insert(cluster.id, self.pending.len());
                self.pending.push(cluster);
            }
        }
    }

    pub fn len(&self) -> usize {
        self.pending.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pending.is_empty()
    }

    /// Final state of every touched cluster, in first-touch order.
    pub fn into_clusters(self) -> Vec<ClusterRecord> {
        self.pending
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    fn candidate(
        id: u64,
        centroid: Vec<f32>,
        member_count: u64,
        similarity: f32,
    ) -> ClusterCandidate {
        ClusterCandidate {
            cluster: StoredCluster {
                id,
                member_count,
                importance: INITIAL_IMPORTANCE + IMPORTANCE_INCREMENT * (member_count - 1) as f64,
                centroid: Some(centroid),
            },
            similarity,
        }
    }

    #[test]
    fn test_no_candidates_creates_cluster() {
        let assignment = assign(&[1.0, 0.0], Level::File, &[], || 42);

        assert!(assignment.is_new);
        assert_eq!(assignment.cluster.id, 42);
        assert_eq!(assignment.cluster.member_count, 1);
        assert_eq!(assignment.cluster.importance, 1.0);
        assert_eq!(assignment.cluster.centroid, vec![1.0, 0.0]);
        assert_eq!(assignment.cluster.level, Level::File);
    }

    #[rstest]
    #[case(0.85, false)]
    #[case(0.8499, true)]
    #[case(0.99, false)]
    fn test_threshold_is_inclusive(#[case] similarity: f32, #[case] creates: bool) {
        let candidates = [candidate(7, vec![1.0, 0.0], 1, similarity)];
        let assignment = assign(&[1.0, 0.0], Level::File, &candidates, || 99);
        assert_eq!(assignment.is_new, creates);
    }

    #[test]
    fn test_first_candidate_over_threshold_wins() {
        let candidates = [
            candidate(1, vec![1.0, 0.0], 1, 0.95),
            candidate(2, vec![1.0, 0.0], 1, 0.90),
        ];
        let assignment = assign(&[1.0, 0.0], Level::File, &candidates, || unreachable!());
        assert_eq!(assignment.cluster.id, 1);
    }

    #[test]
    fn test_match_updates_running_mean() {
        let candidates = [candidate(5, vec![1.0, 0.0], 3, 0.9)];
        let assignment = assign(&[0.0, 1.0], Level::Module, &candidates, || unreachable!());

        assert!(!assignment.is_new);
        assert!(assignment.centroid_updated);
        assert_eq!(assignment.cluster.member_count, 4);
        assert_eq!(assignment.cluster.importance, 2.5);
        assert_eq!(assignment.cluster.centroid, vec![0.75, 0.25]);
    }

    #[test]
    fn test_unreadable_centroid_keeps_incoming_vector() {
        let mut broken = candidate(5, vec![1.0, 0.0, 0.0], 2, 0.9);
        let assignment = assign(&[0.0, 1.0], Level::File, &[broken.clone()], || unreachable!());
        assert!(!assignment.centroid_updated);
        assert_eq!(assignment.cluster.centroid, vec![0.0, 1.0]);
        assert_eq!(assignment.cluster.member_count, 3);
        assert_eq!(assignment.cluster.importance, 2.0);

        broken.cluster.centroid = None;
        let assignment = assign(&[0.0, 1.0], Level::File, &[broken], || unreachable!());
        assert!(!assignment.centroid_updated);
        assert_eq!(assignment.cluster.member_count, 3);
    }

    #[test]
    fn test_member_count_saturates() {
        let candidates = [candidate(5, vec![1.0, 0.0], u64::MAX, 0.9)];
        let assignment = assign(&[1.0, 0.0], Level::File, &candidates, || unreachable!());

        assert!(!assignment.is_new);
        assert_eq!(assignment.cluster.member_count, u64::MAX);
        assert_eq!(assignment.cluster.centroid, vec![1.0, 0.0]);
    }

    #[test]
    fn test_cluster_ids_fit_signed_integers() {
        for _ in 0..1000 {
            let id = new_cluster_id();
            assert!(id >= 1 && id <= i64::MAX as u64);
        }
    }

    #[test]
    fn test_batch_sees_clusters_created_earlier_in_batch() {
        let mut batch = BatchAssigner::new();
        let candidates = batch.candidates(Level::File, &[1.0, 0.0], vec![]);
        let first = assign(&[1.0, 0.0], Level::File, &candidates, || 10);
        batch.record(&first);

        let candidates = batch.candidates(Level::File, &[1.0, 0.0], vec![]);
        let second = assign(&[1.0, 0.0], Level::File, &candidates, || unreachable!());
        batch.record(&second);

        let clusters = batch.into_clusters();
        assert_eq!(clusters.len(), 1);
        assert_eq!(clusters[0].member_count, 2);
        assert_eq!(clusters[0].importance, 1.5);
    }

    #[test]
    fn test_batch_overlays_stale_store_hits() {
        let mut batch = BatchAssigner::new();
        let hit = candidate(3, vec![1.0, 0.0], 1, 1.0);

        let candidates = batch.candidates(Level::File, &[1.0, 0.0], vec![hit.clone()]);
        let first = assign(&[1.0, 0.0], Level::File, &candidates, || unreachable!());
        batch.record(&first);

        // The store still reports member_count 1 for the second chunk.
        let candidates = batch.candidates(Level::File, &[1.0, 0.0], vec![hit]);
        assert_eq!(candidates.len(), 1);
        assert_eq!(candidates[0].cluster.member_count, 2);

        let second = assign(&[1.0, 0.0], Level::File, &candidates, || unreachable!());
        assert_eq!(second.cluster.member_count, 3);
        assert_eq!(second.cluster.importance, 2.0);
    }

    #[test]
    fn test_batch_keeps_levels_apart() {
        let mut batch = BatchAssigner::new();
        let first = assign(&[1.0, 0.0], Level::File, &[], || 10);
        batch.record(&first);

        assert!(batch.candidates(Level::Module, &[1.0, 0.0], vec![]).is_empty());
        assert_eq!(batch.candidates(Level::File, &[1.0, 0.0], vec![]).len(), 1);
    }

    #[test]
    fn test_batch_candidates_sorted_by_similarity() {
        let mut batch = BatchAssigner::new();
        batch.record(&assign(&[0.0, 1.0], Level::File, &[], || 20));

        let hits = vec![candidate(1, vec![1.0, 1.0], 1, 0.7)];
        let candidates = batch.candidates(Level::File, &[0.0, 1.0], hits);

        let ids: Vec<u64> = candidates.iter().map(|c| c.cluster.id).collect();
        assert_eq!(ids, vec![20, 1]);
    }
}
