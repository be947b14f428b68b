//! Semantic clusters of chunks sharing a level.

use serde::{Deserialize, Serialize};
use serde_json::json;

use crate::level::Level;
use crate::payload::{self, Payload};

/// A cluster as it will be written to the store.
///
/// `centroid` is the exact running mean. It is written both as the point
/// vector and into the payload, because cosine stores normalize vectors on
/// write and the mean must survive unnormalized.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClusterRecord {
    pub id: u64,
    pub level: Level,
    pub centroid: Vec<f32>,
    pub member_count: u64,
    pub importance: f64,
}

impl ClusterRecord {
    pub fn to_payload(&self) -> Payload {
        let mut payload = Payload::new();
        payload.insert(payload::KEY_LEVEL.into(), json!(self.level.as_str()));
        payload.insert(payload::KEY_MEMBER_COUNT.into(), json!(self.member_count));
        payload.insert(payload::KEY_IMPORTANCE.into(), json!(self.importance));
        payload.insert(payload::KEY_CENTROID.into(), json!(self.centroid));
        payload
    }
}

/// A cluster as read back from the store, possibly incomplete.
#[derive(Debug, Clone, PartialEq)]
pub struct StoredCluster {
    pub id: u64,
    pub member_count: u64,
    pub importance: f64,
    /// `None` when the centroid could not be read.
    pub centroid: Option<Vec<f32>>,
}

impl StoredCluster {
    /// Parse a cluster payload. A missing or zero member count reads as 1
    /// and a missing importance as 1.0.
    pub fn from_payload(id: u64, payload: &Payload) -> Self {
        Self {
            id,
            member_count: payload::get_u64(payload, payload::KEY_MEMBER_COUNT)
                .filter(|count| *count > 0)
                .unwrap_or(1),
            importance: payload::get_f64(payload, payload::KEY_IMPORTANCE)
                .filter(|importance| *importance >= 0.0)
                .unwrap_or(1.0),
            centroid: payload::get_vector(payload, payload::KEY_CENTROID),
        }
    }
}

impl From<&ClusterRecord> for StoredCluster {
    fn from(record: &ClusterRecord) -> Self {
        Self {
            id: record.id,
            member_count: record.member_count,
            importance: record.importance,
            centroid: Some(record.centroid.clone()),
        }
    }
}
