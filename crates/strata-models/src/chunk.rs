//! Memory chunks and their content-derived identity.

use serde::{Deserialize, Serialize};
use serde_json::json;
use sha2::{Digest, Sha256};

use crate::level::Level;
use crate::payload::{self, Payload};

/// A chunk as submitted to `store_memory`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChunkInput {
    pub level: Level,
    pub repo_path: String,
    pub context: String,
    /// Optional relevance score for bookkeeping; not used for ranking.
    #[serde(default)]
    pub score: Option<f64>,
}

/// Derive the store identifier for a chunk.
///
/// SHA-256 over `"{repo_path}:{level}:{context}"`; the identifier is the
/// first 8 digest bytes read big-endian, so storing identical content for
/// the same path and level overwrites in place.
pub fn derive_chunk_id(repo_path: &str, level: Level, context: &str) -> u64 {
    let mut hasher = Sha256::new();
    hasher.update(format!("{}:{}:{}", repo_path, level.as_str(), context).as_bytes());
    let digest = hasher.finalize();

    let mut prefix = [0u8; 8];
    prefix.copy_from_slice(&digest[..8]);
    u64::from_be_bytes(prefix)
}

/// A stored chunk, minus its vector.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChunkRecord {
    pub id: u64,
    pub repo_path: String,
    pub level: Level,
    pub context: String,
    pub cluster_id: u64,
    pub commit_id: String,
    /// Reserved for read tracking; always written as 0.
    pub access_count: u64,
    pub timestamp: f64,
}

impl ChunkRecord {
    /// Build the record for a newly stored chunk.
    pub fn new(input: &ChunkInput, cluster_id: u64, commit_id: &str) -> Self {
        Self {
            id: derive_chunk_id(&input.repo_path, input.level, &input.context),
            repo_path: input.repo_path.clone(),
            level: input.level,
            context: input.context.clone(),
            cluster_id,
            commit_id: commit_id.to_string(),
            access_count: 0,
            timestamp: crate::now_timestamp(),
        }
    }

    pub fn to_payload(&self) -> Payload {
        let mut payload = Payload::new();
        payload.insert(payload::KEY_REPO_PATH.into(), json!(self.repo_path));
        payload.insert(payload::KEY_LEVEL.into(), json!(self.level.as_str()));
        payload.insert(payload::KEY_CONTEXT.into(), json!(self.context));
        payload.insert(payload::KEY_CLUSTER_ID.into(), json!(self.cluster_id));
        payload.insert(payload::KEY_COMMIT_ID.into(), json!(self.commit_id));
        payload.insert(payload::KEY_ACCESS_COUNT.into(), json!(self.access_count));
        payload.insert(payload::KEY_TIMESTAMP.into(), json!(self.timestamp));
        payload
    }

    /// Read a chunk back from a store payload.
    ///
    /// Returns `None` when the path or level is missing or unreadable;
    /// other fields fall back to their zero values.
    pub fn from_payload(id: u64, payload: &Payload) -> Option<Self> {
        let repo_path = payload::get_str(payload, payload::KEY_REPO_PATH)?.to_string();
        let level = payload::get_str(payload, payload::KEY_LEVEL).and_then(Level::from_str)?;

        Some(Self {
            id,
            repo_path,
            level,
            context: payload::get_str(payload, payload::KEY_CONTEXT)
                .unwrap_or_default()
                .to_string(),
            cluster_id: payload::get_u64(payload, payload::KEY_CLUSTER_ID).unwrap_or(0),
            commit_id: payload::get_str(payload, payload::KEY_COMMIT_ID)
                .unwrap_or_default()
                .to_string(),
            access_count: payload::get_u64(payload, payload::KEY_ACCESS_COUNT).unwrap_or(0),
            timestamp: payload::get_f64(payload, payload::KEY_TIMESTAMP).unwrap_or(0.0),
        })
    }
}
