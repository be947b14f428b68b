//! Payload field names and typed readers for store records.

use std::collections::HashMap;

use serde_json::Value;

/// Store payload, keyed by field name.
pub type Payload = HashMap<String, Value>;

pub const KEY_LEVEL: &str = "level";
pub const KEY_MEMBER_COUNT: &str = "member_count";
pub const KEY_IMPORTANCE: &str = "importance";
pub const KEY_CENTROID: &str = "centroid";
pub const KEY_REPO_PATH: &str = "repo_path";
pub const KEY_CONTEXT: &str = "context";
pub const KEY_CLUSTER_ID: &str = "cluster_id";
pub const KEY_COMMIT_ID: &str = "commit_id";
pub const KEY_ACCESS_COUNT: &str = "access_count";
pub const KEY_TIMESTAMP: &str = "timestamp";

pub fn get_str<'a>(payload: &'a Payload, key: &str) -> Option<&'a str> {
    payload.get(key).and_then(Value::as_str)
}

pub fn get_f64(payload: &Payload, key: &str) -> Option<f64> {
    payload.get(key).and_then(Value::as_f64)
}

pub fn get_u64(payload: &Payload, key: &str) -> Option<u64> {
    payload.get(key).and_then(Value::as_u64)
}

/// Read a float vector. Any non-numeric element invalidates the whole vector.
pub fn get_vector(payload: &Payload, key: &str) -> Option<Vec<f32>> {
    payload
        .get(key)?
        .as_array()?
        .iter()
        .map(|v| v.as_f64().map(|f| f as f32))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_get_vector_rejects_mixed_arrays() {
        let mut payload = Payload::new();
        payload.insert(KEY_CENTROID.into(), json!([0.5, 0.25]));
        assert_eq!(get_vector(&payload, KEY_CENTROID), Some(vec![0.5, 0.25]));

        payload.insert(KEY_CENTROID.into(), json!([0.5, "x"]));
        assert_eq!(get_vector(&payload, KEY_CENTROID), None);
        assert_eq!(get_vector(&payload, "missing"), None);
    }
}
