//! Wire types for the replication payloads (spec §3).

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// One entry of a `_bulk_docs` push.
#[derive(Debug, Clone, Deserialize)]
pub struct Mutation {
    pub meta: Option<MutationMeta>,
    pub json: Option<Value>,
    pub base64: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MutationMeta {
    pub id: String,
    pub rev: String,
    #[serde(default)]
    pub deleted: bool,
    #[serde(default)]
    pub expiration: i64,
    pub att_reason: Option<String>,
}

/// What is actually written to the Index for a live mutation.
#[derive(Debug, Clone, Serialize)]
pub struct IndexedDocument {
    pub meta: MutationMeta,
    pub doc: Value,
}

/// Acknowledgement returned per input mutation by `_bulk_docs`.
#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct DocAck {
    pub id: String,
    pub rev: String,
}

/// A `_revs_diff` response entry.
#[derive(Debug, Clone, Serialize)]
pub struct MissingRev {
    pub missing: String,
}

/// Shape stored for checkpoint/UUID documents: `{doc: {...}}`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CheckpointEnvelope {
    pub doc: Value,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn mutation_meta_deserializes_with_defaults() {
        let m: MutationMeta = serde_json::from_value(serde_json::json!({
            "id": "doc1",
            "rev": "1-abc"
        }))
        .unwrap();
        assert_eq!(m.id, "doc1");
        assert!(!m.deleted);
        assert_eq!(m.expiration, 0);
        assert_eq!(m.att_reason, None);
    }

    #[test]
    fn mutation_without_meta_is_accepted_for_later_skip() {
        let m: Mutation = serde_json::from_value(serde_json::json!({
            "json": {"a": 1}
        }))
        .unwrap();
        assert!(m.meta.is_none());
    }
}
