//! Checkpoint / local-doc store (spec §4.5).

use std::sync::Arc;

use serde_json::Value;

use crate::error::BridgeError;
use crate::index::IndexClient;
use crate::types::CheckpointEnvelope;

pub struct CheckpointStore {
    index_client: Arc<dyn IndexClient>,
    checkpoint_type: String,
}

impl CheckpointStore {
    pub fn new(index_client: Arc<dyn IndexClient>, checkpoint_type: String) -> Self {
        Self {
            index_client,
            checkpoint_type,
        }
    }

    /// `GET /<db>/_local/<id>`: returns the unwrapped `doc` payload.
    pub async fn get(&self, index: &str, id: &str) -> Result<Option<Value>, BridgeError> {
        let source = self.index_client.get(index, &self.checkpoint_type, id).await?;
        Ok(source.and_then(|s| s.get("doc").cloned()))
    }

    /// `PUT /<db>/_local/<id>`: synthesizes `_rev` if the caller omitted
    /// one, then stores `{doc: payload}`. Returns the revision string.
    pub async fn put(&self, index: &str, id: &str, mut payload: Value) -> Result<String, BridgeError> {
        let rev = match payload.get("_rev").and_then(Value::as_str) {
            Some(rev) => rev.to_string(),
            None => {
                let rev = format!("1-{}", uuid::Uuid::new_v4().simple());
                if let Some(obj) = payload.as_object_mut() {
                    obj.insert("_rev".to_string(), Value::String(rev.clone()));
                }
                rev
            }
        };

        let envelope = CheckpointEnvelope { doc: payload };
        let body = serde_json::to_value(envelope).expect("CheckpointEnvelope always serializes");
        self.index_client
            .put(index, &self.checkpoint_type, id, &body)
            .await?;
        Ok(rev)
    }
}
