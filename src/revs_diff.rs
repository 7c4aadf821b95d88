//! `_revs_diff` engine (spec §4.2).

use std::collections::HashMap;
use std::sync::Arc;

use crate::error::BridgeError;
use crate::index::IndexClient;
use crate::type_selector::TypeSelector;
use crate::types::MissingRev;

pub struct RevsDiffEngine {
    index_client: Arc<dyn IndexClient>,
    type_selector: Arc<dyn TypeSelector>,
    resolve_conflicts: bool,
}

impl RevsDiffEngine {
    pub fn new(
        index_client: Arc<dyn IndexClient>,
        type_selector: Arc<dyn TypeSelector>,
        resolve_conflicts: bool,
    ) -> Self {
        Self {
            index_client,
            type_selector,
            resolve_conflicts,
        }
    }

    /// `revsDiff(db, candidates)` (spec §4.2).
    pub async fn revs_diff(
        &self,
        index: &str,
        candidates: &HashMap<String, String>,
    ) -> Result<HashMap<String, MissingRev>, BridgeError> {
        let mut response: HashMap<String, MissingRev> = candidates
            .iter()
            .map(|(id, rev)| {
                (
                    id.clone(),
                    MissingRev {
                        missing: rev.clone(),
                    },
                )
            })
            .collect();

        if !self.resolve_conflicts || candidates.is_empty() {
            return Ok(response);
        }

        let ids: Vec<String> = candidates.keys().cloned().collect();
        let items: Vec<(String, String)> = ids
            .iter()
            .map(|id| {
                (
                    self.type_selector.select(index, id, &serde_json::Value::Null),
                    id.clone(),
                )
            })
            .collect();

        let hits = self.index_client.multi_get(index, &items).await?;

        for (id, hit) in ids.iter().zip(hits.into_iter()) {
            let Some(source) = hit else { continue };
            let Some(stored_rev) = source
                .get("meta")
                .and_then(|m| m.get("rev"))
                .and_then(|r| r.as_str())
            else {
                continue;
            };
            if Some(stored_rev) == candidates.get(id).map(String::as_str) {
                response.remove(id);
            }
        }

        Ok(response)
    }
}
