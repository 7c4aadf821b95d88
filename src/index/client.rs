//! `IndexClient`: the capability trait the core depends on, plus the
//! production implementation backed by the `elasticsearch` crate.

use anyhow::Context;
use async_trait::async_trait;
use elasticsearch::http::request::JsonBody;
use elasticsearch::http::transport::{SingleNodeConnectionPool, TransportBuilder};
use elasticsearch::indices::IndicesExistsParts;
use elasticsearch::{BulkParts, CreateParts, Elasticsearch, GetParts, MgetParts};
use serde_json::{json, Value};
use tracing::{debug, warn};
use url::Url;

use super::bulk::{BulkItemOutcome, BulkOp, BulkOutcome};
use crate::error::BridgeError;

/// Bulk/get/multi-get/exists/create-only primitives against the Index.
///
/// `doc_type` plays the role of the CAPI connector's index-type: this
/// trait's implementations are free to encode it however suits their wire
/// protocol (see `ElasticsearchIndexClient` for the modern-ES encoding).
#[async_trait]
pub trait IndexClient: Send + Sync {
    async fn index_exists(&self, index: &str) -> Result<bool, BridgeError>;

    async fn get(&self, index: &str, doc_type: &str, id: &str) -> Result<Option<Value>, BridgeError>;

    /// Same order as `items`; `None` for a missing item or a per-item
    /// failure (spec §4.2 step 5).
    async fn multi_get(
        &self,
        index: &str,
        items: &[(String, String)],
    ) -> Result<Vec<Option<Value>>, BridgeError>;

    /// Create-only write: returns `true` if this call created the
    /// document, `false` if it already existed (lost the race, spec §4.4).
    async fn create_only(
        &self,
        index: &str,
        doc_type: &str,
        id: &str,
        body: &Value,
    ) -> Result<bool, BridgeError>;

    async fn put(&self, index: &str, doc_type: &str, id: &str, body: &Value) -> Result<(), BridgeError>;

    /// Send all ops as a single bulk request; returns per-item outcomes in
    /// input order.
    async fn bulk(&self, index: &str, ops: &[BulkOp]) -> Result<BulkOutcome, BridgeError>;
}

/// Production `IndexClient` over the `elasticsearch` crate.
///
/// Modern Elasticsearch has no per-document types, so the CAPI notion of a
/// `(index, type, id)` triple is encoded as a single physical document id
/// `"{type}::{id}"` within the index; the logical type is not otherwise
/// interpreted by this client (see DESIGN.md).
#[derive(Clone)]
pub struct ElasticsearchIndexClient {
    client: Elasticsearch,
}

impl ElasticsearchIndexClient {
    pub fn new(url: &str) -> anyhow::Result<Self> {
        let parsed = Url::parse(url).context("invalid index url")?;
        let conn_pool = SingleNodeConnectionPool::new(parsed);
        let transport = TransportBuilder::new(conn_pool).disable_proxy().build()?;
        Ok(Self {
            client: Elasticsearch::new(transport),
        })
    }

    fn physical_id(doc_type: &str, id: &str) -> String {
        format!("{}::{}", doc_type, id)
    }
}

#[async_trait]
impl IndexClient for ElasticsearchIndexClient {
    async fn index_exists(&self, index: &str) -> Result<bool, BridgeError> {
        let response = self
            .client
            .indices()
            .exists(IndicesExistsParts::Index(&[index]))
            .send()
            .await
            .context("index exists check failed")?;
        Ok(response.status_code().is_success())
    }

    async fn get(&self, index: &str, doc_type: &str, id: &str) -> Result<Option<Value>, BridgeError> {
        let pid = Self::physical_id(doc_type, id);
        let response = self
            .client
            .get(GetParts::IndexId(index, &pid))
            .send()
            .await
            .context("get failed")?;

        if response.status_code() == 404 {
            return Ok(None);
        }
        let body: Value = response.json().await.context("get response parse failed")?;
        if body["found"].as_bool() != Some(true) {
            return Ok(None);
        }
        Ok(body.get("_source").cloned())
    }

    async fn multi_get(
        &self,
        index: &str,
        items: &[(String, String)],
    ) -> Result<Vec<Option<Value>>, BridgeError> {
        if items.is_empty() {
            return Ok(Vec::new());
        }

        let docs: Vec<Value> = items
            .iter()
            .map(|(doc_type, id)| {
                json!({ "_id": Self::physical_id(doc_type, id) })
            })
            .collect();

        let response = self
            .client
            .mget(MgetParts::Index(index))
            .body(json!({ "docs": docs }))
            .send()
            .await
            .context("multi-get failed")?;

        let body: Value = response
            .json()
            .await
            .context("multi-get response parse failed")?;

        let hits = body["docs"].as_array().cloned().unwrap_or_default();
        let mut out = Vec::with_capacity(items.len());
        for i in 0..items.len() {
            let hit = hits.get(i);
            let source = hit.and_then(|h| {
                if h.get("found").and_then(Value::as_bool) == Some(true) {
                    h.get("_source").cloned()
                } else {
                    None
                }
            });
            out.push(source);
        }
        Ok(out)
    }

    async fn create_only(
        &self,
        index: &str,
        doc_type: &str,
        id: &str,
        body: &Value,
    ) -> Result<bool, BridgeError> {
        let pid = Self::physical_id(doc_type, id);
        let response = self
            .client
            .create(CreateParts::IndexId(index, &pid))
            .body(body)
            .send()
            .await
            .context("create-only failed")?;

        if response.status_code() == 409 {
            debug!(index, doc_type, id, "create-only lost the race");
            return Ok(false);
        }
        if !response.status_code().is_success() {
            let text = response.text().await.unwrap_or_default();
            return Err(BridgeError::FatalIndex(text));
        }
        Ok(true)
    }

    async fn put(&self, index: &str, doc_type: &str, id: &str, body: &Value) -> Result<(), BridgeError> {
        let pid = Self::physical_id(doc_type, id);
        let response = self
            .client
            .index(elasticsearch::IndexParts::IndexId(index, &pid))
            .body(body)
            .send()
            .await
            .context("put failed")?;

        if !response.status_code().is_success() {
            let text = response.text().await.unwrap_or_default();
            return Err(BridgeError::FatalIndex(text));
        }
        Ok(())
    }

    async fn bulk(&self, index: &str, ops: &[BulkOp]) -> Result<BulkOutcome, BridgeError> {
        if ops.is_empty() {
            return Ok(BulkOutcome::default());
        }

        let mut body: Vec<JsonBody<Value>> = Vec::with_capacity(ops.len() * 2);
        for op in ops {
            match op {
                BulkOp::Index {
                    doc_type,
                    id,
                    source,
                    ttl_millis,
                    parent,
                    routing,
                } => {
                    let pid = Self::physical_id(doc_type, id);
                    let mut action = json!({ "index": { "_id": pid } });
                    if let Some(routing) = routing {
                        action["index"]["routing"] = json!(routing);
                    }
                    if let Some(parent) = parent {
                        action["index"]["parent"] = json!(parent);
                    }
                    // ttl_millis has no direct ES8 bulk-action equivalent;
                    // callers that need expiry enforce it at read time.
                    let _ = ttl_millis;
                    body.push(action.into());
                    body.push(source.clone().into());
                }
                BulkOp::Delete { doc_type, id } => {
                    let pid = Self::physical_id(doc_type, id);
                    body.push(json!({ "delete": { "_id": pid } }).into());
                }
            }
        }

        let response = self
            .client
            .bulk(BulkParts::Index(index))
            .body(body)
            .send()
            .await
            .context("bulk request failed")?;

        if !response.status_code().is_success() {
            let text = response.text().await.unwrap_or_default();
            return Err(BridgeError::FatalIndex(text));
        }

        let parsed: Value = response.json().await.context("bulk response parse failed")?;
        let items = parsed["items"]
            .as_array()
            .cloned()
            .unwrap_or_default();

        let mut out = Vec::with_capacity(ops.len());
        for (op, item) in ops.iter().zip(items.iter()) {
            let inner = item.as_object().and_then(|o| o.values().next());
            let failed = inner
                .and_then(|i| i.get("error"))
                .map(|e| !e.is_null())
                .unwrap_or(false);
            let error_message = if failed {
                inner
                    .and_then(|i| i.get("error"))
                    .and_then(|e| e.get("reason").or_else(|| e.get("type")))
                    .and_then(Value::as_str)
                    .map(str::to_string)
                    .or_else(|| inner.and_then(|i| i.get("error")).map(|e| e.to_string()))
            } else {
                None
            };
            if failed {
                warn!(id = op.id(), error = ?error_message, "bulk item failed");
            }
            out.push(BulkItemOutcome {
                id: op.id().to_string(),
                failed,
                error_message,
            });
        }

        Ok(BulkOutcome { items: out })
    }
}
