//! `_bulk_docs` engine (spec §4.3): normalize, classify, and bulk-write an
//! incoming mutation batch with bounded retry.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use base64::Engine as _;
use serde_json::Value;
use tracing::{error, warn};

use crate::collaborators::{Clock, Sleeper};
use crate::error::BridgeError;
use crate::index::{is_non_fatal_failure, BulkOp, IndexClient};
use crate::json_path::resolve_string_field;
use crate::type_selector::TypeSelector;
use crate::types::{DocAck, IndexedDocument, Mutation, MutationMeta};

pub struct BulkDocsEngine {
    index_client: Arc<dyn IndexClient>,
    type_selector: Arc<dyn TypeSelector>,
    clock: Arc<dyn Clock>,
    sleeper: Arc<dyn Sleeper>,
    parent_fields: HashMap<String, String>,
    routing_fields: HashMap<String, String>,
    retries: usize,
    retry_wait: Duration,
}

/// One mutation after normalization, paired with the ack the Source
/// expects for it if the write lands.
struct NormalizedMutation {
    ack: DocAck,
    op: BulkOp,
}

impl BulkDocsEngine {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        index_client: Arc<dyn IndexClient>,
        type_selector: Arc<dyn TypeSelector>,
        clock: Arc<dyn Clock>,
        sleeper: Arc<dyn Sleeper>,
        parent_fields: HashMap<String, String>,
        routing_fields: HashMap<String, String>,
        retries: usize,
        retry_wait: Duration,
    ) -> Self {
        Self {
            index_client,
            type_selector,
            clock,
            sleeper,
            parent_fields,
            routing_fields,
            retries,
            retry_wait,
        }
    }

    /// `bulkDocs(db, mutations)` (spec §4.3).
    pub async fn bulk_docs(
        &self,
        index: &str,
        mutations: Vec<Mutation>,
    ) -> Result<Vec<DocAck>, BridgeError> {
        let normalized: Vec<NormalizedMutation> = mutations
            .into_iter()
            .filter_map(|m| self.normalize(index, m))
            .collect();

        if normalized.is_empty() {
            return Ok(Vec::new());
        }

        let ops: Vec<BulkOp> = normalized.iter().map(|n| n.op.clone()).collect();
        let revs_by_id: HashMap<&str, &str> = normalized
            .iter()
            .map(|n| (n.ack.id.as_str(), n.ack.rev.as_str()))
            .collect();

        let mut attempt = 1;
        loop {
            let outcome = self.index_client.bulk(index, &ops).await?;

            if !outcome.has_failures() {
                return Ok(self.acks_for(&outcome.items, &revs_by_id));
            }

            let mut fatal_message: Option<String> = None;
            for item in outcome.failed_items() {
                let message = item.error_message.clone().unwrap_or_default();
                if !is_non_fatal_failure(&message) {
                    fatal_message = Some(message);
                    break;
                }
            }

            if let Some(message) = fatal_message {
                error!(index, attempt, error = %message, "fatal bulk failure");
                return Err(BridgeError::FatalIndex(message));
            }

            if attempt >= self.retries {
                error!(index, attempt, "bulk retries exhausted");
                return Err(BridgeError::FatalIndex(
                    "bulk index retries exhausted".to_string(),
                ));
            }

            warn!(
                index,
                attempt,
                wait_ms = self.retry_wait.as_millis() as u64,
                "retrying bulk after transient index rejection"
            );
            self.sleeper.sleep(self.retry_wait).await;
            attempt += 1;
        }
    }

    fn acks_for(
        &self,
        items: &[crate::index::BulkItemOutcome],
        revs_by_id: &HashMap<&str, &str>,
    ) -> Vec<DocAck> {
        items
            .iter()
            .filter(|i| !i.failed)
            .filter_map(|i| {
                revs_by_id.get(i.id.as_str()).map(|rev| DocAck {
                    id: i.id.clone(),
                    rev: rev.to_string(),
                })
            })
            .collect()
    }

    /// Per-mutation normalization (spec §4.3).
    fn normalize(&self, index: &str, mutation: Mutation) -> Option<NormalizedMutation> {
        let Some(meta) = mutation.meta else {
            warn!("mutation without meta skipped");
            return None;
        };

        let ack = DocAck {
            id: meta.id.clone(),
            rev: meta.rev.clone(),
        };

        if meta.deleted {
            let doc_type = self.type_selector.select(index, &meta.id, &Value::Null);
            return Some(NormalizedMutation {
                ack,
                op: BulkOp::Delete {
                    doc_type,
                    id: meta.id,
                },
            });
        }

        let payload = self.resolve_payload(&meta, &mutation);
        let doc_type = self.type_selector.select(index, &meta.id, &payload);

        let ttl_millis = self.resolve_ttl(&meta);
        let envelope = serde_json::to_value(IndexedDocument {
            meta: meta.clone(),
            doc: payload,
        })
        .expect("IndexedDocument always serializes");
        let parent = self
            .parent_fields
            .get(&doc_type)
            .and_then(|path| resolve_string_field(&envelope, path))
            .map(str::to_string);
        let routing = self
            .routing_fields
            .get(&doc_type)
            .and_then(|path| resolve_string_field(&envelope, path))
            .map(str::to_string);

        Some(NormalizedMutation {
            ack,
            op: BulkOp::Index {
                doc_type,
                id: meta.id,
                source: envelope,
                ttl_millis,
                parent,
                routing,
            },
        })
    }

    fn resolve_payload(&self, meta: &MutationMeta, mutation: &Mutation) -> Value {
        if meta.att_reason.as_deref() == Some("non-JSON mode") {
            return Value::Object(Default::default());
        }
        if let Some(json) = &mutation.json {
            return json.clone();
        }
        if let Some(b64) = &mutation.base64 {
            return match base64::engine::general_purpose::STANDARD.decode(b64) {
                Ok(bytes) => match serde_json::from_slice(&bytes) {
                    Ok(value) => value,
                    Err(e) => {
                        warn!(id = %meta.id, error = %e, "base64 payload was not valid JSON; indexing as stub");
                        Value::Object(Default::default())
                    }
                },
                Err(e) => {
                    warn!(id = %meta.id, error = %e, "base64 payload failed to decode; indexing as stub");
                    Value::Object(Default::default())
                }
            };
        }
        Value::Object(Default::default())
    }

    /// `ttl = expiration*1000 - now()`; `None` if expiration is unset or
    /// the resulting ttl is non-positive (spec §4.3, §9: TTL < 0 silently
    /// drops the TTL rather than treating the document as expired).
    fn resolve_ttl(&self, meta: &MutationMeta) -> Option<i64> {
        if meta.expiration == 0 {
            return None;
        }
        let ttl = meta.expiration * 1000 - self.clock.now_millis();
        if ttl <= 0 {
            None
        } else {
            Some(ttl)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::collaborators::test_support::{FixedClock, InstantSleeper};
    use crate::index::{BulkItemOutcome, BulkOutcome};
    use crate::type_selector::ConstantTypeSelector;
    use async_trait::async_trait;
    use std::sync::Mutex;

    struct ScriptedIndexClient {
        responses: Mutex<Vec<BulkOutcome>>,
        calls: Mutex<usize>,
    }

    #[async_trait]
    impl IndexClient for ScriptedIndexClient {
        async fn index_exists(&self, _index: &str) -> Result<bool, BridgeError> {
            Ok(true)
        }
        async fn get(&self, _index: &str, _doc_type: &str, _id: &str) -> Result<Option<Value>, BridgeError> {
            unimplemented!()
        }
        async fn multi_get(
            &self,
            _index: &str,
            _items: &[(String, String)],
        ) -> Result<Vec<Option<Value>>, BridgeError> {
            unimplemented!()
        }
        async fn create_only(
            &self,
            _index: &str,
            _doc_type: &str,
            _id: &str,
            _body: &Value,
        ) -> Result<bool, BridgeError> {
            unimplemented!()
        }
        async fn put(&self, _index: &str, _doc_type: &str, _id: &str, _body: &Value) -> Result<(), BridgeError> {
            unimplemented!()
        }
        async fn bulk(&self, _index: &str, _ops: &[BulkOp]) -> Result<BulkOutcome, BridgeError> {
            *self.calls.lock().unwrap() += 1;
            let mut responses = self.responses.lock().unwrap();
            Ok(responses.remove(0))
        }
    }

    fn engine(client: Arc<ScriptedIndexClient>, sleeper: Arc<InstantSleeper>) -> BulkDocsEngine {
        BulkDocsEngine::new(
            client,
            Arc::new(ConstantTypeSelector {
                type_name: "doc".to_string(),
            }),
            Arc::new(FixedClock(1_000_000)),
            sleeper,
            HashMap::new(),
            HashMap::new(),
            3,
            Duration::from_millis(50),
        )
    }

    fn mutation(id: &str, rev: &str, json: Value) -> Mutation {
        Mutation {
            meta: Some(MutationMeta {
                id: id.to_string(),
                rev: rev.to_string(),
                deleted: false,
                expiration: 0,
                att_reason: None,
            }),
            json: Some(json),
            base64: None,
        }
    }

    #[tokio::test]
    async fn missing_meta_mutation_is_skipped_from_output() {
        let client = Arc::new(ScriptedIndexClient {
            responses: Mutex::new(vec![BulkOutcome {
                items: vec![BulkItemOutcome {
                    id: "a".into(),
                    failed: false,
                    error_message: None,
                }],
            }]),
            calls: Mutex::new(0),
        });
        let eng = engine(client, Arc::new(InstantSleeper::default()));

        let muts = vec![
            mutation("a", "1-a", serde_json::json!({"x": 1})),
            Mutation {
                meta: None,
                json: None,
                base64: None,
            },
        ];

        let acks = eng.bulk_docs("bucket", muts).await.unwrap();
        assert_eq!(acks.len(), 1);
        assert_eq!(acks[0].id, "a");
        assert_eq!(acks[0].rev, "1-a");
    }

    #[tokio::test]
    async fn delete_mutation_acks_without_payload() {
        let client = Arc::new(ScriptedIndexClient {
            responses: Mutex::new(vec![BulkOutcome {
                items: vec![BulkItemOutcome {
                    id: "d".into(),
                    failed: false,
                    error_message: None,
                }],
            }]),
            calls: Mutex::new(0),
        });
        let eng = engine(client, Arc::new(InstantSleeper::default()));

        let muts = vec![Mutation {
            meta: Some(MutationMeta {
                id: "d".to_string(),
                rev: "3-r".to_string(),
                deleted: true,
                expiration: 0,
                att_reason: None,
            }),
            json: None,
            base64: None,
        }];

        let acks = eng.bulk_docs("bucket", muts).await.unwrap();
        assert_eq!(acks, vec![DocAck { id: "d".into(), rev: "3-r".into() }]);
    }

    #[tokio::test]
    async fn unparseable_base64_is_indexed_as_stub() {
        let client = Arc::new(ScriptedIndexClient {
            responses: Mutex::new(vec![BulkOutcome {
                items: vec![BulkItemOutcome {
                    id: "b".into(),
                    failed: false,
                    error_message: None,
                }],
            }]),
            calls: Mutex::new(0),
        });
        let eng = engine(client, Arc::new(InstantSleeper::default()));

        let muts = vec![Mutation {
            meta: Some(MutationMeta {
                id: "b".to_string(),
                rev: "1-x".to_string(),
                deleted: false,
                expiration: 0,
                att_reason: None,
            }),
            json: None,
            base64: Some(base64::engine::general_purpose::STANDARD.encode(b"{")),
        }];

        let acks = eng.bulk_docs("bucket", muts).await.unwrap();
        assert_eq!(acks.len(), 1);
        assert_eq!(acks[0].id, "b");
    }

    #[tokio::test]
    async fn transient_failure_retries_then_succeeds() {
        let client = Arc::new(ScriptedIndexClient {
            responses: Mutex::new(vec![
                BulkOutcome {
                    items: vec![BulkItemOutcome {
                        id: "a".into(),
                        failed: true,
                        error_message: Some("EsRejectedExecutionException: full".into()),
                    }],
                },
                BulkOutcome {
                    items: vec![BulkItemOutcome {
                        id: "a".into(),
                        failed: false,
                        error_message: None,
                    }],
                },
            ]),
            calls: Mutex::new(0),
        });
        let sleeper = Arc::new(InstantSleeper::default());
        let eng = engine(client.clone(), sleeper.clone());

        let acks = eng
            .bulk_docs("bucket", vec![mutation("a", "1-a", serde_json::json!({}))])
            .await
            .unwrap();

        assert_eq!(acks.len(), 1);
        assert_eq!(*client.calls.lock().unwrap(), 2);
        assert_eq!(sleeper.calls.lock().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn fatal_failure_aborts_immediately_without_retry() {
        let client = Arc::new(ScriptedIndexClient {
            responses: Mutex::new(vec![BulkOutcome {
                items: vec![BulkItemOutcome {
                    id: "a".into(),
                    failed: true,
                    error_message: Some("MapperParsingException: bad field".into()),
                }],
            }]),
            calls: Mutex::new(0),
        });
        let eng = engine(client.clone(), Arc::new(InstantSleeper::default()));

        let result = eng
            .bulk_docs("bucket", vec![mutation("a", "1-a", serde_json::json!({}))])
            .await;

        assert!(matches!(result, Err(BridgeError::FatalIndex(_))));
        assert_eq!(*client.calls.lock().unwrap(), 1);
    }

    #[tokio::test]
    async fn retries_are_capped() {
        let responses = (0..3)
            .map(|_| BulkOutcome {
                items: vec![BulkItemOutcome {
                    id: "a".into(),
                    failed: true,
                    error_message: Some("EsRejectedExecutionException: full".into()),
                }],
            })
            .collect();
        let client = Arc::new(ScriptedIndexClient {
            responses: Mutex::new(responses),
            calls: Mutex::new(0),
        });
        let eng = engine(client.clone(), Arc::new(InstantSleeper::default()));

        let result = eng
            .bulk_docs("bucket", vec![mutation("a", "1-a", serde_json::json!({}))])
            .await;

        assert!(matches!(result, Err(BridgeError::FatalIndex(_))));
        assert_eq!(*client.calls.lock().unwrap(), 3);
    }

    #[tokio::test]
    async fn ttl_is_omitted_when_non_positive() {
        let eng = engine(
            Arc::new(ScriptedIndexClient {
                responses: Mutex::new(vec![]),
                calls: Mutex::new(0),
            }),
            Arc::new(InstantSleeper::default()),
        );
        let meta = MutationMeta {
            id: "a".into(),
            rev: "1-a".into(),
            deleted: false,
            expiration: 500, // 500_000ms, clock fixed at 1_000_000ms -> ttl negative
            att_reason: None,
        };
        assert_eq!(eng.resolve_ttl(&meta), None);

        let meta_future = MutationMeta {
            expiration: 10_000, // 10_000_000ms > clock
            ..meta
        };
        assert_eq!(eng.resolve_ttl(&meta_future), Some(9_000_000));
    }
}
