//! Bulk operation types and the non-fatal-failure classifier (spec §4.3).

use serde_json::Value;

/// One action in a bulk request, in input order.
#[derive(Debug, Clone)]
pub enum BulkOp {
    Index {
        doc_type: String,
        id: String,
        source: Value,
        ttl_millis: Option<i64>,
        parent: Option<String>,
        routing: Option<String>,
    },
    Delete {
        doc_type: String,
        id: String,
    },
}

impl BulkOp {
    pub fn id(&self) -> &str {
        match self {
            BulkOp::Index { id, .. } => id,
            BulkOp::Delete { id, .. } => id,
        }
    }
}

/// Per-item result of a bulk request, same order as the input ops.
#[derive(Debug, Clone)]
pub struct BulkItemOutcome {
    pub id: String,
    pub failed: bool,
    pub error_message: Option<String>,
}

/// Whole-bulk result.
#[derive(Debug, Clone, Default)]
pub struct BulkOutcome {
    pub items: Vec<BulkItemOutcome>,
}

impl BulkOutcome {
    pub fn has_failures(&self) -> bool {
        self.items.iter().any(|i| i.failed)
    }

    pub fn failed_items(&self) -> impl Iterator<Item = &BulkItemOutcome> {
        self.items.iter().filter(|i| i.failed)
    }
}

/// The non-fatal failure class (spec §4.3, §7 kind 2): currently, queue
/// pressure on the Index side. Any other failure message is fatal.
pub fn is_non_fatal_failure(message: &str) -> bool {
    message.contains("EsRejectedExecutionException")
}
