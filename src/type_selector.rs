//! Pluggable `(index, id, doc) -> type` mapping (spec §9 re-architecture
//! hint: "constant," "document-field," and "regex-over-id" variants).
//!
//! TypeSelector is treated as total per spec §9's open question: an id not
//! matched by any rule still gets a type (the configured default), never
//! `None`. `doc` is `Value::Null` at call sites that have no payload in
//! hand (spec §4.2's revs-diff never sees a document body).

use regex::Regex;

use crate::json_path::resolve_string_field;
use serde_json::Value;

/// A capability that maps `(index, id, doc)` to an index-type name.
pub trait TypeSelector: Send + Sync {
    fn select(&self, index: &str, id: &str, doc: &Value) -> String;
}

/// Every document gets the same type, regardless of index, id, or payload.
pub struct ConstantTypeSelector {
    pub type_name: String,
}

impl TypeSelector for ConstantTypeSelector {
    fn select(&self, _index: &str, _id: &str, _doc: &Value) -> String {
        self.type_name.clone()
    }
}

/// Type is read from a dotted path (`dynamicTypePath`, spec §6) inside the
/// document payload, falling back to a default when the path is absent,
/// non-string, or no payload was supplied.
pub struct DocumentFieldTypeSelector {
    pub field_path: String,
    pub fallback: String,
}

impl TypeSelector for DocumentFieldTypeSelector {
    fn select(&self, _index: &str, _id: &str, doc: &Value) -> String {
        resolve_string_field(doc, &self.field_path)
            .map(str::to_string)
            .unwrap_or_else(|| self.fallback.clone())
    }
}

/// One regex-to-type rule, tried in order; first match wins.
pub struct RegexRule {
    pub pattern: Regex,
    pub type_name: String,
}

/// Type is derived by matching the document id against an ordered list of
/// regexes, falling back to a default type if none match.
pub struct RegexTypeSelector {
    pub rules: Vec<RegexRule>,
    pub default_type: String,
}

impl TypeSelector for RegexTypeSelector {
    fn select(&self, _index: &str, id: &str, _doc: &Value) -> String {
        for rule in &self.rules {
            if rule.pattern.is_match(id) {
                return rule.type_name.clone();
            }
        }
        self.default_type.clone()
    }
}
