//! Bridge configuration (spec §6): a TOML file with every knob the
//! translator exposes, plus a thin clap layer so the common ones can be
//! overridden from the command line without editing the file.

use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result};
use clap::Parser;
use serde::Deserialize;

#[derive(Debug, Deserialize, Clone)]
pub struct Config {
    /// Where the bridge listens for CAPI requests from the Source.
    #[serde(default = "default_listen_addr")]
    pub listen_addr: String,

    /// Base URL of the Index cluster (spec §1: "the Index").
    pub index_url: String,

    /// `tracing-subscriber` env-filter directive, e.g. "info" or
    /// "capi_bridge=debug,tower_http=info".
    #[serde(default = "default_log_level")]
    pub log_level: String,

    /// Index type used for checkpoint/local-doc/UUID bookkeeping documents
    /// (spec §4.4, §4.5).
    #[serde(default = "default_checkpoint_document_type")]
    pub checkpoint_document_type: String,

    /// Dotted path read by `DocumentFieldTypeSelector` when `typeSelector`
    /// is `"document-field"` (spec §9).
    #[serde(default)]
    pub dynamic_type_path: Option<String>,

    /// Which `TypeSelector` variant to build (spec §9): `"constant"`,
    /// `"document-field"`, or `"regex"`.
    #[serde(default = "default_type_selector")]
    pub type_selector: String,

    /// Type name used by `ConstantTypeSelector`, and the fallback used by
    /// `DocumentFieldTypeSelector`/`RegexTypeSelector`.
    #[serde(default = "default_document_type")]
    pub document_type: String,

    /// Ordered `(regex, type)` rules for `RegexTypeSelector`.
    #[serde(default)]
    pub type_regex_rules: Vec<(String, String)>,

    /// Whether `_revs_diff` consults the Index before declaring a revision
    /// missing (spec §4.2).
    #[serde(default)]
    pub resolve_conflicts: bool,

    /// Admission gate capacity (spec §4.1): in-flight requests allowed
    /// before 503s are returned.
    #[serde(default = "default_max_concurrent_requests")]
    pub max_concurrent_requests: usize,

    /// Bulk-docs retry budget on non-fatal Index rejection (spec §4.3).
    #[serde(default = "default_bulk_index_retries")]
    pub bulk_index_retries: usize,

    #[serde(default = "default_bulk_index_retry_wait_ms")]
    pub bulk_index_retry_wait_ms: u64,

    /// Per-type dotted path used to resolve a parent-join field on index
    /// (spec §4.3).
    #[serde(default)]
    pub document_type_parent_fields: HashMap<String, String>,

    /// Per-type dotted path used to resolve a custom routing value on
    /// index (spec §4.3).
    #[serde(default)]
    pub document_type_routing_fields: HashMap<String, String>,
}

fn default_listen_addr() -> String {
    "0.0.0.0:5984".to_string()
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_checkpoint_document_type() -> String {
    "couchbaseCheckpoint".to_string()
}

fn default_type_selector() -> String {
    "constant".to_string()
}

fn default_document_type() -> String {
    "couchbaseDocument".to_string()
}

fn default_max_concurrent_requests() -> usize {
    1024
}

fn default_bulk_index_retries() -> usize {
    5
}

fn default_bulk_index_retry_wait_ms() -> u64 {
    500
}

impl Config {
    pub fn load_from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = fs::read_to_string(path).context("failed to read config file")?;
        let config: Config = toml::from_str(&content).context("failed to parse config file")?;
        Ok(config)
    }

    pub fn bulk_index_retry_wait(&self) -> Duration {
        Duration::from_millis(self.bulk_index_retry_wait_ms)
    }
}

/// CLI overrides layered on top of the file (teacher convention: flags win
/// when present, the file otherwise supplies the default).
#[derive(Parser, Debug)]
#[command(name = "capi-bridge")]
#[command(about = "CouchDB CAPI-compatible replication bridge")]
pub struct Args {
    /// Path to the TOML config file.
    #[arg(short, long, default_value = "capi-bridge.toml")]
    pub config: PathBuf,

    /// Override `listen_addr`.
    #[arg(long)]
    pub listen: Option<String>,

    /// Override `index_url`.
    #[arg(long)]
    pub index_url: Option<String>,

    /// Override `log_level`.
    #[arg(long)]
    pub log_level: Option<String>,
}

impl Args {
    pub fn resolve(self) -> Result<Config> {
        let mut config = Config::load_from_file(&self.config)?;
        if let Some(listen) = self.listen {
            config.listen_addr = listen;
        }
        if let Some(index_url) = self.index_url {
            config.index_url = index_url;
        }
        if let Some(log_level) = self.log_level {
            config.log_level = log_level;
        }
        Ok(config)
    }
}
