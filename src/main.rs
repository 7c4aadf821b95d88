//! Entrypoint: parses CLI/config, wires a production Index client and the
//! rest of the core, starts the HTTP transport.

use std::sync::Arc;

use anyhow::Result;
use clap::Parser;
use regex::Regex;
use tracing::info;
use tracing_subscriber::EnvFilter;

use capi_bridge::bulk_docs::BulkDocsEngine;
use capi_bridge::checkpoint::CheckpointStore;
use capi_bridge::collaborators::{RandomUuidGenerator, SystemClock, TokioSleeper};
use capi_bridge::config::{Args, Config};
use capi_bridge::index::ElasticsearchIndexClient;
use capi_bridge::meta::MetaOps;
use capi_bridge::revs_diff::RevsDiffEngine;
use capi_bridge::server::{build_router, AppState};
use capi_bridge::stats::AdmissionGate;
use capi_bridge::type_selector::{
    ConstantTypeSelector, DocumentFieldTypeSelector, RegexRule, RegexTypeSelector, TypeSelector,
};
use capi_bridge::uuid_store::UuidStore;

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();
    let config = args.resolve()?;

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_new(&config.log_level).unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    info!("capi-bridge starting up");
    info!(index_url = %config.index_url, "connecting to index");

    let index_client = Arc::new(ElasticsearchIndexClient::new(&config.index_url)?);
    let type_selector: Arc<dyn TypeSelector> = build_type_selector(&config)?;
    let uuid_store = Arc::new(UuidStore::new(
        index_client.clone(),
        Arc::new(RandomUuidGenerator),
        config.checkpoint_document_type.clone(),
    ));

    let state = Arc::new(AppState {
        admission: AdmissionGate::new(config.max_concurrent_requests),
        revs_diff: RevsDiffEngine::new(
            index_client.clone(),
            type_selector.clone(),
            config.resolve_conflicts,
        ),
        bulk_docs: BulkDocsEngine::new(
            index_client.clone(),
            type_selector.clone(),
            Arc::new(SystemClock),
            Arc::new(TokioSleeper),
            config.document_type_parent_fields.clone(),
            config.document_type_routing_fields.clone(),
            config.bulk_index_retries,
            config.bulk_index_retry_wait(),
        ),
        checkpoints: CheckpointStore::new(index_client.clone(), config.checkpoint_document_type.clone()),
        meta: MetaOps::new(index_client, uuid_store),
    });

    let app = build_router(state);

    info!(listen_addr = %config.listen_addr, "starting server");
    let listener = tokio::net::TcpListener::bind(&config.listen_addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}

fn build_type_selector(config: &Config) -> Result<Arc<dyn TypeSelector>> {
    match config.type_selector.as_str() {
        "document-field" => {
            let field_path = config
                .dynamic_type_path
                .clone()
                .unwrap_or_else(|| "type".to_string());
            Ok(Arc::new(DocumentFieldTypeSelector {
                field_path,
                fallback: config.document_type.clone(),
            }))
        }
        "regex" => {
            let mut rules = Vec::with_capacity(config.type_regex_rules.len());
            for (pattern, type_name) in &config.type_regex_rules {
                rules.push(RegexRule {
                    pattern: Regex::new(pattern)?,
                    type_name: type_name.clone(),
                });
            }
            Ok(Arc::new(RegexTypeSelector {
                rules,
                default_type: config.document_type.clone(),
            }))
        }
        _ => Ok(Arc::new(ConstantTypeSelector {
            type_name: config.document_type.clone(),
        })),
    }
}
