//! HTTP transport: maps the CAPI contract (spec §6) onto the core
//! operations. One async task per inbound request; every Index round trip
//! and retry sleep is awaited before the handler responds.

use std::collections::HashMap;
use std::sync::Arc;

use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::{get, head, post};
use axum::{Json, Router};
use serde::Serialize;
use serde_json::Value;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing::warn;

use crate::bulk_docs::BulkDocsEngine;
use crate::checkpoint::CheckpointStore;
use crate::db_name::DatabaseRef;
use crate::error::BridgeError;
use crate::meta::MetaOps;
use crate::revs_diff::RevsDiffEngine;
use crate::stats::{AdmissionGate, Endpoint};
use crate::types::Mutation;

pub struct AppState {
    pub admission: AdmissionGate,
    pub revs_diff: RevsDiffEngine,
    pub bulk_docs: BulkDocsEngine,
    pub checkpoints: CheckpointStore,
    pub meta: MetaOps,
}

pub fn build_router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/", get(welcome))
        .route("/_stats", get(stats))
        .route("/_health", get(health))
        .route("/healthz", get(health))
        .route("/{db}", head(database_exists).get(get_database_details))
        .route("/{db}/_revs_diff", post(revs_diff))
        .route("/{db}/_bulk_docs", post(bulk_docs))
        .route("/{db}/_ensure_full_commit", post(ensure_full_commit))
        .route(
            "/{db}/_local/{id}",
            get(get_local_doc).put(put_local_doc),
        )
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// CouchDB-style error envelope (spec §6): `{"error": "...", "reason": "..."}`.
#[derive(Serialize)]
struct ErrorEnvelope {
    error: &'static str,
    reason: String,
}

impl IntoResponse for BridgeError {
    fn into_response(self) -> Response {
        let (status, error) = match &self {
            BridgeError::Admission => (StatusCode::SERVICE_UNAVAILABLE, "too_many_requests"),
            BridgeError::FatalIndex(_) => (StatusCode::INTERNAL_SERVER_ERROR, "fatal_index_error"),
            BridgeError::Unsupported(_) => (StatusCode::NOT_IMPLEMENTED, "unsupported"),
            BridgeError::UuidReconcile { .. } => {
                (StatusCode::INTERNAL_SERVER_ERROR, "uuid_reconcile_failed")
            }
            BridgeError::IndexMissing(_) => (StatusCode::NOT_FOUND, "not_found"),
            BridgeError::Transport(_) => (StatusCode::INTERNAL_SERVER_ERROR, "transport_error"),
            BridgeError::Interrupted => (StatusCode::INTERNAL_SERVER_ERROR, "interrupted"),
        };
        let body = ErrorEnvelope {
            error,
            reason: self.to_string(),
        };
        (status, Json(body)).into_response()
    }
}

async fn welcome(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    Json(state.meta.welcome())
}

async fn health() -> impl IntoResponse {
    Json(serde_json::json!({"status": "ok"}))
}

async fn stats(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    Json(state.admission.snapshot())
}

async fn database_exists(
    State(state): State<Arc<AppState>>,
    Path(db): Path<String>,
) -> Result<StatusCode, BridgeError> {
    let db = DatabaseRef::parse(&db);
    if state.meta.database_exists(&db).await? {
        Ok(StatusCode::OK)
    } else {
        Ok(StatusCode::NOT_FOUND)
    }
}

async fn get_database_details(
    State(state): State<Arc<AppState>>,
    Path(db): Path<String>,
) -> Result<Response, BridgeError> {
    let db = DatabaseRef::parse(&db);
    let details = state.meta.get_database_details(&db).await?;
    Ok(Json(details).into_response())
}

async fn revs_diff(
    State(state): State<Arc<AppState>>,
    Path(db): Path<String>,
    Json(candidates): Json<HashMap<String, String>>,
) -> Result<Response, BridgeError> {
    let permit = state.admission.admit(Endpoint::RevsDiff)?;
    let db = DatabaseRef::parse(&db);
    let result = state.revs_diff.revs_diff(&db.index, &candidates).await?;
    drop(permit);
    Ok((StatusCode::OK, Json(result)).into_response())
}

#[derive(serde::Deserialize)]
struct BulkDocsBody {
    docs: Vec<Mutation>,
}

async fn bulk_docs(
    State(state): State<Arc<AppState>>,
    Path(db): Path<String>,
    Json(body): Json<BulkDocsBody>,
) -> Result<Response, BridgeError> {
    let permit = state.admission.admit(Endpoint::Bulk)?;
    let db = DatabaseRef::parse(&db);
    let acks = state.bulk_docs.bulk_docs(&db.index, body.docs).await?;
    drop(permit);
    Ok((StatusCode::CREATED, Json(acks)).into_response())
}

async fn ensure_full_commit(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    Json(state.meta.ensure_full_commit())
}

async fn get_local_doc(
    State(state): State<Arc<AppState>>,
    Path((db, id)): Path<(String, String)>,
) -> Result<Response, BridgeError> {
    let db = DatabaseRef::parse(&db);
    match state.checkpoints.get(&db.index, &id).await? {
        Some(doc) => Ok(Json(doc).into_response()),
        None => {
            warn!(db = %db.index, id, "local doc not found");
            Ok((
                StatusCode::NOT_FOUND,
                Json(serde_json::json!({"error": "not_found", "reason": "missing"})),
            )
                .into_response())
        }
    }
}

async fn put_local_doc(
    State(state): State<Arc<AppState>>,
    Path((db, id)): Path<(String, String)>,
    Json(payload): Json<Value>,
) -> Result<Response, BridgeError> {
    let db = DatabaseRef::parse(&db);
    let rev = state.checkpoints.put(&db.index, &id, payload).await?;
    Ok((StatusCode::CREATED, Json(serde_json::json!({"ok": true, "rev": rev}))).into_response())
}
