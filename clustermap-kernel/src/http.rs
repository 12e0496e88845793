/**
 * API REST CLUSTERMAP - Exposition du snapshot cluster
 *
 * RÔLE :
 * Interface HTTP entre le dashboard/CLI et le snapshot publié par le poller.
 * Lecture seule : aucune route ne déclenche de commande sur le cluster.
 *
 * ROUTES :
 * - GET  /health            -> "ok" (toujours accessible)
 * - GET  /status            -> santé du poller + âge du snapshot
 * - GET  /nodes             -> ?partition=&state=
 * - GET  /jobs              -> ?partition=&user=&state=
 * - GET  /partitions        -> agrégats par partition
 * - GET  /reasons[/{code}]  -> catalogue des raisons d'attente
 * - POST /eta               -> estimation du temps d'attente
 *
 * Tant qu'aucun snapshot n'existe : 503 + {"detail": "..."} + Retry-After.
 *
 * SÉCURITÉ :
 * Si une clé API est configurée, header x-api-key obligatoire sauf /health.
 */

use axum::extract::{Path, Query, Request, State};
use axum::http::{header, StatusCode};
use axum::middleware::{self, Next};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::Serialize;
use std::sync::Arc;
use tracing::warn;

use crate::health::{HealthTracker, KernelHealth};
use crate::models::{EtaEstimate, JobSpec, PartitionSummary};
use crate::query::{ClusterQuery, JobFilter, JobsView, NodeFilter, NodesView, QueryError};
use crate::reasons::{normalize_reason, ReasonCatalog, ReasonInfo};
use crate::state::SharedStore;

#[derive(Clone)]
pub struct AppState {
    pub query: ClusterQuery,
    pub store: SharedStore,
    pub health: HealthTracker,
    pub api_key: Option<Arc<str>>,
}

impl AppState {
    pub fn new(store: SharedStore, health: HealthTracker, api_key: Option<String>) -> Self {
        Self {
            query: ClusterQuery::new(store.clone()),
            store,
            health,
            api_key: api_key.map(Arc::from),
        }
    }
}

impl IntoResponse for QueryError {
    fn into_response(self) -> Response {
        let body = Json(serde_json::json!({ "detail": self.to_string() }));
        (StatusCode::SERVICE_UNAVAILABLE, [(header::RETRY_AFTER, "5")], body).into_response()
    }
}

async fn require_api_key(State(app): State<AppState>, req: Request, next: Next) -> Result<Response, StatusCode> {
    // Health check toujours accessible
    if req.uri().path() == "/health" {
        return Ok(next.run(req).await);
    }
    let Some(expected) = app.api_key.as_deref() else {
        return Ok(next.run(req).await);
    };

    let ok = req
        .headers()
        .get("x-api-key")
        .and_then(|v| v.to_str().ok())
        .is_some_and(|v| v == expected);

    if !ok {
        warn!(path = %req.uri().path(), "rejected request with missing or wrong api key");
        return Err(StatusCode::UNAUTHORIZED);
    }
    Ok(next.run(req).await)
}

pub fn build_router(app_state: AppState) -> Router {
    Router::new()
        .route("/health", get(|| async { "ok" }))
        .route("/status", get(get_status))
        .route("/nodes", get(get_nodes))
        .route("/jobs", get(get_jobs))
        .route("/partitions", get(get_partitions))
        .route("/reasons", get(get_reasons))
        .route("/reasons/{code}", get(get_reason))
        .route("/eta", post(post_eta))
        .layer(middleware::from_fn_with_state(app_state.clone(), require_api_key))
        .with_state(app_state)
}

// GET /status
async fn get_status(State(app): State<AppState>) -> Json<KernelHealth> {
    Json(app.health.get_health(&app.store))
}

// GET /nodes
async fn get_nodes(
    State(app): State<AppState>,
    Query(filter): Query<NodeFilter>,
) -> Result<Json<NodesView>, QueryError> {
    app.query.get_nodes_filtered(&filter).map(Json)
}

// GET /jobs
async fn get_jobs(
    State(app): State<AppState>,
    Query(filter): Query<JobFilter>,
) -> Result<Json<JobsView>, QueryError> {
    app.query.get_jobs_filtered(&filter).map(Json)
}

// GET /partitions
async fn get_partitions(State(app): State<AppState>) -> Result<Json<Vec<PartitionSummary>>, QueryError> {
    app.query.get_partitions().map(Json)
}

// GET /reasons
async fn get_reasons(State(app): State<AppState>) -> Json<&'static ReasonCatalog> {
    Json(app.query.reason_catalog())
}

#[derive(Serialize)]
struct ReasonView {
    code: String,
    #[serde(flatten)]
    info: &'static ReasonInfo,
}

// GET /reasons/{code}
async fn get_reason(State(app): State<AppState>, Path(code): Path<String>) -> Result<Json<ReasonView>, StatusCode> {
    let info = app.query.reason_catalog().lookup(&code).ok_or(StatusCode::NOT_FOUND)?;
    Ok(Json(ReasonView { code: normalize_reason(&code).to_string(), info }))
}

// POST /eta
async fn post_eta(State(app): State<AppState>, Json(spec): Json<JobSpec>) -> Result<Json<EtaEstimate>, QueryError> {
    app.query.estimate_eta(&spec).map(Json)
}
