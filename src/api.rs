use std::sync::Arc;

use axum::{
    extract::State,
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use metrics_exporter_prometheus::PrometheusHandle;
use serde::Serialize;
use tower_http::cors::CorsLayer;

use crate::app::Relay;
use crate::ingest::normalize_item;
use crate::model::UpstreamItem;
use crate::orchestrator::OperationPlan;
use crate::pipeline::PipelineStats;
use crate::resilience::UpstreamStatus;

#[derive(Clone)]
pub struct AppState {
    pub relay: Arc<Relay>,
    pub metrics: Option<PrometheusHandle>,
}

pub fn create_router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(|| async { "ok" }))
        .route("/status", get(status))
        .route("/metrics", get(metrics))
        .route("/events", post(ingest_event))
        .route("/plans/run", post(run_plan))
        .layer(CorsLayer::very_permissive())
        .with_state(state)
}

#[derive(Serialize)]
struct StatusReport {
    upstreams: Vec<UpstreamStatus>,
    pipeline: PipelineStats,
    dedup_entries: usize,
    operation_kinds: Vec<String>,
}

async fn status(State(state): State<AppState>) -> Json<StatusReport> {
    let relay = &state.relay;
    Json(StatusReport {
        upstreams: relay.fetchers.iter().map(|f| f.status()).collect(),
        pipeline: relay.pipeline.stats(),
        dedup_entries: relay.pipeline.dedup().len(),
        operation_kinds: relay.orchestrator.registry().kinds(),
    })
}

async fn metrics(State(state): State<AppState>) -> Response {
    match &state.metrics {
        Some(h) => h.render().into_response(),
        None => (StatusCode::NOT_FOUND, "metrics recorder not installed").into_response(),
    }
}

fn error_json(code: StatusCode, msg: impl Into<String>) -> Response {
    (code, Json(serde_json::json!({ "error": msg.into() }))).into_response()
}

/// Webhook intake: one item, straight through the pipeline.
async fn ingest_event(State(state): State<AppState>, Json(item): Json<UpstreamItem>) -> Response {
    let Some(item) = normalize_item(item) else {
        return error_json(StatusCode::UNPROCESSABLE_ENTITY, "item id must not be blank");
    };
    let outcome = state.relay.pipeline.process(item).await;
    Json(outcome).into_response()
}

async fn run_plan(State(state): State<AppState>, Json(plan): Json<OperationPlan>) -> Response {
    let deadline = state.relay.plan_deadline();
    match state.relay.orchestrator.run(&plan, deadline).await {
        Ok(report) => Json(report).into_response(),
        Err(e) => error_json(StatusCode::BAD_REQUEST, e.to_string()),
    }
}
