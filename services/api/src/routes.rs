use crate::infra::AppState;
use axum::http::{header, StatusCode};
use axum::response::IntoResponse;
use axum::Extension;
use axum::Json;
use serde::Serialize;
use serde_json::json;
use std::sync::Arc;
use tenant_screening::workflows::screening::{
    screening_router, FailurePolicy, ScreeningRepository, ScreeningService,
};

#[derive(Debug, Serialize)]
pub(crate) struct PipelineStage {
    pub(crate) name: String,
    pub(crate) wave: usize,
    pub(crate) dependencies: Vec<String>,
}

#[derive(Debug, Serialize)]
pub(crate) struct PipelineResponse {
    pub(crate) waves: Vec<Vec<String>>,
    pub(crate) stages: Vec<PipelineStage>,
    pub(crate) failure_policy: FailurePolicy,
    pub(crate) stage_timeout_ms: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub(crate) screening_timeout_ms: Option<u64>,
    pub(crate) active_screenings: usize,
}

pub(crate) fn with_screening_routes<R>(service: Arc<ScreeningService<R>>) -> axum::Router
where
    R: ScreeningRepository + 'static,
{
    screening_router(service)
        .route("/health", axum::routing::get(healthcheck))
        .route("/ready", axum::routing::get(readiness_endpoint))
        .route("/metrics", axum::routing::get(metrics_endpoint))
        .route("/api/v1/pipeline", axum::routing::get(pipeline_endpoint))
}

pub(crate) async fn healthcheck() -> Json<serde_json::Value> {
    Json(json!({ "status": "ok" }))
}

pub(crate) async fn readiness_endpoint(Extension(state): Extension<AppState>) -> impl IntoResponse {
    let ready = state.readiness.load(std::sync::atomic::Ordering::Relaxed);
    let status = if ready {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    };

    let payload = if ready {
        json!({ "status": "ready" })
    } else {
        json!({ "status": "initializing" })
    };

    (status, Json(payload))
}

pub(crate) async fn metrics_endpoint(Extension(state): Extension<AppState>) -> impl IntoResponse {
    (
        StatusCode::OK,
        [(header::CONTENT_TYPE, "text/plain; version=0.0.4")],
        state.metrics.render(),
    )
}

pub(crate) async fn pipeline_endpoint(
    Extension(state): Extension<AppState>,
) -> Json<PipelineResponse> {
    let orchestrator = &state.orchestrator;
    let plan = orchestrator.plan();
    let graph = orchestrator.graph();
    let config = orchestrator.config();

    let stages = plan
        .waves()
        .iter()
        .enumerate()
        .flat_map(|(wave, names)| {
            names.iter().map(move |name| PipelineStage {
                name: name.clone(),
                wave,
                dependencies: graph.dependencies(name).unwrap_or_default().to_vec(),
            })
        })
        .collect();

    Json(PipelineResponse {
        waves: plan.waves().to_vec(),
        stages,
        failure_policy: config.failure_policy,
        stage_timeout_ms: config.stage_timeout.as_millis() as u64,
        screening_timeout_ms: config
            .screening_timeout
            .map(|limit| limit.as_millis() as u64),
        active_screenings: orchestrator.active_screenings().len(),
    })
}
