use std::sync::Arc;

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
    Router,
};
use serde::Deserialize;
use serde_json::json;
use tracing::warn;

use super::domain::{ApplicationId, ScreeningSubmission};
use super::repository::{RepositoryError, ScreeningRepository};
use super::service::{ScreeningService, ScreeningServiceError};

#[derive(Debug, Default, Deserialize)]
pub(crate) struct SubmitParams {
    #[serde(default)]
    wait: bool,
}

/// Router builder exposing HTTP endpoints for intake, status, and reports.
pub fn screening_router<R>(service: Arc<ScreeningService<R>>) -> Router
where
    R: ScreeningRepository + 'static,
{
    Router::new()
        .route("/api/v1/screenings", post(submit_handler::<R>))
        .route(
            "/api/v1/screenings/:application_id",
            get(status_handler::<R>),
        )
        .route(
            "/api/v1/screenings/:application_id/report",
            get(report_handler::<R>),
        )
        .with_state(service)
}

pub(crate) async fn submit_handler<R>(
    State(service): State<Arc<ScreeningService<R>>>,
    Query(params): Query<SubmitParams>,
    axum::Json(submission): axum::Json<ScreeningSubmission>,
) -> Response
where
    R: ScreeningRepository + 'static,
{
    let record = match service.submit(submission) {
        Ok(record) => record,
        Err(error) => return error_response(error),
    };
    let application_id = record.application_id.clone();

    if params.wait {
        return match service.screen(&application_id).await {
            Ok(screened) => match screened.report {
                Some(report) => (StatusCode::OK, axum::Json(report)).into_response(),
                None => (StatusCode::OK, axum::Json(screened.status_view())).into_response(),
            },
            Err(error) => error_response(error),
        };
    }

    let background = Arc::clone(&service);
    tokio::spawn(async move {
        if let Err(error) = background.screen(&application_id).await {
            warn!(application_id = %application_id, %error, "background screening failed");
        }
    });

    (StatusCode::ACCEPTED, axum::Json(record.status_view())).into_response()
}

pub(crate) async fn status_handler<R>(
    State(service): State<Arc<ScreeningService<R>>>,
    Path(application_id): Path<String>,
) -> Response
where
    R: ScreeningRepository + 'static,
{
    let id = ApplicationId(application_id);
    match service.get(&id) {
        Ok(record) => (StatusCode::OK, axum::Json(record.status_view())).into_response(),
        Err(error) => error_response(error),
    }
}

pub(crate) async fn report_handler<R>(
    State(service): State<Arc<ScreeningService<R>>>,
    Path(application_id): Path<String>,
) -> Response
where
    R: ScreeningRepository + 'static,
{
    let id = ApplicationId(application_id);
    match service.get(&id) {
        Ok(record) => match record.report {
            Some(report) => (StatusCode::OK, axum::Json(report)).into_response(),
            None => {
                let payload = json!({
                    "error": "screening report not available yet",
                    "application_id": id.0,
                    "status": record.status.label(),
                });
                (StatusCode::CONFLICT, axum::Json(payload)).into_response()
            }
        },
        Err(error) => error_response(error),
    }
}

fn error_response(error: ScreeningServiceError) -> Response {
    let status = match &error {
        ScreeningServiceError::Validation(_) => StatusCode::UNPROCESSABLE_ENTITY,
        ScreeningServiceError::Repository(RepositoryError::NotFound) => StatusCode::NOT_FOUND,
        ScreeningServiceError::Repository(RepositoryError::Conflict)
        | ScreeningServiceError::Repository(RepositoryError::NotClaimable(_))
        | ScreeningServiceError::NotScreenable { .. } => StatusCode::CONFLICT,
        ScreeningServiceError::Repository(RepositoryError::Unavailable(_))
        | ScreeningServiceError::Orchestrator(_) => StatusCode::INTERNAL_SERVER_ERROR,
    };

    let payload = json!({
        "error": error.to_string(),
    });
    (status, axum::Json(payload)).into_response()
}
