use axum::{
    extract::{rejection::JsonRejection, Path, State},
    http::StatusCode,
    routing::{get, post},
    Json, Router,
};
use std::sync::Arc;
use std::time::Duration;

use crate::models::{AcceptedResponse, ApiError, JobReport, ProvisionRequest};
use crate::state::{ProvisionRegistry, RegistryError};

pub struct StubState {
    pub registry: Arc<ProvisionRegistry>,
    /// Held before answering each mutating request.
    pub delay: Duration,
}

pub type AppState = Arc<StubState>;

impl StubState {
    pub fn new(registry: Arc<ProvisionRegistry>, delay: Duration) -> AppState {
        Arc::new(Self { registry, delay })
    }
}

pub fn create_router(state: AppState) -> Router {
    Router::new()
        .route("/create-server", post(create_server))
        .route("/destroy-server", post(destroy_server))
        .route("/job/{job_id}", get(job_status))
        .with_state(state)
}

type ApiResult = Result<Json<AcceptedResponse>, (StatusCode, Json<ApiError>)>;

async fn create_server(
    State(state): State<AppState>,
    payload: Result<Json<ProvisionRequest>, JsonRejection>,
) -> ApiResult {
    let request = parse_request(payload)?;
    hold(&state).await;

    match state.registry.create(request).await {
        Ok(job) => {
            tracing::info!(instance = %job.instance_name, job_id = %job.id, "create accepted");
            Ok(Json(AcceptedResponse {
                message: Some("Deployment started".to_string()),
                job_id: Some(job.id),
            }))
        }
        Err(e) => Err(error_to_response(e)),
    }
}

async fn destroy_server(
    State(state): State<AppState>,
    payload: Result<Json<ProvisionRequest>, JsonRejection>,
) -> ApiResult {
    let request = parse_request(payload)?;
    hold(&state).await;

    match state.registry.destroy(request).await {
        Ok(job) => {
            tracing::info!(instance = %job.instance_name, job_id = %job.id, "destroy accepted");
            Ok(Json(AcceptedResponse {
                message: Some("Destroy started".to_string()),
                job_id: Some(job.id),
            }))
        }
        Err(e) => Err(error_to_response(e)),
    }
}

async fn job_status(State(state): State<AppState>, Path(job_id): Path<String>) -> Json<JobReport> {
    match state.registry.job(&job_id).await {
        Some(job) => match serde_json::to_value(&job) {
            Ok(result) => Json(JobReport::finished(result)),
            Err(e) => {
                tracing::error!(job_id = %job_id, error = %e, "failed to serialize job");
                Json(JobReport::not_found())
            }
        },
        None => Json(JobReport::not_found()),
    }
}

/// Rejected bodies are answered with the extractor's status and a `{detail}`
/// body, like every other error from this service.
fn parse_request(
    payload: Result<Json<ProvisionRequest>, JsonRejection>,
) -> Result<ProvisionRequest, (StatusCode, Json<ApiError>)> {
    let Json(request) = payload.map_err(|rejection| {
        tracing::warn!(status = %rejection.status(), error = %rejection, "rejected request body");
        (rejection.status(), Json(ApiError::new(rejection.body_text())))
    })?;
    check_request(&request)?;
    Ok(request)
}

fn check_request(request: &ProvisionRequest) -> Result<(), (StatusCode, Json<ApiError>)> {
    if request.user.trim().is_empty() || request.device_id.trim().is_empty() {
        return Err((
            StatusCode::UNPROCESSABLE_ENTITY,
            Json(ApiError::new("user and device_id must not be empty")),
        ));
    }
    Ok(())
}

async fn hold(state: &StubState) {
    if !state.delay.is_zero() {
        tokio::time::sleep(state.delay).await;
    }
}

fn error_to_response(error: RegistryError) -> (StatusCode, Json<ApiError>) {
    match &error {
        RegistryError::InstanceAlreadyExists(_) => {
            (StatusCode::CONFLICT, Json(ApiError::new(error.to_string())))
        }
        RegistryError::InstanceNotFound(_) => {
            (StatusCode::NOT_FOUND, Json(ApiError::new(error.to_string())))
        }
    }
}
