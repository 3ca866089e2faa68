//! HTTP boundary: pull-and-execute, resource-status lookup, full status
//! sync, and liveness.
//!
//! Handlers translate the engine's error taxonomy into structured JSON
//! bodies: 400 for missing parameters or identity mismatch, 422 for
//! malformed identifiers, 404 for a missing work unit, 503 when the job
//! manager or the hub is unavailable. Batch execution is always best effort:
//! one Degraded job never aborts its siblings.

pub mod jobmanager;

use crate::config::EngineConfig;
use crate::jobs::types::{Job, Resource};
use crate::jobs::Dispatcher;
use crate::work::WorkStore;
use axum::extract::{Query, State};
use axum::http::{HeaderMap, StatusCode};
use axum::response::{IntoResponse, Json, Response};
use axum::routing::{get, post};
use axum::Router;
use jobmanager::JobManagerClient;
use kube::ResourceExt;
use serde::Deserialize;
use serde_json::{json, Value};
use std::sync::Arc;
use tracing::{error, info, warn};

#[derive(Clone)]
pub struct AppState {
    pub dispatcher: Arc<Dispatcher>,
    pub store: Arc<dyn WorkStore>,
    pub jobmanager: JobManagerClient,
    pub config: Arc<EngineConfig>,
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/jobs/pull", post(pull_jobs))
        .route("/resource/status", get(resource_status))
        .route("/resource/sync", post(sync_resources))
        .with_state(state)
}

#[derive(Debug)]
pub enum ApiError {
    MissingParam(&'static str),
    MissingBearer,
    InvalidUid(String),
    UidMismatch { expected: String, actual: String },
    NotFound(String),
    Upstream(String),
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, message) = match self {
            ApiError::MissingParam(name) => (
                StatusCode::BAD_REQUEST,
                format!("missing required query parameter: {name}"),
            ),
            ApiError::MissingBearer => (
                StatusCode::BAD_REQUEST,
                "missing bearer token".to_string(),
            ),
            ApiError::InvalidUid(uid) => {
                (StatusCode::UNPROCESSABLE_ENTITY, format!("malformed UID: {uid}"))
            }
            ApiError::UidMismatch { expected, actual } => (
                StatusCode::BAD_REQUEST,
                format!("work unit UID {actual} does not match requested UID {expected}"),
            ),
            ApiError::NotFound(name) => {
                (StatusCode::NOT_FOUND, format!("work unit not found: {name}"))
            }
            ApiError::Upstream(message) => (StatusCode::SERVICE_UNAVAILABLE, message),
        };
        (status, Json(json!({ "error": message }))).into_response()
    }
}

fn bearer_token(headers: &HeaderMap) -> Result<&str, ApiError> {
    headers
        .get(axum::http::header::AUTHORIZATION)
        .and_then(|value| value.to_str().ok())
        .and_then(|value| value.strip_prefix("Bearer "))
        .ok_or(ApiError::MissingBearer)
}

async fn health() -> Json<Value> {
    Json(json!({
        "status": "healthy",
        "service": "deploy-controller",
        "version": env!("CARGO_PKG_VERSION")
    }))
}

/// Fetch the executable batch from the job manager, execute every job and
/// push each updated job back. The response is the best-effort updated list.
async fn pull_jobs(
    State(state): State<AppState>,
    headers: HeaderMap,
) -> Result<Json<Vec<Job>>, ApiError> {
    let bearer = bearer_token(&headers)?;

    let mut jobs = state
        .jobmanager
        .fetch_executable_jobs(bearer)
        .await
        .map_err(|e| ApiError::Upstream(format!("failed to fetch executable jobs: {e}")))?;
    info!("pulled {} executable jobs", jobs.len());

    for job in &mut jobs {
        if let Err(e) = state.dispatcher.execute(job).await {
            error!(job_id = %job.id, "job execution failed: {e}");
        }
        if let Err(e) = state.jobmanager.update_job(bearer, job).await {
            error!(job_id = %job.id, "failed to report job back to the job manager: {e}");
        }
    }

    Ok(Json(jobs))
}

#[derive(Deserialize)]
struct ResourceStatusParams {
    uid: Option<String>,
    node_target: Option<String>,
    manifest_name: Option<String>,
}

/// Look up the live status of one submitted work unit by cluster and name,
/// verifying it still carries the UID the caller tracked.
async fn resource_status(
    State(state): State<AppState>,
    Query(params): Query<ResourceStatusParams>,
) -> Result<Json<Resource>, ApiError> {
    let uid = params.uid.ok_or(ApiError::MissingParam("uid"))?;
    let cluster = params
        .node_target
        .ok_or(ApiError::MissingParam("node_target"))?;
    let name = params
        .manifest_name
        .ok_or(ApiError::MissingParam("manifest_name"))?;

    uuid::Uuid::parse_str(&uid).map_err(|_| ApiError::InvalidUid(uid.clone()))?;

    let work = state.store.get(&cluster, &name).await.map_err(|e| {
        if e.is_not_found() {
            ApiError::NotFound(name.clone())
        } else {
            ApiError::Upstream(format!("failed to fetch work unit: {e}"))
        }
    })?;

    let actual_uid = work.uid().unwrap_or_default();
    if actual_uid != uid {
        return Err(ApiError::UidMismatch {
            expected: uid,
            actual: actual_uid,
        });
    }

    Ok(Json(resource_view(&work)))
}

/// Push the status of every known work unit across the managed clusters to
/// the job manager. Individual failures are logged; the summary reports how
/// many statuses were pushed.
async fn sync_resources(
    State(state): State<AppState>,
    headers: HeaderMap,
) -> Result<Json<Value>, ApiError> {
    let bearer = bearer_token(&headers)?;

    let mut resources = Vec::new();
    for cluster in &state.config.managed_clusters {
        match state.store.list(cluster).await {
            Ok(works) => resources.extend(works.iter().map(resource_view)),
            Err(e) => warn!("failed to list work units in {cluster}: {e}"),
        }
    }

    let total = resources.len();
    let results = futures::future::join_all(
        resources
            .iter()
            .map(|resource| state.jobmanager.update_resource_status(bearer, resource)),
    )
    .await;

    let mut synced = 0usize;
    for (resource, result) in resources.iter().zip(results) {
        match result {
            Ok(()) => synced += 1,
            Err(e) => warn!(
                "failed to sync status of {}: {e}",
                resource.resource_name
            ),
        }
    }
    info!("synced {synced}/{total} resource statuses");

    Ok(Json(json!({ "synced": synced, "total": total })))
}

/// Project a work unit into the job manager's resource shape.
fn resource_view(work: &crate::crds::ManifestWork) -> Resource {
    let conditions = work
        .status
        .as_ref()
        .map(|status| status.conditions.clone())
        .unwrap_or_default();
    Resource {
        resource_uid: work.uid().unwrap_or_default(),
        job_id: String::new(),
        resource_name: work.name_any(),
        conditions,
        remediations: Vec::new(),
    }
}
