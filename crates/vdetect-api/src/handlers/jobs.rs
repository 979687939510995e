//! Job status and cancellation handlers.

use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::Json;
use serde::Serialize;

use vdetect_models::{JobId, JobRecord};

use crate::error::{ApiError, ApiResult};
use crate::state::AppState;

/// Job list response.
#[derive(Debug, Serialize)]
pub struct JobListResponse {
    pub jobs: Vec<JobRecord>,
    pub total: usize,
}

/// Get a single job record.
pub async fn get_job(
    State(state): State<AppState>,
    Path(job_id): Path<String>,
) -> ApiResult<Json<JobRecord>> {
    state
        .jobs()
        .get(&JobId::from_string(&job_id))
        .await
        .map(Json)
        .ok_or_else(|| ApiError::not_found(format!("Job {}", job_id)))
}

/// List all jobs, newest first.
pub async fn list_jobs(State(state): State<AppState>) -> Json<JobListResponse> {
    let jobs = state.jobs().list().await;
    Json(JobListResponse {
        total: jobs.len(),
        jobs,
    })
}

/// Request cancellation of a queued or running job.
///
/// Returns the record as it was when cancellation was requested; the job
/// moves to `failed` once it observes the request.
pub async fn cancel_job(
    State(state): State<AppState>,
    Path(job_id): Path<String>,
) -> ApiResult<(StatusCode, Json<JobRecord>)> {
    let record = state.executor.cancel(&JobId::from_string(job_id)).await?;
    Ok((StatusCode::ACCEPTED, Json(record)))
}
