//! Job submission and status handlers.

use std::sync::Arc;

use axum::extract::{Path, State};
use axum::Json;
use serde::{Deserialize, Serialize};

use atelier_core::{JobId, JobRecord, JobStatus, PackageId, UserId};
use atelier_engine::{GenerationRequest, MediaKind, SubmitRequest};
use atelier_store::Store;

use crate::error::ApiError;
use crate::state::AppState;

/// Job submission request.
#[derive(Debug, Deserialize)]
pub struct SubmitJobRequest {
    /// The user paying for the job.
    pub user_id: String,
    /// Credits to deduct up front.
    pub unit_cost: i64,
    /// Parent package, when the job belongs to a batch.
    #[serde(default)]
    pub package_id: Option<String>,
    /// Media kind to produce.
    pub kind: MediaKind,
    /// Text prompt.
    pub prompt: String,
    /// Output width in pixels.
    pub width: u32,
    /// Output height in pixels.
    pub height: u32,
    /// Clip length for video jobs.
    #[serde(default)]
    pub duration_secs: Option<u32>,
}

/// Job response.
#[derive(Debug, Serialize)]
pub struct JobResponse {
    /// Job ID.
    pub id: String,
    /// The user charged.
    pub user_id: String,
    /// Parent package, if any.
    pub package_id: Option<String>,
    /// Current status.
    pub status: JobStatus,
    /// Provider-side job ID, if dispatched.
    pub external_job_id: Option<String>,
    /// Credits deducted at submission.
    pub unit_cost: i64,
    /// Artifact references (completed jobs).
    pub result_refs: Vec<String>,
    /// Failure detail (failed jobs).
    pub error_message: Option<String>,
    /// Submission instant.
    pub created_at: String,
    /// Terminal instant, if reached.
    pub completed_at: Option<String>,
}

impl From<&JobRecord> for JobResponse {
    fn from(job: &JobRecord) -> Self {
        Self {
            id: job.id.to_string(),
            user_id: job.user_id.to_string(),
            package_id: job.package_id.map(|id| id.to_string()),
            status: job.status,
            external_job_id: job.external_job_id.clone(),
            unit_cost: job.unit_cost,
            result_refs: job.result_refs.clone(),
            error_message: job.error_message.clone(),
            created_at: job.created_at.to_rfc3339(),
            completed_at: job.completed_at.map(|t| t.to_rfc3339()),
        }
    }
}

/// Submit a generation job.
pub async fn submit_job(
    State(state): State<Arc<AppState>>,
    Json(body): Json<SubmitJobRequest>,
) -> Result<Json<JobResponse>, ApiError> {
    let user_id: UserId = body
        .user_id
        .parse()
        .map_err(|_| ApiError::BadRequest("Invalid user ID".into()))?;
    let package_id: Option<PackageId> = body
        .package_id
        .as_deref()
        .map(str::parse)
        .transpose()
        .map_err(|_| ApiError::BadRequest("Invalid package ID".into()))?;

    if body.unit_cost <= 0 {
        return Err(ApiError::BadRequest("unit_cost must be positive".into()));
    }
    if body.prompt.trim().is_empty() {
        return Err(ApiError::BadRequest("prompt must not be empty".into()));
    }

    let job = state
        .lifecycle
        .submit(SubmitRequest {
            user_id,
            unit_cost: body.unit_cost,
            package_id,
            request: GenerationRequest {
                kind: body.kind,
                prompt: body.prompt,
                width: body.width,
                height: body.height,
                duration_secs: body.duration_secs,
            },
        })
        .await?;

    Ok(Json(JobResponse::from(&job)))
}

/// Read a job row for progress display.
pub async fn get_job(
    State(state): State<Arc<AppState>>,
    Path(job_id): Path<String>,
) -> Result<Json<JobResponse>, ApiError> {
    let job_id: JobId = job_id
        .parse()
        .map_err(|_| ApiError::BadRequest("Invalid job ID".into()))?;

    let job = state
        .store
        .get_job(&job_id)?
        .ok_or_else(|| ApiError::NotFound("Job not found".into()))?;

    Ok(Json(JobResponse::from(&job)))
}
