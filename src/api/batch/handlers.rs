use axum::extract::{Path, Query, State};
use axum::Json;

use crate::api::errors::ApiError;
use crate::api::guards::OperatorAuth;
use crate::core::state::AppState;
use crate::db::types::BatchJobStatus;
use crate::repositories::batch_jobs::JobCompletion;
use crate::schemas::batch::{BatchJobResponse, JobListQuery, ProcessQuery};
use crate::services::remote_error::RemoteError;
use crate::tasks::batch::{BatchPipeline, RunOptions, RunReport};

const DEFAULT_LIST_LIMIT: i64 = 50;

/// Runs one sync-and-queue pass on demand.
pub(super) async fn process(
    _auth: OperatorAuth,
    State(state): State<AppState>,
    Query(query): Query<ProcessQuery>,
) -> Result<Json<RunReport>, ApiError> {
    let options =
        RunOptions { skip_new_work: query.skip_new_work, max_new_jobs: query.max_new_jobs };

    let report = BatchPipeline::from_state(&state)
        .run_once(options)
        .await
        .map_err(|err| ApiError::internal(err, "Batch pass failed"))?;

    Ok(Json(report))
}

pub(super) async fn list_jobs(
    _auth: OperatorAuth,
    State(state): State<AppState>,
    Query(query): Query<JobListQuery>,
) -> Result<Json<Vec<BatchJobResponse>>, ApiError> {
    let status = match query.status.as_deref() {
        Some(raw) => Some(
            BatchJobStatus::parse(raw)
                .ok_or_else(|| ApiError::BadRequest(format!("Unknown job status '{raw}'")))?,
        ),
        None => None,
    };

    let jobs = state.store().list_jobs(status, query.limit.unwrap_or(DEFAULT_LIST_LIMIT)).await?;

    Ok(Json(jobs.into_iter().map(BatchJobResponse::from_db).collect()))
}

pub(super) async fn get_job(
    _auth: OperatorAuth,
    State(state): State<AppState>,
    Path(job_id): Path<String>,
) -> Result<Json<BatchJobResponse>, ApiError> {
    let job = state
        .store()
        .job(&job_id)
        .await?
        .ok_or_else(|| ApiError::NotFound("Batch job not found".to_string()))?;

    Ok(Json(BatchJobResponse::from_db(job)))
}

/// Cancels the remote job, then closes the local record. A remote job that no longer
/// exists is closed all the same.
pub(super) async fn cancel_job(
    _auth: OperatorAuth,
    State(state): State<AppState>,
    Path(job_id): Path<String>,
) -> Result<Json<BatchJobResponse>, ApiError> {
    let store = state.store();
    let job = store
        .job(&job_id)
        .await?
        .ok_or_else(|| ApiError::NotFound("Batch job not found".to_string()))?;

    if !job.is_active() {
        return Err(ApiError::Conflict(format!("Batch job is already {}", job.status.as_str())));
    }

    match state.provider().cancel(&job.remote_ref).await {
        Ok(()) | Err(RemoteError::NotFound(_)) => {}
        Err(err) => {
            tracing::warn!(job_id = %job.id, remote_ref = %job.remote_ref, error = %err, "Remote cancel failed");
            return Err(ApiError::BadGateway(format!("Remote cancel failed: {err}")));
        }
    }

    let closed = store
        .complete_job(
            &job.id,
            JobCompletion {
                status: BatchJobStatus::Cancelled,
                completed_pages: None,
                failed_pages: None,
                provider_state: None,
                error_message: Some("cancelled by operator".to_string()),
            },
        )
        .await?;
    if !closed {
        return Err(ApiError::Conflict("Batch job was closed concurrently".to_string()));
    }

    tracing::info!(job_id = %job.id, remote_ref = %job.remote_ref, "Batch job cancelled");
    metrics::counter!("batch_jobs_synced_total", "status" => "cancelled").increment(1);

    let job = store
        .job(&job.id)
        .await?
        .ok_or_else(|| ApiError::NotFound("Batch job not found".to_string()))?;
    Ok(Json(BatchJobResponse::from_db(job)))
}
