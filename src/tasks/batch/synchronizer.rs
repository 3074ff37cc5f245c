use std::collections::{HashMap, HashSet};

use thiserror::Error;

use super::{BatchPipeline, JobDetail, RunReport};
use crate::core::time::{primitive_now_utc, window_elapsed};
use crate::db::models::{BatchJob, StageResult};
use crate::db::types::{BatchJobStatus, ResultSource};
use crate::repositories::batch_jobs::JobCompletion;
use crate::repositories::store::StoreError;
use crate::services::batch_provider::{states, PollOutcome, ResultItem, ResultLocation};
use crate::services::remote_error::RemoteError;

#[derive(Debug, Error)]
pub(super) enum SyncError {
    #[error(transparent)]
    Store(#[from] StoreError),
    #[error(transparent)]
    Remote(#[from] RemoteError),
}

/// What one sync step did to a job.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(super) enum JobOutcome {
    StillRunning { provider_state: String },
    Saved { completed: i32, failed: i32, item_errors: Vec<String> },
    Failed { message: String },
    Expired { message: String },
    Cancelled,
    /// Already closed, by an earlier pass or a concurrent one.
    Skipped,
}

pub(super) async fn sync_active_jobs(
    pipeline: &BatchPipeline,
    report: &mut RunReport,
) -> Result<(), StoreError> {
    let jobs = pipeline.store.active_jobs().await?;

    for job in jobs {
        report.jobs_checked += 1;

        match sync_job(pipeline, &job).await {
            Ok(outcome) => record(report, &job, outcome),
            Err(err) => {
                tracing::error!(job_id = %job.id, remote_ref = %job.remote_ref, error = %err, "Batch job sync failed");
                report.jobs_still_running += 1;
                report.errors.push(format!("job {}: {err}", job.id));
            }
        }
    }

    Ok(())
}

fn record(report: &mut RunReport, job: &BatchJob, outcome: JobOutcome) {
    let mut detail = JobDetail {
        job_id: job.id.clone(),
        book_id: job.book_id.clone(),
        stage: job.processing_type,
        status: job.status,
        completed_pages: job.completed_pages,
        failed_pages: job.failed_pages,
        message: None,
    };

    let label = match outcome {
        JobOutcome::StillRunning { provider_state } => {
            report.jobs_still_running += 1;
            detail.status = BatchJobStatus::Processing;
            detail.message = Some(provider_state);
            "processing"
        }
        JobOutcome::Saved { completed, failed, item_errors } => {
            report.jobs_completed += 1;
            report.pages_reconciled += completed as u64;
            detail.status = BatchJobStatus::Saved;
            detail.completed_pages = completed;
            detail.failed_pages = failed;
            report.errors.extend(item_errors);
            "saved"
        }
        JobOutcome::Failed { message } => {
            report.jobs_failed += 1;
            detail.status = BatchJobStatus::Failed;
            detail.failed_pages = job.total_pages - job.completed_pages;
            detail.message = Some(message);
            "failed"
        }
        JobOutcome::Expired { message } => {
            report.jobs_expired += 1;
            detail.status = BatchJobStatus::Expired;
            detail.message = Some(message);
            "expired"
        }
        JobOutcome::Cancelled => {
            report.jobs_cancelled += 1;
            detail.status = BatchJobStatus::Cancelled;
            "cancelled"
        }
        JobOutcome::Skipped => {
            detail.message = Some("already reconciled".to_string());
            "skipped"
        }
    };

    metrics::counter!("batch_jobs_synced_total", "status" => label).increment(1);
    report.details.push(detail);
}

/// Polls one job and applies whatever the provider reports.
pub(super) async fn sync_job(
    pipeline: &BatchPipeline,
    job: &BatchJob,
) -> Result<JobOutcome, SyncError> {
    if !job.is_active() {
        return Ok(JobOutcome::Skipped);
    }

    let outcome = match pipeline.provider.poll(&job.remote_ref).await {
        Ok(outcome) => outcome,
        Err(RemoteError::NotFound(message)) => {
            return expire(pipeline, job, format!("remote job not found: {message}")).await;
        }
        Err(err) if window_elapsed(job.created_at, pipeline.retention, primitive_now_utc()) => {
            return expire(pipeline, job, format!("retention window elapsed: {err}")).await;
        }
        Err(err) => return Err(err.into()),
    };

    let status = states::canonical_status(&outcome.state).unwrap_or_else(|| {
        tracing::warn!(job_id = %job.id, state = %outcome.state, "Unknown provider state; treating as running");
        BatchJobStatus::Processing
    });

    match status {
        BatchJobStatus::Pending | BatchJobStatus::Processing => {
            pipeline.store.mark_processing(&job.id, &outcome.state).await?;
            Ok(JobOutcome::StillRunning { provider_state: outcome.state })
        }
        BatchJobStatus::Saved => reconcile(pipeline, job, outcome).await,
        BatchJobStatus::Failed => {
            let message = outcome
                .error
                .clone()
                .unwrap_or_else(|| format!("provider reported {}", outcome.state));
            let closed = pipeline
                .store
                .complete_job(
                    &job.id,
                    JobCompletion {
                        status: BatchJobStatus::Failed,
                        completed_pages: Some(job.completed_pages),
                        failed_pages: Some(job.total_pages - job.completed_pages),
                        provider_state: Some(outcome.state),
                        error_message: Some(truncate(&message)),
                    },
                )
                .await?;
            Ok(if closed { JobOutcome::Failed { message } } else { JobOutcome::Skipped })
        }
        BatchJobStatus::Expired => {
            expire(pipeline, job, format!("provider reported {}", outcome.state)).await
        }
        BatchJobStatus::Cancelled => {
            let closed = pipeline
                .store
                .complete_job(
                    &job.id,
                    JobCompletion {
                        status: BatchJobStatus::Cancelled,
                        completed_pages: None,
                        failed_pages: None,
                        provider_state: Some(outcome.state),
                        error_message: None,
                    },
                )
                .await?;
            Ok(if closed { JobOutcome::Cancelled } else { JobOutcome::Skipped })
        }
    }
}

/// Counters stay at their last known values.
async fn expire(
    pipeline: &BatchPipeline,
    job: &BatchJob,
    message: String,
) -> Result<JobOutcome, SyncError> {
    tracing::warn!(job_id = %job.id, remote_ref = %job.remote_ref, reason = %message, "Batch job expired");
    let closed = pipeline
        .store
        .complete_job(
            &job.id,
            JobCompletion {
                status: BatchJobStatus::Expired,
                completed_pages: None,
                failed_pages: None,
                provider_state: None,
                error_message: Some(truncate(&message)),
            },
        )
        .await?;

    Ok(if closed { JobOutcome::Expired { message } } else { JobOutcome::Skipped })
}

async fn reconcile(
    pipeline: &BatchPipeline,
    job: &BatchJob,
    outcome: PollOutcome,
) -> Result<JobOutcome, SyncError> {
    let items = match outcome.results {
        Some(ResultLocation::File(location)) => pipeline.provider.fetch_results(&location).await?,
        Some(ResultLocation::Inline(items)) => items,
        None => {
            tracing::warn!(job_id = %job.id, "Succeeded job reported no results");
            Vec::new()
        }
    };

    let applied = apply_results(pipeline, job, items).await;

    let closed = pipeline
        .store
        .complete_job(
            &job.id,
            JobCompletion {
                status: BatchJobStatus::Saved,
                completed_pages: Some(applied.completed),
                failed_pages: Some(applied.failed),
                provider_state: Some(outcome.state),
                error_message: None,
            },
        )
        .await?;

    if !closed {
        return Ok(JobOutcome::Skipped);
    }

    let mut item_errors = applied.errors;
    match pipeline.store.recompute_book_counters(&job.book_id).await {
        Ok(counters) => {
            tracing::info!(
                job_id = %job.id,
                book_id = %job.book_id,
                completed = applied.completed,
                failed = applied.failed,
                pages_with_ocr = counters.pages_with_ocr,
                pages_translated = counters.pages_translated,
                "Batch job reconciled"
            );
        }
        Err(err) => item_errors.push(format!("book {} counters: {err}", job.book_id)),
    }

    Ok(JobOutcome::Saved {
        completed: applied.completed,
        failed: applied.failed,
        item_errors,
    })
}

struct AppliedResults {
    completed: i32,
    failed: i32,
    errors: Vec<String>,
}

/// Every page of the job ends up counted exactly once, as completed or failed. Pages
/// missing from the results count as failed.
async fn apply_results(
    pipeline: &BatchPipeline,
    job: &BatchJob,
    items: Vec<ResultItem>,
) -> AppliedResults {
    let stage = job.processing_type;
    let mut by_key: HashMap<String, ResultItem> = HashMap::with_capacity(items.len());
    for item in items {
        by_key.entry(item.key.clone()).or_insert(item);
    }

    let mut applied = AppliedResults { completed: 0, failed: 0, errors: Vec::new() };
    let mut seen = HashSet::new();

    for page_id in job.page_ids.0.iter().filter(|page_id| seen.insert(page_id.as_str())) {
        let Some(item) = by_key.remove(page_id) else {
            applied.failed += 1;
            metrics::counter!("batch_pages_reconciled_total", "outcome" => "missing").increment(1);
            continue;
        };

        let output = match item.outcome {
            Ok(output) if !output.text.trim().is_empty() => output,
            Ok(_) => {
                applied.failed += 1;
                metrics::counter!("batch_pages_reconciled_total", "outcome" => "empty").increment(1);
                continue;
            }
            Err(message) => {
                tracing::debug!(job_id = %job.id, page_id = %page_id, error = %message, "Batch item failed");
                applied.failed += 1;
                metrics::counter!("batch_pages_reconciled_total", "outcome" => "error").increment(1);
                continue;
            }
        };

        let now = primitive_now_utc();
        let result = StageResult {
            text: output.text,
            model: output.model.unwrap_or_else(|| job.model.clone()),
            source: ResultSource::Batch,
            usage: output.usage,
            created_at: now,
            updated_at: now,
        };

        match pipeline.store.write_stage_result(page_id, stage, &result).await {
            Ok(true) => {
                applied.completed += 1;
                metrics::counter!("batch_pages_reconciled_total", "outcome" => "saved").increment(1);
            }
            Ok(false) => {
                applied.failed += 1;
                applied.errors.push(format!("job {}: page {page_id} no longer exists", job.id));
            }
            Err(err) => {
                applied.failed += 1;
                applied.errors.push(format!("job {}: page {page_id}: {err}", job.id));
                metrics::counter!("batch_pages_reconciled_total", "outcome" => "store_error")
                    .increment(1);
            }
        }
    }

    if !by_key.is_empty() {
        tracing::warn!(job_id = %job.id, unexpected = by_key.len(), "Results carried keys outside the job");
    }

    applied
}

fn truncate(message: &str) -> String {
    message.chars().take(500).collect()
}
