use sqlx::types::Json;
use sqlx::{PgPool, Postgres, QueryBuilder};
use time::PrimitiveDateTime;

use crate::db::models::BatchJob;
use crate::db::types::{BatchJobStatus, ProcessingType};

pub(crate) const COLUMNS: &str = "\
    id, remote_ref, book_id, processing_type, status, provider_state, page_ids, \
    total_pages, completed_pages, failed_pages, model, input_artifact, error_message, \
    created_at, updated_at, completed_at";

pub(crate) const ACTIVE_STATUSES: &str = "'pending', 'processing'";

#[derive(Debug, Clone)]
pub(crate) struct NewBatchJob {
    pub(crate) id: String,
    pub(crate) remote_ref: String,
    pub(crate) book_id: String,
    pub(crate) processing_type: ProcessingType,
    pub(crate) provider_state: Option<String>,
    pub(crate) page_ids: Vec<String>,
    pub(crate) model: String,
    pub(crate) input_artifact: Option<String>,
}

/// Terminal transition. `None` counters keep the last stored values.
#[derive(Debug, Clone)]
pub(crate) struct JobCompletion {
    pub(crate) status: BatchJobStatus,
    pub(crate) completed_pages: Option<i32>,
    pub(crate) failed_pages: Option<i32>,
    pub(crate) provider_state: Option<String>,
    pub(crate) error_message: Option<String>,
}

pub(crate) async fn insert(
    pool: &PgPool,
    job: NewBatchJob,
    now: PrimitiveDateTime,
) -> Result<BatchJob, sqlx::Error> {
    let total_pages = job.page_ids.len() as i32;

    sqlx::query_as::<_, BatchJob>(&format!(
        "INSERT INTO batch_jobs (
            id, remote_ref, book_id, processing_type, status, provider_state, page_ids,
            total_pages, completed_pages, failed_pages, model, input_artifact,
            created_at, updated_at
         ) VALUES ($1, $2, $3, $4, $5, $6, $7, $8, 0, 0, $9, $10, $11, $11)
         RETURNING {COLUMNS}"
    ))
    .bind(job.id)
    .bind(job.remote_ref)
    .bind(job.book_id)
    .bind(job.processing_type)
    .bind(BatchJobStatus::Pending)
    .bind(job.provider_state)
    .bind(Json(job.page_ids))
    .bind(total_pages)
    .bind(job.model)
    .bind(job.input_artifact)
    .bind(now)
    .fetch_one(pool)
    .await
}

pub(crate) async fn find_by_id(pool: &PgPool, id: &str) -> Result<Option<BatchJob>, sqlx::Error> {
    sqlx::query_as::<_, BatchJob>(&format!("SELECT {COLUMNS} FROM batch_jobs WHERE id = $1"))
        .bind(id)
        .fetch_optional(pool)
        .await
}

/// Newest first.
pub(crate) async fn list(
    pool: &PgPool,
    status: Option<BatchJobStatus>,
    limit: i64,
) -> Result<Vec<BatchJob>, sqlx::Error> {
    let mut builder =
        QueryBuilder::<Postgres>::new(format!("SELECT {COLUMNS} FROM batch_jobs WHERE TRUE"));

    if let Some(status) = status {
        builder.push(" AND status = ");
        builder.push_bind(status);
    }

    builder.push(" ORDER BY created_at DESC LIMIT ");
    builder.push_bind(limit.clamp(1, 500));

    builder.build_query_as::<BatchJob>().fetch_all(pool).await
}

/// Oldest first, so jobs nearest to expiry are drained first.
pub(crate) async fn list_active(pool: &PgPool) -> Result<Vec<BatchJob>, sqlx::Error> {
    sqlx::query_as::<_, BatchJob>(&format!(
        "SELECT {COLUMNS} FROM batch_jobs WHERE status IN ({ACTIVE_STATUSES}) \
         ORDER BY created_at"
    ))
    .fetch_all(pool)
    .await
}

pub(crate) async fn count_active(pool: &PgPool) -> Result<i64, sqlx::Error> {
    sqlx::query_scalar(&format!(
        "SELECT COUNT(*) FROM batch_jobs WHERE status IN ({ACTIVE_STATUSES})"
    ))
    .fetch_one(pool)
    .await
}

pub(crate) async fn has_active(
    pool: &PgPool,
    book_id: &str,
    processing_type: ProcessingType,
) -> Result<bool, sqlx::Error> {
    sqlx::query_scalar(&format!(
        "SELECT EXISTS (SELECT 1 FROM batch_jobs \
         WHERE book_id = $1 AND processing_type = $2 AND status IN ({ACTIVE_STATUSES}))"
    ))
    .bind(book_id)
    .bind(processing_type)
    .fetch_one(pool)
    .await
}

pub(crate) async fn mark_processing(
    pool: &PgPool,
    id: &str,
    provider_state: &str,
    now: PrimitiveDateTime,
) -> Result<bool, sqlx::Error> {
    let outcome = sqlx::query(&format!(
        "UPDATE batch_jobs SET status = $1, provider_state = $2, updated_at = $3 \
         WHERE id = $4 AND status IN ({ACTIVE_STATUSES})"
    ))
    .bind(BatchJobStatus::Processing)
    .bind(provider_state)
    .bind(now)
    .bind(id)
    .execute(pool)
    .await?;

    Ok(outcome.rows_affected() > 0)
}

/// Compare-and-set from an active status. Returns false when another pass already
/// closed the job.
pub(crate) async fn complete(
    pool: &PgPool,
    id: &str,
    completion: JobCompletion,
    now: PrimitiveDateTime,
) -> Result<bool, sqlx::Error> {
    let outcome = sqlx::query(&format!(
        "UPDATE batch_jobs SET
            status = $1,
            completed_pages = COALESCE($2, completed_pages),
            failed_pages = COALESCE($3, failed_pages),
            provider_state = COALESCE($4, provider_state),
            error_message = $5,
            updated_at = $6,
            completed_at = $6
         WHERE id = $7 AND status IN ({ACTIVE_STATUSES})"
    ))
    .bind(completion.status)
    .bind(completion.completed_pages)
    .bind(completion.failed_pages)
    .bind(completion.provider_state)
    .bind(completion.error_message)
    .bind(now)
    .bind(id)
    .execute(pool)
    .await?;

    Ok(outcome.rows_affected() > 0)
}
