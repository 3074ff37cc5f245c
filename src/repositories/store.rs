use std::collections::HashMap;

use async_trait::async_trait;
use sqlx::PgPool;
use thiserror::Error;

use crate::core::time::primitive_now_utc;
use crate::db::models::{BatchJob, Book, BookBacklog, BookCounters, Page, StageResult};
use crate::db::types::{BatchJobStatus, ProcessingType};
use crate::repositories::batch_jobs::{JobCompletion, NewBatchJob};
use crate::repositories::{batch_jobs, books, pages};

#[derive(Debug, Error)]
pub(crate) enum StoreError {
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
    #[error("store unavailable: {0}")]
    Unavailable(String),
}

/// Persistence seam for the batch and interactive paths.
#[async_trait]
pub(crate) trait PipelineStore: Send + Sync {
    async fn ping(&self) -> Result<(), StoreError>;

    async fn backlog(
        &self,
        stage: ProcessingType,
        book_id: Option<&str>,
    ) -> Result<Vec<BookBacklog>, StoreError>;

    async fn pages_by_ids(&self, ids: &[String]) -> Result<Vec<Page>, StoreError>;

    async fn book(&self, id: &str) -> Result<Option<Book>, StoreError>;

    async fn write_stage_result(
        &self,
        page_id: &str,
        stage: ProcessingType,
        result: &StageResult,
    ) -> Result<bool, StoreError>;

    async fn recompute_book_counters(&self, book_id: &str) -> Result<BookCounters, StoreError>;

    async fn insert_job(&self, job: NewBatchJob) -> Result<BatchJob, StoreError>;

    async fn job(&self, id: &str) -> Result<Option<BatchJob>, StoreError>;

    async fn list_jobs(
        &self,
        status: Option<BatchJobStatus>,
        limit: i64,
    ) -> Result<Vec<BatchJob>, StoreError>;

    async fn active_jobs(&self) -> Result<Vec<BatchJob>, StoreError>;

    async fn count_active_jobs(&self) -> Result<u64, StoreError>;

    async fn has_active_job(
        &self,
        book_id: &str,
        stage: ProcessingType,
    ) -> Result<bool, StoreError>;

    async fn mark_processing(&self, id: &str, provider_state: &str) -> Result<bool, StoreError>;

    async fn complete_job(&self, id: &str, completion: JobCompletion) -> Result<bool, StoreError>;
}

#[derive(Clone)]
pub(crate) struct PgStore {
    pool: PgPool,
}

impl PgStore {
    pub(crate) fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl PipelineStore for PgStore {
    async fn ping(&self) -> Result<(), StoreError> {
        sqlx::query("SELECT 1")
            .execute(&self.pool)
            .await
            .map(|_| ())
            .map_err(|err| StoreError::Unavailable(err.to_string()))
    }

    async fn backlog(
        &self,
        stage: ProcessingType,
        book_id: Option<&str>,
    ) -> Result<Vec<BookBacklog>, StoreError> {
        let rows = pages::backlog(&self.pool, stage, book_id).await?;
        if rows.is_empty() {
            return Ok(Vec::new());
        }

        let mut order: Vec<String> = Vec::new();
        let mut grouped: HashMap<String, (Vec<String>, bool)> = HashMap::new();
        for row in rows {
            let entry = grouped.entry(row.book_id.clone()).or_insert_with(|| {
                order.push(row.book_id.clone());
                (Vec::new(), row.stage_started)
            });
            entry.0.push(row.page_id);
        }

        let mut books: HashMap<String, Book> = books::list_by_ids(&self.pool, &order)
            .await?
            .into_iter()
            .map(|book| (book.id.clone(), book))
            .collect();

        Ok(order
            .into_iter()
            .filter_map(|book_id| {
                let book = books.remove(&book_id)?;
                let (page_ids, stage_started) = grouped.remove(&book_id)?;
                Some(BookBacklog { book, page_ids, stage_started })
            })
            .collect())
    }

    async fn pages_by_ids(&self, ids: &[String]) -> Result<Vec<Page>, StoreError> {
        Ok(pages::find_by_ids(&self.pool, ids).await?)
    }

    async fn book(&self, id: &str) -> Result<Option<Book>, StoreError> {
        Ok(books::find_by_id(&self.pool, id).await?)
    }

    async fn write_stage_result(
        &self,
        page_id: &str,
        stage: ProcessingType,
        result: &StageResult,
    ) -> Result<bool, StoreError> {
        Ok(pages::write_stage_result(&self.pool, page_id, stage, result).await?)
    }

    async fn recompute_book_counters(&self, book_id: &str) -> Result<BookCounters, StoreError> {
        Ok(books::recompute_counters(&self.pool, book_id, primitive_now_utc()).await?)
    }

    async fn insert_job(&self, job: NewBatchJob) -> Result<BatchJob, StoreError> {
        Ok(batch_jobs::insert(&self.pool, job, primitive_now_utc()).await?)
    }

    async fn job(&self, id: &str) -> Result<Option<BatchJob>, StoreError> {
        Ok(batch_jobs::find_by_id(&self.pool, id).await?)
    }

    async fn list_jobs(
        &self,
        status: Option<BatchJobStatus>,
        limit: i64,
    ) -> Result<Vec<BatchJob>, StoreError> {
        Ok(batch_jobs::list(&self.pool, status, limit).await?)
    }

    async fn active_jobs(&self) -> Result<Vec<BatchJob>, StoreError> {
        Ok(batch_jobs::list_active(&self.pool).await?)
    }

    async fn count_active_jobs(&self) -> Result<u64, StoreError> {
        let count = batch_jobs::count_active(&self.pool).await?;
        Ok(count.max(0) as u64)
    }

    async fn has_active_job(
        &self,
        book_id: &str,
        stage: ProcessingType,
    ) -> Result<bool, StoreError> {
        Ok(batch_jobs::has_active(&self.pool, book_id, stage).await?)
    }

    async fn mark_processing(&self, id: &str, provider_state: &str) -> Result<bool, StoreError> {
        Ok(batch_jobs::mark_processing(&self.pool, id, provider_state, primitive_now_utc()).await?)
    }

    async fn complete_job(&self, id: &str, completion: JobCompletion) -> Result<bool, StoreError> {
        Ok(batch_jobs::complete(&self.pool, id, completion, primitive_now_utc()).await?)
    }
}
