use serde::{Deserialize, Serialize};

use crate::core::time::format_primitive;
use crate::db::models::BatchJob;
use crate::db::types::{BatchJobStatus, ProcessingType};

#[derive(Debug, Default, Deserialize)]
pub(crate) struct ProcessQuery {
    #[serde(default)]
    pub(crate) skip_new_work: bool,
    #[serde(default)]
    pub(crate) max_new_jobs: Option<u64>,
}

#[derive(Debug, Default, Deserialize)]
pub(crate) struct JobListQuery {
    #[serde(default)]
    pub(crate) status: Option<String>,
    #[serde(default)]
    pub(crate) limit: Option<i64>,
}

#[derive(Debug, Serialize)]
pub(crate) struct BatchJobResponse {
    pub(crate) id: String,
    pub(crate) remote_ref: String,
    pub(crate) book_id: String,
    pub(crate) processing_type: ProcessingType,
    pub(crate) status: BatchJobStatus,
    pub(crate) provider_state: Option<String>,
    pub(crate) total_pages: i32,
    pub(crate) completed_pages: i32,
    pub(crate) failed_pages: i32,
    pub(crate) model: String,
    pub(crate) error_message: Option<String>,
    pub(crate) created_at: String,
    pub(crate) updated_at: String,
    pub(crate) completed_at: Option<String>,
}

impl BatchJobResponse {
    pub(crate) fn from_db(job: BatchJob) -> Self {
        Self {
            id: job.id,
            remote_ref: job.remote_ref,
            book_id: job.book_id,
            processing_type: job.processing_type,
            status: job.status,
            provider_state: job.provider_state,
            total_pages: job.total_pages,
            completed_pages: job.completed_pages,
            failed_pages: job.failed_pages,
            model: job.model,
            error_message: job.error_message,
            created_at: format_primitive(job.created_at),
            updated_at: format_primitive(job.updated_at),
            completed_at: job.completed_at.map(format_primitive),
        }
    }
}
