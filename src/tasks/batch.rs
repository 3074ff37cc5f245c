mod planner;
mod queuer;
mod selector;
mod synchronizer;


use std::sync::Arc;
use std::time::Instant;

use serde::Serialize;

use crate::core::config::BatchSettings;
use crate::core::state::AppState;
use crate::db::types::{BatchJobStatus, ProcessingType};
use crate::repositories::store::{PipelineStore, StoreError};
use crate::services::batch_provider::BatchProvider;
use crate::services::storage::ImageSource;

#[derive(Debug, Clone, Copy, Default)]
pub(crate) struct RunOptions {
    pub(crate) skip_new_work: bool,
    pub(crate) max_new_jobs: Option<u64>,
}

#[derive(Debug, Clone, Serialize)]
pub(crate) struct JobDetail {
    pub(crate) job_id: String,
    pub(crate) book_id: String,
    pub(crate) stage: ProcessingType,
    pub(crate) status: BatchJobStatus,
    pub(crate) completed_pages: i32,
    pub(crate) failed_pages: i32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub(crate) message: Option<String>,
}

/// Summary of one sync-and-queue pass.
#[derive(Debug, Clone, Default, Serialize)]
pub(crate) struct RunReport {
    pub(crate) jobs_checked: u64,
    pub(crate) jobs_completed: u64,
    pub(crate) jobs_still_running: u64,
    pub(crate) jobs_failed: u64,
    pub(crate) jobs_expired: u64,
    pub(crate) jobs_cancelled: u64,
    pub(crate) pages_reconciled: u64,
    pub(crate) new_jobs_queued: u64,
    pub(crate) details: Vec<JobDetail>,
    pub(crate) errors: Vec<String>,
}

/// Collaborators of the batch path.
#[derive(Clone)]
pub(crate) struct BatchPipeline {
    store: Arc<dyn PipelineStore>,
    provider: Arc<dyn BatchProvider>,
    images: Arc<dyn ImageSource>,
    settings: BatchSettings,
    retention: time::Duration,
}

impl BatchPipeline {
    pub(crate) fn new(
        store: Arc<dyn PipelineStore>,
        provider: Arc<dyn BatchProvider>,
        images: Arc<dyn ImageSource>,
        settings: BatchSettings,
        retention: time::Duration,
    ) -> Self {
        Self { store, provider, images, settings, retention }
    }

    pub(crate) fn from_state(state: &AppState) -> Self {
        Self::new(
            state.store(),
            state.provider(),
            state.images(),
            state.settings().batch().clone(),
            state.settings().provider().retention(),
        )
    }

    /// Drains in-flight jobs, then queues new work unless skipped. Only a failure to
    /// read the job store aborts the pass; everything else lands in `errors`.
    pub(crate) async fn run_once(&self, options: RunOptions) -> Result<RunReport, StoreError> {
        let started = Instant::now();
        let mut report = RunReport::default();

        synchronizer::sync_active_jobs(self, &mut report).await?;

        if !options.skip_new_work {
            queuer::queue_new_work(self, options.max_new_jobs, &mut report).await?;
        }

        metrics::histogram!("batch_sync_duration_seconds").record(started.elapsed().as_secs_f64());
        tracing::info!(
            jobs_checked = report.jobs_checked,
            jobs_completed = report.jobs_completed,
            jobs_still_running = report.jobs_still_running,
            pages_reconciled = report.pages_reconciled,
            new_jobs_queued = report.new_jobs_queued,
            errors = report.errors.len(),
            "Batch pass finished"
        );

        Ok(report)
    }
}
