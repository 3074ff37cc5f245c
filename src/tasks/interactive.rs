mod progress;
mod retry;
mod worker;


use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use serde::Serialize;
use thiserror::Error;
use tokio::task::JoinSet;

use crate::core::config::InteractiveSettings;
use crate::repositories::store::StoreError;
use crate::services::content::ContentError;
use crate::services::remote_error::RemoteError;

pub(crate) use progress::{progress_key, ProgressSink, RedisProgressSink, RunProgress};
pub(crate) use worker::StageWorker;

#[derive(Debug, Error)]
pub(crate) enum ItemError {
    #[error("attempt timed out")]
    Timeout,
    #[error("page {0} not found")]
    NotFound(String),
    #[error(transparent)]
    Remote(#[from] RemoteError),
    #[error(transparent)]
    Content(#[from] ContentError),
    #[error(transparent)]
    Store(#[from] StoreError),
}

impl ItemError {
    /// Timeouts and transient transport failures are retried; everything that says the
    /// request itself is wrong is not.
    pub(crate) fn is_retryable(&self) -> bool {
        match self {
            Self::Timeout => true,
            Self::Remote(err) => err.is_retryable(),
            Self::Content(ContentError::Fetch { .. }) => true,
            Self::Store(StoreError::Unavailable(_)) => true,
            _ => false,
        }
    }
}

/// Processes one item id. Implementations must be safe to call again for the same id.
#[async_trait]
pub(crate) trait ItemWorker: Send + Sync {
    async fn process(&self, item_id: &str) -> Result<(), ItemError>;
}

/// Cooperative cancellation shared between a run and whoever may stop it.
#[derive(Debug, Clone, Default)]
pub(crate) struct CancelFlag(Arc<AtomicBool>);

impl CancelFlag {
    pub(crate) fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub(crate) fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

/// Cancellation flags of runs in progress, by run id.
#[derive(Debug, Default)]
pub(crate) struct RunRegistry {
    runs: Mutex<HashMap<String, CancelFlag>>,
}

impl RunRegistry {
    /// `None` when a run with this id is already in progress. The id is released when the
    /// returned guard drops, including when the owning request is abandoned mid-run.
    pub(crate) fn register(&self, run_id: &str) -> Option<RunGuard<'_>> {
        let mut runs = self.runs.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
        if runs.contains_key(run_id) {
            return None;
        }
        let flag = CancelFlag::default();
        runs.insert(run_id.to_string(), flag.clone());
        Some(RunGuard { registry: self, run_id: run_id.to_string(), flag })
    }

    pub(crate) fn cancel(&self, run_id: &str) -> bool {
        let runs = self.runs.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
        match runs.get(run_id) {
            Some(flag) => {
                flag.cancel();
                true
            }
            None => false,
        }
    }

    fn release(&self, run_id: &str) {
        let mut runs = self.runs.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
        runs.remove(run_id);
    }
}

/// Registration of one run in progress.
#[derive(Debug)]
pub(crate) struct RunGuard<'a> {
    registry: &'a RunRegistry,
    run_id: String,
    flag: CancelFlag,
}

impl RunGuard<'_> {
    pub(crate) fn flag(&self) -> &CancelFlag {
        &self.flag
    }
}

impl Drop for RunGuard<'_> {
    fn drop(&mut self) {
        self.registry.release(&self.run_id);
    }
}

#[derive(Debug, Clone)]
pub(crate) struct ProcessorConfig {
    pub(crate) concurrency: usize,
    pub(crate) max_attempts: u32,
    pub(crate) base_delay: Duration,
    pub(crate) attempt_timeout: Duration,
    pub(crate) wave_pause: Duration,
    pub(crate) progress_interval: Duration,
}

impl From<&InteractiveSettings> for ProcessorConfig {
    fn from(settings: &InteractiveSettings) -> Self {
        Self {
            concurrency: settings.concurrency,
            max_attempts: settings.max_attempts,
            base_delay: settings.base_delay(),
            attempt_timeout: settings.attempt_timeout(),
            wave_pause: settings.wave_pause(),
            progress_interval: settings.progress_interval(),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub(crate) struct ItemOutcome {
    pub(crate) id: String,
    pub(crate) succeeded: bool,
    pub(crate) attempts: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub(crate) error: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub(crate) struct RunOutcome {
    pub(crate) succeeded: usize,
    pub(crate) failed: usize,
    /// In input order, so a caller can resubmit exactly these.
    pub(crate) failed_ids: Vec<String>,
    pub(crate) cancelled: bool,
    pub(crate) not_started: usize,
    pub(crate) items: Vec<ItemOutcome>,
}

/// Runs `worker` over `ids` in waves of `config.concurrency`, retrying per item.
/// Duplicate ids are processed once.
pub(crate) async fn run_items(
    run_id: &str,
    ids: Vec<String>,
    worker: Arc<dyn ItemWorker>,
    config: &ProcessorConfig,
    cancel: &CancelFlag,
    sink: &dyn ProgressSink,
) -> RunOutcome {
    let mut seen = HashSet::new();
    let ids: Vec<String> = ids.into_iter().filter(|id| seen.insert(id.clone())).collect();
    let total = ids.len();
    let width = config.concurrency.max(1);

    let mut tracker = progress::ProgressTracker::new(run_id, total, config.progress_interval);
    let mut outcomes: Vec<Option<ItemOutcome>> = vec![None; total];
    let mut started = 0usize;

    'waves: for (wave_index, wave) in ids.chunks(width).enumerate() {
        if wave_index > 0 && !config.wave_pause.is_zero() {
            tokio::time::sleep(config.wave_pause).await;
        }

        let mut tasks = JoinSet::new();
        for (offset, id) in wave.iter().enumerate() {
            if cancel.is_cancelled() {
                drain(&mut tasks, &mut outcomes, &mut tracker, sink).await;
                break 'waves;
            }

            let position = wave_index * width + offset;
            let worker = worker.clone();
            let config = config.clone();
            let cancel = cancel.clone();
            let id = id.clone();
            started += 1;
            tasks.spawn(async move {
                let outcome = retry::process_with_retry(worker.as_ref(), &id, &config, &cancel).await;
                (position, outcome)
            });
        }

        drain(&mut tasks, &mut outcomes, &mut tracker, sink).await;
    }

    let cancelled = cancel.is_cancelled() && started < total;
    let items: Vec<ItemOutcome> = outcomes.into_iter().flatten().collect();
    let failed_ids: Vec<String> =
        items.iter().filter(|item| !item.succeeded).map(|item| item.id.clone()).collect();

    tracker.finish(cancelled, sink).await;

    let outcome = RunOutcome {
        succeeded: items.len() - failed_ids.len(),
        failed: failed_ids.len(),
        failed_ids,
        cancelled,
        not_started: total - started,
        items,
    };

    tracing::info!(
        run_id,
        succeeded = outcome.succeeded,
        failed = outcome.failed,
        not_started = outcome.not_started,
        cancelled = outcome.cancelled,
        "Interactive run finished"
    );

    outcome
}

async fn drain(
    tasks: &mut JoinSet<(usize, ItemOutcome)>,
    outcomes: &mut [Option<ItemOutcome>],
    tracker: &mut progress::ProgressTracker,
    sink: &dyn ProgressSink,
) {
    while let Some(joined) = tasks.join_next().await {
        match joined {
            Ok((position, outcome)) => {
                let label = if outcome.succeeded { "succeeded" } else { "failed" };
                metrics::counter!("interactive_items_total", "outcome" => label).increment(1);
                tracker.record(outcome.succeeded);
                outcomes[position] = Some(outcome);
                tracker.maybe_report(sink).await;
            }
            Err(err) => {
                tracing::error!(error = %err, "Interactive item task panicked");
            }
        }
    }
}
