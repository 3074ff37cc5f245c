use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio::time::Instant;

use crate::core::redis::RedisHandle;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub(crate) struct RunProgress {
    pub(crate) run_id: String,
    pub(crate) total: usize,
    pub(crate) succeeded: usize,
    pub(crate) failed: usize,
    pub(crate) finished: bool,
    pub(crate) cancelled: bool,
}

impl RunProgress {
    pub(crate) fn processed(&self) -> usize {
        self.succeeded + self.failed
    }
}

/// Receives progress snapshots of a run. Failures are the sink's own business.
#[async_trait]
pub(crate) trait ProgressSink: Send + Sync {
    async fn report(&self, progress: &RunProgress);
}

pub(crate) fn progress_key(run_id: &str) -> String {
    format!("interactive:run:{run_id}")
}

/// Keeps the latest snapshot of each run in Redis for status polling.
pub(crate) struct RedisProgressSink {
    redis: RedisHandle,
    ttl_seconds: u64,
}

impl RedisProgressSink {
    pub(crate) fn new(redis: RedisHandle, ttl_seconds: u64) -> Self {
        Self { redis, ttl_seconds }
    }
}

#[async_trait]
impl ProgressSink for RedisProgressSink {
    async fn report(&self, progress: &RunProgress) {
        let payload = match serde_json::to_string(progress) {
            Ok(payload) => payload,
            Err(err) => {
                tracing::warn!(run_id = %progress.run_id, error = %err, "Failed to encode run progress");
                return;
            }
        };

        if let Err(err) =
            self.redis.set_with_ttl(&progress_key(&progress.run_id), &payload, self.ttl_seconds).await
        {
            tracing::warn!(run_id = %progress.run_id, error = %err, "Failed to publish run progress");
        }
    }
}

/// Counts outcomes of one run and throttles what reaches the sink.
pub(super) struct ProgressTracker {
    progress: RunProgress,
    interval: Duration,
    last_report: Option<Instant>,
}

impl ProgressTracker {
    pub(super) fn new(run_id: &str, total: usize, interval: Duration) -> Self {
        Self {
            progress: RunProgress {
                run_id: run_id.to_string(),
                total,
                succeeded: 0,
                failed: 0,
                finished: false,
                cancelled: false,
            },
            interval,
            last_report: None,
        }
    }

    pub(super) fn record(&mut self, succeeded: bool) {
        if succeeded {
            self.progress.succeeded += 1;
        } else {
            self.progress.failed += 1;
        }
    }

    pub(super) async fn maybe_report(&mut self, sink: &dyn ProgressSink) {
        let now = Instant::now();
        let due = self.last_report.map_or(true, |last| now.duration_since(last) >= self.interval);
        if !due {
            return;
        }
        self.last_report = Some(now);
        sink.report(&self.progress).await;
    }

    /// The final snapshot always goes out.
    pub(super) async fn finish(&mut self, cancelled: bool, sink: &dyn ProgressSink) {
        self.progress.finished = true;
        self.progress.cancelled = cancelled;
        sink.report(&self.progress).await;
    }
}
