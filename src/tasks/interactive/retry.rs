use std::time::Duration;

use super::{CancelFlag, ItemError, ItemOutcome, ItemWorker, ProcessorConfig};

/// Delay before retry number `retry` (zero based): `base * 2^retry`.
pub(crate) fn backoff_delay(base: Duration, retry: u32) -> Duration {
    base.saturating_mul(1u32 << retry.min(16))
}

pub(super) async fn process_with_retry(
    worker: &dyn ItemWorker,
    item_id: &str,
    config: &ProcessorConfig,
    cancel: &CancelFlag,
) -> ItemOutcome {
    let max_attempts = config.max_attempts.max(1);
    let mut attempt = 0;

    loop {
        attempt += 1;

        let result = tokio::time::timeout(config.attempt_timeout, worker.process(item_id))
            .await
            .unwrap_or(Err(ItemError::Timeout));

        let err = match result {
            Ok(()) => {
                return ItemOutcome {
                    id: item_id.to_string(),
                    succeeded: true,
                    attempts: attempt,
                    error: None,
                };
            }
            Err(err) => err,
        };

        let exhausted = attempt >= max_attempts || !err.is_retryable();
        if exhausted || cancel.is_cancelled() {
            tracing::warn!(item_id, attempt, retryable = err.is_retryable(), error = %err, "Interactive item failed");
            return ItemOutcome {
                id: item_id.to_string(),
                succeeded: false,
                attempts: attempt,
                error: Some(err.to_string()),
            };
        }

        let delay = backoff_delay(config.base_delay, attempt - 1);
        tracing::debug!(item_id, attempt, delay_ms = delay.as_millis() as u64, error = %err, "Retrying interactive item");
        metrics::counter!("interactive_retries_total").increment(1);
        tokio::time::sleep(delay).await;
    }
}
