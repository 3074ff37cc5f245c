use anyhow::Result;
use tokio::sync::watch;
use tokio::time::{interval, Duration, MissedTickBehavior};

use crate::core::state::AppState;
use crate::tasks::batch::{BatchPipeline, RunOptions};

pub(crate) async fn run(state: AppState) -> Result<()> {
    if !state.settings().scheduler().enabled {
        tracing::warn!("Batch scheduler disabled; worker has nothing to do");
        return Ok(());
    }

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let handle = tokio::spawn(batch_loop(state, shutdown_rx));

    crate::core::shutdown::shutdown_signal().await;
    if shutdown_tx.send(true).is_err() {
        tracing::warn!("Failed to broadcast shutdown signal to background tasks");
    }

    if let Err(err) = handle.await {
        tracing::error!(error = %err, "Background task join failed");
    }

    Ok(())
}

/// One sync-and-queue pass per tick. A pass in progress finishes before shutdown.
async fn batch_loop(state: AppState, mut shutdown: watch::Receiver<bool>) {
    let pipeline = BatchPipeline::from_state(&state);
    let period = Duration::from_secs(state.settings().scheduler().interval_seconds);
    let mut tick = interval(period);
    tick.set_missed_tick_behavior(MissedTickBehavior::Delay);

    tracing::info!(interval_seconds = period.as_secs(), "Batch scheduler started");

    loop {
        tokio::select! {
            _ = shutdown.changed() => break,
            _ = tick.tick() => {
                if let Err(err) = pipeline.run_once(RunOptions::default()).await {
                    tracing::error!(error = %err, "Batch pass failed");
                }
            }
        }
    }

    tracing::info!("Batch scheduler stopped");
}
