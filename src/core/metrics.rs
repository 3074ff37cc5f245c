use std::sync::OnceLock;

use metrics::{describe_counter, describe_histogram};
use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};

use crate::core::config::Settings;

static PROM_HANDLE: OnceLock<PrometheusHandle> = OnceLock::new();

pub(crate) fn init(settings: &Settings) -> anyhow::Result<()> {
    if !settings.telemetry().prometheus_enabled {
        return Ok(());
    }

    let handle = PrometheusBuilder::new().install_recorder()?;
    let _ = PROM_HANDLE.set(handle);
    describe();
    Ok(())
}

fn describe() {
    describe_counter!("batch_jobs_submitted_total", "Remote batch jobs created");
    describe_counter!("batch_jobs_synced_total", "Batch job status transitions observed");
    describe_counter!("batch_pages_reconciled_total", "Page results applied or failed");
    describe_counter!("interactive_items_total", "Interactive items by final outcome");
    describe_counter!("interactive_retries_total", "Interactive attempts retried");
    describe_counter!("http_requests_total", "HTTP requests served");
    describe_histogram!("http_request_duration_seconds", "HTTP request latency");
    describe_histogram!("batch_sync_duration_seconds", "Wall time of one sync and queue pass");
}

pub(crate) fn render() -> Option<String> {
    PROM_HANDLE.get().map(|handle| handle.render())
}
