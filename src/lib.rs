pub(crate) mod api;
pub(crate) mod core;
pub(crate) mod db;
pub(crate) mod repositories;
pub(crate) mod schemas;
pub(crate) mod services;
pub(crate) mod tasks;

#[cfg(test)]
mod test_support;

use std::sync::Arc;

use crate::core::{
    config::Settings,
    redis::RedisHandle,
    state::{AppState, Backends},
    telemetry,
};
use crate::repositories::store::PgStore;
use crate::services::batch_provider::GeminiBatchProvider;
use crate::services::inference::GeminiInferenceClient;
use crate::services::storage::{ArchiveImageSource, StorageService};

/// Loads settings, connects every backend and returns the shared state.
async fn bootstrap() -> anyhow::Result<AppState> {
    dotenvy::dotenv().ok();

    let settings = Settings::load()?;
    telemetry::init_tracing(&settings)?;
    core::metrics::init(&settings)?;

    let db_pool = db::init_pool(&settings).await?;
    db::run_migrations(&db_pool).await?;

    let redis = RedisHandle::new(settings.redis().redis_url());
    if let Err(err) = redis.connect().await {
        tracing::error!(error = %err, "Failed to connect to Redis; run progress will not be published");
    } else {
        tracing::info!("Redis connected successfully");
    }

    let storage = StorageService::from_settings(&settings).await?;
    if storage.is_none() {
        tracing::warn!("Object storage not configured; only absolute image URLs can be fetched");
    }

    let backends = Backends {
        store: Arc::new(PgStore::new(db_pool)),
        provider: Arc::new(GeminiBatchProvider::from_settings(&settings)?),
        inference: Arc::new(GeminiInferenceClient::from_settings(&settings)?),
        images: Arc::new(ArchiveImageSource::new(storage)?),
    };

    Ok(AppState::new(settings, redis, backends))
}

pub async fn run() -> anyhow::Result<()> {
    let state = bootstrap().await?;

    let app = api::router::router(state.clone());
    let listener = tokio::net::TcpListener::bind(state.settings().server_addr()).await?;

    tracing::info!(
        host = %state.settings().server_host(),
        port = state.settings().server_port(),
        environment = %state.settings().runtime().environment.as_str(),
        "Scriptorium API listening"
    );

    let result =
        axum::serve(listener, app).with_graceful_shutdown(core::shutdown::shutdown_signal()).await;

    state.redis().disconnect().await;
    tracing::info!("Redis disconnected");

    result?;

    Ok(())
}

pub async fn run_worker() -> anyhow::Result<()> {
    let state = bootstrap().await?;

    let result = tasks::scheduler::run(state.clone()).await;

    state.redis().disconnect().await;
    tracing::info!("Redis disconnected");

    result?;

    Ok(())
}
