use std::sync::Arc;

use crate::core::{config::Settings, redis::RedisHandle};
use crate::repositories::store::PipelineStore;
use crate::services::batch_provider::BatchProvider;
use crate::services::inference::InferenceClient;
use crate::services::storage::ImageSource;
use crate::tasks::interactive::RunRegistry;

/// External collaborators behind their traits.
pub(crate) struct Backends {
    pub(crate) store: Arc<dyn PipelineStore>,
    pub(crate) provider: Arc<dyn BatchProvider>,
    pub(crate) inference: Arc<dyn InferenceClient>,
    pub(crate) images: Arc<dyn ImageSource>,
}

#[derive(Clone)]
pub(crate) struct AppState {
    inner: Arc<InnerState>,
}

struct InnerState {
    settings: Settings,
    redis: RedisHandle,
    backends: Backends,
    runs: RunRegistry,
}

impl AppState {
    pub(crate) fn new(settings: Settings, redis: RedisHandle, backends: Backends) -> Self {
        Self {
            inner: Arc::new(InnerState { settings, redis, backends, runs: RunRegistry::default() }),
        }
    }

    pub(crate) fn settings(&self) -> &Settings {
        &self.inner.settings
    }

    pub(crate) fn redis(&self) -> &RedisHandle {
        &self.inner.redis
    }

    pub(crate) fn store(&self) -> Arc<dyn PipelineStore> {
        self.inner.backends.store.clone()
    }

    pub(crate) fn provider(&self) -> Arc<dyn BatchProvider> {
        self.inner.backends.provider.clone()
    }

    pub(crate) fn inference(&self) -> Arc<dyn InferenceClient> {
        self.inner.backends.inference.clone()
    }

    pub(crate) fn images(&self) -> Arc<dyn ImageSource> {
        self.inner.backends.images.clone()
    }

    pub(crate) fn runs(&self) -> &RunRegistry {
        &self.inner.runs
    }
}
