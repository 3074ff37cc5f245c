use std::sync::Arc;

use async_trait::async_trait;

use super::{ItemError, ItemWorker};
use crate::core::time::primitive_now_utc;
use crate::db::models::StageResult;
use crate::db::types::{ProcessingType, ResultSource};
use crate::repositories::store::PipelineStore;
use crate::services::content;
use crate::services::inference::InferenceClient;
use crate::services::storage::ImageSource;

/// Runs one stage for one page through synchronous inference. An existing result for
/// the stage is overwritten.
pub(crate) struct StageWorker {
    stage: ProcessingType,
    store: Arc<dyn PipelineStore>,
    inference: Arc<dyn InferenceClient>,
    images: Arc<dyn ImageSource>,
}

impl StageWorker {
    pub(crate) fn new(
        stage: ProcessingType,
        store: Arc<dyn PipelineStore>,
        inference: Arc<dyn InferenceClient>,
        images: Arc<dyn ImageSource>,
    ) -> Self {
        Self { stage, store, inference, images }
    }
}

#[async_trait]
impl ItemWorker for StageWorker {
    async fn process(&self, item_id: &str) -> Result<(), ItemError> {
        let page = self
            .store
            .pages_by_ids(&[item_id.to_string()])
            .await?
            .into_iter()
            .next()
            .ok_or_else(|| ItemError::NotFound(item_id.to_string()))?;
        let book = self
            .store
            .book(&page.book_id)
            .await?
            .ok_or_else(|| ItemError::NotFound(format!("{item_id} (book {})", page.book_id)))?;

        let request = content::build_request(self.stage, &page, &book, self.images.as_ref()).await?;
        let output = self.inference.generate(&request).await?;

        let now = primitive_now_utc();
        let result = StageResult {
            text: output.text,
            model: output.model.unwrap_or_else(|| self.inference.model().to_string()),
            source: ResultSource::Interactive,
            usage: output.usage,
            created_at: now,
            updated_at: now,
        };

        if !self.store.write_stage_result(&page.id, self.stage, &result).await? {
            return Err(ItemError::NotFound(item_id.to_string()));
        }

        if let Err(err) = self.store.recompute_book_counters(&book.id).await {
            tracing::warn!(book_id = %book.id, error = %err, "Failed to refresh book counters");
        }

        Ok(())
    }
}
