use crate::db::models::BookBacklog;
use crate::db::types::ProcessingType;
use crate::repositories::store::{PipelineStore, StoreError};

/// Books with pages still needing `stage`, minus books already covered by an active
/// job for it. Read only.
pub(super) async fn select_backlog(
    store: &dyn PipelineStore,
    stage: ProcessingType,
    book_id: Option<&str>,
) -> Result<Vec<BookBacklog>, StoreError> {
    let backlogs = store.backlog(stage, book_id).await?;

    Ok(backlogs.into_iter().filter(|backlog| !backlog.page_ids.is_empty()).collect())
}

/// Books that already finished part of the stage come first; order is otherwise kept.
pub(super) fn started_first(backlogs: Vec<BookBacklog>) -> (Vec<BookBacklog>, Vec<BookBacklog>) {
    backlogs.into_iter().partition(|backlog| backlog.stage_started)
}
