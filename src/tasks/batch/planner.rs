use std::collections::HashMap;
use std::hash::Hash;

use thiserror::Error;
use uuid::Uuid;

use super::{BatchPipeline, RunReport};
use crate::db::models::{BatchJob, Book, BookBacklog};
use crate::db::types::ProcessingType;
use crate::repositories::batch_jobs::NewBatchJob;
use crate::repositories::store::StoreError;
use crate::services::batch_provider::ProviderRequest;
use crate::services::content;
use crate::services::remote_error::RemoteError;

#[derive(Debug, Error)]
pub(super) enum SubmitError {
    #[error(transparent)]
    Store(#[from] StoreError),
    #[error(transparent)]
    Remote(#[from] RemoteError),
}

/// Round-robin over groups sharing a key, largest group first. Ties keep first-seen order.
pub(crate) fn diversify_by<T, K, F>(items: Vec<T>, key: F) -> Vec<T>
where
    K: Eq + Hash,
    F: Fn(&T) -> K,
{
    let mut index: HashMap<K, usize> = HashMap::new();
    let mut groups: Vec<Vec<T>> = Vec::new();
    for item in items {
        let slot = *index.entry(key(&item)).or_insert_with(|| {
            groups.push(Vec::new());
            groups.len() - 1
        });
        groups[slot].push(item);
    }

    groups.sort_by(|left, right| right.len().cmp(&left.len()));

    let total = groups.iter().map(Vec::len).sum();
    let mut queues: Vec<std::vec::IntoIter<T>> = groups.into_iter().map(Vec::into_iter).collect();
    let mut ordered = Vec::with_capacity(total);
    while ordered.len() < total {
        for queue in &mut queues {
            if let Some(item) = queue.next() {
                ordered.push(item);
            }
        }
    }

    ordered
}

/// Spreads books of different source languages across the submission order.
pub(crate) fn diversify(backlogs: Vec<BookBacklog>) -> Vec<BookBacklog> {
    diversify_by(backlogs, |backlog| backlog.book.language.trim().to_lowercase())
}

/// Fixed-size chunks; the last one may be shorter.
pub(crate) fn chunk_pages(page_ids: &[String], size: usize) -> Vec<Vec<String>> {
    page_ids.chunks(size.max(1)).map(<[String]>::to_vec).collect()
}

/// Submits at most one job per book until `budget` jobs were created. Returns the
/// number of jobs created. Pages past the submitted chunk stay in the backlog until
/// the book's active job closes. A failing chunk is reported and the book skipped.
pub(super) async fn submit_backlogs(
    pipeline: &BatchPipeline,
    stage: ProcessingType,
    backlogs: Vec<BookBacklog>,
    budget: u64,
    report: &mut RunReport,
) -> u64 {
    let mut created = 0;

    for backlog in diversify(backlogs) {
        if created >= budget {
            break;
        }

        let book = &backlog.book;
        match pipeline.store.has_active_job(&book.id, stage).await {
            Ok(false) => {}
            Ok(true) => {
                tracing::info!(book_id = %book.id, stage = stage.as_str(), "Book already has an active job; skipping");
                continue;
            }
            Err(err) => {
                report.errors.push(format!("book {} ({}): {err}", book.id, stage.as_str()));
                continue;
            }
        }

        // Unbuildable chunks fall through to the next one; the first submitted job ends
        // the book's turn.
        for chunk in chunk_pages(&backlog.page_ids, pipeline.settings.batch_size) {
            match submit_chunk(pipeline, stage, book, &chunk).await {
                Ok(Some(job)) => {
                    created += 1;
                    report.new_jobs_queued += 1;
                    tracing::info!(
                        job_id = %job.id,
                        book_id = %book.id,
                        stage = stage.as_str(),
                        remote_ref = %job.remote_ref,
                        total_pages = job.total_pages,
                        pending_pages = backlog.page_ids.len().saturating_sub(chunk.len()),
                        "Submitted batch job"
                    );
                    break;
                }
                Ok(None) => {
                    tracing::info!(
                        book_id = %book.id,
                        stage = stage.as_str(),
                        chunk_size = chunk.len(),
                        "No buildable requests in chunk; nothing submitted"
                    );
                }
                Err(err) => {
                    tracing::error!(book_id = %book.id, stage = stage.as_str(), error = %err, "Batch chunk submission failed");
                    report.errors.push(format!(
                        "submit book {} ({}, {} pages): {err}",
                        book.id,
                        stage.as_str(),
                        chunk.len()
                    ));
                    break;
                }
            }
        }
    }

    created
}

/// Builds, uploads and registers one chunk. `Ok(None)` when no page of the chunk yielded
/// a request.
pub(super) async fn submit_chunk(
    pipeline: &BatchPipeline,
    stage: ProcessingType,
    book: &Book,
    page_ids: &[String],
) -> Result<Option<BatchJob>, SubmitError> {
    let pages = pipeline.store.pages_by_ids(page_ids).await?;

    let mut requests = Vec::with_capacity(pages.len());
    for page in pages.iter().filter(|page| page.needs_stage(stage)) {
        match content::build_request(stage, page, book, pipeline.images.as_ref()).await {
            Ok(request) => requests.push(ProviderRequest { key: page.id.clone(), request }),
            Err(err) => {
                tracing::debug!(page_id = %page.id, stage = stage.as_str(), error = %err, "Skipping page without input");
            }
        }
    }

    if requests.is_empty() {
        return Ok(None);
    }

    let display_name = format!("{}-{}-{}", stage.as_str(), book.id, Uuid::new_v4().simple());
    let artifact = pipeline.provider.upload(&display_name, &requests).await?;

    let created = pipeline.provider.create_job(&display_name, &artifact).await;
    if let Err(err) = pipeline.provider.delete_temp(&artifact).await {
        tracing::warn!(artifact = %artifact, error = %err, "Failed to delete temporary batch input");
    }
    let handle = created?;

    let job = pipeline
        .store
        .insert_job(NewBatchJob {
            id: Uuid::new_v4().to_string(),
            remote_ref: handle.remote_ref,
            book_id: book.id.clone(),
            processing_type: stage,
            provider_state: handle.state,
            page_ids: requests.into_iter().map(|item| item.key).collect(),
            model: pipeline.provider.model().to_string(),
            input_artifact: Some(artifact),
        })
        .await?;

    metrics::counter!("batch_jobs_submitted_total", "stage" => stage.as_str()).increment(1);
    Ok(Some(job))
}
