use std::sync::Arc;

use axum::extract::{Path, State};
use axum::Json;
use uuid::Uuid;
use validator::Validate;

use crate::api::errors::ApiError;
use crate::api::guards::OperatorAuth;
use crate::core::state::AppState;
use crate::schemas::interactive::{CancelRunResponse, InteractiveRunRequest, InteractiveRunResponse};
use crate::tasks::interactive::{
    progress_key, run_items, ProcessorConfig, RedisProgressSink, RunProgress, StageWorker,
};

/// Processes the listed pages and answers once every item has an outcome.
pub(super) async fn start_run(
    _auth: OperatorAuth,
    State(state): State<AppState>,
    Json(payload): Json<InteractiveRunRequest>,
) -> Result<Json<InteractiveRunResponse>, ApiError> {
    payload.validate().map_err(|e| ApiError::BadRequest(e.to_string()))?;

    let settings = state.settings().interactive();
    if payload.page_ids.len() > settings.max_items {
        return Err(ApiError::BadRequest(format!(
            "At most {} pages per run",
            settings.max_items
        )));
    }

    let run_id = payload.run_id.unwrap_or_else(|| Uuid::new_v4().to_string());
    let registration = state
        .runs()
        .register(&run_id)
        .ok_or_else(|| ApiError::Conflict(format!("Run {run_id} is already in progress")))?;

    tracing::info!(run_id = %run_id, stage = payload.stage.as_str(), items = payload.page_ids.len(), "Interactive run started");

    let worker = Arc::new(StageWorker::new(
        payload.stage,
        state.store(),
        state.inference(),
        state.images(),
    ));
    let sink = RedisProgressSink::new(state.redis().clone(), settings.progress_ttl_seconds);
    let outcome = run_items(
        &run_id,
        payload.page_ids,
        worker,
        &ProcessorConfig::from(settings),
        registration.flag(),
        &sink,
    )
    .await;
    drop(registration);

    Ok(Json(InteractiveRunResponse::from_outcome(run_id, payload.stage, outcome)))
}

pub(super) async fn run_progress(
    _auth: OperatorAuth,
    State(state): State<AppState>,
    Path(run_id): Path<String>,
) -> Result<Json<RunProgress>, ApiError> {
    let raw = state
        .redis()
        .get(&progress_key(&run_id))
        .await
        .map_err(|e| ApiError::internal(e, "Failed to read run progress"))?
        .ok_or_else(|| ApiError::NotFound("Run progress not found".to_string()))?;

    let progress = serde_json::from_str(&raw)
        .map_err(|e| ApiError::internal(e, "Stored run progress is malformed"))?;

    Ok(Json(progress))
}

pub(super) async fn cancel_run(
    _auth: OperatorAuth,
    State(state): State<AppState>,
    Path(run_id): Path<String>,
) -> Result<Json<CancelRunResponse>, ApiError> {
    if !state.runs().cancel(&run_id) {
        return Err(ApiError::NotFound("Run not in progress".to_string()));
    }

    tracing::info!(run_id = %run_id, "Interactive run cancellation requested");
    Ok(Json(CancelRunResponse { run_id, cancelled: true }))
}
