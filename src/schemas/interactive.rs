use serde::{Deserialize, Serialize};
use validator::Validate;

use crate::db::types::ProcessingType;
use crate::tasks::interactive::{ItemOutcome, RunOutcome};

#[derive(Debug, Deserialize, Validate)]
pub(crate) struct InteractiveRunRequest {
    pub(crate) stage: ProcessingType,
    #[validate(length(min = 1, message = "page_ids must not be empty"))]
    pub(crate) page_ids: Vec<String>,
    #[serde(default)]
    #[validate(length(min = 1, max = 64, message = "run_id must be 1-64 characters"))]
    pub(crate) run_id: Option<String>,
}

#[derive(Debug, Serialize)]
pub(crate) struct InteractiveRunResponse {
    pub(crate) run_id: String,
    pub(crate) stage: ProcessingType,
    pub(crate) total: usize,
    pub(crate) succeeded: usize,
    pub(crate) failed: usize,
    pub(crate) cancelled: bool,
    pub(crate) not_started: usize,
    pub(crate) banner: String,
    pub(crate) retry_ids: Vec<String>,
    pub(crate) items: Vec<ItemOutcome>,
}

impl InteractiveRunResponse {
    pub(crate) fn from_outcome(run_id: String, stage: ProcessingType, outcome: RunOutcome) -> Self {
        let total = outcome.succeeded + outcome.failed + outcome.not_started;
        Self {
            banner: banner(&outcome, total),
            run_id,
            stage,
            total,
            succeeded: outcome.succeeded,
            failed: outcome.failed,
            cancelled: outcome.cancelled,
            not_started: outcome.not_started,
            retry_ids: outcome.failed_ids,
            items: outcome.items,
        }
    }
}

fn banner(outcome: &RunOutcome, total: usize) -> String {
    if outcome.cancelled {
        return format!(
            "Cancelled: {} succeeded, {} failed, {} not started",
            outcome.succeeded, outcome.failed, outcome.not_started
        );
    }
    if outcome.failed == 0 {
        return format!("All {total} items succeeded");
    }
    format!("Completed with {} failures out of {total} items", outcome.failed)
}

#[derive(Debug, Serialize)]
pub(crate) struct CancelRunResponse {
    pub(crate) run_id: String,
    pub(crate) cancelled: bool,
}
