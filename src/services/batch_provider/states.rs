use crate::db::types::BatchJobStatus;

/// Provider state spellings and the job status each one means. New spellings are added
/// here only.
const STATE_TABLE: &[(&str, BatchJobStatus)] = &[
    ("BATCH_STATE_PENDING", BatchJobStatus::Processing),
    ("BATCH_STATE_RUNNING", BatchJobStatus::Processing),
    ("BATCH_STATE_SUCCEEDED", BatchJobStatus::Saved),
    ("BATCH_STATE_FAILED", BatchJobStatus::Failed),
    ("BATCH_STATE_CANCELLED", BatchJobStatus::Cancelled),
    ("BATCH_STATE_EXPIRED", BatchJobStatus::Expired),
    ("JOB_STATE_PENDING", BatchJobStatus::Processing),
    ("JOB_STATE_QUEUED", BatchJobStatus::Processing),
    ("JOB_STATE_RUNNING", BatchJobStatus::Processing),
    ("JOB_STATE_SUCCEEDED", BatchJobStatus::Saved),
    ("JOB_STATE_FAILED", BatchJobStatus::Failed),
    ("JOB_STATE_CANCELLING", BatchJobStatus::Processing),
    ("JOB_STATE_CANCELLED", BatchJobStatus::Cancelled),
    ("JOB_STATE_EXPIRED", BatchJobStatus::Expired),
];

/// Canonical status for a raw provider state, `None` for spellings not in the table.
pub(crate) fn canonical_status(raw: &str) -> Option<BatchJobStatus> {
    let raw = raw.trim();
    STATE_TABLE
        .iter()
        .find(|(state, _)| state.eq_ignore_ascii_case(raw))
        .map(|(_, status)| *status)
}
