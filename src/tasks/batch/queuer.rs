use super::{planner, selector, BatchPipeline, RunReport};
use crate::db::types::ProcessingType;
use crate::repositories::store::StoreError;

/// Downstream stages first, so books finish what they started.
const STAGE_PRIORITY: [ProcessingType; 3] =
    [ProcessingType::Summary, ProcessingType::Translate, ProcessingType::Ocr];

/// New jobs allowed this pass: zero at or above the ceiling, otherwise the free capacity
/// capped by `max_new_jobs`.
pub(crate) fn job_budget(active: u64, ceiling: u64, max_new_jobs: u64) -> u64 {
    if active >= ceiling {
        return 0;
    }
    (ceiling - active).min(max_new_jobs)
}

pub(super) fn stage_order(configured: &[ProcessingType]) -> Vec<ProcessingType> {
    STAGE_PRIORITY.into_iter().filter(|stage| configured.contains(stage)).collect()
}

pub(super) async fn queue_new_work(
    pipeline: &BatchPipeline,
    max_new_jobs: Option<u64>,
    report: &mut RunReport,
) -> Result<(), StoreError> {
    let active = pipeline.store.count_active_jobs().await?;
    let mut budget = job_budget(
        active,
        pipeline.settings.max_active_jobs,
        max_new_jobs.unwrap_or(pipeline.settings.max_new_jobs),
    );

    if budget == 0 {
        tracing::info!(
            active,
            ceiling = pipeline.settings.max_active_jobs,
            "No batch capacity; skipping new work"
        );
        return Ok(());
    }

    for stage in stage_order(&pipeline.settings.stages) {
        if budget == 0 {
            break;
        }

        let backlogs = match selector::select_backlog(pipeline.store.as_ref(), stage, None).await {
            Ok(backlogs) => backlogs,
            Err(err) => {
                report.errors.push(format!("select {} backlog: {err}", stage.as_str()));
                continue;
            }
        };

        if backlogs.is_empty() {
            continue;
        }

        tracing::info!(stage = stage.as_str(), books = backlogs.len(), budget, "Queuing backlog");

        let (started, untouched) = selector::started_first(backlogs);
        for tier in [started, untouched] {
            if budget == 0 {
                break;
            }
            let created = planner::submit_backlogs(pipeline, stage, tier, budget, report).await;
            budget = budget.saturating_sub(created);
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn budget_is_zero_at_or_above_ceiling() {
        assert_eq!(job_budget(10, 10, 5), 0);
        assert_eq!(job_budget(12, 10, 5), 0);
    }

    #[test]
    fn budget_is_capped_by_free_capacity_and_max_new_jobs() {
        assert_eq!(job_budget(8, 10, 5), 2);
        assert_eq!(job_budget(0, 10, 5), 5);
        assert_eq!(job_budget(0, 10, 0), 0);
    }

    #[test]
    fn stage_order_favours_downstream_stages() {
        assert_eq!(stage_order(&ProcessingType::ALL), STAGE_PRIORITY.to_vec());
        assert_eq!(
            stage_order(&[ProcessingType::Ocr, ProcessingType::Translate]),
            vec![ProcessingType::Translate, ProcessingType::Ocr]
        );
    }
}
