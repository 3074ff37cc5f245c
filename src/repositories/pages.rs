use sqlx::types::Json;
use sqlx::{PgPool, Postgres, QueryBuilder};

use crate::db::models::{Page, PageRow, StageResult};
use crate::db::types::ProcessingType;
use crate::repositories::batch_jobs::ACTIVE_STATUSES;

pub(crate) const COLUMNS: &str = "\
    id, book_id, page_number, image_url, \
    ocr_text, ocr_model, ocr_source, ocr_usage, ocr_created_at, ocr_updated_at, \
    translation_text, translation_model, translation_source, translation_usage, \
    translation_created_at, translation_updated_at, \
    summary_text, summary_model, summary_source, summary_usage, \
    summary_created_at, summary_updated_at";

#[derive(Debug, sqlx::FromRow)]
pub(crate) struct BacklogRow {
    pub(crate) book_id: String,
    pub(crate) page_id: String,
    pub(crate) stage_started: bool,
}

fn has_text(alias: &str, stage: ProcessingType) -> String {
    let prefix = stage.column_prefix();
    format!("({alias}.{prefix}_text IS NOT NULL AND btrim({alias}.{prefix}_text) <> '')")
}

pub(crate) async fn find_by_ids(pool: &PgPool, ids: &[String]) -> Result<Vec<Page>, sqlx::Error> {
    if ids.is_empty() {
        return Ok(Vec::new());
    }

    let rows = sqlx::query_as::<_, PageRow>(&format!(
        "SELECT {COLUMNS} FROM pages WHERE id = ANY($1) ORDER BY book_id, page_number"
    ))
    .bind(ids)
    .fetch_all(pool)
    .await?;

    Ok(rows.into_iter().map(Page::from).collect())
}

/// Pages lacking `stage` whose prerequisite is done, skipping books with an active job
/// for the same stage. Ordered by book age, then page number.
pub(crate) async fn backlog(
    pool: &PgPool,
    stage: ProcessingType,
    book_id: Option<&str>,
) -> Result<Vec<BacklogRow>, sqlx::Error> {
    let mut builder = QueryBuilder::<Postgres>::new(format!(
        "SELECT p.book_id, p.id AS page_id, \
                EXISTS (SELECT 1 FROM pages q WHERE q.book_id = p.book_id AND {started}) \
                    AS stage_started \
         FROM pages p \
         JOIN books b ON b.id = p.book_id \
         WHERE NOT {done}",
        started = has_text("q", stage),
        done = has_text("p", stage),
    ));

    if let Some(prerequisite) = stage.prerequisite() {
        builder.push(format!(" AND {}", has_text("p", prerequisite)));
    }

    builder.push(
        " AND NOT EXISTS (SELECT 1 FROM batch_jobs j \
           WHERE j.book_id = p.book_id AND j.processing_type = ",
    );
    builder.push_bind(stage);
    builder.push(format!(" AND j.status IN ({ACTIVE_STATUSES}))"));

    if let Some(book_id) = book_id {
        builder.push(" AND p.book_id = ");
        builder.push_bind(book_id);
    }

    builder.push(" ORDER BY b.created_at, p.book_id, p.page_number");

    builder.build_query_as::<BacklogRow>().fetch_all(pool).await
}

/// Overwrites one stage result. Returns false when the page does not exist.
pub(crate) async fn write_stage_result(
    pool: &PgPool,
    page_id: &str,
    stage: ProcessingType,
    result: &StageResult,
) -> Result<bool, sqlx::Error> {
    let prefix = stage.column_prefix();
    let query = format!(
        "UPDATE pages SET \
            {prefix}_text = $1, \
            {prefix}_model = $2, \
            {prefix}_source = $3, \
            {prefix}_usage = $4, \
            {prefix}_created_at = COALESCE({prefix}_created_at, $5), \
            {prefix}_updated_at = $6 \
         WHERE id = $7"
    );

    let outcome = sqlx::query(&query)
        .bind(&result.text)
        .bind(&result.model)
        .bind(result.source)
        .bind(result.usage.clone().map(Json))
        .bind(result.created_at)
        .bind(result.updated_at)
        .bind(page_id)
        .execute(pool)
        .await?;

    Ok(outcome.rows_affected() > 0)
}
