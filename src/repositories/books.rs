use sqlx::PgPool;
use time::PrimitiveDateTime;

use crate::db::models::{Book, BookCounters};

pub(crate) const COLUMNS: &str = "\
    id, title, language, target_language, pages_count, pages_with_ocr, \
    pages_translated, pages_summarized, created_at, updated_at";

pub(crate) async fn find_by_id(pool: &PgPool, id: &str) -> Result<Option<Book>, sqlx::Error> {
    sqlx::query_as::<_, Book>(&format!("SELECT {COLUMNS} FROM books WHERE id = $1"))
        .bind(id)
        .fetch_optional(pool)
        .await
}

pub(crate) async fn list_by_ids(pool: &PgPool, ids: &[String]) -> Result<Vec<Book>, sqlx::Error> {
    if ids.is_empty() {
        return Ok(Vec::new());
    }

    sqlx::query_as::<_, Book>(&format!("SELECT {COLUMNS} FROM books WHERE id = ANY($1)"))
        .bind(ids)
        .fetch_all(pool)
        .await
}

/// Rebuilds the aggregate counters from page state.
pub(crate) async fn recompute_counters(
    pool: &PgPool,
    id: &str,
    now: PrimitiveDateTime,
) -> Result<BookCounters, sqlx::Error> {
    sqlx::query_as::<_, BookCounters>(
        "UPDATE books b SET
            pages_count = c.pages_count,
            pages_with_ocr = c.pages_with_ocr,
            pages_translated = c.pages_translated,
            pages_summarized = c.pages_summarized,
            updated_at = $2
         FROM (
            SELECT COUNT(*)::int AS pages_count,
                   COUNT(*) FILTER (WHERE btrim(COALESCE(ocr_text, '')) <> '')::int
                       AS pages_with_ocr,
                   COUNT(*) FILTER (WHERE btrim(COALESCE(translation_text, '')) <> '')::int
                       AS pages_translated,
                   COUNT(*) FILTER (WHERE btrim(COALESCE(summary_text, '')) <> '')::int
                       AS pages_summarized
            FROM pages WHERE book_id = $1
         ) c
         WHERE b.id = $1
         RETURNING b.pages_count, b.pages_with_ocr, b.pages_translated, b.pages_summarized",
    )
    .bind(id)
    .bind(now)
    .fetch_one(pool)
    .await
}
