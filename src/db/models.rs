use serde::{Deserialize, Serialize};
use sqlx::types::Json;
use sqlx::FromRow;
use time::PrimitiveDateTime;

use crate::db::types::{BatchJobStatus, ProcessingType, ResultSource};

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub(crate) struct TokenUsage {
    pub(crate) prompt_tokens: Option<i64>,
    pub(crate) output_tokens: Option<i64>,
    pub(crate) total_tokens: Option<i64>,
}

/// Output of one pipeline stage for one page. Never holds empty text.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub(crate) struct StageResult {
    pub(crate) text: String,
    pub(crate) model: String,
    pub(crate) source: ResultSource,
    pub(crate) usage: Option<TokenUsage>,
    pub(crate) created_at: PrimitiveDateTime,
    pub(crate) updated_at: PrimitiveDateTime,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub(crate) struct Page {
    pub(crate) id: String,
    pub(crate) book_id: String,
    pub(crate) page_number: i32,
    pub(crate) image_url: String,
    pub(crate) ocr: Option<StageResult>,
    pub(crate) translation: Option<StageResult>,
    pub(crate) summary: Option<StageResult>,
}

impl Page {
    pub(crate) fn stage(&self, stage: ProcessingType) -> Option<&StageResult> {
        match stage {
            ProcessingType::Ocr => self.ocr.as_ref(),
            ProcessingType::Translate => self.translation.as_ref(),
            ProcessingType::Summary => self.summary.as_ref(),
        }
    }

    pub(crate) fn stage_mut(&mut self, stage: ProcessingType) -> &mut Option<StageResult> {
        match stage {
            ProcessingType::Ocr => &mut self.ocr,
            ProcessingType::Translate => &mut self.translation,
            ProcessingType::Summary => &mut self.summary,
        }
    }

    pub(crate) fn has_stage(&self, stage: ProcessingType) -> bool {
        self.stage(stage).is_some()
    }

    /// A page needs `stage` when it lacks a result for it and its prerequisite is done.
    pub(crate) fn needs_stage(&self, stage: ProcessingType) -> bool {
        !self.has_stage(stage)
            && stage.prerequisite().map_or(true, |prerequisite| self.has_stage(prerequisite))
    }
}

#[derive(Debug, Clone, FromRow)]
pub(crate) struct PageRow {
    pub(crate) id: String,
    pub(crate) book_id: String,
    pub(crate) page_number: i32,
    pub(crate) image_url: String,
    pub(crate) ocr_text: Option<String>,
    pub(crate) ocr_model: Option<String>,
    pub(crate) ocr_source: Option<ResultSource>,
    pub(crate) ocr_usage: Option<Json<TokenUsage>>,
    pub(crate) ocr_created_at: Option<PrimitiveDateTime>,
    pub(crate) ocr_updated_at: Option<PrimitiveDateTime>,
    pub(crate) translation_text: Option<String>,
    pub(crate) translation_model: Option<String>,
    pub(crate) translation_source: Option<ResultSource>,
    pub(crate) translation_usage: Option<Json<TokenUsage>>,
    pub(crate) translation_created_at: Option<PrimitiveDateTime>,
    pub(crate) translation_updated_at: Option<PrimitiveDateTime>,
    pub(crate) summary_text: Option<String>,
    pub(crate) summary_model: Option<String>,
    pub(crate) summary_source: Option<ResultSource>,
    pub(crate) summary_usage: Option<Json<TokenUsage>>,
    pub(crate) summary_created_at: Option<PrimitiveDateTime>,
    pub(crate) summary_updated_at: Option<PrimitiveDateTime>,
}

impl From<PageRow> for Page {
    fn from(row: PageRow) -> Self {
        Self {
            ocr: stage_from_columns(
                row.ocr_text,
                row.ocr_model,
                row.ocr_source,
                row.ocr_usage,
                row.ocr_created_at,
                row.ocr_updated_at,
            ),
            translation: stage_from_columns(
                row.translation_text,
                row.translation_model,
                row.translation_source,
                row.translation_usage,
                row.translation_created_at,
                row.translation_updated_at,
            ),
            summary: stage_from_columns(
                row.summary_text,
                row.summary_model,
                row.summary_source,
                row.summary_usage,
                row.summary_created_at,
                row.summary_updated_at,
            ),
            id: row.id,
            book_id: row.book_id,
            page_number: row.page_number,
            image_url: row.image_url,
        }
    }
}

/// Partial or blank stage columns read back as an absent result.
fn stage_from_columns(
    text: Option<String>,
    model: Option<String>,
    source: Option<ResultSource>,
    usage: Option<Json<TokenUsage>>,
    created_at: Option<PrimitiveDateTime>,
    updated_at: Option<PrimitiveDateTime>,
) -> Option<StageResult> {
    let text = text.filter(|value| !value.trim().is_empty())?;
    let updated_at = updated_at.or(created_at)?;

    Some(StageResult {
        text,
        model: model.unwrap_or_default(),
        source: source.unwrap_or(ResultSource::Batch),
        usage: usage.map(|value| value.0),
        created_at: created_at.unwrap_or(updated_at),
        updated_at,
    })
}

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub(crate) struct Book {
    pub(crate) id: String,
    pub(crate) title: String,
    pub(crate) language: String,
    pub(crate) target_language: String,
    pub(crate) pages_count: i32,
    pub(crate) pages_with_ocr: i32,
    pub(crate) pages_translated: i32,
    pub(crate) pages_summarized: i32,
    pub(crate) created_at: PrimitiveDateTime,
    pub(crate) updated_at: PrimitiveDateTime,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, FromRow)]
pub(crate) struct BookCounters {
    pub(crate) pages_count: i32,
    pub(crate) pages_with_ocr: i32,
    pub(crate) pages_translated: i32,
    pub(crate) pages_summarized: i32,
}

/// Pages of one book that still need a stage, in reading order.
#[derive(Debug, Clone)]
pub(crate) struct BookBacklog {
    pub(crate) book: Book,
    pub(crate) page_ids: Vec<String>,
    /// Some pages of the book already carry a result for the stage.
    pub(crate) stage_started: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub(crate) struct BatchJob {
    pub(crate) id: String,
    pub(crate) remote_ref: String,
    pub(crate) book_id: String,
    pub(crate) processing_type: ProcessingType,
    pub(crate) status: BatchJobStatus,
    pub(crate) provider_state: Option<String>,
    pub(crate) page_ids: Json<Vec<String>>,
    pub(crate) total_pages: i32,
    pub(crate) completed_pages: i32,
    pub(crate) failed_pages: i32,
    pub(crate) model: String,
    pub(crate) input_artifact: Option<String>,
    pub(crate) error_message: Option<String>,
    pub(crate) created_at: PrimitiveDateTime,
    pub(crate) updated_at: PrimitiveDateTime,
    pub(crate) completed_at: Option<PrimitiveDateTime>,
}

impl BatchJob {
    pub(crate) fn is_active(&self) -> bool {
        self.status.is_active()
    }
}
