use thiserror::Error;

use crate::db::models::{Book, Page, TokenUsage};
use crate::db::types::ProcessingType;
use crate::services::storage::ImageSource;

const OCR_INSTRUCTION: &str = "You transcribe scanned manuscript pages. Return only the text \
visible on the page, preserving line breaks and original spelling. Do not translate, \
modernize or comment. Mark illegible passages as [illegible].";

const TRANSLATE_INSTRUCTION: &str = "You translate historical texts. Translate the transcription \
faithfully into the requested language. Keep paragraph structure and proper names. Return only \
the translation.";

const SUMMARY_INSTRUCTION: &str = "You summarize translated manuscript pages for a library \
catalogue. Write two to four plain sentences describing the content of the page. Return only \
the summary.";

#[derive(Debug, Error)]
pub(crate) enum ContentError {
    #[error("page {page_id} has no {stage} input")]
    MissingInput { page_id: String, stage: &'static str },
    #[error("image {0} not found")]
    ImageNotFound(String),
    #[error("failed to fetch image {url}: {message}")]
    Fetch { url: String, message: String },
}

#[derive(Debug, Clone, PartialEq)]
pub(crate) enum Part {
    Text(String),
    InlineImage { mime_type: String, data: Vec<u8> },
}

/// Provider-neutral generation request for one page.
#[derive(Debug, Clone, PartialEq)]
pub(crate) struct GenerationRequest {
    pub(crate) system_instruction: String,
    pub(crate) parts: Vec<Part>,
}

#[derive(Debug, Clone, PartialEq)]
pub(crate) struct GenerationOutput {
    pub(crate) text: String,
    pub(crate) model: Option<String>,
    pub(crate) usage: Option<TokenUsage>,
}

/// Builds the request for `stage`: the page image for OCR, the transcription for
/// translation, the translation for summaries.
pub(crate) async fn build_request(
    stage: ProcessingType,
    page: &Page,
    book: &Book,
    images: &dyn ImageSource,
) -> Result<GenerationRequest, ContentError> {
    match stage {
        ProcessingType::Ocr => {
            let image = images.fetch(&page.image_url).await?;
            Ok(GenerationRequest {
                system_instruction: OCR_INSTRUCTION.to_string(),
                parts: vec![
                    Part::Text(format!(
                        "Page {} of \"{}\". Source language: {}.",
                        page.page_number, book.title, book.language
                    )),
                    Part::InlineImage { mime_type: image.mime_type, data: image.bytes },
                ],
            })
        }
        ProcessingType::Translate => {
            let source = input_text(page, ProcessingType::Ocr)?;
            Ok(GenerationRequest {
                system_instruction: TRANSLATE_INSTRUCTION.to_string(),
                parts: vec![Part::Text(format!(
                    "Translate from {} into {}.\n\n{}",
                    book.language, book.target_language, source
                ))],
            })
        }
        ProcessingType::Summary => {
            let source = input_text(page, ProcessingType::Translate)?;
            Ok(GenerationRequest {
                system_instruction: SUMMARY_INSTRUCTION.to_string(),
                parts: vec![Part::Text(format!(
                    "Summarize in {}.\n\n{}",
                    book.target_language, source
                ))],
            })
        }
    }
}

fn input_text(page: &Page, stage: ProcessingType) -> Result<&str, ContentError> {
    page.stage(stage).map(|result| result.text.as_str()).ok_or_else(|| {
        ContentError::MissingInput { page_id: page.id.clone(), stage: stage.as_str() }
    })
}
