use serde::{Deserialize, Serialize};
use sqlx::Type;

/// Pipeline stage applied to a page.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Type)]
#[serde(rename_all = "lowercase")]
#[sqlx(type_name = "processingtype", rename_all = "lowercase")]
pub(crate) enum ProcessingType {
    Ocr,
    Translate,
    Summary,
}

impl ProcessingType {
    pub(crate) const ALL: [ProcessingType; 3] = [Self::Ocr, Self::Translate, Self::Summary];

    pub(crate) fn as_str(self) -> &'static str {
        match self {
            Self::Ocr => "ocr",
            Self::Translate => "translate",
            Self::Summary => "summary",
        }
    }

    pub(crate) fn parse(value: &str) -> Option<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "ocr" => Some(Self::Ocr),
            "translate" | "translation" => Some(Self::Translate),
            "summary" | "summarize" => Some(Self::Summary),
            _ => None,
        }
    }

    /// Stage whose result must exist before this one can run.
    pub(crate) fn prerequisite(self) -> Option<Self> {
        match self {
            Self::Ocr => None,
            Self::Translate => Some(Self::Ocr),
            Self::Summary => Some(Self::Translate),
        }
    }

    /// Column prefix of the stage result in the `pages` table.
    pub(crate) fn column_prefix(self) -> &'static str {
        match self {
            Self::Ocr => "ocr",
            Self::Translate => "translation",
            Self::Summary => "summary",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Type)]
#[serde(rename_all = "lowercase")]
#[sqlx(type_name = "batchjobstatus", rename_all = "lowercase")]
pub(crate) enum BatchJobStatus {
    Pending,
    Processing,
    Saved,
    Failed,
    Expired,
    Cancelled,
}

impl BatchJobStatus {
    pub(crate) const ACTIVE: [BatchJobStatus; 2] = [Self::Pending, Self::Processing];

    pub(crate) fn as_str(self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Processing => "processing",
            Self::Saved => "saved",
            Self::Failed => "failed",
            Self::Expired => "expired",
            Self::Cancelled => "cancelled",
        }
    }

    pub(crate) fn parse(value: &str) -> Option<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "pending" => Some(Self::Pending),
            "processing" => Some(Self::Processing),
            "saved" | "completed" => Some(Self::Saved),
            "failed" => Some(Self::Failed),
            "expired" => Some(Self::Expired),
            "cancelled" | "canceled" => Some(Self::Cancelled),
            _ => None,
        }
    }

    pub(crate) fn is_active(self) -> bool {
        matches!(self, Self::Pending | Self::Processing)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Type)]
#[serde(rename_all = "lowercase")]
#[sqlx(type_name = "resultsource", rename_all = "lowercase")]
pub(crate) enum ResultSource {
    Batch,
    Interactive,
}
