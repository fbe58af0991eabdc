//! Page and document results

use crate::document::MediaType;
use crate::error::{PageError, PageErrorKind};
use crate::keywords::KeywordMatch;
use crate::ocr::Confidence;
use rmcp::schemars::JsonSchema;
use serde::Serialize;

/// Separator between pages in [`DocumentResult::aggregated_text`]
pub const PAGE_BOUNDARY: &str = "\n\u{000C}\n";

/// How a page's text was obtained
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, JsonSchema)]
#[serde(rename_all = "lowercase")]
pub enum ExtractionMethod {
    Native,
    Ocr,
    Failed,
}

/// Overall outcome of a document
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, JsonSchema)]
#[serde(rename_all = "lowercase")]
pub enum DocumentStatus {
    /// Every page succeeded
    Complete,
    /// Some pages succeeded, some failed
    Partial,
    /// No page succeeded, or the document could not be opened
    Failed,
}

/// Terminal outcome of one page worker
#[derive(Debug, Clone, PartialEq)]
pub enum PageOutcome {
    Native {
        text: String,
    },
    Ocr {
        text: String,
        confidence: Confidence,
        attempts: u32,
    },
    Failed {
        error: PageError,
        attempts: u32,
    },
}

#[derive(Debug, Clone, PartialEq, Serialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct PageResult {
    /// Page index (0-based, source order)
    pub index: u32,
    pub method: ExtractionMethod,
    /// 1.0 for native text, engine-reported for OCR, 0.0 for failures
    pub confidence: f32,
    /// False when the OCR engine gave no confidence and a sentinel was used
    pub confidence_verified: bool,
    pub text: String,
    pub error: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_kind: Option<PageErrorKind>,
    /// OCR invocations made for this page
    pub attempts: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub keywords: Option<Vec<KeywordMatch>>,
}

impl PageResult {
    pub fn from_outcome(index: u32, outcome: PageOutcome) -> Self {
        match outcome {
            PageOutcome::Native { text } => Self {
                index,
                method: ExtractionMethod::Native,
                confidence: Confidence::certain().value(),
                confidence_verified: true,
                text: normalize_page_text(&text),
                error: None,
                error_kind: None,
                attempts: 0,
                keywords: None,
            },
            PageOutcome::Ocr {
                text,
                confidence,
                attempts,
            } => Self {
                index,
                method: ExtractionMethod::Ocr,
                confidence: confidence.value(),
                confidence_verified: confidence.is_verified(),
                text: normalize_page_text(&text),
                error: None,
                error_kind: None,
                attempts,
                keywords: None,
            },
            PageOutcome::Failed { error, attempts } => Self::failed(index, &error, attempts),
        }
    }

    pub fn failed(index: u32, error: &PageError, attempts: u32) -> Self {
        Self {
            index,
            method: ExtractionMethod::Failed,
            confidence: 0.0,
            confidence_verified: false,
            text: String::new(),
            error: Some(error.to_string()),
            error_kind: Some(error.kind()),
            attempts,
            keywords: None,
        }
    }

    pub fn succeeded(&self) -> bool {
        self.method != ExtractionMethod::Failed
    }
}

/// Make page text safe to join with [`PAGE_BOUNDARY`]: unify line endings,
/// turn form feeds into newlines and drop trailing whitespace.
pub fn normalize_page_text(text: &str) -> String {
    text.replace("\r\n", "\n")
        .replace(['\r', '\u{000C}'], "\n")
        .trim_end()
        .to_string()
}

#[derive(Debug, Clone, PartialEq, Serialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct DocumentResult {
    /// Document display name
    pub source: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub media_type: Option<MediaType>,
    pub status: DocumentStatus,
    pub page_count: u32,
    /// Page results in page order
    pub pages: Vec<PageResult>,
    pub aggregated_text: String,
    /// Document-level failure (document could not be opened)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    pub elapsed_ms: u64,
}

impl DocumentResult {
    /// Assemble a result from page results in any order
    pub fn from_pages(
        source: impl Into<String>,
        media_type: MediaType,
        mut pages: Vec<PageResult>,
    ) -> Self {
        pages.sort_by_key(|p| p.index);
        let status = Self::status_of(&pages);
        let aggregated_text = Self::aggregate(&pages);
        Self {
            source: source.into(),
            media_type: Some(media_type),
            status,
            page_count: pages.len() as u32,
            pages,
            aggregated_text,
            error: None,
            elapsed_ms: 0,
        }
    }

    /// Result for a document that failed before any page was dispatched
    pub fn open_failed(source: impl Into<String>, media_type: Option<MediaType>, error: String) -> Self {
        Self {
            source: source.into(),
            media_type,
            status: DocumentStatus::Failed,
            page_count: 0,
            pages: Vec::new(),
            aggregated_text: String::new(),
            error: Some(error),
            elapsed_ms: 0,
        }
    }

    /// Page texts in index order joined by [`PAGE_BOUNDARY`]. Failed pages
    /// contribute an empty segment so positions stay aligned.
    pub fn aggregate(pages: &[PageResult]) -> String {
        pages
            .iter()
            .map(|p| p.text.as_str())
            .collect::<Vec<_>>()
            .join(PAGE_BOUNDARY)
    }

    pub fn status_of(pages: &[PageResult]) -> DocumentStatus {
        let succeeded = pages.iter().filter(|p| p.succeeded()).count();
        match succeeded {
            0 => DocumentStatus::Failed,
            n if n == pages.len() => DocumentStatus::Complete,
            _ => DocumentStatus::Partial,
        }
    }

    pub fn failed_pages(&self) -> impl Iterator<Item = &PageResult> {
        self.pages.iter().filter(|p| !p.succeeded())
    }

    pub fn with_elapsed(mut self, elapsed: std::time::Duration) -> Self {
        self.elapsed_ms = elapsed.as_millis() as u64;
        self
    }
}
