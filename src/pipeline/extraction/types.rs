//! Shared types for the extraction stage: errors, backend outcomes, and
//! the capability traits the fallback chain is built on.
//!
//! Backends are injected as trait objects so tests swap in mocks and
//! callers choose concrete engines at composition time.

use serde::{Deserialize, Serialize};
use thiserror::Error;

use super::provenance::ProvenanceRecord;
use super::reader::TableRows;
use crate::models::ProcessingDefect;

// ---------------------------------------------------------------------------
// Errors
// ---------------------------------------------------------------------------

#[derive(Debug, Error)]
pub enum ExtractionError {
    #[error("unreadable document: {0}")]
    UnreadableDocument(String),

    #[error("page {page} out of range (document has {count} pages)")]
    PageOutOfRange { page: u32, count: u32 },

    #[error("operation not supported by this document source: {0}")]
    Unsupported(String),

    #[error("ocr engine failed: {0}")]
    Ocr(String),

    #[error("vision backend request failed: {0}")]
    VisionTransport(String),
}

// ---------------------------------------------------------------------------
// Vision outcomes
// ---------------------------------------------------------------------------

/// Result of one vision extraction call. Quota exhaustion is an expected
/// outcome, not an error: the chain reacts by dropping vision for the rest
/// of the run and falling back, without logging a warning per page.
#[derive(Debug, Clone)]
pub enum VisionOutcome {
    Success { markdown: String },
    QuotaExceeded,
    Failed { reason: String },
}

// ---------------------------------------------------------------------------
// Capability traits
// ---------------------------------------------------------------------------

/// Cloud vision-model extraction of a page image to markdown.
pub trait VisionExtractionService: Send + Sync {
    /// Human-readable backend identifier, recorded as the extraction tool.
    fn name(&self) -> &str;

    fn extract_page(&self, page_image: &[u8], page: u32) -> VisionOutcome;
}

/// Local OCR over a page image.
pub trait OcrService: Send + Sync {
    fn name(&self) -> &str;

    fn recognize(&self, page_image: &[u8], page: u32) -> Result<String, ExtractionError>;
}

/// Optional second-pass verification of extracted page content. A
/// successful pass relabels the tool and bumps confidence; a failed pass
/// leaves the page untouched.
pub trait VerificationService: Send + Sync {
    fn verify(&self, content: &str, page: u32) -> Result<String, ExtractionError>;
}

// ---------------------------------------------------------------------------
// Stage output
// ---------------------------------------------------------------------------

/// One page's extraction result, before assembly into the document
/// markdown.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PageExtraction {
    pub page: u32,
    pub content: String,
    pub confidence: f64,
    pub tool: String,
}

/// Complete extraction-stage output for a document.
#[derive(Debug, Default)]
pub struct ExtractedDocument {
    pub pages: Vec<PageExtraction>,
    pub records: Vec<ProvenanceRecord>,
    pub defects: Vec<ProcessingDefect>,
    pub tools_used: Vec<String>,
    /// Raw cell matrices of every extracted table, document order, for
    /// grid-similarity scoring downstream.
    pub tables: Vec<TableRows>,
}

// ---------------------------------------------------------------------------
// Mocks (exported for integration tests and downstream composition tests)
// ---------------------------------------------------------------------------

/// Vision backend returning canned outcomes per page, in call order.
pub struct MockVisionService {
    outcomes: std::sync::Mutex<Vec<VisionOutcome>>,
    pub calls: std::sync::atomic::AtomicUsize,
}

impl MockVisionService {
    /// Outcomes are consumed front-to-back, one per call. After the script
    /// runs out, every call fails.
    pub fn scripted(outcomes: Vec<VisionOutcome>) -> Self {
        Self {
            outcomes: std::sync::Mutex::new(outcomes),
            calls: std::sync::atomic::AtomicUsize::new(0),
        }
    }

    pub fn call_count(&self) -> usize {
        self.calls.load(std::sync::atomic::Ordering::SeqCst)
    }
}

impl VisionExtractionService for MockVisionService {
    fn name(&self) -> &str {
        "mock_vision"
    }

    fn extract_page(&self, _page_image: &[u8], _page: u32) -> VisionOutcome {
        self.calls
            .fetch_add(1, std::sync::atomic::Ordering::SeqCst);
        let mut outcomes = match self.outcomes.lock() {
            Ok(g) => g,
            Err(p) => p.into_inner(),
        };
        if outcomes.is_empty() {
            VisionOutcome::Failed {
                reason: "mock script exhausted".to_string(),
            }
        } else {
            outcomes.remove(0)
        }
    }
}

/// OCR engine returning fixed text for every page.
pub struct MockOcrService {
    pub text: String,
}

impl MockOcrService {
    pub fn returning(text: &str) -> Self {
        Self {
            text: text.to_string(),
        }
    }
}

impl OcrService for MockOcrService {
    fn name(&self) -> &str {
        "mock_ocr"
    }

    fn recognize(&self, _page_image: &[u8], _page: u32) -> Result<String, ExtractionError> {
        Ok(self.text.clone())
    }
}
