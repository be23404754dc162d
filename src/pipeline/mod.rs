//! Document conversion pipeline.
//!
//! Stage order is fixed: analyze, route, extract, assess, comply,
//! report. `processor::DocumentProcessor` is the public entry point;
//! every other module is a stage it composes.

pub mod analyze;
pub mod cancel;
pub mod compliance;
pub mod extraction;
pub mod processor;
pub mod quality;
pub mod report;
pub mod router;

use thiserror::Error;

/// Run-level failures. Per-page trouble never surfaces here; it becomes
/// defects in the run report. Vision quota exhaustion is likewise not an
/// error but a chain outcome.
#[derive(Debug, Error)]
pub enum ProcessingError {
    #[error("invalid request: {0}")]
    Validation(String),

    #[error(transparent)]
    Extraction(#[from] extraction::ExtractionError),

    #[error(transparent)]
    Compliance(#[from] compliance::ComplianceError),

    #[error("processing cancelled: runtime ceiling exceeded")]
    Cancelled,

    #[error("fatal: {0}")]
    Fatal(String),
}

pub use analyze::{analyze as analyze_document, DocumentAnalysis};
pub use cancel::CancelToken;
pub use compliance::{
    AuditAction, AuditEntry, AuditSummary, AuditTrail, ComplianceGuard, ComplianceOutcome,
    Redaction,
};
pub use processor::DocumentProcessor;
pub use quality::{CrossValidationReport, CrossValidator, QualityEngine};
pub use report::generate_run_id;
pub use router::{content_plan, route, ContentPlan, Strategy};
