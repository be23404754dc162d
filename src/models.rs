//! Request and report data model for the conversion pipeline.
//!
//! Everything here is serde-serializable: run reports and provenance records
//! are emitted as JSON artifacts alongside the converted markdown.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

// ---------------------------------------------------------------------------
// Request side
// ---------------------------------------------------------------------------

/// Processing mode. Production runs the basic QA checks; evaluation and
/// bedding runs add the full metric suite.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum RunMode {
    #[default]
    Production,
    Evaluation,
    Bedding,
}

impl RunMode {
    /// Whether this mode runs the full QA suite.
    pub fn full_qa(self) -> bool {
        matches!(self, RunMode::Evaluation | RunMode::Bedding)
    }
}

/// Compliance and governance configuration, immutable per request.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ComplianceConfig {
    pub classification_tag: String,
    pub pii_redaction: bool,
    pub export_assets: bool,
}

impl Default for ComplianceConfig {
    fn default() -> Self {
        Self {
            classification_tag: "UNCLASSIFIED".to_string(),
            pii_redaction: false,
            export_assets: true,
        }
    }
}

/// Resource ceilings for a single run. `max_runtime_s` is enforced between
/// pipeline stages via the cancellation token; `max_memory_mb` is advisory.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProcessingCeilings {
    pub max_runtime_s: u64,
    pub max_memory_mb: u64,
    /// Upper bound on concurrent page-level extraction work. Vision API
    /// rate limits are the reason this exists and stays small.
    pub page_workers: usize,
}

impl Default for ProcessingCeilings {
    fn default() -> Self {
        Self {
            max_runtime_s: 3600,
            max_memory_mb: 8192,
            page_workers: crate::config::DEFAULT_PAGE_WORKERS,
        }
    }
}

/// Caller-supplied hints about document content. A set field always wins
/// over the analyzer's detection for that field.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DocumentHints {
    pub contains_math: Option<bool>,
    pub contains_tables: Option<bool>,
    pub is_scanned: Option<bool>,
    #[serde(default)]
    pub languages: Vec<String>,
    pub domain: Option<DocumentDomain>,
}

/// Container format of the input document, derived by the caller
/// (typically from the file extension).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum DocumentKind {
    #[default]
    Pdf,
    Word,
    Unknown,
}

/// Coarse subject-domain estimate used for routing context.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum DocumentDomain {
    #[default]
    General,
    Academic,
    Business,
    Technical,
}

/// A single conversion request. The document itself is passed separately
/// as a `DocumentReader` capability.
#[derive(Debug, Clone, Default)]
pub struct ProcessingRequest {
    /// Label recorded in the run report (usually the source filename).
    pub input_label: String,
    pub kind: DocumentKind,
    pub run_mode: RunMode,
    pub hints: DocumentHints,
    pub ceilings: ProcessingCeilings,
    pub compliance: ComplianceConfig,
    /// Credential for the vision extraction backend. Absent → the chain
    /// starts at OCR (or the text layer for born-digital documents).
    pub vision_api_key: Option<String>,
}

// ---------------------------------------------------------------------------
// Defects and metrics
// ---------------------------------------------------------------------------

/// Defect severity tier. `High` and `Critical` defects block run success.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Severity {
    Low,
    Medium,
    High,
    Critical,
}

impl Severity {
    /// Whether a defect of this severity prevents a successful run.
    pub fn blocks_success(self) -> bool {
        matches!(self, Severity::High | Severity::Critical)
    }
}

/// A recorded quality or structural issue. Defects are append-only; no
/// stage may remove one recorded by an earlier stage.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProcessingDefect {
    pub page: u32,
    pub element_type: String,
    pub description: String,
    pub severity: Severity,
    pub tool_used: String,
    #[serde(default)]
    pub fallback_applied: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub coordinates: Option<[f64; 4]>,
}

/// Quality metrics for a conversion. Error rates are ≥ 0; everything else
/// lives in [0, 1].
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct QualityMetrics {
    /// Character error rate against a reference, when one exists.
    pub cer: f64,
    /// Word error rate against a reference, when one exists.
    pub wer: f64,
    /// Mean structural-similarity score over extracted tables.
    pub table_grits: f64,
    pub math_token_match: f64,
    pub structure_accuracy: f64,
    /// Ratio of extracted elements carrying a provenance record.
    ///
    /// Completeness heuristic only: the denominator is derived from the
    /// provenance ledger itself, so a run that silently dropped elements
    /// can still score ≈ 1.0 here.
    pub provenance_coverage: f64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub vision_confidence: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub content_completeness: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub image_caption_accuracy: Option<f64>,
}

// ---------------------------------------------------------------------------
// Report side
// ---------------------------------------------------------------------------

/// Comprehensive record of one processing run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunReport {
    pub run_id: String,
    pub timestamp: DateTime<Utc>,
    pub input_label: String,
    pub run_mode: RunMode,
    pub tools_used: Vec<String>,
    pub tool_versions: BTreeMap<String, String>,
    pub quality_metrics: QualityMetrics,
    pub defects: Vec<ProcessingDefect>,
    pub processing_time_s: f64,
    pub memory_peak_mb: f64,
    /// Strategy chosen per content type, for audit replay.
    pub router_decisions: BTreeMap<String, String>,
    pub compliance_applied: ComplianceConfig,
    /// Computed once by the report assembler from the final defect list and
    /// content state — never set ad hoc by an individual stage.
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_message: Option<String>,
}

/// Final output of `process`: the converted markdown, the provenance
/// ledger contents, and the run report. File layout is the caller's
/// concern (see `storage`).
#[derive(Debug, Clone)]
pub struct ConversionResult {
    pub markdown_content: String,
    pub provenance_records: Vec<crate::pipeline::extraction::provenance::ProvenanceRecord>,
    pub run_report: RunReport,
}
