//! Provenance ledger for extracted elements.
//!
//! Every element that reaches the output markdown gets a record tying it
//! back to its source location, the tool that produced it, and a confidence
//! score. Records are append-only for the lifetime of a run.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::config::PREVIEW_MAX_CHARS;

/// Kind of extracted element a provenance record describes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ElementType {
    Text,
    Table,
    Image,
    Paragraph,
}

/// One element's origin: where it came from, what produced it, and how
/// much the producer trusted it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProvenanceRecord {
    /// Deterministic 16-hex-char digest of content, location, and page.
    pub element_hash: String,
    /// First `PREVIEW_MAX_CHARS` chars of the element content, for audit
    /// display without carrying the full text.
    pub content_preview: String,
    pub page: u32,
    /// Source bounding box as `[x0, y0, x1, y1]`. All zeros when the
    /// source format has no page geometry.
    pub coordinates: [f64; 4],
    pub extraction_tool: String,
    pub confidence: f64,
    pub timestamp: DateTime<Utc>,
    pub element_type: ElementType,
}

/// Deterministic element identity: SHA-256 over the content bytes, the
/// bounding box, and the page number, truncated to 16 hex chars. Stable
/// across runs for identical input.
pub fn element_hash(content: &str, coordinates: [f64; 4], page: u32) -> String {
    let mut hasher = Sha256::new();
    hasher.update(content.as_bytes());
    for coord in coordinates {
        hasher.update(coord.to_le_bytes());
    }
    hasher.update(page.to_le_bytes());
    let digest = hasher.finalize();
    hex::encode(&digest[..8])
}

/// Append-only collection of provenance records for one run.
#[derive(Debug, Default)]
pub struct ProvenanceLedger {
    records: Vec<ProvenanceRecord>,
}

impl ProvenanceLedger {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record an element. Returns the element hash for callers that need
    /// to reference it.
    pub fn record(
        &mut self,
        content: &str,
        page: u32,
        coordinates: [f64; 4],
        extraction_tool: &str,
        confidence: f64,
        element_type: ElementType,
    ) -> String {
        let hash = element_hash(content, coordinates, page);
        self.records.push(ProvenanceRecord {
            element_hash: hash.clone(),
            content_preview: content.chars().take(PREVIEW_MAX_CHARS).collect(),
            page,
            coordinates,
            extraction_tool: extraction_tool.to_string(),
            confidence,
            timestamp: Utc::now(),
            element_type,
        });
        hash
    }

    pub fn records(&self) -> &[ProvenanceRecord] {
        &self.records
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Fraction of recorded elements carrying a usable record (non-empty
    /// tool and hash). The denominator comes from the ledger itself, so
    /// this measures record integrity, not extraction completeness.
    pub fn coverage(&self) -> f64 {
        coverage_of(&self.records)
    }

    pub fn into_records(self) -> Vec<ProvenanceRecord> {
        self.records
    }
}

/// Coverage over a bare record slice; see [`ProvenanceLedger::coverage`]
/// for the caveat about the denominator.
pub fn coverage_of(records: &[ProvenanceRecord]) -> f64 {
    if records.is_empty() {
        return 1.0;
    }
    let usable = records
        .iter()
        .filter(|r| !r.element_hash.is_empty() && !r.extraction_tool.is_empty())
        .count();
    usable as f64 / records.len() as f64
}
