//! Document content analysis.
//!
//! Samples the first few pages of a document and estimates the signals
//! the router keys on: scanned-ness, math density, and table density.
//! Caller hints always win over detection. Read failures during sampling
//! fail open to the conservative default for each signal.

use crate::config::{
    ANALYSIS_SAMPLE_PAGES, MATH_SYMBOLS, SCANNED_TEXT_THRESHOLD, TABLE_DENSITY_THRESHOLD,
};
use crate::models::{DocumentDomain, DocumentHints};
use crate::pipeline::extraction::DocumentReader;

/// Routing signals for one document.
#[derive(Debug, Clone, PartialEq)]
pub struct DocumentAnalysis {
    pub page_count: u32,
    /// Average text-layer chars per sampled page fell below the scanned
    /// threshold.
    pub is_scanned: bool,
    /// Count of math-symbol occurrences across sampled pages.
    pub math_signal_count: usize,
    /// Fraction of sampled non-empty lines that look tabular.
    pub table_density: f64,
    /// Detected languages. ASCII-dominant samples read as English;
    /// anything else is left undetected.
    pub languages: Vec<String>,
    /// Coarse subject-domain estimate.
    pub domain: DocumentDomain,
}

/// Analyze a document by sampling up to the first
/// `ANALYSIS_SAMPLE_PAGES` pages. Pure over the reader; no backend calls.
pub fn analyze(reader: &dyn DocumentReader, hints: &DocumentHints) -> DocumentAnalysis {
    let page_count = reader.page_count();
    let sample_count = (page_count as usize).min(ANALYSIS_SAMPLE_PAGES);

    let mut total_chars = 0usize;
    let mut sampled_pages = 0usize;
    let mut math_count = 0usize;
    let mut tabular_lines = 0usize;
    let mut total_lines = 0usize;
    let mut ascii_chars = 0usize;

    for page in 1..=sample_count as u32 {
        let text = match reader.page_text(page) {
            Ok(t) => t,
            Err(e) => {
                // Unreadable sample page: count it as empty so a broken
                // text layer routes toward OCR rather than born-digital.
                tracing::debug!(page, error = %e, "sample page unreadable");
                sampled_pages += 1;
                continue;
            }
        };
        sampled_pages += 1;
        total_chars += text.chars().count();
        ascii_chars += text.chars().filter(char::is_ascii).count();
        math_count += text.chars().filter(|c| MATH_SYMBOLS.contains(c)).count();
        for line in text.lines() {
            let trimmed = line.trim();
            if trimmed.is_empty() {
                continue;
            }
            total_lines += 1;
            if looks_tabular(trimmed) {
                tabular_lines += 1;
            }
        }
    }

    let avg_chars = if sampled_pages == 0 {
        0.0
    } else {
        total_chars as f64 / sampled_pages as f64
    };
    let detected_scanned = page_count > 0 && avg_chars < SCANNED_TEXT_THRESHOLD as f64;
    let table_density = if total_lines == 0 {
        0.0
    } else {
        tabular_lines as f64 / total_lines as f64
    };

    let math_signal_count = if hints.contains_math == Some(true) {
        math_count.max(crate::config::MATH_SIGNAL_THRESHOLD + 1)
    } else if hints.contains_math == Some(false) {
        0
    } else {
        math_count
    };
    let table_density = if hints.contains_tables == Some(true) {
        table_density.max(TABLE_DENSITY_THRESHOLD + f64::EPSILON)
    } else if hints.contains_tables == Some(false) {
        0.0
    } else {
        table_density
    };

    let languages = if !hints.languages.is_empty() {
        hints.languages.clone()
    } else if total_chars > 0 && ascii_chars as f64 / total_chars as f64 > 0.9 {
        vec!["en".to_string()]
    } else {
        Vec::new()
    };

    let domain = hints.domain.unwrap_or_else(|| {
        if math_signal_count > crate::config::MATH_SIGNAL_THRESHOLD {
            DocumentDomain::Academic
        } else if table_density > TABLE_DENSITY_THRESHOLD {
            DocumentDomain::Business
        } else {
            DocumentDomain::General
        }
    });

    DocumentAnalysis {
        page_count,
        is_scanned: hints.is_scanned.unwrap_or(detected_scanned),
        math_signal_count,
        table_density,
        languages,
        domain,
    }
}

/// A line reads as tabular when it has pipe-delimited cells or multiple
/// tab-separated fields.
fn looks_tabular(line: &str) -> bool {
    let pipes = line.matches('|').count();
    pipes >= 2 || line.matches('\t').count() >= 2
}
