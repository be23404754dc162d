//! QA engine: runs the rule table, recovers what it can, and computes
//! the metric suite appropriate to the run mode.
//!
//! Production runs get the structural rules and provenance coverage only.
//! Evaluation and bedding runs add error rates, structure accuracy, table
//! scoring, and optional cross-validation.

use std::sync::Arc;
use std::sync::OnceLock;

use regex::Regex;

use super::metrics::{calculate_cer, calculate_wer, mean_table_grits, structure_accuracy};
use super::rules::rule_table;
use crate::models::{ProcessingDefect, QualityMetrics, RunMode, Severity};
use crate::pipeline::extraction::TableRows;

/// Outcome of an independent second opinion on extracted content.
#[derive(Debug, Default)]
pub struct CrossValidationReport {
    pub defects: Vec<ProcessingDefect>,
    pub content_completeness: Option<f64>,
}

/// Dual-tool cross-validation of extraction output. Injected; absent by
/// default.
pub trait CrossValidator: Send + Sync {
    fn validate(&self, content: &str) -> CrossValidationReport;
}

/// Result of one QA pass. `content` carries any recoveries applied.
#[derive(Debug)]
pub struct QualityAssessment {
    pub content: String,
    pub metrics: QualityMetrics,
    pub defects: Vec<ProcessingDefect>,
}

#[derive(Default)]
pub struct QualityEngine {
    cross_validator: Option<Arc<dyn CrossValidator>>,
}

impl QualityEngine {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_cross_validator(mut self, validator: Arc<dyn CrossValidator>) -> Self {
        self.cross_validator = Some(validator);
        self
    }

    /// Assess extracted content. `tables` are the raw cell matrices the
    /// extraction stage produced; grid scoring works on those, not on the
    /// rendered markdown. `reference` is ground-truth text when the
    /// caller has one (evaluation corpora); error rates stay 0.0 without
    /// it.
    pub fn assess(
        &self,
        content: &str,
        tables: &[TableRows],
        mode: RunMode,
        provenance_coverage: f64,
        vision_confidence: Option<f64>,
        reference: Option<&str>,
    ) -> QualityAssessment {
        let mut defects = Vec::new();

        let content = recover_blank_runs(content, &mut defects);

        for rule in rule_table() {
            let found = (rule.check)(&content);
            if !found.is_empty() {
                tracing::debug!(rule = rule.name, count = found.len(), "qa rule flagged content");
            }
            defects.extend(found);
        }

        let mut metrics = QualityMetrics {
            provenance_coverage,
            vision_confidence,
            ..Default::default()
        };

        if mode.full_qa() {
            if let Some(reference) = reference {
                metrics.cer = calculate_cer(reference, &content);
                metrics.wer = calculate_wer(reference, &content);
            }
            metrics.structure_accuracy = structure_accuracy(&content);
            metrics.table_grits = mean_table_grits(tables);
            // No equation extraction backend yet, so there is nothing to
            // mismatch against.
            metrics.math_token_match = 1.0;

            if let Some(validator) = &self.cross_validator {
                let report = validator.validate(&content);
                metrics.content_completeness = report.content_completeness;
                defects.extend(report.defects);
            }
        }

        tracing::info!(
            mode = ?mode,
            defects = defects.len(),
            provenance_coverage,
            "qa pass complete"
        );

        QualityAssessment {
            content,
            metrics,
            defects,
        }
    }
}

/// Collapse runs of three or more blank-ish lines to one blank line,
/// recording a recovered Low defect when anything was collapsed.
fn recover_blank_runs(content: &str, defects: &mut Vec<ProcessingDefect>) -> String {
    static BLANK_RUN: OnceLock<Option<Regex>> = OnceLock::new();
    let Some(re) = BLANK_RUN
        .get_or_init(|| Regex::new(r"\n[ \t]*\n(?:[ \t]*\n)+").ok())
        .as_ref()
    else {
        return content.to_string();
    };

    if !re.is_match(content) {
        return content.to_string();
    }
    defects.push(ProcessingDefect {
        page: 0,
        element_type: "content".to_string(),
        description: "Excessive whitespace detected".to_string(),
        severity: Severity::Low,
        tool_used: "content_validator".to_string(),
        fallback_applied: true,
        coordinates: None,
    });
    re.replace_all(content, "\n\n").into_owned()
}
