//! Quality assurance stage: rule table, metric computation, and the
//! mode-aware engine that ties them together.

pub mod engine;
pub mod metrics;
pub mod rules;

pub use engine::{CrossValidationReport, CrossValidator, QualityAssessment, QualityEngine};
pub use metrics::{calculate_cer, calculate_wer, mean_table_grits, structure_accuracy, table_grits};
pub use rules::{rule_table, QaRule};
