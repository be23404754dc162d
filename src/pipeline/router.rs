//! Extraction strategy routing.
//!
//! First-match-wins over an ordered rule list. Pure function — no I/O —
//! so routing decisions are trivially replayable from the analysis
//! snapshot recorded in the run report.

use serde::{Deserialize, Serialize};

use crate::config::{MATH_SIGNAL_THRESHOLD, TABLE_DENSITY_THRESHOLD};
use crate::models::DocumentKind;
use crate::pipeline::analyze::DocumentAnalysis;

/// Extraction strategy for a document. The variant name is what lands in
/// the report's `router_decisions` map.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Strategy {
    WordNative,
    OcrChain,
    MathAware,
    TableAware,
    BornDigitalText,
}

impl Strategy {
    /// Stable label for report serialization.
    pub fn label(self) -> &'static str {
        match self {
            Strategy::WordNative => "word_native",
            Strategy::OcrChain => "ocr_chain",
            Strategy::MathAware => "math_aware",
            Strategy::TableAware => "table_aware",
            Strategy::BornDigitalText => "born_digital_text",
        }
    }
}

/// Content types a strategy is expected to produce. Text is always in
/// scope; the rest depend on the strategy and request flags.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ContentPlan {
    pub text: bool,
    pub tables: bool,
    pub equations: bool,
    pub images: bool,
}

/// Map a strategy to the content types the extraction pass will pursue.
pub fn content_plan(strategy: Strategy, export_assets: bool) -> ContentPlan {
    ContentPlan {
        text: true,
        tables: matches!(strategy, Strategy::TableAware | Strategy::WordNative),
        equations: strategy == Strategy::MathAware,
        images: export_assets,
    }
}

/// Pick the extraction strategy. Rule order is part of the contract:
/// container format first, then scanned-ness, then math, then tables.
pub fn route(kind: DocumentKind, analysis: &DocumentAnalysis) -> Strategy {
    let strategy = if kind == DocumentKind::Word {
        Strategy::WordNative
    } else if analysis.is_scanned {
        Strategy::OcrChain
    } else if analysis.math_signal_count > MATH_SIGNAL_THRESHOLD {
        Strategy::MathAware
    } else if analysis.table_density > TABLE_DENSITY_THRESHOLD {
        Strategy::TableAware
    } else {
        Strategy::BornDigitalText
    };

    tracing::info!(
        strategy = strategy.label(),
        kind = ?kind,
        is_scanned = analysis.is_scanned,
        math_signals = analysis.math_signal_count,
        table_density = analysis.table_density,
        "routed document"
    );
    strategy
}
