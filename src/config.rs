//! Pipeline-wide design constants.
//!
//! These are deliberate policy values, not tunables: routing reproducibility
//! depends on every deployment using the same thresholds.

/// Crate version, surfaced in run reports.
pub const CORE_VERSION: &str = env!("CARGO_PKG_VERSION");

/// Pages sampled by the characteristic analyzer.
pub const ANALYSIS_SAMPLE_PAGES: usize = 3;

/// A document whose sampled pages average fewer extractable characters than
/// this is treated as scanned. Design constant — not user-configurable;
/// hints are the supported override mechanism.
pub const SCANNED_TEXT_THRESHOLD: usize = 50;

/// Math signal count above which routing prefers the math-aware strategy.
pub const MATH_SIGNAL_THRESHOLD: usize = 5;

/// Table density (tables per sampled page) above which routing prefers the
/// table-aware strategy.
pub const TABLE_DENSITY_THRESHOLD: f64 = 0.5;

/// Fixed vocabulary of mathematical symbols counted during analysis.
pub const MATH_SYMBOLS: &[char] = &[
    '∑', '∫', '∏', '√', '∞', '±', '≤', '≥', '≠', '≈', '→', '←', '↔',
];

/// Static per-tool provenance confidence. These are policy constants, not
/// model-calibrated scores.
pub mod confidence {
    /// Vision-model page extraction.
    pub const VISION: f64 = 0.95;
    /// OCR output longer than [`OCR_SHORT_TEXT`] characters.
    pub const OCR: f64 = 0.85;
    /// OCR output at or below [`OCR_SHORT_TEXT`] characters.
    pub const OCR_SHORT: f64 = 0.50;
    /// Born-digital text layer read.
    pub const TEXT_LAYER: f64 = 1.0;
    /// Table extraction from the reader.
    pub const TABLE: f64 = 0.9;
    /// Boundary between short and normal OCR output.
    pub const OCR_SHORT_TEXT: usize = 100;
    /// Bump applied when a vision verification pass corrects OCR output.
    pub const VERIFICATION_BUMP: f64 = 0.1;
    /// Ceiling for any verified confidence.
    pub const VERIFICATION_CAP: f64 = 0.95;
}

/// Timeout for a single outbound page call (vision or OCR backend).
pub const PAGE_CALL_TIMEOUT_SECS: u64 = 60;

/// Default endpoint for the vision extraction backend when the caller
/// supplies a credential but no client of their own.
pub const VISION_API_BASE_URL: &str = "https://api.openai.com/v1";

/// Default vision model requested from the backend.
pub const VISION_MODEL: &str = "gpt-4o";

/// Default bound for concurrent page-level extraction work. Kept low
/// because vision API rate limits dominate; overridable per request.
pub const DEFAULT_PAGE_WORKERS: usize = 4;

/// Provenance content previews are truncated to this many characters.
pub const PREVIEW_MAX_CHARS: usize = 100;

/// Default tracing filter when `RUST_LOG` is unset.
pub fn default_log_filter() -> &'static str {
    "veridoc=info"
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn scanned_threshold_is_fifty_chars() {
        // Routing reproducibility depends on this exact value.
        assert_eq!(SCANNED_TEXT_THRESHOLD, 50);
    }

    #[test]
    fn confidence_constants_are_probabilities() {
        for c in [
            confidence::VISION,
            confidence::OCR,
            confidence::OCR_SHORT,
            confidence::TEXT_LAYER,
            confidence::TABLE,
        ] {
            assert!((0.0..=1.0).contains(&c));
        }
    }

    #[test]
    fn verification_cap_not_exceeded_by_bump() {
        assert!(confidence::OCR + confidence::VERIFICATION_BUMP >= confidence::VERIFICATION_CAP);
        assert!(confidence::VERIFICATION_CAP <= confidence::VISION);
    }

    #[test]
    fn math_vocabulary_is_fixed() {
        assert_eq!(MATH_SYMBOLS.len(), 13);
        assert!(MATH_SYMBOLS.contains(&'∑'));
    }
}
