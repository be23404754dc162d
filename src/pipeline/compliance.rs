//! Compliance and governance: classification headers, PII redaction, and
//! the audit trail.
//!
//! The audit trail is injected so embedding applications can share one
//! trail across runs or swap in their own sink; nothing here is a global.
//! Redaction is idempotent: replacement markers contain nothing any
//! registered pattern matches, so re-running the guard over its own
//! output is a no-op.

use std::collections::BTreeMap;
use std::sync::{Arc, Mutex};

use chrono::{DateTime, Utc};
use regex::Regex;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::models::ComplianceConfig;

#[derive(Debug, Error)]
pub enum ComplianceError {
    #[error("invalid pii pattern '{name}': {source}")]
    InvalidPattern {
        name: String,
        #[source]
        source: regex::Error,
    },
}

// ──────────────────────────────────────────────
// Audit trail
// ──────────────────────────────────────────────

/// One action taken during a compliance pass, nested inside the pass's
/// audit entry.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "kind")]
pub enum AuditAction {
    ClassificationApplied { tag: String },
    PiiRedacted { category: String, count: usize },
}

/// Audit record of one compliance pass: exactly one entry per `apply`,
/// whether or not anything changed.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuditEntry {
    pub timestamp: DateTime<Utc>,
    pub classification: String,
    pub pii_redaction: bool,
    pub redaction_count: usize,
    pub actions: Vec<AuditAction>,
}

/// Append-only audit log, safe to share across threads. Appends serialize
/// on an internal mutex; readers get snapshots.
#[derive(Debug, Default)]
pub struct AuditTrail {
    entries: Mutex<Vec<AuditEntry>>,
}

impl AuditTrail {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record(&self, entry: AuditEntry) {
        let mut entries = match self.entries.lock() {
            Ok(g) => g,
            Err(p) => p.into_inner(),
        };
        entries.push(entry);
    }

    pub fn snapshot(&self) -> Vec<AuditEntry> {
        match self.entries.lock() {
            Ok(g) => g.clone(),
            Err(p) => p.into_inner().clone(),
        }
    }

    /// Entries as pretty-printed JSON for export.
    pub fn export_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string_pretty(&self.snapshot())
    }

    /// Aggregate counts over the trail. One entry is one compliance
    /// pass, so the entry count is the run count.
    pub fn summary(&self) -> AuditSummary {
        let entries = self.snapshot();
        let mut summary = AuditSummary {
            total_runs: entries.len(),
            ..Default::default()
        };
        for entry in &entries {
            summary.total_redactions += entry.redaction_count;
            *summary
                .classifications
                .entry(entry.classification.clone())
                .or_insert(0) += 1;
        }
        summary
    }
}

/// Aggregate view of an audit trail.
#[derive(Debug, Clone, Default, Serialize)]
pub struct AuditSummary {
    pub total_runs: usize,
    pub total_redactions: usize,
    pub classifications: BTreeMap<String, usize>,
}

// ──────────────────────────────────────────────
// Guard
// ──────────────────────────────────────────────

/// Recognized classification tags and their meanings.
const CLASSIFICATION_TAGS: &[(&str, &str)] = &[
    ("UNCLASSIFIED", "Public information"),
    ("INTERNAL", "Internal use only"),
    ("CONFIDENTIAL", "Confidential information"),
    ("RESTRICTED", "Restricted access"),
];

/// One applied redaction, in application order. `start`/`end` are byte
/// offsets into the content as it stood when that pattern ran, so offsets
/// from later patterns account for earlier replacements.
#[derive(Debug, Clone, Serialize)]
pub struct Redaction {
    pub category: String,
    pub original: String,
    pub replacement: String,
    pub start: usize,
    pub end: usize,
}

/// Result of one compliance pass.
#[derive(Debug)]
pub struct ComplianceOutcome {
    pub content: String,
    pub redaction_count: usize,
    pub redactions: Vec<Redaction>,
}

/// Classification tagging and PII redaction over final content.
pub struct ComplianceGuard {
    patterns: Vec<(String, Regex)>,
    audit: Arc<AuditTrail>,
}

impl ComplianceGuard {
    /// Guard with the built-in PII registry. Pattern order matters:
    /// earlier patterns claim overlapping text first (a dotted phone
    /// number is a phone, not an IP address).
    pub fn new(audit: Arc<AuditTrail>) -> Self {
        let builtin: &[(&str, &str)] = &[
            ("email", r"(?i)\b[A-Za-z0-9._%+-]+@[A-Za-z0-9.-]+\.[A-Za-z]{2,}\b"),
            (
                "phone",
                r"\b(?:\+?1[-.\s]?)?\(?\d{3}\)?[-.\s]?\d{3}[-.\s]?\d{4}\b",
            ),
            ("ssn", r"\b\d{3}-\d{2}-\d{4}\b"),
            ("credit_card", r"\b\d{4}[- ]?\d{4}[- ]?\d{4}[- ]?\d{4}\b"),
            ("ip_address", r"\b\d{1,3}\.\d{1,3}\.\d{1,3}\.\d{1,3}\b"),
            (
                "url",
                r"(?i)https?://(?:[-\w.])+(?:[:\d]+)?(?:/(?:[\w/_.])*(?:\?(?:[\w&=%.])*)?(?:#(?:[\w.])*)?)?",
            ),
        ];
        let patterns = builtin
            .iter()
            .filter_map(|(name, pattern)| {
                Regex::new(pattern)
                    .ok()
                    .map(|re| (name.to_string(), re))
            })
            .collect();
        Self { patterns, audit }
    }

    /// Register a custom PII pattern at runtime. The pattern must compile.
    pub fn add_pattern(&mut self, name: &str, pattern: &str) -> Result<(), ComplianceError> {
        let re = Regex::new(pattern).map_err(|source| ComplianceError::InvalidPattern {
            name: name.to_string(),
            source,
        })?;
        self.patterns.push((name.to_string(), re));
        tracing::info!(pattern = name, "custom pii pattern registered");
        Ok(())
    }

    /// Drop a pattern by name. Returns whether anything was removed;
    /// remaining patterns keep their relative order.
    pub fn remove_pattern(&mut self, name: &str) -> bool {
        let before = self.patterns.len();
        self.patterns.retain(|(n, _)| n != name);
        before != self.patterns.len()
    }

    /// Apply classification tagging and, when enabled, PII redaction.
    /// Never fails: an unrecognized tag is still applied verbatim. Every
    /// call appends exactly one audit entry, a no-op pass included.
    pub fn apply(&self, content: &str, config: &ComplianceConfig) -> ComplianceOutcome {
        let mut content = content.to_string();
        let mut redactions = Vec::new();
        let mut actions = Vec::new();

        if config.pii_redaction {
            let (redacted, applied) = self.redact(&content);
            content = redacted;
            // Nested actions carry category counts, never the matched text.
            let mut counts: BTreeMap<String, usize> = BTreeMap::new();
            for r in &applied {
                *counts.entry(r.category.clone()).or_insert(0) += 1;
            }
            for (category, count) in counts {
                actions.push(AuditAction::PiiRedacted { category, count });
            }
            redactions = applied;
        }
        let redaction_count = redactions.len();

        if !config.classification_tag.is_empty() && config.classification_tag != "UNCLASSIFIED" {
            content = format!("# {}\n\n{content}", config.classification_tag);
            actions.push(AuditAction::ClassificationApplied {
                tag: config.classification_tag.clone(),
            });
        }

        self.audit.record(AuditEntry {
            timestamp: Utc::now(),
            classification: config.classification_tag.clone(),
            pii_redaction: config.pii_redaction,
            redaction_count,
            actions,
        });

        tracing::info!(
            classification = %config.classification_tag,
            redactions = redaction_count,
            "compliance pass complete"
        );
        ComplianceOutcome {
            content,
            redaction_count,
            redactions,
        }
    }

    /// Scan without redacting: distinct matches per PII type.
    pub fn scan(&self, content: &str) -> BTreeMap<String, Vec<String>> {
        let mut findings = BTreeMap::new();
        for (name, re) in &self.patterns {
            let mut matches: Vec<String> = re
                .find_iter(content)
                .map(|m| m.as_str().to_string())
                .collect();
            matches.sort();
            matches.dedup();
            if !matches.is_empty() {
                findings.insert(name.clone(), matches);
            }
        }
        findings
    }

    fn redact(&self, content: &str) -> (String, Vec<Redaction>) {
        let mut content = content.to_string();
        let mut redactions = Vec::new();
        for (name, re) in &self.patterns {
            let marker = redaction_marker(name);
            let matches: Vec<(usize, usize, String)> = re
                .find_iter(&content)
                .map(|m| (m.start(), m.end(), m.as_str().to_string()))
                .collect();
            if matches.is_empty() {
                continue;
            }
            for (start, end, original) in matches {
                redactions.push(Redaction {
                    category: name.clone(),
                    original,
                    replacement: marker.clone(),
                    start,
                    end,
                });
            }
            content = re.replace_all(&content, marker.as_str()).into_owned();
        }
        (content, redactions)
    }

    pub fn validate_classification(tag: &str) -> bool {
        CLASSIFICATION_TAGS.iter().any(|(name, _)| *name == tag)
    }

    pub fn classification_description(tag: &str) -> Option<&'static str> {
        CLASSIFICATION_TAGS
            .iter()
            .find(|(name, _)| *name == tag)
            .map(|(_, desc)| *desc)
    }
}

fn redaction_marker(pii_type: &str) -> String {
    match pii_type {
        "email" => "[REDACTED_EMAIL]".to_string(),
        "phone" => "[REDACTED_PHONE]".to_string(),
        "ssn" => "[REDACTED_SSN]".to_string(),
        "credit_card" => "[REDACTED_CC]".to_string(),
        "ip_address" => "[REDACTED_IP]".to_string(),
        "url" => "[REDACTED_URL]".to_string(),
        other => format!("[REDACTED_{}]", other.to_uppercase()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn guard() -> ComplianceGuard {
        ComplianceGuard::new(Arc::new(AuditTrail::new()))
    }

    fn redacting_config() -> ComplianceConfig {
        ComplianceConfig {
            pii_redaction: true,
            ..Default::default()
        }
    }

    #[test]
    fn email_phone_and_ssn_are_redacted() {
        let content = "Contact john.doe@example.com or (555) 123-4567. SSN: 123-45-6789.";
        let out = guard().apply(content, &redacting_config());
        assert!(out.content.contains("[REDACTED_EMAIL]"));
        assert!(out.content.contains("[REDACTED_PHONE]"));
        assert!(out.content.contains("[REDACTED_SSN]"));
        assert!(!out.content.contains("example.com"));
        assert!(!out.content.contains("123-45-6789"));
        assert_eq!(out.redaction_count, 3);
    }

    #[test]
    fn credit_card_ip_and_url_are_redacted() {
        let content = "Card 1234-5678-9012-3456 from 192.168.1.1 via https://example.com/pay";
        let out = guard().apply(content, &redacting_config());
        assert!(out.content.contains("[REDACTED_CC]"));
        assert!(out.content.contains("[REDACTED_IP]"));
        assert!(out.content.contains("[REDACTED_URL]"));
    }

    #[test]
    fn redaction_is_idempotent() {
        let content = "Mail a@b.co, call 555-123-4567.";
        let g = guard();
        let once = g.apply(content, &redacting_config());
        let twice = g.apply(&once.content, &redacting_config());
        // Second pass redacts nothing and changes nothing.
        assert_eq!(once.content, twice.content);
        assert_eq!(twice.redaction_count, 0);
    }

    #[test]
    fn redaction_disabled_leaves_content_alone() {
        let content = "Mail a@b.co today.";
        let out = guard().apply(content, &ComplianceConfig::default());
        assert_eq!(out.content, content);
        assert_eq!(out.redaction_count, 0);
    }

    #[test]
    fn non_default_classification_prepends_header() {
        let config = ComplianceConfig {
            classification_tag: "CONFIDENTIAL".to_string(),
            ..Default::default()
        };
        let out = guard().apply("body text", &config);
        assert!(out.content.starts_with("# CONFIDENTIAL\n\n"));
        assert!(out.content.ends_with("body text"));
    }

    #[test]
    fn unclassified_gets_no_header() {
        let out = guard().apply("body text", &ComplianceConfig::default());
        assert_eq!(out.content, "body text");
    }

    #[test]
    fn custom_pattern_requires_valid_regex() {
        let mut g = guard();
        assert!(g.add_pattern("badge_id", r"\bBDG-\d{6}\b").is_ok());
        assert!(matches!(
            g.add_pattern("broken", r"([unclosed"),
            Err(ComplianceError::InvalidPattern { .. })
        ));
        let out = g.apply("Badge BDG-123456 visited.", &redacting_config());
        assert!(out.content.contains("[REDACTED_BADGE_ID]"));
    }

    #[test]
    fn failed_add_leaves_registry_intact() {
        let mut g = guard();
        assert!(g.add_pattern("broken", r"([unclosed").is_err());
        let out = g.apply("Mail a@b.co", &redacting_config());
        assert_eq!(out.content, "Mail [REDACTED_EMAIL]");
    }

    #[test]
    fn remove_pattern_drops_only_the_named_category() {
        let mut g = guard();
        assert!(g.remove_pattern("email"));
        assert!(!g.remove_pattern("email"));
        let out = g.apply("Mail a@b.co, call 555-123-4567", &redacting_config());
        assert!(out.content.contains("a@b.co"));
        assert!(out.content.contains("[REDACTED_PHONE]"));
    }

    #[test]
    fn redaction_log_records_category_and_span() {
        let out = guard().apply("Mail a@b.co now", &redacting_config());
        assert_eq!(out.redactions.len(), 1);
        let r = &out.redactions[0];
        assert_eq!(r.category, "email");
        assert_eq!(r.original, "a@b.co");
        assert_eq!(r.replacement, "[REDACTED_EMAIL]");
        assert_eq!(&"Mail a@b.co now"[r.start..r.end], "a@b.co");
    }

    #[test]
    fn audit_summary_aggregates_runs_and_redactions() {
        let trail = Arc::new(AuditTrail::new());
        let g = ComplianceGuard::new(Arc::clone(&trail));
        let config = ComplianceConfig {
            classification_tag: "INTERNAL".to_string(),
            pii_redaction: true,
            export_assets: true,
        };
        g.apply("Mail a@b.co and c@d.org", &config);
        g.apply("nothing sensitive", &ComplianceConfig::default());
        let summary = trail.summary();
        assert_eq!(summary.total_runs, 2);
        assert_eq!(summary.total_redactions, 2);
        assert_eq!(summary.classifications.get("INTERNAL"), Some(&1));
        assert_eq!(summary.classifications.get("UNCLASSIFIED"), Some(&1));
    }

    #[test]
    fn scan_reports_without_redacting() {
        let findings = guard().scan("Mail a@b.co and c@d.org");
        assert_eq!(findings.get("email").map(Vec::len), Some(2));
    }

    #[test]
    fn one_apply_is_one_structured_audit_entry() {
        let trail = Arc::new(AuditTrail::new());
        let g = ComplianceGuard::new(Arc::clone(&trail));
        let config = ComplianceConfig {
            classification_tag: "INTERNAL".to_string(),
            pii_redaction: true,
            export_assets: true,
        };
        g.apply("Mail a@b.co", &config);
        let entries = trail.snapshot();
        assert_eq!(entries.len(), 1);
        let entry = &entries[0];
        assert_eq!(entry.classification, "INTERNAL");
        assert!(entry.pii_redaction);
        assert_eq!(entry.redaction_count, 1);
        assert!(entry.actions.contains(&AuditAction::PiiRedacted {
            category: "email".to_string(),
            count: 1,
        }));
        assert!(entry.actions.contains(&AuditAction::ClassificationApplied {
            tag: "INTERNAL".to_string(),
        }));
    }

    #[test]
    fn no_op_apply_still_appends_one_entry() {
        let trail = Arc::new(AuditTrail::new());
        let g = ComplianceGuard::new(Arc::clone(&trail));
        g.apply("plain content", &ComplianceConfig::default());
        let entries = trail.snapshot();
        assert_eq!(entries.len(), 1);
        let entry = &entries[0];
        assert_eq!(entry.classification, "UNCLASSIFIED");
        assert!(!entry.pii_redaction);
        assert_eq!(entry.redaction_count, 0);
        assert!(entry.actions.is_empty());
    }

    #[test]
    fn export_leaves_history_in_place() {
        let trail = Arc::new(AuditTrail::new());
        let g = ComplianceGuard::new(Arc::clone(&trail));
        let config = ComplianceConfig {
            classification_tag: "RESTRICTED".to_string(),
            ..Default::default()
        };
        g.apply("body", &config);
        let json = trail.export_json().unwrap();
        assert!(json.contains("classification_applied"));
        assert_eq!(trail.snapshot().len(), 1);
    }

    #[test]
    fn audit_trail_is_shareable_across_threads() {
        let trail = Arc::new(AuditTrail::new());
        std::thread::scope(|s| {
            for _ in 0..4 {
                let trail = Arc::clone(&trail);
                let g = ComplianceGuard::new(trail);
                s.spawn(move || {
                    g.apply("body", &ComplianceConfig::default());
                });
            }
        });
        assert_eq!(trail.snapshot().len(), 4);
    }

    #[test]
    fn classification_registry_knows_standard_tags() {
        assert!(ComplianceGuard::validate_classification("RESTRICTED"));
        assert!(!ComplianceGuard::validate_classification("TOP_SECRET"));
        assert_eq!(
            ComplianceGuard::classification_description("INTERNAL"),
            Some("Internal use only")
        );
    }
}
