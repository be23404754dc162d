//! Declarative QA rule table.
//!
//! Each rule is a named pure check from markdown content to defects. The
//! engine iterates the table, so adding a rule means adding an entry, not
//! another call site. Rules run in every mode; only the metric suite is
//! mode-gated.

use std::sync::OnceLock;

use regex::Regex;

use crate::models::{ProcessingDefect, Severity};

/// One structural or content check.
pub struct QaRule {
    pub name: &'static str,
    pub check: fn(&str) -> Vec<ProcessingDefect>,
}

static RULES: &[QaRule] = &[
    QaRule {
        name: "empty_content",
        check: check_empty_content,
    },
    QaRule {
        name: "heading_hierarchy",
        check: check_heading_hierarchy,
    },
    QaRule {
        name: "unclosed_list",
        check: check_unclosed_lists,
    },
    QaRule {
        name: "code_fences",
        check: check_code_fences,
    },
    QaRule {
        name: "ocr_confusables",
        check: check_ocr_confusables,
    },
];

/// The rule table, in execution order.
pub fn rule_table() -> &'static [QaRule] {
    RULES
}

fn defect(element_type: &str, description: String, severity: Severity, tool: &str) -> ProcessingDefect {
    ProcessingDefect {
        page: 0,
        element_type: element_type.to_string(),
        description,
        severity,
        tool_used: tool.to_string(),
        fallback_applied: false,
        coordinates: None,
    }
}

// ---------------------------------------------------------------------------
// Checks
// ---------------------------------------------------------------------------

fn check_empty_content(content: &str) -> Vec<ProcessingDefect> {
    if content.trim().is_empty() {
        vec![defect(
            "content",
            "Empty or missing text content".to_string(),
            Severity::High,
            "content_validator",
        )]
    } else {
        Vec::new()
    }
}

/// Heading levels extracted in document order, for both this check and
/// the structure-accuracy metric.
pub(super) fn heading_levels(content: &str) -> Vec<usize> {
    static HEADING: OnceLock<Option<Regex>> = OnceLock::new();
    let Some(re) = HEADING
        .get_or_init(|| Regex::new(r"(?m)^(#{1,6})\s+\S").ok())
        .as_ref()
    else {
        return Vec::new();
    };
    re.captures_iter(content).map(|c| c[1].len()).collect()
}

/// A heading more than one level deeper than its predecessor is a jump
/// (e.g. H1 straight to H3). The walk starts at level 0, so a document
/// whose first heading is deeper than H1 is a jump too.
fn check_heading_hierarchy(content: &str) -> Vec<ProcessingDefect> {
    let mut defects = Vec::new();
    let mut current = 0usize;
    for level in heading_levels(content) {
        if level > current + 1 {
            let description = if current == 0 {
                format!("Document begins at H{level} instead of H1")
            } else {
                format!("Heading level jump from H{current} to H{level}")
            };
            defects.push(defect(
                "heading",
                description,
                Severity::Medium,
                "structure_validator",
            ));
        }
        current = level;
    }
    defects
}

/// A list block that runs to the end of the document without a closing
/// non-indented line.
fn check_unclosed_lists(content: &str) -> Vec<ProcessingDefect> {
    let mut in_list = false;
    let mut list_start = 0usize;
    for (line_num, line) in content.lines().enumerate() {
        let stripped = line.trim();
        let is_marker = stripped.starts_with("- ")
            || stripped.starts_with("* ")
            || stripped.starts_with("+ ")
            || is_ordered_marker(stripped);
        if is_marker {
            if !in_list {
                in_list = true;
                list_start = line_num;
            }
        } else if !stripped.is_empty() && in_list && !line.starts_with(' ') {
            in_list = false;
        }
    }
    if in_list {
        vec![defect(
            "list",
            format!("Unclosed list starting at line {list_start}"),
            Severity::Low,
            "structure_validator",
        )]
    } else {
        Vec::new()
    }
}

fn is_ordered_marker(stripped: &str) -> bool {
    let Some(dot) = stripped.find(". ") else {
        return false;
    };
    dot > 0 && stripped[..dot].chars().all(|c| c.is_ascii_digit())
}

/// Odd number of ``` fences means one never closed.
fn check_code_fences(content: &str) -> Vec<ProcessingDefect> {
    let fences = content.matches("```").count();
    if fences % 2 != 0 {
        vec![defect(
            "code_block",
            "Unbalanced code fence markers".to_string(),
            Severity::Medium,
            "structure_validator",
        )]
    } else {
        Vec::new()
    }
}

/// Runs of confusable glyph families that OCR engines commonly mangle.
fn check_ocr_confusables(content: &str) -> Vec<ProcessingDefect> {
    static PATTERNS: OnceLock<Vec<(Regex, &'static str)>> = OnceLock::new();
    let patterns = PATTERNS.get_or_init(|| {
        [
            (r"[0O]{3,}", "Possible OCR confusion between 0 and O"),
            (r"[1Il]{3,}", "Possible OCR confusion between 1, I, and l"),
            (r"[5S]{3,}", "Possible OCR confusion between 5 and S"),
            (r"[8B]{3,}", "Possible OCR confusion between 8 and B"),
        ]
        .iter()
        .filter_map(|(p, d)| Regex::new(p).ok().map(|r| (r, *d)))
        .collect()
    });
    patterns
        .iter()
        .filter(|(re, _)| re.is_match(content))
        .map(|(_, description)| {
            defect(
                "ocr_artifact",
                description.to_string(),
                Severity::Low,
                "ocr_validator",
            )
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn run_rule(name: &str, content: &str) -> Vec<ProcessingDefect> {
        let rule = rule_table()
            .iter()
            .find(|r| r.name == name)
            .expect("rule exists");
        (rule.check)(content)
    }

    #[test]
    fn empty_content_is_high_severity() {
        let defects = run_rule("empty_content", "   \n\n  ");
        assert_eq!(defects.len(), 1);
        assert_eq!(defects[0].severity, Severity::High);
    }

    #[test]
    fn h1_to_h3_jump_is_flagged_medium() {
        let defects = run_rule("heading_hierarchy", "# Title\n\n### Deep section\n");
        assert_eq!(defects.len(), 1);
        assert_eq!(defects[0].severity, Severity::Medium);
        assert!(defects[0].description.contains("H1 to H3"));
    }

    #[test]
    fn stepwise_headings_pass() {
        let defects = run_rule("heading_hierarchy", "# A\n## B\n### C\n## D\n");
        assert!(defects.is_empty());
    }

    #[test]
    fn going_back_up_levels_is_fine() {
        let defects = run_rule("heading_hierarchy", "# Top\n## Mid\n### Deep\n# Back\n## Mid\n");
        assert!(defects.is_empty());
    }

    #[test]
    fn document_starting_below_h1_is_flagged() {
        let defects = run_rule("heading_hierarchy", "## Deep start\n\ntext\n");
        assert_eq!(defects.len(), 1);
        assert_eq!(defects[0].severity, Severity::Medium);
        assert!(defects[0].description.contains("begins at H2"));
    }

    #[test]
    fn list_running_to_document_end_is_unclosed() {
        let defects = run_rule("unclosed_list", "Intro\n\n- one\n- two");
        assert_eq!(defects.len(), 1);
        assert_eq!(defects[0].severity, Severity::Low);
    }

    #[test]
    fn terminated_list_is_fine() {
        let defects = run_rule("unclosed_list", "- one\n- two\n\nClosing paragraph.\n");
        assert!(defects.is_empty());
    }

    #[test]
    fn three_fences_are_unbalanced() {
        let content = "```\ncode\n```\ntext\n```\n";
        let defects = run_rule("code_fences", content);
        assert_eq!(defects.len(), 1);
        assert_eq!(defects[0].element_type, "code_block");
        assert_eq!(defects[0].severity, Severity::Medium);
    }

    #[test]
    fn balanced_fences_pass() {
        assert!(run_rule("code_fences", "```\ncode\n```\n").is_empty());
    }

    #[test]
    fn confusable_runs_flag_once_per_family() {
        let content = "serial 000O0 and lIl1l twice IIIl";
        let defects = run_rule("ocr_confusables", content);
        assert_eq!(defects.len(), 2);
        assert!(defects.iter().all(|d| d.severity == Severity::Low));
    }

    #[test]
    fn short_runs_are_not_confusable() {
        assert!(run_rule("ocr_confusables", "O0 Il 5S 8B").is_empty());
    }
}
