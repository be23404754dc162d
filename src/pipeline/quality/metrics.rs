//! Quality metric computation: error rates against a reference, markdown
//! structure accuracy, and table grid-similarity scoring.
//!
//! All functions here are pure and operate on already-extracted content.

use super::rules::heading_levels;
use crate::pipeline::extraction::TableRows;

// ---------------------------------------------------------------------------
// Error rates
// ---------------------------------------------------------------------------

/// Character error rate: character-level edit distance over the reference
/// length, floored at 1 to keep the empty-reference cases sane.
/// `("", "")` is 0.0; `("", "x")` and `("x", "")` are both 1.0.
pub fn calculate_cer(reference: &str, hypothesis: &str) -> f64 {
    if reference.is_empty() && hypothesis.is_empty() {
        return 0.0;
    }
    let ref_chars: Vec<char> = reference.chars().collect();
    let hyp_chars: Vec<char> = hypothesis.chars().collect();
    let edits = levenshtein(&ref_chars, &hyp_chars);
    edits as f64 / ref_chars.len().max(1) as f64
}

/// Word error rate: word-level edit distance over the reference word
/// count, floored at 1.
pub fn calculate_wer(reference: &str, hypothesis: &str) -> f64 {
    if reference.is_empty() && hypothesis.is_empty() {
        return 0.0;
    }
    let ref_words: Vec<&str> = reference.split_whitespace().collect();
    let hyp_words: Vec<&str> = hypothesis.split_whitespace().collect();
    let edits = levenshtein(&ref_words, &hyp_words);
    edits as f64 / ref_words.len().max(1) as f64
}

/// Classic two-row Levenshtein over any comparable tokens.
fn levenshtein<T: PartialEq>(a: &[T], b: &[T]) -> usize {
    if a.is_empty() {
        return b.len();
    }
    if b.is_empty() {
        return a.len();
    }
    let mut prev: Vec<usize> = (0..=b.len()).collect();
    let mut curr = vec![0usize; b.len() + 1];
    for (i, token_a) in a.iter().enumerate() {
        curr[0] = i + 1;
        for (j, token_b) in b.iter().enumerate() {
            let cost = usize::from(token_a != token_b);
            curr[j + 1] = (prev[j] + cost).min(prev[j + 1] + 1).min(curr[j] + 1);
        }
        std::mem::swap(&mut prev, &mut curr);
    }
    prev[b.len()]
}

// ---------------------------------------------------------------------------
// Structure accuracy
// ---------------------------------------------------------------------------

/// Structure accuracy in [0, 1]. Starts at 1.0, loses up to 0.3
/// proportionally to heading-hierarchy violations and a flat 0.2 for an
/// unbalanced code fence. Content with no structure scores 1.0.
pub fn structure_accuracy(content: &str) -> f64 {
    let mut score: f64 = 1.0;

    let levels = heading_levels(content);
    if !levels.is_empty() {
        let mut current = 0usize;
        let mut violations = 0usize;
        for level in &levels {
            if *level > current + 1 {
                violations += 1;
            }
            current = *level;
        }
        if violations > 0 {
            score -= (violations as f64 / levels.len() as f64) * 0.3;
        }
    }

    if content.matches("```").count() % 2 != 0 {
        score -= 0.2;
    }

    score.clamp(0.0, 1.0)
}

// ---------------------------------------------------------------------------
// Table grid similarity
// ---------------------------------------------------------------------------

/// Grid-similarity score for one table's cell matrix. Starts at 1.0,
/// loses 0.2 for inconsistent row lengths and 0.3 when more than half the
/// cells are empty. Empty input scores 0.0.
pub fn table_grits(rows: &[Vec<String>]) -> f64 {
    if rows.is_empty() {
        return 0.0;
    }
    let mut score: f64 = 1.0;

    let first_len = rows[0].len();
    if rows.iter().any(|r| r.len() != first_len) {
        score -= 0.2;
    }

    let total_cells: usize = rows.iter().map(Vec::len).sum();
    let empty_cells = rows
        .iter()
        .flatten()
        .filter(|cell| cell.trim().is_empty())
        .count();
    if total_cells > 0 && empty_cells as f64 / total_cells as f64 > 0.5 {
        score -= 0.3;
    }

    score.clamp(0.0, 1.0)
}

/// Mean grid-similarity over the extracted cell matrices. 1.0 when the
/// document has no tables.
pub fn mean_table_grits(tables: &[TableRows]) -> f64 {
    if tables.is_empty() {
        return 1.0;
    }
    let total: f64 = tables.iter().map(|t| table_grits(t)).sum();
    total / tables.len() as f64
}

#[cfg(test)]
mod tests {
    use super::*;

    // -- error rates --------------------------------------------------------

    #[test]
    fn cer_of_identical_strings_is_zero() {
        assert_eq!(calculate_cer("hello world", "hello world"), 0.0);
    }

    #[test]
    fn cer_empty_edge_cases() {
        assert_eq!(calculate_cer("", ""), 0.0);
        assert_eq!(calculate_cer("", "x"), 1.0);
        assert_eq!(calculate_cer("x", ""), 1.0);
    }

    #[test]
    fn cer_single_deletion() {
        assert!((calculate_cer("hello", "helo") - 0.2).abs() < 1e-9);
    }

    #[test]
    fn wer_counts_word_edits() {
        assert_eq!(calculate_wer("the quick brown fox", "the quick brown fox"), 0.0);
        assert!((calculate_wer("the quick brown fox", "the quick red fox") - 0.25).abs() < 1e-9);
        assert_eq!(calculate_wer("", ""), 0.0);
    }

    // -- structure ----------------------------------------------------------

    #[test]
    fn clean_structure_scores_one() {
        assert_eq!(structure_accuracy("# A\n## B\n\ntext\n"), 1.0);
        assert_eq!(structure_accuracy("plain prose only"), 1.0);
    }

    #[test]
    fn heading_jump_costs_proportionally() {
        // 1 violation over 2 headings: 1.0 - (1/2)*0.3 = 0.85
        let score = structure_accuracy("# A\n### C\n");
        assert!((score - 0.85).abs() < 1e-9);
    }

    #[test]
    fn deep_first_heading_costs_like_a_jump() {
        // 1 violation over 1 heading: 1.0 - (1/1)*0.3 = 0.7
        let score = structure_accuracy("## Deep start\n\ntext\n");
        assert!((score - 0.7).abs() < 1e-9);
    }

    #[test]
    fn odd_fence_costs_fixed_penalty() {
        let score = structure_accuracy("```\ncode\n```\n```\n");
        assert!((score - 0.8).abs() < 1e-9);
    }

    // -- tables -------------------------------------------------------------

    #[test]
    fn consistent_table_scores_one() {
        let rows = vec![
            vec!["a".to_string(), "b".to_string()],
            vec!["1".to_string(), "2".to_string()],
        ];
        assert_eq!(table_grits(&rows), 1.0);
    }

    #[test]
    fn ragged_rows_lose_a_fifth() {
        let rows = vec![
            vec!["a".to_string(), "b".to_string()],
            vec!["1".to_string()],
        ];
        assert!((table_grits(&rows) - 0.8).abs() < 1e-9);
    }

    #[test]
    fn mostly_empty_table_loses_more() {
        let rows = vec![
            vec!["a".to_string(), String::new()],
            vec![String::new(), String::new()],
        ];
        assert!((table_grits(&rows) - 0.7).abs() < 1e-9);
    }

    #[test]
    fn no_tables_means_perfect_grits() {
        assert_eq!(mean_table_grits(&[]), 1.0);
    }

    #[test]
    fn mean_grits_averages_over_tables() {
        let clean = vec![
            vec!["a".to_string(), "b".to_string()],
            vec!["1".to_string(), "2".to_string()],
        ];
        let ragged = vec![
            vec!["a".to_string(), "b".to_string()],
            vec!["1".to_string()],
        ];
        let mean = mean_table_grits(&[clean, ragged]);
        assert!((mean - 0.9).abs() < 1e-9);
    }
}
