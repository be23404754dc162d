//! Fallback chain execution.
//!
//! Runs the strategy chosen by the router over every page of the
//! document. The chain for scanned content is vision extraction, then
//! local OCR, then the embedded text layer; each stage only runs when the
//! one before it produced nothing usable. A page where every stage fails
//! yields a High defect and an empty page, never an error: one bad page
//! must not sink the run.
//!
//! Beyond page text, the content plan can ask for embedded tables
//! (rendered to markdown, raw cell matrices kept for grid scoring) and
//! image references.
//!
//! Quota exhaustion on the vision backend flips a run-wide flag so later
//! pages skip vision entirely. That outcome is expected operational
//! behavior and is logged at debug, unlike genuine backend failures which
//! warn.

use std::sync::atomic::{AtomicBool, Ordering};

use super::provenance::{ElementType, ProvenanceLedger};
use super::reader::{DocumentReader, ImageRef, TableRows, WordBlock};
use super::types::{
    ExtractedDocument, OcrService, PageExtraction, VerificationService, VisionExtractionService,
    VisionOutcome,
};
use crate::config::confidence;
use crate::models::{ProcessingDefect, Severity};
use crate::pipeline::cancel::CancelToken;
use crate::pipeline::router::{ContentPlan, Strategy};

/// Tool label for text-layer extraction.
const TEXT_LAYER_TOOL: &str = "text_layer";
/// Tool label for reader-sourced table extraction.
const TABLE_TOOL: &str = "table_extractor";
/// Tool label for reader-sourced image references.
const IMAGE_TOOL: &str = "reader";
/// Tool label recorded when every stage failed on a page.
const NO_TOOL: &str = "none";

/// Backends available to the chain. All optional: a chain with no
/// backends degrades to text-layer extraction.
#[derive(Default, Clone, Copy)]
pub struct ChainBackends<'a> {
    pub vision: Option<&'a dyn VisionExtractionService>,
    pub ocr: Option<&'a dyn OcrService>,
    pub verifier: Option<&'a dyn VerificationService>,
}

/// One page's text outcome before provenance recording.
struct PageOutcome {
    content: String,
    confidence: f64,
    tool: String,
    defects: Vec<ProcessingDefect>,
}

/// Full per-page result: text outcome plus any planned table and image
/// content.
struct PageWork {
    outcome: PageOutcome,
    tables: Vec<TableRows>,
    images: Vec<ImageRef>,
}

/// Run the chosen strategy over the whole document.
///
/// Page work fans out across at most `page_workers` threads per batch;
/// page order in the output is always the document order. Cancellation is
/// checked between batches, so a cancelled run returns the pages finished
/// so far.
pub fn extract_document(
    strategy: Strategy,
    plan: ContentPlan,
    reader: &dyn DocumentReader,
    backends: ChainBackends<'_>,
    page_workers: usize,
    cancel: &CancelToken,
) -> ExtractedDocument {
    if strategy == Strategy::WordNative {
        return extract_word(reader);
    }

    let page_count = reader.page_count();
    let workers = page_workers.max(1);
    let quota_dead = AtomicBool::new(false);
    let ocr_tool = backends.ocr.map(|o| o.name().to_string());

    let mut ledger = ProvenanceLedger::new();
    let mut doc = ExtractedDocument::default();

    let pages: Vec<u32> = (1..=page_count).collect();
    for batch in pages.chunks(workers) {
        if cancel.is_cancelled() {
            tracing::info!(completed = doc.pages.len(), "extraction cancelled mid-run");
            break;
        }

        let results: Vec<(u32, Option<PageWork>)> = std::thread::scope(|s| {
            let handles: Vec<_> = batch
                .iter()
                .map(|&page| {
                    let quota_dead = &quota_dead;
                    s.spawn(move || {
                        (page, extract_page(strategy, plan, reader, page, backends, quota_dead))
                    })
                })
                .collect();
            handles
                .into_iter()
                .zip(batch.iter())
                .map(|(handle, &page)| match handle.join() {
                    Ok((p, work)) => (p, Some(work)),
                    Err(_) => (page, None),
                })
                .collect()
        });

        for (page, work) in results {
            let mut work = match work {
                Some(w) => w,
                None => PageWork {
                    outcome: PageOutcome {
                        content: String::new(),
                        confidence: 0.0,
                        tool: NO_TOOL.to_string(),
                        defects: vec![ProcessingDefect {
                            page,
                            element_type: "page".to_string(),
                            description: "page worker panicked".to_string(),
                            severity: Severity::High,
                            tool_used: NO_TOOL.to_string(),
                            fallback_applied: false,
                            coordinates: None,
                        }],
                    },
                    tables: Vec::new(),
                    images: Vec::new(),
                },
            };

            // The verification pass is for OCR output only.
            if ocr_tool.as_deref() == Some(work.outcome.tool.as_str()) {
                apply_verification(&mut work.outcome, page, backends.verifier);
            }
            let outcome = work.outcome;

            if !outcome.content.is_empty() {
                ledger.record(
                    &outcome.content,
                    page,
                    [0.0; 4],
                    &outcome.tool,
                    outcome.confidence,
                    ElementType::Text,
                );
            }
            if outcome.tool != NO_TOOL && !doc.tools_used.contains(&outcome.tool) {
                doc.tools_used.push(outcome.tool.clone());
            }
            doc.defects.extend(outcome.defects);

            let mut content = outcome.content;
            for rows in &work.tables {
                let rendered = render_table(rows);
                if rendered.is_empty() {
                    continue;
                }
                ledger.record(
                    &rendered,
                    page,
                    [0.0; 4],
                    TABLE_TOOL,
                    confidence::TABLE,
                    ElementType::Table,
                );
                if !doc.tools_used.contains(&TABLE_TOOL.to_string()) {
                    doc.tools_used.push(TABLE_TOOL.to_string());
                }
                push_segment(&mut content, &rendered);
            }
            doc.tables.extend(work.tables);

            for image in &work.images {
                let rendered = format!("![{}]({})", image.alt_text, image.name);
                ledger.record(
                    &rendered,
                    page,
                    [0.0; 4],
                    IMAGE_TOOL,
                    confidence::TEXT_LAYER,
                    ElementType::Image,
                );
                if !doc.tools_used.contains(&IMAGE_TOOL.to_string()) {
                    doc.tools_used.push(IMAGE_TOOL.to_string());
                }
                push_segment(&mut content, &rendered);
            }

            doc.pages.push(PageExtraction {
                page,
                content,
                confidence: outcome.confidence,
                tool: outcome.tool,
            });
        }
    }

    doc.records = ledger.into_records();
    doc
}

fn push_segment(content: &mut String, segment: &str) {
    if !content.is_empty() {
        content.push_str("\n\n");
    }
    content.push_str(segment);
}

/// Join page contents into document markdown. Multi-page documents get a
/// `--- Page N ---` separator line above each page.
pub fn assemble_markdown(pages: &[PageExtraction]) -> String {
    match pages {
        [] => String::new(),
        [single] => single.content.clone(),
        many => many
            .iter()
            .map(|p| format!("--- Page {} ---\n\n{}", p.page, p.content))
            .collect::<Vec<_>>()
            .join("\n\n"),
    }
}

// ---------------------------------------------------------------------------
// Per-page extraction
// ---------------------------------------------------------------------------

fn extract_page(
    strategy: Strategy,
    plan: ContentPlan,
    reader: &dyn DocumentReader,
    page: u32,
    backends: ChainBackends<'_>,
    quota_dead: &AtomicBool,
) -> PageWork {
    let outcome = match strategy {
        Strategy::OcrChain => ocr_chain_page(reader, page, backends, quota_dead),
        // Math-aware extraction currently reads the text layer; a math
        // recognition backend slots in here once one is wired up.
        Strategy::MathAware => text_layer_page(reader, page, "math_aware", confidence::TEXT_LAYER),
        Strategy::TableAware | Strategy::BornDigitalText | Strategy::WordNative => {
            text_layer_page(reader, page, TEXT_LAYER_TOOL, confidence::TEXT_LAYER)
        }
    };

    let tables = if plan.tables {
        match reader.page_tables(page) {
            Ok(tables) => tables,
            Err(e) => {
                tracing::warn!(page, error = %e, "table read failed, continuing without tables");
                Vec::new()
            }
        }
    } else {
        Vec::new()
    };

    let images = if plan.images {
        match reader.page_images(page) {
            Ok(images) => images,
            Err(e) => {
                tracing::warn!(page, error = %e, "image read failed, continuing without images");
                Vec::new()
            }
        }
    } else {
        Vec::new()
    };

    PageWork {
        outcome,
        tables,
        images,
    }
}

/// Vision, then OCR, then text layer. First stage to produce non-empty
/// content wins.
fn ocr_chain_page(
    reader: &dyn DocumentReader,
    page: u32,
    backends: ChainBackends<'_>,
    quota_dead: &AtomicBool,
) -> PageOutcome {
    let mut defects = Vec::new();

    let image = match reader.page_image(page) {
        Ok(bytes) => Some(bytes),
        Err(e) => {
            tracing::warn!(page, error = %e, "page image unavailable, skipping image stages");
            None
        }
    };

    if let (Some(vision), Some(image)) = (backends.vision, image.as_deref()) {
        if !quota_dead.load(Ordering::SeqCst) {
            match vision.extract_page(image, page) {
                VisionOutcome::Success { markdown } if !markdown.trim().is_empty() => {
                    return PageOutcome {
                        content: markdown,
                        confidence: confidence::VISION,
                        tool: vision.name().to_string(),
                        defects,
                    };
                }
                VisionOutcome::Success { .. } => {
                    tracing::warn!(page, "vision returned empty content, falling back");
                }
                VisionOutcome::QuotaExceeded => {
                    quota_dead.store(true, Ordering::SeqCst);
                    tracing::debug!(page, "vision quota exhausted, disabling for remaining pages");
                }
                VisionOutcome::Failed { reason } => {
                    tracing::warn!(page, reason = %reason, "vision extraction failed, falling back");
                    defects.push(ProcessingDefect {
                        page,
                        element_type: "page".to_string(),
                        description: format!("vision extraction failed: {reason}"),
                        severity: Severity::Low,
                        tool_used: vision.name().to_string(),
                        fallback_applied: true,
                        coordinates: None,
                    });
                }
            }
        }
    }

    if let (Some(ocr), Some(image)) = (backends.ocr, image.as_deref()) {
        match ocr.recognize(image, page) {
            Ok(text) if !text.trim().is_empty() => {
                let conf = if text.len() > confidence::OCR_SHORT_TEXT {
                    confidence::OCR
                } else {
                    confidence::OCR_SHORT
                };
                return PageOutcome {
                    content: text,
                    confidence: conf,
                    tool: ocr.name().to_string(),
                    defects,
                };
            }
            Ok(_) => {
                tracing::warn!(page, "ocr produced no text, falling back to text layer");
            }
            Err(e) => {
                tracing::warn!(page, error = %e, "ocr failed, falling back to text layer");
                defects.push(ProcessingDefect {
                    page,
                    element_type: "page".to_string(),
                    description: format!("ocr failed: {e}"),
                    severity: Severity::Low,
                    tool_used: ocr.name().to_string(),
                    fallback_applied: true,
                    coordinates: None,
                });
            }
        }
    }

    match reader.page_text(page) {
        Ok(text) if !text.trim().is_empty() => PageOutcome {
            content: text,
            confidence: confidence::TEXT_LAYER,
            tool: TEXT_LAYER_TOOL.to_string(),
            defects,
        },
        _ => {
            defects.push(ProcessingDefect {
                page,
                element_type: "page".to_string(),
                description: "all extraction stages failed".to_string(),
                severity: Severity::High,
                tool_used: NO_TOOL.to_string(),
                fallback_applied: true,
                coordinates: None,
            });
            PageOutcome {
                content: String::new(),
                confidence: 0.0,
                tool: NO_TOOL.to_string(),
                defects,
            }
        }
    }
}

fn text_layer_page(
    reader: &dyn DocumentReader,
    page: u32,
    tool: &str,
    page_confidence: f64,
) -> PageOutcome {
    match reader.page_text(page) {
        Ok(text) if !text.trim().is_empty() => PageOutcome {
            content: text,
            confidence: page_confidence,
            tool: tool.to_string(),
            defects: Vec::new(),
        },
        Ok(_) => PageOutcome {
            content: String::new(),
            confidence: 0.0,
            tool: tool.to_string(),
            defects: Vec::new(),
        },
        Err(e) => {
            tracing::warn!(page, error = %e, "text layer read failed");
            PageOutcome {
                content: String::new(),
                confidence: 0.0,
                tool: NO_TOOL.to_string(),
                defects: vec![ProcessingDefect {
                    page,
                    element_type: "page".to_string(),
                    description: format!("text layer read failed: {e}"),
                    severity: Severity::High,
                    tool_used: NO_TOOL.to_string(),
                    fallback_applied: false,
                    coordinates: None,
                }],
            }
        }
    }
}

/// Second-pass verification of OCR output. Already-certain pages (at or
/// above the cap) are skipped; everything else gets relabelled and a
/// capped bump. The caller gates this on the page having come from the
/// OCR backend.
fn apply_verification(
    outcome: &mut PageOutcome,
    page: u32,
    verifier: Option<&dyn VerificationService>,
) {
    let Some(verifier) = verifier else { return };
    if outcome.content.is_empty() || outcome.confidence >= confidence::VERIFICATION_CAP {
        return;
    }
    match verifier.verify(&outcome.content, page) {
        Ok(verified) => {
            outcome.content = verified;
            outcome.tool = format!("{}+llm_verification", outcome.tool);
            outcome.confidence =
                (outcome.confidence + confidence::VERIFICATION_BUMP).min(confidence::VERIFICATION_CAP);
        }
        Err(e) => {
            tracing::warn!(page, error = %e, "verification pass failed, keeping original content");
        }
    }
}

// ---------------------------------------------------------------------------
// Word documents
// ---------------------------------------------------------------------------

/// Word-format extraction: the block stream maps straight to markdown,
/// with a provenance record per paragraph and per table. Word sources
/// carry no geometry, so every record sits on page 1 with a zero box.
fn extract_word(reader: &dyn DocumentReader) -> ExtractedDocument {
    let mut doc = ExtractedDocument::default();
    let mut ledger = ProvenanceLedger::new();

    let blocks = match reader.word_blocks() {
        Ok(blocks) => blocks,
        Err(e) => {
            tracing::warn!(error = %e, "word block stream unavailable");
            doc.defects.push(ProcessingDefect {
                page: 1,
                element_type: "document".to_string(),
                description: format!("word extraction failed: {e}"),
                severity: Severity::High,
                tool_used: "word_native".to_string(),
                fallback_applied: false,
                coordinates: None,
            });
            doc.pages.push(PageExtraction {
                page: 1,
                content: String::new(),
                confidence: 0.0,
                tool: NO_TOOL.to_string(),
            });
            return doc;
        }
    };

    let mut segments = Vec::new();
    let mut table_index = 0u32;
    for block in &blocks {
        match block {
            WordBlock::Paragraph(text) => {
                if text.trim().is_empty() {
                    continue;
                }
                ledger.record(
                    text,
                    1,
                    [0.0; 4],
                    "word_native",
                    confidence::TEXT_LAYER,
                    ElementType::Paragraph,
                );
                segments.push(text.clone());
            }
            WordBlock::Table(rows) => {
                table_index += 1;
                let rendered = render_table(rows);
                ledger.record(
                    &rendered,
                    1,
                    [0.0; 4],
                    "word_native",
                    confidence::TABLE,
                    ElementType::Table,
                );
                doc.tables.push(rows.clone());
                segments.push(format!("[Table {table_index}]\n\n{rendered}"));
            }
        }
    }

    let content = segments.join("\n\n");
    doc.tools_used.push("word_native".to_string());
    doc.pages.push(PageExtraction {
        page: 1,
        content,
        confidence: confidence::TEXT_LAYER,
        tool: "word_native".to_string(),
    });
    doc.records = ledger.into_records();
    doc
}

/// Rows to a markdown table, first row as header.
fn render_table(rows: &[Vec<String>]) -> String {
    let Some((header, body)) = rows.split_first() else {
        return String::new();
    };
    let mut out = String::new();
    out.push_str(&format!("| {} |\n", header.join(" | ")));
    out.push_str(&format!(
        "|{}\n",
        " --- |".repeat(header.len().max(1))
    ));
    for row in body {
        out.push_str(&format!("| {} |\n", row.join(" | ")));
    }
    out.trim_end().to_string()
}
