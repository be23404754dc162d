//! Pipeline orchestrator.
//!
//! `DocumentProcessor` wires analysis, routing, extraction, QA,
//! compliance, and report assembly into one `process` call. The call
//! never panics outward and never returns an error for a bad document:
//! every failure mode lands in the run report, so a batch caller can
//! always persist an artifact per input.

use std::collections::BTreeMap;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::Arc;
use std::time::Instant;

use chrono::Utc;

use super::analyze::analyze;
use super::cancel::CancelToken;
use super::compliance::{AuditTrail, ComplianceGuard};
use super::extraction::{
    assemble_markdown, coverage_of, extract_document, ChainBackends, DocumentReader, OcrService,
    OpenAiVisionClient, VerificationService, VisionExtractionService,
};
use super::quality::{CrossValidator, QualityEngine};
use super::report::{self, generate_run_id, ReportInputs};
use super::router::{content_plan, route, Strategy};
use super::ProcessingError;
use crate::config::{self, PREVIEW_MAX_CHARS};
use crate::models::{ConversionResult, ProcessingDefect, ProcessingRequest, RunReport, Severity};

pub struct DocumentProcessor {
    vision: Option<Arc<dyn VisionExtractionService>>,
    ocr: Option<Arc<dyn OcrService>>,
    verifier: Option<Arc<dyn VerificationService>>,
    quality: QualityEngine,
    guard: ComplianceGuard,
    audit: Arc<AuditTrail>,
}

impl Default for DocumentProcessor {
    fn default() -> Self {
        Self::new()
    }
}

impl DocumentProcessor {
    /// Processor with no extraction backends: text-layer and word-native
    /// strategies fully work, scanned documents degrade through the
    /// chain's fallbacks.
    pub fn new() -> Self {
        let audit = Arc::new(AuditTrail::new());
        Self {
            vision: None,
            ocr: None,
            verifier: None,
            quality: QualityEngine::new(),
            guard: ComplianceGuard::new(Arc::clone(&audit)),
            audit,
        }
    }

    pub fn with_vision(mut self, vision: Arc<dyn VisionExtractionService>) -> Self {
        self.vision = Some(vision);
        self
    }

    pub fn with_ocr(mut self, ocr: Arc<dyn OcrService>) -> Self {
        self.ocr = Some(ocr);
        self
    }

    pub fn with_verifier(mut self, verifier: Arc<dyn VerificationService>) -> Self {
        self.verifier = Some(verifier);
        self
    }

    pub fn with_cross_validator(mut self, validator: Arc<dyn CrossValidator>) -> Self {
        self.quality = std::mem::take(&mut self.quality).with_cross_validator(validator);
        self
    }

    /// Share an audit trail owned by the embedding application.
    pub fn with_audit_trail(mut self, audit: Arc<AuditTrail>) -> Self {
        self.guard = ComplianceGuard::new(Arc::clone(&audit));
        self.audit = audit;
        self
    }

    /// Register an additional PII pattern with the compliance guard.
    pub fn with_pii_pattern(mut self, name: &str, pattern: &str) -> Result<Self, ProcessingError> {
        self.guard.add_pattern(name, pattern)?;
        Ok(self)
    }

    pub fn audit_trail(&self) -> Arc<AuditTrail> {
        Arc::clone(&self.audit)
    }

    /// Convert one document. Infallible by contract: validation errors,
    /// cancellation, and internal panics all come back as a failed
    /// `ConversionResult` with the cause in `run_report.error_message`.
    pub fn process(
        &self,
        request: &ProcessingRequest,
        reader: &dyn DocumentReader,
    ) -> ConversionResult {
        let run_id = generate_run_id();
        let start = Instant::now();

        if let Err(e) = validate_request(request) {
            return failure_result(&run_id, request, start.elapsed().as_secs_f64(), e.to_string());
        }

        let outcome = catch_unwind(AssertUnwindSafe(|| self.run(&run_id, request, reader)));
        match outcome {
            Ok(Ok(result)) => result,
            Ok(Err(e)) => {
                tracing::error!(run_id = %run_id, error = %e, "run aborted");
                failure_result(&run_id, request, start.elapsed().as_secs_f64(), e.to_string())
            }
            Err(_) => {
                tracing::error!(run_id = %run_id, "run panicked, containing");
                failure_result(
                    &run_id,
                    request,
                    start.elapsed().as_secs_f64(),
                    ProcessingError::Fatal("unexpected internal failure".to_string()).to_string(),
                )
            }
        }
    }

    fn run(
        &self,
        run_id: &str,
        request: &ProcessingRequest,
        reader: &dyn DocumentReader,
    ) -> Result<ConversionResult, ProcessingError> {
        let start = Instant::now();
        let cancel = CancelToken::with_deadline(request.ceilings.max_runtime_s);
        tracing::info!(
            run_id = %run_id,
            input = %request.input_label,
            mode = ?request.run_mode,
            "processing started"
        );

        // Analysis and routing.
        let analysis = analyze(reader, &request.hints);
        let strategy = route(request.kind, &analysis);
        let plan = content_plan(strategy, request.compliance.export_assets);
        tracing::debug!(
            tables = plan.tables,
            equations = plan.equations,
            images = plan.images,
            "content plan"
        );
        let mut router_decisions = BTreeMap::new();
        router_decisions.insert("document".to_string(), strategy.label().to_string());

        // Extraction. A credential on the request stands in for any
        // backend that was not injected, vision and verification alike.
        let credential_client = request.vision_api_key.as_ref().map(|key| {
            OpenAiVisionClient::new(config::VISION_API_BASE_URL, key, config::VISION_MODEL)
        });
        let backends = ChainBackends {
            vision: self
                .vision
                .as_deref()
                .or(credential_client
                    .as_ref()
                    .map(|v| v as &dyn VisionExtractionService)),
            ocr: self.ocr.as_deref(),
            verifier: self
                .verifier
                .as_deref()
                .or(credential_client
                    .as_ref()
                    .map(|v| v as &dyn VerificationService)),
        };
        let extracted = extract_document(
            strategy,
            plan,
            reader,
            backends,
            request.ceilings.page_workers,
            &cancel,
        );
        if cancel.is_cancelled() {
            return Err(ProcessingError::Cancelled);
        }

        let content = assemble_markdown(&extracted.pages);
        tracing::debug!(
            run_id = %run_id,
            preview = %content.chars().take(PREVIEW_MAX_CHARS).collect::<String>(),
            "extraction complete"
        );

        // QA over the assembled content.
        let vision_confidence = vision_confidence(strategy, &extracted.pages, backends.vision);
        let assessment = self.quality.assess(
            &content,
            &extracted.tables,
            request.run_mode,
            coverage_of(&extracted.records),
            vision_confidence,
            None,
        );
        if cancel.is_cancelled() {
            return Err(ProcessingError::Cancelled);
        }

        // Compliance over the recovered content.
        let compliance = self.guard.apply(&assessment.content, &request.compliance);

        let mut defects = extracted.defects;
        defects.extend(assessment.defects);

        let report = report::assemble(
            ReportInputs {
                run_id: run_id.to_string(),
                input_label: request.input_label.clone(),
                run_mode: request.run_mode,
                tools_used: extracted.tools_used,
                quality_metrics: assessment.metrics,
                defects,
                processing_time_s: start.elapsed().as_secs_f64(),
                router_decisions,
                compliance_applied: request.compliance.clone(),
                error_message: None,
            },
            &compliance.content,
        );

        tracing::info!(
            run_id = %run_id,
            success = report.success,
            pages = extracted.pages.len(),
            redactions = compliance.redaction_count,
            "processing finished"
        );

        Ok(ConversionResult {
            markdown_content: compliance.content,
            provenance_records: extracted.records,
            run_report: report,
        })
    }
}

/// Mean confidence over vision-extracted pages, when the run used the
/// scanned chain and a vision backend produced anything.
fn vision_confidence(
    strategy: Strategy,
    pages: &[super::extraction::PageExtraction],
    vision: Option<&dyn VisionExtractionService>,
) -> Option<f64> {
    let vision = vision?;
    if strategy != Strategy::OcrChain {
        return None;
    }
    let scores: Vec<f64> = pages
        .iter()
        .filter(|p| p.tool.starts_with(vision.name()))
        .map(|p| p.confidence)
        .collect();
    if scores.is_empty() {
        None
    } else {
        Some(scores.iter().sum::<f64>() / scores.len() as f64)
    }
}

fn validate_request(request: &ProcessingRequest) -> Result<(), ProcessingError> {
    if request.input_label.trim().is_empty() {
        return Err(ProcessingError::Validation(
            "input_label must not be empty".to_string(),
        ));
    }
    Ok(())
}

/// Failed-run result: empty content, a Critical containment defect, and
/// the cause in the report.
fn failure_result(
    run_id: &str,
    request: &ProcessingRequest,
    elapsed_s: f64,
    error_message: String,
) -> ConversionResult {
    let defect = ProcessingDefect {
        page: 0,
        element_type: "document".to_string(),
        description: error_message.clone(),
        severity: Severity::Critical,
        tool_used: "processor".to_string(),
        fallback_applied: false,
        coordinates: None,
    };
    let report = RunReport {
        run_id: run_id.to_string(),
        timestamp: Utc::now(),
        input_label: request.input_label.clone(),
        run_mode: request.run_mode,
        tools_used: Vec::new(),
        tool_versions: BTreeMap::new(),
        quality_metrics: Default::default(),
        defects: vec![defect],
        processing_time_s: elapsed_s,
        memory_peak_mb: report::memory_peak_mb(),
        router_decisions: BTreeMap::new(),
        compliance_applied: request.compliance.clone(),
        success: false,
        error_message: Some(error_message),
    };
    ConversionResult {
        markdown_content: String::new(),
        provenance_records: Vec::new(),
        run_report: report,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{ComplianceConfig, DocumentKind, RunMode};
    use crate::pipeline::extraction::{
        ElementType, InMemoryDocument, MockOcrService, MockVisionService, VisionOutcome, WordBlock,
    };

    fn request(label: &str) -> ProcessingRequest {
        ProcessingRequest {
            input_label: label.to_string(),
            ..Default::default()
        }
    }

    fn dense_page(text: &str) -> String {
        format!(
            "{text}\n\n{}",
            "filler prose to stay born-digital. ".repeat(5)
        )
    }

    #[test]
    fn born_digital_document_succeeds_end_to_end() {
        let doc = InMemoryDocument::from_pages(vec![dense_page("# Report\n\n## Findings")]);
        let result = DocumentProcessor::new().process(&request("report.pdf"), &doc);
        assert!(result.run_report.success);
        assert!(result.markdown_content.contains("# Report"));
        assert_eq!(
            result.run_report.router_decisions.get("document"),
            Some(&"born_digital_text".to_string())
        );
        assert_eq!(result.provenance_records.len(), 1);
        assert!(result.run_report.error_message.is_none());
    }

    #[test]
    fn scanned_document_routes_through_chain() {
        let doc = InMemoryDocument::from_pages(vec!["", ""]);
        let vision = Arc::new(MockVisionService::scripted(vec![
            VisionOutcome::Success {
                markdown: "# Scanned page one".into(),
            },
            VisionOutcome::Success {
                markdown: "Scanned page two".into(),
            },
        ]));
        let mut req = request("scan.pdf");
        req.ceilings.page_workers = 1;
        let result = DocumentProcessor::new()
            .with_vision(vision)
            .process(&req, &doc);
        assert_eq!(
            result.run_report.router_decisions.get("document"),
            Some(&"ocr_chain".to_string())
        );
        assert!(result.markdown_content.contains("--- Page 1 ---"));
        assert!(result.markdown_content.contains("Scanned page two"));
        assert!(result
            .run_report
            .tools_used
            .contains(&"mock_vision".to_string()));
        assert!(result.run_report.success);
    }

    #[test]
    fn quota_mid_run_falls_back_without_failing() {
        let doc = InMemoryDocument::from_pages(vec!["", "", ""]);
        let vision = Arc::new(MockVisionService::scripted(vec![
            VisionOutcome::Success {
                markdown: "vision page".into(),
            },
            VisionOutcome::QuotaExceeded,
        ]));
        let ocr_text = "ocr recovered text ".repeat(8);
        let ocr = Arc::new(MockOcrService::returning(&ocr_text));
        let mut req = request("scan.pdf");
        req.ceilings.page_workers = 1;
        let result = DocumentProcessor::new()
            .with_vision(vision.clone())
            .with_ocr(ocr)
            .process(&req, &doc);
        assert!(result.run_report.success);
        assert_eq!(vision.call_count(), 2);
        assert!(result
            .run_report
            .tools_used
            .contains(&"mock_ocr".to_string()));
    }

    #[test]
    fn word_document_gets_per_paragraph_provenance() {
        let doc = InMemoryDocument::from_blocks(vec![
            WordBlock::Paragraph("First paragraph.".into()),
            WordBlock::Paragraph("Second paragraph.".into()),
            WordBlock::Table(vec![
                vec!["A".into(), "B".into()],
                vec!["1".into(), "2".into()],
            ]),
        ]);
        let mut req = request("memo.docx");
        req.kind = DocumentKind::Word;
        let result = DocumentProcessor::new().process(&req, &doc);
        assert!(result.run_report.success);
        assert!(result.markdown_content.contains("[Table 1]"));
        assert_eq!(result.provenance_records.len(), 3);
        assert_eq!(
            result.run_report.router_decisions.get("document"),
            Some(&"word_native".to_string())
        );
    }

    #[test]
    fn empty_extraction_fails_the_run_but_returns_a_report() {
        let doc = InMemoryDocument::from_pages(vec![""]);
        let result = DocumentProcessor::new().process(&request("blank.pdf"), &doc);
        assert!(!result.run_report.success);
        assert_eq!(result.markdown_content, "");
        assert!(result
            .run_report
            .defects
            .iter()
            .any(|d| d.severity == Severity::High));
        assert!(result.run_report.error_message.is_none());
    }

    #[test]
    fn compliance_runs_after_qa_recovery() {
        let content = dense_page("Contact john.doe@example.com for details.");
        let doc = InMemoryDocument::from_pages(vec![content]);
        let mut req = request("contacts.pdf");
        req.compliance = ComplianceConfig {
            classification_tag: "CONFIDENTIAL".to_string(),
            pii_redaction: true,
            export_assets: true,
        };
        let result = DocumentProcessor::new().process(&req, &doc);
        assert!(result.markdown_content.starts_with("# CONFIDENTIAL\n\n"));
        assert!(result.markdown_content.contains("[REDACTED_EMAIL]"));
        assert!(!result.markdown_content.contains("example.com"));
    }

    #[test]
    fn evaluation_mode_populates_metric_suite() {
        let doc = InMemoryDocument::from_pages(vec![dense_page("# Title\n\n## Section")]);
        let mut req = request("eval.pdf");
        req.run_mode = RunMode::Evaluation;
        let result = DocumentProcessor::new().process(&req, &doc);
        assert_eq!(result.run_report.quality_metrics.structure_accuracy, 1.0);
        assert_eq!(result.run_report.quality_metrics.table_grits, 1.0);
        assert_eq!(result.run_report.quality_metrics.provenance_coverage, 1.0);
    }

    #[test]
    fn structural_defects_appear_in_report_without_blocking() {
        let doc = InMemoryDocument::from_pages(vec![dense_page("# Top\n\n### Jumped")]);
        let result = DocumentProcessor::new().process(&request("doc.pdf"), &doc);
        assert!(result.run_report.success);
        assert!(result
            .run_report
            .defects
            .iter()
            .any(|d| d.element_type == "heading" && d.severity == Severity::Medium));
    }

    #[test]
    fn blank_label_is_a_validation_failure() {
        let doc = InMemoryDocument::from_pages(vec!["content"]);
        let result = DocumentProcessor::new().process(&request("   "), &doc);
        assert!(!result.run_report.success);
        let msg = result.run_report.error_message.unwrap();
        assert!(msg.contains("input_label"));
        assert_eq!(result.run_report.defects[0].severity, Severity::Critical);
    }

    #[test]
    fn panicking_backend_is_contained() {
        struct PanickingOcr;
        impl OcrService for PanickingOcr {
            fn name(&self) -> &str {
                "panicking_ocr"
            }
            fn recognize(
                &self,
                _image: &[u8],
                _page: u32,
            ) -> Result<String, crate::pipeline::extraction::ExtractionError> {
                panic!("backend bug")
            }
        }
        let doc = InMemoryDocument::from_pages(vec![""]);
        let result = DocumentProcessor::new()
            .with_ocr(Arc::new(PanickingOcr))
            .process(&request("scan.pdf"), &doc);
        // The page-level panic becomes a defect, not a crash.
        assert!(!result.run_report.success);
        assert!(!result.run_report.defects.is_empty());
    }

    #[test]
    fn each_run_appends_one_audit_entry() {
        let doc = InMemoryDocument::from_pages(vec![dense_page("text")]);
        let processor = DocumentProcessor::new();
        processor.process(&request("doc.pdf"), &doc);
        processor.process(&request("doc.pdf"), &doc);
        let entries = processor.audit_trail().snapshot();
        assert_eq!(entries.len(), 2);
        assert_eq!(entries[0].classification, "UNCLASSIFIED");
        assert_eq!(entries[0].redaction_count, 0);
    }

    #[test]
    fn table_dense_document_extracts_reader_tables() {
        let doc = InMemoryDocument::from_pages(vec![dense_page("Quarterly figures")])
            .with_tables(
                1,
                vec![vec![
                    vec!["Region".to_string(), "Revenue".to_string()],
                    vec!["West".to_string(), "1200".to_string()],
                ]],
            );
        let mut req = request("figures.pdf");
        req.hints.contains_tables = Some(true);
        req.run_mode = RunMode::Evaluation;
        let result = DocumentProcessor::new().process(&req, &doc);
        assert_eq!(
            result.run_report.router_decisions.get("document"),
            Some(&"table_aware".to_string())
        );
        assert!(result
            .run_report
            .tools_used
            .contains(&"table_extractor".to_string()));
        assert!(result.markdown_content.contains("| Region | Revenue |"));
        assert!(result
            .provenance_records
            .iter()
            .any(|r| r.element_type == ElementType::Table));
        assert_eq!(result.run_report.quality_metrics.table_grits, 1.0);
    }

    #[test]
    fn custom_pii_pattern_is_applied() {
        let doc = InMemoryDocument::from_pages(vec![dense_page("Case CASE-445566 closed.")]);
        let mut req = request("case.pdf");
        req.compliance.pii_redaction = true;
        let processor = DocumentProcessor::new()
            .with_pii_pattern("case_id", r"\bCASE-\d{6}\b")
            .unwrap();
        let result = processor.process(&req, &doc);
        assert!(result.markdown_content.contains("[REDACTED_CASE_ID]"));
    }
}
