//! Extraction stage: document readers, extraction backends, the fallback
//! chain, and the provenance ledger.
//!
//! Submodules:
//! - `reader` — document source abstraction (`DocumentReader`)
//! - `types` — backend traits, outcomes, errors, mocks
//! - `vision` — OpenAI-compatible vision backend client
//! - `chain` — strategy execution and fallback handling
//! - `provenance` — element hashing and the append-only ledger

pub mod chain;
pub mod provenance;
pub mod reader;
pub mod types;
pub mod vision;

pub use chain::{assemble_markdown, extract_document, ChainBackends};
pub use provenance::{coverage_of, element_hash, ElementType, ProvenanceLedger, ProvenanceRecord};
pub use reader::{DocumentReader, ImageRef, InMemoryDocument, TableRows, WordBlock};
pub use types::{
    ExtractedDocument, ExtractionError, MockOcrService, MockVisionService, OcrService,
    PageExtraction, VerificationService, VisionExtractionService, VisionOutcome,
};
pub use vision::OpenAiVisionClient;
