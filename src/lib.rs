//! veridoc: document-to-markdown conversion core.
//!
//! Converts PDF and Word documents to markdown through a routed
//! extraction pipeline with per-element provenance, quality assurance,
//! and compliance controls. Extraction backends (vision models, OCR
//! engines) are injected behind traits; the crate ships a blocking
//! OpenAI-compatible vision client and in-memory mocks.
//!
//! ```no_run
//! use veridoc::models::ProcessingRequest;
//! use veridoc::pipeline::extraction::InMemoryDocument;
//! use veridoc::pipeline::DocumentProcessor;
//!
//! let doc = InMemoryDocument::from_pages(vec!["# Hello\n\nBorn-digital content."]);
//! let request = ProcessingRequest {
//!     input_label: "hello.pdf".to_string(),
//!     ..Default::default()
//! };
//! let result = DocumentProcessor::new().process(&request, &doc);
//! assert!(result.run_report.success);
//! ```

pub mod config;
pub mod models;
pub mod pipeline;
pub mod storage;

use tracing_subscriber::EnvFilter;

pub use models::{ConversionResult, ProcessingRequest, RunReport};
pub use pipeline::{DocumentProcessor, ProcessingError};
pub use storage::{DirectoryStorage, MemoryStorage, Storage};

/// Initialize tracing for binaries and tests that want it. Honors
/// `RUST_LOG`, falling back to the crate default filter. Safe to call
/// once per process.
pub fn init_tracing() {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new(config::default_log_filter())),
        )
        .init();

    tracing::info!(version = config::CORE_VERSION, "veridoc initialized");
}
