//! Artifact persistence.
//!
//! The pipeline itself never touches the filesystem; callers hand a
//! `Storage` implementation the finished `ConversionResult` and it writes
//! the markdown, the run report, and the provenance ledger. Layout per
//! run: `<run_id>.md`, `<run_id>_report.json`, `<run_id>_provenance.jsonl`.

use std::collections::BTreeMap;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use thiserror::Error;

use crate::models::ConversionResult;
use crate::pipeline::extraction::ProvenanceRecord;

#[derive(Debug, Error)]
pub enum StorageError {
    #[error("artifact write failed: {0}")]
    Io(#[from] std::io::Error),

    #[error("artifact serialization failed: {0}")]
    Serialize(#[from] serde_json::Error),
}

/// Sink for finished conversion artifacts.
pub trait Storage: Send + Sync {
    fn persist(&self, result: &ConversionResult) -> Result<(), StorageError>;
}

/// Provenance records as JSON Lines, one record per line.
pub fn provenance_to_jsonl(records: &[ProvenanceRecord]) -> Result<String, serde_json::Error> {
    let mut out = String::new();
    for record in records {
        out.push_str(&serde_json::to_string(record)?);
        out.push('\n');
    }
    Ok(out)
}

// ──────────────────────────────────────────────
// Directory-backed storage
// ──────────────────────────────────────────────

/// Writes artifacts under one root directory, creating it on demand.
pub struct DirectoryStorage {
    root: PathBuf,
}

impl DirectoryStorage {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }
}

impl Storage for DirectoryStorage {
    fn persist(&self, result: &ConversionResult) -> Result<(), StorageError> {
        std::fs::create_dir_all(&self.root)?;
        let run_id = &result.run_report.run_id;

        let md_path = self.root.join(format!("{run_id}.md"));
        std::fs::write(&md_path, &result.markdown_content)?;

        let report_path = self.root.join(format!("{run_id}_report.json"));
        let report_json = serde_json::to_string_pretty(&result.run_report)?;
        std::fs::write(&report_path, report_json)?;

        let prov_path = self.root.join(format!("{run_id}_provenance.jsonl"));
        let mut file = std::fs::File::create(&prov_path)?;
        file.write_all(provenance_to_jsonl(&result.provenance_records)?.as_bytes())?;

        tracing::info!(
            run_id = %run_id,
            root = %self.root.display(),
            "artifacts persisted"
        );
        Ok(())
    }
}

// ──────────────────────────────────────────────
// In-memory storage
// ──────────────────────────────────────────────

/// One run's persisted artifacts, as a memory store keeps them.
#[derive(Debug, Clone)]
pub struct StoredArtifacts {
    pub markdown: String,
    pub report_json: String,
    pub provenance_jsonl: String,
}

/// Keeps artifacts in memory, keyed by run id. Used in tests and by
/// embedders that persist elsewhere.
#[derive(Debug, Default)]
pub struct MemoryStorage {
    runs: Mutex<BTreeMap<String, StoredArtifacts>>,
}

impl MemoryStorage {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, run_id: &str) -> Option<StoredArtifacts> {
        match self.runs.lock() {
            Ok(g) => g.get(run_id).cloned(),
            Err(p) => p.into_inner().get(run_id).cloned(),
        }
    }

    pub fn len(&self) -> usize {
        match self.runs.lock() {
            Ok(g) => g.len(),
            Err(p) => p.into_inner().len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl Storage for MemoryStorage {
    fn persist(&self, result: &ConversionResult) -> Result<(), StorageError> {
        let artifacts = StoredArtifacts {
            markdown: result.markdown_content.clone(),
            report_json: serde_json::to_string_pretty(&result.run_report)?,
            provenance_jsonl: provenance_to_jsonl(&result.provenance_records)?,
        };
        let mut runs = match self.runs.lock() {
            Ok(g) => g,
            Err(p) => p.into_inner(),
        };
        runs.insert(result.run_report.run_id.clone(), artifacts);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::ProcessingRequest;
    use crate::pipeline::extraction::InMemoryDocument;
    use crate::pipeline::DocumentProcessor;

    fn sample_result() -> ConversionResult {
        let doc = InMemoryDocument::from_pages(vec![
            "# Sample\n\nA comfortably long born-digital page for the analyzer.".to_string(),
        ]);
        let request = ProcessingRequest {
            input_label: "sample.pdf".to_string(),
            ..Default::default()
        };
        DocumentProcessor::new().process(&request, &doc)
    }

    #[test]
    fn memory_storage_round_trips_artifacts() {
        let storage = MemoryStorage::new();
        let result = sample_result();
        storage.persist(&result).unwrap();

        let stored = storage.get(&result.run_report.run_id).unwrap();
        assert_eq!(stored.markdown, result.markdown_content);
        assert!(stored.report_json.contains(&result.run_report.run_id));
        assert_eq!(
            stored.provenance_jsonl.lines().count(),
            result.provenance_records.len()
        );
    }

    #[test]
    fn directory_storage_writes_three_artifacts() {
        let dir = tempfile::tempdir().unwrap();
        let storage = DirectoryStorage::new(dir.path());
        let result = sample_result();
        storage.persist(&result).unwrap();

        let run_id = &result.run_report.run_id;
        assert!(dir.path().join(format!("{run_id}.md")).exists());
        assert!(dir.path().join(format!("{run_id}_report.json")).exists());
        let jsonl =
            std::fs::read_to_string(dir.path().join(format!("{run_id}_provenance.jsonl"))).unwrap();
        assert_eq!(jsonl.lines().count(), result.provenance_records.len());
    }

    #[test]
    fn provenance_jsonl_is_one_record_per_line() {
        let result = sample_result();
        let jsonl = provenance_to_jsonl(&result.provenance_records).unwrap();
        for line in jsonl.lines() {
            let value: serde_json::Value = serde_json::from_str(line).unwrap();
            assert!(value.get("element_hash").is_some());
            assert!(value.get("extraction_tool").is_some());
        }
    }
}
