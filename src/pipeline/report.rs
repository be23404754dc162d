//! Run report assembly.
//!
//! The report is the single place run success is decided: no High or
//! Critical defect, and non-empty trimmed content. Individual stages only
//! contribute defects; they never set the success flag themselves.

use std::collections::BTreeMap;
use std::time::{SystemTime, UNIX_EPOCH};

use chrono::Utc;

use crate::config::CORE_VERSION;
use crate::models::{ComplianceConfig, ProcessingDefect, QualityMetrics, RunMode, RunReport};

/// Fresh run identifier: `run_<8 hex>_<unix secs>`.
pub fn generate_run_id() -> String {
    let uuid = uuid::Uuid::new_v4().simple().to_string();
    let secs = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or(0);
    format!("run_{}_{}", &uuid[..8], secs)
}

/// Success rule, applied exactly once per run.
pub fn run_succeeded(defects: &[ProcessingDefect], content: &str) -> bool {
    let no_blockers = !defects.iter().any(|d| d.severity.blocks_success());
    no_blockers && !content.trim().is_empty()
}

/// Peak resident set size of this process in MiB. Reads `VmHWM` from
/// `/proc/self/status`; 0.0 on platforms without procfs.
pub fn memory_peak_mb() -> f64 {
    #[cfg(target_os = "linux")]
    {
        if let Ok(status) = std::fs::read_to_string("/proc/self/status") {
            for line in status.lines() {
                if let Some(rest) = line.strip_prefix("VmHWM:") {
                    let kb: f64 = rest
                        .trim()
                        .trim_end_matches("kB")
                        .trim()
                        .parse()
                        .unwrap_or(0.0);
                    return kb / 1024.0;
                }
            }
        }
    }
    0.0
}

/// Inputs the assembler needs from the pipeline stages.
pub struct ReportInputs {
    pub run_id: String,
    pub input_label: String,
    pub run_mode: RunMode,
    pub tools_used: Vec<String>,
    pub quality_metrics: QualityMetrics,
    pub defects: Vec<ProcessingDefect>,
    pub processing_time_s: f64,
    pub router_decisions: BTreeMap<String, String>,
    pub compliance_applied: ComplianceConfig,
    pub error_message: Option<String>,
}

/// Assemble the final report. `content` is the finished markdown, used
/// only for the success rule.
pub fn assemble(inputs: ReportInputs, content: &str) -> RunReport {
    let success = inputs.error_message.is_none() && run_succeeded(&inputs.defects, content);

    let mut tool_versions = BTreeMap::new();
    tool_versions.insert("veridoc_core".to_string(), CORE_VERSION.to_string());
    for tool in &inputs.tools_used {
        tool_versions
            .entry(tool.clone())
            .or_insert_with(|| "unversioned".to_string());
    }

    tracing::info!(
        run_id = %inputs.run_id,
        success,
        defects = inputs.defects.len(),
        elapsed_s = inputs.processing_time_s,
        "run report assembled"
    );

    RunReport {
        run_id: inputs.run_id,
        timestamp: Utc::now(),
        input_label: inputs.input_label,
        run_mode: inputs.run_mode,
        tools_used: inputs.tools_used,
        tool_versions,
        quality_metrics: inputs.quality_metrics,
        defects: inputs.defects,
        processing_time_s: inputs.processing_time_s,
        memory_peak_mb: memory_peak_mb(),
        router_decisions: inputs.router_decisions,
        compliance_applied: inputs.compliance_applied,
        success,
        error_message: inputs.error_message,
    }
}
