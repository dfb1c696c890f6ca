//! JSON run report: summary + ordered results
//!
//! The report is the hand-off to external tooling (CI dashboards, diffing
//! between runs). `generate_schema` documents its shape.

use std::path::Path;

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use crate::result::{RunSummary, TestResult};

/// Everything a finished run hands to exporters.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub struct RunReport {
    /// Server the run targeted
    pub base_url: String,
    /// OpenAPI document the jobs were derived from
    pub spec: String,
    /// Wall-clock duration of the whole run
    pub duration_ms: u64,
    pub summary: RunSummary,
    /// One entry per operation, in job order
    pub results: Vec<TestResult>,
}

impl RunReport {
    #[must_use]
    pub fn new(
        base_url: impl Into<String>,
        spec: impl Into<String>,
        duration_ms: u64,
        results: Vec<TestResult>,
    ) -> Self {
        Self {
            base_url: base_url.into(),
            spec: spec.into(),
            duration_ms,
            summary: RunSummary::from_results(&results),
            results,
        }
    }
}

/// Write the report as pretty JSON, creating parent directories.
///
/// # Errors
///
/// Returns error if the directory or file cannot be written.
pub fn write_report(report: &RunReport, path: &Path) -> Result<(), ExportError> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent)
            .map_err(|e| ExportError::Io(format!("create {}: {e}", parent.display())))?;
    }
    let json =
        serde_json::to_string_pretty(report).map_err(|e| ExportError::Serialize(e.to_string()))?;
    std::fs::write(path, json).map_err(|e| ExportError::Io(format!("write {}: {e}", path.display())))
}

/// Read a report written by [`write_report`].
///
/// # Errors
///
/// Returns error if the file cannot be read or is not a report.
pub fn read_report(path: &Path) -> Result<RunReport, ExportError> {
    let content = std::fs::read_to_string(path)
        .map_err(|e| ExportError::Io(format!("read {}: {e}", path.display())))?;
    serde_json::from_str(&content).map_err(|e| ExportError::Serialize(e.to_string()))
}

/// Generate JSON Schema for the report format.
#[must_use]
pub fn generate_schema() -> String {
    let schema = schemars::schema_for!(RunReport);
    serde_json::to_string_pretty(&schema).expect("schema serialization should not fail")
}

#[derive(Debug, thiserror::Error)]
pub enum ExportError {
    #[error("IO error: {0}")]
    Io(String),
    #[error("Serialization error: {0}")]
    Serialize(String),
}
