//! Per-job results, validation outcomes, progress events, run summary

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

/// Status recorded when no HTTP response was obtained.
pub const ERR_STATUS: &str = "ERR";

/// Message recorded for a response that satisfied the declared contract.
pub const OK_MESSAGE: &str = "OK";

/// Outcome of one job. Created once, never mutated afterwards.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub struct TestResult {
    pub method: String,
    pub endpoint: String,
    /// Numeric HTTP status, or `"ERR"` when no response was obtained
    pub status: String,
    pub message: String,
    pub duration_ms: u64,
    /// Retries actually performed (attempts - 1)
    pub retry_count: u32,
    /// Request/attempt/response trace, only when running verbose
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub verbose_log: Option<String>,
}

impl TestResult {
    /// A result without a usable HTTP response.
    pub fn error(
        method: impl Into<String>,
        endpoint: impl Into<String>,
        message: impl Into<String>,
    ) -> Self {
        Self {
            method: method.into(),
            endpoint: endpoint.into(),
            status: ERR_STATUS.to_string(),
            message: message.into(),
            duration_ms: 0,
            retry_count: 0,
            verbose_log: None,
        }
    }

    #[must_use]
    pub fn is_error(&self) -> bool {
        self.status == ERR_STATUS
    }

    /// Numeric status that satisfied the declared contract.
    #[must_use]
    pub fn passed(&self) -> bool {
        !self.is_error() && self.message == OK_MESSAGE
    }

    #[must_use]
    pub fn status_code(&self) -> Option<u16> {
        self.status.parse().ok()
    }
}

/// Response check against the operation's declared responses.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ValidationResult {
    pub valid: bool,
    pub status_valid: bool,
    /// Normalized media type of the actual response
    pub content_type: Option<String>,
    /// Declared response key that matched (`"200"`, `"default"`)
    pub expected_status: Option<String>,
    pub schema_errors: Vec<String>,
}

impl ValidationResult {
    /// Nothing declared, nothing to check.
    #[must_use]
    pub fn unchecked(content_type: Option<String>) -> Self {
        Self {
            valid: true,
            status_valid: true,
            content_type,
            expected_status: None,
            schema_errors: Vec::new(),
        }
    }

    /// Text folded into `TestResult::message`.
    #[must_use]
    pub fn message(&self) -> String {
        if self.valid {
            OK_MESSAGE.to_string()
        } else {
            self.schema_errors.join("; ")
        }
    }
}

/// Emitted after each completed job. Best effort: may be dropped.
#[derive(Debug, Clone)]
pub struct ProgressEvent {
    pub completed: usize,
    pub total: usize,
    pub latest: TestResult,
}

/// Pass/fail/error counts for a run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub struct RunSummary {
    pub total: usize,
    pub passed: usize,
    /// Got a response, but it violated the contract or a retry limit
    pub failed: usize,
    /// No response at all
    pub errors: usize,
}

impl RunSummary {
    #[must_use]
    pub fn from_results(results: &[TestResult]) -> Self {
        results.iter().fold(
            Self {
                total: results.len(),
                ..Self::default()
            },
            |mut acc, r| {
                if r.is_error() {
                    acc.errors += 1;
                } else if r.passed() {
                    acc.passed += 1;
                } else {
                    acc.failed += 1;
                }
                acc
            },
        )
    }

    #[must_use]
    pub fn all_passed(&self) -> bool {
        self.passed == self.total
    }
}
