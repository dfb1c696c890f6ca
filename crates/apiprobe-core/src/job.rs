//! Resolved test jobs: one per operation, consumed once by a worker

use std::sync::Arc;

use crate::operation::Operation;

/// Request body of a resolved job.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RequestBody {
    /// No body (non-mutating method, or nothing declared)
    Empty,
    /// Serialized `application/json` payload
    Json(Vec<u8>),
    /// Body generation failed; the job is reported without issuing a request
    Failed(String),
}

impl RequestBody {
    #[must_use]
    pub fn as_bytes(&self) -> Option<&[u8]> {
        match self {
            Self::Json(bytes) => Some(bytes),
            Self::Empty | Self::Failed(_) => None,
        }
    }
}

/// A fully resolved request for one operation.
#[derive(Debug, Clone)]
pub struct TestJob {
    pub method: String,
    pub path_template: String,
    /// Absolute URL including the query string
    pub endpoint: String,
    pub body: RequestBody,
    pub operation: Arc<Operation>,
}

impl TestJob {
    #[must_use]
    pub fn new(operation: Arc<Operation>, endpoint: String, body: RequestBody) -> Self {
        Self {
            method: operation.method.clone(),
            path_template: operation.path.clone(),
            endpoint,
            body,
            operation,
        }
    }
}
