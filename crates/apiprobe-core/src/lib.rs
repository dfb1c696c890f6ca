//! apiprobe-core: Core types for OpenAPI-driven API test runs
//!
//! This crate holds the data model shared by the execution engine and its
//! collaborators: operations, jobs, results, credentials, retry policy,
//! configuration, and the exported report.

pub mod auth;
pub mod config;
pub mod job;
pub mod operation;
pub mod report;
pub mod result;
pub mod retry;

pub use auth::{ApiKeyLocation, AuthConfig, AuthType, Credential};
pub use config::{Config, ConfigError, OptionalFields};
pub use job::{RequestBody, TestJob};
pub use operation::{DeclaredResponse, Operation, ParamLocation, Parameter, RequestBodySpec};
pub use report::{ExportError, RunReport};
pub use result::{ProgressEvent, RunSummary, TestResult, ValidationResult};
pub use retry::RetryPolicy;
