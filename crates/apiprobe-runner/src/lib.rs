//! apiprobe-runner: OpenAPI-driven test execution engine
//!
//! Loads a document, synthesizes one request per operation, sends them
//! through a worker pool with retry and backoff, and checks each response
//! against the declared status codes and media types.

pub mod cancel;
pub mod executor;
pub mod resolve;
pub mod runner;
pub mod spec;
pub mod synth;
pub mod transport;
pub mod validate;

pub use cancel::CancelToken;
pub use executor::{ExecError, ExecOutcome, execute, is_retryable};
pub use resolve::{BodyError, ResolveError, ResolvedRequest, build_job, resolve};
pub use runner::{
    RunError, RunSettings, TestRunner, build_jobs, effective_concurrency, run_jobs, run_spec,
};
pub use spec::{ApiSpec, SpecError, load_spec};
pub use synth::Synthesizer;
pub use transport::{HttpRequest, HttpResponse, ReqwestTransport, Transport, TransportError};
pub use validate::{BodyValidator, NoBodyCheck, validate, validate_with};
