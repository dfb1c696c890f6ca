//! Turn an operation into a concrete endpoint and request body

use std::sync::Arc;

use reqwest::Url;
use serde_json::Value;

use apiprobe_core::{Operation, Parameter, RequestBody, TestJob};

use crate::synth::Synthesizer;

/// Every path parameter gets this value, whatever its declared type.
pub const PATH_PARAM_VALUE: &str = "1";

const ARRAY_QUERY_DEFAULT: &str = "1,2,3";

/// Endpoint and body for one operation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedRequest {
    pub endpoint: String,
    pub body: RequestBody,
}

#[derive(Debug, thiserror::Error)]
pub enum ResolveError {
    #[error("invalid URL {url}: {reason}")]
    InvalidUrl { url: String, reason: String },
}

/// Body generation failures. Recorded on the job, never fatal for the run.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum BodyError {
    #[error("unresolved schema reference {0}")]
    UnresolvedRef(String),
    #[error("body serialization failed: {0}")]
    Serialize(String),
}

/// Replace every `{name}` segment of a path template with `"1"`.
#[must_use]
pub fn substitute_path_params(path: &str) -> String {
    let mut out = String::with_capacity(path.len());
    let mut rest = path;
    while let Some(open) = rest.find('{') {
        let Some(close) = rest[open..].find('}') else {
            break;
        };
        out.push_str(&rest[..open]);
        out.push_str(PATH_PARAM_VALUE);
        rest = &rest[open + close + 1..];
    }
    out.push_str(rest);
    out
}

/// Value for a query parameter: parameter example, schema example, first
/// enum entry, then a default by type.
#[must_use]
pub fn query_value(param: &Parameter) -> String {
    let schema = &param.schema;
    let declared = param
        .example
        .as_ref()
        .or_else(|| schema.get("example"))
        .or_else(|| schema.get("enum").and_then(Value::as_array).and_then(|e| e.first()));
    if let Some(value) = declared {
        return query_text(value);
    }
    match schema.get("type").and_then(Value::as_str) {
        Some("integer" | "number") => "1".to_string(),
        Some("boolean") => "true".to_string(),
        Some("array") => ARRAY_QUERY_DEFAULT.to_string(),
        _ => "test".to_string(),
    }
}

fn query_text(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        Value::Array(items) => items.iter().map(query_text).collect::<Vec<_>>().join(","),
        other => other.to_string(),
    }
}

/// Resolve `operation` against `base_url`.
///
/// # Errors
///
/// Returns error if the endpoint is not a valid absolute URL. Body
/// generation problems are carried in [`RequestBody::Failed`] instead.
pub fn resolve(
    base_url: &str,
    operation: &Operation,
    synth: &mut Synthesizer,
) -> Result<ResolvedRequest, ResolveError> {
    let raw = format!(
        "{}{}",
        base_url.trim_end_matches('/'),
        substitute_path_params(&operation.path)
    );
    let mut url = Url::parse(&raw).map_err(|e| ResolveError::InvalidUrl {
        url: raw.clone(),
        reason: e.to_string(),
    })?;

    let query: Vec<(&str, String)> = operation
        .query_parameters()
        .map(|p| (p.name.as_str(), query_value(p)))
        .collect();
    if !query.is_empty() {
        let mut pairs = url.query_pairs_mut();
        for (name, value) in &query {
            pairs.append_pair(name, value);
        }
    }

    let body = match request_body(operation, synth) {
        Ok(Some(bytes)) => RequestBody::Json(bytes),
        Ok(None) => RequestBody::Empty,
        Err(e) => {
            tracing::warn!(operation = %operation.label(), error = %e, "body generation failed");
            RequestBody::Failed(e.to_string())
        }
    };

    Ok(ResolvedRequest {
        endpoint: url.into(),
        body,
    })
}

fn request_body(
    operation: &Operation,
    synth: &mut Synthesizer,
) -> Result<Option<Vec<u8>>, BodyError> {
    if !operation.is_mutating() {
        return Ok(None);
    }
    let Some(spec) = &operation.request_body else {
        return Ok(None);
    };

    let value = match (&spec.example, &spec.schema) {
        (Some(example), _) => example.clone(),
        (None, Some(schema)) => {
            if let Some(reference) = schema.get("$ref").and_then(Value::as_str) {
                if synth.resolve_ref(reference).is_none() {
                    return Err(BodyError::UnresolvedRef(reference.to_string()));
                }
            }
            synth.synthesize(schema)
        }
        (None, None) => return Ok(None),
    };

    serde_json::to_vec(&value)
        .map(Some)
        .map_err(|e| BodyError::Serialize(e.to_string()))
}

/// Resolve `operation` into a job.
///
/// # Errors
///
/// Same as [`resolve`].
pub fn build_job(
    base_url: &str,
    operation: Arc<Operation>,
    synth: &mut Synthesizer,
) -> Result<TestJob, ResolveError> {
    let ResolvedRequest { endpoint, body } = resolve(base_url, &operation, synth)?;
    Ok(TestJob::new(operation, endpoint, body))
}
