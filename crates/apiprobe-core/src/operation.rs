//! Read-only view of an OpenAPI operation
//!
//! Produced by the document loader, consumed by the request resolver and the
//! response validator. Nothing downstream mutates it.

use std::collections::BTreeMap;

use serde_json::Value;

/// Response key that applies to any status not listed explicitly.
pub const DEFAULT_RESPONSE: &str = "default";

/// One HTTP method under one path, e.g. `GET /users/{id}`.
#[derive(Debug, Clone, PartialEq)]
pub struct Operation {
    /// Upper-case HTTP method
    pub method: String,
    /// Path template as written in the document
    pub path: String,
    pub parameters: Vec<Parameter>,
    pub request_body: Option<RequestBodySpec>,
    /// Status key (`"200"`, `"default"`) → declared response
    pub responses: BTreeMap<String, DeclaredResponse>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Parameter {
    pub name: String,
    pub location: ParamLocation,
    pub schema: Value,
    pub required: bool,
    /// Parameter-level `example` (takes precedence over the schema's own)
    pub example: Option<Value>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ParamLocation {
    Path,
    Query,
    Header,
}

/// The `application/json` media type of a request body.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RequestBodySpec {
    pub schema: Option<Value>,
    pub example: Option<Value>,
}

/// A declared response: only the media types matter to the validator.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DeclaredResponse {
    pub content_types: Vec<String>,
}

impl Operation {
    /// Bare operation with no parameters, body, or responses.
    pub fn new(method: impl Into<String>, path: impl Into<String>) -> Self {
        Self {
            method: method.into().to_ascii_uppercase(),
            path: path.into(),
            parameters: Vec::new(),
            request_body: None,
            responses: BTreeMap::new(),
        }
    }

    /// `"POST /orders"`
    #[must_use]
    pub fn label(&self) -> String {
        format!("{} {}", self.method, self.path)
    }

    /// Only POST, PUT and PATCH carry a generated body.
    #[must_use]
    pub fn is_mutating(&self) -> bool {
        matches!(self.method.as_str(), "POST" | "PUT" | "PATCH")
    }

    /// Find the declared response for `status`: exact key first, then
    /// `"default"`. Returns the matched key alongside the response.
    #[must_use]
    pub fn declared_response(&self, status: u16) -> Option<(&str, &DeclaredResponse)> {
        let key = status.to_string();
        self.responses
            .get_key_value(key.as_str())
            .or_else(|| self.responses.get_key_value(DEFAULT_RESPONSE))
            .map(|(k, v)| (k.as_str(), v))
    }

    pub fn query_parameters(&self) -> impl Iterator<Item = &Parameter> {
        self.parameters
            .iter()
            .filter(|p| p.location == ParamLocation::Query)
    }
}
