//! Response validation against declared responses
//!
//! Status and media type only. Body validation is a seam
//! ([`BodyValidator`]) with a no-op default.

use apiprobe_core::{DeclaredResponse, Operation, ValidationResult};

use crate::transport::HttpResponse;

/// Checks a response body against a declared response.
pub trait BodyValidator {
    /// Returns human-readable violations; empty means valid.
    fn check(&self, declared: &DeclaredResponse, body: &[u8]) -> Vec<String>;
}

/// Accepts every body.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoBodyCheck;

impl BodyValidator for NoBodyCheck {
    fn check(&self, _declared: &DeclaredResponse, _body: &[u8]) -> Vec<String> {
        Vec::new()
    }
}

/// Validate `response` (received with `status`) against `operation`.
#[must_use]
pub fn validate(response: &HttpResponse, operation: &Operation, status: u16) -> ValidationResult {
    validate_with(&NoBodyCheck, response, operation, status)
}

/// [`validate`] with a custom body check.
#[must_use]
pub fn validate_with<B: BodyValidator + ?Sized>(
    body_check: &B,
    response: &HttpResponse,
    operation: &Operation,
    status: u16,
) -> ValidationResult {
    let content_type = response.content_type.as_deref().map(media_type);

    if operation.responses.is_empty() {
        return ValidationResult::unchecked(content_type);
    }

    let Some((key, declared)) = operation.declared_response(status) else {
        let declared: Vec<&str> = operation.responses.keys().map(String::as_str).collect();
        return ValidationResult {
            valid: false,
            status_valid: false,
            content_type,
            expected_status: None,
            schema_errors: vec![format!(
                "status {status} not declared (expected one of: {})",
                declared.join(", ")
            )],
        };
    };

    let mut errors = Vec::new();
    if !declared.content_types.is_empty() {
        match content_type.as_deref() {
            Some(actual)
                if declared
                    .content_types
                    .iter()
                    .any(|d| media_type(d).eq_ignore_ascii_case(actual)) => {}
            Some(actual) => errors.push(format!(
                "content-type {actual} not declared for {key} (expected one of: {})",
                declared.content_types.join(", ")
            )),
            None => errors.push(format!(
                "missing content-type (expected one of: {})",
                declared.content_types.join(", ")
            )),
        }
    }
    errors.extend(body_check.check(declared, &response.body));

    ValidationResult {
        valid: errors.is_empty(),
        status_valid: true,
        content_type,
        expected_status: Some(key.to_string()),
        schema_errors: errors,
    }
}

/// `"application/json; charset=utf-8"` → `"application/json"`
fn media_type(header: &str) -> String {
    header
        .split(';')
        .next()
        .unwrap_or_default()
        .trim()
        .to_ascii_lowercase()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn op(responses: &[(&str, &[&str])]) -> Operation {
        let mut op = Operation::new("GET", "/users/{id}");
        for (status, types) in responses {
            op.responses.insert(
                (*status).to_string(),
                DeclaredResponse {
                    content_types: types.iter().map(|t| (*t).to_string()).collect(),
                },
            );
        }
        op
    }

    fn json_response(status: u16, content_type: Option<&str>) -> HttpResponse {
        HttpResponse::new(status, content_type, "{}")
    }

    #[test]
    fn undeclared_status_is_invalid() {
        let op = op(&[("200", &["application/json"])]);
        let v = validate(&json_response(404, Some("application/json")), &op, 404);
        assert!(!v.valid);
        assert!(!v.status_valid);
        assert!(v.message().contains("404"));
    }

    #[test]
    fn charset_parameter_is_ignored() {
        let op = op(&[("200", &["application/json"])]);
        let v = validate(
            &json_response(200, Some("application/json; charset=utf-8")),
            &op,
            200,
        );
        assert!(v.valid, "{:?}", v.schema_errors);
        assert_eq!(v.content_type.as_deref(), Some("application/json"));
        assert_eq!(v.expected_status.as_deref(), Some("200"));
    }

    #[test]
    fn media_type_comparison_is_case_insensitive() {
        let op = op(&[("200", &["application/json"])]);
        let v = validate(&json_response(200, Some("Application/JSON")), &op, 200);
        assert!(v.valid);
    }

    #[test]
    fn content_type_mismatch_is_reported() {
        let op = op(&[("200", &["application/json"])]);
        let v = validate(&json_response(200, Some("text/html")), &op, 200);
        assert!(!v.valid);
        assert!(v.status_valid);
        assert!(v.message().contains("text/html"));
    }

    #[test]
    fn missing_content_type_is_a_mismatch() {
        let op = op(&[("200", &["application/json"])]);
        let v = validate(&json_response(200, None), &op, 200);
        assert!(!v.valid);
        assert!(v.message().contains("missing content-type"));
    }

    #[test]
    fn response_without_content_skips_media_check() {
        let op = op(&[("204", &[])]);
        let v = validate(&json_response(204, None), &op, 204);
        assert!(v.valid);
    }

    #[test]
    fn default_response_covers_other_statuses() {
        let op = op(&[("200", &["application/json"]), ("default", &["application/problem+json"])]);
        let v = validate(&json_response(500, Some("application/problem+json")), &op, 500);
        assert!(v.valid);
        assert_eq!(v.expected_status.as_deref(), Some("default"));
    }

    #[test]
    fn nothing_declared_is_trivially_valid() {
        let v = validate(&json_response(418, Some("text/plain")), &op(&[]), 418);
        assert!(v.valid);
        assert_eq!(v.message(), "OK");
    }

    #[test]
    fn custom_body_check_is_consulted() {
        struct RejectEmpty;
        impl BodyValidator for RejectEmpty {
            fn check(&self, _declared: &DeclaredResponse, body: &[u8]) -> Vec<String> {
                if body.is_empty() {
                    vec!["empty body".into()]
                } else {
                    Vec::new()
                }
            }
        }

        let op = op(&[("200", &[])]);
        let empty = HttpResponse::new(200, None, "");
        let v = validate_with(&RejectEmpty, &empty, &op, 200);
        assert_eq!(v.schema_errors, vec!["empty body".to_string()]);
        assert!(validate_with(&RejectEmpty, &json_response(200, None), &op, 200).valid);
    }
}
