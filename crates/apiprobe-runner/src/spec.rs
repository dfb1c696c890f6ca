//! OpenAPI document loading: extract operations, parameters, and responses

use std::collections::BTreeMap;
use std::path::Path;

use serde_json::Value;

use apiprobe_core::{DeclaredResponse, Operation, ParamLocation, Parameter, RequestBodySpec};

const METHODS: [&str; 7] = ["get", "post", "put", "delete", "patch", "head", "options"];

/// A loaded document: the operations plus `components.schemas` for `$ref`.
#[derive(Debug, Clone)]
pub struct ApiSpec {
    pub operations: Vec<Operation>,
    pub components: Value,
}

impl ApiSpec {
    /// Build from an already parsed document.
    #[must_use]
    pub fn from_document(document: &Value) -> Self {
        let components = document
            .get("components")
            .and_then(|c| c.get("schemas"))
            .cloned()
            .unwrap_or_else(|| serde_json::json!({}));
        Self {
            operations: extract_operations(document),
            components,
        }
    }
}

/// Read and parse an OpenAPI document.
///
/// # Errors
///
/// Fails if the file cannot be read, does not parse, or declares no operations.
pub fn load_spec(path: &Path) -> Result<ApiSpec, SpecError> {
    let content = std::fs::read_to_string(path)
        .map_err(|e| SpecError::Io(format!("{}: {e}", path.display())))?;
    let document = parse_spec(path, &content)?;
    let spec = ApiSpec::from_document(&document);
    if spec.operations.is_empty() {
        return Err(SpecError::NoOperations);
    }
    tracing::debug!(
        operations = spec.operations.len(),
        path = %path.display(),
        "loaded OpenAPI document"
    );
    Ok(spec)
}

/// Parse an OpenAPI document from JSON or YAML.
///
/// Detection strategy: try extension first (`.yaml`/`.yml`), then fall back to
/// content sniffing (leading `{` → JSON, otherwise YAML).
pub fn parse_spec(path: &Path, content: &str) -> Result<Value, SpecError> {
    let ext = path
        .extension()
        .and_then(|e| e.to_str())
        .unwrap_or("")
        .to_ascii_lowercase();

    match ext.as_str() {
        "yaml" | "yml" => from_yaml(content),
        "json" => from_json(content),
        _ => {
            // Content sniffing: trimmed first char
            if content.trim_start().starts_with('{') {
                from_json(content)
            } else {
                from_yaml(content)
            }
        }
    }
}

fn from_json(content: &str) -> Result<Value, SpecError> {
    serde_json::from_str(content).map_err(|e| SpecError::Parse(format!("Invalid JSON: {e}")))
}

/// YAML documents often use unquoted status keys (`200:`), so go through
/// `serde_yml::Value` and let serde_json stringify non-string map keys.
fn from_yaml(content: &str) -> Result<Value, SpecError> {
    let yaml: serde_yml::Value =
        serde_yml::from_str(content).map_err(|e| SpecError::Parse(format!("Invalid YAML: {e}")))?;
    serde_json::to_value(yaml).map_err(|e| SpecError::Parse(format!("Invalid YAML: {e}")))
}

/// Walk `paths` (key order) and collect every declared operation.
pub fn extract_operations(document: &Value) -> Vec<Operation> {
    let mut ops = Vec::new();
    let shared_params = document
        .get("components")
        .and_then(|c| c.get("parameters"))
        .cloned()
        .unwrap_or(Value::Null);

    let Some(paths) = document.get("paths").and_then(Value::as_object) else {
        return ops;
    };

    for (path, path_item) in paths {
        for method in METHODS {
            let Some(operation) = path_item.get(method) else {
                continue;
            };

            // Path-level parameters first; operation-level ones override by (name, in)
            let mut parameters: Vec<Parameter> = Vec::new();
            for source in [path_item.get("parameters"), operation.get("parameters")]
                .into_iter()
                .flatten()
            {
                let Some(params) = source.as_array() else {
                    continue;
                };
                for param in params {
                    let Some(p) = parse_parameter(param, &shared_params) else {
                        continue;
                    };
                    parameters.retain(|existing| {
                        !(existing.name == p.name && existing.location == p.location)
                    });
                    parameters.push(p);
                }
            }

            let request_body = operation
                .get("requestBody")
                .and_then(|rb| rb.get("content"))
                .and_then(|c| c.get("application/json"))
                .map(|media| RequestBodySpec {
                    schema: media.get("schema").cloned(),
                    example: media.get("example").cloned(),
                });

            let responses: BTreeMap<String, DeclaredResponse> = operation
                .get("responses")
                .and_then(Value::as_object)
                .map(|responses| {
                    responses
                        .iter()
                        .map(|(status, resp)| {
                            let content_types = resp
                                .get("content")
                                .and_then(Value::as_object)
                                .map(|c| c.keys().cloned().collect())
                                .unwrap_or_default();
                            (status.clone(), DeclaredResponse { content_types })
                        })
                        .collect()
                })
                .unwrap_or_default();

            ops.push(Operation {
                method: method.to_ascii_uppercase(),
                path: path.clone(),
                parameters,
                request_body,
                responses,
            });
        }
    }

    ops
}

fn parse_parameter(param: &Value, shared: &Value) -> Option<Parameter> {
    if let Some(reference) = param.get("$ref").and_then(Value::as_str) {
        let name = reference.strip_prefix("#/components/parameters/")?;
        return parse_parameter(shared.get(name)?, &Value::Null);
    }

    let name = param.get("name")?.as_str()?.to_string();
    let location = match param.get("in")?.as_str()? {
        "path" => ParamLocation::Path,
        "query" => ParamLocation::Query,
        "header" => ParamLocation::Header,
        _ => return None,
    };
    let schema = param
        .get("schema")
        .cloned()
        .unwrap_or_else(|| serde_json::json!({"type": "string"}));
    let required = param
        .get("required")
        .and_then(Value::as_bool)
        .unwrap_or(false);

    Some(Parameter {
        name,
        location,
        schema,
        required,
        example: param.get("example").cloned(),
    })
}

#[derive(Debug, thiserror::Error)]
pub enum SpecError {
    #[error("IO error: {0}")]
    Io(String),
    #[error("Parse error: {0}")]
    Parse(String),
    #[error("No operations found in OpenAPI document")]
    NoOperations,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn petstore() -> Value {
        json!({
            "openapi": "3.0.3",
            "info": {"title": "Pets", "version": "1.0"},
            "paths": {
                "/pets": {
                    "get": {
                        "parameters": [
                            {"name": "limit", "in": "query", "schema": {"type": "integer"}}
                        ],
                        "responses": {
                            "200": {"content": {"application/json": {"schema": {"type": "array"}}}},
                            "default": {"description": "error"}
                        }
                    },
                    "post": {
                        "requestBody": {
                            "content": {
                                "application/json": {
                                    "schema": {"$ref": "#/components/schemas/Pet"}
                                }
                            }
                        },
                        "responses": {"201": {}}
                    }
                },
                "/pets/{petId}": {
                    "parameters": [
                        {"name": "petId", "in": "path", "required": true, "schema": {"type": "string"}}
                    ],
                    "get": {
                        "parameters": [
                            {"name": "petId", "in": "path", "required": true, "schema": {"type": "integer"}},
                            {"$ref": "#/components/parameters/Verbose"}
                        ],
                        "responses": {"200": {}}
                    },
                    "delete": {"responses": {"204": {}}}
                }
            },
            "components": {
                "schemas": {
                    "Pet": {"type": "object", "required": ["name"], "properties": {"name": {"type": "string"}}}
                },
                "parameters": {
                    "Verbose": {"name": "verbose", "in": "query", "schema": {"type": "boolean"}}
                }
            }
        })
    }

    #[test]
    fn extract_operations_from_document() {
        let ops = extract_operations(&petstore());
        let labels: Vec<String> = ops.iter().map(Operation::label).collect();
        assert_eq!(
            labels,
            vec!["GET /pets", "POST /pets", "GET /pets/{petId}", "DELETE /pets/{petId}"]
        );

        let list = &ops[0];
        assert_eq!(list.parameters.len(), 1);
        assert_eq!(list.parameters[0].location, ParamLocation::Query);
        assert_eq!(
            list.responses["200"].content_types,
            vec!["application/json".to_string()]
        );
        assert!(list.responses["default"].content_types.is_empty());

        let create = &ops[1];
        let body = create.request_body.as_ref().unwrap();
        assert!(body.schema.is_some());
        assert!(body.example.is_none());
    }

    #[test]
    fn operation_parameters_override_path_level() {
        let ops = extract_operations(&petstore());
        let get_pet = &ops[2];
        assert_eq!(get_pet.parameters.len(), 2);
        let pet_id = get_pet.parameters.iter().find(|p| p.name == "petId").unwrap();
        assert_eq!(pet_id.schema, json!({"type": "integer"}));
        assert!(pet_id.required);

        let verbose = get_pet.parameters.iter().find(|p| p.name == "verbose").unwrap();
        assert_eq!(verbose.location, ParamLocation::Query);

        // DELETE inherits the path-level parameter untouched
        assert_eq!(ops[3].parameters[0].schema, json!({"type": "string"}));
    }

    #[test]
    fn components_are_kept_for_refs() {
        let spec = ApiSpec::from_document(&petstore());
        assert!(spec.components.get("Pet").is_some());
    }

    #[test]
    fn parse_spec_json_by_extension() {
        let v = parse_spec(Path::new("api.json"), r#"{"openapi": "3.0.0"}"#).unwrap();
        assert_eq!(v["openapi"], "3.0.0");
    }

    #[test]
    fn parse_spec_yaml_by_extension() {
        let v = parse_spec(Path::new("api.yml"), "openapi: 3.0.0\npaths: {}\n").unwrap();
        assert_eq!(v["openapi"], "3.0.0");
    }

    #[test]
    fn parse_spec_sniffs_content() {
        let json = parse_spec(Path::new("api"), r#"  {"a": 1}"#).unwrap();
        assert_eq!(json["a"], 1);
        let yaml = parse_spec(Path::new("api"), "a: 1\n").unwrap();
        assert_eq!(yaml["a"], 1);
    }

    #[test]
    fn parse_spec_yaml_numeric_status_keys() {
        let yaml = "paths:\n  /x:\n    get:\n      responses:\n        200:\n          description: ok\n";
        let doc = parse_spec(Path::new("api.yaml"), yaml).unwrap();
        let ops = extract_operations(&doc);
        assert!(ops[0].responses.contains_key("200"));
    }

    #[test]
    fn parse_spec_invalid_json_error() {
        let err = parse_spec(Path::new("api.json"), "{not json").unwrap_err();
        assert!(err.to_string().contains("Invalid JSON"));
    }

    #[test]
    fn load_spec_rejects_empty_document() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("empty.yaml");
        std::fs::write(&path, "openapi: 3.0.0\npaths: {}\n").unwrap();
        assert!(matches!(load_spec(&path), Err(SpecError::NoOperations)));
    }

    #[test]
    fn load_spec_missing_file() {
        let err = load_spec(Path::new("/definitely/not/here.yaml")).unwrap_err();
        assert!(matches!(err, SpecError::Io(_)));
    }

    #[test]
    fn load_spec_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("pets.json");
        std::fs::write(&path, petstore().to_string()).unwrap();
        let spec = load_spec(&path).unwrap();
        assert_eq!(spec.operations.len(), 4);
    }
}
