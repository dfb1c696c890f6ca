//! JSON Schema → sample `serde_json::Value` synthesizer
//!
//! Handles the OpenAPI 3.x / JSON Schema subset that shows up in request
//! bodies: string, integer, number, boolean, array, object, enum, $ref,
//! anyOf, oneOf, allOf.
//!
//! Values are plausible rather than adversarial: declared examples and
//! defaults win, formats map to canonical literals, numbers land in the
//! middle of their range. The only randomness is optional-property
//! inclusion and array length, both driven by a seedable RNG.

use rand::rngs::SmallRng;
use rand::{Rng, SeedableRng};
use serde_json::{Map, Value, json};

use apiprobe_core::OptionalFields;

/// Maximum recursion depth for schema traversal (prevents stack overflow on circular `$ref`).
const MAX_DEPTH: u32 = 20;

/// Maximum string length for generation (prevents OOM on absurd minLength values).
const MAX_STRING_LEN: usize = 10_000;

const TARGET_STRING_LEN: usize = 5;
const DEFAULT_MIN_LEN: usize = 1;
const DEFAULT_MAX_LEN: usize = 10;
const FILLER: &str = "sample";

pub const EMAIL: &str = "user@example.com";
pub const URI: &str = "https://example.com";
pub const DATE: &str = "2024-01-15";
pub const DATE_TIME: &str = "2024-01-15T12:00:00Z";
pub const UUID: &str = "123e4567-e89b-12d3-a456-426614174000";

/// Shape of a schema node, decided once per node.
#[derive(Debug, Clone, Copy, PartialEq)]
enum SchemaKind<'a> {
    /// `oneOf` / `anyOf`: first alternative
    FirstOf(&'a [Value]),
    AllOf(&'a [Value]),
    Object,
    Array,
    String,
    Integer,
    Number,
    Boolean,
    Null,
    /// Unknown or absent type with no structural hints
    Filler,
}

impl<'a> SchemaKind<'a> {
    fn of(schema: &'a Value) -> Self {
        for key in ["oneOf", "anyOf"] {
            if let Some(variants) = schema.get(key).and_then(Value::as_array) {
                return Self::FirstOf(variants);
            }
        }
        if let Some(parts) = schema.get("allOf").and_then(Value::as_array) {
            return Self::AllOf(parts);
        }

        // OpenAPI 3.1 allows `type: [string, "null"]`: take the first non-null
        let type_name = match schema.get("type") {
            Some(Value::String(t)) => Some(t.as_str()),
            Some(Value::Array(types)) => types
                .iter()
                .filter_map(Value::as_str)
                .find(|t| *t != "null")
                .or(Some("null")),
            _ => None,
        };

        match type_name {
            Some("object") => Self::Object,
            Some("array") => Self::Array,
            Some("string") => Self::String,
            Some("integer") => Self::Integer,
            Some("number") => Self::Number,
            Some("boolean") => Self::Boolean,
            Some("null") => Self::Null,
            Some(_) => Self::Filler,
            None if schema.is_null() => Self::Null,
            None if schema.get("properties").is_some() => Self::Object,
            None if schema.get("items").is_some() => Self::Array,
            None => Self::Filler,
        }
    }
}

/// Turns schema nodes into concrete sample values.
pub struct Synthesizer {
    rng: SmallRng,
    optional: OptionalFields,
    /// `components.schemas` of the document, for `$ref` resolution
    components: Value,
}

impl Synthesizer {
    /// `seed: None` draws a fresh seed from the OS.
    #[must_use]
    pub fn new(components: Value, optional: OptionalFields, seed: Option<u64>) -> Self {
        let rng = match seed {
            Some(seed) => SmallRng::seed_from_u64(seed),
            None => SmallRng::from_entropy(),
        };
        Self {
            rng,
            optional,
            components,
        }
    }

    /// Synthesizer with no components and a fixed seed.
    #[must_use]
    pub fn standalone(optional: OptionalFields, seed: u64) -> Self {
        Self::new(json!({}), optional, Some(seed))
    }

    /// Produce a sample value for `schema`. Never fails: malformed fragments
    /// degrade to `null`, `{}`, or a filler string.
    pub fn synthesize(&mut self, schema: &Value) -> Value {
        self.synthesize_inner(schema, 0)
    }

    /// Look up `#/components/schemas/<name>`.
    #[must_use]
    pub fn resolve_ref(&self, reference: &str) -> Option<&Value> {
        reference
            .strip_prefix("#/components/schemas/")
            .and_then(|name| self.components.get(name))
    }

    fn synthesize_inner(&mut self, schema: &Value, depth: u32) -> Value {
        if depth > MAX_DEPTH {
            return Value::Null;
        }

        if let Some(reference) = schema.get("$ref").and_then(Value::as_str) {
            return match self.resolve_ref(reference).cloned() {
                Some(resolved) => self.synthesize_inner(&resolved, depth + 1),
                None => Value::Null,
            };
        }

        if let Some(literal) = declared_literal(schema) {
            return literal.clone();
        }

        match SchemaKind::of(schema) {
            SchemaKind::FirstOf(variants) => match variants.first() {
                Some(first) => self.synthesize_inner(first, depth + 1),
                None => Value::Null,
            },
            SchemaKind::AllOf(parts) => {
                let mut merged = Map::new();
                for part in parts {
                    if let Value::Object(obj) = self.synthesize_inner(part, depth + 1) {
                        merged.extend(obj);
                    }
                }
                Value::Object(merged)
            }
            SchemaKind::Object => self.object(schema, depth + 1),
            SchemaKind::Array => self.array(schema, depth + 1),
            SchemaKind::String => string(schema),
            SchemaKind::Integer => integer(schema),
            SchemaKind::Number => number(schema),
            SchemaKind::Boolean => Value::Bool(true),
            SchemaKind::Null => Value::Null,
            SchemaKind::Filler => Value::String(filler(TARGET_STRING_LEN)),
        }
    }

    fn object(&mut self, schema: &Value, depth: u32) -> Value {
        let required: Vec<&str> = schema
            .get("required")
            .and_then(Value::as_array)
            .map(|arr| arr.iter().filter_map(Value::as_str).collect())
            .unwrap_or_default();

        let mut obj = Map::new();
        if let Some(props) = schema.get("properties").and_then(Value::as_object) {
            for (key, prop_schema) in props {
                if required.contains(&key.as_str()) || self.include_optional() {
                    obj.insert(key.clone(), self.synthesize_inner(prop_schema, depth));
                }
            }
        }
        Value::Object(obj)
    }

    fn array(&mut self, schema: &Value, depth: u32) -> Value {
        let count = match self.optional {
            OptionalFields::Random => self.rng.gen_range(1..=2),
            OptionalFields::Always | OptionalFields::Never => 2,
        };
        let items_schema = schema
            .get("items")
            .cloned()
            .unwrap_or_else(|| json!({"type": "string"}));
        Value::Array(
            (0..count)
                .map(|_| self.synthesize_inner(&items_schema, depth))
                .collect(),
        )
    }

    fn include_optional(&mut self) -> bool {
        match self.optional {
            OptionalFields::Random => self.rng.gen_bool(0.5),
            OptionalFields::Always => true,
            OptionalFields::Never => false,
        }
    }
}

/// `example`, then `default`, then the first `enum` entry.
fn declared_literal(schema: &Value) -> Option<&Value> {
    schema
        .get("example")
        .or_else(|| schema.get("default"))
        .or_else(|| {
            schema
                .get("enum")
                .and_then(Value::as_array)
                .and_then(|values| values.first())
        })
}

fn string(schema: &Value) -> Value {
    let format = schema.get("format").and_then(Value::as_str);
    let canonical = match format {
        Some("email") => Some(EMAIL),
        Some("uri" | "url") => Some(URI),
        Some("date") => Some(DATE),
        Some("date-time") => Some(DATE_TIME),
        Some("uuid") => Some(UUID),
        _ => None,
    };
    if let Some(literal) = canonical {
        return Value::String(literal.to_string());
    }

    let min = length_bound(schema, "minLength").unwrap_or(DEFAULT_MIN_LEN);
    let max = length_bound(schema, "maxLength")
        .unwrap_or(DEFAULT_MAX_LEN)
        .max(min);
    Value::String(filler(TARGET_STRING_LEN.clamp(min, max)))
}

fn length_bound(schema: &Value, key: &str) -> Option<usize> {
    schema
        .get(key)
        .and_then(Value::as_u64)
        .map(|v| usize::try_from(v).unwrap_or(MAX_STRING_LEN).min(MAX_STRING_LEN))
}

fn filler(len: usize) -> String {
    FILLER.chars().cycle().take(len).collect()
}

fn integer(schema: &Value) -> Value {
    let min = schema.get("minimum");
    let max = schema.get("maximum");

    if let (Some(lo), Some(hi)) = (min.and_then(Value::as_i64), max.and_then(Value::as_i64)) {
        // i128 so that i64::MIN + i64::MAX style ranges cannot overflow
        let mid = (i128::from(lo) + i128::from(hi)) / 2;
        return json!(i64::try_from(mid).unwrap_or(lo));
    }

    match bounds(schema) {
        Some(value) if value.is_finite() => json!(value.trunc() as i64),
        _ => json!(1),
    }
}

fn number(schema: &Value) -> Value {
    match bounds(schema) {
        Some(value) if value.is_finite() => json!(value),
        _ => json!(1),
    }
}

/// Midpoint when both bounds are set, else whichever bound exists.
fn bounds(schema: &Value) -> Option<f64> {
    let min = schema.get("minimum").and_then(Value::as_f64);
    let max = schema.get("maximum").and_then(Value::as_f64);
    match (min, max) {
        (Some(lo), Some(hi)) => Some(lo + (hi - lo) / 2.0),
        (Some(bound), None) | (None, Some(bound)) => Some(bound),
        (None, None) => None,
    }
}
