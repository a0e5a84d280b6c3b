//! Tool-schema sanitization.
//!
//! The upstream's function-declaration validator accepts only a small
//! JSON-Schema subset. Everything else must be stripped before the
//! declaration ships, and exclusive bounds must be rewritten as
//! inclusive ones.

use serde_json::{Map, Value};

/// Keywords the upstream rejects outright.
const STRIPPED_KEYWORDS: &[&str] = &[
    "$schema",
    "$ref",
    "$id",
    "$defs",
    "definitions",
    "minItems",
    "maxItems",
    "uniqueItems",
    "pattern",
    "additionalProperties",
    "patternProperties",
    "dependencies",
    "if",
    "then",
    "else",
    "allOf",
    "anyOf",
    "oneOf",
    "not",
    "contentMediaType",
    "contentEncoding",
    "examples",
    "default",
    "const",
    "minLength",
    "maxLength",
    "format",
];

/// Deep-copy a schema, removing unsupported keywords and converting
/// exclusive bounds to inclusive ones (`exclusiveMinimum: n` becomes
/// `minimum: n+1`, integer shift). Recurses into `properties` and
/// `items` (both the object and array forms).
#[must_use]
pub fn sanitize_schema(schema: &Value) -> Value {
    let Value::Object(obj) = schema else {
        return schema.clone();
    };

    let mut out = Map::new();
    for (key, value) in obj {
        if STRIPPED_KEYWORDS.contains(&key.as_str()) {
            continue;
        }
        match key.as_str() {
            "exclusiveMinimum" => {
                if let Some(n) = value.as_i64() {
                    let _ = out.insert("minimum".into(), Value::from(n + 1));
                }
            }
            "exclusiveMaximum" => {
                if let Some(n) = value.as_i64() {
                    let _ = out.insert("maximum".into(), Value::from(n - 1));
                }
            }
            "properties" => {
                if let Value::Object(props) = value {
                    let cleaned: Map<String, Value> = props
                        .iter()
                        .map(|(name, sub)| (name.clone(), sanitize_schema(sub)))
                        .collect();
                    let _ = out.insert(key.clone(), Value::Object(cleaned));
                }
            }
            "items" => match value {
                Value::Array(items) => {
                    let cleaned: Vec<Value> = items.iter().map(sanitize_schema).collect();
                    let _ = out.insert(key.clone(), Value::Array(cleaned));
                }
                other => {
                    let _ = out.insert(key.clone(), sanitize_schema(other));
                }
            },
            _ => {
                let _ = out.insert(key.clone(), value.clone());
            }
        }
    }
    Value::Object(out)
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
