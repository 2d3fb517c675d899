//! Declarative input shapes for triggers, steps and tools.
//!
//! A `Shape` is a small, serializable object schema: an ordered list of named
//! fields, each with a kind and a required flag. It is used both to validate
//! JSON values at run time and to document workflows over the API.
//!
//! Unknown fields are accepted. A required field that is present but `null`
//! is reported as missing; an optional `null` field is accepted.

use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;

/// The JSON kind a field must have.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FieldKind {
    String,
    Number,
    Integer,
    Boolean,
    Array,
    Object,
    Any,
}

impl FieldKind {
    fn accepts(self, value: &Value) -> bool {
        match self {
            FieldKind::String => value.is_string(),
            FieldKind::Number => value.is_number(),
            FieldKind::Integer => value.is_i64() || value.is_u64(),
            FieldKind::Boolean => value.is_boolean(),
            FieldKind::Array => value.is_array(),
            FieldKind::Object => value.is_object(),
            FieldKind::Any => true,
        }
    }
}

impl fmt::Display for FieldKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            FieldKind::String => "string",
            FieldKind::Number => "number",
            FieldKind::Integer => "integer",
            FieldKind::Boolean => "boolean",
            FieldKind::Array => "array",
            FieldKind::Object => "object",
            FieldKind::Any => "any",
        };
        f.write_str(name)
    }
}

/// A single named field of an object shape.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FieldSpec {
    pub name: String,
    pub kind: FieldKind,
    pub required: bool,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub description: String,
}

/// Object schema describing the fields a consumer expects.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Shape {
    /// Accepts every JSON value.
    #[default]
    Any,
    /// Requires a JSON object carrying the listed fields.
    Object { fields: Vec<FieldSpec> },
}

impl Shape {
    /// A shape that accepts anything.
    pub fn any() -> Self {
        Shape::Any
    }

    /// An object shape with no fields yet.
    pub fn object() -> Self {
        Shape::Object { fields: Vec::new() }
    }

    /// Add a required field.
    pub fn field(self, name: &str, kind: FieldKind, description: &str) -> Self {
        self.push(name, kind, true, description)
    }

    /// Add an optional field.
    pub fn optional(self, name: &str, kind: FieldKind, description: &str) -> Self {
        self.push(name, kind, false, description)
    }

    fn push(self, name: &str, kind: FieldKind, required: bool, description: &str) -> Self {
        let spec = FieldSpec {
            name: name.to_string(),
            kind,
            required,
            description: description.to_string(),
        };
        match self {
            Shape::Any => Shape::Object { fields: vec![spec] },
            Shape::Object { mut fields } => {
                fields.retain(|f| f.name != spec.name);
                fields.push(spec);
                Shape::Object { fields }
            }
        }
    }

    /// Declared fields (empty for `Any`).
    pub fn fields(&self) -> &[FieldSpec] {
        match self {
            Shape::Any => &[],
            Shape::Object { fields } => fields,
        }
    }

    /// Validate a value, collecting every violation.
    pub fn validate(&self, value: &Value) -> Result<(), ShapeError> {
        let fields = match self {
            Shape::Any => return Ok(()),
            Shape::Object { fields } => fields,
        };

        let Some(object) = value.as_object() else {
            return Err(ShapeError {
                violations: vec![format!("expected an object, got {}", kind_of(value))],
            });
        };

        let mut violations = Vec::new();
        for spec in fields {
            match object.get(&spec.name) {
                None | Some(Value::Null) if spec.required => {
                    violations.push(format!("missing required field '{}'", spec.name));
                }
                None | Some(Value::Null) => {}
                Some(found) if !spec.kind.accepts(found) => {
                    violations.push(format!(
                        "field '{}' must be {}, got {}",
                        spec.name,
                        spec.kind,
                        kind_of(found)
                    ));
                }
                Some(_) => {}
            }
        }

        if violations.is_empty() {
            Ok(())
        } else {
            Err(ShapeError { violations })
        }
    }
}

fn kind_of(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

/// A value did not match its declared shape.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{}", violations.join("; "))]
pub struct ShapeError {
    /// One human-readable line per violation.
    pub violations: Vec<String>,
}
