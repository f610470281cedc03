//! Tool parameter schemas and stateless input validation.
//!
//! Validation is deliberately stateless: the same raw input always produces
//! the same diagnostics, so a model retrying a malformed call sees a stable
//! error it can act on.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// JSON-schema-shaped description of a tool's input object.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolParameterSchema {
    /// Always `"object"` for tool inputs.
    #[serde(rename = "type")]
    pub schema_type: String,
    /// Per-property schemas, keyed by property name.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub properties: Option<Map<String, Value>>,
    /// Names of required properties.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub required: Option<Vec<String>>,
    /// Optional human description of the whole object.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

impl ToolParameterSchema {
    /// An object schema that accepts any object.
    pub fn any_object() -> Self {
        Self {
            schema_type: "object".into(),
            properties: None,
            required: None,
            description: None,
        }
    }
}

/// Fluent builder for [`ToolParameterSchema`].
///
/// Replaces the repetitive `Map::new()` + `insert()` boilerplate in every
/// tool definition.
pub struct SchemaBuilder {
    properties: Map<String, Value>,
    required: Vec<String>,
    description: Option<String>,
}

impl SchemaBuilder {
    /// Start an empty object schema.
    pub fn new() -> Self {
        Self {
            properties: Map::new(),
            required: Vec::new(),
            description: None,
        }
    }

    /// Add an optional property.
    pub fn property(mut self, name: &str, schema: Value) -> Self {
        let _ = self.properties.insert(name.into(), schema);
        self
    }

    /// Add a required property.
    pub fn required_property(mut self, name: &str, schema: Value) -> Self {
        let _ = self.properties.insert(name.into(), schema);
        self.required.push(name.into());
        self
    }

    /// Set the object-level description.
    pub fn description(mut self, text: impl Into<String>) -> Self {
        self.description = Some(text.into());
        self
    }

    /// Build the final schema.
    pub fn build(self) -> ToolParameterSchema {
        ToolParameterSchema {
            schema_type: "object".into(),
            properties: if self.properties.is_empty() {
                None
            } else {
                Some(self.properties)
            },
            required: if self.required.is_empty() {
                None
            } else {
                Some(self.required)
            },
            description: self.description,
        }
    }
}

impl Default for SchemaBuilder {
    fn default() -> Self {
        Self::new()
    }
}

/// Check raw input against a schema.
///
/// Returns all diagnostics at once rather than failing on the first problem,
/// so the model gets a complete picture in a single error result.
pub fn validate_input(schema: &ToolParameterSchema, input: &Value) -> Result<(), Vec<String>> {
    let mut diagnostics = Vec::new();

    let Some(object) = input.as_object() else {
        return Err(vec![format!(
            "expected an object input, got {}",
            json_type_name(input)
        )]);
    };

    if let Some(required) = &schema.required {
        for name in required {
            match object.get(name) {
                None | Some(Value::Null) => {
                    diagnostics.push(format!("missing required parameter: {name}"));
                }
                Some(_) => {}
            }
        }
    }

    if let Some(properties) = &schema.properties {
        for (name, value) in object {
            let Some(property) = properties.get(name) else {
                continue; // unknown properties pass through untouched
            };
            if value.is_null() {
                continue; // absence handled by the required check
            }
            if let Some(expected) = property.get("type").and_then(Value::as_str) {
                if !type_matches(expected, value) {
                    diagnostics.push(format!(
                        "invalid type for parameter {name}: expected {expected}, got {}",
                        json_type_name(value)
                    ));
                }
            }
        }
    }

    if diagnostics.is_empty() {
        Ok(())
    } else {
        Err(diagnostics)
    }
}

fn type_matches(expected: &str, value: &Value) -> bool {
    match expected {
        "string" => value.is_string(),
        "number" => value.is_number(),
        "integer" => value.is_i64() || value.is_u64(),
        "boolean" => value.is_boolean(),
        "array" => value.is_array(),
        "object" => value.is_object(),
        // Unknown type keywords never reject; schemas are template-authored
        // and a typo there should not brick the tool.
        _ => true,
    }
}

fn json_type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}
