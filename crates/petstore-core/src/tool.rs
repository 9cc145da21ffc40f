//! Tool descriptors discovered from the remote server, and invocation requests.

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Description of a remote tool, produced by discovery.
///
/// Read-only: it is used for validation and introspection and never
/// mutated locally.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ToolDescriptor {
    /// Tool name (unique identifier)
    pub name: String,
    /// Human-readable description
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    /// JSON Schema for the tool's arguments
    #[serde(default = "empty_object_schema")]
    pub input_schema: Value,
}

fn empty_object_schema() -> Value {
    serde_json::json!({ "type": "object", "properties": {} })
}

/// One field of a tool's argument schema.
#[derive(Debug, Clone, PartialEq)]
pub struct FieldSchema {
    /// Field name
    pub name: String,
    /// JSON type name (`string`, `integer`, `object`, ...), if declared
    pub kind: Option<String>,
    /// Whether the field is listed as required
    pub required: bool,
    /// Allowed values, if the schema declares an enum
    pub allowed: Option<Vec<Value>>,
    /// Nested fields for object-typed fields
    pub nested: Vec<FieldSchema>,
}

impl ToolDescriptor {
    /// Create a descriptor with an empty object schema.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            description: None,
            input_schema: empty_object_schema(),
        }
    }

    /// Set the description.
    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    /// Set the argument schema.
    pub fn with_schema(mut self, schema: Value) -> Self {
        self.input_schema = schema;
        self
    }

    /// Project the JSON schema into a list of fields.
    pub fn fields(&self) -> Vec<FieldSchema> {
        fields_of(&self.input_schema)
    }

    /// Check arguments against the top level of the schema.
    ///
    /// Verifies that required fields are present and that enum-restricted
    /// fields hold an allowed value. Nested objects are not descended into.
    pub fn check_arguments(&self, arguments: &Value) -> Result<(), String> {
        let fields = self.fields();
        if fields.is_empty() {
            return Ok(());
        }

        let empty = serde_json::Map::new();
        let provided = match arguments {
            Value::Object(map) => map,
            Value::Null => &empty,
            other => {
                return Err(format!(
                    "arguments for '{}' must be an object, got {}",
                    self.name,
                    json_type_name(other)
                ))
            }
        };

        for field in &fields {
            match provided.get(&field.name) {
                None | Some(Value::Null) if field.required => {
                    return Err(format!(
                        "missing required argument '{}' for tool '{}'",
                        field.name, self.name
                    ));
                }
                Some(value) if !value.is_null() => {
                    if let Some(allowed) = &field.allowed {
                        if !allowed.contains(value) {
                            return Err(format!(
                                "argument '{}' for tool '{}' must be one of {}, got {}",
                                field.name,
                                self.name,
                                Value::Array(allowed.clone()),
                                value
                            ));
                        }
                    }
                }
                _ => {}
            }
        }

        Ok(())
    }
}

fn fields_of(schema: &Value) -> Vec<FieldSchema> {
    let required: Vec<&str> = schema
        .get("required")
        .and_then(Value::as_array)
        .map(|names| names.iter().filter_map(Value::as_str).collect())
        .unwrap_or_default();

    let Some(properties) = schema.get("properties").and_then(Value::as_object) else {
        return Vec::new();
    };

    properties
        .iter()
        .map(|(name, property)| FieldSchema {
            name: name.clone(),
            kind: property
                .get("type")
                .and_then(Value::as_str)
                .map(str::to_string),
            required: required.contains(&name.as_str()),
            allowed: property.get("enum").and_then(Value::as_array).cloned(),
            nested: fields_of(property),
        })
        .collect()
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

/// A request to invoke a tool.
///
/// Owned by the call that issues it and discarded once the response arrives.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InvocationRequest {
    /// Tool name
    pub tool: String,
    /// Tool arguments
    pub arguments: Value,
}

impl InvocationRequest {
    /// Create a new invocation request.
    pub fn new(tool: impl Into<String>, arguments: Value) -> Self {
        Self {
            tool: tool.into(),
            arguments,
        }
    }
}
