// src/services/tools.rs
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::error::ToolError;

/// A function the model may call, described in JSON Schema.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolDefinition {
    pub name: String,
    pub description: String,
    pub parameters: Value,
}

impl ToolDefinition {
    pub fn new(name: impl Into<String>, description: impl Into<String>, parameters: Value) -> Self {
        ToolDefinition {
            name: name.into(),
            description: description.into(),
            parameters,
        }
    }
}

/// A toolkit of market-data functions the agent can call by name.
#[async_trait]
pub trait MarketDataTool: Send + Sync {
    /// Definitions of the functions currently enabled.
    fn definitions(&self) -> Vec<ToolDefinition>;

    /// Runs one function and returns its JSON output.
    async fn call(&self, name: &str, arguments: &Value) -> Result<Value, ToolError>;
}

/// Helpers for building JSON Schema parameter objects.
pub mod schema {
    use serde_json::{json, Value};

    pub fn object(properties: Value, required: &[&str]) -> Value {
        json!({
            "type": "object",
            "properties": properties,
            "required": required,
        })
    }

    pub fn string(description: &str) -> Value {
        json!({
            "type": "string",
            "description": description,
        })
    }

    pub fn string_enum(description: &str, values: &[&str]) -> Value {
        json!({
            "type": "string",
            "description": description,
            "enum": values,
        })
    }
}

/// Reads a required string argument.
pub fn required_str<'a>(arguments: &'a Value, key: &str) -> Result<&'a str, ToolError> {
    arguments
        .get(key)
        .and_then(Value::as_str)
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .ok_or_else(|| ToolError::InvalidArguments(format!("missing string argument '{}'", key)))
}

/// Reads an optional string argument, falling back to `default`.
pub fn optional_str<'a>(arguments: &'a Value, key: &str, default: &'a str) -> Result<&'a str, ToolError> {
    match arguments.get(key) {
        None | Some(Value::Null) => Ok(default),
        Some(Value::String(s)) if s.trim().is_empty() => Ok(default),
        Some(Value::String(s)) => Ok(s.trim()),
        Some(other) => Err(ToolError::InvalidArguments(format!(
            "argument '{}' must be a string, got {}",
            key, other
        ))),
    }
}
