//! Tool trait: the abstraction over agent capabilities.
//!
//! Tools are what let the assistant act on the vault: read a note, list a
//! folder, search. Every tool publishes a JSON schema; arguments are checked
//! against it by a [`SchemaValidator`] before the handler runs.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use tracing::debug;

use crate::error::ToolError;
use crate::provider::ToolDefinition;

/// A request to execute a tool.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolCall {
    /// Unique call ID (matches the LLM's tool_call.id)
    pub id: String,

    /// Name of the tool to execute; empty when the model sent a malformed call
    #[serde(default)]
    pub name: String,

    /// Arguments as a JSON value
    #[serde(default)]
    pub arguments: serde_json::Value,
}

/// The result of a tool execution.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolResult {
    /// The call ID this result is for
    pub call_id: String,

    /// The tool that produced it
    pub tool_name: String,

    /// Whether the tool executed successfully
    pub success: bool,

    /// The output content
    pub output: String,

    /// Optional structured data
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<serde_json::Value>,
}

impl ToolResult {
    pub fn success(
        call_id: impl Into<String>,
        tool_name: impl Into<String>,
        output: impl Into<String>,
    ) -> Self {
        Self {
            call_id: call_id.into(),
            tool_name: tool_name.into(),
            success: true,
            output: output.into(),
            data: None,
        }
    }

    pub fn failure(
        call_id: impl Into<String>,
        tool_name: impl Into<String>,
        output: impl Into<String>,
    ) -> Self {
        Self {
            call_id: call_id.into(),
            tool_name: tool_name.into(),
            success: false,
            output: output.into(),
            data: None,
        }
    }

    pub fn with_data(mut self, data: serde_json::Value) -> Self {
        self.data = Some(data);
        self
    }
}

/// The core Tool trait.
#[async_trait]
pub trait Tool: Send + Sync {
    /// The unique name of this tool (e.g., "read_note").
    fn name(&self) -> &str;

    /// A description of what this tool does (sent to the LLM).
    fn description(&self) -> &str;

    /// JSON Schema describing this tool's parameters.
    fn parameters_schema(&self) -> serde_json::Value;

    /// Execute the tool with already-validated arguments.
    async fn execute(&self, arguments: serde_json::Value) -> std::result::Result<ToolResult, ToolError>;

    /// Convert this tool into a ToolDefinition for sending to the LLM.
    fn to_definition(&self) -> ToolDefinition {
        ToolDefinition {
            name: self.name().to_string(),
            description: self.description().to_string(),
            parameters: self.parameters_schema(),
        }
    }
}

/// Outcome of validating tool arguments against a schema.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Validation {
    Valid,
    Invalid(Vec<String>),
}

impl Validation {
    pub fn is_valid(&self) -> bool {
        matches!(self, Self::Valid)
    }
}

/// Validates tool arguments against a tool's schema.
pub trait SchemaValidator: Send + Sync {
    fn validate(&self, schema: &serde_json::Value, arguments: &serde_json::Value) -> Validation;
}

/// Checks the subset of JSON Schema tools here use: an object with
/// `required` keys and primitive `type`s on top-level properties.
#[derive(Debug, Default, Clone, Copy)]
pub struct BasicSchemaValidator;

impl BasicSchemaValidator {
    fn type_matches(expected: &str, value: &serde_json::Value) -> bool {
        match expected {
            "string" => value.is_string(),
            "integer" => value.is_i64() || value.is_u64(),
            "number" => value.is_number(),
            "boolean" => value.is_boolean(),
            "array" => value.is_array(),
            "object" => value.is_object(),
            "null" => value.is_null(),
            _ => true,
        }
    }
}

impl SchemaValidator for BasicSchemaValidator {
    fn validate(&self, schema: &serde_json::Value, arguments: &serde_json::Value) -> Validation {
        let mut errors = Vec::new();

        if schema.get("type").and_then(|t| t.as_str()) == Some("object") && !arguments.is_object()
        {
            return Validation::Invalid(vec!["arguments must be a JSON object".into()]);
        }

        if let Some(required) = schema.get("required").and_then(|r| r.as_array()) {
            for key in required.iter().filter_map(|k| k.as_str()) {
                if arguments.get(key).is_none_or(|v| v.is_null()) {
                    errors.push(format!("missing required argument '{key}'"));
                }
            }
        }

        if let Some(props) = schema.get("properties").and_then(|p| p.as_object()) {
            for (key, prop) in props {
                let (Some(value), Some(expected)) =
                    (arguments.get(key), prop.get("type").and_then(|t| t.as_str()))
                else {
                    continue;
                };
                if !value.is_null() && !Self::type_matches(expected, value) {
                    errors.push(format!("argument '{key}' must be of type {expected}"));
                }
            }
        }

        if errors.is_empty() {
            Validation::Valid
        } else {
            Validation::Invalid(errors)
        }
    }
}

/// A registry of available tools.
///
/// The tool loop uses this to:
/// 1. Get tool definitions to send to the LLM
/// 2. Look up, validate and execute tools when the LLM requests them
pub struct ToolRegistry {
    tools: HashMap<String, Box<dyn Tool>>,
    validator: Box<dyn SchemaValidator>,
}

impl ToolRegistry {
    pub fn new() -> Self {
        Self {
            tools: HashMap::new(),
            validator: Box::new(BasicSchemaValidator),
        }
    }

    /// Swap the argument validator.
    pub fn with_validator(mut self, validator: Box<dyn SchemaValidator>) -> Self {
        self.validator = validator;
        self
    }

    /// Register a tool. Replaces any existing tool with the same name.
    pub fn register(&mut self, tool: Box<dyn Tool>) {
        let name = tool.name().to_string();
        self.tools.insert(name, tool);
    }

    /// Get a tool by name.
    pub fn get(&self, name: &str) -> Option<&dyn Tool> {
        self.tools.get(name).map(|t| t.as_ref())
    }

    /// Get all tool definitions (for sending to the LLM), sorted by name.
    pub fn definitions(&self) -> Vec<ToolDefinition> {
        let mut defs: Vec<_> = self.tools.values().map(|t| t.to_definition()).collect();
        defs.sort_by(|a, b| a.name.cmp(&b.name));
        defs
    }

    /// Execute a tool call.
    ///
    /// Unknown tools are an error; arguments that fail validation come back
    /// as a failed [`ToolResult`] without reaching the handler.
    pub async fn execute(&self, call: &ToolCall) -> std::result::Result<ToolResult, ToolError> {
        let tool = self
            .tools
            .get(&call.name)
            .ok_or_else(|| ToolError::NotFound(call.name.clone()))?;

        if let Validation::Invalid(errors) =
            self.validator.validate(&tool.parameters_schema(), &call.arguments)
        {
            debug!(tool = %call.name, errors = errors.len(), "Tool arguments rejected");
            return Ok(ToolResult::failure(
                &call.id,
                &call.name,
                format!("Invalid arguments: {}", errors.join("; ")),
            ));
        }

        let mut result = tool.execute(call.arguments.clone()).await?;
        result.call_id = call.id.clone();
        result.tool_name = call.name.clone();
        Ok(result)
    }

    /// List all registered tool names, sorted.
    pub fn names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.tools.keys().map(|s| s.as_str()).collect();
        names.sort_unstable();
        names
    }

    pub fn is_empty(&self) -> bool {
        self.tools.is_empty()
    }
}

impl Default for ToolRegistry {
    fn default() -> Self {
        Self::new()
    }
}
