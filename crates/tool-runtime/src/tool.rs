use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::executor::ALLOWED_COMMANDS;

/// Describes a tool's interface for LLM consumption.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolDefinition {
    /// Unique tool name (e.g. "execute_command").
    pub name: String,
    /// Human-readable description for the LLM.
    pub description: String,
    /// JSON Schema describing the expected input.
    pub parameters: Value,
}

/// Definition of the built-in shell command tool.
pub fn execute_command_tool() -> ToolDefinition {
    ToolDefinition {
        name: "execute_command".to_string(),
        description: format!(
            "Execute a shell command in the chat's working directory and \
             return its output. Allowed commands: {}.",
            ALLOWED_COMMANDS.join(", ")
        ),
        parameters: serde_json::json!({
            "type": "object",
            "properties": {
                "command": {
                    "type": "string",
                    "description": "The shell command to execute"
                }
            },
            "required": ["command"]
        }),
    }
}
