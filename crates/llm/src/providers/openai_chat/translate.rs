//! Translation between chat domain types and the completions wire schema.

use serde_json::{json, Value};

use parley_core::ChatMessage;
use parley_tool_runtime::tool::ToolDefinition;

/// Translate a [`ToolDefinition`] into the remote function-tool format.
pub(super) fn tool_definition_to_openai(tool: &ToolDefinition) -> Value {
    json!({
        "type": "function",
        "function": {
            "name": tool.name,
            "description": tool.description,
            "parameters": tool.parameters,
        },
    })
}

/// Translate a [`ChatMessage`] into a wire message object.
pub(super) fn message_to_openai(msg: &ChatMessage) -> Value {
    match msg {
        ChatMessage::User { content } => json!({
            "role": "user",
            "content": content,
        }),
        ChatMessage::Assistant {
            content,
            tool_calls,
        } => {
            let mut message = json!({
                "role": "assistant",
                "content": content,
            });
            if !tool_calls.is_empty() {
                message["tool_calls"] = Value::Array(
                    tool_calls
                        .iter()
                        .map(|tc| {
                            json!({
                                "id": tc.id,
                                "type": "function",
                                "function": {
                                    "name": tc.name,
                                    // raw string, exactly as the model emitted it
                                    "arguments": tc.arguments,
                                },
                            })
                        })
                        .collect(),
                );
            }
            message
        }
        ChatMessage::Tool {
            tool_call_id,
            content,
        } => json!({
            "role": "tool",
            "tool_call_id": tool_call_id,
            "content": content,
        }),
    }
}
