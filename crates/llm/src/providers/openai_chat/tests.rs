//! Unit tests for the chat-completions provider.

use serde_json::json;

use parley_core::{ChatMessage, ToolCallRecord};
use parley_tool_runtime::stream::StreamEvent;
use parley_tool_runtime::tool::ToolDefinition;

use super::delta::parse_stream_line;
use super::translate::{message_to_openai, tool_definition_to_openai};

#[test]
fn test_tool_definition_translation() {
    let def = ToolDefinition {
        name: "execute_command".to_string(),
        description: "Run a shell command".to_string(),
        parameters: json!({
            "type": "object",
            "properties": {
                "command": { "type": "string" }
            },
            "required": ["command"]
        }),
    };

    let wire = tool_definition_to_openai(&def);

    assert_eq!(wire["type"], "function");
    assert_eq!(wire["function"]["name"], "execute_command");
    assert_eq!(wire["function"]["parameters"]["type"], "object");
}

#[test]
fn test_user_message_translation() {
    let wire = message_to_openai(&ChatMessage::user("hello"));
    assert_eq!(wire["role"], "user");
    assert_eq!(wire["content"], "hello");
}

#[test]
fn test_assistant_text_only_translation() {
    let wire = message_to_openai(&ChatMessage::Assistant {
        content: "files: a, b".into(),
        tool_calls: vec![],
    });
    assert_eq!(wire["role"], "assistant");
    assert_eq!(wire["content"], "files: a, b");
    assert!(wire.get("tool_calls").is_none());
}

#[test]
fn test_assistant_tool_call_translation_preserves_raw_arguments() {
    let wire = message_to_openai(&ChatMessage::Assistant {
        content: String::new(),
        tool_calls: vec![ToolCallRecord {
            id: "t1".into(),
            name: "execute_command".into(),
            arguments: "{\"command\":\"ls\"}".into(),
        }],
    });

    let calls = wire["tool_calls"].as_array().unwrap();
    assert_eq!(calls.len(), 1);
    assert_eq!(calls[0]["id"], "t1");
    assert_eq!(calls[0]["type"], "function");
    assert_eq!(calls[0]["function"]["name"], "execute_command");
    // arguments go back as the original string, not parsed JSON
    assert_eq!(calls[0]["function"]["arguments"], "{\"command\":\"ls\"}");
}

#[test]
fn test_tool_message_translation() {
    let wire = message_to_openai(&ChatMessage::Tool {
        tool_call_id: "t1".into(),
        content: "{\"success\":true,\"stdout\":\"a\\nb\\n\"}".into(),
    });
    assert_eq!(wire["role"], "tool");
    assert_eq!(wire["tool_call_id"], "t1");
}

#[test]
fn test_text_delta_line() {
    let events = parse_stream_line(
        r#"data: {"choices":[{"delta":{"content":"hi"}}]}"#,
    );
    assert_eq!(events.len(), 1);
    match &events[0] {
        StreamEvent::TextDelta { text } => assert_eq!(text, "hi"),
        other => panic!("expected TextDelta, got {:?}", other),
    }
}

#[test]
fn test_tool_call_start_line() {
    let events = parse_stream_line(
        r#"data: {"choices":[{"delta":{"tool_calls":[{"index":0,"id":"t1","function":{"name":"execute_command","arguments":""}}]}}]}"#,
    );
    assert_eq!(events.len(), 1);
    match &events[0] {
        StreamEvent::ToolCallStart {
            index,
            id,
            name,
            arguments,
        } => {
            assert_eq!(*index, 0);
            assert_eq!(id, "t1");
            assert_eq!(name, "execute_command");
            assert!(arguments.is_empty());
        }
        other => panic!("expected ToolCallStart, got {:?}", other),
    }
}

#[test]
fn test_tool_call_argument_delta_line() {
    let events = parse_stream_line(
        r#"data: {"choices":[{"delta":{"tool_calls":[{"index":0,"function":{"arguments":"{\"comm"}}]}}]}"#,
    );
    assert_eq!(events.len(), 1);
    match &events[0] {
        StreamEvent::ToolCallDelta {
            index,
            arguments_delta,
        } => {
            assert_eq!(*index, 0);
            assert_eq!(arguments_delta, "{\"comm");
        }
        other => panic!("expected ToolCallDelta, got {:?}", other),
    }
}

#[test]
fn test_done_sentinel_ignored() {
    assert!(parse_stream_line("data: [DONE]").is_empty());
}

#[test]
fn test_non_data_lines_ignored() {
    assert!(parse_stream_line(": keep-alive").is_empty());
    assert!(parse_stream_line("event: message").is_empty());
    assert!(parse_stream_line("").is_empty());
}

#[test]
fn test_malformed_json_discarded() {
    assert!(parse_stream_line("data: {not json").is_empty());
}

#[test]
fn test_empty_content_produces_nothing() {
    let events = parse_stream_line(r#"data: {"choices":[{"delta":{"content":""}}]}"#);
    assert!(events.is_empty());

    // role-only first frame
    let events = parse_stream_line(r#"data: {"choices":[{"delta":{"role":"assistant"}}]}"#);
    assert!(events.is_empty());
}

#[test]
fn test_mixed_delta_emits_text_and_tool_call() {
    let events = parse_stream_line(
        r#"data: {"choices":[{"delta":{"content":"on it","tool_calls":[{"index":1,"id":"t2","function":{"name":"execute_command","arguments":"{}"}}]}}]}"#,
    );
    assert_eq!(events.len(), 2);
    assert!(matches!(&events[0], StreamEvent::TextDelta { text } if text == "on it"));
    assert!(matches!(&events[1], StreamEvent::ToolCallStart { index: 1, .. }));
}
