//! Parsing of `data:` stream frames into [`StreamEvent`]s.

use serde_json::Value;
use tracing::trace;

use parley_tool_runtime::stream::StreamEvent;

/// Parse one line of the chunked response body.
///
/// Non-`data:` lines, the `[DONE]` sentinel, empty payloads, and malformed
/// JSON are all silently discarded.
pub(super) fn parse_stream_line(line: &str) -> Vec<StreamEvent> {
    let Some(payload) = line.strip_prefix("data: ") else {
        return Vec::new();
    };
    let payload = payload.trim();
    if payload.is_empty() || payload == "[DONE]" {
        return Vec::new();
    }
    let Ok(parsed) = serde_json::from_str::<Value>(payload) else {
        trace!("discarding malformed stream line");
        return Vec::new();
    };
    parse_delta(&parsed["choices"][0]["delta"])
}

/// Translate a single `choices[0].delta` object into zero or more events.
pub(super) fn parse_delta(delta: &Value) -> Vec<StreamEvent> {
    let mut events = Vec::new();

    if let Some(text) = delta["content"].as_str() {
        if !text.is_empty() {
            events.push(StreamEvent::TextDelta {
                text: text.to_string(),
            });
        }
    }

    if let Some(calls) = delta["tool_calls"].as_array() {
        for call in calls {
            let index = call["index"].as_u64().unwrap_or(0) as u32;
            if let Some(id) = call["id"].as_str() {
                // Presence of `id` announces a new tool call.
                events.push(StreamEvent::ToolCallStart {
                    index,
                    id: id.to_string(),
                    name: call["function"]["name"].as_str().unwrap_or("").to_string(),
                    arguments: call["function"]["arguments"]
                        .as_str()
                        .unwrap_or("")
                        .to_string(),
                });
            } else if let Some(arguments) = call["function"]["arguments"].as_str() {
                events.push(StreamEvent::ToolCallDelta {
                    index,
                    arguments_delta: arguments.to_string(),
                });
            }
        }
    }

    events
}
