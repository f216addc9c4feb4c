use serde::{Deserialize, Serialize};

/// Events emitted while streaming an LLM completion.
///
/// Provider-agnostic; the provider layer translates the remote wire
/// format into these. Tool-call deltas are linked to their announcement
/// by `index`, which is how the chat-completions protocol keys them.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum StreamEvent {
    /// A chunk of assistant text.
    TextDelta { text: String },
    /// A new tool call was announced (the delta carried an `id`).
    /// `arguments` holds whatever argument text arrived with the
    /// announcement, often empty.
    ToolCallStart {
        index: u32,
        id: String,
        name: String,
        arguments: String,
    },
    /// Incremental argument text for an already-announced tool call.
    ToolCallDelta { index: u32, arguments_delta: String },
}
