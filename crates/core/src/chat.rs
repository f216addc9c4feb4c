//! Chat domain types shared across the workspace.

use chrono::{DateTime, Utc};
use rand::distributions::Alphanumeric;
use rand::Rng;
use serde::{Deserialize, Serialize};

/// Length of generated chat ids. URL-safe alphanumeric, assigned on create.
const CHAT_ID_LEN: usize = 16;

/// Generate a fresh chat id.
pub fn new_chat_id() -> String {
    rand::thread_rng()
        .sample_iter(&Alphanumeric)
        .take(CHAT_ID_LEN)
        .map(char::from)
        .collect()
}

/// A tool invocation requested by the model.
///
/// `arguments` is the raw JSON string exactly as the model emitted it, so
/// persisted history reproduces model output byte-for-byte.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolCallRecord {
    pub id: String,
    pub name: String,
    pub arguments: String,
}

/// A message in a chat's conversation log.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "role", rename_all = "snake_case")]
pub enum ChatMessage {
    User {
        content: String,
    },
    Assistant {
        content: String,
        #[serde(default, skip_serializing_if = "Vec::is_empty")]
        tool_calls: Vec<ToolCallRecord>,
    },
    /// Result of a tool execution. `content` is the JSON-encoded result.
    Tool {
        tool_call_id: String,
        content: String,
    },
}

impl ChatMessage {
    pub fn user(content: impl Into<String>) -> Self {
        Self::User {
            content: content.into(),
        }
    }
}

/// A persisted chat: the full conversation plus its metadata.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Chat {
    pub id: String,
    pub title: String,
    pub created_at: DateTime<Utc>,
    pub messages: Vec<ChatMessage>,
}

impl Chat {
    pub fn new(id: impl Into<String>, title: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            title: title.into(),
            created_at: Utc::now(),
            messages: Vec::new(),
        }
    }
}

/// Lightweight chat listing entry (no messages).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatSummary {
    pub id: String,
    pub title: String,
    pub created_at: DateTime<Utc>,
}

impl From<&Chat> for ChatSummary {
    fn from(chat: &Chat) -> Self {
        Self {
            id: chat.id.clone(),
            title: chat.title.clone(),
            created_at: chat.created_at,
        }
    }
}
