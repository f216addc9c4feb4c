pub mod chat;
pub mod config;

pub use chat::{new_chat_id, Chat, ChatMessage, ChatSummary, ToolCallRecord};
pub use config::Config;
