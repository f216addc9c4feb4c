//! File-backed chat persistence.
//!
//! One JSON file holds the whole `chat-id → Chat` table. Every mutation
//! rewrites the file through a temp file + fsync + atomic rename, so a
//! crash can never leave a torn record and every mutating call is durable
//! before it returns.

use std::collections::HashMap;
use std::fs::File;
use std::io::Write;
use std::path::{Path, PathBuf};

use thiserror::Error;
use tracing::info;

use parley_core::{Chat, ChatMessage, ChatSummary};

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
    #[error("chat store unavailable")]
    Closed,
}

/// The chat table. Single-owner by construction: it is only ever driven
/// by the store actor task, so operations never race.
pub struct ChatStore {
    path: PathBuf,
    chats: HashMap<String, Chat>,
}

impl ChatStore {
    /// Open the store, creating parent directories and loading any
    /// existing table file.
    pub fn open(path: impl Into<PathBuf>) -> Result<Self, StoreError> {
        let path = path.into();
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let chats = if path.exists() {
            let data = std::fs::read_to_string(&path)?;
            serde_json::from_str(&data)?
        } else {
            HashMap::new()
        };
        info!(path = %path.display(), chats = chats.len(), "chat store opened");
        Ok(Self { path, chats })
    }

    /// List all chats, newest first.
    pub fn list(&self) -> Vec<ChatSummary> {
        let mut summaries: Vec<ChatSummary> = self.chats.values().map(ChatSummary::from).collect();
        summaries.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        summaries
    }

    pub fn get(&self, id: &str) -> Option<Chat> {
        self.chats.get(id).cloned()
    }

    /// Insert a fresh chat with an empty message list.
    pub fn create(&mut self, id: &str, title: &str) -> Result<Chat, StoreError> {
        let chat = Chat::new(id, title);
        self.chats.insert(id.to_string(), chat.clone());
        self.persist()?;
        info!(id, title, "chat created");
        Ok(chat)
    }

    /// Replace a chat's full message list. No-op if the id is absent.
    pub fn save_messages(&mut self, id: &str, messages: Vec<ChatMessage>) -> Result<(), StoreError> {
        if let Some(chat) = self.chats.get_mut(id) {
            chat.messages = messages;
            self.persist()?;
        }
        Ok(())
    }

    /// Rename a chat. No-op if the id is absent.
    pub fn update_title(&mut self, id: &str, title: &str) -> Result<(), StoreError> {
        if let Some(chat) = self.chats.get_mut(id) {
            chat.title = title.to_string();
            self.persist()?;
        }
        Ok(())
    }

    pub fn delete(&mut self, id: &str) -> Result<(), StoreError> {
        if self.chats.remove(id).is_some() {
            self.persist()?;
            info!(id, "chat deleted");
        }
        Ok(())
    }

    /// Rewrite the table file atomically and durably.
    fn persist(&self) -> Result<(), StoreError> {
        let tmp = tmp_path(&self.path);
        let data = serde_json::to_vec_pretty(&self.chats)?;
        let mut file = File::create(&tmp)?;
        file.write_all(&data)?;
        file.sync_all()?;
        std::fs::rename(&tmp, &self.path)?;
        Ok(())
    }
}

fn tmp_path(path: &Path) -> PathBuf {
    let mut name = path.file_name().unwrap_or_default().to_os_string();
    name.push(".tmp");
    path.with_file_name(name)
}
