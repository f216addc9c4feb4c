//! Single-writer actor front over [`ChatStore`].
//!
//! All store operations from any task funnel through one mpsc inbox, so
//! concurrent writers serialize without locks. The handle is cheap to
//! clone and safe to share.

use tokio::sync::{mpsc, oneshot};
use tracing::warn;

use parley_core::{Chat, ChatMessage, ChatSummary};

use crate::store::{ChatStore, StoreError};

enum StoreCommand {
    List {
        reply: oneshot::Sender<Vec<ChatSummary>>,
    },
    Get {
        id: String,
        reply: oneshot::Sender<Option<Chat>>,
    },
    Create {
        id: String,
        title: String,
        reply: oneshot::Sender<Result<Chat, StoreError>>,
    },
    SaveMessages {
        id: String,
        messages: Vec<ChatMessage>,
        reply: oneshot::Sender<Result<(), StoreError>>,
    },
    UpdateTitle {
        id: String,
        title: String,
        reply: oneshot::Sender<Result<(), StoreError>>,
    },
    Delete {
        id: String,
        reply: oneshot::Sender<Result<(), StoreError>>,
    },
}

/// Cloneable handle to the store actor.
#[derive(Clone)]
pub struct StoreHandle {
    tx: mpsc::Sender<StoreCommand>,
}

impl StoreHandle {
    /// Open the backing file and spawn the actor task.
    pub fn spawn(path: impl Into<std::path::PathBuf>) -> Result<Self, StoreError> {
        let mut store = ChatStore::open(path)?;
        let (tx, mut rx) = mpsc::channel::<StoreCommand>(64);

        tokio::spawn(async move {
            while let Some(cmd) = rx.recv().await {
                match cmd {
                    StoreCommand::List { reply } => {
                        let _ = reply.send(store.list());
                    }
                    StoreCommand::Get { id, reply } => {
                        let _ = reply.send(store.get(&id));
                    }
                    StoreCommand::Create { id, title, reply } => {
                        let _ = reply.send(store.create(&id, &title));
                    }
                    StoreCommand::SaveMessages { id, messages, reply } => {
                        let _ = reply.send(store.save_messages(&id, messages));
                    }
                    StoreCommand::UpdateTitle { id, title, reply } => {
                        let _ = reply.send(store.update_title(&id, &title));
                    }
                    StoreCommand::Delete { id, reply } => {
                        let _ = reply.send(store.delete(&id));
                    }
                }
            }
            warn!("chat store actor stopped");
        });

        Ok(Self { tx })
    }

    pub async fn list(&self) -> Result<Vec<ChatSummary>, StoreError> {
        let (reply, rx) = oneshot::channel();
        self.tx
            .send(StoreCommand::List { reply })
            .await
            .map_err(|_| StoreError::Closed)?;
        rx.await.map_err(|_| StoreError::Closed)
    }

    pub async fn get(&self, id: &str) -> Result<Option<Chat>, StoreError> {
        let (reply, rx) = oneshot::channel();
        self.tx
            .send(StoreCommand::Get {
                id: id.to_string(),
                reply,
            })
            .await
            .map_err(|_| StoreError::Closed)?;
        rx.await.map_err(|_| StoreError::Closed)
    }

    pub async fn create(&self, id: &str, title: &str) -> Result<Chat, StoreError> {
        let (reply, rx) = oneshot::channel();
        self.tx
            .send(StoreCommand::Create {
                id: id.to_string(),
                title: title.to_string(),
                reply,
            })
            .await
            .map_err(|_| StoreError::Closed)?;
        rx.await.map_err(|_| StoreError::Closed)?
    }

    pub async fn save_messages(&self, id: &str, messages: Vec<ChatMessage>) -> Result<(), StoreError> {
        let (reply, rx) = oneshot::channel();
        self.tx
            .send(StoreCommand::SaveMessages {
                id: id.to_string(),
                messages,
                reply,
            })
            .await
            .map_err(|_| StoreError::Closed)?;
        rx.await.map_err(|_| StoreError::Closed)?
    }

    pub async fn update_title(&self, id: &str, title: &str) -> Result<(), StoreError> {
        let (reply, rx) = oneshot::channel();
        self.tx
            .send(StoreCommand::UpdateTitle {
                id: id.to_string(),
                title: title.to_string(),
                reply,
            })
            .await
            .map_err(|_| StoreError::Closed)?;
        rx.await.map_err(|_| StoreError::Closed)?
    }

    pub async fn delete(&self, id: &str) -> Result<(), StoreError> {
        let (reply, rx) = oneshot::channel();
        self.tx
            .send(StoreCommand::Delete {
                id: id.to_string(),
                reply,
            })
            .await
            .map_err(|_| StoreError::Closed)?;
        rx.await.map_err(|_| StoreError::Closed)?
    }
}
