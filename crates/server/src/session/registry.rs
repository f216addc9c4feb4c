//! Chat-id → live session lookup and lifecycle.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use tokio::sync::Mutex;
use tracing::debug;

use parley_store::StoreError;

use super::{Session, SessionDeps, SessionHandle};

/// Shared map of live sessions. Sessions deregister themselves on exit.
pub type SessionMap = Arc<Mutex<HashMap<String, SessionHandle>>>;

#[derive(Debug, thiserror::Error)]
pub enum RegistryError {
    #[error(transparent)]
    Store(#[from] StoreError),
    #[error("failed to create session work dir: {0}")]
    WorkDir(#[from] std::io::Error),
}

/// Looks up or lazily spawns sessions. Sessions are temporary: a crashed
/// or expired session is simply reconstituted from the store on the next
/// request, never auto-restarted.
#[derive(Clone)]
pub struct SessionRegistry {
    sessions: SessionMap,
    deps: SessionDeps,
}

impl SessionRegistry {
    pub fn new(deps: SessionDeps) -> Self {
        Self {
            sessions: Arc::new(Mutex::new(HashMap::new())),
            deps,
        }
    }

    /// Return the live session for `id`, spawning one from stored state if
    /// needed. A chat id with no record gets a fresh record.
    pub async fn get_or_start(&self, id: &str) -> Result<SessionHandle, RegistryError> {
        let mut sessions = self.sessions.lock().await;
        if let Some(handle) = sessions.get(id) {
            if handle.is_alive() {
                return Ok(handle.clone());
            }
        }

        let chat = match self.deps.store.get(id).await? {
            Some(chat) => chat,
            None => self.deps.store.create(id, &format!("Chat {id}")).await?,
        };

        debug!(chat_id = %id, "spawning session");
        let handle = Session::spawn(chat, self.deps.clone(), self.sessions.clone())?;
        sessions.insert(id.to_string(), handle.clone());
        Ok(handle)
    }

    /// The live session for `id`, if any. Never spawns.
    pub async fn get_live(&self, id: &str) -> Option<SessionHandle> {
        let sessions = self.sessions.lock().await;
        sessions.get(id).filter(|h| h.is_alive()).cloned()
    }

    pub async fn online(&self, id: &str) -> bool {
        self.get_live(id).await.is_some()
    }

    /// Ids of all currently live sessions.
    pub async fn live_ids(&self) -> HashSet<String> {
        let sessions = self.sessions.lock().await;
        sessions
            .iter()
            .filter(|(_, h)| h.is_alive())
            .map(|(id, _)| id.clone())
            .collect()
    }

    /// Best-effort stop; used by chat deletion.
    pub async fn stop(&self, id: &str) {
        if let Some(handle) = self.sessions.lock().await.remove(id) {
            handle.shutdown();
        }
    }
}
