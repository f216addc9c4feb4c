//! Application wiring from `Config`.

use std::sync::Arc;

use anyhow::{Context, Result};
use tracing::warn;

use parley_core::Config;
use parley_store::StoreHandle;
use parley_tool_runtime::ExecutorHandle;

use crate::session::registry::SessionRegistry;
use crate::session::SessionDeps;
use crate::state::AppState;

/// Build the shared state: store actor, executor actor, provider, registry.
pub fn build_state(config: &Config) -> Result<Arc<AppState>> {
    let store = StoreHandle::spawn(config.storage.chats_path()).context("opening chat store")?;
    std::fs::create_dir_all(&config.storage.work_root).context("creating work dir root")?;

    let provider = parley_llm::create_provider(&config.llm);
    if provider.is_none() {
        warn!("OPENAI_API_KEY not set — completions disabled, turns will report an error");
    }

    let deps = SessionDeps {
        store: store.clone(),
        executor: ExecutorHandle::spawn(),
        provider,
        work_root: config.storage.work_root.clone(),
    };

    Ok(Arc::new(AppState {
        config: config.clone(),
        store,
        registry: SessionRegistry::new(deps),
    }))
}
