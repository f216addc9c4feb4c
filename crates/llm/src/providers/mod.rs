pub mod openai_chat;

use std::sync::Arc;

use tracing::info;

use parley_core::config::LlmConfig;
use parley_tool_runtime::CompletionProvider;

pub use openai_chat::OpenAiChatProvider;

/// Build the completion provider from config.
///
/// Returns `None` when no API key is configured; the server still runs,
/// and turns report the missing provider in-band.
pub fn create_provider(llm: &LlmConfig) -> Option<Arc<dyn CompletionProvider>> {
    let api_key = llm.api_key.clone()?;
    info!(model = %llm.model, "completion provider ready");
    Some(Arc::new(OpenAiChatProvider::new(
        api_key,
        llm.model.clone(),
        llm.base_url.clone(),
    )))
}
