//! Streaming request plumbing for the chat-completions endpoint.

use std::collections::VecDeque;
use std::pin::Pin;
use std::time::Duration;

use async_trait::async_trait;
use futures::stream::{self, Stream, StreamExt};
use serde_json::{json, Value};
use tracing::debug;

use parley_core::ChatMessage;
use parley_tool_runtime::provider::{CompletionProvider, EventStream, LlmError};
use parley_tool_runtime::stream::StreamEvent;
use parley_tool_runtime::tool::ToolDefinition;

use super::delta::parse_stream_line;
use super::translate::{message_to_openai, tool_definition_to_openai};

/// How long the reader waits for the next chunk before giving up.
const READ_TIMEOUT: Duration = Duration::from_secs(30);

/// OpenAI-compatible chat-completions provider with streaming tool calls.
pub struct OpenAiChatProvider {
    client: reqwest::Client,
    api_key: String,
    model: String,
    base_url: String,
}

impl OpenAiChatProvider {
    /// Create a new provider.
    ///
    /// # Arguments
    /// * `api_key` - bearer token
    /// * `model` - model name (e.g. `"gpt-4o"`)
    /// * `base_url` - API base URL (e.g. `"https://api.openai.com"`)
    pub fn new(api_key: String, model: String, base_url: String) -> Self {
        Self {
            client: reqwest::Client::new(),
            api_key,
            model,
            base_url,
        }
    }
}

#[async_trait]
impl CompletionProvider for OpenAiChatProvider {
    async fn stream_completion(
        &self,
        messages: Vec<ChatMessage>,
        system_prompt: Option<String>,
        tools: Vec<ToolDefinition>,
    ) -> Result<EventStream, LlmError> {
        let url = format!("{}/v1/chat/completions", self.base_url);

        let mut api_messages: Vec<Value> = Vec::new();
        if let Some(system) = &system_prompt {
            api_messages.push(json!({"role": "system", "content": system}));
        }
        api_messages.extend(messages.iter().map(message_to_openai));

        let api_tools: Vec<Value> = tools.iter().map(tool_definition_to_openai).collect();

        let mut body = json!({
            "model": self.model,
            "messages": api_messages,
            "stream": true,
        });
        if !api_tools.is_empty() {
            body["tools"] = json!(api_tools);
        }

        debug!(model = %self.model, url = %url, "starting completion stream");

        let response = self
            .client
            .post(&url)
            .bearer_auth(&self.api_key)
            .header("Content-Type", "application/json")
            .json(&body)
            .send()
            .await
            .map_err(|e| LlmError::NetworkError(e.to_string()))?;

        let status = response.status().as_u16();
        if status != 200 {
            let body_text = response.text().await.unwrap_or_default();
            if status == 401 {
                return Err(LlmError::AuthError);
            }
            return Err(LlmError::ApiError {
                status,
                message: body_text,
            });
        }

        type ByteStream = Pin<Box<dyn Stream<Item = Result<bytes::Bytes, reqwest::Error>> + Send>>;

        struct State {
            bytes: ByteStream,
            buffer: String,
            pending: VecDeque<StreamEvent>,
            done: bool,
        }

        let state = State {
            bytes: Box::pin(response.bytes_stream()),
            buffer: String::new(),
            pending: VecDeque::new(),
            done: false,
        };

        let event_stream = stream::unfold(state, move |mut state| async move {
            loop {
                // Drain parsed events before reading more bytes.
                if let Some(evt) = state.pending.pop_front() {
                    return Some((Ok(evt), state));
                }
                if state.done {
                    return None;
                }

                match tokio::time::timeout(READ_TIMEOUT, state.bytes.next()).await {
                    Ok(Some(Ok(chunk))) => {
                        state.buffer.push_str(&String::from_utf8_lossy(&chunk));

                        // Consume complete lines; the trailing fragment
                        // stays in the buffer as the next seed.
                        while let Some(newline_pos) = state.buffer.find('\n') {
                            let line = state.buffer[..newline_pos]
                                .trim_end_matches('\r')
                                .to_string();
                            state.buffer = state.buffer[newline_pos + 1..].to_string();
                            state.pending.extend(parse_stream_line(&line));
                        }
                    }
                    Ok(Some(Err(e))) => {
                        state.done = true;
                        return Some((Err(LlmError::StreamError(e.to_string())), state));
                    }
                    Ok(None) => {
                        // Clean end of body. The buffer may still hold one
                        // last line without a trailing newline.
                        state.done = true;
                        let line = state.buffer.trim_end_matches('\r').to_string();
                        state.buffer.clear();
                        state.pending.extend(parse_stream_line(&line));
                    }
                    Err(_) => {
                        state.done = true;
                        return Some((
                            Err(LlmError::StreamError(format!(
                                "no data for {} seconds",
                                READ_TIMEOUT.as_secs()
                            ))),
                            state,
                        ));
                    }
                }
            }
        });

        Ok(Box::pin(event_stream))
    }

    fn provider_name(&self) -> &str {
        "openai"
    }
}
