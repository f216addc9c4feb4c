use async_trait::async_trait;
use futures::Stream;
use std::pin::Pin;

use parley_core::ChatMessage;

use crate::stream::StreamEvent;
use crate::tool::ToolDefinition;

pub type EventStream = Pin<Box<dyn Stream<Item = Result<StreamEvent, LlmError>> + Send>>;

/// Trait for streaming, tool-aware completion providers.
///
/// Defined here (not in crates/llm) because it belongs to the consumer:
/// the session's agent loop dictates the contract, providers implement it.
#[async_trait]
pub trait CompletionProvider: Send + Sync {
    /// Open a streaming completion for the given conversation.
    async fn stream_completion(
        &self,
        messages: Vec<ChatMessage>,
        system_prompt: Option<String>,
        tools: Vec<ToolDefinition>,
    ) -> Result<EventStream, LlmError>;

    /// Provider name for logging (e.g. "openai").
    fn provider_name(&self) -> &str;
}

#[derive(Debug, thiserror::Error)]
pub enum LlmError {
    #[error("API error: {status} - {message}")]
    ApiError { status: u16, message: String },
    #[error("Network error: {0}")]
    NetworkError(String),
    #[error("Authentication failed")]
    AuthError,
    #[error("Stream error: {0}")]
    StreamError(String),
    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

/// Mock provider for exercising the agent loop without real API calls.
#[cfg(any(test, feature = "test-utils"))]
pub mod mock {
    use super::*;
    use futures::stream;
    use std::collections::VecDeque;
    use std::sync::Mutex;

    enum Scripted {
        Events(Vec<StreamEvent>),
        Failure(LlmError),
    }

    /// Returns pre-scripted responses in FIFO order; an exhausted queue
    /// yields an empty stream (no text, no tool calls).
    pub struct MockProvider {
        responses: Mutex<VecDeque<Scripted>>,
    }

    impl MockProvider {
        pub fn new() -> Self {
            Self {
                responses: Mutex::new(VecDeque::new()),
            }
        }

        /// Queue a full event stream for the next call.
        pub fn queue_events(&self, events: Vec<StreamEvent>) {
            self.responses
                .lock()
                .unwrap()
                .push_back(Scripted::Events(events));
        }

        /// Queue a plain text response.
        pub fn queue_text(&self, text: &str) {
            self.queue_events(vec![StreamEvent::TextDelta {
                text: text.to_string(),
            }]);
        }

        /// Queue a single complete tool call.
        pub fn queue_tool_call(&self, id: &str, name: &str, arguments: &str) {
            self.queue_events(vec![
                StreamEvent::ToolCallStart {
                    index: 0,
                    id: id.to_string(),
                    name: name.to_string(),
                    arguments: String::new(),
                },
                StreamEvent::ToolCallDelta {
                    index: 0,
                    arguments_delta: arguments.to_string(),
                },
            ]);
        }

        /// Queue a failure for the next call.
        pub fn queue_error(&self, error: LlmError) {
            self.responses
                .lock()
                .unwrap()
                .push_back(Scripted::Failure(error));
        }
    }

    impl Default for MockProvider {
        fn default() -> Self {
            Self::new()
        }
    }

    #[async_trait]
    impl CompletionProvider for MockProvider {
        async fn stream_completion(
            &self,
            _messages: Vec<ChatMessage>,
            _system_prompt: Option<String>,
            _tools: Vec<ToolDefinition>,
        ) -> Result<EventStream, LlmError> {
            let scripted = self.responses.lock().unwrap().pop_front();
            match scripted {
                Some(Scripted::Failure(e)) => Err(e),
                Some(Scripted::Events(events)) => {
                    Ok(Box::pin(stream::iter(events.into_iter().map(Ok))))
                }
                None => Ok(Box::pin(stream::empty())),
            }
        }

        fn provider_name(&self) -> &str {
            "mock"
        }
    }
}
