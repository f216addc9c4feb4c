//! OpenAI chat-completions implementation of [`CompletionProvider`].
//!
//! Streams `data:` frames from the completions endpoint and translates
//! them into the provider-agnostic [`StreamEvent`] deltas, including the
//! incremental tool-call assembly protocol (start frame with `id`/`name`,
//! argument deltas keyed by `index`).
//!
//! [`CompletionProvider`]: parley_tool_runtime::CompletionProvider
//! [`StreamEvent`]: parley_tool_runtime::StreamEvent

mod delta;
mod streaming;
mod translate;

pub use self::streaming::OpenAiChatProvider;

#[cfg(test)]
mod tests;
