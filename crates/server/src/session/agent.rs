//! The bounded tool-calling loop that drives one turn.
//!
//! Runs in its own task and reports back through the owning session's
//! inbox; it never touches session state directly. Text deltas are
//! broadcast as they arrive, while tool calls are assembled privately and
//! only surfaced once their arguments are complete.

use std::collections::BTreeMap;
use std::path::PathBuf;
use std::sync::Arc;

use futures::StreamExt;
use serde_json::{json, Value};
use tokio::sync::{mpsc, oneshot};
use tracing::{debug, warn};

use parley_core::{ChatMessage, ToolCallRecord};
use parley_tool_runtime::{
    execute_command_tool, CommandResult, CompletionProvider, ExecutorHandle, StreamEvent,
};

use super::events::SessionEvent;
use super::SessionCommand;

/// Upper bound on LLM round-trips within a single turn.
const MAX_STEPS: usize = 10;

/// Messages from the turn task back into the session actor.
pub(crate) enum TurnUpdate {
    Broadcast(SessionEvent),
    /// Replace the conversation and persist it; acked once durable.
    Commit {
        messages: Vec<ChatMessage>,
        ack: oneshot::Sender<()>,
    },
    Finished,
}

/// Everything a turn needs, captured at turn start.
pub(crate) struct TurnContext {
    pub chat_id: String,
    pub messages: Vec<ChatMessage>,
    pub work_dir: PathBuf,
    pub provider: Option<Arc<dyn CompletionProvider>>,
    pub executor: ExecutorHandle,
    pub system_prompt: String,
    pub inbox: mpsc::Sender<SessionCommand>,
}

/// A tool call under assembly, keyed by wire index.
#[derive(Default)]
struct PartialToolCall {
    id: Option<String>,
    name: String,
    arguments: String,
}

pub(crate) async fn run_turn(mut ctx: TurnContext) {
    if let Err(message) = drive(&mut ctx).await {
        warn!(chat_id = %ctx.chat_id, %message, "turn failed");
        broadcast(&ctx, SessionEvent::Error { message }).await;
    }
    send(&ctx, TurnUpdate::Finished).await;
}

async fn drive(ctx: &mut TurnContext) -> Result<(), String> {
    let Some(provider) = ctx.provider.clone() else {
        return Err("OPENAI_API_KEY not set".to_string());
    };
    let tools = vec![execute_command_tool()];

    for step in 0..MAX_STEPS {
        debug!(chat_id = %ctx.chat_id, step, "starting agent loop step");

        let mut stream = provider
            .stream_completion(
                ctx.messages.clone(),
                Some(ctx.system_prompt.clone()),
                tools.clone(),
            )
            .await
            .map_err(|e| e.to_string())?;

        let mut text = String::new();
        let mut calls: BTreeMap<u32, PartialToolCall> = BTreeMap::new();

        while let Some(item) = stream.next().await {
            match item {
                Ok(StreamEvent::TextDelta { text: delta }) => {
                    text.push_str(&delta);
                    broadcast(ctx, SessionEvent::TextDelta { text: delta }).await;
                }
                Ok(StreamEvent::ToolCallStart {
                    index,
                    id,
                    name,
                    arguments,
                }) => {
                    let call = calls.entry(index).or_default();
                    call.id = Some(id);
                    call.name = name;
                    call.arguments = arguments;
                }
                Ok(StreamEvent::ToolCallDelta {
                    index,
                    arguments_delta,
                }) => {
                    calls
                        .entry(index)
                        .or_default()
                        .arguments
                        .push_str(&arguments_delta);
                }
                Err(e) => {
                    // A stream that dies after producing output is treated
                    // as a clean end; with nothing produced it is an error.
                    let produced =
                        !text.is_empty() || calls.values().any(|c| c.id.is_some());
                    if produced {
                        warn!(chat_id = %ctx.chat_id, error = %e, "completion stream ended early");
                        break;
                    }
                    return Err(e.to_string());
                }
            }
        }

        // Only calls that were actually announced count.
        let completed: Vec<ToolCallRecord> = calls
            .into_values()
            .filter_map(|c| {
                c.id.map(|id| ToolCallRecord {
                    id,
                    name: c.name,
                    arguments: c.arguments,
                })
            })
            .collect();

        if completed.is_empty() {
            ctx.messages.push(ChatMessage::Assistant {
                content: text,
                tool_calls: vec![],
            });
            commit(ctx).await;
            return Ok(());
        }

        for call in &completed {
            let input = serde_json::from_str::<Value>(&call.arguments)
                .unwrap_or_else(|_| json!({ "raw": call.arguments }));
            broadcast(
                ctx,
                SessionEvent::ToolCall {
                    tool_call_id: call.id.clone(),
                    tool_name: call.name.clone(),
                    input,
                },
            )
            .await;
        }

        let mut results: Vec<(String, CommandResult)> = Vec::new();
        for call in &completed {
            let result = invoke_tool(ctx, call).await;
            broadcast(
                ctx,
                SessionEvent::ToolResult {
                    tool_call_id: call.id.clone(),
                    output: result.clone(),
                },
            )
            .await;
            results.push((call.id.clone(), result));
        }

        ctx.messages.push(ChatMessage::Assistant {
            content: text,
            tool_calls: completed,
        });
        for (tool_call_id, result) in results {
            let content = serde_json::to_string(&result).unwrap_or_else(|_| "{}".to_string());
            ctx.messages.push(ChatMessage::Tool {
                tool_call_id,
                content,
            });
        }
        commit(ctx).await;
    }

    Err("Max steps reached".to_string())
}

async fn invoke_tool(ctx: &TurnContext, call: &ToolCallRecord) -> CommandResult {
    if call.name != "execute_command" {
        return CommandResult::failure(format!("Unknown tool: {}", call.name));
    }
    let command = serde_json::from_str::<Value>(&call.arguments)
        .ok()
        .and_then(|v| v.get("command").and_then(|c| c.as_str()).map(String::from));
    match command {
        Some(command) => ctx.executor.execute(&command, &ctx.work_dir).await,
        None => CommandResult::failure("Invalid arguments"),
    }
}

async fn broadcast(ctx: &TurnContext, event: SessionEvent) {
    send(ctx, TurnUpdate::Broadcast(event)).await;
}

async fn send(ctx: &TurnContext, update: TurnUpdate) {
    // The session owns the inbox; if it is gone the turn's output has
    // nowhere to go and is dropped.
    let _ = ctx.inbox.send(SessionCommand::Turn(update)).await;
}

async fn commit(ctx: &TurnContext) {
    let (ack, done) = oneshot::channel();
    let update = TurnUpdate::Commit {
        messages: ctx.messages.clone(),
        ack,
    };
    if ctx
        .inbox
        .send(SessionCommand::Turn(update))
        .await
        .is_ok()
    {
        let _ = done.await;
    }
}
