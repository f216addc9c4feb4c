//! Subscriber-facing session events.

use serde::Serialize;
use serde_json::Value;
use tokio::sync::mpsc;
use uuid::Uuid;

use parley_tool_runtime::CommandResult;

/// One event in a chat's outbound stream. Serialized into SSE `data:`
/// frames exactly as derived here, except `Done`, which the SSE layer
/// renders as the `[DONE]` sentinel.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type", rename_all = "kebab-case")]
pub enum SessionEvent {
    /// Handshake frame, sent once per subscribe connection.
    Connected,
    UserMessage {
        content: String,
    },
    TextDelta {
        text: String,
    },
    #[serde(rename_all = "camelCase")]
    ToolCall {
        tool_call_id: String,
        tool_name: String,
        input: Value,
    },
    #[serde(rename_all = "camelCase")]
    ToolResult {
        tool_call_id: String,
        output: CommandResult,
    },
    Error {
        message: String,
    },
    /// Turn framing: every turn ends with exactly one of these.
    Done,
}

pub type EventSender = mpsc::Sender<SessionEvent>;

/// A subscriber's delivery handle. Delivery is best-effort and never
/// blocks the session.
#[derive(Debug, Clone)]
pub struct Subscriber {
    pub id: Uuid,
    pub tx: EventSender,
}

impl Subscriber {
    pub fn new(tx: EventSender) -> Self {
        Self {
            id: Uuid::new_v4(),
            tx,
        }
    }

    /// Try to deliver an event. Returns `false` once the receiving side
    /// is gone, which is the liveness signal that prunes the subscriber.
    /// A full queue only drops this event.
    pub fn send(&self, event: &SessionEvent) -> bool {
        match self.tx.try_send(event.clone()) {
            Ok(()) => true,
            Err(mpsc::error::TrySendError::Full(_)) => true,
            Err(mpsc::error::TrySendError::Closed(_)) => false,
        }
    }
}
