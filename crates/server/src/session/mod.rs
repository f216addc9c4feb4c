//! Per-chat session actors.
//!
//! Each live chat is owned by exactly one spawned task. All mutations to
//! the conversation, subscriber set, and stream buffer happen inside that
//! task, so they are race-free by construction. The agent loop for a turn
//! runs in a separate task (`agent.rs`) and feeds events back through the
//! session inbox.

mod agent;
pub mod events;
pub mod registry;

use std::collections::VecDeque;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{mpsc, oneshot};
use tokio::time::{sleep_until, Instant};
use tracing::{info, warn};
use uuid::Uuid;

use parley_core::{Chat, ChatMessage};
use parley_store::{StoreError, StoreHandle};
use parley_tool_runtime::{CompletionProvider, ExecutorHandle};

use self::agent::{run_turn, TurnContext, TurnUpdate};
use self::events::{SessionEvent, Subscriber};
use self::registry::SessionMap;

/// Idle lifetime before a session shuts itself down and frees its work dir.
const IDLE_TIMEOUT: Duration = Duration::from_secs(30 * 60);

/// Title given to chats created without one; replaced by the first user
/// message.
pub const DEFAULT_TITLE: &str = "New Chat";
const TITLE_MAX_CHARS: usize = 50;

const SYSTEM_PROMPT: &str = "You are a helpful assistant with access to a sandboxed shell. \
    Your working directory is private to this conversation; uploaded files land there too. \
    Use the execute_command tool to inspect files or gather system information when it helps \
    answer the user. Only the whitelisted commands listed in the tool description are available. \
    Keep answers concise.";

pub enum SessionCommand {
    SendMessage {
        content: String,
        subscriber: Option<Subscriber>,
    },
    Subscribe {
        subscriber: Subscriber,
        ack: oneshot::Sender<()>,
    },
    Unsubscribe {
        id: Uuid,
    },
    AddFileContext {
        filename: String,
        ack: oneshot::Sender<Result<(), StoreError>>,
    },
    Snapshot {
        reply: oneshot::Sender<Chat>,
    },
    WorkDir {
        reply: oneshot::Sender<PathBuf>,
    },
    Shutdown,
    Turn(TurnUpdate),
}

/// Collaborators shared by every session.
#[derive(Clone)]
pub struct SessionDeps {
    pub store: StoreHandle,
    pub executor: ExecutorHandle,
    pub provider: Option<Arc<dyn CompletionProvider>>,
    pub work_root: PathBuf,
}

/// Cheap, cloneable address of a live session.
#[derive(Clone)]
pub struct SessionHandle {
    chat_id: String,
    generation: Uuid,
    tx: mpsc::Sender<SessionCommand>,
}

impl SessionHandle {
    pub fn chat_id(&self) -> &str {
        &self.chat_id
    }

    pub fn is_alive(&self) -> bool {
        !self.tx.is_closed()
    }

    /// Queue a user message. Returns as soon as the session accepts it;
    /// the turn itself runs asynchronously.
    pub async fn send_message(&self, content: String, subscriber: Option<Subscriber>) {
        let _ = self
            .tx
            .send(SessionCommand::SendMessage {
                content,
                subscriber,
            })
            .await;
    }

    /// Attach a subscriber. Completes after any in-progress turn's buffer
    /// has been replayed to it.
    pub async fn subscribe(&self, subscriber: Subscriber) {
        let (ack, done) = oneshot::channel();
        if self
            .tx
            .send(SessionCommand::Subscribe { subscriber, ack })
            .await
            .is_ok()
        {
            let _ = done.await;
        }
    }

    pub fn unsubscribe(&self, id: Uuid) {
        let _ = self.tx.try_send(SessionCommand::Unsubscribe { id });
    }

    /// Append a synthesized file-context message without starting a turn.
    pub async fn add_file_context(&self, filename: &str) -> Result<(), StoreError> {
        let (ack, done) = oneshot::channel();
        self.tx
            .send(SessionCommand::AddFileContext {
                filename: filename.to_string(),
                ack,
            })
            .await
            .map_err(|_| StoreError::Closed)?;
        done.await.map_err(|_| StoreError::Closed)?
    }

    /// Current in-memory chat state.
    pub async fn snapshot(&self) -> Option<Chat> {
        let (reply, rx) = oneshot::channel();
        self.tx.send(SessionCommand::Snapshot { reply }).await.ok()?;
        rx.await.ok()
    }

    pub async fn work_dir(&self) -> Option<PathBuf> {
        let (reply, rx) = oneshot::channel();
        self.tx.send(SessionCommand::WorkDir { reply }).await.ok()?;
        rx.await.ok()
    }

    /// Best-effort stop; the session cleans up its work dir on the way out.
    pub fn shutdown(&self) {
        let _ = self.tx.try_send(SessionCommand::Shutdown);
    }

    pub(crate) fn generation(&self) -> Uuid {
        self.generation
    }
}

struct Session {
    chat: Chat,
    work_dir: PathBuf,
    deps: SessionDeps,
    subscribers: Vec<Subscriber>,
    stream_buffer: Vec<SessionEvent>,
    streaming: bool,
    pending_turns: VecDeque<(String, Option<Subscriber>)>,
    inbox: mpsc::Sender<SessionCommand>,
}

impl Session {
    /// Spawn the actor for `chat`, creating its private work dir.
    pub fn spawn(
        chat: Chat,
        deps: SessionDeps,
        sessions: SessionMap,
    ) -> Result<SessionHandle, std::io::Error> {
        let generation = Uuid::new_v4();
        let suffix = &generation.simple().to_string()[..8];
        let work_dir = deps.work_root.join(format!("{}-{}", chat.id, suffix));
        std::fs::create_dir_all(&work_dir)?;

        let (tx, rx) = mpsc::channel(64);
        let handle = SessionHandle {
            chat_id: chat.id.clone(),
            generation,
            tx: tx.clone(),
        };

        info!(chat_id = %chat.id, work_dir = %work_dir.display(), "session started");

        let session = Session {
            chat,
            work_dir,
            deps,
            subscribers: Vec::new(),
            stream_buffer: Vec::new(),
            streaming: false,
            pending_turns: VecDeque::new(),
            inbox: tx,
        };
        tokio::spawn(session.run(rx, sessions, generation));

        Ok(handle)
    }

    async fn run(
        mut self,
        mut rx: mpsc::Receiver<SessionCommand>,
        sessions: SessionMap,
        generation: Uuid,
    ) {
        let mut deadline = Instant::now() + IDLE_TIMEOUT;
        loop {
            tokio::select! {
                cmd = rx.recv() => {
                    match cmd {
                        None | Some(SessionCommand::Shutdown) => break,
                        Some(cmd) => {
                            deadline = Instant::now() + IDLE_TIMEOUT;
                            self.handle(cmd).await;
                        }
                    }
                }
                _ = sleep_until(deadline) => {
                    if self.streaming {
                        // A turn is in flight; its updates will push the
                        // deadline forward again.
                        deadline = Instant::now() + IDLE_TIMEOUT;
                    } else {
                        info!(chat_id = %self.chat.id, "session idle, shutting down");
                        break;
                    }
                }
            }
        }
        self.terminate(sessions, generation).await;
    }

    async fn handle(&mut self, cmd: SessionCommand) {
        match cmd {
            SessionCommand::SendMessage {
                content,
                subscriber,
            } => {
                if self.streaming {
                    // Serialize turns: the next one starts when the
                    // current one finishes.
                    self.pending_turns.push_back((content, subscriber));
                } else {
                    self.begin_turn(content, subscriber).await;
                }
            }
            SessionCommand::Subscribe { subscriber, ack } => {
                if self.streaming {
                    for event in &self.stream_buffer {
                        subscriber.send(event);
                    }
                }
                self.subscribers.push(subscriber);
                let _ = ack.send(());
            }
            SessionCommand::Unsubscribe { id } => {
                self.subscribers.retain(|s| s.id != id);
            }
            SessionCommand::AddFileContext { filename, ack } => {
                let content = format!(
                    "[File uploaded to working directory: {filename}] - You can use \
                     commands like `cat`, `head`, or `ls` to inspect it."
                );
                self.chat.messages.push(ChatMessage::user(content));
                let result = self
                    .deps
                    .store
                    .save_messages(&self.chat.id, self.chat.messages.clone())
                    .await;
                let _ = ack.send(result);
            }
            SessionCommand::Snapshot { reply } => {
                let _ = reply.send(self.chat.clone());
            }
            SessionCommand::WorkDir { reply } => {
                let _ = reply.send(self.work_dir.clone());
            }
            SessionCommand::Turn(update) => self.handle_turn_update(update).await,
            SessionCommand::Shutdown => unreachable!("handled in run()"),
        }
    }

    async fn begin_turn(&mut self, content: String, subscriber: Option<Subscriber>) {
        if let Some(subscriber) = subscriber {
            self.subscribers.push(subscriber);
        }

        if self.chat.title == DEFAULT_TITLE && self.chat.messages.is_empty() {
            let title: String = content.chars().take(TITLE_MAX_CHARS).collect();
            self.chat.title = title.clone();
            if let Err(e) = self.deps.store.update_title(&self.chat.id, &title).await {
                warn!(chat_id = %self.chat.id, error = %e, "failed to persist title");
            }
        }

        self.chat.messages.push(ChatMessage::user(content.clone()));
        if let Err(e) = self
            .deps
            .store
            .save_messages(&self.chat.id, self.chat.messages.clone())
            .await
        {
            warn!(chat_id = %self.chat.id, error = %e, "failed to persist user message");
        }

        self.streaming = true;
        self.stream_buffer.clear();
        self.broadcast(SessionEvent::UserMessage { content });

        let turn = TurnContext {
            chat_id: self.chat.id.clone(),
            messages: self.chat.messages.clone(),
            work_dir: self.work_dir.clone(),
            provider: self.deps.provider.clone(),
            executor: self.deps.executor.clone(),
            system_prompt: SYSTEM_PROMPT.to_string(),
            inbox: self.inbox.clone(),
        };
        tokio::spawn(run_turn(turn));
    }

    async fn handle_turn_update(&mut self, update: TurnUpdate) {
        match update {
            TurnUpdate::Broadcast(event) => self.broadcast(event),
            TurnUpdate::Commit { messages, ack } => {
                self.chat.messages = messages;
                if let Err(e) = self
                    .deps
                    .store
                    .save_messages(&self.chat.id, self.chat.messages.clone())
                    .await
                {
                    warn!(chat_id = %self.chat.id, error = %e, "failed to persist turn step");
                }
                let _ = ack.send(());
            }
            TurnUpdate::Finished => {
                self.broadcast(SessionEvent::Done);
                self.streaming = false;
                if let Some((content, subscriber)) = self.pending_turns.pop_front() {
                    self.begin_turn(content, subscriber).await;
                }
            }
        }
    }

    /// Buffer first, then fan out. Dead subscribers are pruned here.
    fn broadcast(&mut self, event: SessionEvent) {
        self.stream_buffer.push(event.clone());
        self.subscribers.retain(|s| s.send(&event));
    }

    async fn terminate(self, sessions: SessionMap, generation: Uuid) {
        if let Err(e) = tokio::fs::remove_dir_all(&self.work_dir).await {
            warn!(chat_id = %self.chat.id, error = %e, "failed to remove work dir");
        }
        let mut sessions = sessions.lock().await;
        if let Some(current) = sessions.get(&self.chat.id) {
            // Only deregister ourselves, never a successor session.
            if current.generation() == generation {
                sessions.remove(&self.chat.id);
            }
        }
        info!(chat_id = %self.chat.id, "session terminated");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use std::pin::Pin;

    use async_trait::async_trait;
    use futures::stream::{self, Stream};
    use tokio::sync::{mpsc, Mutex, Notify};

    use parley_core::ToolCallRecord;
    use parley_tool_runtime::provider::mock::MockProvider;
    use parley_tool_runtime::provider::{EventStream, LlmError};
    use parley_tool_runtime::stream::StreamEvent;
    use parley_tool_runtime::tool::ToolDefinition;

    struct Harness {
        handle: SessionHandle,
        store: StoreHandle,
        _tmp: tempfile::TempDir,
    }

    async fn spawn_session(provider: Arc<dyn CompletionProvider>, title: &str) -> Harness {
        let tmp = tempfile::tempdir().unwrap();
        let store = StoreHandle::spawn(tmp.path().join("chats.json")).unwrap();
        let deps = SessionDeps {
            store: store.clone(),
            executor: ExecutorHandle::spawn(),
            provider: Some(provider),
            work_root: tmp.path().join("work"),
        };
        // Seed the store so persistence ops have a record to hit.
        let chat = store.create("chat0000chat0000", title).await.unwrap();
        let sessions: SessionMap = Arc::new(Mutex::new(HashMap::new()));
        let handle = Session::spawn(chat, deps, sessions).unwrap();
        Harness {
            handle,
            store,
            _tmp: tmp,
        }
    }

    fn attach(handle: &SessionHandle) -> (Subscriber, mpsc::Receiver<SessionEvent>) {
        let (tx, rx) = mpsc::channel(256);
        (Subscriber::new(tx), rx)
    }

    /// Read events until (and including) `Done`.
    async fn collect_turn(rx: &mut mpsc::Receiver<SessionEvent>) -> Vec<SessionEvent> {
        let mut events = Vec::new();
        loop {
            let event = tokio::time::timeout(Duration::from_secs(5), rx.recv())
                .await
                .expect("turn did not finish")
                .expect("subscriber channel closed");
            let done = matches!(event, SessionEvent::Done);
            events.push(event);
            if done {
                return events;
            }
        }
    }

    #[tokio::test]
    async fn test_plain_text_turn() {
        let provider = Arc::new(MockProvider::new());
        provider.queue_text("hi");
        let h = spawn_session(provider, DEFAULT_TITLE).await;

        let (sub, mut rx) = attach(&h.handle);
        h.handle.send_message("hello".into(), Some(sub)).await;

        let events = collect_turn(&mut rx).await;
        assert!(matches!(&events[0], SessionEvent::UserMessage { content } if content == "hello"));
        assert!(matches!(&events[1], SessionEvent::TextDelta { text } if text == "hi"));
        assert!(matches!(&events[2], SessionEvent::Done));
        assert_eq!(events.len(), 3);

        let chat = h.handle.snapshot().await.unwrap();
        assert_eq!(chat.title, "hello");
        assert_eq!(chat.messages.len(), 2);
        assert!(matches!(&chat.messages[1], ChatMessage::Assistant { content, .. } if content == "hi"));

        // persisted state agrees with the session
        let stored = h.store.get("chat0000chat0000").await.unwrap().unwrap();
        assert_eq!(stored.messages.len(), 2);
        assert_eq!(stored.title, "hello");
    }

    #[tokio::test]
    async fn test_title_truncated_to_fifty_chars() {
        let provider = Arc::new(MockProvider::new());
        provider.queue_text("ok");
        let h = spawn_session(provider, DEFAULT_TITLE).await;

        let long = "x".repeat(80);
        let (sub, mut rx) = attach(&h.handle);
        h.handle.send_message(long, Some(sub)).await;
        collect_turn(&mut rx).await;

        let chat = h.handle.snapshot().await.unwrap();
        assert_eq!(chat.title.chars().count(), 50);
    }

    #[tokio::test]
    async fn test_tool_call_turn() {
        let provider = Arc::new(MockProvider::new());
        provider.queue_tool_call("t1", "execute_command", "{\"command\":\"echo a\"}");
        provider.queue_text("done: a");
        let h = spawn_session(provider, "files").await;

        let (sub, mut rx) = attach(&h.handle);
        h.handle.send_message("list".into(), Some(sub)).await;
        let events = collect_turn(&mut rx).await;

        assert!(matches!(&events[0], SessionEvent::UserMessage { .. }));
        match &events[1] {
            SessionEvent::ToolCall {
                tool_call_id,
                tool_name,
                input,
            } => {
                assert_eq!(tool_call_id, "t1");
                assert_eq!(tool_name, "execute_command");
                assert_eq!(input["command"], "echo a");
            }
            other => panic!("expected tool-call, got {:?}", other),
        }
        match &events[2] {
            SessionEvent::ToolResult {
                tool_call_id,
                output,
            } => {
                assert_eq!(tool_call_id, "t1");
                assert!(output.success);
                assert_eq!(output.stdout.as_deref(), Some("a\n"));
            }
            other => panic!("expected tool-result, got {:?}", other),
        }
        assert!(matches!(&events[3], SessionEvent::TextDelta { text } if text == "done: a"));
        assert!(matches!(&events[4], SessionEvent::Done));

        // Persisted tail: assistant-with-calls, tool, final assistant.
        let chat = h.handle.snapshot().await.unwrap();
        let n = chat.messages.len();
        assert!(matches!(
            &chat.messages[n - 3],
            ChatMessage::Assistant { content, tool_calls }
                if content.is_empty() && tool_calls.len() == 1
        ));
        match &chat.messages[n - 2] {
            ChatMessage::Tool {
                tool_call_id,
                content,
            } => {
                assert_eq!(tool_call_id, "t1");
                let result: serde_json::Value = serde_json::from_str(content).unwrap();
                assert_eq!(result["success"], true);
            }
            other => panic!("expected tool message, got {:?}", other),
        }
        assert!(matches!(
            &chat.messages[n - 1],
            ChatMessage::Assistant { content, .. } if content == "done: a"
        ));
    }

    #[tokio::test]
    async fn test_disallowed_command_stays_in_band() {
        let provider = Arc::new(MockProvider::new());
        provider.queue_tool_call("t1", "execute_command", "{\"command\":\"rm -rf /\"}");
        provider.queue_text("refused");
        let h = spawn_session(provider, "danger").await;

        let (sub, mut rx) = attach(&h.handle);
        h.handle.send_message("clean up".into(), Some(sub)).await;
        let events = collect_turn(&mut rx).await;

        let result = events
            .iter()
            .find_map(|e| match e {
                SessionEvent::ToolResult { output, .. } => Some(output.clone()),
                _ => None,
            })
            .expect("missing tool-result");
        assert!(!result.success);
        assert!(result
            .error
            .unwrap()
            .starts_with("Command 'rm' is not allowed"));

        // The loop carried on to the follow-up completion.
        assert!(events
            .iter()
            .any(|e| matches!(e, SessionEvent::TextDelta { text } if text == "refused")));
    }

    #[tokio::test]
    async fn test_invalid_tool_arguments() {
        let provider = Arc::new(MockProvider::new());
        provider.queue_events(vec![StreamEvent::ToolCallStart {
            index: 0,
            id: "t1".into(),
            name: "execute_command".into(),
            arguments: "not json".into(),
        }]);
        provider.queue_text("sorry");
        let h = spawn_session(provider, "bad args").await;

        let (sub, mut rx) = attach(&h.handle);
        h.handle.send_message("go".into(), Some(sub)).await;
        let events = collect_turn(&mut rx).await;

        match events
            .iter()
            .find(|e| matches!(e, SessionEvent::ToolCall { .. }))
            .unwrap()
        {
            SessionEvent::ToolCall { input, .. } => {
                assert_eq!(input["raw"], "not json");
            }
            _ => unreachable!(),
        }
        let result = events
            .iter()
            .find_map(|e| match e {
                SessionEvent::ToolResult { output, .. } => Some(output.clone()),
                _ => None,
            })
            .unwrap();
        assert_eq!(result.error.as_deref(), Some("Invalid arguments"));
    }

    #[tokio::test]
    async fn test_step_limit() {
        let provider = Arc::new(MockProvider::new());
        for i in 0..10 {
            provider.queue_tool_call(
                &format!("t{i}"),
                "execute_command",
                "{\"command\":\"echo loop\"}",
            );
        }
        let h = spawn_session(provider, "looping").await;

        let (sub, mut rx) = attach(&h.handle);
        h.handle.send_message("go".into(), Some(sub)).await;
        let events = collect_turn(&mut rx).await;

        let errors: Vec<_> = events
            .iter()
            .filter_map(|e| match e {
                SessionEvent::Error { message } => Some(message.clone()),
                _ => None,
            })
            .collect();
        assert_eq!(errors, vec!["Max steps reached".to_string()]);

        // Session survives and can run another turn.
        let provider_events = events
            .iter()
            .filter(|e| matches!(e, SessionEvent::ToolResult { .. }))
            .count();
        assert_eq!(provider_events, 10);
        assert!(h.handle.is_alive());
    }

    #[tokio::test]
    async fn test_provider_error_keeps_user_message() {
        let provider = Arc::new(MockProvider::new());
        provider.queue_error(LlmError::NetworkError("connection refused".into()));
        let h = spawn_session(provider, "flaky").await;

        let (sub, mut rx) = attach(&h.handle);
        h.handle.send_message("hello".into(), Some(sub)).await;
        let events = collect_turn(&mut rx).await;

        assert!(events
            .iter()
            .any(|e| matches!(e, SessionEvent::Error { message } if message.contains("connection refused"))));

        // user message kept, no assistant message appended
        let chat = h.handle.snapshot().await.unwrap();
        assert_eq!(chat.messages.len(), 1);
        assert!(matches!(&chat.messages[0], ChatMessage::User { .. }));
    }

    #[tokio::test]
    async fn test_concurrent_sends_serialize() {
        let provider = Arc::new(MockProvider::new());
        provider.queue_text("one");
        provider.queue_text("two");
        let h = spawn_session(provider, "busy").await;

        let (sub, mut rx) = attach(&h.handle);
        h.handle.subscribe(sub).await;
        h.handle.send_message("first".into(), None).await;
        h.handle.send_message("second".into(), None).await;

        let turn1 = collect_turn(&mut rx).await;
        let turn2 = collect_turn(&mut rx).await;

        assert!(matches!(&turn1[0], SessionEvent::UserMessage { content } if content == "first"));
        assert!(matches!(&turn1[1], SessionEvent::TextDelta { text } if text == "one"));
        assert!(matches!(&turn2[0], SessionEvent::UserMessage { content } if content == "second"));
        assert!(matches!(&turn2[1], SessionEvent::TextDelta { text } if text == "two"));
    }

    #[tokio::test]
    async fn test_add_file_context_does_not_start_turn() {
        let provider = Arc::new(MockProvider::new());
        let h = spawn_session(provider, "uploads").await;

        h.handle.add_file_context("report.csv").await.unwrap();

        let chat = h.handle.snapshot().await.unwrap();
        assert_eq!(chat.messages.len(), 1);
        match &chat.messages[0] {
            ChatMessage::User { content } => {
                assert!(content.starts_with("[File uploaded to working directory: report.csv]"));
                assert!(content.contains("`cat`"));
            }
            other => panic!("expected user message, got {:?}", other),
        }

        let stored = h.store.get("chat0000chat0000").await.unwrap().unwrap();
        assert_eq!(stored.messages.len(), 1);
    }

    #[tokio::test]
    async fn test_shutdown_removes_work_dir() {
        let provider = Arc::new(MockProvider::new());
        let h = spawn_session(provider, "temp").await;

        let work_dir = h.handle.work_dir().await.unwrap();
        assert!(work_dir.exists());

        h.handle.shutdown();
        for _ in 0..50 {
            if !work_dir.exists() && !h.handle.is_alive() {
                break;
            }
            tokio::time::sleep(Duration::from_millis(20)).await;
        }
        assert!(!work_dir.exists());
        assert!(!h.handle.is_alive());
    }

    /// Provider whose stream emits one delta, then stalls until released.
    /// Lets tests attach subscribers mid-turn deterministically.
    struct GatedProvider {
        release: Arc<Notify>,
    }

    #[async_trait]
    impl CompletionProvider for GatedProvider {
        async fn stream_completion(
            &self,
            _messages: Vec<ChatMessage>,
            _system_prompt: Option<String>,
            _tools: Vec<ToolDefinition>,
        ) -> Result<EventStream, LlmError> {
            let release = self.release.clone();
            let events: Pin<Box<dyn Stream<Item = Result<StreamEvent, LlmError>> + Send>> =
                Box::pin(stream::unfold(0u8, move |step| {
                    let release = release.clone();
                    async move {
                        match step {
                            0 => Some((
                                Ok(StreamEvent::TextDelta {
                                    text: "partial".into(),
                                }),
                                1,
                            )),
                            1 => {
                                release.notified().await;
                                None
                            }
                            _ => None,
                        }
                    }
                }));
            Ok(events)
        }

        fn provider_name(&self) -> &str {
            "gated"
        }
    }

    #[tokio::test]
    async fn test_mid_turn_subscriber_gets_buffered_replay() {
        let release = Arc::new(Notify::new());
        let provider = Arc::new(GatedProvider {
            release: release.clone(),
        });
        let h = spawn_session(provider, "replay").await;

        let (sub_a, mut rx_a) = attach(&h.handle);
        h.handle.send_message("hello".into(), Some(sub_a)).await;

        // Wait for the first two events so the buffer is non-empty.
        let first = rx_a.recv().await.unwrap();
        assert!(matches!(first, SessionEvent::UserMessage { .. }));
        let second = rx_a.recv().await.unwrap();
        assert!(matches!(second, SessionEvent::TextDelta { .. }));

        // Late subscriber: replay must precede live events.
        let (sub_b, mut rx_b) = attach(&h.handle);
        h.handle.subscribe(sub_b).await;

        release.notify_one();

        let replayed = collect_turn(&mut rx_b).await;
        assert!(matches!(&replayed[0], SessionEvent::UserMessage { content } if content == "hello"));
        assert!(matches!(&replayed[1], SessionEvent::TextDelta { text } if text == "partial"));
        assert!(matches!(replayed.last(), Some(SessionEvent::Done)));

        let live = collect_turn(&mut rx_a).await;
        assert!(matches!(live.last(), Some(SessionEvent::Done)));
    }

    #[tokio::test]
    async fn test_idle_subscriber_gets_no_replay() {
        let provider = Arc::new(MockProvider::new());
        provider.queue_text("hi");
        let h = spawn_session(provider, "quiet").await;

        let (sub_a, mut rx_a) = attach(&h.handle);
        h.handle.send_message("hello".into(), Some(sub_a)).await;
        collect_turn(&mut rx_a).await;

        // Attaching between turns replays nothing.
        let (sub_b, mut rx_b) = attach(&h.handle);
        h.handle.subscribe(sub_b).await;
        assert!(rx_b.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_unsubscribed_client_stops_receiving() {
        let provider = Arc::new(MockProvider::new());
        provider.queue_text("hi");
        let h = spawn_session(provider, "leaving").await;

        let (sub, mut rx) = attach(&h.handle);
        let sub_id = sub.id;
        h.handle.subscribe(sub).await;
        h.handle.unsubscribe(sub_id);
        // Unsubscribe is processed before the send below (same inbox).
        h.handle.send_message("hello".into(), None).await;

        // Give the turn time to complete, then confirm silence.
        tokio::time::sleep(Duration::from_millis(200)).await;
        assert!(rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_unknown_tool_reported() {
        let provider = Arc::new(MockProvider::new());
        provider.queue_tool_call("t1", "launch_missiles", "{}");
        provider.queue_text("no such tool");
        let h = spawn_session(provider, "unknown").await;

        let (sub, mut rx) = attach(&h.handle);
        h.handle.send_message("go".into(), Some(sub)).await;
        let events = collect_turn(&mut rx).await;

        let result = events
            .iter()
            .find_map(|e| match e {
                SessionEvent::ToolResult { output, .. } => Some(output.clone()),
                _ => None,
            })
            .unwrap();
        assert!(!result.success);
        assert_eq!(result.error.as_deref(), Some("Unknown tool: launch_missiles"));
    }

    #[tokio::test]
    async fn test_split_argument_deltas_reassemble() {
        let provider = Arc::new(MockProvider::new());
        provider.queue_events(vec![
            StreamEvent::ToolCallStart {
                index: 0,
                id: "t1".into(),
                name: "execute_command".into(),
                arguments: String::new(),
            },
            StreamEvent::ToolCallDelta {
                index: 0,
                arguments_delta: "{\"comm".into(),
            },
            StreamEvent::ToolCallDelta {
                index: 0,
                arguments_delta: "and\":\"echo split\"}".into(),
            },
        ]);
        provider.queue_text("ok");
        let h = spawn_session(provider, "split").await;

        let (sub, mut rx) = attach(&h.handle);
        h.handle.send_message("go".into(), Some(sub)).await;
        let events = collect_turn(&mut rx).await;

        let result = events
            .iter()
            .find_map(|e| match e {
                SessionEvent::ToolResult { output, .. } => Some(output.clone()),
                _ => None,
            })
            .unwrap();
        assert!(result.success);
        assert_eq!(result.stdout.as_deref(), Some("split\n"));

        // The record keeps the reassembled raw argument string.
        let chat = h.handle.snapshot().await.unwrap();
        let record: Option<ToolCallRecord> = chat.messages.iter().find_map(|m| match m {
            ChatMessage::Assistant { tool_calls, .. } if !tool_calls.is_empty() => {
                Some(tool_calls[0].clone())
            }
            _ => None,
        });
        assert_eq!(record.unwrap().arguments, "{\"command\":\"echo split\"}");
    }
}
