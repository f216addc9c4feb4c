//! Guarded shell command execution.
//!
//! Commands run via `sh -c` inside a session's working directory, but only
//! when the base command is on the compile-time whitelist. The executor is
//! a shared serializing actor: exactly one command runs at a time across
//! all sessions, which bounds host load.

use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tokio::process::Command;
use tokio::sync::{mpsc, oneshot};
use tracing::{debug, warn};

/// Base commands the model is allowed to run.
pub const ALLOWED_COMMANDS: &[&str] = &[
    "ls", "pwd", "whoami", "cat", "id", "uname", "hostname", "date", "uptime", "dig", "curl",
    "head", "tail", "wc", "grep", "echo", "env", "pandoc", "mkdir", "mktemp",
];

const COMMAND_TIMEOUT: Duration = Duration::from_secs(30);

/// Structured outcome of a command execution. Serialized verbatim into
/// tool messages and `tool-result` events.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CommandResult {
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub stdout: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub stderr: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl CommandResult {
    pub fn failure(error: impl Into<String>) -> Self {
        Self {
            success: false,
            stdout: None,
            stderr: None,
            error: Some(error.into()),
        }
    }
}

struct ExecJob {
    command: String,
    work_dir: PathBuf,
    reply: oneshot::Sender<CommandResult>,
}

/// Cloneable handle to the executor actor.
#[derive(Clone)]
pub struct ExecutorHandle {
    tx: mpsc::Sender<ExecJob>,
}

impl ExecutorHandle {
    /// Spawn the executor with the standard 30-second command timeout.
    pub fn spawn() -> Self {
        Self::spawn_with_timeout(COMMAND_TIMEOUT)
    }

    /// Spawn with a custom timeout (tests).
    pub fn spawn_with_timeout(timeout: Duration) -> Self {
        let (tx, mut rx) = mpsc::channel::<ExecJob>(32);
        tokio::spawn(async move {
            while let Some(job) = rx.recv().await {
                let result = run_command(&job.command, &job.work_dir, timeout).await;
                let _ = job.reply.send(result);
            }
        });
        Self { tx }
    }

    /// Run a command. Never fails at the transport level: executor
    /// unavailability is reported inside the result.
    pub async fn execute(&self, command: &str, work_dir: &Path) -> CommandResult {
        let (reply, rx) = oneshot::channel();
        let job = ExecJob {
            command: command.to_string(),
            work_dir: work_dir.to_path_buf(),
            reply,
        };
        if self.tx.send(job).await.is_err() {
            return CommandResult::failure("executor unavailable");
        }
        rx.await
            .unwrap_or_else(|_| CommandResult::failure("executor unavailable"))
    }
}

fn not_allowed(base: &str) -> String {
    format!(
        "Command '{}' is not allowed. Allowed: {}",
        base,
        ALLOWED_COMMANDS.join(", ")
    )
}

fn timed_out(timeout: Duration) -> String {
    format!("Command timed out after {} seconds", timeout.as_secs())
}

async fn run_command(command: &str, work_dir: &Path, timeout: Duration) -> CommandResult {
    let trimmed = command.trim();
    let base = trimmed.split_whitespace().next().unwrap_or("");
    if !ALLOWED_COMMANDS.contains(&base) {
        return CommandResult::failure(not_allowed(base));
    }

    debug!(command = trimmed, work_dir = %work_dir.display(), "executing command");

    let mut cmd = Command::new("sh");
    cmd.arg("-c")
        .arg(trimmed)
        .current_dir(work_dir)
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true);
    #[cfg(unix)]
    cmd.process_group(0);

    let child = match cmd.spawn() {
        Ok(child) => child,
        Err(e) => return CommandResult::failure(format!("failed to spawn shell: {e}")),
    };

    let output = match tokio::time::timeout(timeout, child.wait_with_output()).await {
        Ok(Ok(output)) => output,
        Ok(Err(e)) => return CommandResult::failure(format!("command execution error: {e}")),
        Err(_) => {
            // Dropping the wait future kills the child (kill_on_drop).
            warn!(command = trimmed, "command timed out");
            return CommandResult::failure(timed_out(timeout));
        }
    };

    let stdout = String::from_utf8_lossy(&output.stdout).to_string();
    let stderr = String::from_utf8_lossy(&output.stderr).to_string();

    if output.status.success() {
        CommandResult {
            success: true,
            stdout: Some(stdout),
            stderr: if stderr.is_empty() { None } else { Some(stderr) },
            error: None,
        }
    } else {
        let code = output.status.code().unwrap_or(-1);
        debug!(exit_code = code, "command returned non-zero exit code");
        CommandResult {
            success: false,
            stdout: Some(stdout),
            stderr: if stderr.is_empty() { None } else { Some(stderr) },
            error: Some(format!("Exit code: {code}")),
        }
    }
}
