//! The `AgentExecutor` contract: "send prompt, receive
//! JSON-bearing text" as an opaque black box subject to a timeout. The
//! orchestrator and every extractor depend only on this trait — the
//! concrete process-spawning implementation is swapped out entirely in
//! tests for a fixed-reply double, per the REDESIGN FLAGS guidance to
//! never thread a concrete executor through the call graph.

use std::process::Stdio;
use std::time::Duration;

use async_trait::async_trait;
use tokio::process::Command;

use crate::error::{Error, Result};

#[async_trait]
pub trait AgentExecutor: Send + Sync {
    /// Spawns `agent_name` with `prompt`, captures its complete standard
    /// output, and enforces `timeout`. Non-zero exit fails with the
    /// captured stderr text; expiry kills the process and fails with a
    /// timeout error.
    async fn run(&self, agent_name: &str, prompt: &str, timeout: Duration) -> Result<String>;
}

/// Spawns the named agent as a separate OS process, feeding `prompt` on
/// stdin and reading the complete stdout.
pub struct ProcessAgentExecutor {
    /// The executable invoked for every agent (e.g. a CLI wrapper that
    /// dispatches by `agent_name`).
    pub command: String,
}

impl ProcessAgentExecutor {
    pub fn new(command: impl Into<String>) -> Self {
        ProcessAgentExecutor { command: command.into() }
    }
}

#[async_trait]
impl AgentExecutor for ProcessAgentExecutor {
    async fn run(&self, agent_name: &str, prompt: &str, timeout: Duration) -> Result<String> {
        use tokio::io::AsyncWriteExt;

        let mut child = Command::new(&self.command)
            .arg("--agent")
            .arg(agent_name)
            .arg("--print")
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| Error::AgentFailed {
                agent: agent_name.to_string(),
                message: format!("spawn failed: {e}"),
            })?;

        if let Some(mut stdin) = child.stdin.take() {
            let _ = stdin.write_all(prompt.as_bytes()).await;
        }

        let run = async {
            let output = child.wait_with_output().await.map_err(|e| Error::AgentFailed {
                agent: agent_name.to_string(),
                message: format!("failed to read output: {e}"),
            })?;

            if !output.status.success() {
                let stderr = String::from_utf8_lossy(&output.stderr).into_owned();
                return Err(Error::AgentFailed {
                    agent: agent_name.to_string(),
                    message: stderr,
                });
            }

            Ok(String::from_utf8_lossy(&output.stdout).into_owned())
        };

        match tokio::time::timeout(timeout, run).await {
            Ok(result) => result,
            Err(_) => Err(Error::AgentTimeout {
                agent: agent_name.to_string(),
                timeout_secs: timeout.as_secs(),
            }),
        }
    }
}

/// A test double that returns a fixed reply (or fails), never spawning a
/// process. The orchestrator's dependency on `AgentExecutor` rather than
/// `ProcessAgentExecutor` is what makes this possible.
pub struct FixedReplyExecutor {
    pub reply: std::result::Result<String, String>,
}

impl FixedReplyExecutor {
    pub fn ok(reply: impl Into<String>) -> Self {
        FixedReplyExecutor { reply: Ok(reply.into()) }
    }

    pub fn err(message: impl Into<String>) -> Self {
        FixedReplyExecutor { reply: Err(message.into()) }
    }
}

#[async_trait]
impl AgentExecutor for FixedReplyExecutor {
    async fn run(&self, agent_name: &str, _prompt: &str, _timeout: Duration) -> Result<String> {
        self.reply.clone().map_err(|message| Error::AgentFailed {
            agent: agent_name.to_string(),
            message,
        })
    }
}
