//! Agent runtime backed by the `claude` CLI
//!
//! Runs the agent as a subprocess, streaming stdout lines as text events.
//! This adapter is advisory-stream only: the CLI executes no local tools,
//! so runs driven through it produce text output and never emit tool or
//! model requests. Interactive runtimes implement the full request/reply
//! event contract.

use crate::agent::{AgentEvent, AgentRuntime, EVENT_CHANNEL_CAPACITY};
use crate::config::AgentConfig;
use crate::error::{AutopilotError, Result};
use async_trait::async_trait;
use std::process::Stdio;
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::process::Command;
use tokio::sync::mpsc;
use tracing::{debug, warn};

const EXECUTOR_AGENT_NAME: &str = "strategy_executor";

/// Configuration for the CLI agent runtime
#[derive(Debug, Clone)]
pub struct CliRuntimeConfig {
    /// Path to the CLI executable
    pub cli_path: String,
    /// Timeout for one full run
    pub timeout: Duration,
    /// Model override passed to the CLI
    pub model: Option<String>,
}

impl Default for CliRuntimeConfig {
    fn default() -> Self {
        Self {
            cli_path: "claude".to_string(),
            timeout: Duration::from_secs(180),
            model: None,
        }
    }
}

impl From<&AgentConfig> for CliRuntimeConfig {
    fn from(config: &AgentConfig) -> Self {
        Self {
            cli_path: config.cli_path.clone(),
            timeout: Duration::from_secs(config.timeout_secs),
            model: config.model.clone(),
        }
    }
}

/// Subprocess agent runtime
pub struct CliAgentRuntime {
    config: CliRuntimeConfig,
}

impl CliAgentRuntime {
    pub fn new(config: CliRuntimeConfig) -> Self {
        Self { config }
    }

    /// Check if the CLI is available
    pub async fn check_availability(&self) -> Result<bool> {
        let output = Command::new(&self.config.cli_path)
            .arg("--version")
            .output()
            .await;

        match output {
            Ok(out) if out.status.success() => {
                let version = String::from_utf8_lossy(&out.stdout);
                debug!("Agent CLI available: {}", version.trim());
                Ok(true)
            }
            Ok(_) => {
                warn!("Agent CLI returned error status");
                Ok(false)
            }
            Err(e) => {
                warn!("Agent CLI not found at '{}': {}", self.config.cli_path, e);
                Ok(false)
            }
        }
    }
}

#[async_trait]
impl AgentRuntime for CliAgentRuntime {
    async fn run(
        &self,
        user_id: &str,
        session_id: &str,
        prompt: &str,
    ) -> Result<mpsc::Receiver<AgentEvent>> {
        let (tx, rx) = mpsc::channel(EVENT_CHANNEL_CAPACITY);

        let mut cmd = Command::new(&self.config.cli_path);
        cmd.arg("--print")
            .arg("--output-format")
            .arg("text")
            .arg("--session-id")
            .arg(session_id)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        if let Some(ref model) = self.config.model {
            cmd.arg("--model").arg(model);
        }

        debug!(
            "Spawning agent process for user {} session {}",
            user_id, session_id
        );
        let mut child = cmd
            .spawn()
            .map_err(|e| AutopilotError::AgentRun(format!("failed to spawn agent CLI: {e}")))?;

        let mut stdin = child
            .stdin
            .take()
            .ok_or_else(|| AutopilotError::AgentRun("agent CLI stdin unavailable".to_string()))?;
        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| AutopilotError::AgentRun("agent CLI stdout unavailable".to_string()))?;

        let prompt = prompt.to_string();
        let timeout = self.config.timeout;

        tokio::spawn(async move {
            let _ = tx
                .send(AgentEvent::AgentStarted {
                    name: EXECUTOR_AGENT_NAME.to_string(),
                })
                .await;

            let drive = async {
                stdin
                    .write_all(prompt.as_bytes())
                    .await
                    .map_err(|e| format!("failed to write prompt: {e}"))?;
                drop(stdin);

                let mut lines = BufReader::new(stdout).lines();
                while let Ok(Some(line)) = lines.next_line().await {
                    if tx.send(AgentEvent::Text(line + "\n")).await.is_err() {
                        // Consumer went away; stop streaming.
                        break;
                    }
                }

                let status = child
                    .wait()
                    .await
                    .map_err(|e| format!("failed to wait for agent CLI: {e}"))?;
                if !status.success() {
                    return Err(format!("agent CLI exited with {status}"));
                }
                Ok::<(), String>(())
            };

            match tokio::time::timeout(timeout, drive).await {
                Ok(Ok(())) => {
                    let _ = tx
                        .send(AgentEvent::AgentFinished {
                            name: EXECUTOR_AGENT_NAME.to_string(),
                        })
                        .await;
                }
                Ok(Err(e)) => {
                    let _ = tx.send(AgentEvent::Error(e)).await;
                }
                Err(_) => {
                    let _ = tx
                        .send(AgentEvent::Error(format!(
                            "agent run timed out after {}s",
                            timeout.as_secs()
                        )))
                        .await;
                }
            }
            // Dropping tx closes the channel: the completion signal.
        });

        Ok(rx)
    }
}
