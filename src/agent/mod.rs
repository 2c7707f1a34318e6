//! Agent runtime interface
//!
//! The agent runtime is an external collaborator: given an owner, a session
//! id, and a prompt it produces a sequence of events. The orchestrator
//! drains the bounded channel to completion; channel close is the
//! completion signal, [`AgentEvent::Error`] carries a terminal failure.
//!
//! Model-call and tool-call events are requests: they carry a one-shot
//! reply the run loop answers after dispatching the hook pipeline, which is
//! how the confirmation gate replaces a tool's execution and the cache
//! manager adjusts an outgoing model call.

pub mod cli_runtime;
pub mod prompt;

pub use cli_runtime::{CliAgentRuntime, CliRuntimeConfig};

use crate::error::Result;
use async_trait::async_trait;
use tokio::sync::{mpsc, oneshot};

/// Buffer size for the per-run event channel. Bounded so a slow consumer
/// backpressures the runtime instead of buffering without limit.
pub const EVENT_CHANNEL_CAPACITY: usize = 64;

/// One tool invocation the runtime wants to perform
#[derive(Debug, Clone, PartialEq)]
pub struct ToolCall {
    pub id: String,
    pub name: String,
    pub args: serde_json::Value,
}

/// Answer to an [`AgentEvent::ToolRequest`]
#[derive(Debug, Clone, PartialEq)]
pub enum ToolDisposition {
    /// Execute the tool as requested
    Proceed,
    /// Do not execute; this value replaces the tool's result
    Block(serde_json::Value),
}

/// Configuration of an outgoing model call, adjustable by hooks before the
/// runtime issues it
#[derive(Debug, Clone, PartialEq)]
pub struct ModelCallConfig {
    pub model: String,
    pub system_instruction: String,
    /// Remote cached-content handle to reference instead of resending text
    pub cached_content: Option<String>,
}

/// Events produced by one agent run
pub enum AgentEvent {
    AgentStarted {
        name: String,
    },
    AgentFinished {
        name: String,
    },
    /// Streamed output text
    Text(String),
    /// The runtime is about to issue a model call; the (possibly adjusted)
    /// config must be sent back before it proceeds.
    ModelRequest {
        config: ModelCallConfig,
        respond_to: oneshot::Sender<ModelCallConfig>,
    },
    ModelFinished,
    /// The runtime wants to execute a tool; the disposition must be sent
    /// back before any side effect occurs.
    ToolRequest {
        call: ToolCall,
        respond_to: oneshot::Sender<ToolDisposition>,
    },
    /// Tool execution finished (or was replaced by a blocked result)
    ToolFinished {
        call: ToolCall,
        result: serde_json::Value,
    },
    /// Terminal failure; no further events follow
    Error(String),
}

impl std::fmt::Debug for AgentEvent {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            AgentEvent::AgentStarted { name } => write!(f, "AgentStarted({name})"),
            AgentEvent::AgentFinished { name } => write!(f, "AgentFinished({name})"),
            AgentEvent::Text(text) => write!(f, "Text({} bytes)", text.len()),
            AgentEvent::ModelRequest { config, .. } => write!(f, "ModelRequest({})", config.model),
            AgentEvent::ModelFinished => write!(f, "ModelFinished"),
            AgentEvent::ToolRequest { call, .. } => write!(f, "ToolRequest({})", call.name),
            AgentEvent::ToolFinished { call, .. } => write!(f, "ToolFinished({})", call.name),
            AgentEvent::Error(msg) => write!(f, "Error({msg})"),
        }
    }
}

/// External agent runtime driving one run per invocation.
#[async_trait]
pub trait AgentRuntime: Send + Sync {
    /// Start a run. Events arrive on the returned channel; the channel
    /// closing means the run is complete.
    async fn run(
        &self,
        user_id: &str,
        session_id: &str,
        prompt: &str,
    ) -> Result<mpsc::Receiver<AgentEvent>>;
}
