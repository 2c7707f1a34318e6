//! Run lifecycle hook pipeline
//!
//! Cross-cutting run concerns (telemetry, trade confirmation, content
//! caching, memory consolidation) are hook implementations dispatched by
//! the orchestrator's own run loop in a fixed registration order, so
//! ordering and error isolation are testable without a host framework.
//!
//! Every callback except `before_tool` is observational: a hook error is
//! logged and the remaining hooks still run. `before_tool` may return
//! [`ToolDisposition::Block`] to replace the tool's execution; the first
//! block wins and later hooks are not consulted for that call.

pub mod confirmation;
pub mod memory;
pub mod rag_cache;
pub mod telemetry;

pub use confirmation::ConfirmationGate;
pub use memory::MemoryConsolidation;
pub use rag_cache::CacheLifecycleManager;
pub use telemetry::TelemetryAggregator;

use crate::agent::{ModelCallConfig, ToolCall, ToolDisposition};
use crate::domain::RunSession;
use crate::error::Result;
use async_trait::async_trait;
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::warn;

/// Per-run context handed to every hook invocation.
#[derive(Clone)]
pub struct RunContext {
    pub run_id: String,
    pub user_id: String,
    /// The run's session. Absent when a hook is exercised outside a managed
    /// run; the confirmation gate deliberately fails open in that case.
    pub session: Option<Arc<Mutex<RunSession>>>,
}

impl RunContext {
    pub fn new(run_id: &str, user_id: &str, session: Arc<Mutex<RunSession>>) -> Self {
        Self {
            run_id: run_id.to_string(),
            user_id: user_id.to_string(),
            session: Some(session),
        }
    }

    /// Context with no attached session (see the gate's fail-open note).
    pub fn detached(run_id: &str, user_id: &str) -> Self {
        Self {
            run_id: run_id.to_string(),
            user_id: user_id.to_string(),
            session: None,
        }
    }
}

/// One lifecycle hook. Callbacks default to no-ops; implement only the
/// points a concern needs.
#[async_trait]
pub trait RunHook: Send + Sync {
    fn name(&self) -> &'static str;

    async fn before_run(&self, _ctx: &RunContext) -> Result<()> {
        Ok(())
    }

    async fn before_agent(&self, _ctx: &RunContext, _agent: &str) -> Result<()> {
        Ok(())
    }

    async fn after_agent(&self, _ctx: &RunContext, _agent: &str) -> Result<()> {
        Ok(())
    }

    async fn before_model(&self, _ctx: &RunContext, _config: &mut ModelCallConfig) -> Result<()> {
        Ok(())
    }

    async fn after_model(&self, _ctx: &RunContext) -> Result<()> {
        Ok(())
    }

    async fn before_tool(&self, _ctx: &RunContext, _call: &ToolCall) -> Result<ToolDisposition> {
        Ok(ToolDisposition::Proceed)
    }

    async fn after_tool(
        &self,
        _ctx: &RunContext,
        _call: &ToolCall,
        _result: &serde_json::Value,
    ) -> Result<()> {
        Ok(())
    }

    async fn after_run(&self, _ctx: &RunContext) -> Result<()> {
        Ok(())
    }
}

/// Ordered hook list dispatched by the run loop.
#[derive(Clone, Default)]
pub struct HookPipeline {
    hooks: Vec<Arc<dyn RunHook>>,
}

impl HookPipeline {
    pub fn new(hooks: Vec<Arc<dyn RunHook>>) -> Self {
        Self { hooks }
    }

    pub fn is_empty(&self) -> bool {
        self.hooks.is_empty()
    }

    pub async fn before_run(&self, ctx: &RunContext) {
        for hook in &self.hooks {
            if let Err(e) = hook.before_run(ctx).await {
                warn!("Hook {} before_run failed: {}", hook.name(), e);
            }
        }
    }

    pub async fn before_agent(&self, ctx: &RunContext, agent: &str) {
        for hook in &self.hooks {
            if let Err(e) = hook.before_agent(ctx, agent).await {
                warn!("Hook {} before_agent failed: {}", hook.name(), e);
            }
        }
    }

    pub async fn after_agent(&self, ctx: &RunContext, agent: &str) {
        for hook in &self.hooks {
            if let Err(e) = hook.after_agent(ctx, agent).await {
                warn!("Hook {} after_agent failed: {}", hook.name(), e);
            }
        }
    }

    pub async fn before_model(&self, ctx: &RunContext, config: &mut ModelCallConfig) {
        for hook in &self.hooks {
            if let Err(e) = hook.before_model(ctx, config).await {
                warn!("Hook {} before_model failed: {}", hook.name(), e);
            }
        }
    }

    pub async fn after_model(&self, ctx: &RunContext) {
        for hook in &self.hooks {
            if let Err(e) = hook.after_model(ctx).await {
                warn!("Hook {} after_model failed: {}", hook.name(), e);
            }
        }
    }

    /// Dispatch `before_tool` in order; the first block short-circuits.
    pub async fn before_tool(&self, ctx: &RunContext, call: &ToolCall) -> ToolDisposition {
        for hook in &self.hooks {
            match hook.before_tool(ctx, call).await {
                Ok(ToolDisposition::Proceed) => {}
                Ok(block @ ToolDisposition::Block(_)) => return block,
                Err(e) => {
                    warn!("Hook {} before_tool failed: {}", hook.name(), e);
                }
            }
        }
        ToolDisposition::Proceed
    }

    pub async fn after_tool(&self, ctx: &RunContext, call: &ToolCall, result: &serde_json::Value) {
        for hook in &self.hooks {
            if let Err(e) = hook.after_tool(ctx, call, result).await {
                warn!("Hook {} after_tool failed: {}", hook.name(), e);
            }
        }
    }

    pub async fn after_run(&self, ctx: &RunContext) {
        for hook in &self.hooks {
            if let Err(e) = hook.after_run(ctx).await {
                warn!("Hook {} after_run failed: {}", hook.name(), e);
            }
        }
    }
}
