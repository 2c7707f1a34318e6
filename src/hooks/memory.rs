//! Long-term memory consolidation
//!
//! At run end, sessions that accumulated enough new events since the last
//! checkpoint are handed to the memory collaborator. Consolidation is
//! best-effort: failures are logged and swallowed, and the checkpoint only
//! advances on success so the next run retries.

use crate::error::Result;
use crate::hooks::{RunContext, RunHook};
use crate::store::MemoryService;
use async_trait::async_trait;
use std::sync::Arc;
use tracing::{debug, warn};

pub struct MemoryConsolidation {
    /// Consolidate once this many new events accumulate; <= 0 disables.
    event_threshold: i64,
    memory: Arc<dyn MemoryService>,
}

impl MemoryConsolidation {
    pub fn new(event_threshold: i64, memory: Arc<dyn MemoryService>) -> Self {
        Self {
            event_threshold,
            memory,
        }
    }
}

#[async_trait]
impl RunHook for MemoryConsolidation {
    fn name(&self) -> &'static str {
        "memory_consolidation"
    }

    async fn after_run(&self, ctx: &RunContext) -> Result<()> {
        if self.event_threshold <= 0 {
            return Ok(());
        }
        let Some(session) = ctx.session.as_ref() else {
            return Ok(());
        };

        let mut session = session.lock().await;
        let new_events = session
            .state
            .event_count
            .saturating_sub(session.state.memory_event_count);
        if new_events < self.event_threshold as u64 {
            return Ok(());
        }

        match self.memory.add_session_to_memory(&session).await {
            Ok(()) => {
                session.state.memory_event_count = session.state.event_count;
                debug!(
                    "Consolidated session {} into memory at {} events",
                    session.id, session.state.event_count
                );
            }
            Err(e) => {
                warn!("Memory consolidation failed for session {}: {}", session.id, e);
            }
        }
        Ok(())
    }
}
