//! Storage and remote collaborators
//!
//! The orchestrator talks to every external system through these traits so
//! scan behavior is testable against in-process fakes. `PostgresStore` is
//! the production implementation; `InMemoryStore` backs tests and local
//! paper runs.

pub mod genai_cache;
pub mod memory;
pub mod postgres;

pub use genai_cache::GenaiCacheClient;
pub use memory::InMemoryStore;
pub use postgres::PostgresStore;

use crate::domain::{RunRecord, RunSession, Strategy};
use crate::error::Result;
use crate::scan::lease::LeaseDecision;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::time::Duration;
use tracing::debug;

#[cfg(test)]
use mockall::automock;

/// Strategy document storage with atomic lease acquisition.
#[async_trait]
pub trait StrategyStore: Send + Sync {
    /// All strategies currently ACTIVE, freshly read.
    async fn fetch_active(&self) -> Result<Vec<Strategy>>;

    /// One strategy by id, freshly read.
    async fn fetch(&self, strategy_id: &str) -> Result<Option<Strategy>>;

    /// Evaluate the lease admission rules against a fresh read and, on
    /// grant, persist `scan_lock_until` and `last_attempt` — all inside
    /// one atomic read-modify-write transaction. Without that atomicity
    /// the decision is racy.
    async fn try_acquire(&self, strategy_id: &str, now: DateTime<Utc>) -> Result<LeaseDecision>;

    /// Clear `scan_lock_until`; advance `last_run` only when `success`.
    async fn release(&self, strategy_id: &str, success: bool, now: DateTime<Utc>) -> Result<()>;
}

/// Append-only run-record log.
#[async_trait]
pub trait RunLogStore: Send + Sync {
    /// Awaited append; run records are the terminal action of a run and
    /// must not be lost.
    async fn append(&self, record: &RunRecord) -> Result<()>;

    /// Most recent records for a user, newest first.
    async fn recent(
        &self,
        user_id: &str,
        limit: i64,
        strategy_id: Option<&str>,
    ) -> Result<Vec<RunRecord>>;
}

/// Run-session persistence.
#[async_trait]
pub trait SessionStore: Send + Sync {
    async fn create(&self, session: &RunSession) -> Result<()>;

    /// Awaited write. Confirmation-state correctness depends on this
    /// completing before control returns to the caller.
    async fn update(&self, session: &RunSession) -> Result<()>;

    async fn fetch(&self, session_id: &str) -> Result<Option<RunSession>>;
}

/// Handle returned by the remote cached-content API
#[derive(Debug, Clone)]
pub struct CreatedCache {
    pub name: String,
    pub expire_time: DateTime<Utc>,
}

/// Remote content-cache creation API.
#[cfg_attr(test, automock)]
#[async_trait]
pub trait CacheCreator: Send + Sync {
    async fn create_cache(
        &self,
        model: &str,
        contents: &str,
        ttl: Duration,
    ) -> Result<CreatedCache>;
}

/// Long-term memory consolidation API. Best-effort: callers log and
/// swallow failures.
#[cfg_attr(test, automock)]
#[async_trait]
pub trait MemoryService: Send + Sync {
    async fn add_session_to_memory(&self, session: &RunSession) -> Result<()>;
}

/// Memory collaborator that drops every consolidation request. Wired in
/// when no long-term memory backend is configured.
pub struct NoopMemoryService;

#[async_trait]
impl MemoryService for NoopMemoryService {
    async fn add_session_to_memory(&self, session: &RunSession) -> Result<()> {
        debug!("No memory backend configured, dropping session {}", session.id);
        Ok(())
    }
}
