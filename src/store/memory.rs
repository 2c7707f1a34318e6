//! In-process store
//!
//! Mutex-guarded maps implementing the storage traits. Used by the test
//! suites and by local paper runs that have no database. The strategy
//! mutex makes `try_acquire` an atomic read-modify-write, matching the
//! contract the Postgres implementation provides with a transaction.

use crate::domain::{RunRecord, RunSession, Strategy};
use crate::error::{AutopilotError, Result};
use crate::scan::lease::{self, LeaseDecision};
use crate::store::{RunLogStore, SessionStore, StrategyStore};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use tokio::sync::Mutex;

#[derive(Default)]
pub struct InMemoryStore {
    strategies: Mutex<HashMap<String, Strategy>>,
    runs: Mutex<Vec<RunRecord>>,
    sessions: Mutex<HashMap<String, RunSession>>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn insert_strategy(&self, strategy: Strategy) {
        self.strategies
            .lock()
            .await
            .insert(strategy.id.clone(), strategy);
    }

    /// Snapshot of one strategy's current document
    pub async fn strategy(&self, strategy_id: &str) -> Option<Strategy> {
        self.strategies.lock().await.get(strategy_id).cloned()
    }

    /// Snapshot of all run records, oldest first
    pub async fn run_records(&self) -> Vec<RunRecord> {
        self.runs.lock().await.clone()
    }

    /// Snapshot of all stored sessions
    pub async fn sessions(&self) -> Vec<RunSession> {
        self.sessions.lock().await.values().cloned().collect()
    }
}

#[async_trait]
impl StrategyStore for InMemoryStore {
    async fn fetch_active(&self) -> Result<Vec<Strategy>> {
        let strategies = self.strategies.lock().await;
        let mut active: Vec<Strategy> = strategies
            .values()
            .filter(|s| s.status == crate::domain::StrategyStatus::Active)
            .cloned()
            .collect();
        active.sort_by(|a, b| a.id.cmp(&b.id));
        Ok(active)
    }

    async fn fetch(&self, strategy_id: &str) -> Result<Option<Strategy>> {
        Ok(self.strategies.lock().await.get(strategy_id).cloned())
    }

    async fn try_acquire(&self, strategy_id: &str, now: DateTime<Utc>) -> Result<LeaseDecision> {
        let mut strategies = self.strategies.lock().await;
        let strategy = strategies
            .get_mut(strategy_id)
            .ok_or_else(|| AutopilotError::StrategyNotFound(strategy_id.to_string()))?;

        let decision = lease::decide(strategy, now);
        if let LeaseDecision::Granted { lock_until } = decision {
            strategy.scan_lock_until = Some(lock_until);
            strategy.last_attempt = Some(now);
        }
        Ok(decision)
    }

    async fn release(&self, strategy_id: &str, success: bool, now: DateTime<Utc>) -> Result<()> {
        let mut strategies = self.strategies.lock().await;
        let strategy = strategies
            .get_mut(strategy_id)
            .ok_or_else(|| AutopilotError::StrategyNotFound(strategy_id.to_string()))?;

        strategy.scan_lock_until = None;
        if success {
            strategy.last_run = Some(now);
        }
        Ok(())
    }
}

#[async_trait]
impl RunLogStore for InMemoryStore {
    async fn append(&self, record: &RunRecord) -> Result<()> {
        self.runs.lock().await.push(record.clone());
        Ok(())
    }

    async fn recent(
        &self,
        user_id: &str,
        limit: i64,
        strategy_id: Option<&str>,
    ) -> Result<Vec<RunRecord>> {
        let runs = self.runs.lock().await;
        let mut matching: Vec<RunRecord> = runs
            .iter()
            .filter(|r| r.user_id == user_id)
            .filter(|r| strategy_id.map_or(true, |id| r.strategy_id == id))
            .cloned()
            .collect();
        matching.reverse();
        matching.truncate(limit.max(0) as usize);
        Ok(matching)
    }
}

#[async_trait]
impl SessionStore for InMemoryStore {
    async fn create(&self, session: &RunSession) -> Result<()> {
        self.sessions
            .lock()
            .await
            .insert(session.id.clone(), session.clone());
        Ok(())
    }

    async fn update(&self, session: &RunSession) -> Result<()> {
        let mut sessions = self.sessions.lock().await;
        if !sessions.contains_key(&session.id) {
            return Err(AutopilotError::SessionNotFound(session.id.clone()));
        }
        sessions.insert(session.id.clone(), session.clone());
        Ok(())
    }

    async fn fetch(&self, session_id: &str) -> Result<Option<RunSession>> {
        Ok(self.sessions.lock().await.get(session_id).cloned())
    }
}
