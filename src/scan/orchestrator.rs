//! Scan orchestration
//!
//! One scan cycle walks every ACTIVE strategy sequentially (bounding
//! external load), asks the lease coordinator for permission, and drives a
//! full agent run for each grant: prompt build, session open, event-stream
//! drain with hook dispatch, run-record append, lease release. Failures
//! are caught per strategy and never abort the rest of the cycle.
//! Overlapping cycles are safe: the lease transaction is the only
//! mutual-exclusion mechanism, so a concurrent cycle simply sees `locked`.

use crate::agent::{prompt, AgentEvent, AgentRuntime};
use crate::domain::{RunRecord, RunSession, ScanOutcome, ScanReport, Strategy};
use crate::error::Result;
use crate::hooks::{HookPipeline, RunContext};
use crate::scan::lease::{LeaseCoordinator, LeaseDecision};
use crate::scan::run_log::RunLogger;
use crate::store::{SessionStore, StrategyStore};
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

pub struct ScanOrchestrator {
    strategies: Arc<dyn StrategyStore>,
    sessions: Arc<dyn SessionStore>,
    runtime: Arc<dyn AgentRuntime>,
    run_logger: RunLogger,
    lease: LeaseCoordinator<dyn StrategyStore>,
    hooks: HookPipeline,
}

impl ScanOrchestrator {
    pub fn new(
        strategies: Arc<dyn StrategyStore>,
        sessions: Arc<dyn SessionStore>,
        runtime: Arc<dyn AgentRuntime>,
        run_logger: RunLogger,
        hooks: HookPipeline,
    ) -> Self {
        let lease = LeaseCoordinator::new(strategies.clone());
        Self {
            strategies,
            sessions,
            runtime,
            run_logger,
            lease,
            hooks,
        }
    }

    /// Run one scan cycle over all active strategies.
    pub async fn run_scan(&self) -> Result<ScanReport> {
        let strategies = self.strategies.fetch_active().await?;
        info!("Scan cycle started: {} active strategies", strategies.len());

        let mut results = Vec::with_capacity(strategies.len());
        for strategy in &strategies {
            results.push(self.process_strategy(strategy).await);
        }

        let report = ScanReport {
            scanned: strategies.len(),
            results,
        };
        info!(
            "Scan cycle finished: {} completed, {} skipped, {} failed",
            report.completed(),
            report.skipped(),
            report.failed()
        );
        Ok(report)
    }

    /// Process one strategy; every failure is converted into a per-strategy
    /// outcome so the cycle continues.
    async fn process_strategy(&self, strategy: &Strategy) -> ScanOutcome {
        match self.lease.try_acquire(&strategy.id).await {
            Ok(LeaseDecision::Denied(reason)) => {
                debug!("Skipping strategy {}: {}", strategy.id, reason);
                ScanOutcome::Skipped {
                    strategy_id: strategy.id.clone(),
                    reason,
                }
            }
            Ok(LeaseDecision::Granted { .. }) => match self.execute_run(strategy).await {
                Ok(output) => {
                    let record = RunRecord::success(&strategy.id, &strategy.user_id, output);
                    if let Err(e) = self.run_logger.record(&record).await {
                        error!("Run record append failed for {}: {}", strategy.id, e);
                        self.release(strategy, true).await;
                        return ScanOutcome::Failed {
                            strategy_id: strategy.id.clone(),
                            error: format!("run record append failed: {e}"),
                        };
                    }
                    self.release(strategy, true).await;
                    ScanOutcome::Completed {
                        strategy_id: strategy.id.clone(),
                    }
                }
                Err(e) => {
                    let error = e.to_string();
                    warn!("Run failed for strategy {}: {}", strategy.id, error);
                    let record = RunRecord::failure(&strategy.id, &strategy.user_id, error.clone());
                    if let Err(e) = self.run_logger.record(&record).await {
                        error!("Run record append failed for {}: {}", strategy.id, e);
                    }
                    self.release(strategy, false).await;
                    ScanOutcome::Failed {
                        strategy_id: strategy.id.clone(),
                        error,
                    }
                }
            },
            Err(e) => {
                // Acquisition errors (including retry exhaustion) are
                // visible failures, never silent skips.
                let error = e.to_string();
                warn!("Lease acquisition failed for {}: {}", strategy.id, error);
                let record = RunRecord::failure(&strategy.id, &strategy.user_id, error.clone());
                if let Err(e) = self.run_logger.record(&record).await {
                    error!("Run record append failed for {}: {}", strategy.id, e);
                }
                ScanOutcome::Failed {
                    strategy_id: strategy.id.clone(),
                    error,
                }
            }
        }
    }

    async fn release(&self, strategy: &Strategy, success: bool) {
        if let Err(e) = self.lease.release(&strategy.id, success).await {
            // The lease self-expires within its TTL cap if this write is lost.
            error!("Lease release failed for {}: {}", strategy.id, e);
        }
    }

    /// Drive one agent run to completion, concatenating streamed text.
    async fn execute_run(&self, strategy: &Strategy) -> Result<String> {
        let mut session = RunSession::new(&strategy.user_id);
        session.state.extra.insert(
            "strategy_id".to_string(),
            serde_json::Value::String(strategy.id.clone()),
        );
        session.state.extra.insert(
            "strategy_name".to_string(),
            serde_json::Value::String(strategy.name.clone()),
        );
        self.sessions.create(&session).await?;

        let session_id = session.id.clone();
        let run_id = Uuid::new_v4().to_string();
        let shared = Arc::new(Mutex::new(session));
        let ctx = RunContext::new(&run_id, &strategy.user_id, shared.clone());

        self.hooks.before_run(&ctx).await;
        let result = self.drive_events(&ctx, strategy, &session_id, &shared).await;
        // The telemetry arena entry for this run is released here on every
        // path, success or failure.
        self.hooks.after_run(&ctx).await;

        let session = shared.lock().await.clone();
        if let Err(e) = self.sessions.update(&session).await {
            // Non-critical persistence; confirmation-state writes were
            // already awaited by the gate itself.
            warn!("Session persistence failed for {}: {}", session.id, e);
        }

        result
    }

    async fn drive_events(
        &self,
        ctx: &RunContext,
        strategy: &Strategy,
        session_id: &str,
        shared: &Arc<Mutex<RunSession>>,
    ) -> Result<String> {
        let prompt = prompt::build_execution_prompt(strategy);
        let mut events = self
            .runtime
            .run(&strategy.user_id, session_id, &prompt)
            .await?;

        let mut output = String::new();
        let mut run_error: Option<String> = None;

        while let Some(event) = events.recv().await {
            shared.lock().await.state.event_count += 1;

            match event {
                AgentEvent::AgentStarted { name } => {
                    self.hooks.before_agent(ctx, &name).await;
                }
                AgentEvent::AgentFinished { name } => {
                    self.hooks.after_agent(ctx, &name).await;
                }
                AgentEvent::Text(text) => {
                    output.push_str(&text);
                }
                AgentEvent::ModelRequest {
                    mut config,
                    respond_to,
                } => {
                    self.hooks.before_model(ctx, &mut config).await;
                    let _ = respond_to.send(config);
                }
                AgentEvent::ModelFinished => {
                    self.hooks.after_model(ctx).await;
                }
                AgentEvent::ToolRequest { call, respond_to } => {
                    let disposition = self.hooks.before_tool(ctx, &call).await;
                    let _ = respond_to.send(disposition);
                }
                AgentEvent::ToolFinished { call, result } => {
                    self.hooks.after_tool(ctx, &call, &result).await;
                }
                AgentEvent::Error(message) => {
                    // Terminal; the channel closes right after.
                    run_error = Some(message);
                }
            }
        }

        match run_error {
            Some(message) => Err(crate::error::AutopilotError::AgentRun(message)),
            None => Ok(output),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::agent::EVENT_CHANNEL_CAPACITY;
    use crate::domain::{ExecutionMode, RiskProfile, StrategyStatus};
    use crate::store::InMemoryStore;
    use async_trait::async_trait;
    use rust_decimal_macros::dec;
    use tokio::sync::mpsc;

    /// Runtime that emits a fixed text transcript, or fails.
    struct TextRuntime {
        text: Vec<&'static str>,
        fail: bool,
    }

    #[async_trait]
    impl AgentRuntime for TextRuntime {
        async fn run(
            &self,
            _user_id: &str,
            _session_id: &str,
            _prompt: &str,
        ) -> Result<mpsc::Receiver<AgentEvent>> {
            let (tx, rx) = mpsc::channel(EVENT_CHANNEL_CAPACITY);
            let text: Vec<String> = self.text.iter().map(|s| s.to_string()).collect();
            let fail = self.fail;
            tokio::spawn(async move {
                let _ = tx
                    .send(AgentEvent::AgentStarted {
                        name: "executor".to_string(),
                    })
                    .await;
                for chunk in text {
                    let _ = tx.send(AgentEvent::Text(chunk)).await;
                }
                if fail {
                    let _ = tx
                        .send(AgentEvent::Error("model unavailable".to_string()))
                        .await;
                } else {
                    let _ = tx
                        .send(AgentEvent::AgentFinished {
                            name: "executor".to_string(),
                        })
                        .await;
                }
            });
            Ok(rx)
        }
    }

    fn strategy(id: &str, interval: &str) -> Strategy {
        Strategy {
            id: id.to_string(),
            user_id: "user-1".to_string(),
            name: "BTC momentum".to_string(),
            assets: vec!["BTCUSDT".to_string()],
            interval: interval.to_string(),
            status: StrategyStatus::Active,
            risk_profile: RiskProfile::Moderate,
            max_position_size: dec!(100),
            mode: ExecutionMode::Paper,
            last_run: None,
            last_attempt: None,
            scan_lock_until: None,
        }
    }

    fn orchestrator(store: Arc<InMemoryStore>, runtime: TextRuntime) -> ScanOrchestrator {
        ScanOrchestrator::new(
            store.clone(),
            store.clone(),
            Arc::new(runtime),
            RunLogger::new(store),
            HookPipeline::default(),
        )
    }

    #[tokio::test]
    async fn test_successful_run_records_and_releases() {
        let store = Arc::new(InMemoryStore::new());
        store.insert_strategy(strategy("s1", "45m")).await;

        let orchestrator = orchestrator(
            store.clone(),
            TextRuntime {
                text: vec!["Scanned BTC. ", "No entry."],
                fail: false,
            },
        );

        let report = orchestrator.run_scan().await.unwrap();
        assert_eq!(report.scanned, 1);
        assert_eq!(report.completed(), 1);

        let doc = store.strategy("s1").await.unwrap();
        assert!(doc.scan_lock_until.is_none());
        assert!(doc.last_run.is_some());

        let records = store.run_records().await;
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].status, crate::domain::RunStatus::Success);
        assert_eq!(records[0].output, "Scanned BTC. No entry.");
    }

    #[tokio::test]
    async fn test_failed_run_releases_without_last_run() {
        let store = Arc::new(InMemoryStore::new());
        store.insert_strategy(strategy("s1", "45m")).await;

        let orchestrator = orchestrator(
            store.clone(),
            TextRuntime {
                text: vec![],
                fail: true,
            },
        );

        let report = orchestrator.run_scan().await.unwrap();
        assert_eq!(report.failed(), 1);

        let doc = store.strategy("s1").await.unwrap();
        assert!(doc.scan_lock_until.is_none());
        assert!(doc.last_run.is_none());
        // The attempt still counts toward interval pacing.
        assert!(doc.last_attempt.is_some());

        let records = store.run_records().await;
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].status, crate::domain::RunStatus::Failed);
        assert!(records[0].output.contains("model unavailable"));
    }

    #[tokio::test]
    async fn test_one_failure_does_not_abort_cycle() {
        let store = Arc::new(InMemoryStore::new());
        store.insert_strategy(strategy("s1", "45m")).await;
        store.insert_strategy(strategy("s2", "45m")).await;

        // Both run through the same failing runtime; both must be attempted.
        let orchestrator = orchestrator(
            store.clone(),
            TextRuntime {
                text: vec![],
                fail: true,
            },
        );

        let report = orchestrator.run_scan().await.unwrap();
        assert_eq!(report.scanned, 2);
        assert_eq!(report.failed(), 2);
        assert_eq!(store.run_records().await.len(), 2);
    }

    #[tokio::test]
    async fn test_denied_strategy_is_skipped_not_run() {
        let store = Arc::new(InMemoryStore::new());
        let mut recent = strategy("s1", "45m");
        recent.last_run = Some(chrono::Utc::now() - chrono::Duration::minutes(5));
        store.insert_strategy(recent).await;

        let orchestrator = orchestrator(
            store.clone(),
            TextRuntime {
                text: vec!["should not run"],
                fail: false,
            },
        );

        let report = orchestrator.run_scan().await.unwrap();
        assert_eq!(report.skipped(), 1);
        assert!(store.run_records().await.is_empty());
    }
}
