//! Shared test fixtures: a scripted agent runtime and strategy builders.
#![allow(dead_code)]

use autopilot::agent::{
    AgentEvent, AgentRuntime, ModelCallConfig, ToolCall, ToolDisposition, EVENT_CHANNEL_CAPACITY,
};
use autopilot::domain::{ExecutionMode, RiskProfile, Strategy, StrategyStatus};
use autopilot::error::Result;
use autopilot::store::{CacheCreator, CreatedCache};
use async_trait::async_trait;
use chrono::{Duration as ChronoDuration, Utc};
use rust_decimal_macros::dec;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::mpsc;

pub fn strategy(id: &str, mode: ExecutionMode) -> Strategy {
    Strategy {
        id: id.to_string(),
        user_id: "user-1".to_string(),
        name: "BTC momentum".to_string(),
        assets: vec!["BTCUSDT".to_string()],
        interval: "45m".to_string(),
        status: StrategyStatus::Active,
        risk_profile: RiskProfile::Moderate,
        max_position_size: dec!(100),
        mode,
        last_run: None,
        last_attempt: None,
        scan_lock_until: None,
    }
}

/// One scripted step of an agent run.
#[derive(Clone)]
pub enum Step {
    Text(&'static str),
    /// Tool request; `result` stands in for the tool's real output when the
    /// run loop answers `Proceed`.
    Tool {
        call: ToolCall,
        result: serde_json::Value,
    },
    /// Model request with the given config.
    Model(ModelCallConfig),
    Fail(&'static str),
}

/// Agent runtime that replays a scripted event sequence and records how the
/// run loop answered its requests.
pub struct ScriptedRuntime {
    pub steps: Vec<Step>,
    /// Dispositions received for each scripted tool request, in order
    pub dispositions: Arc<Mutex<Vec<ToolDisposition>>>,
    /// Configs received back for each scripted model request, in order
    pub model_configs: Arc<Mutex<Vec<ModelCallConfig>>>,
}

impl ScriptedRuntime {
    pub fn new(steps: Vec<Step>) -> Self {
        Self {
            steps,
            dispositions: Arc::new(Mutex::new(Vec::new())),
            model_configs: Arc::new(Mutex::new(Vec::new())),
        }
    }
}

#[async_trait]
impl AgentRuntime for ScriptedRuntime {
    async fn run(
        &self,
        _user_id: &str,
        _session_id: &str,
        _prompt: &str,
    ) -> Result<mpsc::Receiver<AgentEvent>> {
        let (tx, rx) = mpsc::channel(EVENT_CHANNEL_CAPACITY);
        let steps = self.steps.clone();
        let dispositions = self.dispositions.clone();
        let model_configs = self.model_configs.clone();

        tokio::spawn(async move {
            let _ = tx
                .send(AgentEvent::AgentStarted {
                    name: "executor".to_string(),
                })
                .await;

            for step in steps {
                match step {
                    Step::Text(text) => {
                        let _ = tx.send(AgentEvent::Text(text.to_string())).await;
                    }
                    Step::Tool { call, result } => {
                        let (reply_tx, reply_rx) = tokio::sync::oneshot::channel();
                        let _ = tx
                            .send(AgentEvent::ToolRequest {
                                call: call.clone(),
                                respond_to: reply_tx,
                            })
                            .await;
                        let disposition =
                            reply_rx.await.unwrap_or(ToolDisposition::Proceed);
                        dispositions.lock().unwrap().push(disposition.clone());

                        let effective = match disposition {
                            ToolDisposition::Proceed => result,
                            ToolDisposition::Block(blocked) => blocked,
                        };
                        let _ = tx
                            .send(AgentEvent::ToolFinished {
                                call,
                                result: effective,
                            })
                            .await;
                    }
                    Step::Model(config) => {
                        let (reply_tx, reply_rx) = tokio::sync::oneshot::channel();
                        let _ = tx
                            .send(AgentEvent::ModelRequest {
                                config,
                                respond_to: reply_tx,
                            })
                            .await;
                        if let Ok(adjusted) = reply_rx.await {
                            model_configs.lock().unwrap().push(adjusted);
                        }
                        let _ = tx.send(AgentEvent::ModelFinished).await;
                    }
                    Step::Fail(message) => {
                        let _ = tx.send(AgentEvent::Error(message.to_string())).await;
                        return;
                    }
                }
            }

            let _ = tx
                .send(AgentEvent::AgentFinished {
                    name: "executor".to_string(),
                })
                .await;
        });

        Ok(rx)
    }
}

/// Cache creator that counts invocations and returns sequential handles.
#[derive(Default)]
pub struct CountingCacheCreator {
    pub calls: AtomicUsize,
}

#[async_trait]
impl CacheCreator for CountingCacheCreator {
    async fn create_cache(
        &self,
        _model: &str,
        _contents: &str,
        ttl: Duration,
    ) -> Result<CreatedCache> {
        let n = self.calls.fetch_add(1, Ordering::SeqCst) + 1;
        Ok(CreatedCache {
            name: format!("caches/handle-{n}"),
            expire_time: Utc::now() + ChronoDuration::seconds(ttl.as_secs() as i64),
        })
    }
}

pub fn trade_call(id: &str, is_dry_run: Option<bool>) -> ToolCall {
    let mut args = serde_json::json!({
        "symbol": "BTCUSDT",
        "side": "buy",
        "quantity": "0.01",
    });
    if let Some(flag) = is_dry_run {
        args["isDryRun"] = serde_json::Value::Bool(flag);
    }
    ToolCall {
        id: id.to_string(),
        name: "execute_trade".to_string(),
        args,
    }
}
