//! Per-run telemetry aggregation
//!
//! Accumulates start/stop timings for nested sub-operations (agent steps,
//! tool calls) within one run. Stats are updated incrementally — count,
//! total, min, max — never as per-call history. The run's whole entry is
//! deleted at run end so concurrent runs cannot accumulate memory.

use crate::agent::{ToolCall, ToolDisposition};
use crate::error::Result;
use crate::hooks::{RunContext, RunHook};
use async_trait::async_trait;
use dashmap::DashMap;
use std::collections::HashMap;
use std::time::{Duration, Instant};
use tracing::{info, warn};

/// Incrementally maintained duration statistics for one operation name
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DurationStats {
    pub count: u64,
    pub total_ms: u64,
    pub min_ms: u64,
    pub max_ms: u64,
}

impl DurationStats {
    fn first(duration_ms: u64) -> Self {
        Self {
            count: 1,
            total_ms: duration_ms,
            min_ms: duration_ms,
            max_ms: duration_ms,
        }
    }

    fn record(&mut self, duration_ms: u64) {
        self.count += 1;
        self.total_ms += duration_ms;
        self.min_ms = self.min_ms.min(duration_ms);
        self.max_ms = self.max_ms.max(duration_ms);
    }

    pub fn avg_ms(&self) -> u64 {
        if self.count == 0 {
            return 0;
        }
        ((self.total_ms as f64) / (self.count as f64)).round() as u64
    }
}

#[derive(Default)]
struct RunTelemetry {
    /// In-progress agent invocations by agent name
    open_agents: HashMap<String, Instant>,
    /// In-progress tool calls by call id (name kept for attribution)
    open_tools: HashMap<String, (String, Instant)>,
    agent_stats: HashMap<String, DurationStats>,
    tool_stats: HashMap<String, DurationStats>,
}

/// Bounded summary emitted once at run end
#[derive(Debug, Clone, Default)]
pub struct TelemetrySummary {
    pub agents: Vec<(String, DurationStats)>,
    pub tools: Vec<(String, DurationStats)>,
}

/// Telemetry arena keyed by run id with an explicit release at run end
#[derive(Default)]
pub struct TelemetryAggregator {
    runs: DashMap<String, RunTelemetry>,
}

impl TelemetryAggregator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of runs currently tracked. Must be zero between runs.
    pub fn tracked_runs(&self) -> usize {
        self.runs.len()
    }

    fn agent_started(&self, run_id: &str, agent: &str) {
        self.runs
            .entry(run_id.to_string())
            .or_default()
            .open_agents
            .insert(agent.to_string(), Instant::now());
    }

    fn agent_finished(&self, run_id: &str, agent: &str) {
        let Some(mut run) = self.runs.get_mut(run_id) else {
            return;
        };
        if let Some(started) = run.open_agents.remove(agent) {
            let elapsed = started.elapsed();
            Self::close(&mut run.agent_stats, agent, elapsed);
        } else {
            warn!("Telemetry: finish without start for agent {agent} in run {run_id}");
        }
    }

    fn tool_started(&self, run_id: &str, call_id: &str, tool: &str) {
        self.runs
            .entry(run_id.to_string())
            .or_default()
            .open_tools
            .insert(call_id.to_string(), (tool.to_string(), Instant::now()));
    }

    fn tool_finished(&self, run_id: &str, call_id: &str) {
        let Some(mut run) = self.runs.get_mut(run_id) else {
            return;
        };
        if let Some((tool, started)) = run.open_tools.remove(call_id) {
            let elapsed = started.elapsed();
            Self::close(&mut run.tool_stats, &tool, elapsed);
        }
    }

    fn close(stats: &mut HashMap<String, DurationStats>, name: &str, elapsed: Duration) {
        let duration_ms = elapsed.as_millis() as u64;
        match stats.get_mut(name) {
            Some(existing) => existing.record(duration_ms),
            None => {
                stats.insert(name.to_string(), DurationStats::first(duration_ms));
            }
        }
    }

    /// Summarize and release one run's telemetry. Returns `None` when the
    /// run never recorded anything.
    pub fn finish_run(&self, run_id: &str) -> Option<TelemetrySummary> {
        let (_, run) = self.runs.remove(run_id)?;

        let mut agents: Vec<_> = run.agent_stats.into_iter().collect();
        agents.sort_by(|a, b| a.0.cmp(&b.0));
        let mut tools: Vec<_> = run.tool_stats.into_iter().collect();
        tools.sort_by(|a, b| a.0.cmp(&b.0));
        let summary = TelemetrySummary { agents, tools };

        for (name, stats) in &summary.agents {
            info!(
                "Run {} agent {}: count={} avg={}ms min={}ms max={}ms total={}ms",
                run_id,
                name,
                stats.count,
                stats.avg_ms(),
                stats.min_ms,
                stats.max_ms,
                stats.total_ms
            );
        }
        for (name, stats) in &summary.tools {
            info!(
                "Run {} tool {}: count={} avg={}ms min={}ms max={}ms total={}ms",
                run_id,
                name,
                stats.count,
                stats.avg_ms(),
                stats.min_ms,
                stats.max_ms,
                stats.total_ms
            );
        }

        Some(summary)
    }

    #[cfg(test)]
    fn record_agent_duration(&self, run_id: &str, agent: &str, elapsed: Duration) {
        let mut run = self.runs.entry(run_id.to_string()).or_default();
        Self::close(&mut run.agent_stats, agent, elapsed);
    }
}

#[async_trait]
impl RunHook for TelemetryAggregator {
    fn name(&self) -> &'static str {
        "telemetry"
    }

    async fn before_agent(&self, ctx: &RunContext, agent: &str) -> Result<()> {
        self.agent_started(&ctx.run_id, agent);
        Ok(())
    }

    async fn after_agent(&self, ctx: &RunContext, agent: &str) -> Result<()> {
        self.agent_finished(&ctx.run_id, agent);
        Ok(())
    }

    async fn before_tool(&self, ctx: &RunContext, call: &ToolCall) -> Result<ToolDisposition> {
        self.tool_started(&ctx.run_id, &call.id, &call.name);
        Ok(ToolDisposition::Proceed)
    }

    async fn after_tool(
        &self,
        ctx: &RunContext,
        call: &ToolCall,
        _result: &serde_json::Value,
    ) -> Result<()> {
        self.tool_finished(&ctx.run_id, &call.id);
        Ok(())
    }

    async fn after_run(&self, ctx: &RunContext) -> Result<()> {
        self.finish_run(&ctx.run_id);
        Ok(())
    }
}
