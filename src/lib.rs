pub mod agent;
pub mod cli;
pub mod config;
pub mod domain;
pub mod error;
pub mod hooks;
pub mod scan;
pub mod store;

pub use agent::{AgentEvent, AgentRuntime, CliAgentRuntime, ModelCallConfig, ToolCall, ToolDisposition};
pub use config::AppConfig;
pub use domain::{
    ConfirmationState, ExecutionMode, RiskProfile, RunRecord, RunSession, RunStatus, ScanOutcome,
    ScanReport, Strategy, StrategyStatus, TradeProposal,
};
pub use error::{AutopilotError, Result};
pub use hooks::{
    CacheLifecycleManager, ConfirmationGate, HookPipeline, MemoryConsolidation, RunContext,
    RunHook, TelemetryAggregator,
};
pub use scan::{DenyReason, LeaseCoordinator, LeaseDecision, RunLogger, ScanOrchestrator};
pub use store::{
    CacheCreator, InMemoryStore, MemoryService, PostgresStore, RunLogStore, SessionStore,
    StrategyStore,
};
