use autopilot::agent::cli_runtime::{CliAgentRuntime, CliRuntimeConfig};
use autopilot::cli::{Cli, Commands};
use autopilot::config::AppConfig;
use autopilot::error::Result;
use autopilot::hooks::{
    CacheLifecycleManager, ConfirmationGate, HookPipeline, MemoryConsolidation, RunHook,
    TelemetryAggregator,
};
use autopilot::scan::{RunLogger, ScanOrchestrator};
use autopilot::store::genai_cache::{GenaiCacheClient, GenaiCacheConfig};
use autopilot::store::{NoopMemoryService, PostgresStore};
use clap::Parser;
use std::sync::Arc;
use tokio::signal;
use tokio::time::Duration;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let config = AppConfig::load_from(&cli.config)?;
    init_logging(&config);

    if let Err(errors) = config.validate() {
        for e in &errors {
            error!("Config error: {}", e);
        }
        return Err(autopilot::error::AutopilotError::Validation(
            errors.join("; "),
        ));
    }

    let store = Arc::new(
        PostgresStore::new(&config.database.url, config.database.max_connections).await?,
    );
    store.migrate().await?;

    match cli.command {
        Commands::Scan => {
            let orchestrator = build_orchestrator(&config, store);
            let report = orchestrator.run_scan().await?;
            println!("{}", serde_json::to_string_pretty(&report)?);
        }
        Commands::Daemon => {
            let orchestrator = build_orchestrator(&config, store);
            run_daemon(&config, orchestrator).await;
        }
        Commands::Confirm { session } => {
            let gate = ConfirmationGate::new(config.trading.live_enabled, store);
            if gate.confirm_pending_trade(&session).await? {
                println!("Pending trade confirmed for session {session}");
            } else {
                println!("Session {session} has no pending trade awaiting confirmation");
            }
        }
        Commands::Strategies { user, limit } => {
            use autopilot::store::{RunLogStore, StrategyStore};

            let strategies = store.fetch_active().await?;
            println!("{} active strategies", strategies.len());
            for s in &strategies {
                println!(
                    "  {} {} [{}] {} {} every {}",
                    s.id,
                    s.name,
                    s.mode,
                    s.risk_profile,
                    s.assets.join(","),
                    s.interval
                );
            }

            let records = store.recent(&user, limit, None).await?;
            println!("{} recent runs for {}", records.len(), user);
            for r in &records {
                println!("  {} {} {}", r.timestamp, r.strategy_id, r.status);
            }
        }
    }

    Ok(())
}

fn build_orchestrator(config: &AppConfig, store: Arc<PostgresStore>) -> ScanOrchestrator {
    let cache_client = GenaiCacheClient::new(GenaiCacheConfig::from_env())
        .map(Arc::new)
        .ok();

    let mut hooks: Vec<Arc<dyn RunHook>> = vec![Arc::new(TelemetryAggregator::new())];
    hooks.push(Arc::new(ConfirmationGate::new(
        config.trading.live_enabled,
        store.clone(),
    )));
    if let Some(cache_client) = cache_client {
        hooks.push(Arc::new(CacheLifecycleManager::new(
            config.rag_cache.clone(),
            cache_client,
        )));
    } else {
        warn!("Cached-content client unavailable, running without the cache hook");
    }
    hooks.push(Arc::new(MemoryConsolidation::new(
        config.memory.consolidation_event_threshold,
        Arc::new(NoopMemoryService),
    )));

    let runtime = Arc::new(CliAgentRuntime::new(CliRuntimeConfig::from(&config.agent)));

    ScanOrchestrator::new(
        store.clone(),
        store.clone(),
        runtime,
        RunLogger::new(store),
        HookPipeline::new(hooks),
    )
}

async fn run_daemon(config: &AppConfig, orchestrator: ScanOrchestrator) {
    let period = Duration::from_secs(config.scan.daemon_period_secs);
    info!("Scan daemon started, period {}s", period.as_secs());

    let mut interval = tokio::time::interval(period);
    loop {
        tokio::select! {
            _ = interval.tick() => {
                if let Err(e) = orchestrator.run_scan().await {
                    error!("Scan cycle failed: {}", e);
                }
            }
            _ = signal::ctrl_c() => {
                info!("Shutdown signal received, stopping scan daemon");
                break;
            }
        }
    }
}

fn init_logging(config: &AppConfig) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        EnvFilter::new(format!("{},autopilot=debug,sqlx=warn", config.logging.level))
    });

    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_thread_ids(false)
        .with_file(false)
        .with_line_number(false);

    if config.logging.json {
        builder.json().init();
    } else {
        builder.init();
    }
}
